//! mcrunnerd - the background daemon controlling Minecraft servers.
//!
//! On startup the daemon binds a unix socket which carries framed control
//! commands between the daemon process and mcrunner client frontends:
//! query status, start and stop servers, inject console commands.
//!
//! ```text
//! mcrunner client ──▶ unix socket ──▶ dispatcher ──▶ MinecraftServer
//!                                        │                 │
//!                                        └── framed ◀──────┘
//!                                            responses
//! ```

pub mod lifecycle;
pub mod server;

pub use lifecycle::PidFile;
pub use server::McRunnerDaemon;
