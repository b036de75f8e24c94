//! Minecraft server monitoring and control system for UNIX.
//!
//! Two binaries share this crate: `mcrunnerd`, the background daemon that
//! owns the managed server processes and listens on a local unix socket,
//! and `mcrunner`, the client frontend that translates CLI invocations
//! into framed control commands.

pub mod client;
pub mod config;
pub mod connection;
pub mod daemon;
pub mod error;
pub mod protocol;
pub mod server;
pub mod watcher;

pub use error::{ConfigError, ServerError};
