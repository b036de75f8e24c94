//! Automatic restart on plugin updates.
//!
//! Each server that opts in gets one watcher on its `plugins/` directory,
//! created lazily on first start and reused across restarts. A watcher
//! that cannot be established only disables auto-restart; it never fails
//! the start operation.

use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::warn;

use crate::server::{MinecraftServer, ServerStatus};

const PLUGIN_ARTIFACT_EXTENSION: &str = "jar";

pub struct PluginWatcher {
    /// Kept alive for the lifetime of the owning server; dropping it
    /// unregisters the watch.
    _watcher: RecommendedWatcher,
}

impl PluginWatcher {
    /// Watches the server's plugins directory and restarts the server
    /// when a plugin jar is added or modified while the server is
    /// running. Returns `None` when the watch cannot be established.
    pub fn spawn(server: Arc<MinecraftServer>) -> Option<Self> {
        let path = server.plugins_dir();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handler = move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                if is_plugin_update(&event) {
                    let _ = tx.send(());
                }
            }
            Err(e) => warn!("plugin watch error: {e}"),
        };

        let mut watcher = match notify::recommended_watcher(handler) {
            Ok(watcher) => watcher,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    "cannot start plugin change watcher: {e}"
                );
                return None;
            }
        };

        if let Err(e) = watcher.watch(&path, RecursiveMode::NonRecursive) {
            warn!(
                path = %path.display(),
                "cannot watch plugin directory: {e}"
            );
            return None;
        }

        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                if server.status().await != ServerStatus::Running {
                    continue;
                }
                if let Err(e) = server.restart(true).await {
                    warn!(server = %server.name(), "automatic restart failed: {e}");
                }
            }
        });

        Some(Self { _watcher: watcher })
    }
}

/// A plugin update is a created or modified jar inside the watched
/// directory. Removals are deliberately not wired up.
// TODO: restart on remove events once a pending-startup status exists to
// close the window where the server reads a half-removed plugin set.
fn is_plugin_update(event: &Event) -> bool {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return false;
    }

    event.paths.iter().any(|path| {
        path.extension().and_then(|ext| ext.to_str()) == Some(PLUGIN_ARTIFACT_EXTENSION)
    })
}
