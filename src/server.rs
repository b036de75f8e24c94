//! Minecraft server lifecycle: spawning the jar, graceful stop with a
//! bounded wait, console command injection and the liveness probe.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ServerSection;
use crate::connection::Connection;
use crate::error::ServerError;
use crate::watcher::PluginWatcher;

/// How long a server gets to exit after the `stop` console command before
/// it is forcibly killed.
pub const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Starting,
    Running,
    Stopped,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Starting => "Starting",
            ServerStatus::Running => "Running",
            ServerStatus::Stopped => "Stopped",
        }
    }
}

/// One managed server. Constructed once at daemon startup and kept for
/// the daemon's lifetime; owns at most one live child process at a time.
///
/// All lifecycle transitions go through the process mutex: the plugin
/// watcher may call [`MinecraftServer::restart`] concurrently with a
/// client-driven start or stop on the same server.
pub struct MinecraftServer {
    name: String,
    config: ServerSection,
    stop_timeout: Duration,
    process: Mutex<Option<Child>>,
    watcher: std::sync::Mutex<Option<PluginWatcher>>,
}

impl MinecraftServer {
    pub fn new(name: impl Into<String>, config: ServerSection) -> Self {
        Self {
            name: name.into(),
            config,
            stop_timeout: SERVER_STOP_TIMEOUT,
            process: Mutex::new(None),
            watcher: std::sync::Mutex::new(None),
        }
    }

    /// Overrides the stop escalation timeout.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory watched for plugin updates.
    pub fn plugins_dir(&self) -> PathBuf {
        self.config.path.join("plugins")
    }

    /// Starts the server jar, reporting progress over `connection` when
    /// one is attached. On a launch failure the failure is reported, the
    /// state stays stopped and [`ServerError::Start`] is returned.
    pub async fn start(
        self: &Arc<Self>,
        connection: Option<&mut Connection>,
    ) -> Result<(), ServerError> {
        let mut process = self.process.lock().await;
        self.start_locked(&mut process, connection).await
    }

    /// Sends the graceful `stop` console command and waits up to the stop
    /// timeout for the process to exit, killing it on expiry. Fails with
    /// [`ServerError::NotRunning`] when there is no process handle.
    pub async fn stop(&self, connection: Option<&mut Connection>) -> Result<(), ServerError> {
        let mut process = self.process.lock().await;
        self.stop_locked(&mut process, connection).await
    }

    /// Stop (ignoring a server that is not running) followed by start,
    /// under a single lock acquisition. Used for operator restarts and
    /// for automatic restarts triggered by a plugin update.
    pub async fn restart(self: &Arc<Self>, plugin_update: bool) -> Result<(), ServerError> {
        if plugin_update {
            info!(
                server = %self.name,
                "Detected plugin update, beginning automatic restart."
            );
        }

        let mut process = self.process.lock().await;

        match self.stop_locked(&mut process, None).await {
            Ok(()) | Err(ServerError::NotRunning) => {}
            Err(e) => return Err(e),
        }

        self.start_locked(&mut process, None).await
    }

    /// Behavioral liveness probe: round-trips the no-op `ping` console
    /// command. A hung child that still accepts stdin writes is
    /// indistinguishable from a responsive one here.
    pub async fn status(&self) -> ServerStatus {
        match self.run_command("ping").await {
            Ok(()) => ServerStatus::Running,
            Err(_) => ServerStatus::Stopped,
        }
    }

    /// Writes `command` followed by a newline to the server console.
    pub async fn run_command(&self, command: &str) -> Result<(), ServerError> {
        let mut process = self.process.lock().await;
        write_console_command(&mut process, command).await
    }

    async fn start_locked(
        self: &Arc<Self>,
        process: &mut Option<Child>,
        mut connection: Option<&mut Connection>,
    ) -> Result<(), ServerError> {
        // A handle whose process already exited is stale, not running.
        if let Some(child) = process.as_mut() {
            match child.try_wait() {
                Ok(None) => {
                    let message = format!("Minecraft server \"{}\" already running", self.name);
                    info!("{message}");
                    report(&mut connection, &message).await?;
                    return Ok(());
                }
                Ok(Some(status)) => {
                    debug!(server = %self.name, %status, "clearing exited process handle");
                    *process = None;
                }
                Err(_) => {
                    *process = None;
                }
            }
        }

        let message = format!("Starting Minecraft server \"{}\"...", self.name);
        info!("{message}");
        report(&mut connection, &message).await?;

        match self.spawn_jar() {
            Ok(child) => *process = Some(child),
            Err(e) => {
                let message = format!("Could not start server \"{}\"! Reason: {}", self.name, e);
                warn!("{message}");
                report(&mut connection, &message).await?;
                return Err(ServerError::Start(e));
            }
        }

        let message = format!("Minecraft server \"{}\" started.", self.name);
        info!("{message}");
        report(&mut connection, &message).await?;

        if self.config.restart_on_plugin_update {
            let mut watcher = self.watcher.lock().expect("watcher lock poisoned");
            if watcher.is_none() {
                info!(server = %self.name, "starting plugin change watcher");
                *watcher = PluginWatcher::spawn(Arc::clone(self));
            }
        }

        Ok(())
    }

    async fn stop_locked(
        &self,
        process: &mut Option<Child>,
        mut connection: Option<&mut Connection>,
    ) -> Result<(), ServerError> {
        if process.is_none() {
            let message = format!("Minecraft server \"{}\" not running", self.name);
            report(&mut connection, &message).await?;
            return Err(ServerError::NotRunning);
        }

        let message = format!("Stopping Minecraft server \"{}\"...", self.name);
        info!("{message}");
        report(&mut connection, &message).await?;

        write_console_command(process, "stop").await?;

        let child = match process.as_mut() {
            Some(child) => child,
            None => return Err(ServerError::NotRunning),
        };

        match tokio::time::timeout(self.stop_timeout, child.wait()).await {
            Ok(_) => {
                let message = format!("Minecraft server \"{}\" stopped.", self.name);
                info!("{message}");
                report(&mut connection, &message).await?;
            }
            Err(_) => {
                let message = format!(
                    "Server \"{}\" did not stop within {} seconds. Killing...",
                    self.name,
                    self.stop_timeout.as_secs()
                );
                info!("{message}");
                report(&mut connection, &message).await?;
                child.kill().await?;
            }
        }

        *process = None;
        Ok(())
    }

    fn spawn_jar(&self) -> io::Result<Child> {
        let jar_path = self.config.path.join(&self.config.jar);

        let mut child = Command::new(&self.config.java)
            .args(self.config.opts.split_whitespace())
            .arg("-jar")
            .arg(&jar_path)
            .current_dir(&self.config.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        self.spawn_output_drain(&mut child);
        Ok(child)
    }

    /// Drains the child's captured output into the daemon log. Without a
    /// reader the pipes fill up and wedge a chatty server.
    fn spawn_output_drain(&self, child: &mut Child) {
        if let Some(stdout) = child.stdout.take() {
            let name = self.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %name, "{line}");
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let name = self.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %name, "{line}");
                }
            });
        }
    }
}

/// Writes one console command to the child's stdin. Any failure here,
/// including a pipe broken by an exited child, is a not-running condition.
async fn write_console_command(
    process: &mut Option<Child>,
    command: &str,
) -> Result<(), ServerError> {
    let child = process.as_mut().ok_or(ServerError::NotRunning)?;
    let stdin = child.stdin.as_mut().ok_or(ServerError::NotRunning)?;

    stdin
        .write_all(format!("{command}\n").as_bytes())
        .await
        .map_err(|_| ServerError::NotRunning)?;
    stdin.flush().await.map_err(|_| ServerError::NotRunning)
}

async fn report(
    connection: &mut Option<&mut Connection>,
    message: &str,
) -> Result<(), ServerError> {
    if let Some(connection) = connection.as_deref_mut() {
        connection.send_message(message).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Instant;
    use tempfile::TempDir;

    /// Echoes console commands into `commands.log` and exits on `stop`.
    const FAKE_SERVER: &str = "#!/bin/sh\n\
        while read line; do\n\
        echo \"$line\" >> commands.log\n\
        if [ \"$line\" = stop ]; then exit 0; fi\n\
        done\n";

    /// Logs commands but never exits on its own.
    const STUBBORN_SERVER: &str = "#!/bin/sh\n\
        while read line; do echo \"$line\" >> commands.log; done\n";

    fn fake_server(dir: &TempDir, script: &str) -> Arc<MinecraftServer> {
        let runtime = dir.path().join("fake-java");
        std::fs::write(&runtime, script).unwrap();
        std::fs::set_permissions(&runtime, std::fs::Permissions::from_mode(0o755)).unwrap();

        let section = ServerSection {
            path: dir.path().to_path_buf(),
            jar: "server.jar".to_string(),
            opts: String::new(),
            java: runtime,
            restart_on_plugin_update: false,
        };

        Arc::new(
            MinecraftServer::new("survival", section)
                .with_stop_timeout(Duration::from_millis(200)),
        )
    }

    fn logged_commands(dir: &TempDir) -> Vec<String> {
        let raw = std::fs::read_to_string(dir.path().join("commands.log")).unwrap_or_default();
        raw.lines().map(str::to_string).collect()
    }

    #[tokio::test]
    async fn start_makes_the_server_running() {
        let dir = TempDir::new().unwrap();
        let server = fake_server(&dir, FAKE_SERVER);

        server.start(None).await.unwrap();
        assert_eq!(server.status().await, ServerStatus::Running);

        server.stop(None).await.unwrap();
        assert_eq!(server.status().await, ServerStatus::Stopped);
    }

    #[tokio::test]
    async fn start_failure_leaves_the_server_stopped() {
        let dir = TempDir::new().unwrap();
        let server = fake_server(&dir, FAKE_SERVER);

        let section = ServerSection {
            java: dir.path().join("missing-runtime"),
            ..(*server).config.clone()
        };
        let server = Arc::new(MinecraftServer::new("survival", section));

        let err = server.start(None).await.unwrap_err();
        assert!(matches!(err, ServerError::Start(_)));
        assert_eq!(server.status().await, ServerStatus::Stopped);
    }

    #[tokio::test]
    async fn stop_without_a_handle_is_not_running() {
        let dir = TempDir::new().unwrap();
        let server = fake_server(&dir, FAKE_SERVER);

        let err = server.stop(None).await.unwrap_err();
        assert!(matches!(err, ServerError::NotRunning));
        assert_eq!(server.status().await, ServerStatus::Stopped);
    }

    #[tokio::test]
    async fn graceful_stop_sends_exactly_one_stop_command() {
        let dir = TempDir::new().unwrap();
        let server = fake_server(&dir, FAKE_SERVER);

        server.start(None).await.unwrap();
        server.stop(None).await.unwrap();

        assert_eq!(logged_commands(&dir), vec!["stop"]);
        assert_eq!(server.status().await, ServerStatus::Stopped);
    }

    #[tokio::test]
    async fn unresponsive_server_is_killed_after_the_timeout() {
        let dir = TempDir::new().unwrap();
        let server = fake_server(&dir, STUBBORN_SERVER);

        server.start(None).await.unwrap();

        let started = Instant::now();
        server.stop(None).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(server.status().await, ServerStatus::Stopped);
        assert_eq!(logged_commands(&dir), vec!["stop"]);
    }

    #[tokio::test]
    async fn run_command_reaches_the_console() {
        let dir = TempDir::new().unwrap();
        let server = fake_server(&dir, FAKE_SERVER);

        server.start(None).await.unwrap();
        server.run_command("say hi").await.unwrap();
        server.stop(None).await.unwrap();

        assert_eq!(logged_commands(&dir), vec!["say hi", "stop"]);
    }

    #[tokio::test]
    async fn run_command_without_a_handle_is_not_running() {
        let dir = TempDir::new().unwrap();
        let server = fake_server(&dir, FAKE_SERVER);

        let err = server.run_command("say hi").await.unwrap_err();
        assert!(matches!(err, ServerError::NotRunning));
    }

    #[tokio::test]
    async fn restart_swallows_not_running_and_starts() {
        let dir = TempDir::new().unwrap();
        let server = fake_server(&dir, FAKE_SERVER);

        server.restart(false).await.unwrap();
        assert_eq!(server.status().await, ServerStatus::Running);

        server.stop(None).await.unwrap();
    }

    #[tokio::test]
    async fn second_start_does_not_spawn_again() {
        let dir = TempDir::new().unwrap();
        let server = fake_server(&dir, FAKE_SERVER);

        server.start(None).await.unwrap();
        server.start(None).await.unwrap();

        server.stop(None).await.unwrap();
        // one child, one stop observed
        assert_eq!(logged_commands(&dir), vec!["stop"]);
    }
}
