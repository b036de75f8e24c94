//! Daemon process bookkeeping: pid file, background spawn, shutdown
//! signalling and privilege drop.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::info;

use crate::config::Config;

/// Pid file with a liveness check, so a stale file left by a crashed
/// daemon does not block the next start.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records the current process id.
    pub fn write(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, std::process::id().to_string())
            .with_context(|| format!("could not write pid file {}", self.path.display()))?;
        info!(path = %self.path.display(), "pid file written");
        Ok(())
    }

    pub fn read(&self) -> Option<u32> {
        let raw = fs::read_to_string(&self.path).ok()?;
        raw.trim().parse().ok()
    }

    /// The recorded pid, when that process is still alive.
    pub fn is_running(&self) -> Option<u32> {
        self.read().filter(|pid| process_exists(*pid))
    }

    pub fn remove(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("could not remove pid file {}", self.path.display()))?;
        }
        Ok(())
    }
}

/// Existence probe via the null signal.
pub fn process_exists(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Spawns `mcrunnerd run` detached from the current process with stdio
/// redirected to the daemon log file, then waits for it to come up.
pub async fn spawn_daemon(config: &Config, config_path: &Path) -> Result<()> {
    let pid_file = PidFile::new(&config.mcrunnerd.pidfile);
    if let Some(pid) = pid_file.is_running() {
        bail!("mcrunnerd already running with PID {pid}");
    }

    let exe = std::env::current_exe().context("could not determine current executable path")?;

    let log_path = &config.mcrunnerd.logfile;
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("could not open daemon log file {}", log_path.display()))?;

    Command::new(&exe)
        .arg("run")
        .arg("--config")
        .arg(config_path)
        .stdin(Stdio::null())
        .stdout(Stdio::from(
            log_file
                .try_clone()
                .context("could not clone log file handle")?,
        ))
        .stderr(Stdio::from(log_file))
        .spawn()
        .with_context(|| format!("could not spawn daemon: {}", exe.display()))?;

    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if pid_file.is_running().is_some() {
            println!("mcrunnerd started");
            return Ok(());
        }
    }

    bail!(
        "mcrunnerd did not start within 5 seconds, check {}",
        log_path.display()
    )
}

/// Asks a running daemon to shut down (SIGTERM) and waits for it to
/// exit. Shutting down stops every running server, which can take up to
/// the per-server stop timeout, so the wait here is bounded and only
/// warns when the daemon outlives it.
pub async fn stop_daemon(config: &Config) -> Result<()> {
    let pid_file = PidFile::new(&config.mcrunnerd.pidfile);
    let Some(pid) = pid_file.is_running() else {
        println!("mcrunnerd is not running");
        return Ok(());
    };

    kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
        .with_context(|| format!("could not signal mcrunnerd (PID {pid})"))?;

    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if !process_exists(pid) {
            println!("mcrunnerd stopped");
            return Ok(());
        }
    }

    println!("mcrunnerd (PID {pid}) is still stopping; running servers get up to the stop timeout to exit");
    Ok(())
}

/// Switches to the configured unprivileged user. No-op when the daemon
/// already runs as that user; requires root otherwise.
pub fn drop_privileges(user: &str) -> Result<()> {
    use nix::unistd::{getuid, setuid, User};

    let pwent = User::from_name(user)
        .with_context(|| format!("could not look up user {user}"))?
        .ok_or_else(|| anyhow::anyhow!("user not found for setuid: {user}"))?;

    let current = getuid();
    if current == pwent.uid {
        return Ok(());
    }
    if !current.is_root() {
        bail!("cannot setuid to {user} unless running as root");
    }

    setuid(pwent.uid).with_context(|| format!("could not switch to user {user}"))?;
    info!(user, "dropped privileges");
    Ok(())
}
