//! Configuration shared by the daemon and the client.
//!
//! One TOML file describes the daemon (log file, pid file, optional
//! run-as user), the control socket, and every managed server. Unknown
//! keys are rejected rather than ignored so a typo in a server section
//! fails loudly at startup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/mcrunner/mcrunner.toml";

const DEFAULT_PID_FILE: &str = "/tmp/mcrunner.pid";
const DEFAULT_JAVA: &str = "/usr/bin/java";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub mcrunnerd: DaemonSection,
    pub mcrunner: ControlSection,
    #[serde(default, rename = "server")]
    pub servers: BTreeMap<String, ServerSection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonSection {
    /// Daemon log destination.
    pub logfile: PathBuf,
    #[serde(default = "default_pid_file")]
    pub pidfile: PathBuf,
    /// User the daemon switches to after startup, when set.
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlSection {
    /// Path of the unix socket the daemon listens on.
    pub url: PathBuf,
}

/// One `[server.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Server working directory; the jar and the plugins directory live here.
    pub path: PathBuf,
    pub jar: String,
    /// Whitespace-separated JVM options.
    pub opts: String,
    #[serde(default = "default_java")]
    pub java: PathBuf,
    #[serde(default)]
    pub restart_on_plugin_update: bool,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn default_pid_file() -> PathBuf {
    PathBuf::from(DEFAULT_PID_FILE)
}

fn default_java() -> PathBuf {
    PathBuf::from(DEFAULT_JAVA)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TEST_CONFIG: &str = r#"
[mcrunnerd]
logfile = "/var/log/mcrunner/mcrunnerd.log"

[mcrunner]
url = "/tmp/mcrunner.sock"

[server.survival]
path = "/path/to/server1"
jar = "spigot.jar"
opts = "-Xms1G -Xmx8G"
restart_on_plugin_update = false

[server.creative]
path = "/path/to/server2"
jar = "craftbukkit.jar"
opts = "-Xms8G -Xmx16G"
restart_on_plugin_update = true
"#;

    #[test]
    fn parses_every_server_section() {
        let config: Config = toml::from_str(TEST_CONFIG).unwrap();

        assert_eq!(
            config.mcrunnerd.logfile,
            PathBuf::from("/var/log/mcrunner/mcrunnerd.log")
        );
        assert_eq!(config.mcrunner.url, PathBuf::from("/tmp/mcrunner.sock"));
        assert_eq!(config.servers.len(), 2);

        let survival = &config.servers["survival"];
        assert_eq!(survival.path, PathBuf::from("/path/to/server1"));
        assert_eq!(survival.jar, "spigot.jar");
        assert_eq!(survival.opts, "-Xms1G -Xmx8G");
        assert!(!survival.restart_on_plugin_update);

        let creative = &config.servers["creative"];
        assert_eq!(creative.jar, "craftbukkit.jar");
        assert!(creative.restart_on_plugin_update);
    }

    #[test]
    fn defaults_are_applied() {
        let config: Config = toml::from_str(TEST_CONFIG).unwrap();

        assert_eq!(config.mcrunnerd.pidfile, PathBuf::from(DEFAULT_PID_FILE));
        assert_eq!(config.mcrunnerd.user, None);
        assert_eq!(config.servers["survival"].java, PathBuf::from(DEFAULT_JAVA));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let raw = format!("{TEST_CONFIG}\n[server.survival2]\npath = \"/p\"\njar = \"a.jar\"\nopts = \"\"\nbogus = 1\n");
        assert!(toml::from_str::<Config>(&raw).is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Config::load(Path::new("/nonexistent/mcrunner.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TEST_CONFIG.as_bytes()).unwrap();
        file.flush().unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.servers.len(), 2);
    }
}
