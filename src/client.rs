//! Client-side controller for a running mcrunnerd instance.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::net::UnixStream;

use crate::config::Config;
use crate::connection::Connection;
use crate::error::ConfigError;
use crate::protocol::CommandPacket;

pub struct Controller {
    socket_path: PathBuf,
}

impl Controller {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Reads the control socket path from the shared configuration file.
    pub fn from_config(config_path: &Path) -> Result<Self, ConfigError> {
        let config = Config::load(config_path)?;
        Ok(Self::new(config.mcrunner.url))
    }

    /// Sends one command packet and prints every response message until
    /// the daemon signals end of response. A daemon that is not running
    /// is reported on stdout, not treated as an error.
    pub async fn send_packet(&self, packet: &CommandPacket) -> Result<()> {
        let stream = match UnixStream::connect(&self.socket_path).await {
            Ok(stream) => stream,
            Err(_) => {
                println!("Could not connect to socket - is mcrunnerd running?");
                return Ok(());
            }
        };

        let mut connection = Connection::new(stream);

        match connection.send_message(&packet.encode()).await {
            Err(e) => println!("Error sending mcrunnerd package: {e}"),
            Ok(()) => {
                while let Some(message) = connection.receive_message().await? {
                    if message.is_empty() {
                        break;
                    }
                    println!("{message}");
                }
            }
        }

        connection.close().await?;
        Ok(())
    }
}
