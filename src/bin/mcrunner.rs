use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use mcrunner::client::Controller;
use mcrunner::config::DEFAULT_CONFIG_PATH;
use mcrunner::protocol::CommandPacket;

#[derive(Parser)]
#[command(name = "mcrunner")]
#[command(version)]
#[command(about = "Control Minecraft servers through a running mcrunnerd", long_about = None)]
struct Cli {
    /// Path to the mcrunner configuration file.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the status of every configured server
    Status,
    /// Start a server
    Start { server: String },
    /// Stop a server
    Stop { server: String },
    /// Restart a server
    Restart { server: String },
    /// Send a console command to a server
    Command { server: String, command: String },
}

impl Commands {
    fn into_packet(self) -> CommandPacket {
        match self {
            Commands::Status => CommandPacket::Status,
            Commands::Start { server } => CommandPacket::Start { server },
            Commands::Stop { server } => CommandPacket::Stop { server },
            Commands::Restart { server } => CommandPacket::Restart { server },
            Commands::Command { server, command } => CommandPacket::Command { server, command },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let controller = match Controller::from_config(&cli.config) {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    match controller.send_packet(&cli.command.into_packet()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
