//! Control command grammar shared by the daemon and the client.
//!
//! A request payload is `<action>`, `<action>|+|<server>` or
//! `<action>|+|<server>|+|<free text>`. The delimiter is a fixed
//! three-character sequence that is not expected to appear in server
//! names. Known limitation: a delimiter inside the free-text payload of a
//! `command` request truncates the payload at the next delimiter.

pub const COMMAND_DELIMITER: &str = "|+|";

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPacket {
    Status,
    Start { server: String },
    Stop { server: String },
    Restart { server: String },
    Command { server: String, command: String },
}

impl CommandPacket {
    /// Decodes a request payload.
    ///
    /// Unknown actions and actions missing their arguments decode to
    /// `None`; the daemon answers those with no response at all.
    pub fn parse(data: &str) -> Option<Self> {
        let parts: Vec<&str> = data.split(COMMAND_DELIMITER).collect();

        match parts[0] {
            "status" => Some(Self::Status),
            "start" => parts.get(1).map(|server| Self::Start {
                server: server.to_string(),
            }),
            "stop" => parts.get(1).map(|server| Self::Stop {
                server: server.to_string(),
            }),
            "restart" => parts.get(1).map(|server| Self::Restart {
                server: server.to_string(),
            }),
            "command" => match (parts.get(1), parts.get(2)) {
                (Some(server), Some(command)) => Some(Self::Command {
                    server: server.to_string(),
                    command: command.to_string(),
                }),
                _ => None,
            },
            _ => None,
        }
    }

    /// Encodes the packet into its wire form.
    pub fn encode(&self) -> String {
        match self {
            Self::Status => "status".to_string(),
            Self::Start { server } => format!("start{COMMAND_DELIMITER}{server}"),
            Self::Stop { server } => format!("stop{COMMAND_DELIMITER}{server}"),
            Self::Restart { server } => format!("restart{COMMAND_DELIMITER}{server}"),
            Self::Command { server, command } => {
                format!("command{COMMAND_DELIMITER}{server}{COMMAND_DELIMITER}{command}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status() {
        assert_eq!(CommandPacket::parse("status"), Some(CommandPacket::Status));
    }

    #[test]
    fn parse_server_actions() {
        assert_eq!(
            CommandPacket::parse("start|+|survival"),
            Some(CommandPacket::Start {
                server: "survival".to_string()
            })
        );
        assert_eq!(
            CommandPacket::parse("stop|+|survival"),
            Some(CommandPacket::Stop {
                server: "survival".to_string()
            })
        );
        assert_eq!(
            CommandPacket::parse("restart|+|survival"),
            Some(CommandPacket::Restart {
                server: "survival".to_string()
            })
        );
    }

    #[test]
    fn parse_command_with_payload() {
        assert_eq!(
            CommandPacket::parse("command|+|survival|+|say hello world"),
            Some(CommandPacket::Command {
                server: "survival".to_string(),
                command: "say hello world".to_string()
            })
        );
    }

    #[test]
    fn delimiter_inside_payload_truncates_it() {
        assert_eq!(
            CommandPacket::parse("command|+|survival|+|say hi|+|there"),
            Some(CommandPacket::Command {
                server: "survival".to_string(),
                command: "say hi".to_string()
            })
        );
    }

    #[test]
    fn unknown_action_yields_nothing() {
        assert_eq!(CommandPacket::parse("bogus"), None);
        assert_eq!(CommandPacket::parse(""), None);
    }

    #[test]
    fn missing_arguments_yield_nothing() {
        assert_eq!(CommandPacket::parse("start"), None);
        assert_eq!(CommandPacket::parse("command|+|survival"), None);
    }

    #[test]
    fn encode_round_trips() {
        let packets = [
            CommandPacket::Status,
            CommandPacket::Start {
                server: "survival".to_string(),
            },
            CommandPacket::Stop {
                server: "survival".to_string(),
            },
            CommandPacket::Restart {
                server: "survival".to_string(),
            },
            CommandPacket::Command {
                server: "survival".to_string(),
                command: "say hi".to_string(),
            },
        ];

        for packet in packets {
            assert_eq!(CommandPacket::parse(&packet.encode()), Some(packet));
        }
    }
}
