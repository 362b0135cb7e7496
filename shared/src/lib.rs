use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub type PlayerId = String;
pub type SessionId = String;

/// Separator between fields of a protocol line
pub const FIELD_SEPARATOR: char = '|';
pub const QUEUE_SEARCHING: &str = "Searching for a random opponent";
pub const SERVER_FULL: &str = "Server full";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("{command} is missing field `{field}`")]
    MissingField {
        command: &'static str,
        field: &'static str,
    },
    #[error("unknown game type: {0}")]
    UnknownGameType(String),
    #[error("invalid number for {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GameType {
    TicTacToe,
    Connect4,
    Checkers,
}

impl GameType {
    pub const ALL: [GameType; 3] = [GameType::TicTacToe, GameType::Connect4, GameType::Checkers];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::TicTacToe => "TICTACTOE",
            GameType::Connect4 => "CONNECT4",
            GameType::Checkers => "CHECKERS",
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TICTACTOE" | "TIC_TAC_TOE" => Ok(GameType::TicTacToe),
            "CONNECT4" | "CONNECT_FOUR" => Ok(GameType::Connect4),
            "CHECKERS" => Ok(GameType::Checkers),
            _ => Err(ProtocolError::UnknownGameType(s.trim().to_string())),
        }
    }
}

/// Where a player currently is in the lobby/matchmaking/game lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerState {
    Lobby,
    Matchmaking,
    InGame,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlayerState::Lobby => "LOBBY",
            PlayerState::Matchmaking => "MATCHMAKING",
            PlayerState::InGame => "IN_GAME",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

/// Commands sent from a client to the server, one per line
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Register {
        username: String,
        email: String,
        password: String,
    },
    Login {
        username: String,
        password: String,
    },
    Queue {
        game_type: GameType,
    },
    LeaveQueue,
    Invite {
        recipient: PlayerId,
        game_type: GameType,
    },
    AcceptInvite {
        sender: PlayerId,
    },
    DeclineInvite {
        sender: PlayerId,
    },
    FriendRequest {
        recipient: PlayerId,
    },
    AcceptFriend {
        sender: PlayerId,
    },
    DeclineFriend {
        sender: PlayerId,
    },
    Move {
        data: String,
    },
    Resign,
    Chat {
        recipient: PlayerId,
        message: String,
    },
    ChatHistory {
        other: PlayerId,
    },
    Ping {
        latency_ms: u64,
        packet_loss: f64,
    },
    Quit,
}

/// Splits a line into at most `n` fields; the last field keeps any separators
struct Fields<'a> {
    command: &'static str,
    parts: std::str::SplitN<'a, char>,
}

impl<'a> Fields<'a> {
    fn next(&mut self, field: &'static str) -> Result<&'a str, ProtocolError> {
        match self.parts.next() {
            Some(value) if !value.trim().is_empty() => Ok(value.trim()),
            _ => Err(ProtocolError::MissingField {
                command: self.command,
                field,
            }),
        }
    }

    fn rest(&mut self) -> String {
        self.parts.next().unwrap_or_default().to_string()
    }
}

impl ClientCommand {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        if line.trim().is_empty() {
            return Err(ProtocolError::Empty);
        }

        let (keyword, body) = match line.split_once(FIELD_SEPARATOR) {
            Some((keyword, body)) => (keyword.trim().to_ascii_uppercase(), body),
            None => (line.trim().to_ascii_uppercase(), ""),
        };

        let fields = |command: &'static str, n: usize| Fields {
            command,
            parts: body.splitn(n, FIELD_SEPARATOR),
        };

        let command = match keyword.as_str() {
            "REGISTER" => {
                let mut f = fields("REGISTER", 3);
                ClientCommand::Register {
                    username: f.next("username")?.to_string(),
                    email: f.next("email")?.to_string(),
                    password: f.next("password")?.to_string(),
                }
            }
            "LOGIN" => {
                let mut f = fields("LOGIN", 2);
                ClientCommand::Login {
                    username: f.next("username")?.to_string(),
                    password: f.next("password")?.to_string(),
                }
            }
            "QUEUE" => ClientCommand::Queue {
                game_type: fields("QUEUE", 1).next("gameType")?.parse()?,
            },
            "LEAVE_QUEUE" => ClientCommand::LeaveQueue,
            "INVITE" => {
                let mut f = fields("INVITE", 2);
                ClientCommand::Invite {
                    recipient: f.next("recipientId")?.to_string(),
                    game_type: f.next("gameType")?.parse()?,
                }
            }
            "ACCEPT_INVITE" => ClientCommand::AcceptInvite {
                sender: fields("ACCEPT_INVITE", 1).next("senderId")?.to_string(),
            },
            "DECLINE_INVITE" => ClientCommand::DeclineInvite {
                sender: fields("DECLINE_INVITE", 1).next("senderId")?.to_string(),
            },
            "FRIEND_REQUEST" => ClientCommand::FriendRequest {
                recipient: fields("FRIEND_REQUEST", 1).next("recipientId")?.to_string(),
            },
            "ACCEPT_FRIEND" => ClientCommand::AcceptFriend {
                sender: fields("ACCEPT_FRIEND", 1).next("senderId")?.to_string(),
            },
            "DECLINE_FRIEND" => ClientCommand::DeclineFriend {
                sender: fields("DECLINE_FRIEND", 1).next("senderId")?.to_string(),
            },
            "MOVE" => ClientCommand::Move {
                // Move payloads are opaque and may contain separators
                data: fields("MOVE", 1).next("moveData")?.to_string(),
            },
            "RESIGN" => ClientCommand::Resign,
            "CHAT" => {
                let mut f = fields("CHAT", 2);
                ClientCommand::Chat {
                    recipient: f.next("recipientId")?.to_string(),
                    message: f.rest(),
                }
            }
            "CHAT_HISTORY" => ClientCommand::ChatHistory {
                other: fields("CHAT_HISTORY", 1).next("otherId")?.to_string(),
            },
            "PING" => {
                let mut f = fields("PING", 2);
                let latency = f.next("latencyMs")?;
                let loss = f.next("packetLoss")?;
                ClientCommand::Ping {
                    latency_ms: latency.parse().map_err(|_| ProtocolError::InvalidNumber {
                        field: "latencyMs",
                        value: latency.to_string(),
                    })?,
                    packet_loss: loss.parse().map_err(|_| ProtocolError::InvalidNumber {
                        field: "packetLoss",
                        value: loss.to_string(),
                    })?,
                }
            }
            "QUIT" => ClientCommand::Quit,
            _ => return Err(ProtocolError::UnknownCommand(keyword)),
        };

        Ok(command)
    }

    /// Renders the command as a protocol line (without the trailing newline)
    pub fn to_line(&self) -> String {
        match self {
            ClientCommand::Register {
                username,
                email,
                password,
            } => format!("REGISTER|{}|{}|{}", username, email, password),
            ClientCommand::Login { username, password } => {
                format!("LOGIN|{}|{}", username, password)
            }
            ClientCommand::Queue { game_type } => format!("QUEUE|{}", game_type),
            ClientCommand::LeaveQueue => "LEAVE_QUEUE".to_string(),
            ClientCommand::Invite {
                recipient,
                game_type,
            } => format!("INVITE|{}|{}", recipient, game_type),
            ClientCommand::AcceptInvite { sender } => format!("ACCEPT_INVITE|{}", sender),
            ClientCommand::DeclineInvite { sender } => format!("DECLINE_INVITE|{}", sender),
            ClientCommand::FriendRequest { recipient } => format!("FRIEND_REQUEST|{}", recipient),
            ClientCommand::AcceptFriend { sender } => format!("ACCEPT_FRIEND|{}", sender),
            ClientCommand::DeclineFriend { sender } => format!("DECLINE_FRIEND|{}", sender),
            ClientCommand::Move { data } => format!("MOVE|{}", data),
            ClientCommand::Resign => "RESIGN".to_string(),
            ClientCommand::Chat { recipient, message } => format!("CHAT|{}|{}", recipient, message),
            ClientCommand::ChatHistory { other } => format!("CHAT_HISTORY|{}", other),
            ClientCommand::Ping {
                latency_ms,
                packet_loss,
            } => format!("PING|{}|{}", latency_ms, packet_loss),
            ClientCommand::Quit => "QUIT".to_string(),
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    Winner(PlayerId),
    Draw,
    /// The named player forfeited (resigned, ran out of time or left)
    Forfeit(PlayerId),
    Abandoned,
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameResult::Winner(id) => write!(f, "WINNER:{}", id),
            GameResult::Draw => f.write_str("DRAW"),
            GameResult::Forfeit(id) => write!(f, "FORFEIT:{}", id),
            GameResult::Abandoned => f.write_str("ABANDONED"),
        }
    }
}

/// Notifications sent from the server to a client
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Welcome {
        player_id: PlayerId,
        username: String,
    },
    Error {
        reason: String,
    },
    QueueStatus {
        status: String,
    },
    QueueLeft,
    MatchFound {
        session_id: SessionId,
        opponent_id: PlayerId,
        opponent_username: String,
        game_type: GameType,
    },
    Move {
        player_id: PlayerId,
        data: String,
    },
    YourTurn,
    NowYourTurn,
    OpponentsTurn,
    InvalidMove {
        reason: String,
    },
    GameOver {
        session_id: SessionId,
        result: GameResult,
    },
    Invite {
        sender_id: PlayerId,
        sender_username: String,
        game_type: GameType,
    },
    InviteDeclined {
        recipient_id: PlayerId,
    },
    FriendRequest {
        sender_id: PlayerId,
        sender_username: String,
    },
    FriendAdded {
        friend_id: PlayerId,
        friend_username: String,
    },
    FriendDeclined {
        recipient_id: PlayerId,
    },
    Chat {
        sender_username: String,
        content: String,
    },
    /// Header of a chat history reply; `count` CHAT_ENTRY lines follow
    ChatHistory {
        count: usize,
    },
    ChatEntry {
        line: String,
    },
    ConnectionHealth {
        latency_ms: u64,
        packet_loss: f64,
        classification: String,
    },
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Welcome {
                player_id,
                username,
            } => write!(f, "WELCOME|{}|{}", player_id, username),
            ServerMessage::Error { reason } => write!(f, "ERROR|{}", reason),
            ServerMessage::QueueStatus { status } => write!(f, "QUEUE_STATUS: {}", status),
            ServerMessage::QueueLeft => f.write_str("QUEUE_LEFT"),
            ServerMessage::MatchFound {
                session_id,
                opponent_id,
                opponent_username,
                game_type,
            } => write!(
                f,
                "MATCH_FOUND|{}|{}|{}|{}",
                session_id, opponent_id, opponent_username, game_type
            ),
            ServerMessage::Move { player_id, data } => write!(f, "Move:{}:{}", player_id, data),
            ServerMessage::YourTurn => f.write_str("Your turn"),
            ServerMessage::NowYourTurn => f.write_str("Now it's your turn"),
            ServerMessage::OpponentsTurn => f.write_str("Opponents turn"),
            ServerMessage::InvalidMove { reason } => write!(f, "INVALID_MOVE|{}", reason),
            ServerMessage::GameOver { session_id, result } => {
                write!(f, "GAME_OVER|{}|{}", session_id, result)
            }
            ServerMessage::Invite {
                sender_id,
                sender_username,
                game_type,
            } => write!(f, "INVITE|{}|{}|{}", sender_id, sender_username, game_type),
            ServerMessage::InviteDeclined { recipient_id } => {
                write!(f, "INVITE_DECLINED|{}", recipient_id)
            }
            ServerMessage::FriendRequest {
                sender_id,
                sender_username,
            } => write!(f, "FRIEND_REQUEST|{}|{}", sender_id, sender_username),
            ServerMessage::FriendAdded {
                friend_id,
                friend_username,
            } => write!(f, "FRIEND_ADDED|{}|{}", friend_id, friend_username),
            ServerMessage::FriendDeclined { recipient_id } => {
                write!(f, "FRIEND_DECLINED|{}", recipient_id)
            }
            ServerMessage::Chat {
                sender_username,
                content,
            } => write!(f, "CHAT|{}|{}", sender_username, content),
            ServerMessage::ChatHistory { count } => write!(f, "CHAT_HISTORY|{}", count),
            ServerMessage::ChatEntry { line } => write!(f, "CHAT_ENTRY|{}", line),
            ServerMessage::ConnectionHealth {
                latency_ms,
                packet_loss,
                classification,
            } => write!(
                f,
                "\rLatency:{}ms | Packet Loss:{}% | {}",
                latency_ms, packet_loss, classification
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_type_parsing() {
        assert_eq!("tictactoe".parse::<GameType>(), Ok(GameType::TicTacToe));
        assert_eq!(" CONNECT4 ".parse::<GameType>(), Ok(GameType::Connect4));
        assert_eq!("Checkers".parse::<GameType>(), Ok(GameType::Checkers));
        assert_eq!(
            "chess".parse::<GameType>(),
            Err(ProtocolError::UnknownGameType("chess".to_string()))
        );
    }

    #[test]
    fn test_parse_login() {
        let cmd = ClientCommand::parse("LOGIN|alice|secret\r\n").unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Login {
                username: "alice".to_string(),
                password: "secret".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_keyword_is_case_insensitive() {
        assert_eq!(
            ClientCommand::parse("queue|checkers").unwrap(),
            ClientCommand::Queue {
                game_type: GameType::Checkers
            }
        );
        assert_eq!(ClientCommand::parse("leave_queue").unwrap(), ClientCommand::LeaveQueue);
    }

    #[test]
    fn test_parse_move_keeps_separators() {
        let cmd = ClientCommand::parse("MOVE|2,3-3,4|extra").unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Move {
                data: "2,3-3,4|extra".to_string()
            }
        );
    }

    #[test]
    fn test_parse_chat_allows_empty_message() {
        let cmd = ClientCommand::parse("CHAT|b|").unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Chat {
                recipient: "b".to_string(),
                message: String::new(),
            }
        );

        let cmd = ClientCommand::parse("CHAT|b|hi | there").unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Chat {
                recipient: "b".to_string(),
                message: "hi | there".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_ping() {
        let cmd = ClientCommand::parse("PING|43|1.5").unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Ping {
                latency_ms: 43,
                packet_loss: 1.5,
            }
        );

        let err = ClientCommand::parse("PING|fast|1").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidNumber {
                field: "latencyMs",
                value: "fast".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(ClientCommand::parse("   "), Err(ProtocolError::Empty));
        assert_eq!(
            ClientCommand::parse("DANCE|now"),
            Err(ProtocolError::UnknownCommand("DANCE".to_string()))
        );
        assert_eq!(
            ClientCommand::parse("INVITE|bob"),
            Err(ProtocolError::MissingField {
                command: "INVITE",
                field: "gameType",
            })
        );
        assert!(matches!(
            ClientCommand::parse("QUEUE|go"),
            Err(ProtocolError::UnknownGameType(_))
        ));
    }

    #[test]
    fn test_command_line_is_parseable() {
        let cmd = ClientCommand::Invite {
            recipient: "bob".to_string(),
            game_type: GameType::Connect4,
        };
        assert_eq!(cmd.to_line(), "INVITE|bob|CONNECT4");
        assert_eq!(ClientCommand::parse(&cmd.to_line()).unwrap(), cmd);
    }

    #[test]
    fn test_match_found_format() {
        let msg = ServerMessage::MatchFound {
            session_id: "s1".to_string(),
            opponent_id: "b".to_string(),
            opponent_username: "bob".to_string(),
            game_type: GameType::TicTacToe,
        };
        assert_eq!(msg.to_string(), "MATCH_FOUND|s1|b|bob|TICTACTOE");
    }

    #[test]
    fn test_turn_and_queue_strings() {
        assert_eq!(ServerMessage::YourTurn.to_string(), "Your turn");
        assert_eq!(ServerMessage::NowYourTurn.to_string(), "Now it's your turn");
        assert_eq!(ServerMessage::OpponentsTurn.to_string(), "Opponents turn");
        assert_eq!(ServerMessage::QueueLeft.to_string(), "QUEUE_LEFT");
        assert_eq!(
            ServerMessage::QueueStatus {
                status: QUEUE_SEARCHING.to_string()
            }
            .to_string(),
            "QUEUE_STATUS: Searching for a random opponent"
        );
        assert_eq!(
            ServerMessage::Move {
                player_id: "a".to_string(),
                data: "1,1".to_string()
            }
            .to_string(),
            "Move:a:1,1"
        );
    }

    #[test]
    fn test_connection_health_line() {
        let msg = ServerMessage::ConnectionHealth {
            latency_ms: 43,
            packet_loss: 1.0,
            classification: "Connection is strong!".to_string(),
        };
        assert_eq!(
            msg.to_string(),
            "\rLatency:43ms | Packet Loss:1% | Connection is strong!"
        );
    }

    #[test]
    fn test_game_over_format() {
        let msg = ServerMessage::GameOver {
            session_id: "s9".to_string(),
            result: GameResult::Forfeit("a".to_string()),
        };
        assert_eq!(msg.to_string(), "GAME_OVER|s9|FORFEIT:a");
        assert_eq!(GameResult::Draw.to_string(), "DRAW");
    }

    #[test]
    fn test_chat_history_is_one_line_per_message() {
        let header = ServerMessage::ChatHistory { count: 2 }.to_string();
        let entry = ServerMessage::ChatEntry {
            line: "2024-01-01 10:00:00 - A: one".to_string(),
        }
        .to_string();
        assert_eq!(header, "CHAT_HISTORY|2");
        assert_eq!(entry, "CHAT_ENTRY|2024-01-01 10:00:00 - A: one");
        assert!(!header.contains('\n') && !entry.contains('\n'));
    }
}
