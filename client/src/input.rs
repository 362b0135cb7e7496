//! Terminal input translation
//!
//! Lines starting with `/` are shortcuts that become protocol commands;
//! anything else is sent to the server untouched.

use shared::{ClientCommand, GameType};

pub const HELP: &str = "\
Commands:
  /register <username> <email> <password>
  /login <username> <password>
  /queue <tictactoe|connect4|checkers>    /leave
  /invite <playerId> <gameType>           /accept <playerId>    /decline <playerId>
  /friend <playerId>    /friend accept <playerId>    /friend decline <playerId>
  /move <data>    /resign
  /chat <playerId> <message>    /history <playerId>
  /ping <latencyMs> <packetLossPct>
  /quit";

/// What to do with one line typed by the user
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Protocol line to send
    Send(String),
    Help,
    /// Malformed shortcut, with a hint
    Usage(&'static str),
    Empty,
}

fn command(command: ClientCommand) -> Input {
    Input::Send(command.to_line())
}

/// Translates one line of user input
pub fn translate(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(shortcut) = line.strip_prefix('/') else {
        return Input::Send(line.to_string());
    };

    let (name, rest) = match shortcut.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (shortcut, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    match (name.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("help", _) => Input::Help,
        ("register", [username, email, password]) => command(ClientCommand::Register {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }),
        ("register", _) => Input::Usage("/register <username> <email> <password>"),
        ("login", [username, password]) => command(ClientCommand::Login {
            username: username.to_string(),
            password: password.to_string(),
        }),
        ("login", _) => Input::Usage("/login <username> <password>"),
        ("queue", [game_type]) => match game_type.parse::<GameType>() {
            Ok(game_type) => command(ClientCommand::Queue { game_type }),
            Err(_) => Input::Usage("/queue <tictactoe|connect4|checkers>"),
        },
        ("queue", _) => Input::Usage("/queue <tictactoe|connect4|checkers>"),
        ("leave", []) => command(ClientCommand::LeaveQueue),
        ("invite", [recipient, game_type]) => match game_type.parse::<GameType>() {
            Ok(game_type) => command(ClientCommand::Invite {
                recipient: recipient.to_string(),
                game_type,
            }),
            Err(_) => Input::Usage("/invite <playerId> <tictactoe|connect4|checkers>"),
        },
        ("invite", _) => Input::Usage("/invite <playerId> <tictactoe|connect4|checkers>"),
        ("accept", [sender]) => command(ClientCommand::AcceptInvite {
            sender: sender.to_string(),
        }),
        ("decline", [sender]) => command(ClientCommand::DeclineInvite {
            sender: sender.to_string(),
        }),
        ("friend", ["accept", sender]) => command(ClientCommand::AcceptFriend {
            sender: sender.to_string(),
        }),
        ("friend", ["decline", sender]) => command(ClientCommand::DeclineFriend {
            sender: sender.to_string(),
        }),
        ("friend", [recipient]) => command(ClientCommand::FriendRequest {
            recipient: recipient.to_string(),
        }),
        ("move", [_, ..]) => command(ClientCommand::Move {
            data: rest.to_string(),
        }),
        ("resign", []) => command(ClientCommand::Resign),
        ("chat", [recipient, _, ..]) => {
            let message = rest[recipient.len()..].trim();
            command(ClientCommand::Chat {
                recipient: recipient.to_string(),
                message: message.to_string(),
            })
        }
        ("history", [other]) => command(ClientCommand::ChatHistory {
            other: other.to_string(),
        }),
        ("ping", [latency, loss]) => match (latency.parse(), loss.parse()) {
            (Ok(latency_ms), Ok(packet_loss)) => command(ClientCommand::Ping {
                latency_ms,
                packet_loss,
            }),
            _ => Input::Usage("/ping <latencyMs> <packetLossPct>"),
        },
        ("quit", []) => command(ClientCommand::Quit),
        _ => Input::Usage("unknown or malformed command, try /help"),
    }
}
