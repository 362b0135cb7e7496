//! Client network layer: one TCP connection, line in, line out

use crate::input::{translate, Input, HELP};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;

/// Renders a server line for the terminal
pub fn describe(line: &str) -> String {
    if let Some(rest) = line.strip_prefix("MATCH_FOUND|") {
        let fields: Vec<&str> = rest.split('|').collect();
        if let [session_id, opponent_id, opponent_username, game_type] = fields.as_slice() {
            return format!(
                "Match found: {} vs {} ({}), session {}",
                game_type, opponent_username, opponent_id, session_id
            );
        }
    }
    if let Some(rest) = line.strip_prefix("Move:") {
        if let Some((player_id, data)) = rest.split_once(':') {
            return format!("{} played {}", player_id, data);
        }
    }
    if let Some(rest) = line.strip_prefix("WELCOME|") {
        if let Some((player_id, username)) = rest.split_once('|') {
            return format!("Logged in as {} (id {})", username, player_id);
        }
    }
    if let Some(count) = line.strip_prefix("CHAT_HISTORY|") {
        return format!("Chat History ({} messages):", count);
    }
    if let Some(entry) = line.strip_prefix("CHAT_ENTRY|") {
        return format!("  {}", entry);
    }
    if let Some(reason) = line.strip_prefix("ERROR|") {
        return format!("Error: {}", reason);
    }
    line.to_string()
}

pub struct Client {
    server_addr: String,
    stream: TcpStream,
}

impl Client {
    pub async fn connect(server_addr: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = TcpStream::connect(server_addr).await?;
        info!("Connected to {}", server_addr);
        Ok(Client {
            server_addr: server_addr.to_string(),
            stream,
        })
    }

    async fn send_line(writer: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await
    }

    /// Forwards stdin to the server and prints server lines until either side closes
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let (read_half, mut write_half) = self.stream.into_split();
        let mut server_lines = BufReader::new(read_half).lines();
        let mut user_lines = BufReader::new(tokio::io::stdin()).lines();

        println!("{}", HELP);

        loop {
            tokio::select! {
                line = server_lines.next_line() => match line? {
                    Some(line) => println!("{}", describe(&line)),
                    None => {
                        info!("Server {} closed the connection", self.server_addr);
                        break;
                    }
                },
                line = user_lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    match translate(&line) {
                        Input::Send(command) => {
                            Self::send_line(&mut write_half, &command).await?;
                            if command == "QUIT" {
                                break;
                            }
                        }
                        Input::Help => println!("{}", HELP),
                        Input::Usage(hint) => warn!("Usage: {}", hint),
                        Input::Empty => {}
                    }
                }
            }
        }

        let _ = write_half.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_describe_known_lines() {
        assert_eq!(
            describe("MATCH_FOUND|s1|p2|bob|CHECKERS"),
            "Match found: CHECKERS vs bob (p2), session s1"
        );
        assert_eq!(describe("Move:p1:2,1-3,2"), "p1 played 2,1-3,2");
        assert_eq!(describe("WELCOME|p1|alice"), "Logged in as alice (id p1)");
        assert_eq!(describe("ERROR|Server full"), "Error: Server full");
        assert_eq!(describe("CHAT_HISTORY|2"), "Chat History (2 messages):");
        assert_eq!(
            describe("CHAT_ENTRY|2024-01-01 10:00:00 - jo: hi"),
            "  2024-01-01 10:00:00 - jo: hi"
        );
        assert_eq!(describe("Opponents turn"), "Opponents turn");
    }

    #[tokio::test]
    async fn test_connect_and_send_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let client = Client::connect(&addr).await.unwrap();
        let (socket, _) = listener.accept().await.unwrap();

        let (_, mut writer) = client.stream.into_split();
        Client::send_line(&mut writer, "QUEUE|TICTACTOE").await.unwrap();

        let mut lines = BufReader::new(socket).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("QUEUE|TICTACTOE"));
    }
}
