//! Integration tests for the game server over real TCP connections
//!
//! Each test binds its own listener on an ephemeral port and talks to it
//! with plain line-based sockets, exactly like the terminal client does.

use client::input::{translate, Input};
use server::config::ServerConfig;
use server::network::GameServer;
use shared::{GameType, PlayerState};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

const READ_TIMEOUT: Duration = Duration::from_secs(2);

async fn start_server(config: ServerConfig) -> (Arc<GameServer>, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server = GameServer::with_config(config);

    let runner = Arc::clone(&server);
    tokio::spawn(async move { runner.run(listener).await });
    (server, addr)
}

struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: &str) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        TestClient {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    /// Sends what the terminal client would send for `input`
    async fn type_line(&mut self, input: &str) {
        match translate(input) {
            Input::Send(line) => self.send(&line).await,
            other => panic!("{:?} is not a command", other),
        }
    }

    async fn next_line(&mut self) -> Option<String> {
        timeout(READ_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for server")
            .unwrap()
    }

    /// Reads until a line satisfies `pred`, returning it
    async fn expect(&mut self, pred: impl Fn(&str) -> bool) -> String {
        loop {
            match self.next_line().await {
                Some(line) if pred(&line) => return line,
                Some(_) => continue,
                None => panic!("connection closed before expected line"),
            }
        }
    }

    /// Registers `username` and returns the assigned player id
    async fn register(&mut self, username: &str) -> String {
        self.send(&format!("REGISTER|{}|{}@example.com|pw", username, username))
            .await;
        let welcome = self.expect(|l| l.starts_with("WELCOME|")).await;
        welcome.split('|').nth(1).unwrap().to_string()
    }
}

/// ACCOUNT AND PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    #[tokio::test]
    async fn register_then_login_again() {
        let (server, addr) = start_server(ServerConfig::default()).await;

        let mut alice = TestClient::connect(&addr).await;
        let id = alice.register("alice").await;
        assert!(id.starts_with('p'));

        alice.send("QUIT").await;
        assert!(alice.next_line().await.is_none());
        sleep(Duration::from_millis(50)).await;
        assert!(server.player(&id).is_none());

        let mut again = TestClient::connect(&addr).await;
        again.type_line("/login alice pw").await;
        let welcome = again.expect(|l| l.starts_with("WELCOME|")).await;
        assert_eq!(welcome, format!("WELCOME|{}|alice", id));

        server.stop();
    }

    #[tokio::test]
    async fn bad_lines_keep_connection_open() {
        let (server, addr) = start_server(ServerConfig::default()).await;
        let mut client = TestClient::connect(&addr).await;

        client.send("NONSENSE|1").await;
        assert!(client.next_line().await.unwrap().starts_with("ERROR|"));
        client.send("QUEUE|TICTACTOE").await;
        assert_eq!(client.next_line().await.as_deref(), Some("ERROR|Not logged in"));
        client.send("LOGIN|ghost|pw").await;
        assert!(client.next_line().await.unwrap().starts_with("ERROR|"));

        client.register("carol").await;
        server.stop();
    }

    #[tokio::test]
    async fn ping_reports_connection_health() {
        let (server, addr) = start_server(ServerConfig::default()).await;
        let mut client = TestClient::connect(&addr).await;
        client.register("dave").await;

        client.type_line("/ping 43 1").await;
        let line = client.expect(|l| l.contains("Latency:")).await;
        assert_eq!(line, "\rLatency:43ms | Packet Loss:1% | Connection is strong!");

        client.send("PING|500|9").await;
        let line = client.expect(|l| l.contains("Latency:")).await;
        assert!(line.ends_with("WARNING: Network connection is unstable!"));
        server.stop();
    }

    #[tokio::test]
    async fn server_full_rejects_extra_connections() {
        let mut config = ServerConfig::default();
        config.max_clients = 1;
        let (server, addr) = start_server(config).await;

        let mut first = TestClient::connect(&addr).await;
        first.register("erin").await;

        let mut second = TestClient::connect(&addr).await;
        assert_eq!(second.next_line().await.as_deref(), Some("ERROR|Server full"));
        assert!(second.next_line().await.is_none());
        server.stop();
    }
}

/// MATCHMAKING AND GAMEPLAY TESTS
mod game_tests {
    use super::*;

    #[tokio::test]
    async fn random_queue_match_and_move_relay() {
        let (server, addr) = start_server(ServerConfig::default()).await;
        let mut a = TestClient::connect(&addr).await;
        let mut b = TestClient::connect(&addr).await;
        let a_id = a.register("anna").await;
        let b_id = b.register("ben").await;

        a.type_line("/queue tictactoe").await;
        a.expect(|l| l == "QUEUE_STATUS: Searching for a random opponent").await;
        b.send("QUEUE|TICTACTOE").await;

        let found_a = a.expect(|l| l.starts_with("MATCH_FOUND|")).await;
        let found_b = b.expect(|l| l.starts_with("MATCH_FOUND|")).await;
        let session_id = found_a.split('|').nth(1).unwrap().to_string();
        assert_eq!(found_a, format!("MATCH_FOUND|{}|{}|ben|TICTACTOE", session_id, b_id));
        assert_eq!(found_b, format!("MATCH_FOUND|{}|{}|anna|TICTACTOE", session_id, a_id));

        assert_eq!(a.next_line().await.as_deref(), Some("Your turn"));
        assert_eq!(b.next_line().await.as_deref(), Some("Opponents turn"));
        assert_eq!(server.player(&a_id).unwrap().state, PlayerState::InGame);

        a.type_line("/move 1,1").await;
        let relay = format!("Move:{}:1,1", a_id);
        assert_eq!(a.next_line().await, Some(relay.clone()));
        assert_eq!(a.next_line().await.as_deref(), Some("Opponents turn"));
        assert_eq!(b.next_line().await, Some(relay));
        assert_eq!(b.next_line().await.as_deref(), Some("Now it's your turn"));

        b.send("RESIGN").await;
        let over = format!("GAME_OVER|{}|FORFEIT:{}", session_id, b_id);
        a.expect(|l| l == over).await;
        assert_eq!(server.player(&b_id).unwrap().state, PlayerState::Lobby);
        server.stop();
    }

    #[tokio::test]
    async fn different_game_types_do_not_match() {
        let (server, addr) = start_server(ServerConfig::default()).await;
        let mut a = TestClient::connect(&addr).await;
        let mut b = TestClient::connect(&addr).await;
        let a_id = a.register("fay").await;
        let b_id = b.register("gus").await;

        a.send("QUEUE|CONNECT4").await;
        b.send("QUEUE|CHECKERS").await;
        a.expect(|l| l.starts_with("QUEUE_STATUS")).await;
        b.expect(|l| l.starts_with("QUEUE_STATUS")).await;

        assert_eq!(server.session_count(), 0);
        assert_eq!(server.player(&a_id).unwrap().state, PlayerState::Matchmaking);
        assert_eq!(server.player(&b_id).unwrap().state, PlayerState::Matchmaking);

        a.type_line("/leave").await;
        a.expect(|l| l == "QUEUE_LEFT").await;
        assert_eq!(server.matchmaking().queued(GameType::Checkers), vec![b_id]);
        server.stop();
    }

    #[tokio::test]
    async fn invite_decline_and_accept() {
        let (server, addr) = start_server(ServerConfig::default()).await;
        let mut a = TestClient::connect(&addr).await;
        let mut b = TestClient::connect(&addr).await;
        let a_id = a.register("hal").await;
        let b_id = b.register("ivy").await;

        a.send(&format!("INVITE|{}|CHECKERS", b_id)).await;
        b.expect(|l| l == format!("INVITE|{}|hal|CHECKERS", a_id)).await;
        b.type_line(&format!("/decline {}", a_id)).await;
        a.expect(|l| l == format!("INVITE_DECLINED|{}", b_id)).await;
        assert_eq!(server.session_count(), 0);

        a.send(&format!("INVITE|{}|CONNECT4", b_id)).await;
        b.expect(|l| l.starts_with("INVITE|")).await;
        b.type_line(&format!("/accept {}", a_id)).await;
        let found = b.expect(|l| l.starts_with("MATCH_FOUND|")).await;
        assert!(found.ends_with(&format!("|{}|hal|CONNECT4", a_id)));
        a.expect(|l| l.starts_with("MATCH_FOUND|")).await;
        assert_eq!(server.session_count(), 1);
        server.stop();
    }

    #[tokio::test]
    async fn friends_and_chat() {
        let (server, addr) = start_server(ServerConfig::default()).await;
        let mut a = TestClient::connect(&addr).await;
        let mut b = TestClient::connect(&addr).await;
        let a_id = a.register("jo").await;
        let b_id = b.register("kim").await;

        a.type_line(&format!("/friend {}", b_id)).await;
        b.expect(|l| l == format!("FRIEND_REQUEST|{}|jo", a_id)).await;
        b.type_line(&format!("/friend accept {}", a_id)).await;
        a.expect(|l| l == format!("FRIEND_ADDED|{}|kim", b_id)).await;
        assert!(server.player(&a_id).unwrap().is_friend(&b_id));

        a.type_line(&format!("/chat {} hello there", b_id)).await;
        b.expect(|l| l == "CHAT|jo|hello there").await;

        b.send(&format!("CHAT_HISTORY|{}", a_id)).await;
        b.expect(|l| l == "CHAT_HISTORY|1").await;
        let entry = b.next_line().await.unwrap();
        assert!(entry.starts_with("CHAT_ENTRY|"));
        assert!(entry.ends_with(" - jo: hello there"));

        // The reply ends after the announced entries; the next line is fresh
        b.send("CHAT_HISTORY|nobody").await;
        assert_eq!(b.next_line().await.as_deref(), Some("ERROR|Unknown player"));
        server.stop();
    }
}

/// CONNECTION LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn reconnect_delivers_missed_messages() {
        let (server, addr) = start_server(ServerConfig::default()).await;
        let mut a = TestClient::connect(&addr).await;
        let mut b = TestClient::connect(&addr).await;
        let a_id = a.register("lea").await;
        b.register("max").await;

        drop(a);
        sleep(Duration::from_millis(100)).await;
        assert!(server.player(&a_id).is_some());

        b.send(&format!("CHAT|{}|are you there?", a_id)).await;
        sleep(Duration::from_millis(50)).await;

        let mut a = TestClient::connect(&addr).await;
        a.send("LOGIN|lea|pw").await;
        assert_eq!(a.next_line().await.as_deref(), Some("CHAT|max|are you there?"));
        assert_eq!(a.next_line().await, Some(format!("WELCOME|{}|lea", a_id)));
        server.stop();
    }

    #[tokio::test]
    async fn expired_players_are_purged() {
        let mut config = ServerConfig::default().with_reconnect_window(Duration::from_millis(50));
        config.sweep_interval = Duration::from_millis(20);
        let (server, addr) = start_server(config).await;

        let mut a = TestClient::connect(&addr).await;
        let a_id = a.register("ned").await;
        drop(a);

        sleep(Duration::from_millis(300)).await;
        assert!(server.player(&a_id).is_none());
        server.stop();
    }

    #[tokio::test]
    async fn stop_closes_connections() {
        let (server, addr) = start_server(ServerConfig::default()).await;
        let mut a = TestClient::connect(&addr).await;
        a.register("olga").await;
        let mut anonymous = TestClient::connect(&addr).await;
        sleep(Duration::from_millis(50)).await;

        server.stop();
        server.stop();
        assert!(a.next_line().await.is_none());
        assert!(anonymous.next_line().await.is_none());
        sleep(Duration::from_millis(50)).await;
        assert!(!server.is_running());
    }
}
