//! Performance benchmarks for matchmaking, sessions and chat

use server::chat::{Chat, ChatHandler};
use server::client_handler::ClientHandler;
use server::config::ServerConfig;
use server::network::GameServer;
use server::player::Player;
use shared::{ClientCommand, GameType};
use std::sync::Arc;
use std::time::Instant;

fn populated_server(count: usize) -> Arc<GameServer> {
    let server = GameServer::with_config(ServerConfig::default());
    for i in 0..count {
        let id = format!("p{}", i);
        let handler = Arc::new(ClientHandler::detached(&id));
        server.register_player(Player::new(id.clone(), id, ""), Some(handler));
    }
    server
}

/// Benchmarks random matchmaking across all game types
#[test]
fn benchmark_matchmaking_throughput() {
    let players = 3_000;
    let server = populated_server(players);

    let start = Instant::now();
    for i in 0..players {
        let game_type = GameType::ALL[i % GameType::ALL.len()];
        assert!(server.join_random_matchmaking(&format!("p{}", i), game_type));
    }
    let duration = start.elapsed();

    println!(
        "Matchmaking: {} joins in {:?} ({:.2} μs/join)",
        players,
        duration,
        duration.as_micros() as f64 / players as f64
    );

    assert_eq!(server.session_count(), players / 2);
    assert!(server.matchmaking().is_empty());

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks complete tic-tac-toe games played through the server
#[test]
fn benchmark_session_moves() {
    let games = 500;
    let server = populated_server(games * 2);
    let moves = [("0,0", 0), ("1,0", 1), ("0,1", 0), ("1,1", 1), ("0,2", 0)];

    let start = Instant::now();
    for g in 0..games {
        let seats = [format!("p{}", 2 * g), format!("p{}", 2 * g + 1)];
        server
            .match_players(&seats[0], &seats[1], GameType::TicTacToe)
            .unwrap();
        for (data, seat) in moves {
            assert!(server.submit_move(&seats[seat], data));
        }
    }
    let duration = start.elapsed();

    println!(
        "Sessions: {} games ({} moves) in {:?}",
        games,
        games * moves.len(),
        duration
    );

    assert_eq!(server.session_count(), 0);

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks chat history eviction and formatting
#[test]
fn benchmark_chat_history() {
    let iterations = 50_000;
    let mut handler = ChatHandler::new();

    let start = Instant::now();
    for i in 0..iterations {
        handler.add_chat(Chat::new(Some(&format!("message {}", i)), "alice", "bob"));
    }
    let history = handler.get_formatted_history();
    let duration = start.elapsed();

    println!("Chat: {} inserts in {:?}", iterations, duration);

    assert_eq!(handler.len(), 5);
    assert!(history.contains(&format!("message {}", iterations - 1)));

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks inbound command parsing
#[test]
fn benchmark_command_parsing() {
    let lines = [
        "LOGIN|alice|secret",
        "QUEUE|CHECKERS",
        "MOVE|2,1-3,2",
        "CHAT|p1|good game",
        "PING|43|1.5",
    ];
    let iterations = 100_000;

    let start = Instant::now();
    for i in 0..iterations {
        let _ = ClientCommand::parse(lines[i % lines.len()]).unwrap();
    }
    let duration = start.elapsed();

    println!(
        "Parsing: {} lines in {:?} ({:.2} ns/line)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}
