//! Integration tests for the Awale server
//!
//! These tests run a real server on a loopback port and talk to it over TCP
//! the way a terminal client would.

use server::accounts::AccountStore;
use server::config::ServerConfig;
use server::lobby::Lobby;
use server::network::Server;
use shared::protocol::BoardSnapshot;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

/// Starts a server in the background and returns its address
async fn start_server(config: ServerConfig, accounts: AccountStore) -> SocketAddr {
    let lobby = Lobby::new(&config, accounts);
    let mut server = Server::bind(&config, lobby).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move { server.run().await });
    addr
}

async fn start_default() -> SocketAddr {
    start_server(ServerConfig::ephemeral(), AccountStore::in_memory()).await
}

struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    /// Connects and creates a fresh account with password `pw`.
    /// The server greets with the lowercased name.
    async fn register(addr: SocketAddr, name: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.expect("Enter your username :").await;
        client.send(name).await;
        let lowered = name.to_ascii_lowercase();
        client.expect(&format!("Welcome, {lowered} !")).await;
        client.expect("Please set your password :").await;
        client.send("pw").await;
        client.expect("New account created and logged in !").await;
        client
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    /// Next line, or `None` once the server closed the connection
    async fn recv_or_eof(&mut self) -> Option<String> {
        timeout(WAIT, self.lines.next_line())
            .await
            .expect("timed out waiting for the server")
            .unwrap()
    }

    async fn recv(&mut self) -> String {
        self.recv_or_eof().await.expect("connection closed")
    }

    async fn expect(&mut self, line: &str) {
        assert_eq!(self.recv().await, line);
    }

    async fn board(&mut self) -> BoardSnapshot {
        self.recv().await.parse().unwrap()
    }
}

/// LOGIN TESTS
mod login_tests {
    use super::*;

    /// Tests account creation, reconnection and password checking
    #[tokio::test]
    async fn register_quit_and_log_back_in() {
        let addr = start_default().await;

        let mut alice = TestClient::register(addr, "Alice").await;
        alice.send("QUIT").await;
        assert_eq!(alice.recv_or_eof().await, None);

        let mut again = TestClient::connect(addr).await;
        again.expect("Enter your username :").await;
        again.send("alice").await;
        again.expect("Nice to meet you again, alice !").await;
        again.expect("Enter your password :").await;
        again.send("nope").await;
        again.expect("ERROR : Wrong password").await;
        again.expect("Enter your username again :").await;

        again.send("alice").await;
        again.expect("Nice to meet you again, alice !").await;
        again.expect("Enter your password :").await;
        again.send("pw").await;
        again.expect("Logged in successfully !").await;
    }

    /// Tests that a live username cannot be claimed twice
    #[tokio::test]
    async fn duplicate_login_is_rejected() {
        let addr = start_default().await;
        let _bob = TestClient::register(addr, "bob").await;

        let mut impostor = TestClient::connect(addr).await;
        impostor.expect("Enter your username :").await;
        impostor.send("BOB").await;
        impostor.expect("ERROR : User BOB is already logged in !").await;
        impostor.expect("Enter your username :").await;
    }

    /// Tests that commands are only parsed after authentication
    #[tokio::test]
    async fn commands_after_login() {
        let addr = start_default().await;
        let mut carol = TestClient::register(addr, "carol").await;

        carol.send("LIST").await;
        carol.expect("ONLINE: (no other players online)").await;
        carol.send("JUMP").await;
        carol.expect("ERROR : Unknown command !").await;
        carol.send("MOVE x").await;
        carol.expect("ERROR : Usage: MOVE <0-11> !").await;
    }

    /// Tests that accounts are written to disk and reloaded
    #[tokio::test]
    async fn accounts_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users").join("accounts.txt");
        let config = ServerConfig {
            accounts_path: Some(path.clone()),
            ..ServerConfig::ephemeral()
        };

        let addr = start_server(config.clone(), AccountStore::load(&path).unwrap()).await;
        let mut dave = TestClient::register(addr, "dave").await;
        dave.send("BIO hello").await;
        dave.expect("Bio updated").await;

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "dave:pw:hello:\n");

        let restarted = start_server(config, AccountStore::load(&path).unwrap()).await;
        let mut client = TestClient::connect(restarted).await;
        client.expect("Enter your username :").await;
        client.send("dave").await;
        client.expect("Nice to meet you again, dave !").await;
    }
}

/// GAME FLOW TESTS
mod game_tests {
    use super::*;

    /// Brings two registered clients into a started game
    async fn seated_pair(addr: SocketAddr) -> (TestClient, TestClient) {
        let mut alice = TestClient::register(addr, "alice").await;
        let mut bob = TestClient::register(addr, "bob").await;

        alice.send("CHALLENGE bob").await;
        alice.expect("Challenge sent").await;
        bob.expect("CHALLENGE_FROM alice").await;

        bob.send("ACCEPT alice").await;
        alice.expect("GAME_START alice vs bob").await;
        bob.expect("GAME_START alice vs bob").await;

        (alice, bob)
    }

    /// Tests challenge, readiness and a first move pushed to both players
    #[tokio::test]
    async fn challenge_ready_and_move() {
        let addr = start_default().await;
        let (mut alice, mut bob) = seated_pair(addr).await;

        alice.send("READY").await;
        bob.send("READY").await;
        let start = alice.board().await;
        assert_eq!(bob.board().await, start);
        assert_eq!(start.pits, [4; 12]);
        assert_eq!(start.scores, [0, 0]);

        let pit = start.next * 6 + 1;
        let (mover, waiting) = if start.next == 0 {
            (&mut alice, &mut bob)
        } else {
            (&mut bob, &mut alice)
        };

        waiting.send(&format!("MOVE {}", (1 - start.next) * 6)).await;
        waiting.expect("ERROR : Not your turn !").await;

        mover.send(&format!("MOVE {pit}")).await;
        let after = mover.board().await;
        assert_eq!(waiting.board().await, after);
        assert_eq!(after.pits[pit], 0);
        assert_eq!(after.next, 1 - start.next);
        assert_eq!(after.pits.iter().sum::<u32>(), 48);
    }

    /// Tests that dropping a connection cancels its game for the opponent
    #[tokio::test]
    async fn disconnect_cancels_game() {
        let addr = start_default().await;
        let (mut alice, bob) = seated_pair(addr).await;

        drop(bob);
        alice.expect("GAME_CANCELED bob").await;

        alice.send("GAMES").await;
        alice.expect("ONGOING GAMES:").await;
        alice.expect("  (no active games)").await;
    }

    /// Tests that an observer gets the board and the cancel notice
    #[tokio::test]
    async fn observer_follows_game() {
        let addr = start_default().await;
        let (mut alice, mut bob) = seated_pair(addr).await;
        let mut carol = TestClient::register(addr, "carol").await;

        carol.send("GAMES").await;
        carol.expect("ONGOING GAMES:").await;
        carol.expect("  ID 0: alice vs bob").await;

        carol.send("OBSERVE 0").await;
        carol.expect("Now observing game 0: alice vs bob").await;
        assert_eq!(carol.board().await.pits, [4; 12]);

        alice.send("CANCEL_GAME").await;
        alice.expect("Game canceled. Back to menu.").await;
        bob.expect("GAME_CANCELED alice").await;
        carol.expect("GAME_CANCELED alice").await;
    }
}

/// MESSAGING TESTS
mod messaging_tests {
    use super::*;

    /// Tests chat broadcast and private messages
    #[tokio::test]
    async fn chat_and_private_messages() {
        let addr = start_default().await;
        let mut alice = TestClient::register(addr, "alice").await;
        let mut bob = TestClient::register(addr, "bob").await;
        let mut carol = TestClient::register(addr, "carol").await;

        alice.send("SAY hello everyone").await;
        bob.expect("CHAT alice: hello everyone").await;
        carol.expect("CHAT alice: hello everyone").await;

        bob.send("MESSAGE carol psst").await;
        bob.expect("Message sent").await;
        carol.expect("PM from bob: psst").await;

        // Alice saw nothing of the private message
        alice.send("LIST").await;
        alice.expect("ONLINE: bob carol").await;
    }

    /// Tests the friend request round trip
    #[tokio::test]
    async fn friend_request_accepted() {
        let addr = start_default().await;
        let mut alice = TestClient::register(addr, "alice").await;
        let mut bob = TestClient::register(addr, "bob").await;

        alice.send("FRIEND bob").await;
        alice.expect("Friend request sent").await;
        bob.expect("FRIEND_REQUEST alice").await;

        bob.send("ACCEPT_FRIEND alice").await;
        bob.expect("Friend request accepted !").await;
        alice.expect("FRIEND_ACCEPTED bob").await;

        alice.send("MY_FRIENDS").await;
        alice.expect("MY_FRIENDS: bob").await;
    }
}

/// LIMIT TESTS
mod limit_tests {
    use super::*;

    /// Tests that connections beyond capacity are told and closed
    #[tokio::test]
    async fn server_full_rejects_connection() {
        let config = ServerConfig {
            max_clients: 1,
            ..ServerConfig::ephemeral()
        };
        let addr = start_server(config, AccountStore::in_memory()).await;

        let mut first = TestClient::connect(addr).await;
        first.expect("Enter your username :").await;

        let mut second = TestClient::connect(addr).await;
        second.expect("Server full").await;
        assert_eq!(second.recv_or_eof().await, None);
    }

    /// Tests that an overlong line is refused without dropping the client
    #[tokio::test]
    async fn overlong_line_is_rejected() {
        let addr = start_default().await;
        let mut client = TestClient::connect(addr).await;
        client.expect("Enter your username :").await;

        client.send(&"x".repeat(600)).await;
        client.expect("ERROR : Line too long (max 512 bytes) !").await;

        client.send("erin").await;
        client.expect("Welcome, erin !").await;
    }
}
