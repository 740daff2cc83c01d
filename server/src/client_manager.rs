//! Connected client tracking for the lobby
//!
//! This module owns the per-connection session state:
//! - Login progress (username prompt, password prompt, authenticated)
//! - The seat a client occupies in a game, if any
//! - Privacy mode and pending challenges / friend requests
//! - Capacity enforcement for simultaneous connections
//!
//! Client IDs are never reused, so a late event for a connection that has
//! already been torn down simply finds nothing.

use crate::game::GameId;
use log::info;
use shared::protocol::Username;
use std::collections::BTreeMap;
use std::net::SocketAddr;

pub type ClientId = u32;

/// Pending entries kept per client for challenges and friend requests
pub const MAX_PENDING: usize = 16;

/// Where a connection is in the login dialogue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    AwaitingUsername,
    AwaitingPassword,
    Authenticated,
}

/// A player's place in an active game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seat {
    pub game: GameId,
    /// 0 for the challenger, 1 for the player who accepted
    pub slot: usize,
}

/// Bounded list of usernames, compared case-insensitively, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingSet(Vec<Username>);

impl PendingSet {
    /// Adds `name` unless already present. Returns false when the set is
    /// full and `name` could not be recorded.
    pub fn insert(&mut self, name: Username) -> bool {
        if self.contains(name.as_str()) {
            return true;
        }
        if self.0.len() >= MAX_PENDING {
            return false;
        }
        self.0.push(name);
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|pending| !pending.matches(name));
        self.0.len() != before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|pending| pending.matches(name))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Represents a connected client and their session state
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: ClientId,
    /// Peer address, for logging
    pub addr: SocketAddr,
    pub auth: AuthState,
    /// Set once a valid username was entered; only trusted when authenticated
    pub username: Option<Username>,
    pub seat: Option<Seat>,
    /// When on, only friends may observe this player's games
    pub private_mode: bool,
    /// Players who challenged this client and are awaiting an answer
    pub challenges: PendingSet,
    /// Players who asked to become this client's friend
    pub friend_requests: PendingSet,
}

impl Client {
    /// Creates a client waiting for its username
    pub fn new(id: ClientId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            auth: AuthState::AwaitingUsername,
            username: None,
            seat: None,
            private_mode: false,
            challenges: PendingSet::default(),
            friend_requests: PendingSet::default(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth == AuthState::Authenticated
    }

    /// The username of an authenticated client
    pub fn name(&self) -> Option<&Username> {
        self.username.as_ref().filter(|_| self.is_authenticated())
    }

    pub fn in_game(&self) -> bool {
        self.seat.is_some()
    }

    /// Drops any half-finished login and asks for a username again
    pub fn reset_login(&mut self) {
        self.auth = AuthState::AwaitingUsername;
        self.username = None;
    }
}

/// Manages all connected clients
///
/// Enforces the connection limit and answers the lookups the lobby needs:
/// who is online, and which connection belongs to a username.
#[derive(Debug)]
pub struct ClientManager {
    /// Connected clients indexed by their unique ID, in connection order
    clients: BTreeMap<ClientId, Client>,
    /// Next available client ID for new connections
    next_client_id: ClientId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Client IDs start from 1 and increment for each new connection.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: BTreeMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a new connection
    ///
    /// Returns None if the server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<ClientId> {
        if self.is_full() {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client, returning its final state for cleanup
    pub fn remove_client(&mut self, client_id: &ClientId) -> Option<Client> {
        let client = self.clients.remove(client_id)?;
        match client.name() {
            Some(name) => info!("Client {} ({}) disconnected", client.id, name),
            None => info!("Client {} disconnected", client.id),
        }
        Some(client)
    }

    pub fn get(&self, client_id: ClientId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn get_mut(&mut self, client_id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(&client_id)
    }

    /// Finds the authenticated connection using `name`, ignoring case
    pub fn find_by_username(&self, name: &str) -> Option<ClientId> {
        self.authenticated()
            .find(|client| client.name().is_some_and(|n| n.matches(name)))
            .map(|client| client.id)
    }

    pub fn is_logged_in(&self, name: &str) -> bool {
        self.find_by_username(name).is_some()
    }

    /// Authenticated clients in connection order
    pub fn authenticated(&self) -> impl Iterator<Item = &Client> {
        self.clients.values().filter(|client| client.is_authenticated())
    }

    /// Withdraws every challenge and friend request sent by `name`
    pub fn forget_requests_from(&mut self, name: &str) {
        for client in self.clients.values_mut() {
            client.challenges.remove(name);
            client.friend_requests.remove(name);
        }
    }

    /// Username of an authenticated client
    pub fn username_of(&self, client_id: ClientId) -> Option<&Username> {
        self.get(client_id).and_then(Client::name)
    }

    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    /// Adds an authenticated client named `name`
    pub(crate) fn login(manager: &mut ClientManager, name: &str) -> ClientId {
        let id = manager.add_client(test_addr()).unwrap();
        let client = manager.get_mut(id).unwrap();
        client.username = Some(Username::parse(name).unwrap());
        client.auth = AuthState::Authenticated;
        id
    }

    #[test]
    fn test_client_creation() {
        let addr = test_addr();
        let client = Client::new(1, addr);

        assert_eq!(client.id, 1);
        assert_eq!(client.addr, addr);
        assert_eq!(client.auth, AuthState::AwaitingUsername);
        assert!(client.name().is_none());
        assert!(!client.in_game());
        assert!(!client.private_mode);
    }

    #[test]
    fn test_name_requires_authentication() {
        let mut client = Client::new(1, test_addr());
        client.username = Some(Username::parse("alice").unwrap());
        client.auth = AuthState::AwaitingPassword;
        assert!(client.name().is_none());

        client.auth = AuthState::Authenticated;
        assert_eq!(client.name().unwrap().as_str(), "alice");

        client.reset_login();
        assert_eq!(client.auth, AuthState::AwaitingUsername);
        assert!(client.username.is_none());
    }

    #[test]
    fn test_client_manager_creation() {
        let manager = ClientManager::new(5);
        assert_eq!(manager.max_clients, 5);
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_add_multiple_clients() {
        let mut manager = ClientManager::new(3);

        let client_id1 = manager.add_client(test_addr()).unwrap();
        let client_id2 = manager.add_client(test_addr2()).unwrap();

        assert_eq!(client_id1, 1);
        assert_eq!(client_id2, 2);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        assert!(manager.add_client(test_addr()).is_some());
        assert!(manager.is_full());
        assert!(manager.add_client(test_addr2()).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut manager = ClientManager::new(1);

        let first = manager.add_client(test_addr()).unwrap();
        manager.remove_client(&first).unwrap();
        let second = manager.add_client(test_addr()).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_remove_nonexistent_client() {
        let mut manager = ClientManager::new(2);
        assert!(manager.remove_client(&999).is_none());
    }

    #[test]
    fn test_find_by_username() {
        let mut manager = ClientManager::new(4);
        let alice = login(&mut manager, "alice");
        let pending = manager.add_client(test_addr2()).unwrap();
        manager.get_mut(pending).unwrap().username = Some(Username::parse("bob").unwrap());

        assert_eq!(manager.find_by_username("ALICE"), Some(alice));
        assert!(manager.is_logged_in("alice"));
        assert_eq!(manager.find_by_username("bob"), None);
        assert_eq!(manager.authenticated().count(), 1);
        assert_eq!(manager.username_of(alice).unwrap().as_str(), "alice");
        assert!(manager.username_of(pending).is_none());
    }

    #[test]
    fn test_pending_set() {
        let mut pending = PendingSet::default();
        assert!(pending.insert(Username::parse("bob").unwrap()));
        assert!(pending.insert(Username::parse("bob").unwrap()));
        assert_eq!(pending.len(), 1);
        assert!(pending.contains("BOB"));

        for i in 1..MAX_PENDING {
            assert!(pending.insert(Username::parse(&format!("p{i}")).unwrap()));
        }
        assert!(!pending.insert(Username::parse("late").unwrap()));
        assert!(pending.insert(Username::parse("bob").unwrap()));

        assert!(pending.remove("Bob"));
        assert!(!pending.remove("bob"));
        assert_eq!(pending.len(), MAX_PENDING - 1);
    }

    #[test]
    fn test_forget_requests_from() {
        let mut manager = ClientManager::new(4);
        let bob = login(&mut manager, "bob");
        let carol = login(&mut manager, "carol");
        for id in [bob, carol] {
            let client = manager.get_mut(id).unwrap();
            client.challenges.insert(Username::parse("alice").unwrap());
            client.friend_requests.insert(Username::parse("alice").unwrap());
            client.friend_requests.insert(Username::parse("dave").unwrap());
        }

        manager.forget_requests_from("alice");

        for id in [bob, carol] {
            let client = manager.get(id).unwrap();
            assert!(client.challenges.is_empty());
            assert!(!client.friend_requests.contains("alice"));
            assert!(client.friend_requests.contains("dave"));
        }
    }
}
