//! Session logic behind the TCP front end
//!
//! The lobby owns every piece of mutable server state (connections, games
//! and accounts) and is driven one event at a time by the network loop:
//! - `connect` when a socket is accepted
//! - `handle_line` for each complete line a client sends
//! - `reject_overlong` when a client exceeds the line limit
//! - `disconnect` when a socket closes or is dropped
//!
//! Nothing here performs I/O on sockets. Replies and pushes are queued on an
//! [`Outbox`] and delivered by the caller.

use crate::accounts::{validate_password, AccountStore, Bio};
use crate::client_manager::{AuthState, ClientId, ClientManager};
use crate::config::ServerConfig;
use crate::error::{AccountError, CommandError};
use crate::game::GameManager;
use crate::outbox::Outbox;
use crate::social;
use crate::utils::truncate_chars;
use log::{debug, info, warn};
use shared::line::MAX_LINE_LEN;
use shared::protocol::{Command, Notice, Username, MAX_CHAT_LEN, MAX_PRIVATE_MESSAGE_LEN};
use std::net::SocketAddr;

pub const USERNAME_PROMPT: &str = "Enter your username :";
pub const HELP_TEXT: &str = "Commands: LIST, GAMES, CHALLENGE, ACCEPT, REFUSE, MOVE, READY, \
    CANCEL_GAME, OBSERVE, OUT_OBSERVER, SAY, MESSAGE, BIO, SHOWBIO, MY_FRIENDS, FRIEND, \
    ACCEPT_FRIEND, DECLINE_FRIEND, UNFRIEND, PRIVATE, QUIT.";

#[derive(Debug)]
pub struct Lobby {
    clients: ClientManager,
    games: GameManager,
    accounts: AccountStore,
}

impl Lobby {
    pub fn new(config: &ServerConfig, accounts: AccountStore) -> Self {
        Self::from_parts(
            ClientManager::new(config.max_clients),
            GameManager::new(config.max_games(), config.games_dir.clone()),
            accounts,
        )
    }

    pub fn from_parts(clients: ClientManager, games: GameManager, accounts: AccountStore) -> Self {
        Self {
            clients,
            games,
            accounts,
        }
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn games(&self) -> &GameManager {
        &self.games
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    /// Registers a new connection and prompts for a username. Returns
    /// `None` when every connection slot is taken.
    pub fn connect(&mut self, addr: SocketAddr, out: &mut Outbox) -> Option<ClientId> {
        let client_id = self.clients.add_client(addr)?;
        out.send(client_id, USERNAME_PROMPT);
        Some(client_id)
    }

    /// Processes one line from `client_id`
    pub fn handle_line(&mut self, client_id: ClientId, line: &str, out: &mut Outbox) {
        let Some(auth) = self.clients.get(client_id).map(|client| client.auth) else {
            debug!("Dropping line from unknown client {}", client_id);
            return;
        };

        match auth {
            AuthState::AwaitingUsername => self.login_username(client_id, line, out),
            AuthState::AwaitingPassword => self.login_password(client_id, line, out),
            AuthState::Authenticated => self.dispatch(client_id, line, out),
        }
    }

    pub fn reject_overlong(&self, client_id: ClientId, out: &mut Outbox) {
        if self.clients.get(client_id).is_some() {
            debug!("Client {} sent an overlong line", client_id);
            out.send(
                client_id,
                format!("ERROR : Line too long (max {MAX_LINE_LEN} bytes) !"),
            );
        }
    }

    /// Tears a session down: the client stops observing, any game it plays
    /// is canceled and requests it sent or received are dropped. Calling
    /// this for an unknown or already removed client does nothing.
    pub fn disconnect(&mut self, client_id: ClientId, out: &mut Outbox) {
        let Some(client) = self.clients.get(client_id) else {
            return;
        };
        let in_game = client.in_game();
        let name = client.name().cloned();

        self.games.leave_observer(client_id);
        if in_game {
            if let Err(e) = self.games.cancel(&mut self.clients, client_id, out) {
                warn!("Cleanup of client {} game failed: {}", client_id, e);
            }
        }
        self.clients.remove_client(&client_id);

        // A later session under the same name must not inherit them
        if let Some(name) = name {
            self.clients.forget_requests_from(name.as_str());
        }
    }

    fn login_username(&mut self, client_id: ClientId, line: &str, out: &mut Outbox) {
        let raw = line.trim();
        if raw.is_empty() {
            out.send(client_id, USERNAME_PROMPT);
            return;
        }

        let username = match Username::parse(raw) {
            Ok(username) => username,
            Err(e) => {
                debug!("Client {} offered an invalid username: {}", client_id, e);
                out.send(
                    client_id,
                    "ERROR : Invalid username (alphanumeric, - and _ only, max 15 chars)",
                );
                out.send(client_id, USERNAME_PROMPT);
                return;
            }
        };

        if self.clients.is_logged_in(username.as_str()) {
            out.send(
                client_id,
                format!("ERROR : User {raw} is already logged in !"),
            );
            out.send(client_id, USERNAME_PROMPT);
            return;
        }

        let greeting = if self.accounts.exists(username.as_str()) {
            format!("Nice to meet you again, {username} !\nEnter your password :")
        } else {
            format!("Welcome, {username} !\nPlease set your password :")
        };
        out.send(client_id, greeting);

        if let Some(client) = self.clients.get_mut(client_id) {
            client.username = Some(username);
            client.auth = AuthState::AwaitingPassword;
        }
    }

    fn login_password(&mut self, client_id: ClientId, password: &str, out: &mut Outbox) {
        let Some(username) = self
            .clients
            .get(client_id)
            .and_then(|client| client.username.clone())
        else {
            self.restart_login(client_id);
            out.send(client_id, USERNAME_PROMPT);
            return;
        };

        let password_ok = self
            .accounts
            .find(username.as_str())
            .map(|account| account.check_password(password));

        let reply = match password_ok {
            Some(false) => {
                info!("Wrong password for {} from client {}", username, client_id);
                self.restart_login(client_id);
                out.send(client_id, "ERROR : Wrong password\nEnter your username again :");
                return;
            }
            Some(true) => "Logged in successfully !",
            None => {
                if let Err(reason) = validate_password(password) {
                    out.send(client_id, format!("ERROR : {reason} !"));
                    out.send(client_id, "Please set your password :");
                    return;
                }
                if self.clients.is_logged_in(username.as_str()) {
                    self.reject_second_session(client_id, out);
                    return;
                }
                match self.accounts.create(username.clone(), password) {
                    Ok(_) => {}
                    Err(AccountError::StoreFull) => {
                        warn!("Account storage full, cannot register {}", username);
                        self.restart_login(client_id);
                        out.send(client_id, "ERROR : Account storage full !");
                        out.send(client_id, USERNAME_PROMPT);
                        return;
                    }
                    Err(e) => {
                        warn!("Cannot register {}: {}", username, e);
                        self.restart_login(client_id);
                        out.send(client_id, USERNAME_PROMPT);
                        return;
                    }
                }
                "New account created and logged in !"
            }
        };

        // Another connection may have finished logging in with this name
        // while this one was typing its password.
        if self.clients.is_logged_in(username.as_str()) {
            self.reject_second_session(client_id, out);
            return;
        }

        if let Some(client) = self.clients.get_mut(client_id) {
            client.auth = AuthState::Authenticated;
        }
        info!("Client {} logged in as {}", client_id, username);
        out.send(client_id, reply);
    }

    fn reject_second_session(&mut self, client_id: ClientId, out: &mut Outbox) {
        self.restart_login(client_id);
        out.send(client_id, "ERROR : Already logged in on another session !");
        out.send(client_id, USERNAME_PROMPT);
    }

    fn restart_login(&mut self, client_id: ClientId) {
        if let Some(client) = self.clients.get_mut(client_id) {
            client.reset_login();
        }
    }

    fn dispatch(&mut self, client_id: ClientId, line: &str, out: &mut Outbox) {
        let Some(me) = self.clients.username_of(client_id).cloned() else {
            return;
        };

        let result = Command::parse(line)
            .map_err(CommandError::from)
            .and_then(|command| self.execute(client_id, &me, command, out));

        if let Err(e) = result {
            debug!("{} -> {:?}", me, e);
            out.send(client_id, e);
        }
    }

    fn execute(
        &mut self,
        client_id: ClientId,
        me: &Username,
        command: Command,
        out: &mut Outbox,
    ) -> Result<(), CommandError> {
        match command {
            Command::Help => out.send(client_id, HELP_TEXT),
            Command::List => self.list(client_id, out),
            Command::Games => self.list_games(client_id, out),
            Command::Observe(id) => {
                self.games
                    .observe(&self.clients, &self.accounts, client_id, id, out)?;
            }
            Command::OutObserver => {
                self.games
                    .leave_observer(client_id)
                    .ok_or(CommandError::NotObserving)?;
                out.send(client_id, "Left observation mode. Back to menu.");
            }
            Command::Challenge(target) => self.challenge(client_id, me, &target, out)?,
            Command::Accept(target) => self.accept(client_id, &target, out)?,
            Command::Refuse(target) => self.refuse(client_id, me, &target, out)?,
            Command::Move(pit) => self.games.play(&mut self.clients, client_id, pit, out)?,
            Command::CancelGame => {
                self.games.cancel(&mut self.clients, client_id, out)?;
                out.send(client_id, "Game canceled. Back to menu.");
            }
            Command::Ready => self.games.ready(&self.clients, client_id, out)?,
            Command::Bio(text) => {
                let bio = Bio::normalize(&text).ok_or(CommandError::EmptyBio)?;
                self.accounts.set_bio(me.as_str(), bio)?;
                out.send(client_id, "Bio updated");
            }
            Command::ShowBio(target) => {
                let account = self
                    .accounts
                    .find(&target)
                    .ok_or(CommandError::UserNotFound)?;
                let bio = if account.bio.is_empty() {
                    "(no bio)"
                } else {
                    account.bio.as_str()
                };
                out.send(
                    client_id,
                    format!(
                        "\n--- BIO of {} ---\n{}\n-----------------",
                        account.username, bio
                    ),
                );
            }
            Command::Friend(target) => {
                social::send_request(&mut self.clients, &self.accounts, client_id, &target, out)?
            }
            Command::Unfriend(target) => {
                social::unfriend(&self.clients, &mut self.accounts, client_id, &target, out)?
            }
            Command::AcceptFriend(target) => social::accept_request(
                &mut self.clients,
                &mut self.accounts,
                client_id,
                &target,
                out,
            )?,
            Command::DeclineFriend(target) => {
                social::decline_request(&mut self.clients, client_id, &target, out)?
            }
            Command::MyFriends => {
                social::list_friends(&self.clients, &self.accounts, client_id, out)?
            }
            Command::Private(on) => {
                if let Some(client) = self.clients.get_mut(client_id) {
                    client.private_mode = on;
                }
                out.send(
                    client_id,
                    if on {
                        "Private mode ON: only your friends may observe your games."
                    } else {
                        "Private mode OFF: everyone may observe your games."
                    },
                );
            }
            Command::Message { to, body } => {
                if me.matches(&to) {
                    return Err(CommandError::SelfTarget("message"));
                }
                let target = self
                    .clients
                    .find_by_username(&to)
                    .ok_or(CommandError::UserNotFound)?;
                out.send(
                    target,
                    Notice::PrivateMessage {
                        from: me.clone(),
                        body: truncate_chars(&body, MAX_PRIVATE_MESSAGE_LEN).to_string(),
                    },
                );
                out.send(client_id, "Message sent");
            }
            Command::Say(text) => {
                let recipients: Vec<ClientId> = self
                    .clients
                    .authenticated()
                    .map(|client| client.id)
                    .filter(|&id| id != client_id)
                    .collect();
                out.send_all(
                    recipients,
                    Notice::Chat {
                        from: me.clone(),
                        text: truncate_chars(&text, MAX_CHAT_LEN).to_string(),
                    },
                );
            }
            Command::Quit => {
                info!("{} quit", me);
                self.disconnect(client_id, out);
                out.close(client_id);
            }
        }
        Ok(())
    }

    /// `LIST`: authenticated players who are not seated in a game
    fn list(&self, client_id: ClientId, out: &mut Outbox) {
        let names: Vec<&str> = self
            .clients
            .authenticated()
            .filter(|client| client.id != client_id && !client.in_game())
            .filter_map(|client| client.name().map(Username::as_str))
            .collect();

        if names.is_empty() {
            out.send(client_id, "ONLINE: (no other players online)");
        } else {
            out.send(client_id, format!("ONLINE: {}", names.join(" ")));
        }
    }

    fn list_games(&self, client_id: ClientId, out: &mut Outbox) {
        let mut listing = String::from("ONGOING GAMES:");
        for game in self.games.active() {
            listing.push_str(&format!(
                "\n  ID {}: {} vs {}",
                game.id, game.names[0], game.names[1]
            ));
        }
        if self.games.active_count() == 0 {
            listing.push_str("\n  (no active games)");
        }
        out.send(client_id, listing);
    }

    fn challenge(
        &mut self,
        client_id: ClientId,
        me: &Username,
        target: &str,
        out: &mut Outbox,
    ) -> Result<(), CommandError> {
        if self.in_game(client_id) {
            return Err(CommandError::InGame("challenge"));
        }
        if me.matches(target) {
            return Err(CommandError::SelfTarget("challenge"));
        }
        let target_id = self
            .clients
            .find_by_username(target)
            .ok_or(CommandError::NoSuchUser)?;
        let target_client = self
            .clients
            .get_mut(target_id)
            .ok_or(CommandError::NoSuchUser)?;
        let target_name = target_client
            .name()
            .cloned()
            .ok_or(CommandError::NoSuchUser)?;

        if target_client.in_game() {
            return Err(CommandError::OpponentBusy(target_name.to_string()));
        }
        if !target_client.challenges.insert(me.clone()) {
            return Err(CommandError::RequestsFull(target_name.to_string()));
        }

        debug!("{} challenged {}", me, target_name);
        out.send(target_id, Notice::ChallengeFrom(me.clone()));
        out.send(client_id, "Challenge sent");
        Ok(())
    }

    /// `ACCEPT <user>` starts a game with the accepting player in slot 1
    fn accept(
        &mut self,
        client_id: ClientId,
        challenger: &str,
        out: &mut Outbox,
    ) -> Result<(), CommandError> {
        if self.in_game(client_id) {
            return Err(CommandError::InGame("accept"));
        }
        let challenger_id = self
            .clients
            .find_by_username(challenger)
            .ok_or(CommandError::NoSuchUser)?;
        let pending = self
            .clients
            .get(client_id)
            .is_some_and(|client| client.challenges.contains(challenger));
        if !pending {
            return Err(CommandError::NoChallenge(challenger.to_string()));
        }

        self.games
            .start(&mut self.clients, challenger_id, client_id, out)?;
        if let Some(client) = self.clients.get_mut(client_id) {
            client.challenges.remove(challenger);
        }
        Ok(())
    }

    fn refuse(
        &mut self,
        client_id: ClientId,
        me: &Username,
        challenger: &str,
        out: &mut Outbox,
    ) -> Result<(), CommandError> {
        if self.in_game(client_id) {
            return Err(CommandError::InGame("refuse"));
        }
        let challenger_id = self
            .clients
            .find_by_username(challenger)
            .ok_or(CommandError::NoSuchUser)?;
        let removed = self
            .clients
            .get_mut(client_id)
            .is_some_and(|client| client.challenges.remove(challenger));
        if !removed {
            return Err(CommandError::NoChallenge(challenger.to_string()));
        }

        out.send(challenger_id, Notice::RefusedBy(me.clone()));
        out.send(client_id, "Challenge refused");
        Ok(())
    }

    fn in_game(&self, client_id: ClientId) -> bool {
        self.clients
            .get(client_id)
            .is_some_and(|client| client.in_game())
    }
}
