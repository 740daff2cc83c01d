//! Game sessions: seating, readiness, turns, observers and cancellation.
//!
//! A session starts when a challenge is accepted. Both players must send
//! READY before the first move; the board is pushed to the players and to
//! every observer after each change. When a game ends or is canceled its
//! slot is freed and both players are back in the lobby.

use crate::accounts::AccountStore;
use crate::audit::GameLog;
use crate::client_manager::{Client, ClientId, ClientManager, Seat};
use crate::error::CommandError;
use crate::outbox::Outbox;
use crate::social::can_observe;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::board::Board;
use shared::protocol::{BoardSnapshot, Notice, Username};
use std::path::PathBuf;

pub type GameId = usize;

pub const MAX_OBSERVERS: usize = 20;

#[derive(Debug)]
pub struct GameSession {
    pub id: GameId,
    pub board: Board,
    /// Slot of the player expected to move
    pub to_move: usize,
    /// Slot 0 is the challenger, slot 1 the player who accepted
    pub players: [ClientId; 2],
    pub names: [Username; 2],
    observers: Vec<ClientId>,
    ready: [bool; 2],
    log: GameLog,
}

impl GameSession {
    pub fn observers(&self) -> &[ClientId] {
        &self.observers
    }

    pub fn is_ready(&self, slot: usize) -> bool {
        self.ready[slot]
    }

    /// Moves are accepted once both players sent READY
    pub fn is_started(&self) -> bool {
        self.ready[0] && self.ready[1]
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot::new(&self.board, self.to_move)
    }

    /// Players first, then observers in arrival order
    fn audience(&self) -> Vec<ClientId> {
        self.players
            .iter()
            .chain(&self.observers)
            .copied()
            .collect()
    }
}

/// Fixed table of game slots; a game's ID is its slot index
#[derive(Debug)]
pub struct GameManager {
    games: Vec<Option<GameSession>>,
    rng: StdRng,
    log_dir: Option<PathBuf>,
}

fn seat_of(clients: &ClientManager, client: ClientId) -> Result<Seat, CommandError> {
    clients
        .get(client)
        .and_then(|c| c.seat)
        .ok_or(CommandError::NotInGame)
}

impl GameManager {
    pub fn new(max_games: usize, log_dir: Option<PathBuf>) -> Self {
        Self {
            games: (0..max_games).map(|_| None).collect(),
            rng: StdRng::from_entropy(),
            log_dir,
        }
    }

    /// Makes the choice of first mover reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn get(&self, id: GameId) -> Option<&GameSession> {
        self.games.get(id).and_then(Option::as_ref)
    }

    /// Active games in slot order
    pub fn active(&self) -> impl Iterator<Item = &GameSession> {
        self.games.iter().flatten()
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    pub fn capacity(&self) -> usize {
        self.games.len()
    }

    /// Seats `challenger` in slot 0 and `acceptor` in slot 1 of a new game
    /// and picks the first mover at random.
    pub fn start(
        &mut self,
        clients: &mut ClientManager,
        challenger: ClientId,
        acceptor: ClientId,
        out: &mut Outbox,
    ) -> Result<GameId, CommandError> {
        let challenger_name = clients
            .username_of(challenger)
            .cloned()
            .ok_or(CommandError::NoSuchUser)?;
        let acceptor_name = clients
            .username_of(acceptor)
            .cloned()
            .ok_or(CommandError::NoSuchUser)?;

        if clients.get(acceptor).is_some_and(Client::in_game) {
            return Err(CommandError::InGame("accept"));
        }
        if clients.get(challenger).is_some_and(Client::in_game) {
            return Err(CommandError::OpponentBusy(challenger_name.to_string()));
        }

        let id = self
            .games
            .iter()
            .position(Option::is_none)
            .ok_or(CommandError::NoFreeGameSlot)?;

        self.leave_observer(challenger);
        self.leave_observer(acceptor);

        let players = [challenger, acceptor];
        let names = [challenger_name, acceptor_name];
        let to_move = self.rng.gen_range(0..2);
        let log = match &self.log_dir {
            Some(dir) => GameLog::create(dir, &names),
            None => GameLog::disabled(),
        };

        for (slot, player) in players.into_iter().enumerate() {
            if let Some(client) = clients.get_mut(player) {
                client.seat = Some(Seat { game: id, slot });
            }
        }

        info!(
            "Game {} started: {} vs {}, {} moves first",
            id, names[0], names[1], names[to_move]
        );
        out.send_all(players, Notice::GameStart { players: names.clone() });

        self.games[id] = Some(GameSession {
            id,
            board: Board::new(),
            to_move,
            players,
            names,
            observers: Vec::new(),
            ready: [false, false],
            log,
        });
        Ok(id)
    }

    /// `READY`: the board goes out once both players are ready
    pub fn ready(
        &mut self,
        clients: &ClientManager,
        client: ClientId,
        out: &mut Outbox,
    ) -> Result<(), CommandError> {
        let seat = seat_of(clients, client)?;
        let game = self
            .games
            .get_mut(seat.game)
            .and_then(Option::as_mut)
            .ok_or(CommandError::NotInGame)?;

        if game.is_started() {
            out.send(client, Notice::Board(game.snapshot()));
            return Ok(());
        }

        game.ready[seat.slot] = true;
        if game.is_started() {
            debug!("Game {}: both players ready", game.id);
            out.send_all(game.audience(), Notice::Board(game.snapshot()));
        }
        Ok(())
    }

    /// `MOVE <pit>`: applies the move, pushes the new board and ends the
    /// game when the engine says so.
    pub fn play(
        &mut self,
        clients: &mut ClientManager,
        client: ClientId,
        pit: i64,
        out: &mut Outbox,
    ) -> Result<(), CommandError> {
        let seat = seat_of(clients, client)?;
        let game = self
            .games
            .get_mut(seat.game)
            .and_then(Option::as_mut)
            .ok_or(CommandError::NotInGame)?;

        if !game.is_started() {
            return Err(CommandError::NotStarted);
        }
        if seat.slot != game.to_move {
            return Err(CommandError::NotYourTurn);
        }

        let outcome = game
            .board
            .play(seat.slot, pit)
            .map_err(CommandError::IllegalMove)?;
        debug!(
            "Game {}: {} played pit {} (captured {})",
            game.id, game.names[seat.slot], pit, outcome.captured
        );
        game.log
            .record(format_args!("{} MOVE {}", game.names[seat.slot], pit));

        game.to_move ^= 1;
        let audience = game.audience();
        out.send_all(audience.iter().copied(), Notice::Board(game.snapshot()));

        let Some(end) = game.board.settle() else {
            return Ok(());
        };

        let scores = game.board.scores();
        out.send_all(audience, Notice::GameEnd { scores });
        game.log.record(format_args!(
            "GAME_END {}: {}   {}: {}",
            game.names[0], scores[0], game.names[1], scores[1]
        ));
        info!(
            "Game {} over ({:?}): {} {} - {} {}",
            game.id, end, game.names[0], scores[0], game.names[1], scores[1]
        );

        self.close(clients, seat.game);
        Ok(())
    }

    /// Abandons the caller's game. The opponent and observers are told who
    /// canceled; the caller's own reply is left to the command handler.
    pub fn cancel(
        &mut self,
        clients: &mut ClientManager,
        client: ClientId,
        out: &mut Outbox,
    ) -> Result<(), CommandError> {
        let seat = seat_of(clients, client)?;
        let mut game = self
            .games
            .get_mut(seat.game)
            .and_then(Option::take)
            .ok_or(CommandError::NotInGame)?;

        let by = game.names[seat.slot].clone();
        let notice = Notice::GameCanceled { by: by.clone() };
        out.send(game.players[1 - seat.slot], &notice);
        out.send_all(game.observers.iter().copied(), &notice);
        game.log.record(format_args!("GAME_CANCELED by {by}"));
        info!("Game {} canceled by {}", game.id, by);

        Self::unseat(clients, &game);
        Ok(())
    }

    /// `OBSERVE <id>`: switches the caller to watching game `id`
    pub fn observe(
        &mut self,
        clients: &ClientManager,
        accounts: &AccountStore,
        client: ClientId,
        id: GameId,
        out: &mut Outbox,
    ) -> Result<(), CommandError> {
        let viewer = clients.get(client).ok_or(CommandError::NoSuchUser)?;
        if viewer.in_game() {
            return Err(CommandError::InGame("observe"));
        }
        let viewer_name = viewer.name().ok_or(CommandError::NoSuchUser)?;

        let game = self.get(id).ok_or(CommandError::InvalidGame)?;
        if !can_observe(game, clients, accounts, viewer_name.as_str()) {
            return Err(CommandError::PrivateGame);
        }
        let already_watching = game.observers.contains(&client);
        if !already_watching && game.observers.len() >= MAX_OBSERVERS {
            return Err(CommandError::ObserversFull);
        }

        if !already_watching {
            self.leave_observer(client);
        }
        let Some(game) = self.games.get_mut(id).and_then(Option::as_mut) else {
            return Err(CommandError::InvalidGame);
        };
        if !already_watching {
            game.observers.push(client);
        }

        debug!("{} observes game {}", viewer_name, id);
        out.send(
            client,
            format!(
                "Now observing game {}: {} vs {}",
                id, game.names[0], game.names[1]
            ),
        );
        out.send(client, Notice::Board(game.snapshot()));
        Ok(())
    }

    /// Stops `client` observing, returning the game it was watching
    pub fn leave_observer(&mut self, client: ClientId) -> Option<GameId> {
        let game = self
            .games
            .iter_mut()
            .flatten()
            .find(|game| game.observers.contains(&client))?;
        game.observers.retain(|&observer| observer != client);
        Some(game.id)
    }

    /// The game `client` is watching, if any
    pub fn observing(&self, client: ClientId) -> Option<GameId> {
        self.active()
            .find(|game| game.observers.contains(&client))
            .map(|game| game.id)
    }

    fn close(&mut self, clients: &mut ClientManager, id: GameId) {
        if let Some(game) = self.games.get_mut(id).and_then(Option::take) {
            Self::unseat(clients, &game);
        }
    }

    fn unseat(clients: &mut ClientManager, game: &GameSession) {
        for player in game.players {
            if let Some(client) = clients.get_mut(player) {
                client.seat = None;
            }
        }
    }
}
