//! # Awale Server Library
//!
//! This library provides the server for networked Awale (oware) games played
//! over a plain text line protocol. It owns every account, session and game,
//! validates every command and pushes board updates to players and observers.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Rules
//! Moves are checked and applied by the board engine in the `shared` crate.
//! Clients only ever render the `BOARD` lines the server pushes.
//!
//! ### Session Lifecycle
//! Handles the complete lifecycle of a connection:
//! - Username and password dialogue, with account creation on first login
//! - Lobby commands: listing players and games, chat, private messages
//! - Challenges, game play, observation and cancellation
//! - Disconnection and cleanup of any game the client was part of
//!
//! ### Persistence
//! Accounts (password, bio, friends) live in a flat file rewritten after
//! every change. Each game can also leave a move log on disk.
//!
//! ## Architecture Design
//!
//! ### Single Owner Event Loop
//! One task owns the [`lobby::Lobby`] and is the only code that mutates
//! server state. Per-connection tasks frame incoming lines and write
//! outgoing ones, talking to the main loop through channels, so no lock
//! guards any table.
//!
//! ### Socket-Free Logic
//! Lobby, game and social code never touch sockets. Handlers queue their
//! replies on an [`outbox::Outbox`] which the network layer delivers once
//! the event is processed. This keeps every rule testable without I/O.
//!
//! ## Module Organization
//!
//! - `accounts`: account records, bio normalization and the account file
//! - `audit`: per-game move logs
//! - `client_manager`: connected clients and their session state
//! - `config`: runtime settings
//! - `error`: command and account error types
//! - `game`: game sessions, turns, observers
//! - `lobby`: login dialogue and command dispatch
//! - `network`: TCP accept loop and connection tasks
//! - `outbox`: lines waiting for delivery
//! - `social`: friendships, friend requests and game privacy
//! - `utils`: small helpers

pub mod accounts;
pub mod audit;
pub mod client_manager;
pub mod config;
pub mod error;
pub mod game;
pub mod lobby;
pub mod network;
pub mod outbox;
pub mod social;
pub mod utils;
