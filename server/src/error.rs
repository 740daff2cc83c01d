//! Server error types.
//!
//! - `CommandError`: a command could not be carried out. Its `Display` text is
//!   the exact reply line sent back to the client; the connection stays open.
//! - `AccountError`: account table and account file failures.

use shared::board::MoveError;
use shared::protocol::ParseError;
use thiserror::Error;

/// Reasons a logged-in command is refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Malformed command or missing argument
    #[error("ERROR : {0} !")]
    Parse(#[from] ParseError),

    /// The command is not available to a seated player
    #[error("ERROR : You cannot {0} while in a game !")]
    InGame(&'static str),

    #[error("ERROR : You cannot {0} yourself !")]
    SelfTarget(&'static str),

    /// No logged-in player has this name
    #[error("ERROR : No such user !")]
    NoSuchUser,

    /// Online lookup for a private message
    #[error("ERROR : User not found !")]
    UserNotFound,

    /// No account has this name
    #[error("ERROR : Unknown user !")]
    UnknownUser,

    #[error("ERROR : Account not found !")]
    AccountNotFound,

    #[error("ERROR : {0} is already in a game !")]
    OpponentBusy(String),

    #[error("ERROR : No pending challenge from {0} !")]
    NoChallenge(String),

    #[error("ERROR : You are not in a game !")]
    NotInGame,

    #[error("ERROR : Game not started, both players must send READY !")]
    NotStarted,

    #[error("ERROR : Not your turn !")]
    NotYourTurn,

    /// Rejected by the rule engine; the board is unchanged
    #[error("ERROR : Illegal move, {0} !")]
    IllegalMove(MoveError),

    #[error("ERROR : Invalid game ID !")]
    InvalidGame,

    #[error("ERROR : Game is private. You are not allowed to observe !")]
    PrivateGame,

    #[error("ERROR : Too many observers !")]
    ObserversFull,

    #[error("ERROR : You are not observing any game !")]
    NotObserving,

    #[error("ERROR : No free game slot, try again later !")]
    NoFreeGameSlot,

    #[error("ERROR : Friends list full !")]
    FriendsFull,

    #[error("ERROR : No pending friend request from {0} !")]
    NoFriendRequest(String),

    /// The target's pending challenge or friend request queue is full
    #[error("ERROR : {0} has too many pending requests !")]
    RequestsFull(String),

    #[error("ERROR : Bio cannot be empty !")]
    EmptyBio,
}

/// Errors raised by the account store
#[derive(Error, Debug)]
pub enum AccountError {
    #[error("account storage full")]
    StoreFull,

    #[error("account {0} already exists")]
    AlreadyExists(String),

    #[error("account {0} not found")]
    NotFound(String),

    #[error("friends list of {0} is full")]
    FriendsFull(String),

    #[error("account file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<AccountError> for CommandError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::FriendsFull(_) => CommandError::FriendsFull,
            _ => CommandError::AccountNotFound,
        }
    }
}
