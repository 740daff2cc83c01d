//! Types shared by the Awale server and its clients: the rule engine, the
//! line framer and the text protocol.

pub mod board;
pub mod line;
pub mod protocol;

pub use board::{Board, GameEnd, MoveError, MoveOutcome};
pub use line::{Frame, LineBuffer};
pub use protocol::{BoardSnapshot, Command, Notice, ParseError, Username, UsernameError};
