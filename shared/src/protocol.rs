//! Text protocol spoken between the server and its clients.
//!
//! Clients send one command per line: an upper-case verb, optionally followed
//! by a single space and arguments. The server answers with free-form text
//! lines; the asynchronous pushes a client may want to recognize are modelled
//! by [`Notice`], including the `BOARD` line that [`BoardSnapshot`] can parse
//! back for rendering.

use crate::board::{Board, PIT_COUNT};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MAX_USERNAME_LEN: usize = 15;
/// Characters of a `MESSAGE` body that are forwarded
pub const MAX_PRIVATE_MESSAGE_LEN: usize = 440;
/// Characters of a `SAY` text that are forwarded
pub const MAX_CHAT_LEN: usize = 450;

/// Case-folded account name: 1 to 15 characters of `[A-Za-z0-9_-]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Username(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UsernameError {
    #[error("username is empty")]
    Empty,
    #[error("username is longer than 15 characters")]
    TooLong,
    #[error("username may only contain letters, digits, '-' and '_'")]
    InvalidCharacter,
}

impl Username {
    pub fn parse(raw: &str) -> Result<Self, UsernameError> {
        if raw.is_empty() {
            return Err(UsernameError::Empty);
        }
        if raw.len() > MAX_USERNAME_LEN {
            return Err(UsernameError::TooLong);
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(UsernameError::InvalidCharacter);
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against user input
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl FromStr for Username {
    type Err = UsernameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Commands accepted once a client has logged in.
///
/// User arguments are kept as raw text; resolving them to accounts or online
/// players is the server's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    List,
    Games,
    Observe(usize),
    OutObserver,
    Challenge(String),
    Accept(String),
    Refuse(String),
    Move(i64),
    CancelGame,
    Ready,
    Bio(String),
    ShowBio(String),
    Friend(String),
    Unfriend(String),
    AcceptFriend(String),
    DeclineFriend(String),
    MyFriends,
    Private(bool),
    Message { to: String, body: String },
    Say(String),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Unknown command")]
    Unknown,
    #[error("Usage: {0}")]
    Usage(&'static str),
}

impl Command {
    /// Parses one line. Verbs are case-sensitive, except `HELP`.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let (verb, rest) = match line.split_once(' ') {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line.trim_end(), ""),
        };

        if verb.eq_ignore_ascii_case("HELP") {
            return bare(rest, Command::Help);
        }

        match verb {
            "LIST" => bare(rest, Command::List),
            "GAMES" => bare(rest, Command::Games),
            "OUT_OBSERVER" => bare(rest, Command::OutObserver),
            "CANCEL_GAME" => bare(rest, Command::CancelGame),
            "READY" => bare(rest, Command::Ready),
            "MY_FRIENDS" => bare(rest, Command::MyFriends),
            "QUIT" => bare(rest, Command::Quit),
            "OBSERVE" => word(rest, "OBSERVE <id>")?
                .parse()
                .map(Command::Observe)
                .map_err(|_| ParseError::Usage("OBSERVE <id>")),
            "MOVE" => word(rest, "MOVE <0-11>")?
                .parse()
                .map(Command::Move)
                .map_err(|_| ParseError::Usage("MOVE <0-11>")),
            "CHALLENGE" => word(rest, "CHALLENGE <user>").map(Command::Challenge),
            "ACCEPT" => word(rest, "ACCEPT <user>").map(Command::Accept),
            "REFUSE" => word(rest, "REFUSE <user>").map(Command::Refuse),
            "SHOWBIO" => word(rest, "SHOWBIO <user>").map(Command::ShowBio),
            "FRIEND" => word(rest, "FRIEND <user>").map(Command::Friend),
            "UNFRIEND" => word(rest, "UNFRIEND <user>").map(Command::Unfriend),
            "ACCEPT_FRIEND" => word(rest, "ACCEPT_FRIEND <user>").map(Command::AcceptFriend),
            "DECLINE_FRIEND" => {
                word(rest, "DECLINE_FRIEND <user>").map(Command::DeclineFriend)
            }
            "BIO" => text(rest, "BIO <text>").map(Command::Bio),
            "SAY" => text(rest, "SAY <message>").map(Command::Say),
            "PRIVATE" => match rest.to_ascii_uppercase().as_str() {
                "ON" => Ok(Command::Private(true)),
                "OFF" => Ok(Command::Private(false)),
                _ => Err(ParseError::Usage("PRIVATE ON|OFF")),
            },
            "MESSAGE" => {
                const USAGE: &str = "MESSAGE <user> <message>";
                let (to, body) = rest.split_once(' ').ok_or(ParseError::Usage(USAGE))?;
                let body = body.trim_start();
                if to.is_empty() || body.is_empty() {
                    return Err(ParseError::Usage(USAGE));
                }
                Ok(Command::Message {
                    to: to.to_string(),
                    body: body.to_string(),
                })
            }
            _ => Err(ParseError::Unknown),
        }
    }
}

fn bare(rest: &str, command: Command) -> Result<Command, ParseError> {
    if rest.is_empty() {
        Ok(command)
    } else {
        Err(ParseError::Unknown)
    }
}

fn word(rest: &str, usage: &'static str) -> Result<String, ParseError> {
    rest.split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or(ParseError::Usage(usage))
}

fn text(rest: &str, usage: &'static str) -> Result<String, ParseError> {
    if rest.is_empty() {
        Err(ParseError::Usage(usage))
    } else {
        Ok(rest.to_string())
    }
}

/// The `BOARD` line pushed after every state change of a started game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardSnapshot {
    pub pits: [u32; PIT_COUNT],
    pub scores: [u32; 2],
    /// Player slot (0 or 1) expected to move next
    pub next: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("malformed BOARD line")]
pub struct SnapshotError;

impl BoardSnapshot {
    pub fn new(board: &Board, next: usize) -> Self {
        Self {
            pits: *board.pits(),
            scores: board.scores(),
            next,
        }
    }
}

impl fmt::Display for BoardSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BOARD")?;
        for seeds in &self.pits {
            write!(f, " {seeds}")?;
        }
        write!(
            f,
            " | Scores: {}-{} | Next: {}",
            self.scores[0], self.scores[1], self.next
        )
    }
}

impl FromStr for BoardSnapshot {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut sections = s.split(" | ");
        let pits_part = sections.next().ok_or(SnapshotError)?;
        let scores_part = sections.next().ok_or(SnapshotError)?;
        let next_part = sections.next().ok_or(SnapshotError)?;
        if sections.next().is_some() {
            return Err(SnapshotError);
        }

        let mut words = pits_part.split_whitespace();
        if words.next() != Some("BOARD") {
            return Err(SnapshotError);
        }
        let mut pits = [0; PIT_COUNT];
        for pit in pits.iter_mut() {
            *pit = words
                .next()
                .and_then(|w| w.parse().ok())
                .ok_or(SnapshotError)?;
        }
        if words.next().is_some() {
            return Err(SnapshotError);
        }

        let (s0, s1) = scores_part
            .strip_prefix("Scores: ")
            .and_then(|scores| scores.split_once('-'))
            .ok_or(SnapshotError)?;
        let scores = [
            s0.parse().map_err(|_| SnapshotError)?,
            s1.parse().map_err(|_| SnapshotError)?,
        ];

        let next = next_part
            .strip_prefix("Next: ")
            .and_then(|n| n.trim_end().parse().ok())
            .filter(|&n: &usize| n < 2)
            .ok_or(SnapshotError)?;

        Ok(Self { pits, scores, next })
    }
}

/// Asynchronous pushes delivered to a client outside of a direct reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    GameStart { players: [Username; 2] },
    Board(BoardSnapshot),
    GameEnd { scores: [u32; 2] },
    GameCanceled { by: Username },
    ChallengeFrom(Username),
    RefusedBy(Username),
    FriendRequest(Username),
    FriendAccepted(Username),
    FriendDeclined(Username),
    PrivateMessage { from: Username, body: String },
    Chat { from: Username, text: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::GameStart { players } => {
                write!(f, "GAME_START {} vs {}", players[0], players[1])
            }
            Notice::Board(snapshot) => fmt::Display::fmt(snapshot, f),
            Notice::GameEnd { scores } => write!(f, "GAME_END {} {}", scores[0], scores[1]),
            Notice::GameCanceled { by } => write!(f, "GAME_CANCELED {by}"),
            Notice::ChallengeFrom(name) => write!(f, "CHALLENGE_FROM {name}"),
            Notice::RefusedBy(name) => write!(f, "REFUSED_BY {name}"),
            Notice::FriendRequest(name) => write!(f, "FRIEND_REQUEST {name}"),
            Notice::FriendAccepted(name) => write!(f, "FRIEND_ACCEPTED {name}"),
            Notice::FriendDeclined(name) => write!(f, "FRIEND_DECLINED {name}"),
            Notice::PrivateMessage { from, body } => write!(f, "PM from {from}: {body}"),
            Notice::Chat { from, text } => write!(f, "CHAT {from}: {text}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(raw: &str) -> Username {
        Username::parse(raw).unwrap()
    }

    #[test]
    fn test_username_validation() {
        assert_eq!(name("Alice_01").as_str(), "alice_01");
        assert_eq!(name("a-b").as_str(), "a-b");
        assert_eq!(name("x23456789012345").as_str().len(), 15);

        assert_eq!(Username::parse(""), Err(UsernameError::Empty));
        assert_eq!(
            Username::parse("x234567890123456"),
            Err(UsernameError::TooLong)
        );
        assert_eq!(
            Username::parse("bob!"),
            Err(UsernameError::InvalidCharacter)
        );
        assert_eq!(
            Username::parse("bob smith"),
            Err(UsernameError::InvalidCharacter)
        );
        assert_eq!(Username::parse("é"), Err(UsernameError::InvalidCharacter));
    }

    #[test]
    fn test_username_matches_ignoring_case() {
        assert!(name("carol").matches("CaRoL"));
        assert!(!name("carol").matches("carl"));
    }

    #[test]
    fn test_bare_commands() {
        assert_eq!(Command::parse("LIST"), Ok(Command::List));
        assert_eq!(Command::parse("GAMES"), Ok(Command::Games));
        assert_eq!(Command::parse("READY"), Ok(Command::Ready));
        assert_eq!(Command::parse("CANCEL_GAME"), Ok(Command::CancelGame));
        assert_eq!(Command::parse("OUT_OBSERVER"), Ok(Command::OutObserver));
        assert_eq!(Command::parse("MY_FRIENDS"), Ok(Command::MyFriends));
        assert_eq!(Command::parse("QUIT"), Ok(Command::Quit));
    }

    #[test]
    fn test_help_is_case_insensitive() {
        assert_eq!(Command::parse("HELP"), Ok(Command::Help));
        assert_eq!(Command::parse("help"), Ok(Command::Help));
        assert_eq!(Command::parse("list"), Err(ParseError::Unknown));
    }

    #[test]
    fn test_unknown_commands() {
        assert_eq!(Command::parse(""), Err(ParseError::Unknown));
        assert_eq!(Command::parse("DANCE"), Err(ParseError::Unknown));
        assert_eq!(Command::parse("LIST everyone"), Err(ParseError::Unknown));
    }

    #[test]
    fn test_user_arguments() {
        assert_eq!(
            Command::parse("CHALLENGE bob"),
            Ok(Command::Challenge("bob".into()))
        );
        assert_eq!(
            Command::parse("ACCEPT_FRIEND  Dave "),
            Ok(Command::AcceptFriend("Dave".into()))
        );
        assert_eq!(
            Command::parse("CHALLENGE"),
            Err(ParseError::Usage("CHALLENGE <user>"))
        );
        assert_eq!(
            Command::parse("SHOWBIO "),
            Err(ParseError::Usage("SHOWBIO <user>"))
        );
    }

    #[test]
    fn test_numeric_arguments() {
        assert_eq!(Command::parse("MOVE 3"), Ok(Command::Move(3)));
        assert_eq!(Command::parse("MOVE -2"), Ok(Command::Move(-2)));
        assert_eq!(
            Command::parse("MOVE three"),
            Err(ParseError::Usage("MOVE <0-11>"))
        );
        assert_eq!(Command::parse("OBSERVE 4"), Ok(Command::Observe(4)));
        assert_eq!(
            Command::parse("OBSERVE"),
            Err(ParseError::Usage("OBSERVE <id>"))
        );
    }

    #[test]
    fn test_private_toggle() {
        assert_eq!(Command::parse("PRIVATE ON"), Ok(Command::Private(true)));
        assert_eq!(Command::parse("PRIVATE off"), Ok(Command::Private(false)));
        assert_eq!(
            Command::parse("PRIVATE maybe"),
            Err(ParseError::Usage("PRIVATE ON|OFF"))
        );
    }

    #[test]
    fn test_free_text_arguments() {
        assert_eq!(
            Command::parse("SAY hello  everyone"),
            Ok(Command::Say("hello  everyone".into()))
        );
        assert_eq!(
            Command::parse("BIO line one\\nline two"),
            Ok(Command::Bio("line one\\nline two".into()))
        );
        assert_eq!(
            Command::parse("MESSAGE bob see you at 8"),
            Ok(Command::Message {
                to: "bob".into(),
                body: "see you at 8".into()
            })
        );
        assert_eq!(
            Command::parse("MESSAGE bob"),
            Err(ParseError::Usage("MESSAGE <user> <message>"))
        );
        assert_eq!(
            Command::parse("SAY"),
            Err(ParseError::Usage("SAY <message>"))
        );
    }

    #[test]
    fn test_parse_error_text() {
        assert_eq!(ParseError::Unknown.to_string(), "Unknown command");
        assert_eq!(
            ParseError::Usage("MOVE <0-11>").to_string(),
            "Usage: MOVE <0-11>"
        );
    }

    #[test]
    fn test_board_snapshot_format() {
        let snapshot = BoardSnapshot::new(&Board::new(), 1);
        let text = snapshot.to_string();

        assert_eq!(
            text,
            "BOARD 4 4 4 4 4 4 4 4 4 4 4 4 | Scores: 0-0 | Next: 1"
        );
        assert_eq!(text.parse::<BoardSnapshot>(), Ok(snapshot));
    }

    #[test]
    fn test_board_snapshot_rejects_garbage() {
        assert!("BOARD 1 2 3 | Scores: 0-0 | Next: 0"
            .parse::<BoardSnapshot>()
            .is_err());
        assert!("BOARD 4 4 4 4 4 4 4 4 4 4 4 4 | Scores: 0 | Next: 0"
            .parse::<BoardSnapshot>()
            .is_err());
        assert!("BOARD 4 4 4 4 4 4 4 4 4 4 4 4 | Scores: 0-0 | Next: 2"
            .parse::<BoardSnapshot>()
            .is_err());
        assert!("GAME_END 1 2".parse::<BoardSnapshot>().is_err());
    }

    #[test]
    fn test_notice_text() {
        let alice = name("alice");
        let bob = name("bob");

        assert_eq!(
            Notice::GameStart {
                players: [alice.clone(), bob.clone()]
            }
            .to_string(),
            "GAME_START alice vs bob"
        );
        assert_eq!(
            Notice::GameEnd { scores: [25, 11] }.to_string(),
            "GAME_END 25 11"
        );
        assert_eq!(
            Notice::GameCanceled { by: bob.clone() }.to_string(),
            "GAME_CANCELED bob"
        );
        assert_eq!(
            Notice::PrivateMessage {
                from: alice.clone(),
                body: "hi".into()
            }
            .to_string(),
            "PM from alice: hi"
        );
        assert_eq!(
            Notice::Chat {
                from: bob,
                text: "gg".into()
            }
            .to_string(),
            "CHAT bob: gg"
        );
        assert_eq!(
            Notice::ChallengeFrom(alice).to_string(),
            "CHALLENGE_FROM alice"
        );
    }
}
