//! Account table backed by a flat text file
//!
//! One account per line: `username:password:bio:friends`. The bio field has
//! its newlines stored as `|`; the friends field is a comma-separated list of
//! usernames. The whole file is rewritten after every change, through a
//! temporary file renamed over the original so a crash never leaves a
//! truncated table behind.
//!
//! A failed save is logged and otherwise ignored: the in-memory table stays
//! authoritative and the next change retries the write.

use crate::error::AccountError;
use log::{debug, error, info, warn};
use shared::protocol::Username;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const MAX_ACCOUNTS: usize = 256;
pub const MAX_FRIENDS: usize = 16;
pub const MAX_PASSWORD_LEN: usize = 31;
pub const MAX_BIO_LEN: usize = 511;
pub const MAX_BIO_LINES: usize = 10;

/// Free-text self description, already normalized
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bio(String);

impl Bio {
    /// Normalizes raw `BIO` input. Returns `None` when nothing is left after
    /// trimming leading blanks.
    ///
    /// Carriage returns are dropped, tabs and colons become spaces, `|`
    /// becomes `/` and the two-character escape `\n` becomes a line break. Line breaks past
    /// the ninth are flattened to spaces and the text is cut to 511 bytes.
    pub fn normalize(raw: &str) -> Option<Self> {
        let src = raw.trim_start_matches([' ', '\t']);
        if src.is_empty() {
            return None;
        }

        let mut text = String::with_capacity(src.len().min(MAX_BIO_LEN));
        let mut line_breaks = 0;
        let mut chars = src.chars().peekable();

        while let Some(c) = chars.next() {
            let c = match c {
                '\r' => continue,
                '\t' | ':' => ' ',
                '|' => '/',
                '\\' if chars.peek() == Some(&'n') => {
                    chars.next();
                    '\n'
                }
                other => other,
            };
            let c = if c == '\n' {
                line_breaks += 1;
                if line_breaks >= MAX_BIO_LINES {
                    ' '
                } else {
                    '\n'
                }
            } else {
                c
            };

            if text.len() + c.len_utf8() > MAX_BIO_LEN {
                break;
            }
            text.push(c);
        }

        Some(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn encode(&self) -> String {
        self.0
            .chars()
            .map(|c| if c == '\n' { '|' } else { c })
            .collect()
    }

    fn decode(field: &str) -> Self {
        Self(field.replace('|', "\n"))
    }
}

/// Checks a password chosen at account creation
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.is_empty() {
        Err("Password cannot be empty")
    } else if password.chars().count() > MAX_PASSWORD_LEN {
        Err("Password is too long (max 31 chars)")
    } else if password.contains(':') {
        Err("Password cannot contain ':'")
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: Username,
    password: String,
    pub bio: Bio,
    friends: Vec<Username>,
}

impl Account {
    pub fn new(username: Username, password: &str) -> Self {
        Self {
            username,
            password: password.to_string(),
            bio: Bio::default(),
            friends: Vec::new(),
        }
    }

    pub fn check_password(&self, attempt: &str) -> bool {
        self.password == attempt
    }

    pub fn friends(&self) -> &[Username] {
        &self.friends
    }

    pub fn is_friend(&self, name: &str) -> bool {
        self.friends.iter().any(|friend| friend.matches(name))
    }

    fn to_record(&self) -> String {
        let friends: Vec<&str> = self.friends.iter().map(Username::as_str).collect();
        format!(
            "{}:{}:{}:{}",
            self.username,
            self.password,
            self.bio.encode(),
            friends.join(",")
        )
    }

    fn from_record(line: &str) -> Option<Self> {
        let mut fields = line.splitn(4, ':');
        let username = Username::parse(fields.next()?).ok()?;
        let password = fields.next()?.to_string();
        let bio = Bio::decode(fields.next()?);

        let mut friends: Vec<Username> = Vec::new();
        for name in fields.next().unwrap_or("").split(',') {
            let Ok(friend) = Username::parse(name.trim()) else {
                continue;
            };
            if friends.len() < MAX_FRIENDS && !friends.contains(&friend) {
                friends.push(friend);
            }
        }

        Some(Self {
            username,
            password,
            bio,
            friends,
        })
    }
}

/// Outcome of adding a friend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendAdd {
    Added,
    AlreadyFriends,
}

/// All known accounts, optionally mirrored to disk
#[derive(Debug, Default)]
pub struct AccountStore {
    accounts: Vec<Account>,
    path: Option<PathBuf>,
}

impl AccountStore {
    /// A store that never touches the filesystem
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the account file at `path`. A missing file yields an empty
    /// store; malformed lines are skipped with a warning.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, AccountError> {
        let path = path.into();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No account file at {}, starting empty", path.display());
                String::new()
            }
            Err(e) => return Err(e.into()),
        };

        let mut store = Self {
            accounts: Vec::new(),
            path: Some(path),
        };

        for (index, line) in contents.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            if store.is_full() {
                warn!("Account table full, ignoring the rest of the file");
                break;
            }
            match Account::from_record(line) {
                Some(account) if store.exists(account.username.as_str()) => {
                    warn!("Duplicate account {} on line {}", account.username, index + 1);
                }
                Some(account) => store.accounts.push(account),
                None => warn!("Skipping malformed account record on line {}", index + 1),
            }
        }

        debug!("Loaded {} accounts", store.accounts.len());
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.accounts.len() >= MAX_ACCOUNTS
    }

    /// Case-insensitive lookup
    pub fn find(&self, name: &str) -> Option<&Account> {
        self.accounts.iter().find(|account| account.username.matches(name))
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Account> {
        self.accounts
            .iter_mut()
            .find(|account| account.username.matches(name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn create(&mut self, username: Username, password: &str) -> Result<&Account, AccountError> {
        if self.exists(username.as_str()) {
            return Err(AccountError::AlreadyExists(username.to_string()));
        }
        if self.is_full() {
            return Err(AccountError::StoreFull);
        }

        info!("Created account {}", username);
        self.accounts.push(Account::new(username, password));
        self.commit();

        let index = self.accounts.len() - 1;
        Ok(&self.accounts[index])
    }

    pub fn set_bio(&mut self, name: &str, bio: Bio) -> Result<(), AccountError> {
        let account = self
            .find_mut(name)
            .ok_or_else(|| AccountError::NotFound(name.to_string()))?;
        account.bio = bio;
        self.commit();
        Ok(())
    }

    /// True when `name`'s friends list contains `other`
    pub fn is_friend(&self, name: &str, other: &str) -> bool {
        self.find(name).is_some_and(|account| account.is_friend(other))
    }

    /// Records a friendship on both accounts. Nothing changes unless both
    /// sides have room.
    pub fn befriend(&mut self, a: &Username, b: &Username) -> Result<FriendAdd, AccountError> {
        for (owner, friend) in [(a, b), (b, a)] {
            let account = self
                .find(owner.as_str())
                .ok_or_else(|| AccountError::NotFound(owner.to_string()))?;
            if !account.is_friend(friend.as_str()) && account.friends.len() >= MAX_FRIENDS {
                return Err(AccountError::FriendsFull(owner.to_string()));
            }
        }

        let mut added = false;
        for (owner, friend) in [(a, b), (b, a)] {
            if let Some(account) = self.find_mut(owner.as_str()) {
                if !account.is_friend(friend.as_str()) {
                    account.friends.push(friend.clone());
                    added = true;
                }
            }
        }

        if !added {
            return Ok(FriendAdd::AlreadyFriends);
        }
        self.commit();
        Ok(FriendAdd::Added)
    }

    /// Drops `friend` from `name`'s list. Returns whether it was present.
    pub fn remove_friend(&mut self, name: &str, friend: &str) -> Result<bool, AccountError> {
        let account = self
            .find_mut(name)
            .ok_or_else(|| AccountError::NotFound(name.to_string()))?;
        let before = account.friends.len();
        account.friends.retain(|existing| !existing.matches(friend));
        let removed = account.friends.len() != before;

        if removed {
            self.commit();
        }
        Ok(removed)
    }

    /// Writes the whole table to disk. A store without a path has nothing to do.
    pub fn save(&self) -> Result<(), AccountError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut contents = String::new();
        for account in &self.accounts {
            contents.push_str(&account.to_record());
            contents.push('\n');
        }

        let staging = path.with_extension("tmp");
        fs::write(&staging, contents)?;
        fs::rename(&staging, path)?;
        Ok(())
    }

    fn commit(&self) {
        if let Err(e) = self.save() {
            error!("Failed to save accounts: {}", e);
        }
    }
}
