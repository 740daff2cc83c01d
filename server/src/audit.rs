//! Per-game move log written to `<dir>/<p0>_vs_<p1>_<unix-ms>.txt`.
//!
//! Logging is best effort: a file that cannot be created or appended to is
//! reported once at warn level and the game carries on without it.

use crate::utils::get_timestamp;
use log::{debug, warn};
use shared::protocol::Username;
use std::fmt::Display;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct GameLog {
    path: Option<PathBuf>,
}

impl GameLog {
    /// A log that records nothing
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Creates the log file and writes its header line
    pub fn create(dir: &Path, players: &[Username; 2]) -> Self {
        let path = dir.join(format!(
            "{}_vs_{}_{}.txt",
            players[0],
            players[1],
            get_timestamp()
        ));
        let header = format!("GAME_START {} vs {}\n", players[0], players[1]);

        let created = fs::create_dir_all(dir).and_then(|()| fs::write(&path, header));
        match created {
            Ok(()) => {
                debug!("Logging game to {}", path.display());
                Self { path: Some(path) }
            }
            Err(e) => {
                warn!("Cannot create game log {}: {}", path.display(), e);
                Self::disabled()
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends one line
    pub fn record(&mut self, entry: impl Display) {
        let Some(path) = &self.path else {
            return;
        };

        let written = OpenOptions::new()
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{entry}"));
        if let Err(e) = written {
            warn!("Cannot append to game log {}: {}", path.display(), e);
            self.path = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn players() -> [Username; 2] {
        [
            Username::parse("alice").unwrap(),
            Username::parse("bob").unwrap(),
        ]
    }

    #[test]
    fn test_log_file_contents() {
        let dir = tempdir().unwrap();
        let mut log = GameLog::create(dir.path(), &players());
        log.record("alice MOVE 2");
        log.record(format_args!("GAME_END {} {}", 25, 3));

        let path = log.path().unwrap().to_path_buf();
        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with("alice_vs_bob_"));
        assert!(file_name.ends_with(".txt"));

        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(
            contents,
            "GAME_START alice vs bob\nalice MOVE 2\nGAME_END 25 3\n"
        );
    }

    #[test]
    fn test_disabled_log_is_silent() {
        let mut log = GameLog::disabled();
        log.record("anything");
        assert!(log.path().is_none());
    }

    #[test]
    fn test_unwritable_directory_disables_log() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();

        let log = GameLog::create(&blocker, &players());
        assert!(log.path().is_none());
    }
}
