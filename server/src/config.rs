//! Runtime settings for the Awale server.

use std::path::PathBuf;

/// Configuration for starting a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    /// Port 0 lets the OS pick a free port
    pub port: u16,
    pub max_clients: usize,
    /// Flat file holding the accounts; `None` keeps accounts in memory only
    pub accounts_path: Option<PathBuf>,
    /// Directory receiving one move log per game; `None` disables game logs
    pub games_dir: Option<PathBuf>,
    /// Lines queued for a client before it is considered stalled and dropped
    pub outbound_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 4444,
            max_clients: 20,
            accounts_path: Some(PathBuf::from("users/accounts.txt")),
            games_dir: Some(PathBuf::from("saved_games")),
            outbound_capacity: 256,
        }
    }
}

impl ServerConfig {
    /// Settings for tests: loopback, any port, nothing written to disk
    pub fn ephemeral() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            accounts_path: None,
            games_dir: None,
            ..Self::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Every game seats two clients
    pub fn max_games(&self) -> usize {
        (self.max_clients / 2).max(1)
    }
}
