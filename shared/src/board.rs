//! Awale rule engine
//!
//! Pure board arithmetic shared by the server and any client: sowing,
//! capture, the feeding rule and the end-of-game checks. Pits `0..=5`
//! form player 0's row and pits `6..=11` form player 1's row; seeds move
//! counter-clockwise, i.e. towards increasing pit index.
//!
//! Nothing in this module performs I/O. Every rejected move leaves the
//! board and both scores untouched.

use std::ops::RangeInclusive;
use thiserror::Error;

pub const PIT_COUNT: usize = 12;
pub const ROW_LEN: usize = 6;
pub const SEEDS_PER_PIT: u32 = 4;
pub const TOTAL_SEEDS: u32 = PIT_COUNT as u32 * SEEDS_PER_PIT;
/// A score strictly above this value ends the game.
pub const WINNING_SCORE: u32 = TOTAL_SEEDS / 2;
/// The game ends once this many seeds or fewer remain on the board.
pub const EXHAUSTED_SEEDS: u32 = 3;

/// Reasons the engine refuses a move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("invalid player")]
    InvalidPlayer,
    #[error("pit out of range")]
    PitOutOfRange,
    #[error("pit is not on your side")]
    WrongRow,
    #[error("pit is empty")]
    EmptyPit,
    #[error("move does not feed the starving opponent")]
    MustFeedOpponent,
}

/// What happened during a successfully applied move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Last pit that received a seed
    pub landing_pit: usize,
    /// Seeds moved into the mover's score (0 when nothing or a voided run was captured)
    pub captured: u32,
}

/// Why `Board::settle` ended the game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEnd {
    /// One player holds more than half of all seeds
    ScoreAboveHalf,
    /// Every seed has been captured
    AllCaptured,
    /// `starving` has an empty row and the opponent cannot feed it;
    /// the opponent collected the remaining seeds
    Starvation { starving: usize },
    /// Too few seeds were left; each player collected their own row
    Exhausted,
}

/// Pits owned by `player`
pub fn row(player: usize) -> RangeInclusive<usize> {
    let first = player * ROW_LEN;
    first..=first + ROW_LEN - 1
}

fn row_end(player: usize) -> usize {
    player * ROW_LEN + ROW_LEN - 1
}

/// Twelve pits plus the two capture stores
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    pits: [u32; PIT_COUNT],
    scores: [u32; 2],
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// Opening position: four seeds in every pit, both scores at zero
    pub fn new() -> Self {
        Self {
            pits: [SEEDS_PER_PIT; PIT_COUNT],
            scores: [0, 0],
        }
    }

    /// Builds an arbitrary position. Used to replay positions and by tests;
    /// the seed total is not required to be `TOTAL_SEEDS`.
    pub fn from_parts(pits: [u32; PIT_COUNT], scores: [u32; 2]) -> Self {
        Self { pits, scores }
    }

    pub fn pits(&self) -> &[u32; PIT_COUNT] {
        &self.pits
    }

    pub fn scores(&self) -> [u32; 2] {
        self.scores
    }

    pub fn row_seeds(&self, player: usize) -> u32 {
        self.pits[row(player)].iter().sum()
    }

    pub fn seeds_on_board(&self) -> u32 {
        self.pits.iter().sum()
    }

    /// Seeds on the board plus both scores. Constant for the lifetime of a game.
    pub fn total_seeds(&self) -> u32 {
        self.seeds_on_board() + self.scores[0] + self.scores[1]
    }

    /// The player whose row is empty, checking player 0 first
    pub fn starving(&self) -> Option<usize> {
        (0..2).find(|&player| self.row_seeds(player) == 0)
    }

    /// True when sowing `pit` carries at least one seed past the end of
    /// `player`'s row.
    pub fn feeds(&self, player: usize, pit: usize) -> bool {
        self.pits[pit] as usize > row_end(player) - pit
    }

    /// True when `player` has any move that reaches the opponent's row
    pub fn can_feed(&self, player: usize) -> bool {
        row(player).any(|pit| self.feeds(player, pit))
    }

    /// Validates a move without applying it and returns the pit index
    pub fn check_move(&self, player: usize, pit: i64) -> Result<usize, MoveError> {
        if player > 1 {
            return Err(MoveError::InvalidPlayer);
        }
        let pit = usize::try_from(pit)
            .ok()
            .filter(|&pit| pit < PIT_COUNT)
            .ok_or(MoveError::PitOutOfRange)?;
        if !row(player).contains(&pit) {
            return Err(MoveError::WrongRow);
        }
        if self.pits[pit] == 0 {
            return Err(MoveError::EmptyPit);
        }
        if self.row_seeds(1 - player) == 0 && !self.feeds(player, pit) {
            return Err(MoveError::MustFeedOpponent);
        }
        Ok(pit)
    }

    /// Plays `pit` for `player`: sows its seeds and applies any capture.
    ///
    /// Termination is not evaluated here; call [`Board::settle`] afterwards.
    pub fn play(&mut self, player: usize, pit: i64) -> Result<MoveOutcome, MoveError> {
        let origin = self.check_move(player, pit)?;
        let landing_pit = self.sow(origin);
        let captured = self.capture(player, landing_pit);
        Ok(MoveOutcome {
            landing_pit,
            captured,
        })
    }

    /// Empties `origin` and distributes its seeds one by one, never
    /// refilling the origin pit even when the sowing laps the board.
    fn sow(&mut self, origin: usize) -> usize {
        let mut seeds = std::mem::take(&mut self.pits[origin]);
        let mut pos = origin;
        while seeds > 0 {
            pos = (pos + 1) % PIT_COUNT;
            if pos == origin {
                continue;
            }
            self.pits[pos] += 1;
            seeds -= 1;
        }
        pos
    }

    /// Captures the contiguous run of opponent pits holding 2 or 3 seeds,
    /// starting at the landing pit. Player 0 walks down towards pit 6,
    /// player 1 walks up towards pit 5. The run is forfeited when taking
    /// it would leave the opponent without a single seed.
    fn capture(&mut self, player: usize, landing_pit: usize) -> u32 {
        let opponent = 1 - player;
        let opponent_row = row(opponent);
        if !opponent_row.contains(&landing_pit) {
            return 0;
        }

        let capturable = |pit: &usize| matches!(self.pits[*pit], 2 | 3);
        let run: Vec<usize> = if player == 0 {
            (*opponent_row.start()..=landing_pit)
                .rev()
                .take_while(capturable)
                .collect()
        } else {
            (landing_pit..=*opponent_row.end())
                .take_while(capturable)
                .collect()
        };

        let captured: u32 = run.iter().map(|&pit| self.pits[pit]).sum();
        if captured == 0 || self.row_seeds(opponent) == captured {
            return 0;
        }

        for pit in run {
            self.pits[pit] = 0;
        }
        self.scores[player] += captured;
        captured
    }

    /// Checks whether the game is over, distributing leftover seeds when the
    /// ending rule calls for it. Checks run in order and the first match wins.
    pub fn settle(&mut self) -> Option<GameEnd> {
        if self.scores.iter().any(|&score| score > WINNING_SCORE) {
            return Some(GameEnd::ScoreAboveHalf);
        }
        if self.scores[0] + self.scores[1] >= TOTAL_SEEDS {
            return Some(GameEnd::AllCaptured);
        }

        if let Some(starving) = self.starving() {
            let feeder = 1 - starving;
            if !self.can_feed(feeder) {
                self.scores[feeder] += self.seeds_on_board();
                self.pits = [0; PIT_COUNT];
                return Some(GameEnd::Starvation { starving });
            }
        }

        if self.seeds_on_board() <= EXHAUSTED_SEEDS {
            for player in 0..2 {
                self.scores[player] += self.row_seeds(player);
            }
            self.pits = [0; PIT_COUNT];
            return Some(GameEnd::Exhausted);
        }

        None
    }
}
