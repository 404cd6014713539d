//! The per-session game record.
//!
//! A [`GameSession`] is the complete state of one two-player game: which
//! images were chosen, which still need cropping, the dealt cards, and the
//! score. It is a fixed record rather than a loose map so a stored value
//! can be checked with [`GameSession::validate`] before the engine trusts it.
//!
//! ## Card values vs. positions
//!
//! `cards[pos]` is a *value*: an index into `selected_images`. Each value
//! appears at exactly two positions. `matched` holds *positions*, while the
//! per-player match lists hold *values*.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Schema version of the stored record. Bump on any field change so older
/// records are discarded instead of misread.
pub const SESSION_VERSION: u32 = 1;

/// Which player's turn it is. Serialized as `1` or `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Player {
    #[default]
    One,
    Two,
}

impl Player {
    pub fn other(self) -> Self {
        match self {
            Self::One => Self::Two,
            Self::Two => Self::One,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

impl From<Player> for u8 {
    fn from(player: Player) -> Self {
        player.number()
    }
}

impl TryFrom<u8> for Player {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(format!("player must be 1 or 2, got {other}")),
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player {}", self.number())
    }
}

/// State of one game, scoped to one browser session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameSession {
    pub version: u32,
    /// Base filenames; position in this list is the card value.
    pub selected_images: Vec<String>,
    /// Non-square selected images awaiting a crop, FIFO.
    pub pending_crops: VecDeque<String>,
    pub cards: Vec<usize>,
    /// Matched card positions in the order they were matched.
    pub matched: Vec<usize>,
    pub current_player: Player,
    pub player1_matches: Vec<usize>,
    pub player2_matches: Vec<usize>,
}

impl Default for GameSession {
    fn default() -> Self {
        Self {
            version: SESSION_VERSION,
            selected_images: Vec::new(),
            pending_crops: VecDeque::new(),
            cards: Vec::new(),
            matched: Vec::new(),
            current_player: Player::One,
            player1_matches: Vec::new(),
            player2_matches: Vec::new(),
        }
    }
}

impl GameSession {
    /// A fresh round over `selected_images` with the given crop queue.
    pub fn new(selected_images: Vec<String>, pending_crops: VecDeque<String>) -> Self {
        Self {
            selected_images,
            pending_crops,
            ..Self::default()
        }
    }

    /// Clear cards, matches, and scores; player one starts.
    pub fn reset_play(&mut self) {
        self.cards.clear();
        self.matched.clear();
        self.player1_matches.clear();
        self.player2_matches.clear();
        self.current_player = Player::One;
    }

    pub fn is_dealt(&self) -> bool {
        !self.cards.is_empty()
    }

    pub fn is_game_over(&self) -> bool {
        self.is_dealt() && self.matched.len() == self.cards.len()
    }

    pub fn matches_for_mut(&mut self, player: Player) -> &mut Vec<usize> {
        match player {
            Player::One => &mut self.player1_matches,
            Player::Two => &mut self.player2_matches,
        }
    }

    /// Check every structural invariant of the record.
    pub fn validate(&self) -> Result<(), String> {
        if self.version != SESSION_VERSION {
            return Err(format!(
                "schema version {} (expected {SESSION_VERSION})",
                self.version
            ));
        }
        if let Some(p) = self
            .pending_crops
            .iter()
            .find(|p| !self.selected_images.contains(p))
        {
            return Err(format!("pending crop {p} is not a selected image"));
        }

        let k = self.selected_images.len();
        if self.is_dealt() {
            if !self.pending_crops.is_empty() {
                return Err("cards dealt while crops are pending".into());
            }
            if self.cards.len() != 2 * k {
                return Err(format!("{} cards for {k} images", self.cards.len()));
            }
            let mut counts = vec![0u8; k];
            for &value in &self.cards {
                match counts.get_mut(value) {
                    Some(count) => *count += 1,
                    None => return Err(format!("card value {value} out of range")),
                }
            }
            if counts.iter().any(|&c| c != 2) {
                return Err("every card value must appear exactly twice".into());
            }
        }

        if self.matched.len() % 2 != 0 {
            return Err("odd number of matched positions".into());
        }
        let mut seen = vec![false; self.cards.len()];
        for &pos in &self.matched {
            match seen.get_mut(pos) {
                Some(s) if !*s => *s = true,
                Some(_) => return Err(format!("position {pos} matched twice")),
                None => return Err(format!("matched position {pos} out of range")),
            }
        }
        let pairs = self.player1_matches.len() + self.player2_matches.len();
        if pairs * 2 != self.matched.len() {
            return Err(format!(
                "{pairs} scored pairs for {} matched positions",
                self.matched.len()
            ));
        }
        Ok(())
    }
}
