//! Request and response shapes of the game API.
//!
//! These are the JSON bodies the front end sends and receives. The engine
//! returns them directly, so the HTTP layer is only routing and status codes.
//!
//! ```text
//! GET  /api/game/board           → BoardView
//! POST /api/game/init            → InitResponse   {"status": "pending_crops" | "ok", ...}
//! POST /api/image/crop           → CropResponse   {"status": "pending_crops" | "ok", ...}
//! POST /api/game/check/{a}/{b}   → MatchResult
//! POST /api/game/reset           → StatusResponse {"status": "ok"}
//! ```

use crate::engine::GameError;
use crate::imaging::CropBox;
use crate::session::Player;
use serde::{Deserialize, Serialize};

/// Snapshot of a dealt board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardView {
    pub cards: Vec<usize>,
    pub matched: Vec<usize>,
    pub current_player: Player,
    pub player1_pairs: usize,
    pub player2_pairs: usize,
    /// Base filenames indexed by card value.
    pub images: Vec<String>,
}

/// Result of starting (or restarting) a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InitResponse {
    /// The front end must send the player to the crop tool first.
    PendingCrops {
        pending_image: String,
        total_pending: usize,
    },
    Ok {
        board_width: u32,
        board_height: u32,
        images: Vec<String>,
        total_pairs: usize,
    },
}

/// Result of submitting one crop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CropResponse {
    PendingCrops { next_image: String },
    /// Queue drained; the board has been dealt.
    Ok,
}

/// Outcome of flipping two cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub is_match: bool,
    /// Display names (cropped derivative when cached) of the two faces.
    pub image1: String,
    pub image2: String,
    pub current_player: Player,
    pub player1_pairs: usize,
    pub player2_pairs: usize,
    pub matched_indices: Vec<usize>,
    pub game_over: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self { status: "ok" }
    }
}

/// Error body: a stable machine-readable code plus a human message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl From<&GameError> for ErrorBody {
    fn from(err: &GameError) -> Self {
        Self {
            error: err.code(),
            message: err.to_string(),
        }
    }
}

/// Body of `POST /api/image/crop`, as loosely as the client may send it.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCropRequest {
    filename: Option<String>,
    crop_box: Option<serde_json::Value>,
}

/// A validated crop submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropRequest {
    pub filename: String,
    pub crop_box: CropBox,
}

impl CropRequest {
    /// Parse a request body. Anything missing or mistyped is `MissingField`.
    pub fn parse(body: &[u8]) -> Result<Self, GameError> {
        let raw: RawCropRequest =
            serde_json::from_slice(body).map_err(|_| GameError::MissingField("body"))?;
        let filename = raw
            .filename
            .filter(|f| !f.is_empty())
            .ok_or(GameError::MissingField("filename"))?;
        let crop_box = raw
            .crop_box
            .and_then(|v| serde_json::from_value::<CropBox>(v).ok())
            .ok_or(GameError::MissingField("crop_box"))?;
        Ok(Self { filename, crop_box })
    }
}
