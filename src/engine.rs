//! Game session engine.
//!
//! The [`Engine`] owns the rules of a two-player memory round. Each public
//! operation takes a [`SessionId`], loads that session's [`GameSession`] from
//! the [`SessionStore`], works on the loaded copy, and stores it back only if
//! the whole operation succeeded. A failed call leaves the stored record
//! exactly as it was.
//!
//! ## Round lifecycle
//!
//! ```text
//! start_new_round ──► pending crops? ──yes──► resolve_crop (one per image) ──┐
//!                          │ no                                             │ queue drained
//!                          ▼                                                ▼
//!                        deal ◄─────────────────────────────────────────────┘
//!                          │
//!                          ▼
//!                     check_match … game over
//! ```
//!
//! Selecting a round samples `width * height / 2` images from the catalog.
//! Images that already have a cached square derivative are ready. Square
//! images get their derivative written on the spot. Everything else is queued
//! for the crop tool. Classification runs in parallel with rayon, since each
//! check decodes an image header and the square ones may be re-encoded.
//!
//! ## Concurrency
//!
//! Operations on the same session are serialized by a per-session mutex, so
//! a double-submitted flip sees the state committed by the first one.
//! Different sessions only share the brief lookup in the lock map.

use crate::api::{BoardView, CropResponse, InitResponse, MatchResult};
use crate::catalog::Catalog;
use crate::config::BoardSize;
use crate::imaging::{CropBox, Dimensions, ImageBackend, Quality, RustBackend};
use crate::normalizer::{NormalizeError, Normalizer};
use crate::session::GameSession;
use crate::store::{SessionId, SessionStore, StoreError};
use parking_lot::Mutex;
use rand::Rng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum GameError {
    #[error("Image not found")]
    NotFound,
    #[error("Cannot read image: {0}")]
    Unreadable(String),
    #[error("Card position {0} is not on the board")]
    InvalidIndex(i64),
    #[error("Card at position {0} is already matched")]
    AlreadyMatched(usize),
    #[error("{0} is not waiting for a crop")]
    NotPending(String),
    #[error("Missing or malformed field: {0}")]
    MissingField(&'static str),
    #[error("No round can be played right now")]
    NoActiveRound,
    #[error("Image is not square")]
    NotSquare,
    #[error("Crop box (x={}, y={}, size={}) does not fit inside the image", .0.x, .0.y, .0.size)]
    InvalidCrop(CropBox),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl GameError {
    /// Stable machine-readable identifier, used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Unreadable(_) => "unreadable",
            Self::InvalidIndex(_) => "invalid_index",
            Self::AlreadyMatched(_) => "already_matched",
            Self::NotPending(_) => "not_pending",
            Self::MissingField(_) => "missing_field",
            Self::NoActiveRound => "no_active_round",
            Self::NotSquare => "not_square",
            Self::InvalidCrop(_) => "invalid_crop",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<NormalizeError> for GameError {
    fn from(err: NormalizeError) -> Self {
        match err {
            NormalizeError::NotFound => Self::NotFound,
            NormalizeError::Unreadable(msg) => Self::Unreadable(msg),
            NormalizeError::NotSquare => Self::NotSquare,
            NormalizeError::InvalidCrop(region) => Self::InvalidCrop(region),
            NormalizeError::Storage(msg) => Self::Storage(msg),
        }
    }
}

impl From<StoreError> for GameError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Map a client-supplied position onto the board.
fn board_position(pos: i64, len: usize) -> Result<usize, GameError> {
    usize::try_from(pos)
        .ok()
        .filter(|&p| p < len)
        .ok_or(GameError::InvalidIndex(pos))
}

pub struct Engine<S: SessionStore, B: ImageBackend = RustBackend> {
    store: S,
    images: Normalizer<B>,
    catalog: Catalog,
    board: BoardSize,
    locks: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl<S: SessionStore> Engine<S, RustBackend> {
    pub fn new(store: S, image_root: impl Into<PathBuf>, quality: Quality, board: BoardSize) -> Self {
        Self::with_backend(store, image_root, RustBackend::new(), quality, board)
    }
}

impl<S: SessionStore, B: ImageBackend> Engine<S, B> {
    pub fn with_backend(
        store: S,
        image_root: impl Into<PathBuf>,
        backend: B,
        quality: Quality,
        board: BoardSize,
    ) -> Self {
        let root = image_root.into();
        Self {
            store,
            catalog: Catalog::new(&root),
            images: Normalizer::with_backend(root, backend, quality),
            board,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn board_size(&self) -> BoardSize {
        self.board
    }

    pub fn images(&self) -> &Normalizer<B> {
        &self.images
    }

    /// Run `op` holding the session's mutex.
    ///
    /// Clones of a session's lock are only taken under the map lock, so an
    /// entry whose only owner is the map has no waiters and can be dropped.
    fn with_session_lock<T>(&self, id: &SessionId, op: impl FnOnce() -> T) -> T {
        let lock = self.locks.lock().entry(id.clone()).or_default().clone();
        let result = {
            let _guard = lock.lock();
            op()
        };
        drop(lock);

        let mut locks = self.locks.lock();
        if locks.get(id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(id);
        }
        result
    }

    // =========================================================================
    // Round setup
    // =========================================================================

    /// Start a round, or restart play over the current selection.
    ///
    /// An existing selection is kept along with its crop queue; only the
    /// cards and scores are cleared. Without one, a new selection is sampled.
    pub fn start_new_round<R: Rng + ?Sized>(
        &self,
        id: &SessionId,
        rng: &mut R,
    ) -> Result<InitResponse, GameError> {
        self.with_session_lock(id, || -> Result<InitResponse, GameError> {
            let mut session = match self.store.get(id)? {
                Some(existing) if !existing.selected_images.is_empty() => existing,
                _ => self.select_round(rng)?,
            };
            session.reset_play();

            let response = match session.pending_crops.front() {
                Some(first) => InitResponse::PendingCrops {
                    pending_image: first.clone(),
                    total_pending: session.pending_crops.len(),
                },
                None => {
                    Self::deal(&mut session, rng);
                    InitResponse::Ok {
                        board_width: self.board.width,
                        board_height: self.board.height,
                        images: session.selected_images.clone(),
                        total_pairs: session.selected_images.len(),
                    }
                }
            };
            self.store.put(id, &session)?;
            Ok(response)
        })
    }

    /// Crop a pending image and cache its derivative.
    ///
    /// Returns the next image in the queue, or deals the board once the
    /// queue is empty.
    pub fn resolve_crop<R: Rng + ?Sized>(
        &self,
        id: &SessionId,
        filename: &str,
        region: CropBox,
        rng: &mut R,
    ) -> Result<CropResponse, GameError> {
        self.images.resolve(filename)?;

        self.with_session_lock(id, || -> Result<CropResponse, GameError> {
            let mut session = self
                .store
                .get(id)?
                .ok_or_else(|| GameError::NotPending(filename.to_string()))?;
            let index = session
                .pending_crops
                .iter()
                .position(|p| p == filename)
                .ok_or_else(|| GameError::NotPending(filename.to_string()))?;

            self.images.crop_and_cache(filename, region)?;
            session.pending_crops.remove(index);
            info!(session = %id, image = filename, remaining = session.pending_crops.len(), "crop resolved");

            let response = match session.pending_crops.front() {
                Some(next) => CropResponse::PendingCrops {
                    next_image: next.clone(),
                },
                None => {
                    Self::deal(&mut session, rng);
                    CropResponse::Ok
                }
            };
            self.store.put(id, &session)?;
            Ok(response)
        })
    }

    /// Current board, starting a round if the session has none.
    ///
    /// Fails with [`GameError::NoActiveRound`] while crops are pending or
    /// when the catalog has no images.
    pub fn board<R: Rng + ?Sized>(
        &self,
        id: &SessionId,
        rng: &mut R,
    ) -> Result<BoardView, GameError> {
        self.with_session_lock(id, || -> Result<BoardView, GameError> {
            let mut session = match self.store.get(id)? {
                Some(existing) if !existing.selected_images.is_empty() => existing,
                _ => self.select_round(rng)?,
            };
            if !session.pending_crops.is_empty() {
                return Err(GameError::NoActiveRound);
            }
            if !session.is_dealt() {
                Self::deal(&mut session, rng);
            }
            self.store.put(id, &session)?;
            Ok(Self::board_view(&session))
        })
    }

    /// Forget the session. The next call starts from a fresh selection.
    pub fn reset(&self, id: &SessionId) -> Result<(), GameError> {
        self.with_session_lock(id, || self.store.delete(id))?;
        info!(session = %id, "session reset");
        Ok(())
    }

    // =========================================================================
    // Play
    // =========================================================================

    /// Flip the cards at `pos1` and `pos2`.
    ///
    /// A pair stays with the current player; a miss passes the turn. A
    /// session without a round is started first.
    pub fn check_match<R: Rng + ?Sized>(
        &self,
        id: &SessionId,
        pos1: i64,
        pos2: i64,
        rng: &mut R,
    ) -> Result<MatchResult, GameError> {
        self.with_session_lock(id, || -> Result<MatchResult, GameError> {
            let mut session = match self.store.get(id)? {
                Some(existing) if !existing.selected_images.is_empty() => existing,
                _ => {
                    let mut fresh = self.select_round(rng)?;
                    if fresh.pending_crops.is_empty() {
                        Self::deal(&mut fresh, rng);
                    }
                    fresh
                }
            };

            let len = session.cards.len();
            let first = board_position(pos1, len)?;
            let second = board_position(pos2, len)?;
            if first == second {
                return Err(GameError::InvalidIndex(pos2));
            }
            if let Some(&pos) = [first, second].iter().find(|p| session.matched.contains(*p)) {
                return Err(GameError::AlreadyMatched(pos));
            }

            let (value1, value2) = (session.cards[first], session.cards[second]);
            let is_match = value1 == value2;
            if is_match {
                session.matched.extend([first, second]);
                let player = session.current_player;
                session.matches_for_mut(player).push(value1);
                debug!(session = %id, %player, value = value1, "pair found");
            } else {
                session.current_player = session.current_player.other();
            }

            let game_over = session.is_game_over();
            if game_over {
                info!(
                    session = %id,
                    player1 = session.player1_matches.len(),
                    player2 = session.player2_matches.len(),
                    "game over"
                );
            }

            let result = MatchResult {
                is_match,
                image1: self.images.display_name(&session.selected_images[value1]),
                image2: self.images.display_name(&session.selected_images[value2]),
                current_player: session.current_player,
                player1_pairs: session.player1_matches.len(),
                player2_pairs: session.player2_matches.len(),
                matched_indices: session.matched.clone(),
                game_over,
            };
            self.store.put(id, &session)?;
            Ok(result)
        })
    }

    // =========================================================================
    // Image queries
    // =========================================================================

    pub fn dimensions(&self, filename: &str) -> Result<Dimensions, GameError> {
        Ok(self.images.dimensions(filename)?)
    }

    /// Suggested crop for the crop tool: the largest centered square.
    pub fn square_suggestion(&self, filename: &str) -> Result<CropBox, GameError> {
        Ok(self.images.largest_centered_square(filename)?)
    }

    /// File to serve for a requested image path, derivative first.
    pub fn image_path(&self, requested: &str) -> Result<PathBuf, GameError> {
        Ok(self.images.resolve_for_display(requested)?)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Sample a new selection and sort it into ready and pending images.
    fn select_round<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<GameSession, GameError> {
        let wanted = self.board.pairs();
        let selected = self
            .catalog
            .sample(wanted, rng)
            .map_err(|e| GameError::Storage(format!("cannot list images: {e}")))?;
        if selected.is_empty() {
            return Err(GameError::NoActiveRound);
        }

        let needs_crop = selected
            .par_iter()
            .map(|name| self.needs_crop(name))
            .collect::<Result<Vec<bool>, GameError>>()?;
        let pending: VecDeque<String> = selected
            .iter()
            .zip(&needs_crop)
            .filter(|(_, needs)| **needs)
            .map(|(name, _)| name.clone())
            .collect();

        info!(
            wanted,
            selected = selected.len(),
            pending = pending.len(),
            "round selected"
        );
        Ok(GameSession::new(selected, pending))
    }

    /// Whether `name` must go through the crop tool. Square images without
    /// a derivative get one written here.
    fn needs_crop(&self, name: &str) -> Result<bool, GameError> {
        if self.images.has_derivative(name) {
            return Ok(false);
        }
        if self.images.is_square(name) {
            self.images.materialize_square(name)?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Shuffle two cards per selected image onto a cleared board.
    fn deal<R: Rng + ?Sized>(session: &mut GameSession, rng: &mut R) {
        session.reset_play();
        let pairs = session.selected_images.len();
        let mut cards: Vec<usize> = (0..pairs).chain(0..pairs).collect();
        cards.shuffle(rng);
        session.cards = cards;
        info!(pairs, "board dealt");
    }

    fn board_view(session: &GameSession) -> BoardView {
        BoardView {
            cards: session.cards.clone(),
            matched: session.matched.clone(),
            current_player: session.current_player,
            player1_pairs: session.player1_matches.len(),
            player2_pairs: session.player2_matches.len(),
            images: session.selected_images.clone(),
        }
    }
}
