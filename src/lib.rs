//! # Memory Match
//!
//! A two-player memory matching game served over HTTP. A folder of photos is
//! the deck: each round samples `width * height / 2` of them, deals every one
//! twice face down, and the players take turns flipping pairs.
//!
//! # Architecture
//!
//! ```text
//! img/ ──► Catalog ──sample──► Engine ──► SessionStore (one record per browser)
//!                                │
//!                                ▼
//!                           Normalizer ──► img/squared/<stem>_square.jpg
//!                                │
//!                                ▼
//!                          ImageBackend (decode, orient, crop, encode)
//! ```
//!
//! Card faces must be square. When a round is selected, images that are
//! already square get a cached derivative straight away; the rest are queued
//! and the browser walks the player through cropping each one. The board is
//! dealt once the queue is empty. Cropped squares stay cached, so a photo is
//! only ever cropped once.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Round selection, dealing, turn and scoring rules |
//! | [`session`] | The per-session game record and its invariants |
//! | [`store`] | Session storage trait and the in-memory store |
//! | [`catalog`] | Base image listing and reservoir sampling |
//! | [`normalizer`] | Square checks, crop suggestions, the derivative cache, path policy |
//! | [`imaging`] | Pure-Rust decode, EXIF orientation, crop and JPEG encode |
//! | [`api`] | JSON request and response bodies |
//! | [`server`] | axum routes, session cookie, error status mapping |
//! | [`config`] | `config.toml` loading, validation, and merging |
//! | [`output`] | CLI output formatting for `check` |
//!
//! # Design Decisions
//!
//! ## Whole-Record Commits
//!
//! The engine loads a session, mutates a copy, and writes it back only when
//! the operation succeeds. A rejected flip or crop never leaves the game
//! half-updated, and stored records are validated on load, so a corrupt or
//! outdated record is replaced by a fresh game instead of being trusted.
//!
//! ## Path Policy at One Boundary
//!
//! Every filename reaching the server is untrusted. [`normalizer::Normalizer`]
//! is the only place that turns names into paths, and it answers "not found"
//! for anything that escapes the image directory, whether by `..`, an
//! absolute path, or a symlink.

pub mod api;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod imaging;
pub mod normalizer;
pub mod output;
pub mod server;
pub mod session;
pub mod store;
