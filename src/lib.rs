//! Cosmic Composers – listen to a spectral data cube.
//!
//! A selected spaxel goes through one of two paths:
//!
//! ```text
//!   DataCube ──compress──▶ FeatureVector ──sonify_intensity──▶ Score ─┐
//!      │                                                              ├─▶ render_score ─▶ .mid + .wav
//!      └──spectrum + labels──decompose──▶ Decomposition ──sonify──▶ Score ─┘
//! ```

pub mod classify;
pub mod compress;
pub mod config;
pub mod data;
pub mod error;
pub mod mapping;
pub mod render;
pub mod score;
pub mod session;
pub mod sonify;

pub use error::{Error, Result};
