//! Loto App Library
//!
//! Application layer of the offline-first loto generator: draws, durable
//! state, the prediction seam, configuration and session boot.

pub mod config;
pub mod draw;
pub mod error;
pub mod generator;
pub mod prefs;
pub mod session;
pub mod state;
pub mod tab;

pub use config::AppConfig;
pub use draw::{initial_draws, Draw, DrawError, History, DRAW_SIZE, MAX_NUMBER, MIN_NUMBER};
pub use error::{AppError, AppResult};
pub use generator::{Generator, PredictionError, PredictionService};
pub use prefs::{FontSize, ThemeName};
pub use session::{open_storage, Session};
pub use state::AppState;
pub use tab::Tab;
