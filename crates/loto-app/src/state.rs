//! Durable application state.

use crate::draw::{initial_draws, Draw, History};
use crate::error::AppResult;
use crate::prefs::{FontSize, ThemeName};
use loto_storage::{Hydration, PendingWrite, PersistedCell, Storage};
use tracing::{debug, info};

pub const PAST_DRAWS_KEY: &str = "pastDraws";
pub const GENERATED_HISTORY_KEY: &str = "generatedHistory";
pub const THEME_NAME_KEY: &str = "themeName";
pub const FONT_SIZE_KEY: &str = "fontSize";
pub const AGE_CONFIRMED_KEY: &str = "ageConfirmed";

/// Everything the app keeps across reloads, one cell per store key.
///
/// Histories are most recent first.
#[derive(Debug)]
pub struct AppState {
    storage: Storage,
    past_draws: PersistedCell<History>,
    generated_history: PersistedCell<History>,
    theme_name: PersistedCell<ThemeName>,
    font_size: PersistedCell<FontSize>,
    age_confirmed: PersistedCell<bool>,
}

impl AppState {
    /// Hydrate every cell from `storage`.
    pub async fn load(storage: &Storage) -> Self {
        let state = Self {
            storage: storage.clone(),
            past_draws: PersistedCell::create(storage, PAST_DRAWS_KEY, initial_draws().into())
                .await,
            generated_history: PersistedCell::create(
                storage,
                GENERATED_HISTORY_KEY,
                History::default(),
            )
            .await,
            theme_name: PersistedCell::create(storage, THEME_NAME_KEY, ThemeName::default()).await,
            font_size: PersistedCell::create(storage, FONT_SIZE_KEY, FontSize::default()).await,
            age_confirmed: PersistedCell::create(storage, AGE_CONFIRMED_KEY, false).await,
        };

        let loaded = state
            .hydration_report()
            .iter()
            .filter(|(_, h)| h.is_loaded())
            .count();
        info!(loaded, total = 5, "App state hydrated");
        state
    }

    // ==================== Accessors ====================

    pub fn past_draws(&self) -> &[Draw] {
        self.past_draws.read()
    }

    pub fn generated_history(&self) -> &[Draw] {
        self.generated_history.read()
    }

    pub fn theme_name(&self) -> ThemeName {
        *self.theme_name.read()
    }

    pub fn font_size(&self) -> FontSize {
        *self.font_size.read()
    }

    pub fn age_confirmed(&self) -> bool {
        *self.age_confirmed.read()
    }

    /// Most recently generated draw, if any.
    pub fn latest_generated(&self) -> Option<&Draw> {
        self.generated_history.first()
    }

    /// How each cell got its value, keyed by store key.
    pub fn hydration_report(&self) -> [(&str, &Hydration); 5] {
        [
            (self.past_draws.key(), self.past_draws.hydration()),
            (self.generated_history.key(), self.generated_history.hydration()),
            (self.theme_name.key(), self.theme_name.hydration()),
            (self.font_size.key(), self.font_size.hydration()),
            (self.age_confirmed.key(), self.age_confirmed.hydration()),
        ]
    }

    // ==================== Preferences ====================

    pub fn set_theme_name(&mut self, theme: ThemeName) -> PendingWrite {
        self.theme_name.set(theme)
    }

    pub fn set_font_size(&mut self, size: FontSize) -> PendingWrite {
        self.font_size.set(size)
    }

    pub fn set_age_confirmed(&mut self, confirmed: bool) -> PendingWrite {
        self.age_confirmed.set(confirmed)
    }

    /// Put all three preferences back to their defaults and drop their
    /// stored values.
    pub fn reset_preferences(&mut self) {
        let _ = self.theme_name.reset();
        let _ = self.font_size.reset();
        let _ = self.age_confirmed.reset();
    }

    // ==================== Histories ====================

    /// Prepend an officially drawn result, in the order it was entered.
    pub fn add_past_draw(&mut self, draw: Draw) -> PendingWrite {
        debug!(%draw, "Adding past draw");
        self.past_draws.update(move |prev| prev.prepended(draw))
    }

    /// Validate `values` as a draw and prepend it, sorted, to the generated
    /// history.
    ///
    /// Invalid values leave the history untouched.
    pub fn record_generated_draw(&mut self, values: &[u32]) -> AppResult<Draw> {
        let draw = Draw::from_values(values)?.sorted();
        let _ = self
            .generated_history
            .update(move |prev| prev.prepended(draw));
        debug!(%draw, "Recorded generated draw");
        Ok(draw)
    }

    /// Wait for every queued write to be attempted.
    pub async fn flush(&self) {
        self.storage.flush().await;
    }
}
