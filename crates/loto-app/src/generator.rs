//! Number generation through an external prediction service.

use crate::draw::Draw;
use crate::error::AppError;
use crate::state::AppState;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

/// Failure reported by a prediction backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredictionError {
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("malformed reply: {0}")]
    Malformed(String),
}

/// Suggests the next draw from past results.
///
/// The reply is untrusted; callers validate it as a [`Draw`].
#[async_trait]
pub trait PredictionService: Send + Sync {
    async fn predict(&self, past_draws: &[Draw]) -> Result<Vec<u32>, PredictionError>;
}

/// UI-side state of the generate action.
#[derive(Debug, Default)]
pub struct Generator {
    is_loading: bool,
    latest: Option<Draw>,
    error: Option<String>,
}

impl Generator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Draw produced by the last successful run.
    pub fn latest(&self) -> Option<&Draw> {
        self.latest.as_ref()
    }

    /// User-visible message from the last failed run.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Ask `service` for a draw and record it in `state`.
    ///
    /// Any failure clears `latest`, leaves the history unchanged and is kept
    /// as a message instead of being returned.
    pub async fn generate(
        &mut self,
        state: &mut AppState,
        service: &dyn PredictionService,
    ) -> Option<Draw> {
        self.is_loading = true;
        self.error = None;
        self.latest = None;

        let result = match service.predict(state.past_draws()).await {
            Ok(values) => state.record_generated_draw(&values),
            Err(e) => Err(AppError::from(e)),
        };
        self.is_loading = false;

        match result {
            Ok(draw) => {
                info!(%draw, "Generated draw");
                self.latest = Some(draw);
                Some(draw)
            }
            Err(e) => {
                warn!(error = %e, category = e.category(), "Generation failed");
                self.error = Some(e.user_message());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loto_storage::{MemoryStore, Storage};
    use std::sync::Arc;

    struct Fixed(Result<Vec<u32>, PredictionError>);

    #[async_trait]
    impl PredictionService for Fixed {
        async fn predict(&self, _past: &[Draw]) -> Result<Vec<u32>, PredictionError> {
            self.0.clone()
        }
    }

    async fn state() -> AppState {
        AppState::load(&Storage::new(Arc::new(MemoryStore::new()))).await
    }

    #[tokio::test]
    async fn test_generate_records_sorted_draw() {
        let mut state = state().await;
        let mut generator = Generator::new();

        let draw = generator
            .generate(&mut state, &Fixed(Ok(vec![40, 2, 33, 18, 5, 11])))
            .await
            .unwrap();

        assert_eq!(draw.numbers(), [2, 5, 11, 18, 33, 40]);
        assert_eq!(generator.latest(), Some(&draw));
        assert!(generator.error().is_none());
        assert!(!generator.is_loading());
        assert_eq!(state.generated_history(), &[draw]);
    }

    #[tokio::test]
    async fn test_service_error_becomes_message() {
        let mut state = state().await;
        let mut generator = Generator::new();

        let out = generator
            .generate(
                &mut state,
                &Fixed(Err(PredictionError::Unavailable("quota".into()))),
            )
            .await;

        assert!(out.is_none());
        assert!(generator.error().unwrap().contains("quota"));
        assert!(state.generated_history().is_empty());
    }

    #[tokio::test]
    async fn test_retry_clears_previous_error() {
        let mut state = state().await;
        let mut generator = Generator::new();

        generator
            .generate(&mut state, &Fixed(Ok(vec![1, 2, 3])))
            .await;
        assert!(generator.error().is_some());

        generator
            .generate(&mut state, &Fixed(Ok(vec![1, 2, 3, 4, 5, 6])))
            .await;
        assert!(generator.error().is_none());
        assert_eq!(state.generated_history().len(), 1);
    }
}
