//! Log generation collaborator
//!
//! The engine only knows the [`LogGenerator`] trait; what a "fire" actually
//! produces is up to the implementation.

mod synthetic;

pub use synthetic::{render_prometheus, SyntheticLogGenerator};

use async_trait::async_trait;

use crate::models::{GenerationResult, ScenarioConfig};

#[async_trait]
pub trait LogGenerator: Send + Sync {
    /// Produce one batch for `scenario_type`. Cancellation is done by
    /// dropping the future, so implementations must not rely on running to
    /// completion.
    async fn run(&self, scenario_type: &str, config: &ScenarioConfig) -> GenerationResult;
}
