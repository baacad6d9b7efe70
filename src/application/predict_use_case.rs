// ============================================================
// Layer 2 — Predict Use Case
// ============================================================
// Loads the fine-tuned model for a task and runs it on one
// input. Also home of `load_generator`, the best-effort load
// the HTTP service performs at start-up.

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::domain::traits::{GenerationOutput, GenerationParams, TextGenerator};

pub struct PredictUseCase {
    generator: Arc<dyn TextGenerator>,
}

impl PredictUseCase {
    /// Load the model named by `config.paths.model_dir`.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_generator(try_load(config)?))
    }

    pub fn with_generator(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub fn execute(&self, input: &str, params: &GenerationParams) -> Result<GenerationOutput> {
        if input.trim().is_empty() {
            anyhow::bail!("input text is empty");
        }
        let out = self.generator.generate(input, params)?;
        tracing::info!(
            "Generated {} words from {} input words",
            out.output_length,
            out.input_length
        );
        Ok(out)
    }
}

/// Load the model for serving. Failure is logged and yields `None`, so
/// the service can still start and answer 503.
pub fn load_generator(config: &Config) -> Option<Arc<dyn TextGenerator>> {
    match try_load(config) {
        Ok(g) => {
            tracing::info!("{} model ready: {}", config.task.label(), g.model_name());
            Some(g)
        }
        Err(e) => {
            tracing::warn!("Failed to load {} model: {e:#}", config.task.slug());
            None
        }
    }
}

#[cfg(feature = "ml")]
fn try_load(config: &Config) -> Result<Arc<dyn TextGenerator>> {
    use crate::infra::hub::HubClient;
    use crate::ml::inferencer::Inferencer;

    let hub = HubClient::from_env()?;
    Ok(Arc::new(Inferencer::load(config, &hub)?))
}

#[cfg(not(feature = "ml"))]
fn try_load(_config: &Config) -> Result<Arc<dyn TextGenerator>> {
    anyhow::bail!("inference requires the `ml` feature (rust-bert + libtorch)")
}
