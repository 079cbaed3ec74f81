use std::sync::Arc;

use tokio::task;

use crate::{
    config::AppConfig,
    engine::{GenerationParams, InferenceEngine, InferenceResult},
    error::ServiceError,
    heal::heal_prompt,
};

/// The single loaded-engine resource. Constructed once at startup and
/// injected into the router; read-only afterwards. A failed load leaves the
/// service permanently degraded until restart.
pub struct ModelState {
    engine: Option<Arc<dyn InferenceEngine>>,
    model_file: String,
}

impl ModelState {
    pub fn initialize(config: &AppConfig) -> Self {
        let model_file = config.model_file();

        let Some(path) = config.model_path.as_ref() else {
            tracing::error!("MODEL_PATH environment variable not set");
            return Self::unavailable(model_file);
        };
        if !path.exists() {
            tracing::error!(path = %path.display(), "model file not found");
            return Self::unavailable(model_file);
        }

        #[cfg(feature = "llama-backend")]
        {
            tracing::info!(path = %path.display(), "loading model");
            match crate::engine::llama::LlamaEngine::load(
                path,
                config.n_ctx,
                config.n_batch,
                config.n_threads,
            ) {
                Ok(engine) => Self::with_engine(Arc::new(engine), model_file),
                Err(e) => {
                    tracing::error!(error = %e, "failed to load model");
                    Self::unavailable(model_file)
                }
            }
        }
        #[cfg(not(feature = "llama-backend"))]
        {
            tracing::error!("built without an inference backend");
            Self::unavailable(model_file)
        }
    }

    pub fn with_engine(engine: Arc<dyn InferenceEngine>, model_file: impl Into<String>) -> Self {
        Self {
            engine: Some(engine),
            model_file: model_file.into(),
        }
    }

    pub fn unavailable(model_file: impl Into<String>) -> Self {
        Self {
            engine: None,
            model_file: model_file.into(),
        }
    }

    pub fn available(&self) -> bool {
        self.engine.is_some()
    }

    pub fn model_file(&self) -> &str {
        &self.model_file
    }

    fn engine(&self) -> Result<Arc<dyn InferenceEngine>, ServiceError> {
        self.engine.clone().ok_or(ServiceError::ModelUnavailable)
    }

    /// Chat-style generation: no boundary healing, prompt sent as rendered.
    pub async fn generate(
        &self,
        prompt: String,
        params: GenerationParams,
    ) -> Result<InferenceResult, ServiceError> {
        let engine = self.engine()?;
        task::spawn_blocking(move || engine.generate(&prompt, None, &params))
            .await
            .map_err(|e| ServiceError::Inference(format!("inference task failed: {e}")))?
            .map_err(|e| ServiceError::Inference(e.to_string()))
    }

    /// Completion-style generation: heals the prompt boundary first and
    /// returns the lost prefix text alongside the result, for the caller to
    /// prepend to the generated text.
    pub async fn generate_healed(
        &self,
        prompt: String,
        suffix: Option<String>,
        params: GenerationParams,
    ) -> Result<(InferenceResult, String), ServiceError> {
        let engine = self.engine()?;
        task::spawn_blocking(move || {
            let (healed, lost) = heal_prompt(engine.as_ref(), &prompt);
            engine
                .generate(&healed, suffix.as_deref(), &params)
                .map(|result| (result, lost))
        })
        .await
        .map_err(|e| ServiceError::Inference(format!("inference task failed: {e}")))?
        .map_err(|e| ServiceError::Inference(e.to_string()))
    }
}
