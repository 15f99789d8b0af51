use std::panic::{self, AssertUnwindSafe};

use crate::{
    codec,
    config::{ModelConfig, Sam2Settings},
    error::TranslatorError,
    predictor::{Capability, PredictorBackend, panic_message},
    prompt::Prompt,
    result::TranslationResult,
    tensor::{InferenceRequest, InferenceResponse, Tensor},
};

/// Name of the base64 image input tensor.
pub const IMAGE_INPUT: &str = "image_b64";
/// Name of the JSON prompt input tensor.
pub const PROMPT_INPUT: &str = "prompt_json";
/// Name of the JSON result output tensor.
pub const RESULT_OUTPUT: &str = "result_json";

/// Translates host requests into predictor calls and predictor output into
/// host responses.
///
/// The host calls [`Translator::setup`] once, [`Translator::handle`] for every
/// batch, possibly from several threads at once, and [`Translator::teardown`]
/// when the model is unloaded.
#[derive(Debug)]
pub struct Translator {
    model_name: String,
    capability: Capability,
}

impl Translator {
    /// Sets the translator up from the host model configuration.
    ///
    /// Building the predictor is best effort: when `backend` is missing or
    /// fails, the translator runs in stub mode and reports the reason in every
    /// result. Only a malformed `model_config` document is an error.
    ///
    /// # Arguments
    /// * `model_config` - The host model configuration, as JSON
    /// * `settings` - Checkpoint and config locations for the predictor
    /// * `backend` - The predictor backend, if one is linked in
    pub fn setup(
        model_config: &str,
        settings: &Sam2Settings,
        backend: Option<&dyn PredictorBackend>,
    ) -> Result<Self, TranslatorError> {
        let config = ModelConfig::from_json(model_config)?;
        let capability = Capability::probe(backend, settings);

        match &capability {
            Capability::Available(_) => {
                log::info!("Model {} ready for inference", config.name)
            }
            Capability::Unavailable { reason } => {
                log::warn!("Model {} running in stub mode: {}", config.name, reason)
            }
        }

        Ok(Self::with_capability(config.name, capability))
    }

    /// Creates a translator around an already probed capability.
    pub fn with_capability(model_name: impl Into<String>, capability: Capability) -> Self {
        Self {
            model_name: model_name.into(),
            capability,
        }
    }

    /// The model name reported in every result.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Whether the predictor was built at setup, or why not.
    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Handles a batch of requests.
    ///
    /// Returns exactly one response per request, in request order. A failing
    /// request yields an error response for its own slot and does not affect
    /// the rest of the batch.
    pub fn handle(&self, requests: &[InferenceRequest]) -> Vec<InferenceResponse> {
        log::debug!("Handling a batch of {} requests", requests.len());

        requests
            .iter()
            .map(|request| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.translate(request)))
                    .unwrap_or_else(|payload| {
                        Err(TranslatorError::Inference(
                            format!(
                                "request handler panicked: {}",
                                panic_message(payload.as_ref())
                            )
                            .into(),
                        ))
                    });

                match outcome {
                    Ok(result_json) => InferenceResponse::Success {
                        outputs: vec![Tensor::from_strings(RESULT_OUTPUT, [result_json])],
                    },
                    Err(e) => {
                        log::warn!("Request failed: {e}");
                        InferenceResponse::Error {
                            message: e.to_string(),
                        }
                    }
                }
            })
            .collect()
    }

    /// Called by the host when the model is unloaded. The predictor is released
    /// when the translator is dropped.
    pub fn teardown(&mut self) {
        log::info!("Unloading model {}", self.model_name);
    }

    fn translate(&self, request: &InferenceRequest) -> Result<String, TranslatorError> {
        let image_b64 = required_input(request, IMAGE_INPUT)?;
        let prompt_json = required_input(request, PROMPT_INPUT)?;

        let result = match &self.capability {
            Capability::Available(predictor) => {
                let image = codec::decode_image(&image_b64)?;
                let prompt = Prompt::parse(&prompt_json);

                let prediction = predictor
                    .predict(&image, &prompt.to_query(false))
                    .map_err(TranslatorError::Inference)?;
                let mask = prediction.masks.first().ok_or(TranslatorError::NoMask)?;

                TranslationResult::inference(
                    &self.model_name,
                    image_b64.len(),
                    prompt.raw().clone(),
                    prediction.scores.first().copied(),
                    codec::encode_mask(mask)?,
                )
            }
            Capability::Unavailable { reason } => {
                TranslationResult::stub(&self.model_name, reason, image_b64.len(), prompt_json)
            }
        };

        Ok(result.to_json()?)
    }
}

fn required_input(
    request: &InferenceRequest,
    name: &'static str,
) -> Result<String, TranslatorError> {
    request
        .input(name)
        .ok_or(TranslatorError::MissingInput(name))?
        .first_string()
        .ok_or(TranslatorError::EmptyInput(name))
}
