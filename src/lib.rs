//! Request translation for a SAM2 segmentation endpoint hosted by an inference server.
//!
//! The host hands over batches of string tensors (`image_b64`, `prompt_json`) and
//! receives one `result_json` string or an error per request. Segmentation runs
//! through a [`Predictor`] built at setup by an optional [`PredictorBackend`];
//! without one, the translator answers in stub mode.

pub mod codec;
pub mod config;
mod error;
pub mod predictor;
pub mod prompt;
pub mod result;
pub mod tensor;
mod translator;

pub use config::{ModelConfig, Sam2Settings};
pub use error::{BoxError, TranslatorError};
pub use predictor::{
    BuildSpec, Capability, Device, Mask, Prediction, Predictor, PredictorBackend, RgbImage,
    SegmentQuery,
};
pub use prompt::{Point, Prompt};
pub use result::TranslationResult;
pub use tensor::{Element, InferenceRequest, InferenceResponse, Tensor, coerce_to_string};
pub use translator::{IMAGE_INPUT, PROMPT_INPUT, RESULT_OUTPUT, Translator};
