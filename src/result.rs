use serde::Serialize;
use serde_json::Value;

/// Message attached to results produced by the predictor.
pub const INFERENCE_MESSAGE: &str = "sam2 inference";
/// Message attached to results produced in stub mode.
pub const STUB_MESSAGE: &str = "stub response - SAM2 not installed in image";

/// The record serialized into the `result_json` output.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TranslationResult {
    pub model: String,
    pub ok: bool,
    pub message: String,
    /// Why the predictor could not be built. Only set in stub mode.
    #[serde(rename = "sam2_error", skip_serializing_if = "Option::is_none")]
    pub setup_error: Option<String>,
    pub inputs: EchoedInputs,
    pub scores: Option<Vec<f32>>,
    pub mask: MaskPayload,
}

/// A lightweight echo of the request, without the image payload itself.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EchoedInputs {
    /// The parsed prompt, echoed after inference.
    Parsed { image_b64_len: usize, prompt: Value },
    /// The raw prompt string, echoed in stub mode.
    Raw {
        image_b64_len: usize,
        prompt_json: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskFormat {
    PngBase64,
    None,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MaskPayload {
    pub format: MaskFormat,
    pub data: Option<String>,
}

impl TranslationResult {
    /// Builds the result of a successful prediction.
    pub fn inference(
        model: &str,
        image_b64_len: usize,
        prompt: Value,
        score: Option<f32>,
        mask_png_b64: String,
    ) -> Self {
        Self {
            model: model.to_string(),
            ok: true,
            message: INFERENCE_MESSAGE.to_string(),
            setup_error: None,
            inputs: EchoedInputs::Parsed {
                image_b64_len,
                prompt,
            },
            scores: score.map(|s| vec![s]),
            mask: MaskPayload {
                format: MaskFormat::PngBase64,
                data: Some(mask_png_b64),
            },
        }
    }

    /// Builds the inference-free result returned in stub mode.
    pub fn stub(model: &str, reason: &str, image_b64_len: usize, prompt_json: String) -> Self {
        Self {
            model: model.to_string(),
            ok: true,
            message: STUB_MESSAGE.to_string(),
            setup_error: Some(reason.to_string()),
            inputs: EchoedInputs::Raw {
                image_b64_len,
                prompt_json,
            },
            scores: None,
            mask: MaskPayload {
                format: MaskFormat::None,
                data: None,
            },
        }
    }

    /// Serializes the result into the `result_json` document.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
