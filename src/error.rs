/// Boxed error returned by predictor backends.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while setting up the translator or handling a single request.
///
/// Per-request variants never escape [`crate::Translator::handle`]; they are turned
/// into the error descriptor of the failing response slot.
#[derive(Debug, thiserror::Error)]
pub enum TranslatorError {
    /// A required input tensor was not part of the request.
    #[error("missing required input: {0}")]
    MissingInput(&'static str),

    /// A required input tensor carried no elements.
    #[error("input tensor {0} is empty")]
    EmptyInput(&'static str),

    /// The image payload is not valid base64.
    #[error("invalid base64 image payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded bytes are not a supported image.
    #[error("unable to decode image: {0}")]
    ImageFormat(#[from] image::ImageError),

    /// The decoded pixels do not fit the requested image layout.
    #[error("invalid image buffer: {0}")]
    ImageBuffer(#[from] kornia_image::ImageError),

    /// The predictor failed while running inference.
    #[error("inference failed: {0}")]
    Inference(BoxError),

    /// The predictor returned no mask.
    #[error("predictor returned no mask")]
    NoMask,

    /// The mask could not be packed into a grayscale PNG.
    #[error("mask of size {width}x{height} does not match its buffer")]
    MaskEncode { width: usize, height: usize },

    /// The result record could not be serialized.
    #[error("unable to serialize result: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The host model configuration is not valid JSON.
    #[error("invalid model configuration: {0}")]
    ModelConfig(serde_json::Error),
}
