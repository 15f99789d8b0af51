//! Host protocol types: string tensors, requests and per-slot responses.

use std::fmt;

/// A single cell of a host string tensor.
///
/// Hosts hand string tensors over in several physical forms; all of them are
/// normalized through [`coerce_to_string`].
#[derive(Clone, Debug, PartialEq)]
pub enum Element {
    /// Raw bytes, expected to hold UTF-8 text.
    Bytes(Vec<u8>),
    /// A fixed-width byte scalar, padded with trailing NUL bytes.
    FixedBytes(Vec<u8>),
    /// Already decoded text.
    Text(String),
    /// Integer scalar.
    Int(i64),
    /// Floating point scalar.
    Float(f64),
    /// Boolean scalar.
    Bool(bool),
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Bytes(bytes) | Element::FixedBytes(bytes) => {
                write!(f, "{}", String::from_utf8_lossy(bytes))
            }
            Element::Text(text) => f.write_str(text),
            Element::Int(v) => write!(f, "{v}"),
            Element::Float(v) => write!(f, "{v}"),
            Element::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Element {
    fn from(value: &str) -> Self {
        Element::Text(value.to_string())
    }
}

impl From<String> for Element {
    fn from(value: String) -> Self {
        Element::Text(value)
    }
}

impl From<Vec<u8>> for Element {
    fn from(value: Vec<u8>) -> Self {
        Element::Bytes(value)
    }
}

/// Normalizes a tensor cell into a plain string.
///
/// The conversion is total:
///
/// | element      | result                                         |
/// |--------------|------------------------------------------------|
/// | `Bytes`      | UTF-8 decode, lossy on invalid sequences       |
/// | `FixedBytes` | trailing NULs stripped, then as `Bytes`        |
/// | `Text`       | returned unchanged                             |
/// | scalars      | their display form                             |
///
/// Valid UTF-8 input always round-trips exactly.
pub fn coerce_to_string(element: &Element) -> String {
    match element {
        Element::Bytes(bytes) => decode_utf8(bytes),
        Element::FixedBytes(bytes) => {
            let end = bytes
                .iter()
                .rposition(|&b| b != 0)
                .map_or(0, |last| last + 1);
            decode_utf8(&bytes[..end])
        }
        Element::Text(text) => text.clone(),
        other => other.to_string(),
    }
}

fn decode_utf8(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(e) => {
            log::debug!("Input is not valid UTF-8 ({e}), decoding lossily");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// A named string tensor exchanged with the host.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    /// Tensor name as declared in the host model configuration.
    pub name: String,
    /// Tensor dimensions. The data is stored flattened in row-major order.
    pub shape: Vec<usize>,
    /// Flattened tensor cells.
    pub data: Vec<Element>,
}

impl Tensor {
    /// Creates a one-dimensional tensor holding the given strings.
    pub fn from_strings<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let data: Vec<Element> = values
            .into_iter()
            .map(|v| Element::Text(v.into()))
            .collect();
        Self {
            name: name.into(),
            shape: vec![data.len()],
            data,
        }
    }

    /// Returns the first cell of the flattened tensor as a string.
    ///
    /// Inputs shaped `[1]`, `[1, 1]` or `[B, 1]` are all accepted. Returns `None`
    /// when the tensor is empty.
    pub fn first_string(&self) -> Option<String> {
        self.data.first().map(coerce_to_string)
    }
}

/// A single request of a host batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InferenceRequest {
    /// Input tensors attached to the request.
    pub inputs: Vec<Tensor>,
}

impl InferenceRequest {
    /// Creates a request from its input tensors.
    pub fn new(inputs: Vec<Tensor>) -> Self {
        Self { inputs }
    }

    /// Looks up an input tensor by name.
    pub fn input(&self, name: &str) -> Option<&Tensor> {
        self.inputs.iter().find(|t| t.name == name)
    }
}

/// The content of one response slot returned to the host.
#[derive(Clone, Debug, PartialEq)]
pub enum InferenceResponse {
    /// The request succeeded and produced these output tensors.
    Success { outputs: Vec<Tensor> },
    /// The request failed; the message is surfaced to the client as-is.
    Error { message: String },
}

impl InferenceResponse {
    /// Returns `true` when the slot carries an error descriptor.
    pub fn is_error(&self) -> bool {
        matches!(self, InferenceResponse::Error { .. })
    }

    /// Looks up an output tensor by name on a successful response.
    pub fn output(&self, name: &str) -> Option<&Tensor> {
        match self {
            InferenceResponse::Success { outputs } => outputs.iter().find(|t| t.name == name),
            InferenceResponse::Error { .. } => None,
        }
    }
}
