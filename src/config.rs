//! Host model configuration and predictor asset settings.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::TranslatorError;

/// Model name reported when the host configuration does not set one.
pub const DEFAULT_MODEL_NAME: &str = "sam2";
/// Default predictor checkpoint.
pub const DEFAULT_CHECKPOINT: &str = "/models/sam2/weights/sam2_hiera_large.pt";
/// Default model config token.
pub const DEFAULT_MODEL_CFG: &str = "sam2_hiera_l";
/// Default directory holding the `sam2/` and `sam2.1/` config trees.
pub const DEFAULT_CONFIG_ROOT: &str = "/opt/sam2/sam2/configs";
/// Default search path handed to the backend's config discovery.
pub const DEFAULT_SEARCH_PATH: [&str; 2] = ["pkg://sam2", "file:///opt/sam2"];

/// Environment variable naming the checkpoint file.
pub const ENV_CHECKPOINT: &str = "SAM2_CHECKPOINT";
/// Environment variable holding the model config token or path.
pub const ENV_MODEL_CFG: &str = "SAM2_MODEL_CFG";
/// Environment variable overriding [`DEFAULT_CONFIG_ROOT`].
pub const ENV_CONFIG_ROOT: &str = "SAM2_CONFIG_ROOT";

const YAML_EXT: &str = ".yaml";

/// The subset of the host model configuration this crate reads.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Reported as `model` in every result. Non-string values are rendered as
    /// JSON text and `null` falls back to [`DEFAULT_MODEL_NAME`].
    #[serde(default = "default_model_name", deserialize_with = "lenient_name")]
    pub name: String,
}

fn default_model_name() -> String {
    DEFAULT_MODEL_NAME.to_string()
}

fn lenient_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => default_model_name(),
        Value::String(name) => name,
        other => other.to_string(),
    })
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
        }
    }
}

impl ModelConfig {
    /// Parses the host's model configuration document. Unknown keys are ignored
    /// and an empty document is treated as `{}`.
    pub fn from_json(text: &str) -> Result<Self, TranslatorError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(text).map_err(TranslatorError::ModelConfig)
    }
}

/// One way of turning the config token into a config identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateSource {
    /// The token itself when it names an existing `.yaml` file.
    ExplicitFile,
    /// `<config_root>/<group>/<token>.yaml`.
    RepoPath,
    /// The normalized `group/name` identifier.
    NormalizedName,
    /// The normalized identifier under `configs/`.
    ConfigsPrefixed,
}

/// The order in which candidate configs are tried by default.
pub const DEFAULT_CANDIDATE_ORDER: [CandidateSource; 4] = [
    CandidateSource::ExplicitFile,
    CandidateSource::RepoPath,
    CandidateSource::NormalizedName,
    CandidateSource::ConfigsPrefixed,
];

/// Where to find the predictor checkpoint and config.
#[derive(Clone, Debug, PartialEq)]
pub struct Sam2Settings {
    pub checkpoint: PathBuf,
    /// Config token (`sam2_hiera_l`, `sam2.1_hiera_small`) or path to a `.yaml` file.
    pub model_cfg: String,
    pub config_root: PathBuf,
    pub search_path: Vec<String>,
    pub candidate_order: Vec<CandidateSource>,
}

impl Default for Sam2Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Sam2Settings {
    /// Reads the settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the settings through `lookup`, using defaults for missing keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            checkpoint: lookup(ENV_CHECKPOINT)
                .unwrap_or_else(|| DEFAULT_CHECKPOINT.to_string())
                .into(),
            model_cfg: lookup(ENV_MODEL_CFG).unwrap_or_else(|| DEFAULT_MODEL_CFG.to_string()),
            config_root: lookup(ENV_CONFIG_ROOT)
                .unwrap_or_else(|| DEFAULT_CONFIG_ROOT.to_string())
                .into(),
            search_path: DEFAULT_SEARCH_PATH.iter().map(|s| s.to_string()).collect(),
            candidate_order: DEFAULT_CANDIDATE_ORDER.to_vec(),
        }
    }

    pub fn with_checkpoint(mut self, checkpoint: impl Into<PathBuf>) -> Self {
        self.checkpoint = checkpoint.into();
        self
    }

    pub fn with_model_cfg(mut self, model_cfg: impl Into<String>) -> Self {
        self.model_cfg = model_cfg.into();
        self
    }

    pub fn with_config_root(mut self, config_root: impl Into<PathBuf>) -> Self {
        self.config_root = config_root.into();
        self
    }

    /// Overrides which candidate sources are tried, and in which order.
    pub fn with_candidate_order(mut self, order: impl Into<Vec<CandidateSource>>) -> Self {
        self.candidate_order = order.into();
        self
    }

    /// Returns the config identifiers to try, most specific first.
    pub fn config_candidates(&self) -> Vec<String> {
        self.config_candidates_with(Path::is_file)
    }

    /// Same as [`Self::config_candidates`] with an injected file check.
    pub fn config_candidates_with(&self, is_file: impl Fn(&Path) -> bool) -> Vec<String> {
        let token = strip_yaml(&self.model_cfg);
        let normalized = normalize_config_name(token);

        let mut candidates: Vec<String> = Vec::new();
        for source in &self.candidate_order {
            let candidate = match source {
                CandidateSource::ExplicitFile => {
                    let path = Path::new(&self.model_cfg);
                    (self.model_cfg.ends_with(YAML_EXT) && is_file(path))
                        .then(|| self.model_cfg.clone())
                }
                CandidateSource::RepoPath => Some(
                    self.config_root
                        .join(config_group(token))
                        .join(format!("{token}{YAML_EXT}"))
                        .to_string_lossy()
                        .into_owned(),
                ),
                CandidateSource::NormalizedName => Some(normalized.clone()),
                CandidateSource::ConfigsPrefixed => (normalized.starts_with("sam2.1/")
                    || normalized.starts_with("sam2/"))
                .then(|| format!("configs/{normalized}")),
            };

            if let Some(candidate) = candidate {
                if !candidates.contains(&candidate) {
                    candidates.push(candidate);
                }
            }
        }
        candidates
    }
}

/// Maps a config token to its `group/name` identifier.
///
/// Size aliases are shortened (`small`, `tiny`, `large`, `base_plus` or
/// `base-plus` become `s`, `t`, `l`, `b+`) and the group is derived from the
/// version prefix.
///
/// ```
/// use sam2_translator::config::normalize_config_name;
///
/// assert_eq!(normalize_config_name("sam2_hiera_large"), "sam2/sam2_hiera_l");
/// assert_eq!(normalize_config_name("sam2.1_hiera_base_plus.yaml"), "sam2.1/sam2.1_hiera_b+");
/// ```
pub fn normalize_config_name(token: &str) -> String {
    let name = strip_yaml(token)
        .replace("base-plus", "base_plus")
        .replace("small", "s")
        .replace("tiny", "t")
        .replace("large", "l")
        .replace("base_plus", "b+");

    if name.starts_with("sam2.1_") {
        format!("sam2.1/{name}")
    } else if name.starts_with("sam2_") {
        format!("sam2/{name}")
    } else {
        name
    }
}

fn strip_yaml(token: &str) -> &str {
    token.strip_suffix(YAML_EXT).unwrap_or(token)
}

fn config_group(token: &str) -> &'static str {
    if token.starts_with("sam2.1_") {
        "sam2.1"
    } else {
        "sam2"
    }
}
