use kornia_image::{Image, allocator::CpuAllocator};
use std::{
    panic::{self, AssertUnwindSafe},
    path::Path,
    sync::Arc,
};

use crate::{config::Sam2Settings, error::BoxError};

/// 8-bit RGB image handed to the predictor.
pub type RgbImage = Image<u8, 3, CpuAllocator>;

/// Single-channel mask produced by the predictor. Any nonzero value is foreground.
pub type Mask = Image<f32, 1, CpuAllocator>;

/// Prompt inputs for one prediction. Absent prompt parts are `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SegmentQuery {
    /// `[x, y]` pixel coordinates of the prompt points.
    pub point_coords: Option<Vec<[f32; 2]>>,
    /// One label per point: `1` foreground, `0` background.
    pub point_labels: Option<Vec<i32>>,
    /// `[x1, y1, x2, y2]` box prompt.
    pub box_xyxy: Option<[f32; 4]>,
    /// Whether the predictor should return several candidate masks.
    pub multimask_output: bool,
}

/// Masks and their confidence scores, best first.
pub struct Prediction {
    pub masks: Vec<Mask>,
    pub scores: Vec<f32>,
}

/// A segmentation model that can be shared across requests.
///
/// Implementations must be safe to call concurrently. The translator holds a
/// single shared handle and does no locking of its own.
pub trait Predictor: Send + Sync {
    /// Runs segmentation on `image` with the given prompt.
    fn predict(&self, image: &RgbImage, query: &SegmentQuery) -> Result<Prediction, BoxError>;
}

/// Where the predictor runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    Cuda,
    Cpu,
}

impl Device {
    /// Returns the device as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cuda => "cuda",
            Device::Cpu => "cpu",
        }
    }
}

/// Everything a backend needs to construct a predictor.
#[derive(Clone, Copy, Debug)]
pub struct BuildSpec<'a> {
    /// Config identifier: a file path or a name known to the backend.
    pub config: &'a str,
    pub checkpoint: &'a Path,
    pub device: Device,
    /// Extra locations the backend should search for named configs.
    pub search_path: &'a [String],
}

/// The optional dependency that knows how to build a [`Predictor`].
pub trait PredictorBackend {
    /// Human readable backend name, used in logs.
    fn name(&self) -> &str;

    /// Checks that the backend's runtime is usable.
    fn check(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Returns `true` when a GPU compute backend is available.
    fn accelerator_available(&self) -> bool {
        false
    }

    /// Builds a predictor from the given config and checkpoint.
    fn build(&self, spec: &BuildSpec<'_>) -> Result<Arc<dyn Predictor>, BoxError>;
}

/// Whether inference can run. Decided once at setup.
#[derive(Clone)]
pub enum Capability {
    /// A predictor was built and is shared by all requests.
    Available(Arc<dyn Predictor>),
    /// Stub mode, with a human readable reason.
    Unavailable { reason: String },
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Available(_) => f.write_str("Available"),
            Capability::Unavailable { reason } => f
                .debug_struct("Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

impl Capability {
    /// Returns the capability as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Available(_) => "available",
            Capability::Unavailable { .. } => "stub",
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }

    /// Tries to build a predictor with `backend`.
    ///
    /// Config candidates from `settings` are tried in order and the first one
    /// that builds wins. Every failure, including a panic inside the backend,
    /// ends in [`Capability::Unavailable`].
    pub fn probe(backend: Option<&dyn PredictorBackend>, settings: &Sam2Settings) -> Self {
        let Some(backend) = backend else {
            return Capability::Unavailable {
                reason: "no segmentation backend is available".to_string(),
            };
        };

        match panic::catch_unwind(AssertUnwindSafe(|| build_predictor(backend, settings))) {
            Ok(Ok(predictor)) => Capability::Available(predictor),
            Ok(Err(reason)) => Capability::Unavailable { reason },
            Err(payload) => Capability::Unavailable {
                reason: format!(
                    "backend {} panicked during setup: {}",
                    backend.name(),
                    panic_message(payload.as_ref())
                ),
            },
        }
    }
}

fn build_predictor(
    backend: &dyn PredictorBackend,
    settings: &Sam2Settings,
) -> Result<Arc<dyn Predictor>, String> {
    backend.check().map_err(|e| e.to_string())?;

    let device = if backend.accelerator_available() {
        Device::Cuda
    } else {
        Device::Cpu
    };
    log::debug!("Backend {} selected device {}", backend.name(), device.as_str());

    let mut last_err: Option<BoxError> = None;
    for config in settings.config_candidates() {
        let spec = BuildSpec {
            config: &config,
            checkpoint: &settings.checkpoint,
            device,
            search_path: &settings.search_path,
        };
        match backend.build(&spec) {
            Ok(predictor) => {
                log::info!(
                    "Built predictor with {} from config {} on {}",
                    backend.name(),
                    config,
                    device.as_str()
                );
                return Ok(predictor);
            }
            Err(e) => {
                log::debug!("Config candidate {config} failed: {e}");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.map_or_else(
        || "unable to load model config".to_string(),
        |e| e.to_string(),
    ))
}

/// Extracts the message carried by a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
