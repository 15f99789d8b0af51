use kornia_image::{ImageSize, allocator::CpuAllocator};
use sam2_translator::{
    BoxError, BuildSpec, Mask, Prediction, Predictor, PredictorBackend, RgbImage, SegmentQuery,
};
use std::sync::Arc;

/// Half-width of the square painted around each foreground point.
const POINT_RADIUS: f32 = 8.0;

/// A toy backend whose predictor paints the prompt box and squares around
/// foreground points. Useful to exercise the full request path without weights.
pub struct RectBackend;

impl PredictorBackend for RectBackend {
    fn name(&self) -> &str {
        "rect"
    }

    fn build(&self, spec: &BuildSpec<'_>) -> Result<Arc<dyn Predictor>, BoxError> {
        log::info!("Building rect predictor for config {}", spec.config);
        Ok(Arc::new(RectPredictor))
    }
}

struct RectPredictor;

impl Predictor for RectPredictor {
    fn predict(&self, image: &RgbImage, query: &SegmentQuery) -> Result<Prediction, BoxError> {
        let (width, height) = (image.width(), image.height());
        let mut data = vec![0.0f32; width * height];

        let mut regions: Vec<[f32; 4]> = query.box_xyxy.into_iter().collect();
        if let (Some(coords), Some(labels)) = (&query.point_coords, &query.point_labels) {
            for ([x, y], label) in coords.iter().zip(labels) {
                if *label == 1 {
                    regions.push([
                        x - POINT_RADIUS,
                        y - POINT_RADIUS,
                        x + POINT_RADIUS,
                        y + POINT_RADIUS,
                    ]);
                }
            }
        }

        for [x1, y1, x2, y2] in &regions {
            let clamp = |v: f32, max: usize| (v.max(0.0) as usize).min(max);
            for row in clamp(*y1, height)..clamp(*y2, height) {
                for col in clamp(*x1, width)..clamp(*x2, width) {
                    data[row * width + col] = 1.0;
                }
            }
        }

        let covered = data.iter().filter(|v| **v != 0.0).count() as f32;
        let mask = Mask::new(ImageSize { width, height }, data, CpuAllocator)?;

        Ok(Prediction {
            masks: vec![mask],
            scores: vec![covered / (width * height).max(1) as f32],
        })
    }
}
