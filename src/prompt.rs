use serde_json::{Map, Value, json};

use crate::predictor::SegmentQuery;

/// Label of a foreground point. Used when a point omits its label.
pub const FOREGROUND: i32 = 1;
/// Label of a background point.
pub const BACKGROUND: i32 = 0;

/// A click prompt in image pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    /// `1` for foreground, `0` for background.
    pub label: i32,
}

/// A segmentation prompt parsed from the `prompt_json` input.
///
/// Expected layout:
/// `{"points": [{"x": 10, "y": 20, "label": 1}], "boxes": [x1, y1, x2, y2]}`.
/// Every field is optional.
#[derive(Clone, Debug, PartialEq)]
pub struct Prompt {
    points: Vec<Point>,
    bbox: Option<[f32; 4]>,
    raw: Value,
}

impl Default for Prompt {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            bbox: None,
            raw: json!({ "points": [], "boxes": [] }),
        }
    }
}

impl Prompt {
    /// Parses a prompt document. This never fails.
    ///
    /// Malformed JSON yields the empty prompt. A document that is not an object
    /// carries no points or box but is still echoed as sent. Point entries that
    /// are not objects or carry non-numeric coordinates are skipped. The box is
    /// kept only when `boxes` holds exactly four numbers.
    pub fn parse(text: &str) -> Self {
        let raw: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                log::debug!("Prompt is not valid JSON ({e}), using an empty prompt");
                return Self::default();
            }
        };

        let Some(doc) = raw.as_object() else {
            log::debug!("Prompt is not a JSON object, ignoring its contents");
            return Self {
                points: Vec::new(),
                bbox: None,
                raw,
            };
        };

        let points = doc
            .get("points")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(parse_point).collect())
            .unwrap_or_default();

        let bbox = doc.get("boxes").and_then(parse_box);

        Self { points, bbox, raw }
    }

    /// The prompt points, in document order.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// The `[x1, y1, x2, y2]` box, if one was given.
    pub fn bbox(&self) -> Option<[f32; 4]> {
        self.bbox
    }

    /// The parsed document, echoed back in results.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Builds a predictor query, leaving absent prompt parts unset.
    pub fn to_query(&self, multimask_output: bool) -> SegmentQuery {
        let (point_coords, point_labels) = if self.points.is_empty() {
            (None, None)
        } else {
            (
                Some(self.points.iter().map(|p| [p.x, p.y]).collect()),
                Some(self.points.iter().map(|p| p.label).collect()),
            )
        };

        SegmentQuery {
            point_coords,
            point_labels,
            box_xyxy: self.bbox,
            multimask_output,
        }
    }
}

fn parse_point(entry: &Value) -> Option<Point> {
    let fields = entry.as_object()?;
    Some(Point {
        x: number_field(fields, "x", 0.0)? as f32,
        y: number_field(fields, "y", 0.0)? as f32,
        label: number_field(fields, "label", FOREGROUND as f64)? as i32,
    })
}

/// Reads a numeric field, falling back to `default` when the field is absent.
/// Returns `None` when the field is present but not a number.
fn number_field(fields: &Map<String, Value>, key: &str, default: f64) -> Option<f64> {
    match fields.get(key) {
        None | Some(Value::Null) => Some(default),
        Some(value) => as_number(value),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn parse_box(value: &Value) -> Option<[f32; 4]> {
    let items = value.as_array()?;
    if items.len() != 4 {
        return None;
    }
    let mut out = [0.0f32; 4];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item.as_f64()? as f32;
    }
    Some(out)
}
