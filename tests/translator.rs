use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{ImageFormat, Rgb};
use kornia_image::{ImageSize, allocator::CpuAllocator};
use sam2_translator::{
    BoxError, BuildSpec, Capability, Element, IMAGE_INPUT, InferenceRequest, InferenceResponse,
    Mask, PROMPT_INPUT, Prediction, Predictor, PredictorBackend, RESULT_OUTPUT, RgbImage,
    Sam2Settings, SegmentQuery, Tensor, Translator, result::STUB_MESSAGE,
};
use serde_json::{Value, json};
use std::{
    io::Cursor,
    sync::{Arc, Mutex},
};

fn png_b64(width: u32, height: u32) -> String {
    let img = image::RgbImage::from_pixel(width, height, Rgb([200, 10, 10]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    STANDARD.encode(buf.into_inner())
}

fn request(image_b64: &str, prompt_json: &str) -> InferenceRequest {
    InferenceRequest::new(vec![
        Tensor::from_strings(IMAGE_INPUT, [image_b64]),
        Tensor::from_strings(PROMPT_INPUT, [prompt_json]),
    ])
}

fn result_of(response: &InferenceResponse) -> Value {
    let tensor = response.output(RESULT_OUTPUT).expect("result_json output");
    assert_eq!(tensor.shape, vec![1]);
    serde_json::from_str(&tensor.first_string().unwrap()).unwrap()
}

fn stub_translator() -> Translator {
    Translator::setup("{}", &Sam2Settings::default(), None).unwrap()
}

/// Marks the left half of the image as foreground and records every query.
#[derive(Default)]
struct HalfPredictor {
    queries: Mutex<Vec<SegmentQuery>>,
}

impl Predictor for HalfPredictor {
    fn predict(&self, image: &RgbImage, query: &SegmentQuery) -> Result<Prediction, BoxError> {
        self.queries.lock().unwrap().push(query.clone());

        let (width, height) = (image.width(), image.height());
        let data = (0..width * height)
            .map(|i| if i % width < width / 2 { 1.0 } else { 0.0 })
            .collect();
        let mask = Mask::new(ImageSize { width, height }, data, CpuAllocator)?;

        Ok(Prediction {
            masks: vec![mask],
            scores: vec![0.875, 0.5],
        })
    }
}

struct FailingPredictor;

impl Predictor for FailingPredictor {
    fn predict(&self, _: &RgbImage, query: &SegmentQuery) -> Result<Prediction, BoxError> {
        if query.box_xyxy.is_some() {
            panic!("box prompts are not supported");
        }
        Err("out of memory".into())
    }
}

#[test]
fn stub_mode_scenario() {
    let responses = stub_translator().handle(&[request(
        &png_b64(10, 10),
        r#"{"points":[{"x":5,"y":5,"label":1}]}"#,
    )]);
    assert_eq!(responses.len(), 1);

    let result = result_of(&responses[0]);
    assert_eq!(result["ok"], json!(true));
    assert_eq!(result["model"], json!("sam2"));
    assert!(result["message"].as_str().unwrap().contains(STUB_MESSAGE));
    assert_eq!(result["mask"], json!({ "format": "none", "data": null }));
    assert_eq!(result["sam2_error"], json!("no segmentation backend is available"));
}

#[test]
fn stub_mode_accepts_any_well_formed_request() {
    // stub mode neither decodes the image nor parses the prompt
    let responses = stub_translator().handle(&[
        request("", ""),
        request("not an image", "not json"),
        request(&png_b64(2, 2), r#"{"boxes":[0,0,1,1]}"#),
    ]);
    for response in &responses {
        let result = result_of(response);
        assert_eq!(result["ok"], json!(true));
        assert_eq!(result["mask"]["format"], json!("none"));
        assert_eq!(result["mask"]["data"], Value::Null);
    }
    assert_eq!(result_of(&responses[1])["inputs"]["prompt_json"], json!("not json"));
}

#[test]
fn missing_input_only_fails_its_slot() {
    let image = png_b64(4, 4);
    let only_image =
        InferenceRequest::new(vec![Tensor::from_strings(IMAGE_INPUT, [image.as_str()])]);
    let only_prompt = InferenceRequest::new(vec![Tensor::from_strings(PROMPT_INPUT, ["{}"])]);

    let responses = stub_translator().handle(&[
        request(&image, "{}"),
        only_image,
        request(&image, "{}"),
        only_prompt,
    ]);

    assert_eq!(responses.len(), 4);
    assert!(!responses[0].is_error());
    assert_eq!(
        responses[1],
        InferenceResponse::Error {
            message: "missing required input: prompt_json".to_string()
        }
    );
    assert!(!responses[2].is_error());
    assert_eq!(
        responses[3],
        InferenceResponse::Error {
            message: "missing required input: image_b64".to_string()
        }
    );
}

#[test]
fn inference_produces_png_mask() {
    let predictor = Arc::new(HalfPredictor::default());
    let translator = Translator::with_capability("sam2", Capability::Available(predictor.clone()));

    let image = png_b64(10, 10);
    let prompt =
        r#"{"points":[{"x":5,"y":5,"label":1},{"x":1,"y":2,"label":0}],"boxes":[1,1,8,8]}"#;
    let responses = translator.handle(&[request(&image, prompt)]);

    let result = result_of(&responses[0]);
    assert_eq!(result["ok"], json!(true));
    assert_eq!(result["message"], json!("sam2 inference"));
    assert_eq!(result["scores"], json!([0.875]));
    assert_eq!(result["inputs"]["image_b64_len"], json!(image.len()));
    assert_eq!(result["inputs"]["prompt"]["boxes"], json!([1, 1, 8, 8]));
    assert_eq!(result["mask"]["format"], json!("png_base64"));
    assert!(result.get("sam2_error").is_none());

    let png = STANDARD
        .decode(result["mask"]["data"].as_str().unwrap())
        .unwrap();
    let mask = image::load_from_memory_with_format(&png, ImageFormat::Png)
        .unwrap()
        .to_luma8();
    assert_eq!(mask.dimensions(), (10, 10));
    assert_eq!(mask.get_pixel(0, 9).0, [255]);
    assert_eq!(mask.get_pixel(9, 0).0, [0]);

    let queries = predictor.queries.lock().unwrap();
    assert_eq!(
        queries[0],
        SegmentQuery {
            point_coords: Some(vec![[5.0, 5.0], [1.0, 2.0]]),
            point_labels: Some(vec![1, 0]),
            box_xyxy: Some([1.0, 1.0, 8.0, 8.0]),
            multimask_output: false,
        }
    );
}

#[test]
fn malformed_prompt_still_runs_inference() {
    let predictor = Arc::new(HalfPredictor::default());
    let translator = Translator::with_capability("sam2", Capability::Available(predictor.clone()));

    let responses = translator.handle(&[request(&png_b64(6, 6), "not json")]);
    let result = result_of(&responses[0]);

    assert_eq!(result["ok"], json!(true));
    assert_eq!(result["inputs"]["prompt"], json!({ "points": [], "boxes": [] }));
    assert_eq!(predictor.queries.lock().unwrap()[0], SegmentQuery::default());
}

#[test]
fn non_object_prompt_is_echoed_as_sent() {
    let predictor = Arc::new(HalfPredictor::default());
    let translator = Translator::with_capability("sam2", Capability::Available(predictor.clone()));

    let responses = translator.handle(&[request(&png_b64(6, 6), "[5, 5]")]);
    let result = result_of(&responses[0]);

    assert_eq!(result["ok"], json!(true));
    assert_eq!(result["inputs"]["prompt"], json!([5, 5]));
    assert_eq!(predictor.queries.lock().unwrap()[0], SegmentQuery::default());
}

#[test]
fn byte_encoded_inputs_are_coerced() {
    let predictor = Arc::new(HalfPredictor::default());
    let translator = Translator::with_capability("sam2", Capability::Available(predictor.clone()));

    let image = png_b64(4, 4);
    let prompt = r#"{"points":[{"x":1,"y":2,"label":0}]}"#;
    let mut padded_prompt = prompt.as_bytes().to_vec();
    padded_prompt.resize(prompt.len() + 8, 0);

    let request = InferenceRequest::new(vec![
        Tensor {
            name: IMAGE_INPUT.to_string(),
            shape: vec![1, 1],
            data: vec![Element::Bytes(image.clone().into_bytes())],
        },
        Tensor {
            name: PROMPT_INPUT.to_string(),
            shape: vec![1, 1],
            data: vec![Element::FixedBytes(padded_prompt)],
        },
    ]);
    let responses = translator.handle(&[request]);
    let result = result_of(&responses[0]);

    assert_eq!(result["ok"], json!(true));
    assert_eq!(result["inputs"]["image_b64_len"], json!(image.len()));
    assert_eq!(result["inputs"]["prompt"]["points"][0]["label"], json!(0));
    assert_eq!(
        predictor.queries.lock().unwrap()[0].point_coords,
        Some(vec![[1.0, 2.0]])
    );
}

#[test]
fn short_box_is_not_forwarded() {
    let predictor = Arc::new(HalfPredictor::default());
    let translator = Translator::with_capability("sam2", Capability::Available(predictor.clone()));

    translator.handle(&[request(
        &png_b64(6, 6),
        r#"{"points":[{"x":2,"y":3}],"boxes":[1,2,3]}"#,
    )]);

    let queries = predictor.queries.lock().unwrap();
    assert_eq!(queries[0].box_xyxy, None);
    assert_eq!(queries[0].point_labels, Some(vec![1]));
}

#[test]
fn failures_are_isolated_per_request() {
    let translator =
        Translator::with_capability("sam2", Capability::Available(Arc::new(FailingPredictor)));
    let image = png_b64(4, 4);

    let responses = translator.handle(&[
        request(&image, "{}"),
        request("!!!", "{}"),
        request(&image, r#"{"boxes":[0,0,2,2]}"#),
    ]);

    assert_eq!(responses.len(), 3);
    assert_eq!(
        responses[0],
        InferenceResponse::Error {
            message: "inference failed: out of memory".to_string()
        }
    );
    assert!(matches!(
        &responses[1],
        InferenceResponse::Error { message } if message.starts_with("invalid base64")
    ));
    assert!(matches!(
        &responses[2],
        InferenceResponse::Error { message } if message.contains("box prompts are not supported")
    ));
}

#[test]
fn empty_prediction_is_an_error() {
    struct Nothing;
    impl Predictor for Nothing {
        fn predict(&self, _: &RgbImage, _: &SegmentQuery) -> Result<Prediction, BoxError> {
            Ok(Prediction {
                masks: Vec::new(),
                scores: Vec::new(),
            })
        }
    }

    let translator = Translator::with_capability("sam2", Capability::Available(Arc::new(Nothing)));
    let responses = translator.handle(&[request(&png_b64(3, 3), "{}")]);
    assert_eq!(
        responses[0],
        InferenceResponse::Error {
            message: "predictor returned no mask".to_string()
        }
    );
}

/// Builds a [`HalfPredictor`] only for the normalized config name.
struct HalfBackend;

impl PredictorBackend for HalfBackend {
    fn name(&self) -> &str {
        "half"
    }

    fn build(&self, spec: &BuildSpec<'_>) -> Result<Arc<dyn Predictor>, BoxError> {
        if spec.config == "sam2.1/sam2.1_hiera_s" {
            Ok(Arc::new(HalfPredictor::default()))
        } else {
            Err(format!("no such config: {}", spec.config).into())
        }
    }
}

#[test]
fn setup_with_backend_serves_inference() {
    let _ = env_logger::builder().is_test(true).try_init();

    let settings = Sam2Settings::default().with_model_cfg("sam2.1_hiera_small.yaml");
    let translator =
        Translator::setup(r#"{"name":"sam2-small"}"#, &settings, Some(&HalfBackend)).unwrap();
    assert!(translator.capability().is_available());

    let responses = translator.handle(&[request(&png_b64(8, 8), r#"{"points":[{"x":1,"y":1}]}"#)]);
    let result = result_of(&responses[0]);
    assert_eq!(result["model"], json!("sam2-small"));
    assert_eq!(result["mask"]["format"], json!("png_base64"));
}

#[test]
fn setup_failure_is_reported_in_stub_results() {
    let settings = Sam2Settings::default().with_model_cfg("sam2_hiera_tiny");
    let mut translator = Translator::setup("{}", &settings, Some(&HalfBackend)).unwrap();

    let responses = translator.handle(&[request(&png_b64(2, 2), "{}")]);
    let result = result_of(&responses[0]);
    assert_eq!(result["ok"], json!(true));
    assert_eq!(result["sam2_error"], json!("no such config: configs/sam2/sam2_hiera_t"));

    translator.teardown();
}

#[test]
fn concurrent_batches_share_the_predictor() {
    let predictor = Arc::new(HalfPredictor::default());
    let translator = Translator::with_capability("sam2", Capability::Available(predictor.clone()));
    let image = png_b64(5, 5);

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let responses = translator.handle(&[request(&image, "{}"), request(&image, "{}")]);
                assert!(responses.iter().all(|r| !r.is_error()));
            });
        }
    });

    assert_eq!(predictor.queries.lock().unwrap().len(), 8);
}
