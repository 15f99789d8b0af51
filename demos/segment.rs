use argh::FromArgs;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use sam2_translator::{
    InferenceRequest, InferenceResponse, IMAGE_INPUT, PROMPT_INPUT, PredictorBackend,
    RESULT_OUTPUT, Sam2Settings, Tensor, Translator,
};
use std::path::PathBuf;

mod backend;

const DEFAULT_PROMPT: &str = r#"{"points": [], "boxes": []}"#;

#[derive(FromArgs)]
/// Runs one segmentation request through the translator and prints the result.
struct SegmentArgs {
    /// the path to a PNG or JPEG image
    #[argh(option, short = 'i')]
    image_path: PathBuf,

    /// the prompt, as JSON
    #[argh(option, short = 'p', default = "DEFAULT_PROMPT.to_string()")]
    prompt: String,

    /// the host model configuration, as JSON
    #[argh(option, default = "String::from(\"{}\")")]
    model_config: String,

    /// run without a backend (stub mode)
    #[argh(switch)]
    stub: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: SegmentArgs = argh::from_env();

    let rect = backend::RectBackend;
    let backend: Option<&dyn PredictorBackend> = if args.stub { None } else { Some(&rect) };

    let mut translator = Translator::setup(&args.model_config, &Sam2Settings::from_env(), backend)?;
    log::info!("Translator mode: {}", translator.capability().as_str());

    let image_b64 = STANDARD.encode(std::fs::read(&args.image_path)?);
    let request = InferenceRequest::new(vec![
        Tensor::from_strings(IMAGE_INPUT, [image_b64]),
        Tensor::from_strings(PROMPT_INPUT, [args.prompt]),
    ]);

    for response in translator.handle(&[request]) {
        match response {
            InferenceResponse::Success { .. } => {
                let result = response
                    .output(RESULT_OUTPUT)
                    .and_then(Tensor::first_string)
                    .unwrap_or_default();
                let value: serde_json::Value = serde_json::from_str(&result)?;
                println!("Result: {}", serde_json::to_string_pretty(&value)?);
            }
            InferenceResponse::Error { message } => {
                log::error!("Request failed: {message}");
            }
        }
    }

    translator.teardown();
    Ok(())
}
