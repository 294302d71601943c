//! JSON-RPC method handlers.
//!
//! Implements the handlers for all supported JSON-RPC methods.

use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::audio::read_wav;
use crate::captioning::CaptionMode;
use crate::error::DaemonError;
use crate::generation::{GenerationOutcome, GenerationRequest, ProgressMonitor};
use crate::models::MODEL_CARDS;
use crate::types::{practice_prompt, Prompt};

use super::server::{CancelHandle, ServerState};
use super::types::{
    AudioFileInfo, CancelResult, CaptionParams, CaptionResult, GenerateParams, GenerateResult,
    GenerationCompleteParams, GenerationErrorParams, GenerationProgressParams,
    ImprovePromptParams, JsonRpcError, ListModelsResult, MidiFileInfo, ModelInfo,
    TranscribeParams, TranscribeResult,
};

type MethodResult = Result<serde_json::Value, JsonRpcError>;

/// Handles a JSON-RPC method call.
pub fn handle_request(
    method: &str,
    params: serde_json::Value,
    state: &mut ServerState,
) -> MethodResult {
    match method {
        "generate" => handle_generate(params, state),
        "transcribe" => handle_transcribe(params, state),
        "caption" => handle_caption(params, state),
        "improve_prompt" => handle_improve_prompt(params, state),
        "list_models" => handle_list_models(state),
        "cancel" => handle_cancel(state.cancel_handle()),
        "ping" => handle_ping(),
        "shutdown" => handle_shutdown(state),
        _ => Err(JsonRpcError::method_not_found(method)),
    }
}

fn to_value<T: Serialize>(value: T) -> MethodResult {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

fn parse_params<T: serde::de::DeserializeOwned>(params: serde_json::Value) -> Result<T, JsonRpcError> {
    serde_json::from_value(params)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {}", e)))
}

/// Handles the ping method for health checks.
fn handle_ping() -> MethodResult {
    Ok(serde_json::json!({ "status": "ok" }))
}

/// Handles the shutdown method.
fn handle_shutdown(state: &mut ServerState) -> MethodResult {
    state.shutdown();
    Ok(serde_json::json!({ "status": "shutting_down" }))
}

/// Handles the cancel method. Also called from the stdin reader thread.
pub(crate) fn handle_cancel(cancel: &CancelHandle) -> MethodResult {
    let cancelled = cancel.cancel();
    if cancelled {
        info!("Cancellation requested");
    }
    to_value(CancelResult { cancelled })
}

/// Decides when a progress notification is due: every 5%, and once at 100%.
#[derive(Debug, Default)]
pub struct ProgressThrottle {
    last_percent: u8,
    finished: bool,
}

impl ProgressThrottle {
    /// Returns the percentage to report for this step, if any.
    pub fn step(&mut self, current: usize, total: usize) -> Option<u8> {
        if total == 0 || self.finished {
            return None;
        }
        if current >= total {
            self.finished = true;
            return Some(100);
        }

        let percent = std::cmp::min((current * 100 / total) as u8, 99);
        let next_threshold = (self.last_percent / 5 + 1) * 5;
        if percent >= next_threshold {
            self.last_percent = (percent / 5) * 5;
            Some(percent)
        } else {
            None
        }
    }
}

/// Handles the generate method.
///
/// Runs to completion before responding. Progress, completion and failure
/// are also reported as notifications tagged with the generation id.
fn handle_generate(params: serde_json::Value, state: &mut ServerState) -> MethodResult {
    let params: GenerateParams = parse_params(params)?;
    params.validate()?;

    let model_id = params
        .model
        .clone()
        .unwrap_or_else(|| state.config.default_model.clone());

    let requested = params.prompts.as_ref().map_or(params.count, Vec::len);
    state.dispatcher().check_output_count(requested)?;

    let melody = match params.melody_path {
        Some(ref path) => Some(read_wav(path)?),
        None => None,
    };

    let prompts: Vec<Prompt> = match params.prompts {
        Some(texts) => texts
            .into_iter()
            .map(|text| Prompt {
                text: Some(text),
                audio: melody.clone(),
            })
            .collect(),
        None => {
            let text = match params.practice {
                Some(ref practice) => Some(practice_prompt(practice.difficulty, &practice.style)),
                None => params.prompt.clone(),
            };
            vec![Prompt { text, audio: melody }; params.count]
        }
    };

    let render = params.render.unwrap_or(state.config.render_waveforms);
    let request = GenerationRequest::batch(model_id.clone(), params.params, prompts).with_rendering(render);

    let generation_id = state.next_generation_id();
    info!(generation_id = %generation_id, model = %model_id, outputs = request.prompts.len(), "Generation started");

    let start_time = Instant::now();
    let outcome = {
        let cancel = state.cancel_handle();
        let _busy = cancel.begin();
        let token = cancel.token().clone();
        let mut throttle = ProgressThrottle::default();
        let state_ref: &ServerState = state;

        let mut on_progress = |current: usize, total: usize| {
            let Some(percent) = throttle.step(current, total) else {
                return;
            };
            let elapsed = start_time.elapsed().as_secs_f32();
            let eta_sec = if current > 0 && elapsed > 0.0 {
                let remaining = total.saturating_sub(current);
                (remaining as f32 / current as f32) * elapsed
            } else {
                0.0
            };
            state_ref.notify(
                "generation_progress",
                GenerationProgressParams {
                    generation_id: generation_id.clone(),
                    percent,
                    generated: current,
                    total,
                    eta_sec,
                },
            );
        };

        let mut progress = ProgressMonitor::new(&token, &mut on_progress);
        state_ref.dispatcher().generate_batch(&request, &mut progress)
    };

    let failure = match outcome {
        Ok(GenerationOutcome::Completed(result)) => {
            let files: Vec<AudioFileInfo> = result.artifacts.iter().map(AudioFileInfo::from).collect();
            state.notify(
                "generation_complete",
                GenerationCompleteParams {
                    generation_id: generation_id.clone(),
                    model_id: result.model_id.clone(),
                    files: files.clone(),
                    generation_time_sec: result.generation_time_sec,
                },
            );
            return to_value(GenerateResult {
                generation_id,
                model_id: result.model_id,
                strategy: result.strategy,
                sample_rate: result.sample_rate,
                files,
                generation_time_sec: result.generation_time_sec,
            });
        }
        Ok(GenerationOutcome::Cancelled) => DaemonError::cancelled(),
        Err(e) => e,
    };

    warn!(generation_id = %generation_id, error = %failure.message, "Generation did not complete");
    state.notify(
        "generation_error",
        GenerationErrorParams {
            generation_id,
            code: failure.code.as_str().to_string(),
            message: failure.message.clone(),
        },
    );
    Err(failure.into())
}

/// Handles the transcribe method.
fn handle_transcribe(params: serde_json::Value, state: &mut ServerState) -> MethodResult {
    let params: TranscribeParams = parse_params(params)?;
    if params.paths.is_empty() {
        return Err(JsonRpcError::invalid_params("'paths' must not be empty"));
    }

    let artifacts = state.transcription().transcribe_batch(&params.paths)?;
    to_value(TranscribeResult {
        files: artifacts.iter().map(MidiFileInfo::from).collect(),
    })
}

/// Handles the caption method.
fn handle_caption(params: serde_json::Value, state: &mut ServerState) -> MethodResult {
    let params: CaptionParams = parse_params(params)?;

    let image = std::fs::read(&params.image_path).map_err(|e| {
        DaemonError::artifact_io(format!("Failed to read {}", params.image_path.display()), e)
    })?;
    let mode = params.mode.unwrap_or_else(|| {
        let model = params.model.as_deref().unwrap_or(&state.config.default_model);
        CaptionMode::for_model(model)
    });

    let caption = state.captioner()?.caption(&image, mode)?;
    to_value(CaptionResult {
        mode,
        description: caption.description,
        prompt: caption.prompt,
    })
}

/// Handles the improve_prompt method.
fn handle_improve_prompt(params: serde_json::Value, state: &mut ServerState) -> MethodResult {
    let params: ImprovePromptParams = parse_params(params)?;
    if params.prompt.trim().is_empty() {
        return Err(JsonRpcError::invalid_params("'prompt' must not be empty"));
    }

    let prompt = state.captioner()?.improve_prompt(&params.prompt)?;
    Ok(serde_json::json!({ "prompt": prompt }))
}

/// Handles the list_models method.
fn handle_list_models(state: &ServerState) -> MethodResult {
    let registry = state.dispatcher().registry();
    let models = MODEL_CARDS
        .iter()
        .map(|card| ModelInfo {
            id: card.id.to_string(),
            category: card.category,
            description: card.description.to_string(),
            stereo: card.stereo,
            supported: registry
                .resolve(card.id)
                .map(|r| r.family.is_supported())
                .unwrap_or(false),
        })
        .collect();

    to_value(ListModelsResult {
        models,
        default_model: state.config.default_model.clone(),
        backend: state.config.backend.as_str().to_string(),
        resident_model: state.dispatcher().models().resident_model(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::write_wav;
    use crate::captioning::{Caption, Captioner};
    use crate::config::DaemonConfig;
    use crate::error::Result;
    use crate::models::{Backend, SyntheticModelLoader};
    use crate::transcription::{NoteEvent, Transcriber};
    use crate::types::Waveform;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tempfile::{tempdir, TempDir};

    struct NoNotes;

    impl Transcriber for NoNotes {
        fn predict(&self, _audio: &Path) -> Result<Vec<NoteEvent>> {
            Ok(Vec::new())
        }
    }

    struct FixedCaptioner;

    impl Captioner for FixedCaptioner {
        fn caption(&self, _image: &[u8], mode: CaptionMode) -> Result<Caption> {
            Ok(Caption {
                description: format!("{} scene", mode),
                prompt: "warm lofi piano".to_string(),
            })
        }

        fn improve_prompt(&self, prompt: &str) -> Result<String> {
            Ok(format!("{} with soft drums", prompt))
        }
    }

    type Sent = Arc<Mutex<Vec<serde_json::Value>>>;

    fn setup() -> (TempDir, ServerState, Sent) {
        let dir = tempdir().unwrap();
        let config = DaemonConfig {
            artifact_dir: Some(dir.path().join("artifacts")),
            backend: Backend::Synthetic,
            default_model: "facebook/musicgen-small".to_string(),
            ..Default::default()
        };
        let sent: Sent = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        let state =
            ServerState::with_parts(config, Arc::new(SyntheticModelLoader), Arc::new(NoNotes))
                .with_notification_sink(Arc::new(move |line: String| {
                    sink.lock().unwrap().push(serde_json::from_str(&line).unwrap());
                }));
        (dir, state, sent)
    }

    fn methods(sent: &Sent) -> Vec<String> {
        sent.lock()
            .unwrap()
            .iter()
            .map(|n| n["method"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn handle_ping() {
        let value = super::handle_ping().unwrap();
        assert_eq!(value["status"], "ok");
    }

    #[test]
    fn handle_unknown_method() {
        let (_dir, mut state, _) = setup();
        let err = handle_request("nonexistent", serde_json::Value::Null, &mut state).unwrap_err();
        assert_eq!(err.code, -32601);
    }

    #[test]
    fn handle_shutdown() {
        let (_dir, mut state, _) = setup();
        assert!(super::handle_shutdown(&mut state).is_ok());
        assert!(state.is_shutdown());
    }

    #[test]
    fn throttle_reports_every_five_percent() {
        let mut throttle = ProgressThrottle::default();
        let reported: Vec<u8> = (1..=100).filter_map(|i| throttle.step(i, 100)).collect();
        assert_eq!(reported.len(), 20);
        assert_eq!(reported[0], 5);
        assert_eq!(*reported.last().unwrap(), 100);
        assert_eq!(throttle.step(100, 100), None);
    }

    #[test]
    fn generate_writes_files_and_notifies() {
        let (_dir, mut state, sent) = setup();
        let params = serde_json::json!({
            "prompt": "lofi piano",
            "count": 2,
            "params": { "duration": 0.4 },
            "render": true
        });

        let value = handle_request("generate", params, &mut state).unwrap();

        let files = value["files"].as_array().unwrap();
        assert_eq!(files.len(), 2);
        for file in files {
            assert!(Path::new(file["path"].as_str().unwrap()).exists());
            assert!(Path::new(file["visualization"].as_str().unwrap()).exists());
            assert!(file["label"].as_str().unwrap().starts_with("Download audio file"));
        }
        assert_eq!(value["strategy"], "text_to_audio");

        let methods = methods(&sent);
        assert!(methods.iter().any(|m| m == "generation_progress"));
        assert_eq!(methods.last().unwrap(), "generation_complete");
    }

    #[test]
    fn generate_unknown_model_reports_error() {
        let (_dir, mut state, sent) = setup();
        let params = serde_json::json!({ "model": "acme/tone-9000", "prompt": "x" });

        let err = handle_request("generate", params, &mut state).unwrap_err();
        assert_eq!(err.code, -32000);

        let sent = sent.lock().unwrap();
        assert_eq!(sent.last().unwrap()["method"], "generation_error");
        assert_eq!(sent.last().unwrap()["params"]["code"], "UNKNOWN_MODEL");
    }

    #[test]
    fn generate_melody_model_without_melody_is_invalid() {
        let (_dir, mut state, _) = setup();
        let params = serde_json::json!({
            "model": "facebook/musicgen-melody",
            "prompt": "x",
            "params": { "duration": 0.2 }
        });
        let err = handle_request("generate", params, &mut state).unwrap_err();
        assert_eq!(err.code, -32001);
    }

    #[test]
    fn generate_rejects_oversized_count() {
        let (_dir, mut state, sent) = setup();
        for count in [0, usize::MAX] {
            let params = serde_json::json!({
                "prompt": "x",
                "count": count,
                "params": { "duration": 0.2 }
            });
            let err = handle_request("generate", params, &mut state).unwrap_err();
            assert_eq!(err.code, -32001);
        }
        assert!(state.dispatcher().store().is_empty());
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn generate_with_melody_file() {
        let (dir, mut state, _) = setup();
        let melody = dir.path().join("melody.wav");
        let samples = (0..16000).map(|i| (i as f32 * 0.05).sin() * 0.3).collect();
        write_wav(&Waveform::mono(samples, 16000), &melody).unwrap();

        let params = serde_json::json!({
            "model": "facebook/musicgen-melody",
            "prompt": "x",
            "melody_path": melody,
            "params": { "duration": 0.2 }
        });
        let value = handle_request("generate", params, &mut state).unwrap();
        assert_eq!(value["strategy"], "melody_conditioned");
    }

    #[test]
    fn cancel_during_generation() {
        let (_dir, state, sent) = setup();
        let cancel = state.cancel_handle().clone();
        let sink = Arc::clone(&sent);
        let mut state = state.with_notification_sink(Arc::new(move |line: String| {
            let value: serde_json::Value = serde_json::from_str(&line).unwrap();
            if value["method"] == "generation_progress" {
                cancel.cancel();
            }
            sink.lock().unwrap().push(value);
        }));

        let params = serde_json::json!({ "prompt": "x", "params": { "duration": 2.0 } });
        let err = handle_request("generate", params, &mut state).unwrap_err();
        assert_eq!(err.code, -32005);

        let sent = sent.lock().unwrap();
        assert_eq!(sent.last().unwrap()["params"]["code"], "CANCELLED");
        // the next request starts with a clear token
        assert!(!state.cancel_handle().token().is_cancelled());
    }

    #[test]
    fn cancel_when_idle() {
        let (_dir, mut state, _) = setup();
        let value = handle_request("cancel", serde_json::Value::Null, &mut state).unwrap();
        assert_eq!(value["cancelled"], false);
    }

    #[test]
    fn transcribe_returns_midi_files() {
        let (dir, mut state, _) = setup();
        let audio = dir.path().join("a.wav");
        write_wav(&Waveform::mono(vec![0.0; 800], 8000), &audio).unwrap();

        let value =
            handle_request("transcribe", serde_json::json!({ "paths": [audio] }), &mut state)
                .unwrap();
        let file = &value["files"][0];
        assert_eq!(file["note_count"], 0);
        assert!(file["label"].as_str().unwrap().starts_with("Download MIDI file"));
        assert!(Path::new(file["path"].as_str().unwrap()).exists());

        let err = handle_request("transcribe", serde_json::json!({ "paths": [] }), &mut state)
            .unwrap_err();
        assert_eq!(err.code, -32602);
    }

    #[test]
    fn caption_picks_mode_from_model() {
        let (dir, state, _) = setup();
        let mut state = state.with_captioner(Arc::new(FixedCaptioner));
        let image = dir.path().join("cover.png");
        std::fs::write(&image, [0x89, b'P', b'N', b'G']).unwrap();

        let value = handle_request(
            "caption",
            serde_json::json!({ "image_path": image, "model": "facebook/audiogen-medium" }),
            &mut state,
        )
        .unwrap();
        assert_eq!(value["mode"], "sound");
        assert_eq!(value["prompt"], "warm lofi piano");

        let value = handle_request("caption", serde_json::json!({ "image_path": image }), &mut state)
            .unwrap();
        assert_eq!(value["mode"], "music");
    }

    #[test]
    fn caption_missing_image_is_io_error() {
        let (dir, state, _) = setup();
        let mut state = state.with_captioner(Arc::new(FixedCaptioner));
        let err = handle_request(
            "caption",
            serde_json::json!({ "image_path": dir.path().join("missing.png") }),
            &mut state,
        )
        .unwrap_err();
        assert_eq!(err.code, -32007);
    }

    #[test]
    fn caption_without_api_key_fails() {
        let (dir, mut state, _) = setup();
        state.config.captioning.api_key_env = "TUNECRAFT_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        let image = dir.path().join("cover.png");
        std::fs::write(&image, [0xFF, 0xD8, 0xFF]).unwrap();

        let err = handle_request("caption", serde_json::json!({ "image_path": image }), &mut state)
            .unwrap_err();
        assert_eq!(err.code, -32006);
    }

    #[test]
    fn improve_prompt_uses_captioner() {
        let (_dir, state, _) = setup();
        let mut state = state.with_captioner(Arc::new(FixedCaptioner));
        let value = handle_request(
            "improve_prompt",
            serde_json::json!({ "prompt": "rock" }),
            &mut state,
        )
        .unwrap();
        assert_eq!(value["prompt"], "rock with soft drums");

        let err = handle_request("improve_prompt", serde_json::json!({ "prompt": " " }), &mut state)
            .unwrap_err();
        assert_eq!(err.code, -32602);
    }

    #[test]
    fn list_models_marks_unsupported() {
        let (_dir, mut state, _) = setup();
        let value = handle_request("list_models", serde_json::Value::Null, &mut state).unwrap();
        let models = value["models"].as_array().unwrap();
        assert_eq!(models.len(), MODEL_CARDS.len());
        for model in models {
            let id = model["id"].as_str().unwrap();
            assert_eq!(model["supported"], !id.contains("musiclang"), "{}", id);
        }
        assert_eq!(value["backend"], "synthetic");
    }
}
