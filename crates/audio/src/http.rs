use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use parlance_core::config::{AudioFormat, TranscribeConfig, TtsConfig};

use crate::engine::{AudioError, AudioResult, SynthesizedSpeech, Synthesizer, Transcriber};

/// Speech-to-text against an OpenAI-compatible `/v1/audio/transcriptions`
/// endpoint (a local whisper server in the usual deployment). Hotwords
/// ride along as the recognition prompt.
pub struct HttpTranscriber {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    hotwords: RwLock<String>,
}

impl HttpTranscriber {
    pub fn new(config: &TranscribeConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            hotwords: RwLock::new(String::new()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> AudioResult<String> {
        let audio = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.m4a".to_string());

        let mut form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", reqwest::multipart::Part::bytes(audio).file_name(file_name));

        let hotwords =
            self.hotwords.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone();
        if !hotwords.is_empty() {
            form = form.text("prompt", hotwords);
        }

        let mut request =
            self.client.post(format!("{}/v1/audio/transcriptions", self.base_url)).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|err| AudioError::Transcription(err.to_string()))?;
        if !response.status().is_success() {
            return Err(AudioError::Transcription(format!(
                "transcription endpoint returned {}",
                response.status()
            )));
        }

        let parsed = response
            .json::<TranscriptionResponse>()
            .await
            .map_err(|err| AudioError::Transcription(err.to_string()))?;
        debug!(chars = parsed.text.len(), "transcription received");
        Ok(parsed.text.trim().to_string())
    }

    fn set_hotwords(&self, hotwords: &str) {
        *self.hotwords.write().unwrap_or_else(|poisoned| poisoned.into_inner()) =
            hotwords.to_string();
    }
}

/// Text-to-speech against an OpenAI-compatible `/v1/audio/speech`
/// endpoint, requesting a fixed response format.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    base_url: String,
    model: String,
    default_voice: String,
    api_key: Option<SecretString>,
    format: AudioFormat,
}

impl HttpSynthesizer {
    /// The primary synthesizer from config, answering in the configured
    /// output format.
    pub fn primary(config: &TtsConfig) -> Self {
        Self::new(
            &config.base_url,
            &config.model,
            &config.voice,
            config.api_key.clone(),
            config.output_format,
        )
    }

    /// The fallback provider, when configured. Hosted speech endpoints
    /// are mp3-first, so that is what we request from them.
    pub fn fallback(config: &TtsConfig) -> Option<Self> {
        config.fallback_base_url.as_ref().map(|base_url| {
            Self::new(base_url, &config.model, &config.voice, config.api_key.clone(), AudioFormat::Mp3)
        })
    }

    fn new(
        base_url: &str,
        model: &str,
        voice: &str,
        api_key: Option<SecretString>,
        format: AudioFormat,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            default_voice: voice.to_string(),
            api_key,
            format,
        }
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> AudioResult<SynthesizedSpeech> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": voice.unwrap_or(&self.default_voice),
            "response_format": self.format.extension(),
        });

        let mut request =
            self.client.post(format!("{}/v1/audio/speech", self.base_url)).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response =
            request.send().await.map_err(|err| AudioError::Synthesis(err.to_string()))?;
        if !response.status().is_success() {
            return Err(AudioError::Synthesis(format!(
                "speech endpoint returned {}",
                response.status()
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|err| AudioError::Synthesis(err.to_string()))?
            .to_vec();
        Ok(SynthesizedSpeech { audio, format: self.format })
    }
}
