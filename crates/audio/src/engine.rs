use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use parlance_core::config::AudioFormat;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("transcription failed: {0}")]
    Transcription(String),
    #[error("synthesis failed: {0}")]
    Synthesis(String),
    #[error("audio conversion failed: {0}")]
    Conversion(String),
    #[error("audio i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type AudioResult<T> = Result<T, AudioError>;

/// Speech-to-text seam. Implementations wrap an external engine; the
/// gateway only ever sees text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> AudioResult<String>;

    /// Vocabulary bias for the recognizer. Engines without hotword
    /// support ignore this.
    fn set_hotwords(&self, _hotwords: &str) {}
}

/// Synthesized speech plus the container it actually came back in, which
/// may differ from the gateway's configured output format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesizedSpeech {
    pub audio: Vec<u8>,
    pub format: AudioFormat,
}

/// Text-to-speech seam.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> AudioResult<SynthesizedSpeech>;
}

/// Primary synthesizer with an optional fallback. The fallback only runs
/// after a primary failure; its output format rides along in the result.
pub struct FallbackSynthesizer {
    primary: Arc<dyn Synthesizer>,
    fallback: Option<Arc<dyn Synthesizer>>,
}

impl FallbackSynthesizer {
    pub fn new(primary: Arc<dyn Synthesizer>, fallback: Option<Arc<dyn Synthesizer>>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl Synthesizer for FallbackSynthesizer {
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> AudioResult<SynthesizedSpeech> {
        match self.primary.synthesize(text, voice).await {
            Ok(speech) => Ok(speech),
            Err(err) => match &self.fallback {
                Some(fallback) => {
                    warn!(error = %err, "primary synthesizer failed, using fallback");
                    fallback.synthesize(text, voice).await
                }
                None => Err(err),
            },
        }
    }
}
