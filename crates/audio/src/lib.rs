pub mod convert;
pub mod cues;
pub mod engine;
pub mod hotwords;
pub mod http;

pub use convert::{convert, sniff_extension};
pub use cues::{ErrorCue, SoundBank};
pub use engine::{
    AudioError, AudioResult, FallbackSynthesizer, SynthesizedSpeech, Synthesizer, Transcriber,
};
pub use hotwords::build_hotwords;
pub use http::{HttpSynthesizer, HttpTranscriber};
