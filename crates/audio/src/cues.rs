use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;

use tokio::process::Command;
use tracing::{info, warn};

use parlance_core::config::{AudioFormat, SoundsConfig};

use crate::convert::codec_args;

/// Which pre-recorded cue to play when a request cannot produce speech.
/// Fatal means "a human has to fix something"; the rest may clear up on
/// the next attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCue {
    EmptyTranscription,
    SynthesisFailed,
    General,
    Fatal,
}

impl ErrorCue {
    fn sound_name(self) -> &'static str {
        match self {
            Self::EmptyTranscription => "crickets",
            Self::SynthesisFailed => "sad-trombone",
            Self::General => "error-buzz",
            Self::Fatal => "klaxon",
        }
    }
}

const SOUND_EXTENSIONS: [&str; 4] = ["mp3", "wav", "ogg", "m4a"];

/// Cue sounds served around synthesized speech: error noises, the success
/// chime for silent commands, and the notification jingle prepended to
/// spoken replies. Conversions run through ffmpeg once and are cached.
///
/// Every path here degrades instead of failing: a missing sound file or a
/// broken ffmpeg yields `None` (or the unmodified input), because a cue is
/// never worth failing a request over.
pub struct SoundBank {
    dir: PathBuf,
    notification: String,
    volume: f32,
    silence_secs: f32,
    format: AudioFormat,
    cache: Mutex<HashMap<String, Vec<u8>>>,
}

impl SoundBank {
    pub fn new(config: &SoundsConfig, format: AudioFormat) -> Self {
        Self {
            dir: config.dir.clone(),
            notification: config.notification.clone(),
            volume: config.volume,
            silence_secs: config.silence_secs,
            format,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// The cue for a failed request, already in the output format.
    pub async fn error_sound(&self, cue: ErrorCue) -> Option<Vec<u8>> {
        self.sound(cue.sound_name(), 1.0).await
    }

    /// The bare notification jingle at configured volume.
    async fn notification_sound(&self) -> Option<Vec<u8>> {
        if self.notification.is_empty() || self.notification.eq_ignore_ascii_case("none") {
            return None;
        }
        let name = self.notification.clone();
        self.sound(&name, self.volume).await
    }

    /// Silence-padded notification: the confirmation played for silent
    /// commands instead of a spoken reply.
    pub async fn success_chime(&self) -> Option<Vec<u8>> {
        let notification = self.notification_sound().await?;

        let result = self
            .filter_concat(&[Segment::Silence, Segment::Audio(&notification), Segment::Silence])
            .await;
        match result {
            Ok(chime) => Some(chime),
            Err(reason) => {
                warn!(%reason, "chime assembly failed, using bare notification");
                Some(notification)
            }
        }
    }

    /// [silence] [notification] [silence] [speech]. When no notification
    /// is configured, the speech comes back untouched.
    pub async fn prepend_notification(&self, audio: Vec<u8>) -> Vec<u8> {
        let Some(notification) = self.notification_sound().await else {
            return audio;
        };

        let result = self
            .filter_concat(&[
                Segment::Silence,
                Segment::Audio(&notification),
                Segment::Silence,
                Segment::Audio(&audio),
            ])
            .await;
        match result {
            Ok(combined) => combined,
            Err(reason) => {
                warn!(%reason, "notification concat failed, returning speech unmodified");
                audio
            }
        }
    }

    async fn sound(&self, name: &str, volume: f32) -> Option<Vec<u8>> {
        let cache_key = format!("{name}:{}:{volume}", self.format.extension());
        {
            let cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(cached) = cache.get(&cache_key) {
                return Some(cached.clone());
            }
        }

        let path = SOUND_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{name}.{ext}")))
            .find(|candidate| candidate.exists())?;

        info!(path = %path.display(), volume, "converting cue sound");
        let mut command = Command::new("ffmpeg");
        command.arg("-i").arg(&path);
        if volume != 1.0 {
            command.args(["-af", &format!("volume={volume}")]);
        }
        command
            .args(codec_args(self.format))
            .args(["-f", self.format.extension(), "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = match command.output().await {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                warn!(
                    path = %path.display(),
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "cue sound conversion failed"
                );
                return None;
            }
            Err(err) => {
                warn!(error = %err, "could not run ffmpeg for cue sound");
                return None;
            }
        };

        let converted = output.stdout;
        let mut cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.insert(cache_key, converted.clone());
        Some(converted)
    }

    /// Concatenate silence and audio segments with a single ffmpeg filter
    /// graph. Segments are staged as temp files; silence comes from the
    /// anullsrc source trimmed to the configured padding.
    async fn filter_concat(&self, segments: &[Segment<'_>]) -> Result<Vec<u8>, String> {
        let mut staged = Vec::new();
        for segment in segments {
            if let Segment::Audio(bytes) = segment {
                let file = tempfile::Builder::new()
                    .suffix(&format!(".{}", self.format.extension()))
                    .tempfile()
                    .map_err(|err| err.to_string())?;
                std::fs::write(file.path(), bytes).map_err(|err| err.to_string())?;
                staged.push(file);
            }
        }

        let mut command = Command::new("ffmpeg");
        command.args(["-f", "lavfi", "-i", "anullsrc=r=24000:cl=mono"]);
        for file in &staged {
            command.arg("-i").arg(file.path());
        }

        let resample = "aformat=sample_fmts=fltp:sample_rates=24000:channel_layouts=mono";
        let mut graph = String::new();
        let mut labels = String::new();
        let mut audio_index = 0usize;
        for (position, segment) in segments.iter().enumerate() {
            let label = format!("[s{position}]");
            match segment {
                Segment::Silence => {
                    graph.push_str(&format!(
                        "[0]atrim=0:{},{resample}{label};",
                        self.silence_secs
                    ));
                }
                Segment::Audio(_) => {
                    audio_index += 1;
                    graph.push_str(&format!("[{audio_index}]{resample}{label};"));
                }
            }
            labels.push_str(&label);
        }
        graph.push_str(&format!("{labels}concat=n={}:v=0:a=1[out]", segments.len()));

        command
            .args(["-filter_complex", &graph, "-map", "[out]"])
            .args(codec_args(self.format))
            .args(["-f", self.format.extension(), "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = command.output().await.map_err(|err| err.to_string())?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(output.stdout)
    }
}

enum Segment<'a> {
    Silence,
    Audio(&'a [u8]),
}

#[cfg(test)]
mod tests {
    use parlance_core::config::{AudioFormat, SoundsConfig};

    use super::{ErrorCue, SoundBank};

    fn bank(notification: &str) -> SoundBank {
        SoundBank::new(
            &SoundsConfig {
                dir: "/nonexistent/sounds".into(),
                notification: notification.to_string(),
                volume: 0.5,
                silence_secs: 0.5,
            },
            AudioFormat::Ogg,
        )
    }

    #[test]
    fn every_error_kind_has_a_sound_name() {
        for cue in [
            ErrorCue::EmptyTranscription,
            ErrorCue::SynthesisFailed,
            ErrorCue::General,
            ErrorCue::Fatal,
        ] {
            assert!(!cue.sound_name().is_empty());
        }
        assert_eq!(ErrorCue::EmptyTranscription.sound_name(), "crickets");
    }

    #[tokio::test]
    async fn missing_sound_files_yield_none() {
        let bank = bank("coin");
        assert_eq!(bank.error_sound(ErrorCue::General).await, None);
        assert_eq!(bank.success_chime().await, None);
    }

    #[tokio::test]
    async fn disabled_notification_passes_speech_through() {
        let bank = bank("none");
        let speech = vec![1u8, 2, 3];
        assert_eq!(bank.prepend_notification(speech.clone()).await, speech);
        assert_eq!(bank.success_chime().await, None);
    }
}
