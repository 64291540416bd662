use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use parlance_core::config::AudioFormat;

use crate::engine::{AudioError, AudioResult};

/// File extension guessed from the first bytes of an uploaded recording,
/// for the temp file handed to the transcriber. Unknown content defaults
/// to m4a, which is what phones usually send.
pub fn sniff_extension(content: &[u8]) -> &'static str {
    if content.starts_with(b"RIFF") {
        return "wav";
    }
    if content.starts_with(b"ID3") || content.starts_with(&[0xff, 0xfb]) {
        return "mp3";
    }
    "m4a"
}

pub(crate) fn codec_args(format: AudioFormat) -> [&'static str; 4] {
    match format {
        AudioFormat::Ogg => ["-c:a", "libopus", "-b:a", "64k"],
        AudioFormat::Mp3 => ["-c:a", "libmp3lame", "-b:a", "128k"],
    }
}

/// Re-encode between containers through an ffmpeg pipe. Same-format input
/// passes through untouched.
pub async fn convert(
    audio: Vec<u8>,
    from: AudioFormat,
    to: AudioFormat,
) -> AudioResult<Vec<u8>> {
    if from == to {
        return Ok(audio);
    }

    let mut child = Command::new("ffmpeg")
        .args(["-f", from.extension(), "-i", "pipe:0"])
        .args(codec_args(to))
        .args(["-f", to.extension(), "pipe:1"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| AudioError::Conversion(format!("could not spawn ffmpeg: {err}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(&audio).await?;
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        return Err(AudioError::Conversion(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    Ok(output.stdout)
}
