//! Single-frame extraction through the ffmpeg binary.

use anyhow::{anyhow, Context, Result};
use propmedia_core::VideoThumbnailConfig;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Maps a JPEG quality (1..=100, higher is better) onto ffmpeg's `-q:v`
/// scale (2..=31, lower is better). Out-of-range values are clamped.
pub fn qscale_for_quality(quality: u8) -> u8 {
    let quality = quality.clamp(1, 100) as u32;
    let scaled = ((quality - 1) * 29 + 49) / 99;
    (31 - scaled) as u8
}

#[derive(Debug, Clone)]
pub struct FrameExtractor {
    ffmpeg_path: String,
    seek_seconds: u32,
    width: u32,
    quality: u8,
}

impl FrameExtractor {
    pub fn new(config: &VideoThumbnailConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            seek_seconds: config.seek_seconds,
            width: config.width.max(1),
            quality: config.quality,
        }
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.ffmpeg_path
    }

    /// ffmpeg arguments extracting one frame at the configured second,
    /// scaled to the configured width with the aspect ratio kept.
    pub fn args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-ss".to_string(),
            self.seek_seconds.to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vframes".to_string(),
            "1".to_string(),
            "-vf".to_string(),
            format!("scale={}:-1", self.width),
            "-q:v".to_string(),
            qscale_for_quality(self.quality).to_string(),
            "-f".to_string(),
            "image2".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }

    #[tracing::instrument(skip(self))]
    pub async fn extract(&self, input: &Path, output: &Path) -> Result<()> {
        let result = Command::new(&self.ffmpeg_path)
            .args(self.args(input, output))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to execute ffmpeg")?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(anyhow!("FFmpeg failed: {}", stderr.trim()));
        }

        let written = tokio::fs::metadata(output)
            .await
            .context("Thumbnail not created")?;
        if written.len() == 0 {
            return Err(anyhow!("Thumbnail not created: empty output"));
        }
        Ok(())
    }
}
