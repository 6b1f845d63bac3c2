//! One-shot pipeline step role.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use propmedia_core::{StorageConfig, SystemClock, VideoThumbnailConfig};
use propmedia_processing::{PipelineStep, StepRunner};
use propmedia_storage::{create_storage, Storage};

/// Builds a runner for the configured object store.
pub async fn runner_from_env() -> Result<StepRunner> {
    let storage_config = StorageConfig::from_env()?;
    let storage = create_storage(&storage_config)
        .await
        .context("Failed to initialize storage")?;
    Ok(StepRunner::new(
        storage,
        VideoThumbnailConfig::from_env(),
        Arc::new(SystemClock),
    ))
}

/// Reads one event from `input`, runs `step` and writes the JSON result to
/// `output`.
pub async fn run_step<R, W>(runner: &StepRunner, step: PipelineStep, input: R, output: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut input = input;
    let mut raw = String::new();
    input
        .read_to_string(&mut raw)
        .await
        .context("Failed to read step input")?;
    let event: Value = if raw.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(&raw).context("Step input is not valid JSON")?
    };

    tracing::info!(step = %step, input_bytes = raw.len(), "Running pipeline step");
    let result = runner
        .run(step, event)
        .await
        .with_context(|| format!("Step {} failed", step))?;

    let mut output = output;
    let mut body = serde_json::to_vec(&result).context("Failed to encode step output")?;
    body.push(b'\n');
    output.write_all(&body).await?;
    output.flush().await?;
    Ok(())
}

/// Runner over an explicit storage backend.
pub fn runner_with_storage(storage: Arc<dyn Storage>, video: VideoThumbnailConfig) -> StepRunner {
    StepRunner::new(storage, video, Arc::new(SystemClock))
}
