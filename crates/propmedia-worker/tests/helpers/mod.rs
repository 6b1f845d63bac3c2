//! Test helpers for the worker roles.
//!
//! Run from workspace root: `cargo test -p propmedia-worker`.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use image::{ImageFormat, Rgba, RgbaImage};
use propmedia_core::{MediaProcessingConfig, VideoThumbnailConfig};
use propmedia_db::MemoryLedger;
use propmedia_infra::{InMemoryQueue, RecordingWorkflow};
use propmedia_processing::{PipelineStep, StepRunner};
use propmedia_services::{MediaProcessingService, MediaStorageGateway};
use propmedia_storage::ObjectStoreStorage;
use propmedia_worker::run_step;
use propmedia_worker::step::runner_with_storage;
use serde_json::Value;

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 255]));
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .expect("encode png");
    buffer
}

/// Runner over `storage` with an ffmpeg path that never resolves.
pub fn runner(storage: Arc<ObjectStoreStorage>) -> StepRunner {
    runner_with_storage(
        storage,
        VideoThumbnailConfig {
            ffmpeg_path: "/nonexistent/ffmpeg".to_string(),
            ..Default::default()
        },
    )
}

/// Runs a step through the stdin/stdout entrypoint and parses its output.
pub async fn run_json(runner: &StepRunner, step: PipelineStep, event: &Value) -> Value {
    let input = serde_json::to_vec(event).expect("encode event");
    let mut output = Vec::new();
    run_step(runner, step, Cursor::new(input), &mut output)
        .await
        .expect("step succeeded");
    serde_json::from_slice(&output).expect("step output is JSON")
}

pub struct TestRuntime {
    pub service: MediaProcessingService,
    pub queue: Arc<InMemoryQueue>,
}

pub fn in_memory_service() -> TestRuntime {
    let queue = Arc::new(InMemoryQueue::new());
    let storage = MediaStorageGateway::new(
        Arc::new(ObjectStoreStorage::memory()),
        Duration::from_secs(900),
        Duration::from_secs(3600),
    );
    let config = MediaProcessingConfig {
        reconcile_interval: Duration::from_millis(20),
        ..Default::default()
    };
    let service = MediaProcessingService::new(
        Arc::new(MemoryLedger::new()),
        storage,
        queue.clone(),
        Arc::new(RecordingWorkflow::new()),
        config,
    );
    TestRuntime { service, queue }
}
