//! Step dispatch: decode a step event, run the matching worker, encode its
//! result.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use propmedia_core::models::{ConsolidateInput, StepPayload, ZipInput};
use propmedia_core::{Clock, VideoThumbnailConfig};
use propmedia_storage::Storage;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStep {
    Validate,
    Thumbnails,
    VideoThumbnails,
    Consolidate,
    Zip,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; 5] = [
        PipelineStep::Validate,
        PipelineStep::Thumbnails,
        PipelineStep::VideoThumbnails,
        PipelineStep::Consolidate,
        PipelineStep::Zip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Validate => "validate",
            PipelineStep::Thumbnails => "thumbnails",
            PipelineStep::VideoThumbnails => "video-thumbnails",
            PipelineStep::Consolidate => "consolidate",
            PipelineStep::Zip => "zip",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStep {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == wanted)
            .ok_or_else(|| StepError::UnknownStep(s.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error("Unknown step: {0}")]
    UnknownStep(String),

    #[error("Step {0} is not compiled into this build")]
    Unsupported(PipelineStep),

    #[error("Invalid step input: {0}")]
    InvalidInput(String),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl From<serde_json::Error> for StepError {
    fn from(err: serde_json::Error) -> Self {
        StepError::InvalidInput(err.to_string())
    }
}

/// Runs single steps against one storage backend.
pub struct StepRunner {
    storage: Arc<dyn Storage>,
    video: VideoThumbnailConfig,
    clock: Arc<dyn Clock>,
}

impl StepRunner {
    pub fn new(storage: Arc<dyn Storage>, video: VideoThumbnailConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            video,
            clock,
        }
    }

    #[tracing::instrument(skip(self, input), fields(step = %step))]
    pub async fn run(&self, step: PipelineStep, input: Value) -> Result<Value, StepError> {
        match step {
            PipelineStep::Validate => {
                let payload: StepPayload = decode(input)?;
                encode(&crate::validate_assets(self.storage.as_ref(), payload).await)
            }
            PipelineStep::Thumbnails => self.thumbnails(decode(input)?).await,
            PipelineStep::VideoThumbnails => self.video_thumbnails(decode(input)?).await,
            PipelineStep::Consolidate => {
                let input: ConsolidateInput = decode(input)?;
                require_ids(input.job_id, input.listing_identity_id)?;
                encode(&crate::consolidate(input))
            }
            PipelineStep::Zip => self.zip(decode(input)?).await,
        }
    }

    #[cfg(feature = "image")]
    async fn thumbnails(&self, payload: StepPayload) -> Result<Value, StepError> {
        let worker = crate::image::ImageThumbnailWorker::new(self.storage.clone());
        encode(&worker.run(&payload).await)
    }

    #[cfg(not(feature = "image"))]
    async fn thumbnails(&self, _payload: StepPayload) -> Result<Value, StepError> {
        Err(StepError::Unsupported(PipelineStep::Thumbnails))
    }

    #[cfg(feature = "video")]
    async fn video_thumbnails(&self, payload: StepPayload) -> Result<Value, StepError> {
        let extractor = crate::video::FrameExtractor::new(&self.video);
        let worker = crate::video::VideoThumbnailWorker::new(self.storage.clone(), extractor);
        encode(&worker.run(&payload).await)
    }

    #[cfg(not(feature = "video"))]
    async fn video_thumbnails(&self, _payload: StepPayload) -> Result<Value, StepError> {
        let _ = &self.video;
        Err(StepError::Unsupported(PipelineStep::VideoThumbnails))
    }

    #[cfg(feature = "archive")]
    async fn zip(&self, input: ZipInput) -> Result<Value, StepError> {
        require_ids(input.job_id, input.listing_identity_id)?;
        let worker = crate::archive::ZipWorker::new(self.storage.clone(), self.clock.clone());
        encode(&worker.run(&input).await?)
    }

    #[cfg(not(feature = "archive"))]
    async fn zip(&self, _input: ZipInput) -> Result<Value, StepError> {
        let _ = &self.clock;
        Err(StepError::Unsupported(PipelineStep::Zip))
    }
}

fn require_ids(job_id: i64, listing_identity_id: i64) -> Result<(), StepError> {
    if job_id == 0 {
        return Err(StepError::MissingField("jobId"));
    }
    if listing_identity_id == 0 {
        return Err(StepError::MissingField("listingIdentityId"));
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(input: Value) -> Result<T, StepError> {
    Ok(serde_json::from_value(input)?)
}

fn encode<T: Serialize>(output: &T) -> Result<Value, StepError> {
    Ok(serde_json::to_value(output)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use propmedia_core::SystemClock;
    use propmedia_storage::ObjectStoreStorage;
    use serde_json::json;

    fn runner(storage: Arc<ObjectStoreStorage>) -> StepRunner {
        StepRunner::new(storage, VideoThumbnailConfig::default(), Arc::new(SystemClock))
    }

    #[test]
    fn test_parse_step_names() {
        for step in PipelineStep::ALL {
            assert_eq!(step.as_str().parse::<PipelineStep>().unwrap(), step);
        }
        assert_eq!(
            "VIDEO_THUMBNAILS".parse::<PipelineStep>().unwrap(),
            PipelineStep::VideoThumbnails
        );
        assert!(matches!(
            "resize".parse::<PipelineStep>(),
            Err(StepError::UnknownStep(_))
        ));
    }

    #[tokio::test]
    async fn test_validate_step_round_trip() {
        let storage = Arc::new(ObjectStoreStorage::memory());
        storage
            .upload("2/raw/photo/vertical/a.jpg", Bytes::from_static(b"abcde"), "image/jpeg")
            .await
            .unwrap();

        let out = runner(storage)
            .run(
                PipelineStep::Validate,
                json!({
                    "jobId": "14",
                    "listingIdentityId": 2,
                    "assets": [{"key": "2/raw/photo/vertical/a.jpg", "type": "PHOTO_VERTICAL"}]
                }),
            )
            .await
            .unwrap();

        assert_eq!(out["jobId"], 14);
        assert_eq!(out["hasVideos"], false);
        assert_eq!(out["validAssets"][0]["size"], 5);
        assert_eq!(out["validAssets"][0]["sourceKey"], "2/raw/photo/vertical/a.jpg");
    }

    #[tokio::test]
    async fn test_consolidate_requires_ids() {
        let storage = Arc::new(ObjectStoreStorage::memory());
        let err = runner(storage)
            .run(PipelineStep::Consolidate, json!({"listingIdentityId": 3}))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::MissingField("jobId")));
    }

    #[tokio::test]
    async fn test_malformed_input() {
        let storage = Arc::new(ObjectStoreStorage::memory());
        let err = runner(storage)
            .run(PipelineStep::Validate, json!({"assets": "nope"}))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::InvalidInput(_)));
    }
}
