pub mod asset;
pub mod batch;
pub mod callback;
pub mod job;
pub mod listing;
pub mod pipeline;

pub use asset::{metadata_keys, MediaAsset, MediaAssetStatus, MediaAssetType};
pub use batch::{BatchStatus, BatchStatusMetadata, MediaBatch};
pub use callback::{flexible_id, ProcessingCallback, ProcessingResult, ResultOutcome};
pub use job::{
    MediaProcessingJob, MediaProcessingJobPayload, MediaProcessingJobStatus,
    MediaProcessingProvider,
};
pub use listing::{ListingSnapshot, ListingStatus, PropertyType};
pub use pipeline::{
    BranchError, ConsolidateInput, ConsolidateOutput, DerivativeOutput, FinalizationAsset,
    FinalizationInput, JobAsset, MediaProcessingJobMessage, ParallelResult, StepPayload, ZipInput,
    ZipOutput,
};
