//! Propmedia Pipeline Workers
//!
//! Stateless steps invoked once per workflow state: validate the raw uploads,
//! render image and video thumbnails, consolidate the branch outputs into a
//! processing callback and stream the finalization archive.
//!
//! Steps only read and write objects through [`propmedia_storage::Storage`];
//! they never touch the job ledger. Their result is handed back to the
//! orchestrator, which forwards it to the callback queue.

pub mod consolidate;
pub mod step;
pub mod validate;

#[cfg(feature = "image")]
pub mod image;

#[cfg(feature = "video")]
pub mod video;

#[cfg(feature = "archive")]
pub mod archive;

// Re-export commonly used types
pub use consolidate::consolidate;
pub use step::{PipelineStep, StepError, StepRunner};
pub use validate::validate_assets;

#[cfg(feature = "image")]
pub use self::image::{ImageOrientation, ImageThumbnailWorker};

#[cfg(feature = "video")]
pub use video::{FrameExtractor, VideoThumbnailWorker};

#[cfg(feature = "archive")]
pub use archive::ZipWorker;
