//! Video processing module

pub mod ffmpeg;
pub mod thumbnails;

pub use ffmpeg::{qscale_for_quality, FrameExtractor};
pub use thumbnails::VideoThumbnailWorker;
