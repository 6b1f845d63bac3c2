//! Image processing module
//!
//! - EXIF orientation correction (orientation)
//! - Derivative rendering and the thumbnail step (thumbnails)

pub mod orientation;
pub mod thumbnails;

pub use orientation::ImageOrientation;
pub use thumbnails::{render_derivatives, ImageThumbnailWorker, RenderedDerivative};
