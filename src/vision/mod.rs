//! Vision/OCR Layer
//!
//! The synchronous recognition engine and the types it produces. The engine
//! wraps a [`Recognizer`] backend, which supplies the actual layout analysis
//! and character recognition.

pub mod engine;
mod hocr;
mod layout;
pub mod models;
pub mod pixels;
pub mod recognizer;
pub mod types;

pub use engine::Engine;
pub use models::{DownloadProgressCallback, ModelInfo, ModelManifest, ModelSource, ModelStore};
pub use pixels::{PixelBuffer, PixelFormat};
pub use recognizer::Recognizer;
pub use types::{BoxFlags, BoxItem, IntRect, Orientation, TextItem, TextUnit};
