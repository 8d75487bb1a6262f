//! ocr-worker - OCR engine hosted on a dedicated worker thread
//!
//! A synchronous recognition [`vision::Engine`] wraps a native
//! [`vision::Recognizer`] backend. The engine lives on its own thread and is
//! driven through [`client::OcrClient`], which exposes every engine method
//! as an async call with progress reporting and explicit teardown.

pub mod client;
pub mod config;
pub mod error;
pub mod shared;
pub mod storage;
pub mod vision;
pub mod worker;

pub use client::{ListenerHandle, OcrClient, ProgressCallback, ProgressEvent};
pub use config::WorkerConfig;
pub use error::{OcrError, OcrResult, PreconditionError};
pub use shared::{CallId, Method};
pub use vision::{
    BoxFlags, BoxItem, Engine, IntRect, ModelSource, ModelStore, Orientation, PixelBuffer,
    PixelFormat, Recognizer, TextItem, TextUnit,
};
