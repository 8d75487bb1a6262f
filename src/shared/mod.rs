//! Messaging shared between the client and the engine worker
//!
//! The client and the worker never share the engine; they only exchange the
//! messages defined here.

pub mod messages;

pub use messages::{CallId, EngineCall, EngineOutput, Method, WorkerMessage, WorkerRequest};
