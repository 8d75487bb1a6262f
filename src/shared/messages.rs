//! Message types exchanged between the client and the engine worker
//!
//! Requests carry a correlation id chosen by the client. The worker answers
//! each request with exactly one `Response` carrying the same id, optionally
//! preceded by `Progress` messages for that id.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::OcrError;
use crate::vision::{BoxItem, Orientation, PixelBuffer, TextItem, TextUnit};

/// Correlation id of one client call
pub type CallId = u64;

/// Engine method names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    SetVariable,
    GetVariable,
    LoadModel,
    LoadImage,
    ClearImage,
    GetBoundingBoxes,
    GetTextBoxes,
    GetText,
    GetHocr,
    GetOrientation,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::SetVariable => "set_variable",
            Method::GetVariable => "get_variable",
            Method::LoadModel => "load_model",
            Method::LoadImage => "load_image",
            Method::ClearImage => "clear_image",
            Method::GetBoundingBoxes => "get_bounding_boxes",
            Method::GetTextBoxes => "get_text_boxes",
            Method::GetText => "get_text",
            Method::GetHocr => "get_hocr",
            Method::GetOrientation => "get_orientation",
        }
    }

    /// Whether the method runs recognition and may emit progress
    pub fn reports_progress(&self) -> bool {
        matches!(self, Method::GetTextBoxes | Method::GetText | Method::GetHocr)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An engine method invocation with its arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "snake_case")]
pub enum EngineCall {
    SetVariable { name: String, value: String },
    GetVariable { name: String },
    LoadModel { model: Vec<u8> },
    LoadImage { image: PixelBuffer },
    ClearImage,
    GetBoundingBoxes { unit: TextUnit },
    GetTextBoxes { unit: TextUnit },
    GetText,
    GetHocr,
    GetOrientation,
}

impl EngineCall {
    pub fn method(&self) -> Method {
        match self {
            EngineCall::SetVariable { .. } => Method::SetVariable,
            EngineCall::GetVariable { .. } => Method::GetVariable,
            EngineCall::LoadModel { .. } => Method::LoadModel,
            EngineCall::LoadImage { .. } => Method::LoadImage,
            EngineCall::ClearImage => Method::ClearImage,
            EngineCall::GetBoundingBoxes { .. } => Method::GetBoundingBoxes,
            EngineCall::GetTextBoxes { .. } => Method::GetTextBoxes,
            EngineCall::GetText => Method::GetText,
            EngineCall::GetHocr => Method::GetHocr,
            EngineCall::GetOrientation => Method::GetOrientation,
        }
    }
}

/// Successful engine method result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EngineOutput {
    /// Method with no return value
    Done,
    Variable(String),
    Boxes(Vec<BoxItem>),
    TextBoxes(Vec<TextItem>),
    Text(String),
    Orientation(Orientation),
}

/// Request sent from client to worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub id: CallId,
    pub call: EngineCall,
}

/// Message sent from worker to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Recognition progress of an in-flight call (0.0 - 1.0)
    Progress { id: CallId, value: f32 },
    /// Final result of a call
    Response {
        id: CallId,
        result: Result<EngineOutput, OcrError>,
    },
}
