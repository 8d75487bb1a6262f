//! Asynchronous OCR client
//!
//! [`OcrClient`] re-exposes the synchronous engine contract as async methods.
//! Every call gets a fresh correlation id and a pending continuation; a
//! dispatcher task routes the worker's progress and response messages back
//! to the waiting callers and listeners.

pub mod progress;

pub use progress::{ListenerHandle, ProgressCallback, ProgressEvent};

use parking_lot::{Mutex, ReentrantMutex};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::{OcrError, OcrResult};
use crate::shared::{CallId, EngineCall, EngineOutput, Method, WorkerMessage, WorkerRequest};
use crate::vision::{BoxItem, ModelSource, Orientation, PixelBuffer, Recognizer, TextItem, TextUnit};
use crate::worker::{self, WorkerHandle};
use progress::ProgressRegistry;

/// A call waiting for its response
struct PendingCall {
    method: Method,
    reply: oneshot::Sender<OcrResult<EngineOutput>>,
}

/// Client-side bookkeeping shared with the dispatcher
#[derive(Default)]
struct ClientState {
    next_id: CallId,
    pending: HashMap<CallId, PendingCall>,
    progress: ProgressRegistry,
    destroyed: bool,
    /// Set once the worker has gone away without being destroyed
    closed: Option<String>,
}

/// Async façade over an engine running on its own worker thread
///
/// Must be created from within a Tokio runtime.
pub struct OcrClient {
    state: Arc<Mutex<ClientState>>,
    /// Held while listeners run so that teardown waits for in-flight delivery
    delivery: Arc<ReentrantMutex<()>>,
    worker: Mutex<WorkerHandle>,
}

impl OcrClient {
    /// Start a worker thread running a recognizer built by `factory`
    ///
    /// Resolves once the recognizer is constructed and the configured
    /// variables are applied.
    pub async fn spawn<F, R>(factory: F, config: WorkerConfig) -> OcrResult<Self>
    where
        F: FnOnce() -> anyhow::Result<R> + Send + 'static,
        R: Recognizer + 'static,
    {
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (worker, ready) = worker::spawn(factory, &config, message_tx)?;

        match ready.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(OcrError::transport("worker exited during startup")),
        }

        let state = Arc::new(Mutex::new(ClientState::default()));
        let delivery = Arc::new(ReentrantMutex::new(()));
        tokio::spawn(dispatch(state.clone(), delivery.clone(), message_rx));

        info!("OCR client started on thread '{}'", config.worker.thread_name);

        Ok(Self {
            state,
            delivery,
            worker: Mutex::new(worker),
        })
    }

    /// Set a named recognizer variable
    pub async fn set_variable(&self, name: &str, value: &str) -> OcrResult<()> {
        let call = EngineCall::SetVariable {
            name: name.to_string(),
            value: value.to_string(),
        };
        expect_done(Method::SetVariable, self.call(call, None).await?)
    }

    /// Read a named recognizer variable
    pub async fn get_variable(&self, name: &str) -> OcrResult<String> {
        let call = EngineCall::GetVariable {
            name: name.to_string(),
        };
        match self.call(call, None).await? {
            EngineOutput::Variable(value) => Ok(value),
            other => Err(unexpected(Method::GetVariable, other)),
        }
    }

    /// Load a trained model from bytes
    pub async fn load_model(&self, model: Vec<u8>) -> OcrResult<()> {
        let out = self.call(EngineCall::LoadModel { model }, None).await?;
        expect_done(Method::LoadModel, out)
    }

    /// Fetch a trained model and load it
    pub async fn load_model_from(&self, source: &ModelSource) -> OcrResult<()> {
        let model = source.fetch().await?;
        self.load_model(model).await
    }

    /// Load a page image, discarding previous results
    pub async fn load_image(&self, image: impl Into<PixelBuffer>) -> OcrResult<()> {
        let call = EngineCall::LoadImage {
            image: image.into(),
        };
        expect_done(Method::LoadImage, self.call(call, None).await?)
    }

    /// Release the current image; the model stays loaded
    pub async fn clear_image(&self) -> OcrResult<()> {
        expect_done(Method::ClearImage, self.call(EngineCall::ClearImage, None).await?)
    }

    /// Layout boxes of the current image in reading order
    pub async fn get_bounding_boxes(&self, unit: TextUnit) -> OcrResult<Vec<BoxItem>> {
        match self.call(EngineCall::GetBoundingBoxes { unit }, None).await? {
            EngineOutput::Boxes(boxes) => Ok(boxes),
            other => Err(unexpected(Method::GetBoundingBoxes, other)),
        }
    }

    /// Recognized items of the current image in reading order
    pub async fn get_text_boxes(
        &self,
        unit: TextUnit,
        on_progress: Option<ProgressCallback>,
    ) -> OcrResult<Vec<TextItem>> {
        match self.call(EngineCall::GetTextBoxes { unit }, on_progress).await? {
            EngineOutput::TextBoxes(items) => Ok(items),
            other => Err(unexpected(Method::GetTextBoxes, other)),
        }
    }

    /// Recognized text of the current image
    pub async fn get_text(&self, on_progress: Option<ProgressCallback>) -> OcrResult<String> {
        match self.call(EngineCall::GetText, on_progress).await? {
            EngineOutput::Text(text) => Ok(text),
            other => Err(unexpected(Method::GetText, other)),
        }
    }

    /// Recognized page as hOCR markup
    pub async fn get_hocr(&self, on_progress: Option<ProgressCallback>) -> OcrResult<String> {
        match self.call(EngineCall::GetHocr, on_progress).await? {
            EngineOutput::Text(hocr) => Ok(hocr),
            other => Err(unexpected(Method::GetHocr, other)),
        }
    }

    /// Best-effort page rotation estimate
    pub async fn get_orientation(&self) -> OcrResult<Orientation> {
        match self.call(EngineCall::GetOrientation, None).await? {
            EngineOutput::Orientation(orientation) => Ok(orientation),
            other => Err(unexpected(Method::GetOrientation, other)),
        }
    }

    /// Register a listener notified of progress for every call
    ///
    /// Only events emitted after registration are delivered. Listeners run on
    /// the dispatcher task while `destroy` and `remove_progress_listener` wait
    /// for them, so they must return quickly and must not block.
    pub fn add_progress_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.state.lock().progress.add_global(Arc::new(listener))
    }

    /// Remove a listener; it receives no events after this returns
    pub fn remove_progress_listener(&self, handle: ListenerHandle) -> bool {
        let _delivery = self.delivery.lock();
        self.state.lock().progress.remove(handle)
    }

    /// Number of calls waiting for a response
    pub fn pending_calls(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    /// Tear down the worker
    ///
    /// Pending calls are rejected with `Destroyed`, listeners are dropped and
    /// no further progress is delivered. The request currently executing on
    /// the worker runs to completion before the engine is released. Calling
    /// this twice is a no-op.
    pub fn destroy(&self) {
        let _delivery = self.delivery.lock();
        let (pending, listeners) = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            let listeners = state.progress.len();
            state.progress.clear();
            (std::mem::take(&mut state.pending), listeners)
        };

        let rejected = pending.len();
        for (_, call) in pending {
            let _ = call.reply.send(Err(OcrError::Destroyed));
        }

        self.worker.lock().shutdown();
        info!(
            "OCR client destroyed, {} pending calls rejected, {} listeners dropped",
            rejected, listeners
        );
    }

    async fn call(
        &self,
        call: EngineCall,
        on_progress: Option<ProgressCallback>,
    ) -> OcrResult<EngineOutput> {
        let method = call.method();
        let (reply_tx, reply_rx) = oneshot::channel();

        let id = {
            let mut state = self.state.lock();
            if state.destroyed {
                return Err(OcrError::Destroyed);
            }
            if let Some(reason) = &state.closed {
                return Err(OcrError::Transport(reason.clone()));
            }
            let id = state.next_id;
            state.next_id += 1;
            state.pending.insert(
                id,
                PendingCall {
                    method,
                    reply: reply_tx,
                },
            );
            if let Some(callback) = on_progress.filter(|_| method.reports_progress()) {
                state.progress.add_for_call(id, callback);
            }
            id
        };

        debug!("Sending request {} ({})", id, method);
        let sent = self.worker.lock().send(WorkerRequest { id, call });
        if let Err(e) = sent {
            let mut state = self.state.lock();
            state.progress.release_call(id);
            if state.pending.remove(&id).is_some() {
                return Err(e);
            }
            // Already rejected by destroy or worker shutdown; fall through to
            // receive that rejection.
        }

        reply_rx
            .await
            .unwrap_or_else(|_| Err(OcrError::transport("response channel closed")))
    }
}

impl Drop for OcrClient {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Route worker messages to listeners and pending calls
async fn dispatch(
    state: Arc<Mutex<ClientState>>,
    delivery: Arc<ReentrantMutex<()>>,
    mut messages: mpsc::UnboundedReceiver<WorkerMessage>,
) {
    while let Some(message) = messages.recv().await {
        match message {
            WorkerMessage::Progress { id, value } => {
                let _delivery = delivery.lock();
                let (method, listeners) = {
                    let state = state.lock();
                    if state.destroyed {
                        continue;
                    }
                    let Some(call) = state.pending.get(&id) else {
                        continue;
                    };
                    (call.method, state.progress.listeners_for(id))
                };

                let event = ProgressEvent {
                    call_id: id,
                    method,
                    value,
                };
                for listener in listeners {
                    listener(&event);
                }
            }
            WorkerMessage::Response { id, result } => {
                let pending = {
                    let mut state = state.lock();
                    state.progress.release_call(id);
                    state.pending.remove(&id)
                };
                match pending {
                    Some(call) => {
                        if let Err(e) = &result {
                            debug!("Request {} ({}) failed: {}", id, call.method, e);
                        }
                        let _ = call.reply.send(result);
                    }
                    None => debug!("Dropping response for call {} with no pending entry", id),
                }
            }
        }
    }

    let mut state = state.lock();
    if state.destroyed {
        return;
    }

    let reason = "worker exited unexpectedly".to_string();
    state.closed = Some(reason.clone());
    state.progress.clear();
    let pending = std::mem::take(&mut state.pending);
    drop(state);

    if !pending.is_empty() {
        warn!("Worker exited with {} pending calls", pending.len());
    }
    for (_, call) in pending {
        let _ = call.reply.send(Err(OcrError::Transport(reason.clone())));
    }
}

fn expect_done(method: Method, output: EngineOutput) -> OcrResult<()> {
    match output {
        EngineOutput::Done => Ok(()),
        other => Err(unexpected(method, other)),
    }
}

fn unexpected(method: Method, output: EngineOutput) -> OcrError {
    OcrError::Transport(format!("unexpected response to {method}: {output:?}"))
}
