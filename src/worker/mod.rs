//! Engine Worker
//!
//! Hosts exactly one [`Engine`] on a dedicated thread. Requests arrive over a
//! channel and are executed one at a time, in arrival order; each produces
//! one response message, preceded by progress messages for recognition
//! methods. The engine is never touched from any other thread.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::error::{OcrError, OcrResult};
use crate::shared::{EngineCall, EngineOutput, WorkerMessage, WorkerRequest};
use crate::vision::{Engine, Recognizer};

/// Client-side handle to a running worker thread
pub struct WorkerHandle {
    requests: Option<Sender<WorkerRequest>>,
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Queue a request for the engine
    pub fn send(&self, request: WorkerRequest) -> OcrResult<()> {
        let Some(requests) = &self.requests else {
            return Err(OcrError::Destroyed);
        };
        requests
            .send(request)
            .map_err(|_| OcrError::transport("worker is not running"))
    }

    /// Ask the worker to stop after the request it is currently executing
    pub fn shutdown(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.try_send(());
        }
        self.requests = None;
    }

    /// Check if the worker thread is still alive
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Block until the worker thread exits
    pub fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("Engine worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start a worker thread hosting an engine built by `factory`
///
/// The returned receiver resolves once the recognizer has been created and
/// the configured variables applied, or with the error that prevented it.
pub(crate) fn spawn<F, R>(
    factory: F,
    config: &WorkerConfig,
    messages: mpsc::UnboundedSender<WorkerMessage>,
) -> OcrResult<(WorkerHandle, oneshot::Receiver<OcrResult<()>>)>
where
    F: FnOnce() -> anyhow::Result<R> + Send + 'static,
    R: Recognizer + 'static,
{
    let (request_tx, request_rx) = unbounded();
    let (shutdown_tx, shutdown_rx) = bounded(1);
    let (ready_tx, ready_rx) = oneshot::channel();
    let settings = config.engine.clone();

    let thread = std::thread::Builder::new()
        .name(config.worker.thread_name.clone())
        .spawn(move || {
            info!("Engine worker thread starting...");

            let recognizer = match factory() {
                Ok(recognizer) => recognizer,
                Err(e) => {
                    error!("Failed to create recognizer: {:#}", e);
                    let _ = ready_tx.send(Err(OcrError::Transport(format!(
                        "failed to create recognizer: {e:#}"
                    ))));
                    return;
                }
            };

            let mut engine = Engine::with_settings(recognizer, settings.clone());
            for (name, value) in &settings.variables {
                if let Err(e) = engine.set_variable(name, value) {
                    error!("Failed to apply variable {}: {}", name, e);
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            }

            if ready_tx.send(Ok(())).is_err() {
                return;
            }

            run(&mut engine, &request_rx, &shutdown_rx, &messages);
            engine.destroy();
            info!("Engine worker thread exiting...");
        })
        .map_err(|e| OcrError::transport(format!("failed to spawn worker thread: {e}")))?;

    let handle = WorkerHandle {
        requests: Some(request_tx),
        shutdown: Some(shutdown_tx),
        thread: Some(thread),
    };

    Ok((handle, ready_rx))
}

/// Request loop; returns when shut down, when the client is gone, or after a panic
fn run<R: Recognizer>(
    engine: &mut Engine<R>,
    requests: &Receiver<WorkerRequest>,
    shutdown: &Receiver<()>,
    messages: &mpsc::UnboundedSender<WorkerMessage>,
) {
    loop {
        let request = crossbeam_channel::select! {
            recv(requests) -> request => match request {
                Ok(request) => request,
                Err(_) => break,
            },
            recv(shutdown) -> _ => break,
        };

        // A shutdown that raced with this request wins; the client has
        // already rejected the call.
        if shutdown_requested(shutdown) {
            break;
        }

        let id = request.id;
        let method = request.call.method();
        debug!("Executing request {} ({})", id, method);
        let start = Instant::now();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut progress = |value: f32| {
                let _ = messages.send(WorkerMessage::Progress { id, value });
            };
            execute(engine, request.call, &mut progress)
        }));

        let (result, crashed) = match outcome {
            Ok(result) => (result, false),
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!("Engine panicked during {}: {}", method, reason);
                (
                    Err(OcrError::Transport(format!("engine crashed during {method}: {reason}"))),
                    true,
                )
            }
        };

        debug!("Request {} ({}) finished in {:?}", id, method, start.elapsed());

        if messages.send(WorkerMessage::Response { id, result }).is_err() {
            debug!("Client is gone, stopping worker");
            break;
        }
        if crashed {
            break;
        }
    }
}

fn shutdown_requested(shutdown: &Receiver<()>) -> bool {
    match shutdown.try_recv() {
        Ok(()) | Err(TryRecvError::Disconnected) => true,
        Err(TryRecvError::Empty) => false,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Invoke the engine method named by `call`
pub(crate) fn execute<R: Recognizer>(
    engine: &mut Engine<R>,
    call: EngineCall,
    progress: &mut dyn FnMut(f32),
) -> OcrResult<EngineOutput> {
    match call {
        EngineCall::SetVariable { name, value } => {
            engine.set_variable(&name, &value).map(|()| EngineOutput::Done)
        }
        EngineCall::GetVariable { name } => engine.get_variable(&name).map(EngineOutput::Variable),
        EngineCall::LoadModel { model } => engine.load_model(&model).map(|()| EngineOutput::Done),
        EngineCall::LoadImage { image } => engine.load_image(&image).map(|()| EngineOutput::Done),
        EngineCall::ClearImage => engine.clear_image().map(|()| EngineOutput::Done),
        EngineCall::GetBoundingBoxes { unit } => {
            engine.get_bounding_boxes(unit).map(EngineOutput::Boxes)
        }
        EngineCall::GetTextBoxes { unit } => {
            engine.get_text_boxes(unit, progress).map(EngineOutput::TextBoxes)
        }
        EngineCall::GetText => engine.get_text(progress).map(EngineOutput::Text),
        EngineCall::GetHocr => engine.get_hocr(progress).map(EngineOutput::Text),
        EngineCall::GetOrientation => engine.get_orientation().map(EngineOutput::Orientation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::recognizer::testing::{model_bytes, page_image, ScriptedPage, ScriptedRecognizer};
    use crate::vision::TextUnit;

    fn recognizer() -> ScriptedRecognizer {
        ScriptedRecognizer::new(ScriptedPage::three_lines())
    }

    #[test]
    fn test_execute_dispatches_calls() {
        let mut engine = Engine::new(recognizer());
        let mut progress = |_| {};

        let out = execute(&mut engine, EngineCall::LoadModel { model: model_bytes() }, &mut progress);
        assert_eq!(out, Ok(EngineOutput::Done));

        let out = execute(&mut engine, EngineCall::LoadImage { image: page_image() }, &mut progress);
        assert_eq!(out, Ok(EngineOutput::Done));

        match execute(&mut engine, EngineCall::GetBoundingBoxes { unit: TextUnit::Line }, &mut progress) {
            Ok(EngineOutput::Boxes(boxes)) => assert_eq!(boxes.len(), 3),
            other => panic!("unexpected output: {other:?}"),
        }

        match execute(&mut engine, EngineCall::GetText, &mut progress) {
            Ok(EngineOutput::Text(text)) => assert!(text.starts_with("The quick")),
            other => panic!("unexpected output: {other:?}"),
        }

        let out = execute(
            &mut engine,
            EngineCall::GetVariable { name: "missing".to_string() },
            &mut progress,
        );
        assert!(matches!(out, Err(OcrError::Configuration(_))));
    }

    #[test]
    fn test_worker_round_trip_and_shutdown() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (mut handle, mut ready) = spawn(|| Ok(recognizer()), &WorkerConfig::default(), tx).unwrap();

        // Wait for startup
        let started = loop {
            match ready.try_recv() {
                Ok(result) => break result,
                Err(oneshot::error::TryRecvError::Empty) => std::thread::yield_now(),
                Err(e) => panic!("worker vanished: {e}"),
            }
        };
        assert_eq!(started, Ok(()));

        handle
            .send(WorkerRequest { id: 1, call: EngineCall::LoadModel { model: model_bytes() } })
            .unwrap();
        handle
            .send(WorkerRequest { id: 2, call: EngineCall::LoadImage { image: page_image() } })
            .unwrap();
        handle.send(WorkerRequest { id: 3, call: EngineCall::GetText }).unwrap();

        let mut responses = Vec::new();
        let mut progress = Vec::new();
        while responses.len() < 3 {
            match rx.blocking_recv().expect("worker stopped early") {
                WorkerMessage::Progress { id, value } => progress.push((id, value)),
                WorkerMessage::Response { id, result } => responses.push((id, result.is_ok())),
            }
        }

        assert_eq!(responses, vec![(1, true), (2, true), (3, true)]);
        assert!(!progress.is_empty());
        assert!(progress.iter().all(|(id, _)| *id == 3));

        handle.shutdown();
        handle.join();
        assert!(!handle.is_running());
        assert!(rx.blocking_recv().is_none());
        assert_eq!(
            handle.send(WorkerRequest { id: 4, call: EngineCall::ClearImage }),
            Err(OcrError::Destroyed)
        );
    }

    #[test]
    fn test_factory_failure_reported() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (mut handle, ready) = spawn(
            || -> anyhow::Result<ScriptedRecognizer> { anyhow::bail!("no native library") },
            &WorkerConfig::default(),
            tx,
        )
        .unwrap();

        handle.join();
        let result = ready.blocking_recv().unwrap();
        assert!(matches!(result, Err(OcrError::Transport(ref msg)) if msg.contains("no native library")));
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(42);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
