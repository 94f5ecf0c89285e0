// Event pipeline: a bounded channel feeding the single worker task that owns
// the correlation engine. The worker is the critical section — every mutation
// of pending records, page map, and ledger happens on it, one event at a time.

use crate::correlator::engine::Correlator;
use crate::correlator::ipc::FlowMessage;
use crate::error::{FlowlensError, Result};
use crate::flow::{RequestEvent, ResponseEvent};
use crate::report::ArtifactWriter;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Flow event to be applied to the engine
#[derive(Debug, Clone)]
pub enum FlowEvent {
    Request(RequestEvent),
    Response(ResponseEvent),
}

impl From<FlowMessage> for Option<FlowEvent> {
    fn from(msg: FlowMessage) -> Self {
        match msg {
            FlowMessage::Request(req) => Some(FlowEvent::Request(req)),
            FlowMessage::Response(resp) => Some(FlowEvent::Response(resp)),
            _ => None,
        }
    }
}

/// Processing pipeline that applies flow events to the engine and, once the
/// channel drains, finalizes the run and writes the artifact
pub struct Pipeline {
    /// Channel for submitting flow events
    pub(super) event_tx: mpsc::Sender<FlowEvent>,
    /// Handle to the worker task; resolves to the artifact path
    worker_handle: Option<tokio::task::JoinHandle<Result<PathBuf>>>,
}

impl Pipeline {
    /// Create a new pipeline around a fresh engine
    pub fn new(correlator: Correlator, writer: ArtifactWriter, buffer_size: usize) -> Self {
        let (event_tx, event_rx) = mpsc::channel(buffer_size);

        let worker_handle = Some(tokio::spawn(async move {
            correlator_worker(event_rx, correlator, writer).await
        }));

        Self {
            event_tx,
            worker_handle,
        }
    }

    /// Submit a flow event. Returns an error if the pipeline already shut down.
    pub async fn send(&self, event: FlowEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| FlowlensError::Ingest("Pipeline channel closed".to_string()))
    }

    /// Clone the sender for use in connection handler tasks
    pub fn clone_sender(&self) -> mpsc::Sender<FlowEvent> {
        self.event_tx.clone()
    }

    /// Shut down: close the channel, wait for the worker to apply every
    /// queued event, finalize the run, and write the artifact.
    ///
    /// Handler tasks holding cloned senders keep the channel open until they
    /// finish, so this is the barrier that waits out in-flight callbacks.
    /// Consuming self makes finalization a once-only operation.
    pub async fn shutdown(mut self) -> Result<PathBuf> {
        drop(self.event_tx);

        let handle = self
            .worker_handle
            .take()
            .ok_or_else(|| FlowlensError::Ingest("Pipeline already shut down".to_string()))?;

        tracing::info!("Waiting for pipeline to drain...");
        let path = handle
            .await
            .map_err(|e| FlowlensError::Ingest(format!("Pipeline worker panicked: {}", e)))??;
        tracing::info!("Pipeline drained successfully");

        Ok(path)
    }
}

/// Worker that owns the engine, applies events in arrival order, and
/// finalizes when the channel closes
async fn correlator_worker(
    mut event_rx: mpsc::Receiver<FlowEvent>,
    mut correlator: Correlator,
    writer: ArtifactWriter,
) -> Result<PathBuf> {
    let mut processed: u64 = 0;

    while let Some(event) = event_rx.recv().await {
        match event {
            FlowEvent::Request(req) => correlator.on_request(&req),
            FlowEvent::Response(resp) => correlator.on_response(&resp),
        }
        processed += 1;
    }

    tracing::info!(
        events = processed,
        exchanges = correlator.exchange_count(),
        pending = correlator.pending_count(),
        "Event stream closed, finalizing run"
    );

    let run = correlator.finalize();
    writer.write(&run)
}
