// Correlator module: traffic interception, pairing, and run lifecycle

mod builder;
mod engine;
mod ipc;
mod pipeline;

pub use builder::ExchangeBuilder;
pub use engine::{CapturedRun, Correlator, CorrelatorOptions};
pub use ipc::{FlowAck, FlowMessage, IngestClient, IngestConnection, IngestServer};
pub use pipeline::{FlowEvent, Pipeline};

use crate::config::Config;
use crate::error::Result;
use crate::exchange::BodyLimits;
use crate::report::ArtifactWriter;
use std::path::PathBuf;
use tokio::net::UnixStream;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tokio::task;

/// Collector: one capture run's lifecycle.
///
/// Binds the ingest socket, feeds flow events into the pipeline, and — on a
/// `Done` message or a termination signal — drains the pipeline and writes
/// the artifact. One collector is one run; `run()` returns the artifact path.
pub struct Collector {
    config: Config,
}

impl Collector {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run in the foreground until the session ends, then finalize.
    pub async fn run(&mut self) -> Result<PathBuf> {
        let options = CorrelatorOptions {
            allowed_domains: self.config.scope.allowed_domains.clone(),
            limits: BodyLimits {
                max_text_excerpt: self.config.output.max_text_excerpt,
                max_binary_inline: self.config.output.max_binary_inline,
            },
        };

        match &options.allowed_domains {
            Some(domains) if !domains.is_empty() => {
                tracing::info!("Capture scope: {}", domains.join(", "));
            }
            _ => {
                tracing::warn!("No domain allow-list configured, all traffic will be captured");
            }
        }
        tracing::info!(
            "Artifacts will be written to {:?}",
            self.config.output.directory
        );

        let correlator = Correlator::new(options)?;
        let writer = ArtifactWriter::new(&self.config.output.directory);

        let mut server = IngestServer::new(self.config.capture.socket_path.clone());
        server.bind().await?;

        let pipeline = Pipeline::new(correlator, writer, self.config.capture.buffer_size);

        let (done_tx, mut done_rx) = mpsc::channel::<()>(1);
        let (close_tx, close_rx) = watch::channel(false);
        let mut shutdown = ShutdownSignal::new()?;

        loop {
            tokio::select! {
                accepted = server.accept() => {
                    match accepted {
                        Ok(stream) => {
                            let events = pipeline.clone_sender();
                            let done = done_tx.clone();
                            let close = close_rx.clone();
                            task::spawn(async move {
                                if let Err(e) = handle_client(stream, events, done, close).await {
                                    tracing::error!("Client handler error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept failed: {}", e);
                        }
                    }
                }

                _ = done_rx.recv() => {
                    tracing::info!("Session reported done");
                    break;
                }

                _ = shutdown.wait() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        // Stop accepting, tell idle handlers to hang up, then drain. A
        // handler mid-frame finishes its event submission first; the
        // pipeline barrier waits for every handler to release its sender.
        server.shutdown()?;
        let _ = close_tx.send(true);
        let path = pipeline.shutdown().await?;

        Ok(path)
    }
}

/// Handle one ingest connection, which may stream any number of frames.
/// The handler exits on peer EOF, after acknowledging `Done`, or when the
/// collector signals close; exiting releases its event sender.
async fn handle_client(
    mut stream: UnixStream,
    events: mpsc::Sender<FlowEvent>,
    done: mpsc::Sender<()>,
    mut close: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        let message = tokio::select! {
            message = ipc::read_message(&mut stream) => message?,
            _ = close.changed() => break,
        };

        let Some(message) = message else {
            break;
        };

        let session_done = matches!(message, FlowMessage::Done);
        let ack = match message {
            FlowMessage::Request(_) | FlowMessage::Response(_) => {
                match Option::<FlowEvent>::from(message) {
                    Some(event) => match events.send(event).await {
                        Ok(_) => FlowAck::success("Event queued"),
                        Err(_) => FlowAck::error("Collector is shutting down"),
                    },
                    None => FlowAck::error("Invalid flow message"),
                }
            }
            FlowMessage::Status => FlowAck::success("Collector is running"),
            FlowMessage::Done => {
                // try_send: a duplicate Done must not block this handler
                let _ = done.try_send(());
                FlowAck::success("Finalizing run")
            }
        };

        ipc::write_ack(&mut stream, &ack).await?;

        if session_done {
            break;
        }
    }

    Ok(())
}

/// Termination signals that end the run
struct ShutdownSignal {
    sigterm: Signal,
    sigint: Signal,
}

impl ShutdownSignal {
    fn new() -> Result<Self> {
        let sigterm = signal(SignalKind::terminate()).map_err(|e| crate::error::FlowlensError::Io {
            source: e,
            context: "Failed to setup SIGTERM handler".to_string(),
        })?;
        let sigint = signal(SignalKind::interrupt()).map_err(|e| crate::error::FlowlensError::Io {
            source: e,
            context: "Failed to setup SIGINT handler".to_string(),
        })?;
        Ok(Self { sigterm, sigint })
    }

    async fn wait(&mut self) {
        tokio::select! {
            _ = self.sigterm.recv() => tracing::info!("Received SIGTERM"),
            _ = self.sigint.recv() => tracing::info!("Received SIGINT"),
        }
    }
}
