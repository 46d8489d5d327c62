// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::event::{MessageType, ResultStatus, SseEvent};

/// Maximum time a producer waits for queue space before the stream is
/// declared failed.  Parallel tools share one bounded queue; a consumer that
/// stops reading must not wedge the whole request forever.
const MAX_ENQUEUE_WAIT: Duration = Duration::from_secs(5);

/// Bounded outbound queue depth per request.
const QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum CloseReason {
    /// Normal completion; the final `result` frame was already enqueued.
    Done,
    /// Stream failure; the worker emits a final error `result` frame.
    Error(String),
}

enum Command {
    Event(SseEvent),
    Close(CloseReason),
}

#[derive(Debug, Clone)]
pub struct PrinterOptions {
    pub heartbeat: Duration,
    pub deadline: Duration,
}

impl Default for PrinterOptions {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(10),
            deadline: Duration::from_secs(3_600),
        }
    }
}

/// The per-request SSE progress bus.
///
/// All producers (agents, parallel tool tasks, the model client) enqueue
/// typed events; a single serializing worker drains the queue and writes one
/// `data:` frame per event onto the transport channel, so wire order equals
/// `send` order.  The worker also owns heartbeat scheduling and the request
/// deadline watchdog.
pub struct Printer {
    tx: mpsc::Sender<Command>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl Printer {
    /// Start the serializing worker and return the shared handle.
    ///
    /// `out` receives fully formatted SSE frames (`data: {json}\n\n`); the
    /// HTTP layer forwards them verbatim.  Dropping the receiver is treated
    /// as a client disconnect.  `cancel` is the request token: the watchdog
    /// trips it on deadline, and an already-cancelled token stops the worker.
    pub fn spawn(
        out: mpsc::Sender<String>,
        opts: PrinterOptions,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let printer = Arc::new(Self {
            tx,
            closed: AtomicBool::new(false),
            cancel: cancel.clone(),
        });
        tokio::spawn(worker(rx, out, opts, cancel));
        printer
    }

    /// Enqueue one event.  Waits up to [`MAX_ENQUEUE_WAIT`] under
    /// backpressure; a timeout fails the stream (the queue being full for
    /// that long means the consumer is gone or wedged).
    pub async fn send(&self, event: SseEvent) {
        if self.closed.load(Ordering::Acquire) {
            debug!(message_type = ?event.message_type, "dropping event after close");
            return;
        }
        if self
            .tx
            .send_timeout(Command::Event(event), MAX_ENQUEUE_WAIT)
            .await
            .is_err()
        {
            warn!("printer queue overflow; failing stream");
            self.close(CloseReason::Error("event stream overflow".into())).await;
        }
    }

    /// Close the stream.  Idempotent: the second and later calls are no-ops
    /// on the wire.  Events already queued are flushed before the close takes
    /// effect because the close travels through the same ordered queue.
    pub async fn close(&self, reason: CloseReason) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // The queue may be full when failing under backpressure; detach so
        // the caller is never blocked on its own close.
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(Command::Close(reason)).await;
        });
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The request cancellation token observed by everything downstream of
    /// this printer (LLM reads, tool tasks).
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

async fn worker(
    mut rx: mpsc::Receiver<Command>,
    out: mpsc::Sender<String>,
    opts: PrinterOptions,
    cancel: CancellationToken,
) {
    let mut heartbeat = tokio::time::interval(opts.heartbeat);
    // Consume the immediate first tick; heartbeats start one period in.
    heartbeat.tick().await;
    let deadline = tokio::time::sleep(opts.deadline);
    tokio::pin!(deadline);

    // Once the request-final frame has been written, nothing may follow it.
    let mut final_sent = false;

    loop {
        tokio::select! {
            biased;
            () = &mut deadline, if !final_sent => {
                debug!("request deadline reached; emitting timeout result");
                let ev = SseEvent::result(ResultStatus::Timeout, "request deadline exceeded", &[]);
                let _ = emit(&out, &ev).await;
                cancel.cancel();
                break;
            }
            _ = cancel.cancelled() => {
                // Client hung up or the request was cancelled externally:
                // abrupt close, no final frame.
                debug!("request cancelled; closing stream");
                break;
            }
            _ = heartbeat.tick(), if !final_sent => {
                if emit(&out, &SseEvent::heartbeat()).await.is_err() {
                    cancel.cancel();
                    break;
                }
            }
            cmd = rx.recv() => match cmd {
                Some(Command::Event(ev)) => {
                    if final_sent {
                        warn!(message_type = ?ev.message_type, "event after final frame dropped");
                        continue;
                    }
                    let is_request_final = ev.is_final && ev.message_type == MessageType::Result;
                    if emit(&out, &ev).await.is_err() {
                        cancel.cancel();
                        break;
                    }
                    final_sent = final_sent || is_request_final;
                }
                Some(Command::Close(reason)) => {
                    if let CloseReason::Error(msg) = reason {
                        if !final_sent {
                            let ev = SseEvent::result(ResultStatus::Error, msg, &[]);
                            let _ = emit(&out, &ev).await;
                        }
                    }
                    break;
                }
                None => break,
            }
        }
    }
    // Dropping `out` ends the transport stream and closes the connection.
}

async fn emit(out: &mpsc::Sender<String>, event: &SseEvent) -> Result<(), ()> {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "unserializable event dropped");
            return Ok(());
        }
    };
    out.send(format!("data: {json}\n\n")).await.map_err(|_| ())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
