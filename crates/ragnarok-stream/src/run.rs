use futures::StreamExt as _;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::config::EndOfStreamPolicy;
use crate::ingestor::StreamIngestor;
use crate::session::StreamSession;
use crate::stream::{ChatEvent, SessionState};
use crate::transport::ByteStream;

/// Message recorded when the ingest task disappears without reporting.
const TASK_LOST: &str = "chat stream task ended unexpectedly";

/// Handle used to cancel a running stream.
#[derive(Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Requests cancellation.
    ///
    /// No further events are dispatched once this returns and the transport
    /// body is dropped by the ingest task. Cancellation is not an error: no
    /// `ChatEvent::Error` is produced.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Streaming handle for one chat answer.
///
/// Use `next_event()` to consume events as they arrive and `finish()` to
/// obtain the final `StreamSession`.
pub struct ChatStream {
    session: StreamSession,
    rx: mpsc::Receiver<ChatEvent>,
    outcome_rx: Option<oneshot::Receiver<SessionState>>,
    cancel: CancelHandle,
}

impl ChatStream {
    /// Starts ingesting an already opened body on the current tokio runtime.
    pub fn from_body(body: ByteStream, end_of_stream: EndOfStreamPolicy, capacity: usize) -> Self {
        let session_id = uuid::Uuid::new_v4();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        info!(%session_id, "chat stream started");
        tokio::spawn(ingest_task(
            session_id,
            body,
            StreamIngestor::new(end_of_stream),
            tx,
            outcome_tx,
            cancel_rx,
        ));

        Self {
            session: StreamSession::new(session_id),
            rx,
            outcome_rx: Some(outcome_rx),
            cancel: CancelHandle { tx: cancel_tx },
        }
    }

    pub fn session_id(&self) -> uuid::Uuid {
        self.session.session_id
    }

    /// Returns a handle that can cancel the stream from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Cancels the stream and finalizes the session as `Cancelled`.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.session.mark_cancelled();
    }

    /// Session state as of the last returned event.
    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    /// Waits for the next event and applies it to the session.
    ///
    /// Returns `None` once the session is finalized.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        if self.session.is_finished() {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.session.mark_cancelled();
            return None;
        }
        match self.rx.recv().await {
            Some(_) if self.cancel.is_cancelled() => {
                self.session.mark_cancelled();
                None
            }
            Some(event) => {
                self.session.apply(&event);
                Some(event)
            }
            None => {
                self.settle_closed().await;
                None
            }
        }
    }

    /// Drains remaining events and returns the finalized session.
    ///
    /// Safe to call after consuming events with `next_event()`.
    pub async fn finish(mut self) -> StreamSession {
        while self.next_event().await.is_some() {}
        self.session
    }

    // The channel closed without a terminal event reaching the consumer.
    async fn settle_closed(&mut self) {
        let outcome = match self.outcome_rx.take() {
            Some(rx) => rx.await.ok(),
            None => None,
        };
        match outcome {
            Some(SessionState::Cancelled) => {
                self.session.mark_cancelled();
            }
            _ if self.cancel.is_cancelled() => {
                self.session.mark_cancelled();
            }
            _ => {
                self.session.apply(&ChatEvent::Error {
                    message: TASK_LOST.to_string(),
                });
            }
        }
    }
}

async fn ingest_task(
    session_id: uuid::Uuid,
    mut body: ByteStream,
    mut ingestor: StreamIngestor,
    tx: mpsc::Sender<ChatEvent>,
    outcome_tx: oneshot::Sender<SessionState>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    ingestor.begin();
    while !ingestor.state().is_terminal() {
        tokio::select! {
            biased;
            changed = cancel_rx.changed() => {
                match changed {
                    Ok(()) if *cancel_rx.borrow() => {
                        ingestor.cancel();
                    }
                    Ok(()) => {}
                    // Every handle is gone, nobody can observe further events.
                    Err(_) => {
                        ingestor.cancel();
                    }
                }
            }
            next = body.next() => {
                let events = match next {
                    Some(Ok(chunk)) => ingestor.push_fragment(&chunk),
                    Some(Err(err)) => ingestor.read_failed(&err).into_iter().collect(),
                    None => ingestor.end_of_stream().into_iter().collect(),
                };
                for event in events {
                    if !deliver(&tx, &mut cancel_rx, event).await {
                        ingestor.cancel();
                        break;
                    }
                }
            }
        }
    }
    drop(body);
    let state = ingestor.state();
    info!(%session_id, ?state, "chat stream finished");
    let _ = outcome_tx.send(state);
}

// Sends one event unless the stream is cancelled first. Returns false when
// dispatch must stop.
async fn deliver(
    tx: &mpsc::Sender<ChatEvent>,
    cancel_rx: &mut watch::Receiver<bool>,
    event: ChatEvent,
) -> bool {
    if *cancel_rx.borrow() {
        return false;
    }
    debug!(?event, "dispatching chat event");
    tokio::select! {
        biased;
        _ = wait_for_cancel(cancel_rx) => false,
        sent = tx.send(event) => sent.is_ok(),
    }
}

async fn wait_for_cancel(cancel_rx: &mut watch::Receiver<bool>) {
    loop {
        if *cancel_rx.borrow_and_update() {
            return;
        }
        if cancel_rx.changed().await.is_err() {
            return;
        }
    }
}
