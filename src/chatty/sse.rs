//! SSE envelope: wraps one agent-loop run in a wall-clock timeout, turns every failure into a
//! terminal event rather than a dropped connection, and guarantees `on_finish` cleanup runs
//! exactly once regardless of how the stream ends (§4.10).

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{self, Stream};
use tokio::sync::{mpsc, oneshot};

use super::error::ChattyError;
use super::events::StreamEvent;
use super::metrics::Metrics;

/// One SSE frame as axum's `Sse` response body wants it.
pub type SseFrame = Result<axum::response::sse::Event, std::convert::Infallible>;

fn encode(event: &StreamEvent) -> axum::response::sse::Event {
    axum::response::sse::Event::default()
        .json_data(event)
        .unwrap_or_else(|_| axum::response::sse::Event::default().data("{}"))
}

fn terminal_error(message: &str, code: &'static str) -> StreamEvent {
    StreamEvent::Error {
        message: message.to_string(),
        code: Some(code.to_string()),
    }
}

struct State {
    rx: mpsc::Receiver<StreamEvent>,
    outcome_rx: oneshot::Receiver<&'static str>,
    driver_handle: tokio::task::JoinHandle<()>,
    deadline: Instant,
    metrics: Arc<Metrics>,
    started: Instant,
    on_finish: Option<Box<dyn FnOnce(&'static str) + Send>>,
    done: bool,
}

impl State {
    fn finish(&mut self, code: &'static str) {
        self.done = true;
        if let Some(cb) = self.on_finish.take() {
            cb(code);
        }
        self.metrics.session_finished(code, self.started.elapsed());
    }
}

/// Drive `make_driver` (handed a fresh [`mpsc::Sender`] to emit [`StreamEvent`]s on) to
/// completion, enforcing `request_timeout` as a wall-clock budget over the whole run. Every exit
/// path — natural completion, driver error, or timeout — calls `on_finish` exactly once with a
/// stable outcome code used for the session-duration metric.
pub fn envelope<D>(
    request_timeout: Duration,
    metrics: Arc<Metrics>,
    make_driver: impl FnOnce(mpsc::Sender<StreamEvent>) -> D,
    on_finish: impl FnOnce(&'static str) + Send + 'static,
) -> impl Stream<Item = SseFrame>
where
    D: Future<Output = Result<(), ChattyError>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(64);
    let driver = make_driver(tx.clone());
    let (outcome_tx, outcome_rx) = oneshot::channel();

    let driver_handle = tokio::spawn(async move {
        let outcome = match driver.await {
            Ok(()) => "ok",
            Err(ChattyError::ClientDisconnected) => "client_disconnected",
            Err(e) => {
                let code = e.stream_code();
                let _ = tx.send(terminal_error(&e.to_string(), code)).await;
                code
            }
        };
        let _ = outcome_tx.send(outcome);
    });

    metrics.session_started();
    let state = State {
        rx,
        outcome_rx,
        driver_handle,
        deadline: Instant::now() + request_timeout,
        metrics,
        started: Instant::now(),
        on_finish: Some(Box::new(on_finish)),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }

        let remaining = state.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            state.driver_handle.abort();
            state.finish("REQUEST_TIMEOUT");
            return Some((Ok(encode(&terminal_error("request timed out", "REQUEST_TIMEOUT"))), state));
        }

        tokio::select! {
            _ = tokio::time::sleep(remaining) => {
                state.driver_handle.abort();
                state.finish("REQUEST_TIMEOUT");
                Some((Ok(encode(&terminal_error("request timed out", "REQUEST_TIMEOUT"))), state))
            }
            received = state.rx.recv() => {
                match received {
                    Some(event) => {
                        state.metrics.event_emitted(event.label());
                        Some((Ok(encode(&event)), state))
                    }
                    None => {
                        let outcome = match state.outcome_rx.try_recv() {
                            Ok(code) => code,
                            Err(_) => "ok",
                        };
                        state.finish(outcome);
                        None
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn natural_completion_emits_no_terminal_error() {
        let metrics = Arc::new(Metrics::new());
        let finished = Arc::new(std::sync::Mutex::new(None));
        let finished2 = finished.clone();

        let frames: Vec<_> = envelope(
            Duration::from_secs(5),
            metrics.clone(),
            |tx| async move {
                tx.send(StreamEvent::Content {
                    content: "hi".to_string(),
                    message_id: None,
                })
                .await
                .ok();
                Ok(())
            },
            move |code| *finished2.lock().unwrap() = Some(code),
        )
        .collect()
        .await;

        assert_eq!(frames.len(), 1);
        assert_eq!(*finished.lock().unwrap(), Some("ok"));
    }

    #[tokio::test]
    async fn driver_error_produces_terminal_error_event() {
        let metrics = Arc::new(Metrics::new());
        let frames: Vec<_> = envelope(
            Duration::from_secs(5),
            metrics,
            |_tx| async move { Err(ChattyError::ModelUnreachable("boom".to_string())) },
            |_code| {},
        )
        .collect()
        .await;

        assert_eq!(frames.len(), 1);
    }

    #[tokio::test]
    async fn timeout_aborts_the_driver_and_emits_request_timeout() {
        let metrics = Arc::new(Metrics::new());
        let frames: Vec<_> = envelope(
            Duration::from_millis(20),
            metrics,
            |_tx| async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            },
            |_code| {},
        )
        .collect()
        .await;

        assert_eq!(frames.len(), 1);
    }
}
