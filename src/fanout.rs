// src/fanout.rs
//! Live fan-out of accepted records to connected WebSocket clients.
//!
//! Publishing never blocks and never fails the pipeline: with no subscribers
//! the event is simply dropped. Slow clients that fall behind the channel
//! capacity skip the missed events and keep receiving.

use axum::extract::ws::{Message, WebSocket};
use metrics::counter;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::ingest::types::CanonicalRecord;

pub const NEW_RECORD_EVENT: &str = "newTweet";

#[derive(Debug, Clone, Serialize)]
pub struct FanoutEvent {
    pub event: &'static str,
    pub data: CanonicalRecord,
}

impl FanoutEvent {
    pub fn new_record(record: CanonicalRecord) -> Self {
        Self {
            event: NEW_RECORD_EVENT,
            data: record,
        }
    }
}

#[derive(Clone)]
pub struct LiveFanout {
    tx: broadcast::Sender<FanoutEvent>,
}

impl LiveFanout {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Push one accepted record to every current subscriber.
    /// Returns how many subscribers it was queued for.
    pub fn publish(&self, record: &CanonicalRecord) -> usize {
        match self.tx.send(FanoutEvent::new_record(record.clone())) {
            Ok(n) => {
                counter!("monitor_fanout_published_total").increment(1);
                debug!(target: "fanout", receivers = n, "record published");
                n
            }
            Err(_) => 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FanoutEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Drive one upgraded socket until either side closes.
    pub async fn serve_socket(self, mut socket: WebSocket) {
        let mut rx = self.subscribe();
        info!(target: "fanout", clients = self.subscriber_count(), "live client connected");

        loop {
            tokio::select! {
                ev = rx.recv() => match ev {
                    Ok(ev) => {
                        let text = match serde_json::to_string(&ev) {
                            Ok(t) => t,
                            Err(e) => {
                                warn!(target: "fanout", error = %e, "event encode failed");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(target: "fanout", skipped, "live client lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                msg = socket.recv() => match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    // inbound text/binary is ignored; pings are answered by axum
                    Some(Ok(_)) => {}
                },
            }
        }

        drop(rx);
        info!(target: "fanout", clients = self.subscriber_count(), "live client disconnected");
    }
}
