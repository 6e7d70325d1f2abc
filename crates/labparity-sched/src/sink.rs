//! Live event sink and in-process broadcaster.
//!
//! Duties never talk to a transport directly: they call [`LogSink::emit`].
//! [`Broadcaster`] assigns sequence numbers, keeps a bounded history for
//! polling clients, fans events out to channel subscribers and mirrors every
//! event to `tracing`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

pub const DEFAULT_HISTORY_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveEventKind {
    FillStart,
    FillLog,
    FillError,
    FillDone,
    FillMeta,
}

impl LiveEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FillStart => "fill_start",
            Self::FillLog => "fill_log",
            Self::FillError => "fill_error",
            Self::FillDone => "fill_done",
            Self::FillMeta => "fill_meta",
        }
    }
}

/// Event payload before the broadcaster stamps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMessage {
    pub kind: LiveEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl LiveMessage {
    pub fn text(kind: LiveEventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: Some(message.into()),
            meta: None,
        }
    }

    pub fn start(message: impl Into<String>) -> Self {
        Self::text(LiveEventKind::FillStart, message)
    }

    pub fn log(message: impl Into<String>) -> Self {
        Self::text(LiveEventKind::FillLog, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::text(LiveEventKind::FillError, message)
    }

    pub fn done(message: impl Into<String>) -> Self {
        Self::text(LiveEventKind::FillDone, message)
    }

    pub fn meta(meta: Value) -> Self {
        Self {
            kind: LiveEventKind::FillMeta,
            message: None,
            meta: Some(meta),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveEvent {
    pub seq: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub body: LiveMessage,
}

/// The single capability duties need from a live-log transport.
pub trait LogSink: Send + Sync {
    fn emit(&self, message: LiveMessage);
}

#[derive(Debug)]
struct BroadcastState {
    next_seq: u64,
    history: VecDeque<LiveEvent>,
    subscribers: Vec<Sender<LiveEvent>>,
}

#[derive(Debug)]
pub struct Broadcaster {
    capacity: usize,
    state: Mutex<BroadcastState>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(BroadcastState {
                next_seq: 1,
                history: VecDeque::new(),
                subscribers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BroadcastState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a channel subscriber and return the buffered events with
    /// `seq > since` taken under the same lock, so nothing falls between
    /// the backlog and the live feed. Dropping the receiver unsubscribes on
    /// the next emit.
    pub fn subscribe(&self, since: u64) -> (Vec<LiveEvent>, Receiver<LiveEvent>) {
        let (tx, rx) = mpsc::channel();
        let mut state = self.lock();
        let backlog = collect_since(&state.history, since);
        state.subscribers.push(tx);
        (backlog, rx)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Buffered events with `seq > since`, oldest first.
    pub fn events_since(&self, since: u64) -> Vec<LiveEvent> {
        collect_since(&self.lock().history, since)
    }

    /// Buffered events with `seq > since` plus the cursor for the next
    /// poll, read under one lock. A cursor ahead of the stream (e.g. from
    /// before a restart) is pulled back to the latest sequence.
    pub fn poll(&self, since: u64) -> (Vec<LiveEvent>, u64) {
        let state = self.lock();
        let events = collect_since(&state.history, since);
        let next = events
            .last()
            .map_or(since.min(state.next_seq - 1), |event| event.seq);
        (events, next)
    }
}

fn collect_since(history: &VecDeque<LiveEvent>, since: u64) -> Vec<LiveEvent> {
    history
        .iter()
        .filter(|event| event.seq > since)
        .cloned()
        .collect()
}

impl LogSink for Broadcaster {
    fn emit(&self, message: LiveMessage) {
        match message.kind {
            LiveEventKind::FillError => {
                warn!(kind = message.kind.as_str(), text = message.message.as_deref(), "live event")
            }
            LiveEventKind::FillMeta => {
                info!(kind = message.kind.as_str(), meta = ?message.meta, "live event")
            }
            _ => info!(kind = message.kind.as_str(), text = message.message.as_deref(), "live event"),
        }

        let mut state = self.lock();
        let event = LiveEvent {
            seq: state.next_seq,
            at: Utc::now(),
            body: message,
        };
        state.next_seq += 1;
        if state.history.len() == self.capacity {
            state.history.pop_front();
        }
        state.history.push_back(event.clone());
        state
            .subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_are_sequenced_and_pollable() {
        let broadcaster = Broadcaster::new(10);
        broadcaster.emit(LiveMessage::start("go"));
        broadcaster.emit(LiveMessage::log("step"));
        broadcaster.emit(LiveMessage::done("end"));

        let all = broadcaster.events_since(0);
        assert_eq!(all.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(broadcaster.events_since(2).len(), 1);
        assert_eq!(broadcaster.poll(0).1, 3);
    }

    #[test]
    fn history_is_bounded() {
        let broadcaster = Broadcaster::new(2);
        for i in 0..5 {
            broadcaster.emit(LiveMessage::log(format!("line {i}")));
        }
        let kept = broadcaster.events_since(0);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].seq, 4);
        assert_eq!(kept[1].body.message.as_deref(), Some("line 4"));
    }

    #[test]
    fn dropped_subscribers_are_removed_without_failing_the_writer() {
        let broadcaster = Broadcaster::default();
        let (_, live) = broadcaster.subscribe(0);
        let (_, gone) = broadcaster.subscribe(0);
        drop(gone);

        broadcaster.emit(LiveMessage::error("boom"));
        assert_eq!(broadcaster.subscriber_count(), 1);
        let received = live.try_recv().expect("live subscriber gets the event");
        assert_eq!(received.body.kind, LiveEventKind::FillError);
    }

    #[test]
    fn event_serializes_flat() {
        let broadcaster = Broadcaster::default();
        broadcaster.emit(LiveMessage::meta(json!({"status": "paused"})));
        let value = serde_json::to_value(&broadcaster.events_since(0)[0]).expect("serialize");
        assert_eq!(value["kind"], "fill_meta");
        assert_eq!(value["seq"], 1);
        assert_eq!(value["meta"]["status"], "paused");
        assert!(value.get("message").is_none());
    }

    #[test]
    fn subscribe_returns_backlog_then_live_events() {
        let broadcaster = Broadcaster::default();
        broadcaster.emit(LiveMessage::log("one"));
        broadcaster.emit(LiveMessage::log("two"));

        let (backlog, rx) = broadcaster.subscribe(1);
        assert_eq!(backlog.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![2]);
        broadcaster.emit(LiveMessage::log("three"));
        assert_eq!(rx.try_recv().expect("live event").seq, 3);
    }

    #[test]
    fn poll_cursor_never_skips_concurrent_events() {
        let broadcaster = std::sync::Arc::new(Broadcaster::new(10_000));
        let total = 2_000u64;
        let writer = {
            let broadcaster = std::sync::Arc::clone(&broadcaster);
            std::thread::spawn(move || {
                for i in 0..total {
                    broadcaster.emit(LiveMessage::log(format!("line {i}")));
                }
            })
        };

        let mut seen = Vec::new();
        let mut cursor = 0;
        while seen.len() < total as usize {
            let (events, next) = broadcaster.poll(cursor);
            seen.extend(events.iter().map(|e| e.seq));
            cursor = next;
        }
        writer.join().expect("writer thread");
        assert_eq!(seen, (1..=total).collect::<Vec<_>>());
    }

    #[test]
    fn poll_without_new_events_keeps_the_cursor() {
        let broadcaster = Broadcaster::default();
        broadcaster.emit(LiveMessage::log("one"));
        assert_eq!(broadcaster.poll(1), (Vec::new(), 1));
        assert_eq!(broadcaster.poll(7), (Vec::new(), 1));
    }
}
