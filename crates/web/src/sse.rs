//! Server-Sent Events.
//!
//! Wire format per the HTML spec: `id:` / `event:` / `retry:` / `data:`
//! lines, one blank line after each event. Multi-line data is split into one
//! `data:` line per line. Events without an explicit id get a UUIDv4 with the
//! dashes stripped.

use futures::channel::mpsc::{channel, Receiver, SendError, Sender};
use futures::SinkExt;
use std::time::Duration;

/// One server-sent event.
#[derive(Debug, Clone, Default)]
pub struct Event {
    pub id: Option<String>,
    pub event: Option<String>,
    pub retry: Option<Duration>,
    pub data: String,
}

impl Event {
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into(), ..Self::default() }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn event(mut self, name: impl Into<String>) -> Self {
        self.event = Some(name.into());
        self
    }

    pub fn retry(mut self, retry: Duration) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn json(value: &impl serde::Serialize) -> Result<Self, crate::Error> {
        let data = serde_json::to_string(value).map_err(|e| crate::Error::encode(e.to_string()))?;
        Ok(Self::new(data))
    }

    /// Encode as an event-stream frame, terminated by a blank line.
    pub fn encode(&self) -> String {
        let mut frame = String::with_capacity(self.data.len() + 64);

        let id = self
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        frame.push_str("id: ");
        frame.push_str(&id);
        frame.push('\n');

        if let Some(event) = &self.event {
            frame.push_str("event: ");
            frame.push_str(event);
            frame.push('\n');
        }
        if let Some(retry) = &self.retry {
            frame.push_str("retry: ");
            frame.push_str(&retry.as_millis().to_string());
            frame.push('\n');
        }
        for line in self.data.split('\n') {
            frame.push_str("data: ");
            frame.push_str(line);
            frame.push('\n');
        }
        frame.push('\n');
        frame
    }
}

/// A handle for pushing events into an [`sse_channel`] stream.
#[derive(Debug, Clone)]
pub struct SseSender {
    sink: Sender<Event>,
}

impl SseSender {
    pub async fn send(&mut self, event: Event) -> Result<(), SendError> {
        self.sink.send(event).await
    }

    pub async fn close(&mut self) -> Result<(), SendError> {
        self.sink.close().await
    }
}

/// A bounded channel whose receiving half plugs into
/// [`crate::Context::sse_stream`].
pub fn sse_channel(buffer: usize) -> (SseSender, Receiver<Event>) {
    let (sender, receiver) = channel::<Event>(buffer);
    (SseSender { sink: sender }, receiver)
}
