use async_trait::async_trait;
use omni_types::{Envelope, EnvelopeType};
use serde_json::json;

/// Abstraction over "send one envelope to this connection". The transport
/// itself (WebSocket frame, SSE event, whatever the embedding binary
/// chooses) is left to the caller — this crate only needs somewhere to
/// push outbound envelopes.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, envelope: Envelope);
}

/// Enforces the streaming invariant: for every
/// `stream_start(id)` there is exactly one terminator
/// (`stream_end(id)` or `error(id)`), with every `stream_chunk(id)` falling
/// strictly between the two. Constructing a guard sends `stream_start`;
/// the guard must be consumed by `end` or `error` before it is dropped.
pub struct StreamGuard<'a> {
    sink: &'a dyn EventSink,
    id: String,
    terminated: bool,
}

impl<'a> StreamGuard<'a> {
    pub async fn start(sink: &'a dyn EventSink, id: impl Into<String>) -> StreamGuard<'a> {
        let id = id.into();
        sink.send(Envelope::new(EnvelopeType::StreamStart, json!({ "id": id })).with_id(id.clone()))
            .await;
        StreamGuard { sink, id, terminated: false }
    }

    /// Appends a chunk. Chunks belong to the same `id` and must be sent in
    /// emission order; callers are responsible for that ordering since the
    /// guard only tracks start/terminate, not chunk sequencing.
    pub async fn chunk(&self, content: impl Into<String>) {
        self.sink
            .send(
                Envelope::new(EnvelopeType::StreamChunk, json!({ "id": self.id, "content": content.into() }))
                    .with_id(self.id.clone()),
            )
            .await;
    }

    pub async fn end(mut self) {
        self.sink
            .send(Envelope::new(EnvelopeType::StreamEnd, json!({ "id": self.id })).with_id(self.id.clone()))
            .await;
        self.terminated = true;
    }

    /// Terminates a cancelled or failed stream with `error(id)` instead of
    /// `stream_end`, per the streaming contract's cancellation case.
    pub async fn error(mut self, message: impl Into<String>) {
        self.sink
            .send(Envelope::error(Some(self.id.clone()), message, None))
            .await;
        self.terminated = true;
    }
}

impl Drop for StreamGuard<'_> {
    fn drop(&mut self) {
        if !self.terminated {
            tracing::warn!(id = %self.id, "stream guard dropped without a terminator envelope");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Envelope>>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn send(&self, envelope: Envelope) {
            self.sent.lock().await.push(envelope);
        }
    }

    #[tokio::test]
    async fn start_chunk_end_emits_exactly_one_terminator() {
        let sink = RecordingSink::default();
        let guard = StreamGuard::start(&sink, "req-1").await;
        guard.chunk("hello").await;
        guard.chunk(" world").await;
        guard.end().await;

        let sent = sink.sent.lock().await;
        assert_eq!(sent.len(), 4);
        assert!(matches!(sent[0].kind, EnvelopeType::StreamStart));
        assert!(matches!(sent[1].kind, EnvelopeType::StreamChunk));
        assert!(matches!(sent[2].kind, EnvelopeType::StreamChunk));
        assert!(matches!(sent[3].kind, EnvelopeType::StreamEnd));
    }

    #[tokio::test]
    async fn cancelled_stream_emits_error_not_stream_end() {
        let sink = RecordingSink::default();
        let guard = StreamGuard::start(&sink, "req-2").await;
        guard.error("cancelled").await;

        let sent = sink.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert!(matches!(sent[1].kind, EnvelopeType::Error));
    }
}
