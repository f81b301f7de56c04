//! Publish channel: node update/creation notifications and response envelopes.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;
use venuebot_shared::{MessageKind, Response, Result, ResultCollection, StoragePayload, VenueBotError};

/// Outbound side of the messaging transport.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Announce that an existing node changed.
    async fn publish_update(&self, payload: &StoragePayload) -> Result<()>;

    /// Announce that a node was created.
    async fn publish_create(&self, payload: &StoragePayload) -> Result<()>;

    /// Wrap a result collection in a response envelope.
    fn create_response(
        &self,
        kind: MessageKind,
        payload: ResultCollection,
        request_id: Option<String>,
    ) -> Response {
        Response {
            kind,
            request_id,
            payload,
        }
    }
}

#[derive(Serialize)]
struct Event<'a> {
    kind: MessageKind,
    payload: &'a StoragePayload,
}

/// Writes every message as one JSON document per line.
pub struct JsonLinesPublisher<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesPublisher<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Write one message line.
    pub fn send<T: Serialize>(&self, message: &T) -> Result<()> {
        let line = serde_json::to_string(message)
            .map_err(|e| VenueBotError::validation(format!("unserializable message: {e}")))?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| VenueBotError::validation("publish channel lock poisoned"))?;
        writeln!(out, "{line}")
            .and_then(|()| out.flush())
            .map_err(|e| VenueBotError::io("<publish channel>", e))
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl<W: Write + Send> Publisher for JsonLinesPublisher<W> {
    async fn publish_update(&self, payload: &StoragePayload) -> Result<()> {
        debug!(about = ?payload.about, "publishing update");
        self.send(&Event {
            kind: MessageKind::Update,
            payload,
        })
    }

    async fn publish_create(&self, payload: &StoragePayload) -> Result<()> {
        debug!(about = ?payload.about, "publishing create");
        self.send(&Event {
            kind: MessageKind::Create,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_are_tagged_json_lines() {
        let publisher = JsonLinesPublisher::new(Vec::new());
        publisher
            .publish_update(&StoragePayload::about("urn:a"))
            .await
            .unwrap();
        publisher
            .publish_create(&StoragePayload::about("urn:b"))
            .await
            .unwrap();

        let out = String::from_utf8(publisher.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "update");
        assert_eq!(lines[0]["payload"]["about"], "urn:a");
        assert_eq!(lines[1]["kind"], "create");
    }

    #[test]
    fn response_carries_kind_and_request_id() {
        let publisher = JsonLinesPublisher::new(Vec::new());
        let response = publisher.create_response(
            MessageKind::SearchResponse,
            ResultCollection::default(),
            Some("r7".into()),
        );
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""kind":"search_response""#));
        assert!(json.contains(r#""request_id":"r7""#));
    }
}
