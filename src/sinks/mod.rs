//! One sink per stream kind. A sink turns a raw record into an API payload (or a skip) and then
//! writes it, and every record ends in exactly one [`RecordEvent`].

pub mod inventory;
pub mod order_notes;
pub mod orders;
pub mod products;

pub use inventory::*;
pub use order_notes::*;
pub use orders::*;
pub use products::*;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::clients::{ApiResponse, WooCommerceClient};
use crate::mapping::clean_payload;
use crate::models::*;

#[async_trait]
pub trait Sink: Send + Sync {
    /// Body sent to the API. Distinct from the inbound record type, so a payload can never be
    /// mistaken for a raw record and preprocessed a second time.
    type Payload: Serialize + std::fmt::Debug + Send + Sync;

    fn stream(&self) -> StreamKind;

    /// Validate and resolve one raw record. `Validation` and `Resolution` errors become skips.
    async fn preprocess_record(&self, raw: &Value) -> Result<Prepared<Self::Payload>>;

    /// Create or update one payload. Never fails; errors are folded into the outcome.
    async fn upsert_record(&self, payload: Self::Payload) -> UpsertOutcome;

    async fn preprocess(&self, input: SinkInput<'_, Self::Payload>) -> Result<Prepared<Self::Payload>> {
        match input {
            SinkInput::Raw(raw) => self.preprocess_record(raw).await,
            SinkInput::Preprocessed(payload) => Ok(Prepared::Payload(payload)),
        }
    }

    async fn process_record(&self, input: SinkInput<'_, Self::Payload>) -> RecordEvent {
        let stream = self.stream();
        let prepared = match self.preprocess(input).await {
            Ok(p) => p,
            Err(e @ (TargetError::Validation(_) | TargetError::Resolution(_))) => Prepared::skip(e.to_string()),
            Err(e) => {
                tracing::error!(stream = %stream, error = %e, "Failed to preprocess record");
                return RecordEvent::Upserted(UpsertOutcome::failed(e.to_string()));
            }
        };
        match prepared {
            Prepared::Payload(payload) => RecordEvent::Upserted(self.upsert_record(payload).await),
            Prepared::Skip { reason } => {
                tracing::warn!(stream = %stream, reason = %reason, "Skipping record");
                RecordEvent::Skipped { reason }
            }
        }
    }
}

/// Create-or-update decision for one write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertCall {
    Create(String),
    Update(String),
}

impl UpsertCall {
    /// `PUT <collection>/<id>` when the id is known, else `POST <collection>`.
    pub fn for_id(collection: &str, id: Option<i64>) -> Self {
        match id {
            Some(id) => UpsertCall::Update(format!("{}/{}", collection, id)),
            None => UpsertCall::Create(collection.to_string()),
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            UpsertCall::Create(e) | UpsertCall::Update(e) => e,
        }
    }

    pub fn is_update(&self) -> bool {
        matches!(self, UpsertCall::Update(_))
    }
}

/// Serialize a payload and strip empty values.
pub fn to_body<P: Serialize>(payload: &P) -> Result<Value> {
    Ok(clean_payload(serde_json::to_value(payload)?))
}

/// Issue the write. A 2xx response without an `id` counts as an unexpected shape.
pub async fn send(client: &WooCommerceClient, call: &UpsertCall, body: &Value) -> Result<ApiResponse> {
    let resp = match call {
        UpsertCall::Create(endpoint) => client.post(endpoint, body).await?,
        UpsertCall::Update(endpoint) => client.put(endpoint, body).await?,
    };
    if resp.id().is_none() {
        return Err(TargetError::Protocol(format!("response from {} has no id", call.endpoint())));
    }
    Ok(resp)
}

/// Normalize a write result, logging failures with the full payload.
pub fn to_outcome(stream: StreamKind, call: &UpsertCall, body: &Value, result: Result<ApiResponse>) -> UpsertOutcome {
    match result {
        Ok(resp) => {
            let id = resp.id();
            if call.is_update() {
                tracing::info!(stream = %stream, remote_id = ?id, "Record updated");
                UpsertOutcome::updated(id)
            } else {
                tracing::info!(stream = %stream, remote_id = ?id, "Record created");
                UpsertOutcome::created(id)
            }
        }
        Err(e) => {
            tracing::error!(stream = %stream, endpoint = call.endpoint(), error = %e, payload = %body, "Failed to upsert record");
            UpsertOutcome::failed(e.to_string())
        }
    }
}

/// Serialize, send and normalize in one step.
pub async fn upsert_json<P: Serialize + std::fmt::Debug>(
    client: &WooCommerceClient,
    stream: StreamKind,
    call: &UpsertCall,
    payload: &P,
) -> UpsertOutcome {
    let body = match to_body(payload) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(stream = %stream, error = %e, payload = ?payload, "Failed to serialize payload");
            return UpsertOutcome::failed(e.to_string());
        }
    };
    let result = send(client, call, &body).await;
    to_outcome(stream, call, &body, result)
}
