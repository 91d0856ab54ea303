use serde::Serialize;
use serde_json::Value;

/// Result of preprocessing one record: a payload ready for the API, or a reason to skip it.
#[derive(Debug, Clone, PartialEq)]
pub enum Prepared<P> {
    Payload(P),
    Skip { reason: String },
}

impl<P> Prepared<P> {
    pub fn skip(reason: impl Into<String>) -> Self {
        Prepared::Skip { reason: reason.into() }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Prepared::Skip { .. })
    }
}

/// What a sink receives: either a raw inbound record or a payload that was already preprocessed
/// (for example one re-queued after a failed upsert). Preprocessed input is never transformed twice.
#[derive(Debug, Clone)]
pub enum SinkInput<'a, P> {
    Raw(&'a Value),
    Preprocessed(P),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutcomeDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_variations: Vec<String>,
}

/// Normalized result of one create-or-update call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsertOutcome {
    pub remote_id: Option<i64>,
    pub success: bool,
    pub detail: OutcomeDetail,
}

impl UpsertOutcome {
    pub fn created(remote_id: Option<i64>) -> Self {
        Self { remote_id, success: true, detail: OutcomeDetail::default() }
    }

    pub fn updated(remote_id: Option<i64>) -> Self {
        Self {
            remote_id,
            success: true,
            detail: OutcomeDetail { updated: Some(true), ..Default::default() },
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            remote_id: None,
            success: false,
            detail: OutcomeDetail { error: Some(message.into()), ..Default::default() },
        }
    }

    pub fn is_update(&self) -> bool {
        self.detail.updated.unwrap_or(false)
    }
}

/// Terminal event for one inbound record. Every record produces exactly one.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordEvent {
    Upserted(UpsertOutcome),
    Skipped { reason: String },
}

impl RecordEvent {
    pub fn is_success(&self) -> bool {
        matches!(self, RecordEvent::Upserted(o) if o.success)
    }
}
