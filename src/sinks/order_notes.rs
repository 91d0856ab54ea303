use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::mapping::format_datetime;
use crate::models::*;
use crate::reference::ReferenceCache;
use crate::sinks::{upsert_json, Sink, UpsertCall};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderNotePayload {
    #[serde(skip)]
    pub order_id: i64,
    pub author: Option<String>,
    pub note: String,
    pub date_created: Option<String>,
    pub customer_note: Option<bool>,
}

pub struct OrderNotesSink {
    cache: Arc<ReferenceCache>,
}

impl OrderNotesSink {
    pub fn new(cache: Arc<ReferenceCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Sink for OrderNotesSink {
    type Payload = OrderNotePayload;

    fn stream(&self) -> StreamKind {
        StreamKind::OrderNotes
    }

    async fn preprocess_record(&self, raw: &Value) -> Result<Prepared<OrderNotePayload>> {
        let record: OrderNote = parse_record(StreamKind::OrderNotes, raw)?;
        let note = record
            .note
            .clone()
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| TargetError::Validation("order note has no text".to_string()))?;

        // Notes cannot be updated, so the order id is the only id that matters.
        let order_id = match record.order_id.as_ref().and_then(IntLike::value) {
            Some(id) => Some(id),
            None => match record.order_number.as_ref().and_then(IntLike::value) {
                Some(number) => self.cache.find_order_by_number(number).await,
                None => None,
            },
        };
        let Some(order_id) = order_id else {
            return Ok(Prepared::skip(format!(
                "parent order not found for order_id {:?} / order_number {:?}",
                record.order_id, record.order_number
            )));
        };

        Ok(Prepared::Payload(OrderNotePayload {
            order_id,
            author: record.author_name,
            note,
            date_created: record.created_at.as_deref().map(format_datetime),
            customer_note: record.customer_note,
        }))
    }

    async fn upsert_record(&self, payload: OrderNotePayload) -> UpsertOutcome {
        let call = UpsertCall::Create(format!("orders/{}/notes", payload.order_id));
        upsert_json(self.cache.client(), StreamKind::OrderNotes, &call, &payload).await
    }
}
