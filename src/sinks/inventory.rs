use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::models::*;
use crate::reference::ReferenceCache;
use crate::sinks::{upsert_json, Sink, UpsertCall};

/// Minimal stock update. The target ids travel with the payload but are not sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryPayload {
    #[serde(skip)]
    pub product_id: i64,
    #[serde(skip)]
    pub parent_id: Option<i64>,
    pub stock_quantity: i64,
    pub manage_stock: bool,
    pub stock_status: String,
}

impl InventoryPayload {
    pub fn new(product_id: i64, parent_id: Option<i64>, stock_quantity: i64) -> Self {
        let stock_status = if stock_quantity > 0 { "instock" } else { "outofstock" };
        Self {
            product_id,
            parent_id,
            stock_quantity,
            manage_stock: true,
            stock_status: stock_status.to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        match self.parent_id {
            Some(parent) => format!("products/{}/variations/{}", parent, self.product_id),
            None => format!("products/{}", self.product_id),
        }
    }
}

pub fn apply_operation(operation: InventoryOperation, current: i64, quantity: i64) -> i64 {
    match operation {
        InventoryOperation::Add => current.saturating_add(quantity),
        InventoryOperation::Subtract => current.saturating_sub(quantity),
        InventoryOperation::Set => quantity,
    }
}

pub struct UpdateInventorySink {
    cache: Arc<ReferenceCache>,
}

impl UpdateInventorySink {
    pub fn new(cache: Arc<ReferenceCache>) -> Self {
        Self { cache }
    }
}

/// `product_name` is accepted as an alias of `name` and wins when both are present.
fn normalize(raw: &Value) -> Value {
    let mut record = raw.clone();
    if let Some(obj) = record.as_object_mut() {
        if let Some(name) = obj.remove("product_name") {
            obj.insert("name".to_string(), name);
        }
    }
    record
}

#[async_trait]
impl Sink for UpdateInventorySink {
    type Payload = InventoryPayload;

    fn stream(&self) -> StreamKind {
        StreamKind::UpdateInventory
    }

    async fn preprocess_record(&self, raw: &Value) -> Result<Prepared<InventoryPayload>> {
        let record: UpdateInventory = parse_record(StreamKind::UpdateInventory, &normalize(raw))?;
        let quantity = record
            .quantity
            .value()
            .ok_or_else(|| TargetError::Validation(format!("quantity {:?} is not an integer", record.quantity)))?;
        let operation = record.operation.unwrap_or_default();

        if let Some(id) = record.id.as_ref().and_then(IntLike::value) {
            tracing::info!(product_id = id, operation = ?operation, "Using provided id for inventory update");
            let parent = record.parent_id.as_ref().and_then(IntLike::value).filter(|p| *p > 0);
            if operation == InventoryOperation::Set {
                return Ok(Prepared::Payload(InventoryPayload::new(id, parent, quantity)));
            }
            let current = self
                .cache
                .fetch_product(id)
                .await
                .ok_or_else(|| TargetError::Resolution(format!("product {} not found", id)))?;
            let stock = apply_operation(operation, current.stock_quantity.unwrap_or(0), quantity);
            return Ok(Prepared::Payload(InventoryPayload::new(id, parent.or(current.parent()), stock)));
        }

        let Some(entry) = self.cache.resolve_product(record.sku.as_deref(), record.name.as_deref()).await else {
            return Ok(Prepared::skip(format!(
                "could not find product with id, sku {:?} or name {:?}",
                record.sku, record.name
            )));
        };
        let current = entry.stock_quantity.unwrap_or(0);
        let stock = apply_operation(operation, current, quantity);
        tracing::info!(
            product_id = entry.id,
            sku = ?entry.sku,
            current_stock = current,
            new_stock = stock,
            operation = ?operation,
            "Resolved product for inventory update"
        );
        Ok(Prepared::Payload(InventoryPayload::new(entry.id, entry.parent(), stock)))
    }

    async fn upsert_record(&self, payload: InventoryPayload) -> UpsertOutcome {
        let call = UpsertCall::Update(payload.endpoint());
        upsert_json(self.cache.client(), StreamKind::UpdateInventory, &call, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operations_adjust_current_stock() {
        assert_eq!(apply_operation(InventoryOperation::Add, 3, 4), 7);
        assert_eq!(apply_operation(InventoryOperation::Subtract, 3, 4), -1);
        assert_eq!(apply_operation(InventoryOperation::Set, 3, 4), 4);
    }

    #[test]
    fn stock_status_follows_quantity() {
        assert_eq!(InventoryPayload::new(1, None, 2).stock_status, "instock");
        assert_eq!(InventoryPayload::new(1, None, 0).stock_status, "outofstock");
        assert_eq!(InventoryPayload::new(1, None, -3).stock_status, "outofstock");
    }

    #[test]
    fn variants_update_under_their_parent() {
        assert_eq!(InventoryPayload::new(77, Some(70), 1).endpoint(), "products/70/variations/77");
        assert_eq!(InventoryPayload::new(501, None, 1).endpoint(), "products/501");
    }

    #[test]
    fn payload_body_has_no_ids() {
        let body = serde_json::to_value(InventoryPayload::new(501, None, 10)).unwrap();
        assert_eq!(body, json!({"stock_quantity": 10, "manage_stock": true, "stock_status": "instock"}));
    }

    #[test]
    fn product_name_replaces_name() {
        let v = normalize(&json!({"name": "Old", "product_name": "New", "quantity": 1}));
        assert_eq!(v, json!({"name": "New", "quantity": 1}));
    }
}
