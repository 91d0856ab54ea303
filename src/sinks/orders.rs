use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::config::LineItemPolicy;
use crate::mapping::{split_customer_name, to_api_string};
use crate::models::*;
use crate::reference::ReferenceCache;
use crate::sinks::{upsert_json, Sink, UpsertCall};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressPayload {
    pub first_name: String,
    pub last_name: String,
    pub address_1: Option<String>,
    pub address_2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItemPayload {
    pub product_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation_id: Option<i64>,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShippingLine {
    pub total: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderPayload {
    #[serde(skip)]
    pub order_id: Option<i64>,
    pub status: Option<String>,
    pub set_paid: bool,
    pub customer_id: Option<i64>,
    pub billing: Option<AddressPayload>,
    pub shipping: Option<AddressPayload>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shipping_lines: Vec<ShippingLine>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub line_items: Vec<LineItemPayload>,
}

pub struct SalesOrdersSink {
    cache: Arc<ReferenceCache>,
    policy: LineItemPolicy,
}

impl SalesOrdersSink {
    pub fn new(cache: Arc<ReferenceCache>, policy: LineItemPolicy) -> Self {
        Self { cache, policy }
    }

    /// `product_id` is trusted as is; a SKU goes through the catalogs and a variant match becomes
    /// `product_id = parent`, `variation_id = variant`. A missing quantity means 1, an unparseable
    /// one leaves the line unresolved.
    async fn resolve_line(&self, line: &OrderLineItem) -> Option<LineItemPayload> {
        let quantity = match &line.quantity {
            None => 1,
            Some(raw) => match raw.value() {
                Some(q) => q,
                None => {
                    tracing::warn!(sku = ?line.sku, quantity = ?raw, "Line item quantity is not an integer");
                    return None;
                }
            },
        };
        if let Some(product_id) = line.product_id.as_ref().and_then(IntLike::value) {
            return Some(LineItemPayload { product_id, variation_id: None, quantity });
        }
        let sku = line.sku.as_deref().filter(|s| !s.trim().is_empty())?;
        let entry = self.cache.resolve_product(Some(sku), None).await?;
        Some(match entry.parent() {
            Some(parent) => LineItemPayload { product_id: parent, variation_id: Some(entry.id), quantity },
            None => LineItemPayload { product_id: entry.id, variation_id: None, quantity },
        })
    }

    async fn resolve_lines(&self, lines: &[OrderLineItem]) -> Result<Vec<LineItemPayload>> {
        let mut resolved = Vec::with_capacity(lines.len());
        let mut dropped = 0usize;
        for line in lines {
            match self.resolve_line(line).await {
                Some(item) => resolved.push(item),
                None => {
                    tracing::warn!(sku = ?line.sku, "Line item could not be resolved; dropping it");
                    dropped += 1;
                    if self.policy == LineItemPolicy::RequireAll {
                        return Err(TargetError::Resolution(format!(
                            "line item {} could not be resolved",
                            line.sku.as_deref().unwrap_or("<no sku>")
                        )));
                    }
                }
            }
        }
        if let LineItemPolicy::DropUnresolved { min_resolved } = self.policy {
            if resolved.len() < min_resolved {
                return Err(TargetError::Resolution(format!(
                    "{} of {} line items resolved, at least {} required",
                    resolved.len(),
                    lines.len(),
                    min_resolved
                )));
            }
        }
        if dropped > 0 {
            tracing::warn!(dropped = dropped, kept = resolved.len(), "Order proceeds with a subset of its line items");
        }
        Ok(resolved)
    }
}

fn address(addr: &Address, first_name: &str, last_name: &str, with_email: bool) -> AddressPayload {
    AddressPayload {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        address_1: addr.line1.clone(),
        address_2: addr.line2.clone(),
        city: addr.city.clone(),
        state: addr.state.clone(),
        postcode: addr.postal_code.clone(),
        country: addr.country.clone(),
        email: if with_email { addr.customer_email.clone() } else { None },
    }
}

/// An explicit status wins; otherwise a fulfilled order is completed. Completed orders are paid.
fn status_and_paid(order: &SalesOrder) -> (Option<String>, bool) {
    let status = order
        .status
        .clone()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| (order.fulfilled == Some(true)).then(|| "completed".to_string()));
    let paid = status.as_deref() == Some("completed") || order.paid.unwrap_or(false);
    (status, paid)
}

#[async_trait]
impl Sink for SalesOrdersSink {
    type Payload = OrderPayload;

    fn stream(&self) -> StreamKind {
        StreamKind::SalesOrders
    }

    async fn preprocess_record(&self, raw: &Value) -> Result<Prepared<OrderPayload>> {
        let order: SalesOrder = parse_record(StreamKind::SalesOrders, raw)?;
        let (first_name, last_name) = split_customer_name(order.customer_name.as_deref());
        let order_id = order
            .id
            .as_ref()
            .and_then(IntLike::value)
            .or_else(|| order.order_number.as_ref().and_then(IntLike::value));
        let (status, set_paid) = status_and_paid(&order);

        let shipping_lines = order
            .shipping_address
            .as_ref()
            .and_then(|a| to_api_string(a.total_shipping.as_ref()))
            .filter(|t| t != "0")
            .map(|total| vec![ShippingLine { total }])
            .unwrap_or_default();

        let customer_id = match order.customer_id.as_ref().and_then(IntLike::value) {
            Some(id) => Some(id),
            None => match order.customer_email.as_deref().filter(|e| !e.trim().is_empty()) {
                Some(email) => self.cache.find_customer_by_email(email).await,
                None => None,
            },
        };

        let line_items = if order.line_items.is_empty() {
            Vec::new()
        } else {
            self.resolve_lines(&order.line_items).await?
        };

        Ok(Prepared::Payload(OrderPayload {
            order_id,
            status,
            set_paid,
            customer_id,
            billing: order.billing_address.as_ref().map(|a| address(a, &first_name, &last_name, true)),
            shipping: order.shipping_address.as_ref().map(|a| address(a, &first_name, &last_name, false)),
            shipping_lines,
            line_items,
        }))
    }

    async fn upsert_record(&self, payload: OrderPayload) -> UpsertOutcome {
        let call = UpsertCall::for_id("orders", payload.order_id);
        upsert_json(self.cache.client(), StreamKind::SalesOrders, &call, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order(v: Value) -> SalesOrder {
        parse_record(StreamKind::SalesOrders, &v).unwrap()
    }

    #[test]
    fn explicit_status_beats_fulfilled_flag() {
        let (status, paid) = status_and_paid(&order(json!({"status": "processing", "fulfilled": true})));
        assert_eq!(status.as_deref(), Some("processing"));
        assert!(!paid);
    }

    #[test]
    fn fulfilled_orders_are_completed_and_paid() {
        let (status, paid) = status_and_paid(&order(json!({"fulfilled": true})));
        assert_eq!(status.as_deref(), Some("completed"));
        assert!(paid);
    }

    #[test]
    fn paid_flag_is_kept_for_open_orders() {
        let (status, paid) = status_and_paid(&order(json!({"paid": true})));
        assert_eq!(status, None);
        assert!(paid);
    }

    #[test]
    fn billing_carries_email_and_shipping_does_not() {
        let addr = Address { line1: Some("1 Main St".into()), customer_email: Some("a@b.test".into()), ..Default::default() };
        assert_eq!(address(&addr, "Ada", "Lovelace", true).email.as_deref(), Some("a@b.test"));
        assert_eq!(address(&addr, "Ada", "Lovelace", false).email, None);
    }
}
