//! Inbound record shapes, one per stream kind.
//!
//! Deserializing a raw record into one of these types is the validation step; a shape mismatch
//! becomes a per-record skip rather than a run failure.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::models::{Result, TargetError};

/// The stream kinds this target knows how to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StreamKind {
    SalesOrders,
    UpdateInventory,
    Products,
    OrderNotes,
}

impl StreamKind {
    pub const ALL: [StreamKind; 4] = [
        StreamKind::SalesOrders,
        StreamKind::UpdateInventory,
        StreamKind::Products,
        StreamKind::OrderNotes,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::SalesOrders => "SalesOrders",
            StreamKind::UpdateInventory => "UpdateInventory",
            StreamKind::Products => "Products",
            StreamKind::OrderNotes => "OrderNotes",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            StreamKind::OrderNotes => &["OrderNote"],
            _ => &[],
        }
    }

    /// Case-insensitive match on the canonical name, exact match on aliases.
    pub fn from_stream_name(stream: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| {
            kind.name().eq_ignore_ascii_case(stream) || kind.aliases().contains(&stream)
        })
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Integer fields that upstream taps emit either as numbers or as strings such as `"#1042"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntLike {
    Int(i64),
    Float(f64),
    Str(String),
}

impl IntLike {
    pub fn value(&self) -> Option<i64> {
        match self {
            IntLike::Int(i) => Some(*i),
            IntLike::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            IntLike::Float(_) => None,
            IntLike::Str(s) => {
                let cleaned = s.trim().trim_start_matches('#');
                cleaned
                    .parse::<i64>()
                    .ok()
                    .or_else(|| cleaned.parse::<f64>().ok().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            }
        }
    }
}

/// Parse a raw record into its stream shape, mapping shape errors to `Validation`.
pub fn parse_record<T: for<'de> Deserialize<'de>>(stream: StreamKind, raw: &Value) -> Result<T> {
    serde_json::from_value(raw.clone())
        .map_err(|e| TargetError::Validation(format!("{} record does not match schema: {}", stream, e)))
}

/// Taps emit `null` for unset list fields; treat it like a missing key.
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<Scalar> for String {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Str(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

/// Text fields such as postal codes and SKUs sometimes arrive as numbers.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Scalar::deserialize(deserializer).map(String::from)
}

fn lenient_opt_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(String::from))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Address {
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub line1: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub line2: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub postal_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub country: Option<String>,
    pub customer_email: Option<String>,
    pub total_shipping: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderLineItem {
    pub product_id: Option<IntLike>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub sku: Option<String>,
    pub quantity: Option<IntLike>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SalesOrder {
    pub id: Option<IntLike>,
    pub order_number: Option<IntLike>,
    pub customer_id: Option<IntLike>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub status: Option<String>,
    pub fulfilled: Option<bool>,
    pub paid: Option<bool>,
    pub billing_address: Option<Address>,
    pub shipping_address: Option<Address>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub line_items: Vec<OrderLineItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryOperation {
    #[default]
    Add,
    Subtract,
    Set,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateInventory {
    pub id: Option<IntLike>,
    pub sku: Option<String>,
    pub name: Option<String>,
    pub operation: Option<InventoryOperation>,
    pub parent_id: Option<IntLike>,
    pub quantity: IntLike,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryRef {
    pub id: Option<IntLike>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariantOption {
    pub name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductVariant {
    pub id: Option<IntLike>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub sku: Option<String>,
    pub price: Option<Value>,
    pub sale_price: Option<Value>,
    pub available_quantity: Option<IntLike>,
    pub weight: Option<Value>,
    pub description: Option<String>,
    pub width: Option<Value>,
    pub length: Option<Value>,
    pub depth: Option<Value>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub options: Vec<VariantOption>,
}

/// Product record. Variants stay raw so each one is validated on its own.
#[derive(Debug, Clone, Deserialize)]
pub struct Product {
    pub id: Option<IntLike>,
    pub name: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub sku: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    #[serde(rename = "type")]
    pub product_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub image_urls: Vec<String>,
    pub category: Option<CategoryRef>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub categories: Vec<CategoryRef>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub options: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub variants: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderNote {
    pub order_id: Option<IntLike>,
    pub order_number: Option<IntLike>,
    pub author_name: Option<String>,
    pub note: Option<String>,
    pub created_at: Option<String>,
    pub customer_note: Option<bool>,
}
