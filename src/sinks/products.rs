use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::mapping::to_api_string;
use crate::models::*;
use crate::reference::{ReferenceCache, ReferenceKind};
use crate::sinks::{send, to_body, to_outcome, Sink, UpsertCall};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dimensions {
    pub width: Option<String>,
    pub length: Option<String>,
    pub height: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRef {
    pub src: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryId {
    pub id: i64,
}

/// Product-level attribute. Known attributes are sent by id, unknown ones by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub position: u32,
    pub visible: bool,
    pub variation: bool,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefaultAttribute {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub option: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariationAttribute {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub option: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariationPayload {
    #[serde(skip)]
    pub id: Option<i64>,
    pub sku: Option<String>,
    pub regular_price: Option<String>,
    pub sale_price: Option<String>,
    pub manage_stock: bool,
    pub stock_quantity: Option<i64>,
    pub weight: Option<String>,
    pub description: Option<String>,
    pub dimensions: Dimensions,
    pub attributes: Vec<VariationAttribute>,
}

impl VariationPayload {
    fn from_variant(v: &ProductVariant) -> Self {
        Self {
            id: v.id.as_ref().and_then(IntLike::value),
            sku: v.sku.clone(),
            regular_price: to_api_string(v.price.as_ref()),
            sale_price: to_api_string(v.sale_price.as_ref()),
            manage_stock: true,
            stock_quantity: v.available_quantity.as_ref().and_then(IntLike::value),
            weight: to_api_string(v.weight.as_ref()),
            description: v.description.clone(),
            dimensions: dimensions(v),
            attributes: v
                .options
                .iter()
                .map(|o| VariationAttribute { id: None, name: o.name.clone(), option: o.value.clone() })
                .collect(),
        }
    }

    fn label(&self, index: usize) -> String {
        self.sku.clone().unwrap_or_else(|| format!("variation #{}", index + 1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductPayload {
    #[serde(skip)]
    pub id: Option<i64>,
    pub name: String,
    pub sku: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    #[serde(rename = "type")]
    pub product_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<CategoryId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributePayload>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub default_attributes: Vec<DefaultAttribute>,
    pub regular_price: Option<String>,
    pub manage_stock: Option<bool>,
    pub stock_quantity: Option<i64>,
    pub weight: Option<String>,
    pub dimensions: Option<Dimensions>,
    /// Written after the parent, one call each.
    #[serde(skip)]
    pub variations: Vec<VariationPayload>,
    /// Variants that failed validation; reported with the parent's outcome.
    #[serde(skip)]
    pub rejected_variations: Vec<String>,
}

impl ProductPayload {
    pub fn is_variable(&self) -> bool {
        self.product_type == "variable"
    }
}

fn dimensions(v: &ProductVariant) -> Dimensions {
    Dimensions {
        width: to_api_string(v.width.as_ref()),
        length: to_api_string(v.length.as_ref()),
        height: to_api_string(v.depth.as_ref()),
    }
}

/// Values of each product option across all variants, in first-seen order.
fn option_values<'a>(options: &'a [String], variants: &'a [ProductVariant]) -> Vec<(&'a str, Vec<String>)> {
    options
        .iter()
        .filter_map(|option| {
            let mut values: Vec<String> = Vec::new();
            for o in variants.iter().flat_map(|v| v.options.iter()).filter(|o| &o.name == option) {
                if !values.contains(&o.value) {
                    values.push(o.value.clone());
                }
            }
            (!values.is_empty()).then_some((option.as_str(), values))
        })
        .collect()
}

pub struct ProductsSink {
    cache: Arc<ReferenceCache>,
}

impl ProductsSink {
    pub fn new(cache: Arc<ReferenceCache>) -> Self {
        Self { cache }
    }

    async fn category_ids(&self, product: &Product) -> Vec<CategoryId> {
        let refs: Vec<&CategoryRef> = match &product.category {
            Some(c) => vec![c],
            None => product.categories.iter().collect(),
        };
        let mut ids = Vec::with_capacity(refs.len());
        for c in refs {
            if let Some(id) = c.id.as_ref().and_then(IntLike::value) {
                ids.push(CategoryId { id });
                continue;
            }
            let Some(name) = c.name.as_deref() else { continue };
            match self.cache.id_by_name(ReferenceKind::Categories, name).await {
                Some(id) => ids.push(CategoryId { id }),
                None => tracing::warn!(category = name, product = %product.name, "Category not found; leaving it off"),
            }
        }
        ids
    }

    async fn attributes(&self, options: &[String], variants: &[ProductVariant]) -> (Vec<AttributePayload>, Vec<DefaultAttribute>) {
        let mut attributes = Vec::new();
        let mut defaults = Vec::new();
        for (option, values) in option_values(options, variants) {
            let id = self.cache.id_by_name(ReferenceKind::Attributes, option).await;
            let name = if id.is_some() { None } else { Some(option.to_string()) };
            defaults.push(DefaultAttribute { id, name: name.clone(), option: values[0].clone() });
            attributes.push(AttributePayload { id, name, position: 0, visible: false, variation: true, options: values });
        }
        (attributes, defaults)
    }

    /// Write each variation under the parent. Returns the labels of the ones that failed.
    async fn process_variations(&self, parent: &Value, variations: &[VariationPayload]) -> Vec<String> {
        let mut failed = Vec::new();
        let Some(parent_id) = parent.get("id").and_then(|v| v.as_i64()) else {
            return variations.iter().enumerate().map(|(i, v)| v.label(i)).collect();
        };
        let collection = format!("products/{}/variations", parent_id);
        for (i, variation) in variations.iter().enumerate() {
            let mut variation = variation.clone();
            let call = match variation.id {
                Some(id) => UpsertCall::Update(format!("{}/{}", collection, id)),
                None => {
                    if let Err(e) = attach_attribute_ids(parent, &mut variation) {
                        tracing::error!(product_id = parent_id, variation = %variation.label(i), error = %e, "Failed to process variation");
                        failed.push(variation.label(i));
                        continue;
                    }
                    UpsertCall::Create(collection.clone())
                }
            };
            let result = match to_body(&variation) {
                Ok(body) => send(self.cache.client(), &call, &body).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(resp) => tracing::info!(product_id = parent_id, variation_id = ?resp.id(), updated = call.is_update(), "Variation written"),
                Err(e) => {
                    tracing::error!(product_id = parent_id, variation = %variation.label(i), error = %e, payload = ?variation, "Failed to process variation");
                    failed.push(variation.label(i));
                }
            }
        }
        failed
    }
}

/// New variations reference the parent's attributes by id.
fn attach_attribute_ids(parent: &Value, variation: &mut VariationPayload) -> Result<()> {
    let parent_attrs = parent.get("attributes").and_then(|a| a.as_array()).map(Vec::as_slice).unwrap_or_default();
    for attr in variation.attributes.iter_mut() {
        let id = parent_attrs
            .iter()
            .find(|a| a.get("name").and_then(|n| n.as_str()) == Some(attr.name.as_str()))
            .and_then(|a| a.get("id"))
            .and_then(|v| v.as_i64())
            .ok_or_else(|| TargetError::Resolution(format!("attribute '{}' is not defined on the parent product", attr.name)))?;
        attr.id = Some(id);
    }
    Ok(())
}

#[async_trait]
impl Sink for ProductsSink {
    type Payload = ProductPayload;

    fn stream(&self) -> StreamKind {
        StreamKind::Products
    }

    async fn preprocess_record(&self, raw: &Value) -> Result<Prepared<ProductPayload>> {
        let product: Product = parse_record(StreamKind::Products, raw)?;

        let mut variants: Vec<ProductVariant> = Vec::with_capacity(product.variants.len());
        let mut rejected: Vec<String> = Vec::new();
        for (i, v) in product.variants.iter().enumerate() {
            match serde_json::from_value::<ProductVariant>(v.clone()) {
                Ok(variant) => variants.push(variant),
                Err(e) => {
                    tracing::warn!(product = %product.name, variant_index = i, error = %e, "Variant does not match schema; skipping it");
                    rejected.push(format!("variation #{}", i + 1));
                }
            }
        }

        let mut product_id = product.id.as_ref().and_then(IntLike::value);
        let mut detected_type: Option<&str> = None;
        let mut first_existing: Option<i64> = None;
        for variant in variants.iter_mut() {
            let id = variant.id.as_ref().and_then(IntLike::value);
            let Some(existing) = self.cache.find_existing_product(id, variant.sku.as_deref()).await else { continue };
            variant.id = Some(IntLike::Int(existing.id));
            first_existing.get_or_insert(existing.id);
            match existing.parent() {
                Some(parent) => {
                    product_id = Some(parent);
                    detected_type = Some("variable");
                }
                None => detected_type = detected_type.or(Some("simple")),
            }
        }

        let product_type = product
            .product_type
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| detected_type.map(str::to_string))
            .unwrap_or_else(|| if product.options.is_empty() { "simple" } else { "variable" }.to_string());

        let mut payload = ProductPayload {
            id: product_id,
            name: product.name.clone(),
            sku: product.sku.clone(),
            description: product.description.clone(),
            short_description: product.short_description.clone(),
            product_type,
            images: product.image_urls.iter().map(|src| ImageRef { src: src.clone() }).collect(),
            categories: self.category_ids(&product).await,
            attributes: Vec::new(),
            default_attributes: Vec::new(),
            regular_price: None,
            manage_stock: None,
            stock_quantity: None,
            weight: None,
            dimensions: None,
            variations: Vec::new(),
            rejected_variations: rejected,
        };

        if payload.is_variable() {
            payload.variations = variants.iter().map(VariationPayload::from_variant).collect();
            if variants.iter().any(|v| !v.options.is_empty()) {
                let (attributes, defaults) = self.attributes(&product.options, &variants).await;
                payload.attributes = attributes;
                payload.default_attributes = defaults;
            }
        } else if let Some(first) = variants.first() {
            payload.sku = first.sku.clone().or(payload.sku);
            payload.regular_price = to_api_string(first.price.as_ref());
            payload.manage_stock = Some(true);
            payload.stock_quantity = first.available_quantity.as_ref().and_then(IntLike::value);
            payload.weight = to_api_string(first.weight.as_ref());
            payload.dimensions = Some(dimensions(first));
            if let Some(existing) = first_existing {
                payload.id = Some(existing);
            }
        }

        Ok(Prepared::Payload(payload))
    }

    async fn upsert_record(&self, payload: ProductPayload) -> UpsertOutcome {
        let call = UpsertCall::for_id("products", payload.id);
        let body = match to_body(&payload) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(stream = %StreamKind::Products, error = %e, payload = ?payload, "Failed to serialize payload");
                return UpsertOutcome::failed(e.to_string());
            }
        };

        let result = send(self.cache.client(), &call, &body).await;
        let parent_body = result.as_ref().ok().map(|r| r.body.clone());
        let mut outcome = to_outcome(StreamKind::Products, &call, &body, result);

        let mut failed = payload.rejected_variations.clone();
        if let Some(parent) = parent_body.filter(|_| payload.is_variable() && !payload.variations.is_empty()) {
            failed.extend(self.process_variations(&parent, &payload.variations).await);
        }
        if outcome.success && !failed.is_empty() {
            tracing::warn!(product_id = ?outcome.remote_id, failed_variations = ?failed, "Product written with failed variations");
            outcome.detail.failed_variations = failed;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn variant(v: Value) -> ProductVariant {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn option_values_are_collected_in_order_without_duplicates() {
        let variants = vec![
            variant(json!({"options": [{"name": "Size", "value": "S"}, {"name": "Color", "value": "Red"}]})),
            variant(json!({"options": [{"name": "Size", "value": "M"}, {"name": "Color", "value": "Red"}]})),
        ];
        let opts = vec!["Size".to_string(), "Color".to_string(), "Material".to_string()];
        let values = option_values(&opts, &variants);
        assert_eq!(values, vec![("Size", vec!["S".to_string(), "M".to_string()]), ("Color", vec!["Red".to_string()])]);
    }

    #[test]
    fn variation_payload_maps_prices_and_dimensions_to_strings() {
        let v = VariationPayload::from_variant(&variant(json!({
            "sku": "MUG-S", "price": 12.5, "available_quantity": "4", "depth": 3,
            "options": [{"name": "Size", "value": "S"}]
        })));
        assert_eq!(v.regular_price.as_deref(), Some("12.5"));
        assert_eq!(v.stock_quantity, Some(4));
        assert_eq!(v.dimensions.height.as_deref(), Some("3"));
        assert_eq!(v.attributes[0].option, "S");
    }

    #[test]
    fn new_variations_take_attribute_ids_from_parent() {
        let parent = json!({"id": 10, "attributes": [{"id": 3, "name": "Size"}]});
        let mut v = VariationPayload::from_variant(&variant(json!({"options": [{"name": "Size", "value": "S"}]})));
        attach_attribute_ids(&parent, &mut v).unwrap();
        assert_eq!(v.attributes[0].id, Some(3));

        let mut missing = VariationPayload::from_variant(&variant(json!({"options": [{"name": "Color", "value": "Red"}]})));
        assert!(attach_attribute_ids(&parent, &mut missing).is_err());
    }

    #[test]
    fn variation_label_falls_back_to_position() {
        let v = VariationPayload::from_variant(&ProductVariant::default());
        assert_eq!(v.label(1), "variation #2");
    }
}
