//! Reference data used to translate business keys (SKU, name, order number) into WooCommerce ids.
//!
//! Catalogs are fetched lazily, at most once per kind for the lifetime of the cache, and never
//! persisted. Lookups never fail: a key that is absent after population resolves to `None`,
//! which callers treat as a per-record skip.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::OnceCell;

use crate::clients::WooCommerceClient;
use crate::mapping::alnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Products,
    Variants,
    Categories,
    Attributes,
}

impl ReferenceKind {
    fn endpoint(&self) -> &'static str {
        match self {
            ReferenceKind::Products => "products",
            ReferenceKind::Variants => "products/{id}/variations",
            ReferenceKind::Categories => "products/categories",
            ReferenceKind::Attributes => "products/attributes",
        }
    }

    fn fields(&self) -> &'static [&'static str] {
        match self {
            ReferenceKind::Products => &["id", "name", "sku", "stock_quantity", "type"],
            ReferenceKind::Variants => &["id", "name", "sku", "stock_quantity"],
            ReferenceKind::Categories | ReferenceKind::Attributes => &["id", "name", "slug"],
        }
    }
}

/// Snapshot of one remote entity: a product, variant, category or attribute.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReferenceEntry {
    pub id: i64,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    #[serde(default, rename = "type")]
    pub product_type: Option<String>,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

impl ReferenceEntry {
    /// Variants carry their parent's id; a parent id of 0 means "no parent" in WooCommerce.
    pub fn parent(&self) -> Option<i64> {
        self.parent_id.filter(|p| *p > 0)
    }

    pub fn is_variable(&self) -> bool {
        self.product_type.as_deref() == Some("variable")
    }
}

/// Indexed set of entries for one reference kind.
#[derive(Debug, Default)]
pub struct Catalog {
    entries: Vec<ReferenceEntry>,
    by_id: HashMap<i64, usize>,
    by_sku: HashMap<String, Vec<usize>>,
}

impl Catalog {
    pub fn from_entries(entries: Vec<ReferenceEntry>) -> Self {
        let mut by_id = HashMap::with_capacity(entries.len());
        let mut by_sku: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, e) in entries.iter().enumerate() {
            by_id.entry(e.id).or_insert(i);
            if let Some(sku) = e.sku.as_deref().filter(|s| !s.is_empty()) {
                by_sku.entry(sku.to_string()).or_default().push(i);
            }
        }
        Self { entries, by_id, by_sku }
    }

    fn from_values(kind: ReferenceKind, values: Vec<Value>) -> Self {
        let entries = values
            .into_iter()
            .filter_map(|v| match serde_json::from_value::<ReferenceEntry>(v) {
                Ok(e) => Some(e),
                Err(e) => {
                    tracing::warn!(kind = ?kind, error = %e, "Dropping malformed reference entry");
                    None
                }
            })
            .collect();
        Self::from_entries(entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    pub fn by_id(&self, id: i64) -> Option<&ReferenceEntry> {
        self.by_id.get(&id).map(|i| &self.entries[*i])
    }

    pub fn by_sku(&self, sku: &str) -> Vec<&ReferenceEntry> {
        self.by_sku
            .get(sku)
            .map(|idx| idx.iter().map(|i| &self.entries[*i]).collect())
            .unwrap_or_default()
    }

    pub fn by_name(&self, name: &str) -> Option<&ReferenceEntry> {
        self.entries.iter().find(|e| e.name.as_deref() == Some(name))
    }

    pub fn by_loose_name(&self, name: &str) -> Option<&ReferenceEntry> {
        let wanted = alnum(name);
        self.entries.iter().find(|e| e.name.as_deref().map(alnum).as_deref() == Some(wanted.as_str()))
    }

    /// Single SKU match, or the duplicate whose name matches exactly.
    fn by_sku_disambiguated(&self, sku: &str, name: Option<&str>) -> Option<&ReferenceEntry> {
        let matches = self.by_sku(sku);
        match matches.len() {
            0 => None,
            1 => Some(matches[0]),
            n => {
                tracing::info!(sku = sku, matches = n, "More than one entry shares this sku; filtering by name");
                name.and_then(|name| matches.into_iter().find(|e| e.name.as_deref() == Some(name)))
            }
        }
    }
}

/// Key accepted by [`ReferenceCache::resolve`].
#[derive(Debug, Clone, Copy)]
pub enum LookupKey<'a> {
    Id(i64),
    Sku(&'a str),
}

pub struct ReferenceCache {
    client: WooCommerceClient,
    products: OnceCell<Catalog>,
    variants: OnceCell<Catalog>,
    categories: OnceCell<Catalog>,
    attributes: OnceCell<Catalog>,
}

impl ReferenceCache {
    pub fn new(client: WooCommerceClient) -> Self {
        Self {
            client,
            products: OnceCell::new(),
            variants: OnceCell::new(),
            categories: OnceCell::new(),
            attributes: OnceCell::new(),
        }
    }

    pub fn client(&self) -> &WooCommerceClient {
        &self.client
    }

    pub fn is_loaded(&self, kind: ReferenceKind) -> bool {
        self.cell(kind).initialized()
    }

    fn cell(&self, kind: ReferenceKind) -> &OnceCell<Catalog> {
        match kind {
            ReferenceKind::Products => &self.products,
            ReferenceKind::Variants => &self.variants,
            ReferenceKind::Categories => &self.categories,
            ReferenceKind::Attributes => &self.attributes,
        }
    }

    /// Populate the catalog for `kind` if this is the first use. Concurrent callers wait on the
    /// same population instead of starting their own.
    pub async fn ensure_loaded(&self, kind: ReferenceKind) -> &Catalog {
        match kind {
            ReferenceKind::Variants => {
                self.variants
                    .get_or_init(|| async {
                        let products = self.products_catalog().await;
                        self.load_variants(products).await
                    })
                    .await
            }
            ReferenceKind::Products => self.products_catalog().await,
            other => self.cell(other).get_or_init(|| self.load_flat(other)).await,
        }
    }

    async fn products_catalog(&self) -> &Catalog {
        self.products.get_or_init(|| self.load_flat(ReferenceKind::Products)).await
    }

    async fn load_flat(&self, kind: ReferenceKind) -> Catalog {
        let values = self.client.get_reference_data(kind.endpoint(), Some(kind.fields()), &[], None).await;
        let catalog = Catalog::from_values(kind, values);
        tracing::info!(kind = ?kind, entries = catalog.len(), "Reference catalog loaded");
        catalog
    }

    async fn load_variants(&self, products: &Catalog) -> Catalog {
        let mut values: Vec<Value> = Vec::new();
        for parent in products.entries().iter().filter(|p| p.is_variable()) {
            let endpoint = ReferenceKind::Variants.endpoint().replace("{id}", &parent.id.to_string());
            let data = self
                .client
                .get_reference_data(&endpoint, Some(ReferenceKind::Variants.fields()), &[], Some("products/"))
                .await;
            for mut d in data {
                if let Some(obj) = d.as_object_mut() {
                    obj.insert("parent_id".to_string(), Value::from(parent.id));
                }
                values.push(d);
            }
        }
        let catalog = Catalog::from_values(ReferenceKind::Variants, values);
        tracing::info!(kind = ?ReferenceKind::Variants, entries = catalog.len(), "Reference catalog loaded");
        catalog
    }

    /// Look a key up in one catalog, populating it first if needed. `None` means not found.
    pub async fn resolve(&self, kind: ReferenceKind, key: LookupKey<'_>) -> Option<ReferenceEntry> {
        let catalog = self.ensure_loaded(kind).await;
        match key {
            LookupKey::Id(id) => catalog.by_id(id).cloned(),
            LookupKey::Sku(sku) => catalog.by_sku(sku).first().map(|e| (*e).clone()),
        }
    }

    /// Find a product or variant by SKU (main products first), then by name.
    ///
    /// Duplicate SKUs are narrowed by exact name. Name fallbacks try exact names in products and
    /// variants, then an alphanumeric-only comparison against variant names.
    pub async fn resolve_product(&self, sku: Option<&str>, name: Option<&str>) -> Option<ReferenceEntry> {
        let sku = sku.filter(|s| !s.trim().is_empty());
        let name = name.filter(|s| !s.trim().is_empty());

        if let Some(sku) = sku {
            if let Some(e) = self.products_catalog().await.by_sku_disambiguated(sku, name) {
                return Some(e.clone());
            }
            tracing::debug!(sku = sku, "SKU not found in main products; checking variants");
            if let Some(e) = self.ensure_loaded(ReferenceKind::Variants).await.by_sku_disambiguated(sku, name) {
                return Some(e.clone());
            }
        }

        let name = name?;
        tracing::info!(name = name, "Attempting to match product by name");
        if let Some(e) = self.products_catalog().await.by_name(name) {
            return Some(e.clone());
        }
        let variants = self.ensure_loaded(ReferenceKind::Variants).await;
        variants.by_name(name).or_else(|| variants.by_loose_name(name)).cloned()
    }

    /// Category or attribute id by display name.
    pub async fn id_by_name(&self, kind: ReferenceKind, name: &str) -> Option<i64> {
        self.ensure_loaded(kind).await.by_name(name).map(|e| e.id)
    }

    /// Single-resource lookup that bypasses the catalogs.
    pub async fn fetch_product(&self, id: i64) -> Option<ReferenceEntry> {
        match self.client.get(&format!("products/{}", id), &[]).await {
            Ok(resp) => serde_json::from_value(resp.body)
                .map_err(|e| tracing::warn!(product_id = id, error = %e, "Unexpected product shape"))
                .ok(),
            Err(e) => {
                tracing::warn!(product_id = id, error = %e, "Product lookup by id failed");
                None
            }
        }
    }

    /// Existing product for a variant: by id (`include=`) first, then by SKU.
    pub async fn find_existing_product(&self, id: Option<i64>, sku: Option<&str>) -> Option<ReferenceEntry> {
        let mut queries: Vec<(&str, String)> = Vec::new();
        if let Some(id) = id {
            queries.push(("include", id.to_string()));
        }
        if let Some(sku) = sku.filter(|s| !s.is_empty()) {
            queries.push(("sku", sku.to_string()));
        }
        for (param, value) in queries {
            match self.client.get("products", &[(param, value.clone())]).await {
                Ok(resp) => {
                    let first = resp.body.as_array().and_then(|a| a.first()).cloned();
                    if let Some(found) = first.and_then(|v| serde_json::from_value::<ReferenceEntry>(v).ok()) {
                        return Some(found);
                    }
                }
                Err(e) => {
                    tracing::error!(param = param, value = %value, error = %e, "Failed to look up existing product");
                }
            }
        }
        None
    }

    pub async fn find_customer_by_email(&self, email: &str) -> Option<i64> {
        match self.client.get("customers", &[("email", email.to_string())]).await {
            Ok(resp) => resp.body.as_array().and_then(|a| a.first()).and_then(|c| c.get("id")).and_then(|v| v.as_i64()),
            Err(e) => {
                tracing::warn!(email = email, error = %e, "Customer lookup by email failed");
                None
            }
        }
    }

    /// Order id for a human-facing order number (`orders?search=`).
    pub async fn find_order_by_number(&self, number: i64) -> Option<i64> {
        let wanted = number.to_string();
        match self.client.get("orders", &[("search", wanted.clone())]).await {
            Ok(resp) => resp.body.as_array().and_then(|orders| {
                orders
                    .iter()
                    .find(|o| {
                        o.get("number").and_then(|n| n.as_str()) == Some(wanted.as_str())
                            || o.get("id").and_then(|v| v.as_i64()) == Some(number)
                    })
                    .and_then(|o| o.get("id"))
                    .and_then(|v| v.as_i64())
            }),
            Err(e) => {
                tracing::warn!(order_number = number, error = %e, "Order lookup by number failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64, sku: &str, name: &str) -> ReferenceEntry {
        ReferenceEntry {
            id,
            sku: Some(sku.to_string()),
            name: Some(name.to_string()),
            stock_quantity: None,
            product_type: Some("simple".into()),
            parent_id: None,
        }
    }

    #[test]
    fn catalog_indexes_by_id_and_sku() {
        let cat = Catalog::from_entries(vec![entry(1, "A", "Alpha"), entry(2, "B", "Beta"), entry(3, "", "Blank")]);
        assert_eq!(cat.by_id(2).map(|e| e.id), Some(2));
        assert_eq!(cat.by_sku("A").len(), 1);
        assert!(cat.by_sku("").is_empty());
        assert!(cat.by_id(9).is_none());
    }

    #[test]
    fn duplicate_skus_are_narrowed_by_name() {
        let cat = Catalog::from_entries(vec![entry(1, "DUP", "Red Mug"), entry(2, "DUP", "Blue Mug")]);
        assert_eq!(cat.by_sku_disambiguated("DUP", Some("Blue Mug")).map(|e| e.id), Some(2));
        assert!(cat.by_sku_disambiguated("DUP", Some("Green Mug")).is_none());
        assert!(cat.by_sku_disambiguated("DUP", None).is_none());
    }

    #[test]
    fn loose_name_matching_ignores_punctuation() {
        let cat = Catalog::from_entries(vec![entry(7, "T1", "T-Shirt - Blue, XL")]);
        assert_eq!(cat.by_loose_name("TShirt Blue XL").map(|e| e.id), Some(7));
    }

    #[test]
    fn zero_parent_id_means_no_parent() {
        let mut e = entry(1, "A", "Alpha");
        e.parent_id = Some(0);
        assert_eq!(e.parent(), None);
        e.parent_id = Some(12);
        assert_eq!(e.parent(), Some(12));
    }
}
