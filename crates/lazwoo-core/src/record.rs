use serde::{Deserialize, Serialize};

/// Export shape of a catalog record.
///
/// `Variable` is a grouping parent with selectable options, `Variation` one
/// purchasable option under it, and `Simple` a product with exactly one
/// purchasable option and no parent/child structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    Simple,
    Variable,
    Variation,
}

impl std::fmt::Display for ProductKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductKind::Simple => write!(f, "simple"),
            ProductKind::Variable => write!(f, "variable"),
            ProductKind::Variation => write!(f, "variation"),
        }
    }
}

/// One accumulated catalog record, keyed across stages by
/// `source_product_id` (the upstream marketplace product id) or by `sku`.
///
/// Serde renames reproduce the column names of the intermediate CSV the
/// downstream tooling already consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Target-platform identifier; left empty for records exported as new.
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ProductKind,
    #[serde(rename = "SKU")]
    pub sku: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "shortDescription")]
    pub short_description: Option<String>,
    pub description: Option<String>,
    pub stock: Option<u32>,
    #[serde(rename = "salePrice")]
    pub sale_price: Option<f64>,
    #[serde(rename = "regularPrice")]
    pub regular_price: Option<f64>,
    pub weight: Option<f64>,
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub categories: Option<String>,
    pub image: Option<String>,
    /// Export SKU of the owning variable parent; resolved during export.
    pub parent: Option<String>,
    #[serde(rename = "swatchesAttributes")]
    pub swatches_attributes: Option<String>,
    pub brand: Option<String>,
    pub attribute: Option<String>,
    #[serde(rename = "attributeValue")]
    pub attribute_value: Option<String>,
    pub installment_variable: Option<String>,
    /// Comma-joined secondary image list (variation rows only).
    pub rtwpvg_images: Option<String>,
    /// Duplicate of `swatches_attributes`; the downstream platform imports
    /// the same payload through two distinct hooks.
    pub json: Option<String>,
    #[serde(rename = "lazada_product_id")]
    pub source_product_id: Option<String>,
}

impl ProductRecord {
    #[must_use]
    pub fn new(kind: ProductKind) -> Self {
        Self {
            id: String::new(),
            kind,
            sku: String::new(),
            name: String::new(),
            short_description: None,
            description: None,
            stock: None,
            sale_price: None,
            regular_price: None,
            weight: None,
            length: None,
            width: None,
            height: None,
            categories: None,
            image: None,
            parent: None,
            swatches_attributes: None,
            brand: None,
            attribute: None,
            attribute_value: None,
            installment_variable: None,
            rtwpvg_images: None,
            json: None,
            source_product_id: None,
        }
    }
}

/// Replaces `slot` only when the stage supplies a non-empty value.
///
/// A populated field is never downgraded to empty because of a missing join
/// key; that is the overlay-merge contract every enrichment stage follows.
pub fn overlay_text(slot: &mut Option<String>, value: Option<&str>) {
    if let Some(v) = value {
        if !v.is_empty() {
            *slot = Some(v.to_owned());
        }
    }
}

/// Numeric counterpart of [`overlay_text`]: absence leaves the field as-is.
pub fn overlay_number(slot: &mut Option<f64>, value: Option<f64>) {
    if let Some(v) = value {
        *slot = Some(v);
    }
}
