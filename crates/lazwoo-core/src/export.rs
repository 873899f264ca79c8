//! Final export projection to the WooCommerce product-import CSV.
//!
//! Takes the fully enriched record set plus the previously exported
//! WooCommerce product CSV (the "reference table"), resolves attribute
//! names and variable export SKUs against it, synthesizes swatch metadata,
//! and flattens the parent/child hierarchy into the frozen wide schema.

use std::collections::HashMap;

use rand::Rng;

use crate::error::PipelineError;
use crate::record::{ProductKind, ProductRecord};
use crate::stages::require_prior_stage;
use crate::swatch;

/// SKU prefix for variable parents that have never been exported before.
const GENERATED_SKU_PREFIX: &str = "65smarttools-";

/// Prefix of the synthesized attribute name used when the reference table
/// has no attribute for a product. The numeric suffix is random; the name
/// is cosmetic and only has to be unique enough within one import file.
const GENERATED_ATTRIBUTE_PREFIX: &str = "65smart";

/// Column headers of the downstream import file. Literal text and order are
/// a frozen contract with the WooCommerce importer.
pub const EXPORT_HEADERS: [&str; 48] = [
    "ID",
    "Type",
    "SKU",
    "GTIN, UPC, EAN, or ISBN",
    "Name",
    "Published",
    "Is featured?",
    "Visibility in catalog",
    "Short description",
    "Description",
    "Date sale price starts",
    "Date sale price ends",
    "Tax status",
    "Tax class",
    "In stock?",
    "Stock",
    "Low stock amount",
    "Backorders allowed?",
    "Sold individually?",
    "Weight (kg)",
    "Length (cm)",
    "Width (cm)",
    "Height (cm)",
    "Allow customer reviews?",
    "Purchase note",
    "Sale price",
    "Regular price",
    "Categories",
    "Tags",
    "Shipping class",
    "Images",
    "Download limit",
    "Download expiry days",
    "Parent",
    "Grouped products",
    "Upsells",
    "Cross-sells",
    "External URL",
    "Button text",
    "Position",
    "Swatches Attributes",
    "Brand",
    "Attribute 1 name",
    "Attribute 1 value(s)",
    "Attribute 1 global",
    "Meta: is_installment_variable_attributes",
    "Meta: rtwpvg_images",
    "Meta: lazada_product_id",
];

/// One row of the previously exported WooCommerce product CSV.
#[derive(Debug, Clone)]
pub struct ReferenceRow {
    pub name: String,
    pub kind: String,
    pub sku: String,
    pub attribute_name: String,
    pub group_key: String,
}

/// The export-stage upload: a header-keyed table of already exported
/// products, used to keep attribute names and variable SKUs stable across
/// repeated imports.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    rows: Vec<ReferenceRow>,
}

impl ReferenceTable {
    /// Parses a headered CSV export.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Parse`] when the text is not a readable
    /// CSV table.
    pub fn from_csv(text: &str) -> Result<Self, PipelineError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());
        let headers = reader
            .headers()
            .map_err(|e| PipelineError::parse("<reference>", 0, e.to_string()))?
            .clone();
        let index = |header: &str| headers.iter().position(|h| h == header);
        let name_idx = index("Name");
        let kind_idx = index("Type");
        let sku_idx = index("SKU");
        let attribute_idx = index("Attribute 1 name");
        let group_idx = index("Meta: lazada_product_id");

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| PipelineError::parse("<reference>", 0, e.to_string()))?;
            let field = |idx: Option<usize>| {
                idx.and_then(|i| record.get(i)).unwrap_or_default().to_owned()
            };
            rows.push(ReferenceRow {
                name: field(name_idx),
                kind: field(kind_idx),
                sku: field(sku_idx),
                attribute_name: field(attribute_idx),
                group_key: field(group_idx),
            });
        }
        Ok(Self { rows })
    }

    /// Attribute name of the first row whose product name matches, when
    /// that row carries a non-blank attribute.
    fn attribute_for_name(&self, name: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| row.name == name)
            .map(|row| row.attribute_name.trim())
            .filter(|attr| !attr.is_empty())
    }

    /// Export SKU of the already published variable parent for this group,
    /// if one exists.
    fn variable_sku_for_group(&self, group_key: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| row.group_key == group_key && row.kind == "variable")
            .map(|row| row.sku.as_str())
    }
}

/// Flattens the enriched record set into export order.
///
/// Groups by upstream product id (records without one form singleton
/// groups keyed by their own SKU), emits each variable parent with a
/// derived export SKU followed by its variations, appends simples, and
/// reverses group order. The reversal reproduces the importer-observed
/// output and is deliberate.
///
/// # Errors
///
/// [`PipelineError::State`] when `records` is empty.
pub fn project(
    records: &[ProductRecord],
    reference: &ReferenceTable,
) -> Result<Vec<ProductRecord>, PipelineError> {
    require_prior_stage(records)?;

    // Resolve attribute names before grouping; variable parents fall back
    // to a synthesized one so their swatch structure always has a key.
    let mut rng = rand::rng();
    let resolved: Vec<ProductRecord> = records
        .iter()
        .map(|record| {
            let mut next = record.clone();
            next.attribute = match reference.attribute_for_name(&record.name) {
                Some(attr) => Some(attr.to_owned()),
                None if record.kind == ProductKind::Variable => Some(format!(
                    "{GENERATED_ATTRIBUTE_PREFIX}{}",
                    rng.random_range(100_000..1_000_000)
                )),
                None => None,
            };
            next
        })
        .collect();

    // Group in discovery order.
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<ProductRecord>> = HashMap::new();
    for record in resolved {
        let key = record
            .source_product_id
            .clone()
            .unwrap_or_else(|| format!("__ungrouped__{}", record.sku));
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(record);
    }

    let mut flattened: Vec<Vec<ProductRecord>> = Vec::new();
    for key in &order {
        flattened.push(project_group(key, groups.remove(key).unwrap_or_default(), reference));
    }
    flattened.reverse();
    Ok(flattened.into_iter().flatten().collect())
}

fn project_group(
    group_key: &str,
    members: Vec<ProductRecord>,
    reference: &ReferenceTable,
) -> Vec<ProductRecord> {
    let mut variations: Vec<ProductRecord> = Vec::new();
    let mut variables: Vec<ProductRecord> = Vec::new();
    let mut simples: Vec<ProductRecord> = Vec::new();
    for member in members {
        match member.kind {
            ProductKind::Variation => variations.push(member),
            ProductKind::Variable => variables.push(member),
            ProductKind::Simple => simples.push(member),
        }
    }

    let mut rows = Vec::new();
    if !variations.is_empty() {
        let export_sku = reference
            .variable_sku_for_group(group_key)
            .map_or_else(
                || format!("{GENERATED_SKU_PREFIX}{}", variations[0].sku),
                ToOwned::to_owned,
            );

        if variables.is_empty() {
            // Variations with no discovered parent are a data-integrity
            // defect; synthesize the parent rather than dropping them.
            tracing::warn!(group_key, "variations without a variable parent; synthesizing one");
        }
        let mut variable = variables
            .into_iter()
            .next()
            .unwrap_or_else(|| ProductRecord::new(ProductKind::Variable));
        variable.sku = export_sku.clone();
        if variable.attribute.is_none() {
            variable.attribute.clone_from(&variations[0].attribute);
        }
        fill_defaults_from(&mut variable, &variations[0]);

        let children: Vec<&ProductRecord> = variations.iter().collect();
        variable.attribute_value = Some(swatch::distinct_option_labels(&children).join(","));

        let attribute_name = variable.attribute.as_deref().unwrap_or_default().trim();
        match swatch::synthesize(attribute_name, &children) {
            Ok(payload) => {
                variable.json = Some(payload.clone());
                variable.swatches_attributes = Some(payload);
            }
            Err(error) => {
                // Recovered locally: the parent exports without swatch
                // metadata instead of failing the whole file.
                tracing::warn!(%error, group_key, "skipping malformed swatch fragment");
            }
        }

        let parent_attribute = variable.attribute.clone();
        rows.push(variable);
        for mut variation in variations {
            variation.parent = Some(export_sku.clone());
            variation.attribute.clone_from(&parent_attribute);
            rows.push(variation);
        }
    }
    rows.extend(simples);
    rows
}

/// Variable parents inherit presentation fields from their first variation
/// when the enrichment stages left them unset.
fn fill_defaults_from(variable: &mut ProductRecord, fallback: &ProductRecord) {
    if variable.name.is_empty() {
        variable.name.clone_from(&fallback.name);
    }
    if variable.short_description.is_none() {
        variable
            .short_description
            .clone_from(&fallback.short_description);
    }
    if variable.description.is_none() {
        variable.description.clone_from(&fallback.description);
    }
    if variable.categories.is_none() {
        variable.categories.clone_from(&fallback.categories);
    }
    if variable.image.is_none() {
        variable.image.clone_from(&fallback.image);
    }
}

/// Renders the projected record set as the frozen 48-column import CSV.
///
/// # Errors
///
/// Returns [`PipelineError::Render`] when the CSV writer fails.
pub fn render_export_csv(records: &[ProductRecord]) -> Result<String, PipelineError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(EXPORT_HEADERS)?;
    for record in records {
        writer.write_record(export_row(record))?;
    }
    finish(writer)
}

/// Renders the accumulated record set as intermediate CSV, column names
/// matching the record's serde schema. Every non-final stage returns this.
///
/// # Errors
///
/// Returns [`PipelineError::Render`] when the CSV writer fails.
pub fn render_records_csv(records: &[ProductRecord]) -> Result<String, PipelineError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    finish(writer)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, PipelineError> {
    let bytes = writer
        .into_inner()
        .map_err(|e| PipelineError::Render(e.into_error().into()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn export_row(record: &ProductRecord) -> Vec<String> {
    let opt = |value: &Option<String>| value.clone().unwrap_or_default();
    let num = |value: Option<f64>| value.map(|v| format!("{v}")).unwrap_or_default();
    vec![
        record.id.clone(),
        record.kind.to_string(),
        record.sku.clone(),
        String::new(), // GTIN, UPC, EAN, or ISBN
        record.name.clone(),
        "1".to_string(), // Published
        "1".to_string(), // Is featured?
        "visible".to_string(),
        opt(&record.short_description),
        opt(&record.description),
        String::new(), // Date sale price starts
        String::new(), // Date sale price ends
        "taxable".to_string(),
        String::new(), // Tax class
        String::new(), // In stock?
        record.stock.map(|v| v.to_string()).unwrap_or_default(),
        String::new(), // Low stock amount
        "0".to_string(), // Backorders allowed?
        "0".to_string(), // Sold individually?
        num(record.weight),
        num(record.length),
        num(record.width),
        num(record.height),
        "0".to_string(), // Allow customer reviews?
        String::new(),   // Purchase note
        num(record.sale_price),
        num(record.regular_price),
        opt(&record.categories),
        String::new(), // Tags
        String::new(), // Shipping class
        opt(&record.image),
        String::new(), // Download limit
        String::new(), // Download expiry days
        opt(&record.parent),
        String::new(), // Grouped products
        String::new(), // Upsells
        String::new(), // Cross-sells
        String::new(), // External URL
        String::new(), // Button text
        String::new(), // Position
        opt(&record.swatches_attributes),
        opt(&record.brand),
        opt(&record.attribute),
        opt(&record.attribute_value),
        "1".to_string(), // Attribute 1 global
        opt(&record.installment_variable),
        opt(&record.rtwpvg_images),
        opt(&record.source_product_id),
    ]
}
