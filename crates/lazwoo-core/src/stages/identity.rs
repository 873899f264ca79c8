//! Identity/variant discovery from the SKU-and-image export.
//!
//! Groups rows by the upstream product id: a single-row group becomes one
//! `Simple` record, a multi-row group one `Variable` parent plus one
//! `Variation` per row.

use std::collections::HashMap;

use crate::error::PipelineError;
use crate::grid::{self, Row, Workbook, DATA_ROW_OFFSET};
use crate::record::{ProductKind, ProductRecord};

/// Option label substituted when the variation-combination cell is blank.
/// Thai for "no option"; the literal flows into the export unchanged.
pub const NO_OPTION_LABEL: &str = "ไม่มีตัวเลือก";

/// Column schema of the SKU-and-image export.
mod col {
    pub const PRODUCT_ID: usize = 0;
    pub const NAME: usize = 2;
    pub const IMAGES: std::ops::Range<usize> = 7..15;
    pub const SKU: usize = 15;
    pub const OPTION_LABEL: usize = 16;
}

const EXPECTED_COLS: usize = col::OPTION_LABEL + 1;

/// Builds the initial record set: parents and simples in group-discovery
/// order, followed by variations in row-discovery order.
///
/// # Errors
///
/// Returns [`PipelineError::Parse`] when the first sheet holds no data rows
/// below the declared offset.
pub fn discover(workbook: &Workbook) -> Result<Vec<ProductRecord>, PipelineError> {
    let sheet = workbook.first_sheet()?;
    sheet.warn_if_narrow(EXPECTED_COLS);

    let data = sheet.data_rows();
    if data.is_empty() {
        return Err(PipelineError::parse(
            &sheet.name,
            DATA_ROW_OFFSET,
            "no data rows below the header offset",
        ));
    }

    // Group rows by product id, preserving first-seen order.
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&Row>> = HashMap::new();
    for row in data {
        let Some(product_id) = grid::cell(row, col::PRODUCT_ID) else {
            continue;
        };
        if !groups.contains_key(product_id) {
            order.push(product_id.to_owned());
        }
        groups.entry(product_id.to_owned()).or_default().push(row);
    }

    let mut parents: Vec<ProductRecord> = Vec::new();
    let mut variations: Vec<ProductRecord> = Vec::new();

    for product_id in &order {
        let rows = &groups[product_id];
        let first_row = rows[0];
        let name = grid::text(first_row, col::NAME);
        let image_list = grid::join_nonempty(first_row, col::IMAGES);

        if rows.len() > 1 {
            parents.push(variable_record(product_id, &name, &image_list, rows));
            for row in rows {
                variations.push(variation_record(product_id, &name, row));
            }
        } else {
            parents.push(simple_record(product_id, &name, &image_list, first_row));
        }
    }

    parents.extend(variations);
    Ok(parents)
}

fn option_label(row: &Row) -> String {
    grid::cell(row, col::OPTION_LABEL)
        .unwrap_or(NO_OPTION_LABEL)
        .to_owned()
}

fn variable_record(
    product_id: &str,
    name: &str,
    image_list: &str,
    rows: &[&Row],
) -> ProductRecord {
    // Deduplicated, order-stable union of the rows' option labels.
    let mut seen = std::collections::HashSet::new();
    let distinct: Vec<String> = rows
        .iter()
        .map(|row| option_label(row))
        .filter(|label| seen.insert(label.clone()))
        .collect();

    let mut record = ProductRecord::new(ProductKind::Variable);
    record.name = name.to_owned();
    record.image = Some(image_list.to_owned()).filter(|s| !s.is_empty());
    record.attribute_value = Some(distinct.join(","));
    record.source_product_id = Some(product_id.to_owned());
    record
}

fn variation_record(product_id: &str, parent_name: &str, row: &Row) -> ProductRecord {
    let label = option_label(row);
    let mut record = ProductRecord::new(ProductKind::Variation);
    record.sku = grid::text(row, col::SKU);
    record.name = format!("{parent_name} - {label}");
    record.image = grid::cell(row, col::IMAGES.start).map(ToOwned::to_owned);
    record.attribute_value = Some(label);
    record.installment_variable = Some("yes".to_owned());
    record.rtwpvg_images =
        Some(grid::join_nonempty(row, col::IMAGES)).filter(|s| !s.is_empty());
    record.source_product_id = Some(product_id.to_owned());
    record
}

fn simple_record(product_id: &str, name: &str, image_list: &str, row: &Row) -> ProductRecord {
    let mut record = ProductRecord::new(ProductKind::Simple);
    record.sku = grid::text(row, col::SKU);
    record.name = name.to_owned();
    record.image = Some(image_list.to_owned()).filter(|s| !s.is_empty());
    record.attribute_value = grid::cell(row, col::OPTION_LABEL).map(ToOwned::to_owned);
    record.source_product_id = Some(product_id.to_owned());
    record
}
