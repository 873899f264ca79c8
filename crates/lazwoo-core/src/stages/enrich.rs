//! Overlay enrichment stages: descriptions/images, categorization/brand,
//! price/stock and freight dimensions.
//!
//! Every stage builds lookup maps from the new upload (last row wins on
//! duplicate keys) and returns a record set of identical size and order
//! with matching fields overlaid. A populated field survives a missing join
//! key; applying the same upload twice is idempotent.

use std::collections::HashMap;

use crate::error::PipelineError;
use crate::grid::{self, Workbook};
use crate::record::{overlay_number, overlay_text, ProductKind, ProductRecord};
use crate::stages::require_prior_stage;

/// Column schema of the basic-information export (descriptions/images).
mod basic_col {
    pub const PRODUCT_ID: usize = 0;
    pub const IMAGES: std::ops::Range<usize> = 5..13;
    pub const DESCRIPTION: usize = 19;
    pub const SHORT_DESCRIPTION: usize = 20;
}

/// Column schema of the per-category workbook tabs (brand lives in-row, the
/// category itself is the tab name).
mod category_col {
    pub const PRODUCT_ID: usize = 0;
    pub const BRAND: usize = 3;
}

/// Column schema of the price-and-stock export. Stock is split across five
/// warehouse columns that are summed per SKU.
mod price_col {
    pub const SALE_PRICE: usize = 7;
    pub const REGULAR_PRICE: usize = 10;
    pub const SKU: usize = 11;
    pub const STOCK: std::ops::Range<usize> = 12..17;
}

/// Column schema of the freight export.
mod freight_col {
    pub const WEIGHT: usize = 6;
    pub const SKU: usize = 7;
    pub const LENGTH: usize = 8;
    pub const WIDTH: usize = 9;
    pub const HEIGHT: usize = 10;
}

/// Overlays descriptions, short descriptions and image lists, keyed by the
/// upstream product id.
///
/// Variations keep their own image and never receive description overlays;
/// they inherit presentation through their parent.
///
/// # Errors
///
/// [`PipelineError::State`] when `records` is empty; [`PipelineError::Parse`]
/// when the workbook has no sheets.
pub fn apply_descriptions(
    records: &[ProductRecord],
    workbook: &Workbook,
) -> Result<Vec<ProductRecord>, PipelineError> {
    require_prior_stage(records)?;
    let sheet = workbook.first_sheet()?;
    sheet.warn_if_narrow(basic_col::SHORT_DESCRIPTION + 1);

    let mut descriptions: HashMap<String, String> = HashMap::new();
    let mut short_descriptions: HashMap<String, String> = HashMap::new();
    let mut images: HashMap<String, String> = HashMap::new();
    for row in sheet.data_rows() {
        let Some(product_id) = grid::cell(row, basic_col::PRODUCT_ID) else {
            continue;
        };
        if let Some(description) = grid::cell(row, basic_col::DESCRIPTION) {
            descriptions.insert(product_id.to_owned(), description.to_owned());
        }
        if let Some(short) = grid::cell(row, basic_col::SHORT_DESCRIPTION) {
            short_descriptions.insert(product_id.to_owned(), short.to_owned());
        }
        let image_list = grid::join_nonempty(row, basic_col::IMAGES);
        if !image_list.is_empty() {
            images.insert(product_id.to_owned(), image_list);
        }
    }

    let mut next = records.to_vec();
    for record in &mut next {
        if record.kind == ProductKind::Variation {
            continue;
        }
        let key = record.source_product_id.as_deref().unwrap_or_default();
        overlay_text(&mut record.description, descriptions.get(key).map(String::as_str));
        overlay_text(
            &mut record.short_description,
            short_descriptions.get(key).map(String::as_str),
        );
        overlay_text(&mut record.image, images.get(key).map(String::as_str));
    }
    Ok(next)
}

/// Overlays category and brand, keyed by the upstream product id.
///
/// The category taxonomy is "which workbook tab did this product appear
/// on": every sheet is scanned and the sheet name itself becomes the
/// category label. Variations skip the category overlay.
///
/// # Errors
///
/// [`PipelineError::State`] when `records` is empty.
pub fn apply_categories(
    records: &[ProductRecord],
    workbook: &Workbook,
) -> Result<Vec<ProductRecord>, PipelineError> {
    require_prior_stage(records)?;

    let mut categories: HashMap<String, String> = HashMap::new();
    let mut brands: HashMap<String, String> = HashMap::new();
    for sheet in &workbook.sheets {
        for row in sheet.data_rows() {
            let Some(product_id) = grid::cell(row, category_col::PRODUCT_ID) else {
                continue;
            };
            categories.insert(product_id.to_owned(), sheet.name.clone());
            if let Some(brand) = grid::cell(row, category_col::BRAND) {
                brands.insert(product_id.to_owned(), brand.to_owned());
            }
        }
    }

    let mut next = records.to_vec();
    for record in &mut next {
        let key = record.source_product_id.as_deref().unwrap_or_default();
        if record.kind != ProductKind::Variation {
            overlay_text(&mut record.categories, categories.get(key).map(String::as_str));
        }
        overlay_text(&mut record.brand, brands.get(key).map(String::as_str));
    }
    Ok(next)
}

/// Overlays stock and prices, keyed by SKU.
///
/// Stock sums the five warehouse columns with non-numeric cells coerced to
/// zero; prices are number-or-absent, so a blank price cell never
/// masquerades as a free product.
///
/// # Errors
///
/// [`PipelineError::State`] when `records` is empty; [`PipelineError::Parse`]
/// when the workbook has no sheets.
pub fn apply_price_stock(
    records: &[ProductRecord],
    workbook: &Workbook,
) -> Result<Vec<ProductRecord>, PipelineError> {
    require_prior_stage(records)?;
    let sheet = workbook.first_sheet()?;
    sheet.warn_if_narrow(price_col::STOCK.end);

    let mut stock: HashMap<String, u32> = HashMap::new();
    let mut regular: HashMap<String, f64> = HashMap::new();
    let mut sale: HashMap<String, f64> = HashMap::new();
    for row in sheet.data_rows() {
        let Some(sku) = grid::cell(row, price_col::SKU) else {
            continue;
        };
        let total: f64 = price_col::STOCK
            .clone()
            .map(|idx| grid::number_or_zero(row, idx))
            .sum();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        stock.insert(sku.to_owned(), total.max(0.0) as u32);
        if let Some(price) = grid::number(row, price_col::REGULAR_PRICE) {
            regular.insert(sku.to_owned(), price);
        }
        if let Some(price) = grid::number(row, price_col::SALE_PRICE) {
            sale.insert(sku.to_owned(), price);
        }
    }

    let mut next = records.to_vec();
    for record in &mut next {
        if let Some(total) = stock.get(&record.sku) {
            record.stock = Some(*total);
        }
        overlay_number(&mut record.regular_price, regular.get(&record.sku).copied());
        overlay_number(&mut record.sale_price, sale.get(&record.sku).copied());
    }
    Ok(next)
}

/// Overlays shipping weight and dimensions, keyed by SKU. All four values
/// are number-or-absent.
///
/// # Errors
///
/// [`PipelineError::State`] when `records` is empty; [`PipelineError::Parse`]
/// when the workbook has no sheets.
pub fn apply_freight(
    records: &[ProductRecord],
    workbook: &Workbook,
) -> Result<Vec<ProductRecord>, PipelineError> {
    require_prior_stage(records)?;
    let sheet = workbook.first_sheet()?;
    sheet.warn_if_narrow(freight_col::HEIGHT + 1);

    let mut dimensions: HashMap<String, [Option<f64>; 4]> = HashMap::new();
    for row in sheet.data_rows() {
        let Some(sku) = grid::cell(row, freight_col::SKU) else {
            continue;
        };
        dimensions.insert(
            sku.to_owned(),
            [
                grid::number(row, freight_col::WEIGHT),
                grid::number(row, freight_col::LENGTH),
                grid::number(row, freight_col::WIDTH),
                grid::number(row, freight_col::HEIGHT),
            ],
        );
    }

    let mut next = records.to_vec();
    for record in &mut next {
        if let Some([weight, length, width, height]) = dimensions.get(&record.sku) {
            overlay_number(&mut record.weight, *weight);
            overlay_number(&mut record.length, *length);
            overlay_number(&mut record.width, *width);
            overlay_number(&mut record.height, *height);
        }
    }
    Ok(next)
}
