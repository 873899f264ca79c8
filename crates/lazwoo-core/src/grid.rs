//! Positional projection over already-decoded spreadsheet grids.
//!
//! Binary spreadsheet decoding happens outside the pipeline; stages consume
//! a [`Workbook`] of named sheets whose rows are optional string cells. The
//! upstream export templates reserve the first [`DATA_ROW_OFFSET`] rows for
//! banner and header content, so projection starts below that.

use crate::error::PipelineError;

/// First data row in every upstream spreadsheet template.
pub const DATA_ROW_OFFSET: usize = 4;

pub type Row = Vec<Option<String>>;

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Sheet {
    /// Rows below the declared header offset.
    #[must_use]
    pub fn data_rows(&self) -> &[Row] {
        if self.rows.len() <= DATA_ROW_OFFSET {
            &[]
        } else {
            &self.rows[DATA_ROW_OFFSET..]
        }
    }

    /// Logs a warning when no row reaches the column count a stage expects,
    /// instead of letting positional reads silently come up empty.
    pub fn warn_if_narrow(&self, expected_cols: usize) {
        let widest = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        if widest < expected_cols {
            tracing::warn!(
                sheet = %self.name,
                widest,
                expected_cols,
                "sheet is narrower than the stage's column schema; some fields will stay empty"
            );
        }
    }
}

impl Workbook {
    /// The first sheet, which every single-sheet stage reads.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Parse`] when the workbook has no sheets.
    pub fn first_sheet(&self) -> Result<&Sheet, PipelineError> {
        self.sheets.first().ok_or_else(|| {
            PipelineError::parse("<workbook>", DATA_ROW_OFFSET, "workbook has no sheets")
        })
    }
}

/// Non-empty cell text at `idx`, if present.
#[must_use]
pub fn cell(row: &Row, idx: usize) -> Option<&str> {
    row.get(idx)
        .and_then(Option::as_deref)
        .filter(|s| !s.is_empty())
}

/// Cell text at `idx`, or the empty string.
#[must_use]
pub fn text(row: &Row, idx: usize) -> String {
    cell(row, idx).unwrap_or_default().to_owned()
}

/// Numeric cell at `idx`; non-numeric or missing cells carry no value.
///
/// Used for prices and dimensions, where absence must not masquerade as
/// zero.
#[must_use]
pub fn number(row: &Row, idx: usize) -> Option<f64> {
    cell(row, idx).and_then(|s| s.trim().parse::<f64>().ok())
}

/// Numeric cell at `idx`, coercing non-numeric or missing cells to `0`.
///
/// Used for summable quantities (warehouse stock columns).
#[must_use]
pub fn number_or_zero(row: &Row, idx: usize) -> f64 {
    number(row, idx).unwrap_or(0.0)
}

/// Comma-joins the non-empty cells of a contiguous column range.
#[must_use]
pub fn join_nonempty(row: &Row, range: std::ops::Range<usize>) -> String {
    range
        .filter_map(|idx| cell(row, idx))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
pub(crate) fn row_of(cells: &[&str]) -> Row {
    cells
        .iter()
        .map(|c| {
            if c.is_empty() {
                None
            } else {
                Some((*c).to_string())
            }
        })
        .collect()
}
