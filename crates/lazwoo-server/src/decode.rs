//! Upload-to-grid decoding seam.
//!
//! Spreadsheet decoding is external to the pipeline: stages consume a
//! [`Workbook`] of optional-string cells. The shipped decoder handles
//! delimited text uploads; a binary-format decoder can replace it behind
//! [`WorkbookDecoder`] without touching any stage.

use lazwoo_core::grid::{Sheet, Workbook, DATA_ROW_OFFSET};
use lazwoo_core::PipelineError;

pub trait WorkbookDecoder: Send + Sync {
    /// Decodes raw upload bytes into a workbook.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Parse`] when the bytes cannot be read as a
    /// rectangular grid.
    fn decode(&self, filename: &str, bytes: &[u8]) -> Result<Workbook, PipelineError>;
}

/// Decodes a comma-delimited text upload into a single-sheet workbook.
///
/// The sheet is named after the file stem, which the categorization stage
/// uses as the category label.
pub struct DelimitedDecoder;

impl WorkbookDecoder for DelimitedDecoder {
    fn decode(&self, filename: &str, bytes: &[u8]) -> Result<Workbook, PipelineError> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            parse_error(filename, format!("upload is not valid UTF-8 text: {e}"))
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| parse_error(filename, e.to_string()))?;
            rows.push(
                record
                    .iter()
                    .map(|cell| {
                        if cell.is_empty() {
                            None
                        } else {
                            Some(cell.to_owned())
                        }
                    })
                    .collect(),
            );
        }

        Ok(Workbook {
            sheets: vec![Sheet {
                name: file_stem(filename).to_owned(),
                rows,
            }],
        })
    }
}

fn parse_error(filename: &str, reason: String) -> PipelineError {
    PipelineError::Parse {
        sheet: filename.to_owned(),
        offset: DATA_ROW_OFFSET,
        reason,
    }
}

fn file_stem(filename: &str) -> &str {
    let stem = filename
        .rsplit_once('.')
        .map_or(filename, |(stem, _)| stem);
    if stem.is_empty() {
        "Sheet1"
    } else {
        stem
    }
}
