//! Attribute/term swatch metadata for variable parents.
//!
//! The downstream platform renders selectable options from a serialized
//! attribute → term-map structure. The same payload is written to two
//! record fields (`json` and `swatchesAttributes`) because the importer
//! consumes it through two distinct hooks.

use serde::Serialize;
use serde_json::Value;

use crate::error::PipelineError;
use crate::record::ProductRecord;

/// Fixed image-size id expected by the importer's swatch renderer.
const IMAGE_SIZE: &str = "38448";

#[derive(Debug, Serialize)]
struct SwatchAttribute<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    terms: serde_json::Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct SwatchTerm<'a> {
    name: &'a str,
    color: &'a str,
    /// First matching variation's image, or JSON `false` when none exists.
    image: Value,
    show_tooltip: &'a str,
    tooltip_text: &'a str,
    tooltip_image: &'a str,
    image_size: &'a str,
}

/// Serializes the swatch structure for one variable group.
///
/// `variations` are the group's variation children; one term is emitted per
/// distinct trimmed option label, in first-seen order.
///
/// # Errors
///
/// Returns [`PipelineError::Synthesis`] when the structure cannot be
/// serialized. Callers recover by skipping the fragment; this error never
/// fails an export.
pub fn synthesize(
    attribute_name: &str,
    variations: &[&ProductRecord],
) -> Result<String, PipelineError> {
    let kind = if attribute_name == "select" {
        "select"
    } else {
        "image"
    };

    let mut terms = serde_json::Map::new();
    for label in distinct_option_labels(variations) {
        let image = variations
            .iter()
            .find(|v| v.attribute_value.as_deref().map(str::trim) == Some(label.as_str()))
            .and_then(|v| v.image.clone())
            .map_or(Value::Bool(false), Value::String);
        let term = SwatchTerm {
            name: &label,
            color: "",
            image,
            show_tooltip: "",
            tooltip_text: "",
            tooltip_image: "",
            image_size: IMAGE_SIZE,
        };
        let value = serde_json::to_value(&term).map_err(|e| PipelineError::Synthesis {
            attribute: attribute_name.to_owned(),
            reason: e.to_string(),
        })?;
        terms.insert(label, value);
    }

    let attribute = SwatchAttribute {
        name: attribute_name,
        kind,
        terms,
    };
    let mut root = serde_json::Map::new();
    root.insert(
        attribute_name.to_owned(),
        serde_json::to_value(&attribute).map_err(|e| PipelineError::Synthesis {
            attribute: attribute_name.to_owned(),
            reason: e.to_string(),
        })?,
    );
    serde_json::to_string(&root).map_err(|e| PipelineError::Synthesis {
        attribute: attribute_name.to_owned(),
        reason: e.to_string(),
    })
}

/// Distinct trimmed non-empty option labels in first-seen order.
#[must_use]
pub fn distinct_option_labels(variations: &[&ProductRecord]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    variations
        .iter()
        .filter_map(|v| v.attribute_value.as_deref())
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .filter(|label| seen.insert((*label).to_owned()))
        .map(ToOwned::to_owned)
        .collect()
}
