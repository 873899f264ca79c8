//! Handlers for the six pipeline stage routes.

use axum::{
    body::Bytes,
    extract::{Multipart, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Extension,
};
use serde::Deserialize;

use lazwoo_core::export::{self, ReferenceTable};
use lazwoo_core::grid::Workbook;
use lazwoo_core::stages::{enrich, identity};
use lazwoo_core::{PipelineError, ProductRecord};

use super::{ApiError, AppState};
use crate::middleware::RequestId;

const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";
const EXPORT_ATTACHMENT: &str = "attachment; filename=\"update_products_woocommerce.csv\"";
const IDENTITY_FILENAME_PREFIX: &str = "skuimg";
const DEFAULT_RUN_ID: &str = "default";

#[derive(Debug, Deserialize)]
pub(super) struct RunQuery {
    run: Option<String>,
}

impl RunQuery {
    fn id(&self) -> &str {
        self.run
            .as_deref()
            .filter(|run| !run.is_empty())
            .unwrap_or(DEFAULT_RUN_ID)
    }
}

struct StageUpload {
    filename: String,
    bytes: Bytes,
}

/// Pulls the `upload` part out of the multipart body.
async fn read_upload(multipart: &mut Multipart) -> Result<StageUpload, PipelineError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PipelineError::Validation(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("upload") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_owned();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| PipelineError::Validation(format!("failed to read upload: {e}")))?;
        return Ok(StageUpload { filename, bytes });
    }
    Err(PipelineError::Validation("No file uploaded".to_owned()))
}

/// The identity workbook must be an XLSX export whose name starts with
/// the `skuimg` prefix. Checks run extension first, then size, then
/// prefix, so the caller sees the most actionable failure.
fn validate_identity_upload(upload: &StageUpload, max_bytes: usize) -> Result<(), PipelineError> {
    if !upload.filename.ends_with(".xlsx") {
        return Err(PipelineError::Validation(
            "Invalid file type. Please upload an XLSX file.".to_owned(),
        ));
    }
    if upload.bytes.len() > max_bytes {
        return Err(PipelineError::Validation(
            "File is too large. Maximum size is 25 MB.".to_owned(),
        ));
    }
    if !upload.filename.starts_with(IDENTITY_FILENAME_PREFIX) {
        return Err(PipelineError::Validation(
            "ไฟล์ไม่ถูกต้อง จะต้องเป็นไฟล์ 'skuimg......xlsx'".to_owned(),
        ));
    }
    Ok(())
}

fn csv_response(text: String) -> Response {
    ([(header::CONTENT_TYPE, CSV_CONTENT_TYPE)], text).into_response()
}

fn attachment_response(text: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, CSV_CONTENT_TYPE),
            (header::CONTENT_DISPOSITION, EXPORT_ATTACHMENT),
        ],
        text,
    )
        .into_response()
}

/// Stage 1: seeds the run's working set from the SKU-and-image workbook.
pub(super) async fn identity_discovery(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RunQuery>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let fail = |e: PipelineError| ApiError::from_pipeline(req_id.0.clone(), &e);

    let upload = read_upload(&mut multipart).await.map_err(&fail)?;
    validate_identity_upload(&upload, state.max_upload_bytes).map_err(&fail)?;
    let workbook = state
        .decoder
        .decode(&upload.filename, &upload.bytes)
        .map_err(&fail)?;
    let records = identity::discover(&workbook).map_err(&fail)?;
    tracing::info!(
        run = query.id(),
        records = records.len(),
        "identity discovery complete"
    );
    let csv_text = export::render_records_csv(&records).map_err(&fail)?;
    state.sessions.replace(query.id(), records);
    Ok(csv_response(csv_text))
}

/// Stages 2 through 5 share a shape: decode the upload, overlay it onto
/// the run's working set, persist the result, echo it back as CSV.
async fn run_enrichment<F>(
    state: AppState,
    req_id: RequestId,
    query: RunQuery,
    mut multipart: Multipart,
    stage_name: &'static str,
    stage: F,
) -> Result<Response, ApiError>
where
    F: FnOnce(&[ProductRecord], &Workbook) -> Result<Vec<ProductRecord>, PipelineError>,
{
    let fail = |e: PipelineError| ApiError::from_pipeline(req_id.0.clone(), &e);

    let upload = read_upload(&mut multipart).await.map_err(&fail)?;
    let workbook = state
        .decoder
        .decode(&upload.filename, &upload.bytes)
        .map_err(&fail)?;
    let current = state.sessions.records(query.id());
    let next = stage(&current, &workbook).map_err(&fail)?;
    tracing::info!(
        run = query.id(),
        stage = stage_name,
        records = next.len(),
        "enrichment stage complete"
    );
    let csv_text = export::render_records_csv(&next).map_err(&fail)?;
    state.sessions.replace(query.id(), next);
    Ok(csv_response(csv_text))
}

pub(super) async fn description_enrichment(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RunQuery>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    run_enrichment(
        state,
        req_id,
        query,
        multipart,
        "descriptions",
        enrich::apply_descriptions,
    )
    .await
}

pub(super) async fn category_enrichment(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RunQuery>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    run_enrichment(
        state,
        req_id,
        query,
        multipart,
        "categories",
        enrich::apply_categories,
    )
    .await
}

pub(super) async fn price_stock_enrichment(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RunQuery>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    run_enrichment(
        state,
        req_id,
        query,
        multipart,
        "price and stock",
        enrich::apply_price_stock,
    )
    .await
}

pub(super) async fn freight_enrichment(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RunQuery>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    run_enrichment(
        state,
        req_id,
        query,
        multipart,
        "freight",
        enrich::apply_freight,
    )
    .await
}

/// Stage 6: projects the working set against the reference export and
/// returns the importer-ready CSV. Reads the session without touching it,
/// so the export can be regenerated with corrected references.
pub(super) async fn export_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RunQuery>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let fail = |e: PipelineError| ApiError::from_pipeline(req_id.0.clone(), &e);

    let upload = read_upload(&mut multipart).await.map_err(&fail)?;
    let reference_text = String::from_utf8_lossy(&upload.bytes);
    let reference = ReferenceTable::from_csv(&reference_text).map_err(&fail)?;
    let records = state.sessions.records(query.id());
    let projected = export::project(&records, &reference).map_err(&fail)?;
    tracing::info!(
        run = query.id(),
        records = projected.len(),
        "export projection complete"
    );
    let csv_text = export::render_export_csv(&projected).map_err(&fail)?;
    Ok(attachment_response(csv_text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(filename: &str, len: usize) -> StageUpload {
        StageUpload {
            filename: filename.to_owned(),
            bytes: Bytes::from(vec![b'x'; len]),
        }
    }

    #[test]
    fn accepts_a_prefixed_xlsx_upload() {
        assert!(validate_identity_upload(&upload("skuimg-june.xlsx", 10), 100).is_ok());
    }

    #[test]
    fn extension_check_runs_before_prefix_check() {
        let err = validate_identity_upload(&upload("report.csv", 10), 100).unwrap_err();
        assert!(err.to_string().contains("XLSX"));
    }

    #[test]
    fn oversized_upload_is_rejected() {
        let err = validate_identity_upload(&upload("skuimg.xlsx", 101), 100).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn missing_prefix_gets_the_localized_message() {
        let err = validate_identity_upload(&upload("catalog.xlsx", 10), 100).unwrap_err();
        assert!(err.to_string().contains("ไฟล์ไม่ถูกต้อง"));
    }

    #[test]
    fn blank_run_query_falls_back_to_default() {
        let query = RunQuery {
            run: Some(String::new()),
        };
        assert_eq!(query.id(), "default");
        let query = RunQuery { run: None };
        assert_eq!(query.id(), "default");
        let query = RunQuery {
            run: Some("alice".to_owned()),
        };
        assert_eq!(query.id(), "alice");
    }
}
