mod stages;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use lazwoo_core::{AppConfig, PipelineError, SessionStore};

use crate::decode::WorkbookDecoder;
use crate::middleware::{request_id, RequestId};

/// Extra room for multipart framing on top of the upload ceiling.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub decoder: Arc<dyn WorkbookDecoder>,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }

    /// Maps the pipeline taxonomy onto the HTTP error envelope.
    pub fn from_pipeline(request_id: impl Into<String>, error: &PipelineError) -> Self {
        let code = match error {
            PipelineError::Validation(_) => "validation_error",
            PipelineError::State { .. } => "conflict",
            PipelineError::Parse { .. } => "bad_request",
            PipelineError::Synthesis { .. } | PipelineError::Render(_) => {
                tracing::error!(%error, "stage failed with an internal error");
                "internal_error"
            }
        };
        Self::new(request_id, code, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

fn build_cors(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Builds the stage-invocation surface. The six stage routes must be
/// called in order exactly once each per catalog run.
pub fn build_app(state: AppState, config: &AppConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/skuimg", post(stages::identity_discovery))
        .route("/basic", post(stages::description_enrichment))
        .route("/attribute", post(stages::category_enrichment))
        .route("/pricestock", post(stages::price_stock_enrichment))
        .route("/freight", post(stages::freight_enrichment))
        .route("/wc-product-export", post(stages::export_products))
        .layer(DefaultBodyLimit::max(
            state.max_upload_bytes + MULTIPART_OVERHEAD_BYTES,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors(config))
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
}

async fn health(Extension(req_id): Extension<RequestId>) -> impl IntoResponse {
    #[derive(Debug, Serialize)]
    struct HealthResponse {
        data: HealthData,
        meta: ResponseMeta,
    }
    Json(HealthResponse {
        data: HealthData { status: "ok" },
        meta: ResponseMeta::new(req_id.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DelimitedDecoder;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_config() -> AppConfig {
        AppConfig {
            bind_addr: "127.0.0.1:0".parse().expect("addr"),
            log_level: "info".to_string(),
            allowed_origins: vec!["http://localhost:5173".to_string()],
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }

    fn test_app() -> Router {
        let state = AppState {
            sessions: Arc::new(SessionStore::new()),
            decoder: Arc::new(DelimitedDecoder),
            max_upload_bytes: test_config().max_upload_bytes,
        };
        build_app(state, &test_config())
    }

    fn multipart_request(uri: &str, filename: &str, content: &str) -> Request<Body> {
        let boundary = "lazwoo-test-boundary";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"upload\"; filename=\"{filename}\"\r\n\
             Content-Type: text/csv\r\n\r\n\
             {content}\r\n\
             --{boundary}--\r\n"
        );
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    /// Four banner rows, then data in the SKU-and-image layout (id at 0,
    /// name at 2, first image at 7, SKU at 15, option label at 16).
    fn skuimg_csv() -> String {
        let filler = ",,,,,,,,,,,,,,,,\n".repeat(4);
        let row = |id: &str, name: &str, image: &str, sku: &str, option: &str| {
            let mut cells = vec![String::new(); 17];
            cells[0] = id.to_string();
            cells[2] = name.to_string();
            cells[7] = image.to_string();
            cells[15] = sku.to_string();
            cells[16] = option.to_string();
            cells.join(",")
        };
        format!(
            "{filler}{}\n{}\n{}\n",
            row("P1", "Drill", "red.jpg", "P1-R", "Red"),
            row("P1", "Drill", "blue.jpg", "P1-B", "Blue"),
            row("P2", "Lamp", "lamp.jpg", "P2-A", ""),
        )
    }

    /// Price/stock layout: sale price at 7, regular price at 10, SKU at
    /// 11, five warehouse stock columns at 12..17.
    fn pricestock_csv() -> String {
        let filler = ",,,,,,,,,,,,,,,,\n".repeat(4);
        let mut cells = vec![String::new(); 17];
        cells[7] = "80".to_string();
        cells[10] = "100".to_string();
        cells[11] = "P1-R".to_string();
        cells[12] = "1".to_string();
        cells[13] = "2".to_string();
        cells[14] = "x".to_string();
        cells[15] = "0".to_string();
        cells[16] = "1".to_string();
        format!("{filler}{}\n", cells.join(","))
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        String::from_utf8_lossy(&bytes).into_owned()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json parse")
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("\"status\":\"ok\""));
    }

    #[tokio::test]
    async fn stage_order_violation_returns_conflict() {
        let response = test_app()
            .oneshot(multipart_request(
                "/pricestock",
                "pricestock.xlsx",
                &pricestock_csv(),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "conflict");
        assert!(json["error"]["message"]
            .as_str()
            .expect("message string")
            .contains("identity discovery"));
        assert!(json["meta"]["request_id"].is_string());
    }

    #[tokio::test]
    async fn identity_rejects_wrong_filename_prefix_with_localized_message() {
        let response = test_app()
            .oneshot(multipart_request("/skuimg", "products.xlsx", &skuimg_csv()))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "validation_error");
        let message = json["error"]["message"].as_str().expect("message string");
        assert!(message.contains("skuimg"), "message names the expected prefix");
        assert!(message.contains("ไฟล์ไม่ถูกต้อง"), "message stays localized");
    }

    #[tokio::test]
    async fn identity_rejects_wrong_extension() {
        let response = test_app()
            .oneshot(multipart_request("/skuimg", "skuimg.csv", &skuimg_csv()))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_string(response).await;
        assert!(body.contains("XLSX"));
    }

    #[tokio::test]
    async fn identity_rejects_missing_upload_field() {
        let boundary = "lazwoo-test-boundary";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"other\"\r\n\r\n\
             hello\r\n\
             --{boundary}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri("/skuimg")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .expect("request");
        let response = test_app().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_string(response).await;
        assert!(body.contains("No file uploaded"));
    }

    #[tokio::test]
    async fn identity_returns_intermediate_record_csv() {
        let response = test_app()
            .oneshot(multipart_request(
                "/skuimg",
                "skuimg-2024.xlsx",
                &skuimg_csv(),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("text/csv; charset=utf-8")
        );
        let body = body_string(response).await;
        assert!(body.starts_with("ID,type,SKU,Name"));
        assert!(body.contains("Drill - Red"));
        assert!(body.contains("Drill - Blue"));
        assert!(body.contains("variable"));
    }

    #[tokio::test]
    async fn runs_are_isolated_by_run_id() {
        let app = test_app();
        let response = app
            .clone()
            .oneshot(multipart_request(
                "/skuimg?run=alice",
                "skuimg.xlsx",
                &skuimg_csv(),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        // Bob's run has no identity output yet.
        let response = app
            .oneshot(multipart_request(
                "/pricestock?run=bob",
                "pricestock.xlsx",
                &pricestock_csv(),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn full_run_flows_from_identity_to_export() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(multipart_request(
                "/skuimg?run=it",
                "skuimg.xlsx",
                &skuimg_csv(),
            ))
            .await
            .expect("skuimg response");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(multipart_request(
                "/pricestock?run=it",
                "pricestock.xlsx",
                &pricestock_csv(),
            ))
            .await
            .expect("pricestock response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        // Stock columns [1,2,x,0,1] sum to 4.
        assert!(body.contains("P1-R"));
        assert!(body.contains(",4,"));

        let reference = "Name,Type,SKU,Attribute 1 name,Meta: lazada_product_id\n\
                         Drill,variable,WOO-DRILL,Color,P1\n";
        let response = app
            .oneshot(multipart_request(
                "/wc-product-export?run=it",
                "wc-product-export.csv",
                reference,
            ))
            .await
            .expect("export response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok()),
            Some("attachment; filename=\"update_products_woocommerce.csv\"")
        );
        let body = body_string(response).await;
        let header_line = body.lines().next().expect("header line");
        assert!(header_line.contains("Swatches Attributes"));
        assert!(header_line.contains("Meta: lazada_product_id"));
        assert!(body.contains("WOO-DRILL"));
        assert!(body.contains("Drill - Red"));
        // Groups flush in reverse discovery order: Lamp's group before Drill's.
        let lamp_at = body.find("Lamp").expect("lamp row");
        let drill_at = body.find("Drill").expect("drill row");
        assert!(lamp_at < drill_at);
    }
}
