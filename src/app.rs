use anyhow::Context;
use axum::{
    Form, Json, Router,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::analysis::{AggregationRequest, DrillDown};
use crate::config::ServiceConfig;
use crate::error::IngestError;
use crate::state::AppState;

/// Multipart field carrying the uploaded dataset.
const UPLOAD_FIELD: &str = "data_file";

#[derive(Debug, Default, Deserialize)]
struct AnalyzeForm {
    column_select: Option<String>,
    reference_column_select: Option<String>,
    /// Accepted for compatibility with existing clients; aggregation does
    /// not depend on it.
    analysis_type: Option<String>,
    /// JSON object, e.g. `{"month": "Jan", "year": "2024"}`.
    drill_down: Option<String>,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/get_columns", post(get_columns))
        .route("/analyze", post(analyze))
        .route("/task_status/:task_id", get(task_status))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

pub async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config);
    let app = router(state, config.max_upload_bytes);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    log::info!(
        "Listening on http://{} (dataset: {})",
        config.bind_addr,
        config.dataset_store().path().display()
    );
    axum::serve(listener, app).await?;

    Ok(())
}

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "error": message.to_string() }))).into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Store an uploaded dataset and report its columns.
async fn get_columns(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut upload = None;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some(UPLOAD_FIELD) {
                    continue;
                }
                let file_name = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(bytes) => upload = Some((file_name, bytes)),
                    Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
                }
            }
            Ok(None) => break,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
        }
    }

    let Some((file_name, bytes)) = upload else {
        return error_response(StatusCode::BAD_REQUEST, IngestError::MissingFile);
    };

    let ingest = tokio::task::spawn_blocking(move || state.ingest(&file_name, &bytes)).await;
    match ingest {
        Ok(Ok(columns)) => Json(json!({ "columns": columns })).into_response(),
        Ok(Err(e @ IngestError::Io(_))) => {
            log::error!("Error in get_columns: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
        Ok(Err(e)) => {
            log::warn!("Rejected upload: {e}");
            error_response(StatusCode::BAD_REQUEST, e)
        }
        Err(e) => {
            log::error!("Upload worker crashed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Upload failed")
        }
    }
}

/// Read the analysis form. Browsers posting `FormData` send multipart;
/// other clients may send it urlencoded.
async fn read_analyze_form(request: Request) -> Result<AnalyzeForm, Response> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if !is_multipart {
        return match Form::<AnalyzeForm>::from_request(request, &()).await {
            Ok(Form(form)) => Ok(form),
            Err(rejection) => Err(error_response(rejection.status(), rejection.body_text())),
        };
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|rejection| error_response(rejection.status(), rejection.body_text()))?;
    let mut form = AnalyzeForm::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(error_response(StatusCode::BAD_REQUEST, e)),
        };
        let name = field.name().unwrap_or_default().to_string();
        let value = field
            .text()
            .await
            .map_err(|e| error_response(StatusCode::BAD_REQUEST, e))?;
        match name.as_str() {
            "column_select" => form.column_select = Some(value),
            "reference_column_select" => form.reference_column_select = Some(value),
            "analysis_type" => form.analysis_type = Some(value),
            "drill_down" => form.drill_down = Some(value),
            _ => {}
        }
    }
    Ok(form)
}

/// Queue an aggregation and return its task id.
async fn analyze(State(state): State<AppState>, request: Request) -> Response {
    let form = match read_analyze_form(request).await {
        Ok(form) => form,
        Err(response) => return response,
    };

    let Some(column) = form.column_select.filter(|c| !c.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "No column selected");
    };

    let mut request = AggregationRequest::new(column);
    if let Some(reference) = form.reference_column_select.filter(|c| !c.is_empty()) {
        request = request.with_reference(reference);
    }
    if let Some(raw) = form.drill_down.filter(|d| !d.trim().is_empty()) {
        match serde_json::from_str::<DrillDown>(&raw) {
            Ok(drill_down) => request = request.with_drill_down(drill_down),
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, format!("Invalid drill_down: {e}"));
            }
        }
    }
    if let Some(kind) = form.analysis_type {
        log::debug!("analysis_type={kind} (ignored)");
    }

    let task_id = state.jobs.submit(request);
    Json(json!({ "task_id": task_id })).into_response()
}

/// Report the state of a queued aggregation.
async fn task_status(State(state): State<AppState>, Path(task_id): Path<String>) -> Response {
    let status = Uuid::parse_str(&task_id)
        .ok()
        .and_then(|id| state.jobs.status(&id));
    match status {
        Some(status) => Json(status).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Unknown task id {task_id}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::Request as HttpRequest;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    const BOUNDARY: &str = "rusty-sales-boundary";

    fn app(dir: &std::path::Path) -> Router {
        let config = ServiceConfig {
            upload_dir: dir.to_path_buf(),
            ..ServiceConfig::default()
        };
        router(AppState::from_config(&config), config.max_upload_bytes)
    }

    /// `(field, file name, content)` parts, as a browser `FormData` sends them.
    fn multipart_request(uri: &str, parts: &[(&str, Option<&str>, &str)]) -> HttpRequest<Body> {
        let mut body = String::new();
        for (field, file_name, content) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match file_name {
                Some(file_name) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{field}\"\r\n\r\n"
                )),
            }
            body.push_str(&format!("{content}\r\n"));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        HttpRequest::post(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn upload_request(field: &str, file_name: &str, content: &str) -> HttpRequest<Body> {
        multipart_request("/get_columns", &[(field, Some(file_name), content)])
    }

    fn urlencoded_request(uri: &str, body: &str) -> HttpRequest<Body> {
        HttpRequest::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Poll `/task_status` until the job leaves PENDING.
    async fn finished_status(app: &Router, task_id: &str) -> Value {
        for _ in 0..200 {
            let response = app
                .clone()
                .oneshot(
                    HttpRequest::get(format!("/task_status/{task_id}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let status = json_body(response).await;
            if status["state"] != "PENDING" {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {task_id} never finished");
    }

    async fn upload_sales(app: &Router) {
        let response = app
            .clone()
            .oneshot(upload_request(
                UPLOAD_FIELD,
                "sales.csv",
                "date,amount\n2024-01-05,10\n2024-01-20,20\n2024-02-03,5\n",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn upload_returns_normalized_columns() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(upload_request(
                UPLOAD_FIELD,
                "sales.csv",
                "date,amount\n2024-01-05,10\n",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"columns": ["Date", "amount"]}));
        assert!(dir.path().join("sales_data.csv").exists());
    }

    #[tokio::test]
    async fn upload_without_file_field() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(upload_request("other", "sales.csv", "a\n1\n"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await, json!({"error": "No file part"}));
    }

    #[tokio::test]
    async fn upload_rejects_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(upload_request(UPLOAD_FIELD, "notes.txt", "hello"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["error"],
            "Only CSV, XLSX, JSON and Parquet files are supported."
        );
    }

    #[tokio::test]
    async fn multipart_analyze_runs_to_success() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        upload_sales(&app).await;

        let response = app
            .clone()
            .oneshot(multipart_request(
                "/analyze",
                &[
                    ("column_select", None, "amount"),
                    ("reference_column_select", None, "Date"),
                    ("analysis_type", None, "mean"),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let task_id = body["task_id"].as_str().unwrap().to_string();

        let status = finished_status(&app, &task_id).await;
        assert_eq!(status["state"], "SUCCESS");
        let mean_value = status["result"]["result"]["value"].as_f64().unwrap();
        assert!((mean_value - 35.0 / 3.0).abs() < 1e-9);
        assert_eq!(
            status["result"]["chart_data"],
            json!({"labels": ["Jan 2024", "Feb 2024"], "values": [15.0, 5.0], "label": "Data"})
        );
    }

    #[tokio::test]
    async fn multipart_drill_down_sums_days() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        upload_sales(&app).await;

        let response = app
            .clone()
            .oneshot(multipart_request(
                "/analyze",
                &[
                    ("column_select", None, "amount"),
                    ("reference_column_select", None, "Date"),
                    ("drill_down", None, r#"{"month": "Jan", "year": "2024"}"#),
                ],
            ))
            .await
            .unwrap();
        let task_id = json_body(response).await["task_id"]
            .as_str()
            .unwrap()
            .to_string();

        let status = finished_status(&app, &task_id).await;
        assert_eq!(status["state"], "SUCCESS");
        assert_eq!(
            status["result"]["chart_data"]["labels"],
            json!(["2024-01-05", "2024-01-20"])
        );
        assert_eq!(status["result"]["chart_data"]["label"], "Day-wise Data");
    }

    #[tokio::test]
    async fn urlencoded_analyze_still_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        upload_sales(&app).await;

        let response = app
            .clone()
            .oneshot(urlencoded_request(
                "/analyze",
                "column_select=amount&reference_column_select=",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let task_id = json_body(response).await["task_id"]
            .as_str()
            .unwrap()
            .to_string();

        let status = finished_status(&app, &task_id).await;
        assert_eq!(status["state"], "SUCCESS");
        assert_eq!(status["result"]["chart_data"]["labels"], json!(["0", "1", "2"]));
    }

    #[tokio::test]
    async fn analyze_unsupported_body_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(
                HttpRequest::post("/analyze")
                    .header(header::CONTENT_TYPE, "text/plain")
                    .body(Body::from("column_select=amount"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn analyze_requires_a_column() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(urlencoded_request("/analyze", "analysis_type=mean"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn analyze_rejects_malformed_drill_down() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(urlencoded_request(
                "/analyze",
                "column_select=amount&drill_down=%7Bnope",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().starts_with("Invalid drill_down"));
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(
                HttpRequest::get("/task_status/not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            json_body(response).await,
            json!({"error": "Unknown task id not-a-uuid"})
        );
    }
}
