//! Upload a dataset, queue aggregations and read their results, the way an
//! HTTP client drives the service.

use rusty_sales::analysis::{AggregationRequest, AggregationResult, ChartSeries, DrillDown};
use rusty_sales::config::ServiceConfig;
use rusty_sales::jobs::JobStatus;
use rusty_sales::state::AppState;
use serde_json::json;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const SALES_JSON: &str = r#"{"sales": [
    {"date": "2024-01-05", "amount": 10, "region": "North"},
    {"date": "01/20/2024", "amount": 20, "region": "South"},
    {"date": "2024-02-03", "amount": 30, "region": "North"},
    {"date": "2024-02-03", "amount": 5, "region": null},
    {"date": "someday", "amount": 7, "region": "West"}
]}"#;

fn service(dir: &std::path::Path) -> AppState {
    AppState::from_config(&ServiceConfig {
        upload_dir: dir.to_path_buf(),
        ..ServiceConfig::default()
    })
}

async fn run(state: &AppState, request: AggregationRequest) -> AggregationResult {
    let id = state.jobs.submit(request);
    state.jobs.wait(&id).await.expect("job was evicted")
}

fn series(labels: &[&str], values: &[f64], name: &str) -> ChartSeries {
    ChartSeries {
        labels: labels.iter().map(|l| l.to_string()).collect(),
        values: values.to_vec(),
        series_name: name.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn analysis_before_upload_fails() {
    let dir = tempfile::tempdir().unwrap();
    let state = service(dir.path());

    let result = run(&state, AggregationRequest::new("amount")).await;
    assert_eq!(result, AggregationResult::failure("CSV file not found"));
}

#[tokio::test]
async fn json_upload_is_normalized() {
    let dir = tempfile::tempdir().unwrap();
    let state = service(dir.path());

    let columns = state.ingest("sales.json", SALES_JSON.as_bytes()).unwrap();
    assert_eq!(columns, vec!["Date", "amount", "region"]);
    assert!(state.store.path().exists());
}

#[tokio::test]
async fn monthly_then_day_wise() {
    let dir = tempfile::tempdir().unwrap();
    let state = service(dir.path());
    state.ingest("sales.json", SALES_JSON.as_bytes()).unwrap();

    let monthly = run(&state, AggregationRequest::new("amount").with_reference("Date")).await;
    assert_eq!(
        monthly,
        AggregationResult::success(
            16.25,
            series(&["Jan 2024", "Feb 2024"], &[15.0, 17.5], "Data")
        )
    );

    let daily = run(
        &state,
        AggregationRequest::new("amount")
            .with_reference("Date")
            .with_drill_down(DrillDown::new("feb", "2024")),
    )
    .await;
    assert_eq!(
        daily,
        AggregationResult::success(17.5, series(&["2024-02-03"], &[35.0], "Day-wise Data"))
    );

    let nothing = run(
        &state,
        AggregationRequest::new("amount")
            .with_reference("Date")
            .with_drill_down(DrillDown::new("Mar", "2024")),
    )
    .await;
    assert_eq!(nothing, AggregationResult::empty("No day-wise data for Mar 2024"));
}

#[tokio::test]
async fn categories_and_row_index() {
    let dir = tempfile::tempdir().unwrap();
    let state = service(dir.path());
    state.ingest("sales.json", SALES_JSON.as_bytes()).unwrap();

    let by_region = run(&state, AggregationRequest::new("amount").with_reference("region")).await;
    assert_eq!(
        by_region,
        AggregationResult::success(
            14.4,
            series(&["North", "South", "West"], &[20.0, 20.0, 7.0], "Data")
        )
    );

    let by_row = run(&state, AggregationRequest::new("amount")).await;
    assert_eq!(
        by_row,
        AggregationResult::success(
            14.4,
            series(&["0", "1", "2", "3", "4"], &[10.0, 20.0, 30.0, 5.0, 7.0], "Data")
        )
    );
}

#[tokio::test]
async fn missing_column_fails() {
    let dir = tempfile::tempdir().unwrap();
    let state = service(dir.path());
    state.ingest("sales.json", SALES_JSON.as_bytes()).unwrap();

    let result = run(&state, AggregationRequest::new("amount").with_reference("Month")).await;
    assert_eq!(
        result,
        AggregationResult::failure("Selected column 'Month' not found in data")
    );
}

#[tokio::test]
async fn repeated_runs_leave_the_dataset_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let state = service(dir.path());
    state.ingest("sales.json", SALES_JSON.as_bytes()).unwrap();
    let before = std::fs::read(state.store.path()).unwrap();

    let request = AggregationRequest::new("amount").with_reference("Date");
    let first = run(&state, request.clone()).await;
    let second = run(&state, request).await;

    assert_eq!(first, second);
    assert_eq!(std::fs::read(state.store.path()).unwrap(), before);
}

#[tokio::test]
async fn finished_job_status_payload() {
    let dir = tempfile::tempdir().unwrap();
    let state = service(dir.path());
    state
        .ingest("sales.csv", b"region,amount\nNorth,4\nNorth,6\n")
        .unwrap();

    let id = state
        .jobs
        .submit(AggregationRequest::new("amount").with_reference("region"));
    state.jobs.wait(&id).await.unwrap();

    let status = state.jobs.status(&id).unwrap();
    assert!(matches!(status, JobStatus::Finished(_)));
    assert_eq!(
        serde_json::to_value(status).unwrap(),
        json!({
            "state": "SUCCESS",
            "result": {
                "state": "SUCCESS",
                "result": {"value": 5.0},
                "chart_data": {"labels": ["North"], "values": [5.0], "label": "Data"}
            }
        })
    );
}
