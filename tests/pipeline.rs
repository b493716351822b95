//! End-to-end pipeline tests: load -> stage -> analyze / visualize.

use std::fs;
use std::path::Path;

use datadesk::data::read_staged;
use datadesk::{AnalysisDispatcher, ChartRenderer, DatasetLoader, Session};
use serde_json::{json, Value};
use tempfile::TempDir;

fn write_csv(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

fn session_in(dir: &TempDir) -> Session {
    Session::new(dir.path().join("temp_dataframe.csv"))
}

const PEOPLE_CSV: &str = "\
name,age,salary,city
alice,30,50000,NYC
bob,25,42000,LA
carol,35,61000,NYC
dave,28,47000,SF
erin,41,72000,NYC
frank,33,55000,LA
";

#[test]
fn load_reports_shape_columns_and_samples() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(dir.path(), "people.csv", PEOPLE_CSV);
    let session = session_in(&dir);

    let summary = DatasetLoader::load(&session, &source).unwrap();
    assert_eq!(summary.shape, (6, 4));
    assert_eq!(summary.columns, vec!["name", "age", "salary", "city"]);
    assert_eq!(summary.sample_data.len(), 5);
    assert_eq!(summary.missing_values["age"], json!(0));

    // No duplicate column names.
    let mut deduped = summary.columns.clone();
    deduped.dedup();
    assert_eq!(deduped, summary.columns);
}

#[test]
fn staging_round_trip_preserves_rows_and_columns() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(dir.path(), "people.csv", PEOPLE_CSV);
    let session = session_in(&dir);

    let summary = DatasetLoader::load(&session, &source).unwrap();
    let staged = read_staged(session.staging_path()).unwrap();
    assert_eq!(staged.height(), summary.shape.0);
    let staged_columns: Vec<String> = staged
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(staged_columns, summary.columns);
}

#[test]
fn json_sources_load_like_csv() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("people.json");
    fs::write(
        &path,
        r#"[{"a": 1, "b": "x"}, {"a": 2, "b": "y"}, {"a": 3, "b": "z"}]"#,
    )
    .unwrap();
    let session = session_in(&dir);

    let summary = DatasetLoader::load(&session, &path.to_string_lossy()).unwrap();
    assert_eq!(summary.shape, (3, 2));
    assert_eq!(summary.columns, vec!["a", "b"]);
}

#[test]
fn loader_run_reports_unsupported_format_as_text() {
    let dir = TempDir::new().unwrap();
    let session = session_in(&dir);
    let output = DatasetLoader::run(&session, "data.parquet");
    assert_eq!(output, "Unsupported file format: parquet");
}

#[test]
fn describe_covers_numeric_columns_only() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(dir.path(), "people.csv", PEOPLE_CSV);
    let session = session_in(&dir);
    DatasetLoader::load(&session, &source).unwrap();

    let output = AnalysisDispatcher::run(&session, r#"{"operation": "describe"}"#);
    let result: Value = serde_json::from_str(&output).unwrap();
    let map = result.as_object().unwrap();
    assert!(map.contains_key("age"));
    assert!(map.contains_key("salary"));
    assert!(!map.contains_key("name"));
    assert!(!map.contains_key("city"));
    assert_eq!(result["age"]["count"], json!(6.0));
    assert!(result["age"].as_object().unwrap().contains_key("50%"));
}

#[test]
fn groupby_string_and_list_specs_are_identical() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(dir.path(), "people.csv", PEOPLE_CSV);
    let session = session_in(&dir);
    DatasetLoader::load(&session, &source).unwrap();

    let from_string = AnalysisDispatcher::run(
        &session,
        r#"{"operation": "groupby", "parameters": {"columns": "city"}}"#,
    );
    let from_list = AnalysisDispatcher::run(
        &session,
        r#"{"operation": "groupby", "parameters": {"columns": ["city"]}}"#,
    );
    assert_eq!(from_string, from_list);

    let rows: Value = serde_json::from_str(&from_list).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 3); // LA, NYC, SF
    assert_eq!(rows[0]["city"], json!("LA"));
    assert_eq!(rows[0]["age"], json!(29.0));
}

#[test]
fn query_limits_data_but_reports_filtered_shape() {
    let dir = TempDir::new().unwrap();
    let mut csv = String::from("n,tag\n");
    for i in 0..60 {
        csv.push_str(&format!("{i},t\n"));
    }
    let source = write_csv(dir.path(), "numbers.csv", &csv);
    let session = session_in(&dir);
    DatasetLoader::load(&session, &source).unwrap();

    let output = AnalysisDispatcher::run(
        &session,
        r#"{"operation": "query", "parameters": {"filter": "n >= 10", "limit": 10}}"#,
    );
    let result: Value = serde_json::from_str(&output).unwrap();
    assert_eq!(result["shape"], json!([50, 2]));
    assert_eq!(result["data"].as_array().unwrap().len(), 10);
}

#[test]
fn unknown_operation_is_named_in_the_diagnostic() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(dir.path(), "people.csv", PEOPLE_CSV);
    let session = session_in(&dir);
    DatasetLoader::load(&session, &source).unwrap();

    let output = AnalysisDispatcher::run(&session, r#"{"operation": "frobnicate"}"#);
    assert_eq!(output, "Error: Unsupported operation 'frobnicate'");
}

#[test]
fn analyze_before_load_reports_missing_staging() {
    let dir = TempDir::new().unwrap();
    let session = session_in(&dir);
    let output = AnalysisDispatcher::run(&session, r#"{"operation": "summary"}"#);
    assert!(output.starts_with("Error: Temporary DataFrame file not found at"));
}

#[test]
fn summary_is_a_composite_of_the_other_views() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(dir.path(), "people.csv", PEOPLE_CSV);
    let session = session_in(&dir);
    DatasetLoader::load(&session, &source).unwrap();

    let output = AnalysisDispatcher::run(&session, r#"{"operation": "summary"}"#);
    let result: Value = serde_json::from_str(&output).unwrap();
    assert_eq!(result["shape"], json!([6, 4]));
    assert_eq!(result["categorical_summary"]["city"]["NYC"], json!(3));
    assert!(result["numeric_summary"]
        .as_object()
        .unwrap()
        .contains_key("salary"));
}

#[test]
fn custom_expression_evaluates_against_staged_data() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(dir.path(), "people.csv", PEOPLE_CSV);
    let session = session_in(&dir);
    DatasetLoader::load(&session, &source).unwrap();

    let output = AnalysisDispatcher::run(
        &session,
        r#"{"operation": "custom", "parameters": {"code": "max(age) - min(age)"}}"#,
    );
    let result: Value = serde_json::from_str(&output).unwrap();
    // ages stage as integers, so the spread is an integer too
    assert_eq!(result, json!(16));
}

#[test]
fn custom_abs_expression_runs_against_staged_data() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(dir.path(), "people.csv", PEOPLE_CSV);
    let session = session_in(&dir);
    DatasetLoader::load(&session, &source).unwrap();

    let output = AnalysisDispatcher::run(
        &session,
        r#"{"operation": "custom", "parameters": {"code": "abs(age - 30)"}}"#,
    );
    let result: Value = serde_json::from_str(&output).unwrap();
    assert_eq!(result, json!([0.0, 5.0, 5.0, 2.0, 11.0, 3.0]));
}

#[test]
fn scatter_missing_y_names_the_parameter_and_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(dir.path(), "people.csv", PEOPLE_CSV);
    let session = session_in(&dir);
    DatasetLoader::load(&session, &source).unwrap();

    let save_path = dir.path().join("scatter.png");
    let request = json!({
        "plot_type": "scatter",
        "parameters": {"x": "age"},
        "save_path": save_path.to_string_lossy(),
    });
    let output = ChartRenderer::run(&session, &request.to_string());
    assert_eq!(
        output,
        "Error: 'x' and 'y' parameters required for scatter plot"
    );
    assert!(!save_path.exists());
}

#[test]
fn unknown_plot_type_is_named_and_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(dir.path(), "people.csv", PEOPLE_CSV);
    let session = session_in(&dir);
    DatasetLoader::load(&session, &source).unwrap();

    let save_path = dir.path().join("pie.png");
    let request = json!({
        "plot_type": "pie",
        "parameters": {},
        "save_path": save_path.to_string_lossy(),
    });
    let output = ChartRenderer::run(&session, &request.to_string());
    assert_eq!(output, "Error: Unsupported plot type 'pie'");
    assert!(!save_path.exists());
}

#[test]
fn histogram_renders_to_the_requested_path() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(dir.path(), "people.csv", PEOPLE_CSV);
    let session = session_in(&dir);
    DatasetLoader::load(&session, &source).unwrap();

    let save_path = dir.path().join("charts").join("age_hist.png");
    let request = json!({
        "plot_type": "histogram",
        "parameters": {"column": "age"},
        "save_path": save_path.to_string_lossy(),
    });
    let output = ChartRenderer::run(&session, &request.to_string());
    assert_eq!(
        output,
        format!("Visualization saved to {}", save_path.display())
    );
    assert!(save_path.exists());
}

#[test]
fn grouped_boxplot_renders_to_the_requested_path() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(dir.path(), "people.csv", PEOPLE_CSV);
    let session = session_in(&dir);
    DatasetLoader::load(&session, &source).unwrap();

    let save_path = dir.path().join("salary_box.png");
    let request = json!({
        "plot_type": "boxplot",
        "parameters": {"column": "salary", "group_by": "city"},
        "save_path": save_path.to_string_lossy(),
    });
    let output = ChartRenderer::run(&session, &request.to_string());
    assert_eq!(
        output,
        format!("Visualization saved to {}", save_path.display())
    );
    assert!(save_path.exists());
}

#[test]
fn correlation_heatmap_renders_from_numeric_columns() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(dir.path(), "people.csv", PEOPLE_CSV);
    let session = session_in(&dir);
    DatasetLoader::load(&session, &source).unwrap();

    let save_path = dir.path().join("corr.png");
    let request = json!({
        "plot_type": "correlation_heatmap",
        "parameters": {},
        "save_path": save_path.to_string_lossy(),
    });
    let output = ChartRenderer::run(&session, &request.to_string());
    assert!(output.starts_with("Visualization saved to"));
    assert!(save_path.exists());
}

#[test]
fn explicit_temp_path_overrides_the_session_staging() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(dir.path(), "people.csv", PEOPLE_CSV);

    // Stage into a custom location with one session, read it back from a
    // different session by passing temp_path.
    let custom = dir.path().join("custom_staging.csv");
    let staging_session = Session::new(&custom);
    DatasetLoader::load(&staging_session, &source).unwrap();

    let other_session = Session::new(dir.path().join("unused.csv"));
    let request = json!({
        "operation": "describe",
        "parameters": {"temp_path": custom.to_string_lossy()},
    });
    let output = AnalysisDispatcher::run(&other_session, &request.to_string());
    let result: Value = serde_json::from_str(&output).unwrap();
    assert!(result.as_object().unwrap().contains_key("age"));
}
