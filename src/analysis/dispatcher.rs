//! Analysis Dispatcher
//! Parses a JSON operation request, loads the staged dataset, and executes
//! exactly one tabular operation against it.

use log::debug;
use polars::prelude::*;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::analysis::filter;
use crate::data::{read_staged, records};
use crate::error::AnalysisError;
use crate::session::Session;
use crate::stats::StatsCalculator;

const DEFAULT_PERCENTILES: [f64; 3] = [0.25, 0.5, 0.75];
const DEFAULT_QUERY_LIMIT: usize = 10;

/// Raw request envelope: `{"operation": ..., "parameters": {...}}`.
#[derive(Debug, Deserialize)]
struct OperationRequest {
    operation: Option<String>,
    #[serde(default)]
    parameters: Map<String, Value>,
}

/// The closed set of supported operations, with parameters already
/// validated. Unknown kinds never reach execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Describe { percentiles: Vec<f64> },
    Correlation,
    GroupBy { columns: Vec<String>, aggregation: String },
    Query { filter: String, limit: usize },
    Summary,
    Custom { code: String },
}

impl Operation {
    fn from_request(name: &str, params: &Map<String, Value>) -> Result<Self, AnalysisError> {
        match name {
            "describe" => {
                let percentiles = match params.get("percentiles") {
                    Some(v) => serde_json::from_value(v.clone())?,
                    None => DEFAULT_PERCENTILES.to_vec(),
                };
                Ok(Operation::Describe { percentiles })
            }
            "correlation" => Ok(Operation::Correlation),
            "groupby" => {
                // A single string column is treated as a one-element list.
                let columns = match params.get("columns") {
                    Some(Value::String(s)) => vec![s.clone()],
                    Some(Value::Array(_)) => {
                        serde_json::from_value(params["columns"].clone())?
                    }
                    Some(other) => {
                        return Err(AnalysisError::Execution(format!(
                            "'columns' must be a string or list of strings, got {other}"
                        )))
                    }
                    None => {
                        return Err(AnalysisError::MissingParameter {
                            name: "columns",
                            operation: "groupby",
                        })
                    }
                };
                let aggregation = match params.get("aggregation") {
                    Some(v) => serde_json::from_value(v.clone())?,
                    None => "mean".to_string(),
                };
                Ok(Operation::GroupBy {
                    columns,
                    aggregation,
                })
            }
            "query" => {
                let filter = match params.get("filter") {
                    Some(v) => serde_json::from_value(v.clone())?,
                    None => {
                        return Err(AnalysisError::MissingParameter {
                            name: "filter",
                            operation: "query",
                        })
                    }
                };
                let limit = match params.get("limit") {
                    Some(v) => serde_json::from_value(v.clone())?,
                    None => DEFAULT_QUERY_LIMIT,
                };
                Ok(Operation::Query { filter, limit })
            }
            "summary" => Ok(Operation::Summary),
            "custom" => {
                let code = match params.get("code") {
                    Some(v) => serde_json::from_value(v.clone())?,
                    None => {
                        return Err(AnalysisError::MissingParameter {
                            name: "code",
                            operation: "custom",
                        })
                    }
                };
                Ok(Operation::Custom { code })
            }
            other => Err(AnalysisError::UnsupportedOperation(other.to_string())),
        }
    }
}

/// Executes one operation per call against the staged dataset.
pub struct AnalysisDispatcher;

impl AnalysisDispatcher {
    /// String-compat entry point: result JSON on success, diagnostic text
    /// on failure.
    pub fn run(session: &Session, request_json: &str) -> String {
        match Self::analyze(session, request_json) {
            Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|e| e.to_string()),
            Err(e) => e.to_string(),
        }
    }

    /// Parse and execute one operation request.
    pub fn analyze(session: &Session, request_json: &str) -> Result<Value, AnalysisError> {
        let request: OperationRequest = serde_json::from_str(request_json)?;
        let name = request
            .operation
            .ok_or_else(|| AnalysisError::UnsupportedOperation("none".to_string()))?;
        let operation = Operation::from_request(&name, &request.parameters)?;

        let temp_path = request
            .parameters
            .get("temp_path")
            .and_then(Value::as_str);
        let staging = session.resolve(temp_path);
        if !staging.exists() {
            return Err(AnalysisError::StagingMissing(staging));
        }

        debug!("executing {name} against {}", staging.display());
        let df = read_staged(&staging)?;
        Self::execute(&df, &operation)
    }

    /// Execute a validated operation against a loaded frame.
    pub fn execute(df: &DataFrame, operation: &Operation) -> Result<Value, AnalysisError> {
        match operation {
            Operation::Describe { percentiles } => Self::describe(df, percentiles),
            Operation::Correlation => Self::correlation(df),
            Operation::GroupBy {
                columns,
                aggregation,
            } => Self::group_by(df, columns, aggregation),
            Operation::Query { filter, limit } => Self::query(df, filter, *limit),
            Operation::Summary => Self::summary(df),
            Operation::Custom { code } => Self::custom(df, code),
        }
    }

    /// Per-numeric-column descriptive statistics.
    fn describe(df: &DataFrame, percentiles: &[f64]) -> Result<Value, AnalysisError> {
        let mut result = Map::new();
        for name in records::numeric_column_names(df) {
            let values = records::column_values(df, &name)?;
            result.insert(
                name,
                Value::Object(StatsCalculator::descriptive_stats(&values, percentiles)),
            );
        }
        Ok(Value::Object(result))
    }

    /// Pairwise Pearson correlation over numeric columns only.
    fn correlation(df: &DataFrame) -> Result<Value, AnalysisError> {
        let (names, matrix) = StatsCalculator::correlation_matrix(df)?;
        if names.is_empty() {
            return Err(AnalysisError::NoNumericColumns);
        }

        let mut result = Map::new();
        for (i, row_name) in names.iter().enumerate() {
            let mut row = Map::new();
            for (j, col_name) in names.iter().enumerate() {
                row.insert(col_name.clone(), records::f64_to_json(matrix[i][j]));
            }
            result.insert(row_name.clone(), Value::Object(row));
        }
        Ok(Value::Object(result))
    }

    /// Group by the key columns and aggregate every other numeric column,
    /// one output row per group, ordered by key.
    fn group_by(
        df: &DataFrame,
        columns: &[String],
        aggregation: &str,
    ) -> Result<Value, AnalysisError> {
        let keys: Vec<Expr> = columns.iter().map(|c| col(c.as_str())).collect();
        let agg_targets: Vec<String> = records::numeric_column_names(df)
            .into_iter()
            .filter(|name| !columns.contains(name))
            .collect();
        let aggs: Vec<Expr> = agg_targets
            .iter()
            .map(|name| Self::agg_expr(col(name.as_str()), aggregation))
            .collect::<Result<_, _>>()?;

        let grouped = df
            .clone()
            .lazy()
            .group_by_stable(keys.clone())
            .agg(aggs)
            .sort_by_exprs(keys, SortMultipleOptions::default())
            .collect()?;

        Ok(Value::Array(records::head_records(
            &grouped,
            grouped.height(),
        )?))
    }

    fn agg_expr(target: Expr, aggregation: &str) -> Result<Expr, AnalysisError> {
        match aggregation {
            "mean" => Ok(target.mean()),
            "sum" => Ok(target.sum()),
            "min" => Ok(target.min()),
            "max" => Ok(target.max()),
            "median" => Ok(target.median()),
            "std" => Ok(target.std(1)),
            "count" => Ok(target.count()),
            other => Err(AnalysisError::Execution(format!(
                "unsupported aggregation '{other}'"
            ))),
        }
    }

    /// Filter rows; report the filtered shape and up to `limit` rows.
    fn query(df: &DataFrame, filter: &str, limit: usize) -> Result<Value, AnalysisError> {
        let predicate = filter::parse(filter)?;
        let filtered = df.clone().lazy().filter(predicate).collect()?;
        Ok(json!({
            "shape": [filtered.height(), filtered.width()],
            "data": records::head_records(&filtered, limit)?,
        }))
    }

    /// Composite summary: shape, dtypes, missing counts, numeric describe,
    /// and value frequencies per non-numeric column.
    fn summary(df: &DataFrame) -> Result<Value, AnalysisError> {
        let mut categorical = Map::new();
        for col in df.get_columns() {
            if col.dtype() == &DataType::String {
                categorical.insert(
                    col.name().to_string(),
                    Value::Object(StatsCalculator::value_counts(df, col.name())?),
                );
            }
        }

        Ok(json!({
            "shape": [df.height(), df.width()],
            "dtypes": records::dtype_map(df),
            "missing_values": records::null_count_map(df),
            "numeric_summary": Self::describe(df, &DEFAULT_PERCENTILES)?,
            "categorical_summary": categorical,
        }))
    }

    /// Evaluate a whitelisted expression against the staged frame. A 1x1
    /// result collapses to a scalar; anything else returns the column
    /// values.
    fn custom(df: &DataFrame, code: &str) -> Result<Value, AnalysisError> {
        let expr = filter::parse(code)?;
        let result = df
            .clone()
            .lazy()
            .select([expr.alias("result")])
            .collect()?;

        let column = result.column("result")?;
        if result.height() == 1 {
            return Ok(records::any_value_to_json(&column.get(0)?));
        }

        let values: Vec<Value> = (0..column.len())
            .map(|i| column.get(i).map(|v| records::any_value_to_json(&v)))
            .collect::<PolarsResult<_>>()?;
        Ok(Value::Array(values))
    }
}
