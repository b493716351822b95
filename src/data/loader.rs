//! Dataset Loader
//! Ingests csv/xls/xlsx/json files, stages them as a canonical CSV, and
//! reports a structural summary of the staged dataset.

use std::fs::File;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader as _};
use log::info;
use polars::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::data::records;
use crate::error::LoaderError;
use crate::session::Session;

/// Number of sample rows included in the summary.
const SAMPLE_ROWS: usize = 5;

/// Structural summary of a freshly staged dataset.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub shape: (usize, usize),
    pub columns: Vec<String>,
    pub dtypes: Map<String, Value>,
    pub missing_values: Map<String, Value>,
    pub sample_data: Vec<Value>,
    pub file_path: String,
    pub temp_path: String,
}

/// Loads source files into a DataFrame and stages them for the dispatcher
/// and renderer.
pub struct DatasetLoader;

impl DatasetLoader {
    /// String-compat entry point: summary JSON on success, diagnostic text
    /// on failure.
    pub fn run(session: &Session, file_path: &str) -> String {
        match Self::load(session, file_path) {
            Ok(summary) => {
                serde_json::to_string_pretty(&summary).unwrap_or_else(|e| e.to_string())
            }
            Err(e) => e.to_string(),
        }
    }

    /// Load a source file, stage it at the session staging path, and
    /// summarize the result.
    pub fn load(session: &Session, file_path: &str) -> Result<DatasetSummary, LoaderError> {
        let df = Self::read_source(file_path)?;
        Self::stage(session, &df)?;
        info!(
            "staged {} ({} rows x {} cols) at {}",
            file_path,
            df.height(),
            df.width(),
            session.staging_path().display()
        );
        Self::summarize(session, file_path, &df)
    }

    /// Parse a source file into a DataFrame, dispatching on extension.
    pub fn read_source(file_path: &str) -> Result<DataFrame, LoaderError> {
        let ext = file_path
            .rsplit('.')
            .next()
            .unwrap_or(file_path)
            .to_lowercase();

        match ext.as_str() {
            "csv" => Ok(LazyCsvReader::new(file_path)
                .with_infer_schema_length(Some(10000))
                .with_ignore_errors(true)
                .finish()?
                .collect()?),
            "xls" | "xlsx" => Self::read_excel(file_path),
            "json" => {
                let file = File::open(file_path)?;
                Ok(JsonReader::new(file).finish()?)
            }
            _ => Err(LoaderError::UnsupportedFormat(ext)),
        }
    }

    /// Read the first worksheet of an Excel workbook. The first row is the
    /// header; a column is numeric when every non-empty cell is numeric.
    fn read_excel(file_path: &str) -> Result<DataFrame, LoaderError> {
        let mut workbook = open_workbook_auto(file_path)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| LoaderError::Load("workbook has no worksheets".to_string()))??;

        let mut rows = range.rows();
        let headers: Vec<String> = rows
            .next()
            .ok_or_else(|| LoaderError::Load("worksheet is empty".to_string()))?
            .iter()
            .map(|cell| cell.to_string())
            .collect();

        let body: Vec<&[Data]> = rows.collect();
        let mut columns = Vec::with_capacity(headers.len());

        for (idx, name) in headers.iter().enumerate() {
            let cells: Vec<&Data> = body
                .iter()
                .map(|row| row.get(idx).unwrap_or(&Data::Empty))
                .collect();

            let numeric = cells
                .iter()
                .all(|c| matches!(c, Data::Int(_) | Data::Float(_) | Data::Empty));

            let column = if numeric {
                let values: Vec<Option<f64>> = cells
                    .iter()
                    .map(|c| match c {
                        Data::Int(v) => Some(*v as f64),
                        Data::Float(v) => Some(*v),
                        _ => None,
                    })
                    .collect();
                Column::new(name.as_str().into(), values)
            } else {
                let values: Vec<Option<String>> = cells
                    .iter()
                    .map(|c| match c {
                        Data::Empty => None,
                        other => Some(other.to_string()),
                    })
                    .collect();
                Column::new(name.as_str().into(), values)
            };
            columns.push(column);
        }

        Ok(DataFrame::new(columns)?)
    }

    /// Serialize the DataFrame to the staging path, overwriting any prior
    /// staged dataset.
    fn stage(session: &Session, df: &DataFrame) -> Result<(), LoaderError> {
        let staging = session.staging_path();
        if let Some(parent) = staging.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = File::create(staging)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df.clone())?;
        Ok(())
    }

    fn summarize(
        session: &Session,
        file_path: &str,
        df: &DataFrame,
    ) -> Result<DatasetSummary, LoaderError> {
        let sample_data =
            records::head_records(df, SAMPLE_ROWS).map_err(|e| LoaderError::Load(e.to_string()))?;

        Ok(DatasetSummary {
            shape: (df.height(), df.width()),
            columns: df
                .get_column_names()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            dtypes: records::dtype_map(df),
            missing_values: records::null_count_map(df),
            sample_data,
            file_path: file_path.to_string(),
            temp_path: session.staging_path().to_string_lossy().into_owned(),
        })
    }
}

/// Read the staged CSV back into a DataFrame. The staging file is the only
/// hand-off between the loader and the downstream components.
pub fn read_staged(path: &Path) -> PolarsResult<DataFrame> {
    LazyCsvReader::new(path.to_path_buf())
        .with_infer_schema_length(Some(10000))
        .with_ignore_errors(true)
        .finish()?
        .collect()
}
