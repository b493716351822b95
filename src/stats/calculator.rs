//! Statistics Calculator Module
//! Descriptive statistics, Pearson correlation, and value frequencies used
//! by the analysis dispatcher and the heatmap renderer.

use polars::prelude::*;
use rayon::prelude::*;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::data::records::{self, f64_to_json};

/// Handles statistical calculations with multi-threading support.
pub struct StatsCalculator;

impl StatsCalculator {
    /// Descriptive statistics for one numeric column, keyed and ordered the
    /// way a pandas `describe` record is: count, mean, std, min,
    /// percentiles, max. The median is always reported, even when the
    /// requested percentiles omit it.
    pub fn descriptive_stats(values: &[f64], percentiles: &[f64]) -> Map<String, Value> {
        let percentiles = Self::normalize_percentiles(percentiles);
        let n = values.len();
        let mut stats = Map::new();
        stats.insert("count".to_string(), f64_to_json(n as f64));

        if n == 0 {
            for key in ["mean", "std", "min"] {
                stats.insert(key.to_string(), Value::Null);
            }
            for p in &percentiles {
                stats.insert(Self::percentile_key(*p), Value::Null);
            }
            stats.insert("max".to_string(), Value::Null);
            return stats;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mean = values.iter().sum::<f64>() / n as f64;
        let std = if n > 1 {
            (values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
        } else {
            f64::NAN
        };

        stats.insert("mean".to_string(), f64_to_json(mean));
        stats.insert("std".to_string(), f64_to_json(std));
        stats.insert("min".to_string(), f64_to_json(sorted[0]));
        for p in percentiles {
            stats.insert(
                Self::percentile_key(p),
                f64_to_json(Self::percentile(&sorted, p * 100.0)),
            );
        }
        stats.insert("max".to_string(), f64_to_json(sorted[n - 1]));
        stats
    }

    /// Sort the requested percentiles and splice in the median when the
    /// caller leaves it out, matching what pandas `describe` reports.
    fn normalize_percentiles(percentiles: &[f64]) -> Vec<f64> {
        let mut out = percentiles.to_vec();
        if !out.iter().any(|p| (p - 0.5).abs() < 1e-9) {
            out.push(0.5);
        }
        out.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        out.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
        out
    }

    /// Percentile key in pandas notation: 0.25 -> "25%", 0.125 -> "12.5%".
    pub fn percentile_key(p: f64) -> String {
        let pct = p * 100.0;
        if (pct - pct.round()).abs() < 1e-9 {
            format!("{:.0}%", pct)
        } else {
            format!("{}%", pct)
        }
    }

    /// Calculate percentile using linear interpolation (NumPy compatible).
    pub fn percentile(sorted_values: &[f64], p: f64) -> f64 {
        let n = sorted_values.len();
        if n == 0 {
            return f64::NAN;
        }
        if n == 1 {
            return sorted_values[0];
        }

        let rank = (p / 100.0) * (n - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = (rank.ceil() as usize).min(n - 1);
        let frac = rank - lower as f64;

        if lower == upper {
            sorted_values[lower]
        } else {
            sorted_values[lower] * (1.0 - frac) + sorted_values[upper] * frac
        }
    }

    /// Pearson coefficient over pairwise-complete observations.
    pub fn pearson(a: &[Option<f64>], b: &[Option<f64>]) -> f64 {
        let pairs: Vec<(f64, f64)> = a
            .iter()
            .zip(b.iter())
            .filter_map(|(x, y)| match (x, y) {
                (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some((*x, *y)),
                _ => None,
            })
            .collect();

        let n = pairs.len();
        if n < 2 {
            return f64::NAN;
        }

        let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n as f64;
        let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n as f64;

        let mut cov = 0.0;
        let mut var_x = 0.0;
        let mut var_y = 0.0;
        for (x, y) in &pairs {
            let dx = x - mean_x;
            let dy = y - mean_y;
            cov += dx * dy;
            var_x += dx * dx;
            var_y += dy * dy;
        }

        let denom = (var_x * var_y).sqrt();
        if denom == 0.0 {
            f64::NAN
        } else {
            cov / denom
        }
    }

    /// Pairwise Pearson matrix over the numeric columns, rows computed in
    /// parallel. Returns the column names with the matrix in that order;
    /// empty names when the frame has no numeric columns.
    pub fn correlation_matrix(df: &DataFrame) -> PolarsResult<(Vec<String>, Vec<Vec<f64>>)> {
        let names = records::numeric_column_names(df);
        if names.is_empty() {
            return Ok((names, Vec::new()));
        }

        let mut series: HashMap<&str, Vec<Option<f64>>> = HashMap::new();
        for name in &names {
            let casted = df.column(name)?.cast(&DataType::Float64)?;
            series.insert(name.as_str(), casted.f64()?.into_iter().collect());
        }

        let matrix: Vec<Vec<f64>> = names
            .par_iter()
            .map(|row_name| {
                let row = &series[row_name.as_str()];
                names
                    .iter()
                    .map(|col_name| Self::pearson(row, &series[col_name.as_str()]))
                    .collect()
            })
            .collect();

        Ok((names, matrix))
    }

    /// Value frequencies for one column, ordered by descending count
    /// (first-seen order breaks ties). Nulls are not counted.
    pub fn value_counts(df: &DataFrame, name: &str) -> PolarsResult<Map<String, Value>> {
        let col = df.column(name)?;
        let mut order: Vec<String> = Vec::new();
        let mut counts: HashMap<String, u64> = HashMap::new();

        for i in 0..col.len() {
            let value = col.get(i)?;
            if value.is_null() {
                continue;
            }
            let key = value.to_string().trim_matches('"').to_string();
            if !counts.contains_key(&key) {
                order.push(key.clone());
            }
            *counts.entry(key).or_insert(0) += 1;
        }

        let mut sorted: Vec<(usize, String)> = order.into_iter().enumerate().collect();
        sorted.sort_by(|(ia, a), (ib, b)| counts[b].cmp(&counts[a]).then(ia.cmp(ib)));

        let mut result = Map::new();
        for (_, key) in sorted {
            let count = counts[&key];
            result.insert(key, Value::from(count));
        }
        Ok(result)
    }
}
