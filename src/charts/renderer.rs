//! Chart Renderer
//! Parses a JSON plot request, loads the staged dataset, and renders one of
//! six chart kinds to a PNG with plotters.

use std::path::{Path, PathBuf};

use log::debug;
use plotters::coord::Shift;
use plotters::prelude::*;
use polars::prelude::*;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::data::{read_staged, records};
use crate::error::VizError;
use crate::session::Session;
use crate::stats::StatsCalculator;

/// Default output file when the request does not name one.
pub const DEFAULT_SAVE_PATH: &str = "visualization.png";

/// Canvas size, matching the original 10x6 inch figure.
const CANVAS: (u32, u32) = (1000, 600);

/// Base series color.
const BASE_COLOR: RGBColor = RGBColor(52, 152, 219);

/// Color palette for hue grouping.
const PALETTE: [RGBColor; 10] = [
    RGBColor(231, 76, 60),   // Red
    RGBColor(46, 204, 113),  // Green
    RGBColor(155, 89, 182),  // Purple
    RGBColor(243, 156, 18),  // Orange
    RGBColor(26, 188, 156),  // Teal
    RGBColor(233, 30, 99),   // Pink
    RGBColor(0, 188, 212),   // Cyan
    RGBColor(255, 87, 34),   // Deep Orange
    RGBColor(121, 85, 72),   // Brown
    RGBColor(96, 125, 139),  // Blue Grey
];

/// Raw request envelope: `{"plot_type": ..., "parameters": {...},
/// "save_path": ...}`.
#[derive(Debug, Deserialize)]
struct PlotRequest {
    plot_type: Option<String>,
    #[serde(default)]
    parameters: Map<String, Value>,
    save_path: Option<String>,
}

/// The closed set of supported chart kinds, parameters validated before any
/// file is touched.
#[derive(Debug, Clone, PartialEq)]
pub enum PlotSpec {
    Histogram {
        column: String,
        kde: bool,
    },
    Scatter {
        x: String,
        y: String,
        hue: Option<String>,
    },
    Bar {
        x: String,
        y: String,
    },
    Line {
        x: String,
        y: String,
    },
    CorrelationHeatmap {
        show_values: bool,
    },
    Boxplot {
        column: String,
        group_by: Option<String>,
    },
}

impl PlotSpec {
    fn from_request(name: &str, params: &Map<String, Value>) -> Result<Self, VizError> {
        let string_param = |key: &str| params.get(key).and_then(Value::as_str).map(String::from);
        let require_xy = |plot: &'static str| -> Result<(String, String), VizError> {
            match (string_param("x"), string_param("y")) {
                (Some(x), Some(y)) => Ok((x, y)),
                _ => Err(VizError::MissingXy(plot)),
            }
        };

        match name {
            "histogram" => {
                let column = string_param("column").ok_or(VizError::MissingParameter {
                    name: "column",
                    plot: "histogram",
                })?;
                let kde = params.get("kde").and_then(Value::as_bool).unwrap_or(false);
                Ok(PlotSpec::Histogram { column, kde })
            }
            "scatter" => {
                let (x, y) = require_xy("scatter plot")?;
                Ok(PlotSpec::Scatter {
                    x,
                    y,
                    hue: string_param("hue"),
                })
            }
            "bar" => {
                let (x, y) = require_xy("bar chart")?;
                Ok(PlotSpec::Bar { x, y })
            }
            "line" => {
                let (x, y) = require_xy("line chart")?;
                Ok(PlotSpec::Line { x, y })
            }
            "correlation_heatmap" => Ok(PlotSpec::CorrelationHeatmap {
                show_values: params
                    .get("show_values")
                    .and_then(Value::as_bool)
                    .unwrap_or(true),
            }),
            "boxplot" => {
                let column = string_param("column").ok_or(VizError::MissingParameter {
                    name: "column",
                    plot: "boxplot",
                })?;
                Ok(PlotSpec::Boxplot {
                    column,
                    group_by: string_param("group_by"),
                })
            }
            other => Err(VizError::UnsupportedPlotType(other.to_string())),
        }
    }
}

/// Rotate bar category labels once the category count exceeds this many.
pub(crate) fn rotate_category_labels(n_categories: usize) -> bool {
    n_categories > 5
}

/// Renders one chart per call against the staged dataset.
pub struct ChartRenderer;

impl ChartRenderer {
    /// String-compat entry point: confirmation text on success, diagnostic
    /// text on failure.
    pub fn run(session: &Session, request_json: &str) -> String {
        match Self::visualize(session, request_json) {
            Ok(confirmation) => confirmation,
            Err(e) => e.to_string(),
        }
    }

    /// Parse and execute one plot request. Returns the confirmation string
    /// `Visualization saved to <path>`.
    pub fn visualize(session: &Session, request_json: &str) -> Result<String, VizError> {
        let request: PlotRequest = serde_json::from_str(request_json)?;
        let name = request
            .plot_type
            .ok_or_else(|| VizError::UnsupportedPlotType("none".to_string()))?;
        let spec = PlotSpec::from_request(&name, &request.parameters)?;

        let temp_path = request
            .parameters
            .get("temp_path")
            .and_then(Value::as_str);
        let staging = session.resolve(temp_path);
        if !staging.exists() {
            return Err(VizError::StagingMissing(staging));
        }
        let df = read_staged(&staging)?;

        let save_path = PathBuf::from(
            request
                .save_path
                .unwrap_or_else(|| DEFAULT_SAVE_PATH.to_string()),
        );
        debug!("rendering {name} to {}", save_path.display());
        Self::render(&df, &spec, &save_path)?;
        Ok(format!("Visualization saved to {}", save_path.display()))
    }

    /// Render a validated plot spec to `save_path`, creating intermediate
    /// directories as needed.
    pub fn render(df: &DataFrame, spec: &PlotSpec, save_path: &Path) -> Result<(), VizError> {
        if let Some(parent) = save_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let root = BitMapBackend::new(save_path, CANVAS).into_drawing_area();
        root.fill(&WHITE)?;

        match spec {
            PlotSpec::Histogram { column, kde } => Self::histogram(&root, df, column, *kde)?,
            PlotSpec::Scatter { x, y, hue } => Self::scatter(&root, df, x, y, hue.as_deref())?,
            PlotSpec::Bar { x, y } => Self::bar(&root, df, x, y)?,
            PlotSpec::Line { x, y } => Self::line(&root, df, x, y)?,
            PlotSpec::CorrelationHeatmap { show_values } => {
                Self::correlation_heatmap(&root, df, *show_values)?
            }
            PlotSpec::Boxplot { column, group_by } => {
                Self::boxplot(&root, df, column, group_by.as_deref())?
            }
        }

        root.present()?;
        Ok(())
    }

    fn histogram(
        root: &DrawingArea<BitMapBackend<'_>, Shift>,
        df: &DataFrame,
        column: &str,
        kde: bool,
    ) -> Result<(), VizError> {
        let values = Self::numeric_values(df, column)?;
        let (min, max) = Self::padded_range(values.iter().copied());

        // Sturges' rule
        let n_bins = ((values.len() as f64).log2().ceil() as usize + 1).max(1);
        let bin_width = (max - min) / n_bins as f64;
        let mut counts = vec![0usize; n_bins];
        for &v in &values {
            let idx = (((v - min) / bin_width) as usize).min(n_bins - 1);
            counts[idx] += 1;
        }
        let y_max = counts.iter().copied().max().unwrap_or(1) as f64 * 1.1;

        let mut chart = ChartBuilder::on(root)
            .caption(format!("Histogram of {column}"), ("sans-serif", 24))
            .margin(10)
            .x_label_area_size(45)
            .y_label_area_size(60)
            .build_cartesian_2d(min..max, 0f64..y_max)?;
        chart
            .configure_mesh()
            .x_desc(column)
            .y_desc("Frequency")
            .draw()?;

        chart.draw_series(counts.iter().enumerate().map(|(i, &count)| {
            let x0 = min + i as f64 * bin_width;
            Rectangle::new(
                [(x0, 0.0), (x0 + bin_width, count as f64)],
                BASE_COLOR.mix(0.6).filled(),
            )
        }))?;

        if kde {
            let curve = Self::kde_curve(&values, min, max, bin_width);
            if !curve.is_empty() {
                chart.draw_series(LineSeries::new(curve, PALETTE[0].stroke_width(2)))?;
            }
        }
        Ok(())
    }

    /// Gaussian kernel density estimate scaled to histogram counts.
    fn kde_curve(values: &[f64], min: f64, max: f64, bin_width: f64) -> Vec<(f64, f64)> {
        let n = values.len();
        if n < 2 {
            return Vec::new();
        }
        let mean = values.iter().sum::<f64>() / n as f64;
        let std =
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt();
        // Scott's rule
        let bandwidth = std * (n as f64).powf(-0.2);
        if bandwidth <= 0.0 || !bandwidth.is_finite() {
            return Vec::new();
        }

        let norm = 1.0 / (n as f64 * bandwidth * (2.0 * std::f64::consts::PI).sqrt());
        let scale = n as f64 * bin_width;
        let steps = 200;
        (0..=steps)
            .map(|i| {
                let x = min + (max - min) * i as f64 / steps as f64;
                let density: f64 = values
                    .iter()
                    .map(|v| (-0.5 * ((x - v) / bandwidth).powi(2)).exp())
                    .sum::<f64>()
                    * norm;
                (x, density * scale)
            })
            .collect()
    }

    fn scatter(
        root: &DrawingArea<BitMapBackend<'_>, Shift>,
        df: &DataFrame,
        x: &str,
        y: &str,
        hue: Option<&str>,
    ) -> Result<(), VizError> {
        let points = Self::xy_pairs(df, x, y)?;
        let (x_min, x_max) = Self::padded_range(points.iter().map(|p| p.0));
        let (y_min, y_max) = Self::padded_range(points.iter().map(|p| p.1));

        let mut chart = ChartBuilder::on(root)
            .caption(format!("Scatter Plot: {y} vs {x}"), ("sans-serif", 24))
            .margin(10)
            .x_label_area_size(45)
            .y_label_area_size(60)
            .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
        chart.configure_mesh().x_desc(x).y_desc(y).draw()?;

        // Group by hue only when the column actually exists.
        let hue = hue.filter(|h| df.column(h).is_ok());
        match hue {
            Some(hue_col) => {
                let labels = Self::string_values(df, hue_col)?;
                let xs = Self::optional_values(df, x)?;
                let ys = Self::optional_values(df, y)?;

                let mut groups: Vec<(String, Vec<(f64, f64)>)> = Vec::new();
                for ((label, px), py) in labels.into_iter().zip(xs).zip(ys) {
                    let (Some(label), Some(px), Some(py)) = (label, px, py) else {
                        continue;
                    };
                    match groups.iter_mut().find(|(name, _)| *name == label) {
                        Some((_, pts)) => pts.push((px, py)),
                        None => groups.push((label, vec![(px, py)])),
                    }
                }

                for (i, (label, pts)) in groups.iter().enumerate() {
                    let color = PALETTE[i % PALETTE.len()];
                    chart
                        .draw_series(
                            pts.iter()
                                .map(|&(px, py)| Circle::new((px, py), 3, color.filled())),
                        )?
                        .label(label.clone())
                        .legend(move |(lx, ly)| Circle::new((lx + 8, ly), 4, color.filled()));
                }
                chart
                    .configure_series_labels()
                    .border_style(BLACK)
                    .background_style(WHITE.mix(0.8))
                    .draw()?;
            }
            None => {
                chart.draw_series(
                    points
                        .iter()
                        .map(|&(px, py)| Circle::new((px, py), 3, BASE_COLOR.filled())),
                )?;
            }
        }
        Ok(())
    }

    fn bar(
        root: &DrawingArea<BitMapBackend<'_>, Shift>,
        df: &DataFrame,
        x: &str,
        y: &str,
    ) -> Result<(), VizError> {
        // Mean of y per category, categories in ascending order.
        let grouped = df
            .clone()
            .lazy()
            .group_by_stable([col(x)])
            .agg([col(y).mean()])
            .sort_by_exprs(vec![col(x)], SortMultipleOptions::default())
            .collect()?;

        let categories: Vec<String> = Self::string_values(&grouped, x)?
            .into_iter()
            .map(|v| v.unwrap_or_default())
            .collect();
        let means: Vec<f64> = Self::optional_values(&grouped, y)?
            .into_iter()
            .map(|v| v.unwrap_or(0.0))
            .collect();
        if categories.is_empty() {
            return Err(VizError::Render(format!("column '{x}' has no data")));
        }

        let y_low = means.iter().copied().fold(0.0f64, f64::min) * 1.1;
        let y_high = means.iter().copied().fold(0.0f64, f64::max) * 1.1;
        let (y_low, y_high) = if y_low == y_high {
            (y_low - 1.0, y_high + 1.0)
        } else {
            (y_low, y_high)
        };

        let mut builder = ChartBuilder::on(root);
        builder
            .caption(format!("Bar Chart: {y} by {x}"), ("sans-serif", 24))
            .margin(10)
            .x_label_area_size(if rotate_category_labels(categories.len()) {
                90
            } else {
                45
            })
            .y_label_area_size(60);
        let mut chart = builder.build_cartesian_2d(0..categories.len() as i32, y_low..y_high)?;

        let label_font = if rotate_category_labels(categories.len()) {
            ("sans-serif", 12)
                .into_font()
                .transform(FontTransform::Rotate90)
        } else {
            ("sans-serif", 12).into_font()
        };
        let names = categories.clone();
        chart
            .configure_mesh()
            .x_desc(x)
            .y_desc(y)
            .x_labels(categories.len())
            .x_label_style(label_font)
            .x_label_formatter(&move |idx: &i32| {
                names.get(*idx as usize).cloned().unwrap_or_default()
            })
            .draw()?;

        chart.draw_series(means.iter().enumerate().map(|(i, &mean)| {
            Rectangle::new(
                [(i as i32, 0.0), (i as i32 + 1, mean)],
                BASE_COLOR.mix(0.8).filled(),
            )
        }))?;
        Ok(())
    }

    fn line(
        root: &DrawingArea<BitMapBackend<'_>, Shift>,
        df: &DataFrame,
        x: &str,
        y: &str,
    ) -> Result<(), VizError> {
        // Sort by x so the line is monotonic along the x axis.
        let mut points = Self::xy_pairs(df, x, y)?;
        points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let (x_min, x_max) = Self::padded_range(points.iter().map(|p| p.0));
        let (y_min, y_max) = Self::padded_range(points.iter().map(|p| p.1));

        let mut chart = ChartBuilder::on(root)
            .caption(format!("Line Chart: {y} vs {x}"), ("sans-serif", 24))
            .margin(10)
            .x_label_area_size(45)
            .y_label_area_size(60)
            .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
        chart.configure_mesh().x_desc(x).y_desc(y).draw()?;

        chart.draw_series(LineSeries::new(points, BASE_COLOR.stroke_width(2)))?;
        Ok(())
    }

    fn correlation_heatmap(
        root: &DrawingArea<BitMapBackend<'_>, Shift>,
        df: &DataFrame,
        show_values: bool,
    ) -> Result<(), VizError> {
        let (names, matrix) = StatsCalculator::correlation_matrix(df)?;
        if names.is_empty() {
            return Err(VizError::NoNumericColumns);
        }
        let n = names.len() as i32;

        let mut chart = ChartBuilder::on(root)
            .caption("Correlation Matrix Heatmap", ("sans-serif", 24))
            .margin(10)
            .x_label_area_size(60)
            .y_label_area_size(90)
            .build_cartesian_2d(0..n, 0..n)?;

        let x_names = names.clone();
        let y_names = names.clone();
        chart
            .configure_mesh()
            .disable_x_mesh()
            .disable_y_mesh()
            .x_labels(names.len())
            .y_labels(names.len())
            .x_label_formatter(&move |idx: &i32| {
                x_names.get(*idx as usize).cloned().unwrap_or_default()
            })
            .y_label_formatter(&move |idx: &i32| {
                y_names.get(*idx as usize).cloned().unwrap_or_default()
            })
            .draw()?;

        for (i, row) in matrix.iter().enumerate() {
            for (j, &r) in row.iter().enumerate() {
                let (x0, y0) = (j as i32, i as i32);
                chart.draw_series(std::iter::once(Rectangle::new(
                    [(x0, y0), (x0 + 1, y0 + 1)],
                    Self::heatmap_color(r).filled(),
                )))?;
                if show_values && r.is_finite() {
                    chart.draw_series(std::iter::once(
                        EmptyElement::at((x0, y0))
                            + Text::new(format!("{r:.2}"), (18, 18), ("sans-serif", 14)),
                    ))?;
                }
            }
        }
        Ok(())
    }

    /// Diverging blue-white-red map over [-1, 1].
    fn heatmap_color(r: f64) -> RGBColor {
        if !r.is_finite() {
            return RGBColor(255, 255, 255);
        }
        let r = r.clamp(-1.0, 1.0);
        if r >= 0.0 {
            let fade = (255.0 * (1.0 - r)) as u8;
            RGBColor(255, fade, fade)
        } else {
            let fade = (255.0 * (1.0 + r)) as u8;
            RGBColor(fade, fade, 255)
        }
    }

    fn boxplot(
        root: &DrawingArea<BitMapBackend<'_>, Shift>,
        df: &DataFrame,
        column: &str,
        group_by: Option<&str>,
    ) -> Result<(), VizError> {
        // One box per group, or a single box named after the column.
        let groups: Vec<(String, Vec<f64>)> = match group_by {
            Some(group_col) => {
                let labels = Self::string_values(df, group_col)?;
                let values = Self::optional_values(df, column)?;
                let mut groups: Vec<(String, Vec<f64>)> = Vec::new();
                for (label, value) in labels.into_iter().zip(values) {
                    let (Some(label), Some(value)) = (label, value) else {
                        continue;
                    };
                    match groups.iter_mut().find(|(name, _)| *name == label) {
                        Some((_, vals)) => vals.push(value),
                        None => groups.push((label, vec![value])),
                    }
                }
                groups.sort_by(|a, b| a.0.cmp(&b.0));
                groups
            }
            None => vec![(column.to_string(), Self::numeric_values(df, column)?)],
        };
        if groups.iter().all(|(_, vals)| vals.is_empty()) {
            return Err(VizError::Render(format!(
                "column '{column}' has no numeric data"
            )));
        }

        let all_values = groups.iter().flat_map(|(_, vals)| vals.iter().copied());
        let (y_min, y_max) = Self::padded_range(all_values);
        let categories: Vec<String> = groups.iter().map(|(name, _)| name.clone()).collect();

        let mut chart = ChartBuilder::on(root)
            .caption(format!("Boxplot of {column}"), ("sans-serif", 24))
            .margin(10)
            .x_label_area_size(45)
            .y_label_area_size(60)
            .build_cartesian_2d(
                categories[..].into_segmented(),
                // Quartiles yields f32 coordinates
                y_min as f32..y_max as f32,
            )?;
        chart
            .configure_mesh()
            .x_desc(group_by.unwrap_or(""))
            .y_desc(column)
            .draw()?;

        for (i, (name, values)) in groups.iter().enumerate() {
            if values.is_empty() {
                continue;
            }
            let color = if group_by.is_some() {
                PALETTE[i % PALETTE.len()]
            } else {
                BASE_COLOR
            };
            let quartiles = Quartiles::new(values);
            chart.draw_series(std::iter::once(
                Boxplot::new_vertical(SegmentValue::CenterOf(name), &quartiles)
                    .width(30)
                    .style(color),
            ))?;
        }
        Ok(())
    }

    // Data extraction helpers

    fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<f64>, VizError> {
        let values = records::column_values(df, name)?;
        if values.is_empty() {
            return Err(VizError::Render(format!(
                "column '{name}' has no numeric data"
            )));
        }
        Ok(values)
    }

    fn optional_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, VizError> {
        let casted = df.column(name)?.cast(&DataType::Float64)?;
        Ok(casted.f64()?.into_iter().collect())
    }

    fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, VizError> {
        let col = df.column(name)?;
        (0..col.len())
            .map(|i| {
                let value = col.get(i)?;
                Ok(if value.is_null() {
                    None
                } else {
                    Some(value.to_string().trim_matches('"').to_string())
                })
            })
            .collect::<PolarsResult<_>>()
            .map_err(VizError::from)
    }

    /// Pairs of (x, y) where both cells are present and finite.
    fn xy_pairs(df: &DataFrame, x: &str, y: &str) -> Result<Vec<(f64, f64)>, VizError> {
        let xs = Self::optional_values(df, x)?;
        let ys = Self::optional_values(df, y)?;
        let pairs: Vec<(f64, f64)> = xs
            .into_iter()
            .zip(ys)
            .filter_map(|(px, py)| match (px, py) {
                (Some(px), Some(py)) if px.is_finite() && py.is_finite() => Some((px, py)),
                _ => None,
            })
            .collect();
        if pairs.is_empty() {
            return Err(VizError::Render(format!(
                "no numeric data for '{x}' and '{y}'"
            )));
        }
        Ok(pairs)
    }

    /// Value range with 5% padding; degenerate ranges widen by one unit.
    fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values {
            if v.is_finite() {
                min = min.min(v);
                max = max.max(v);
            }
        }
        if min.is_infinite() {
            return (0.0, 1.0);
        }
        if min == max {
            return (min - 1.0, max + 1.0);
        }
        let pad = (max - min) * 0.05;
        (min - pad, max + pad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn label_rotation_threshold_is_five() {
        assert!(!rotate_category_labels(5));
        assert!(rotate_category_labels(6));
    }

    #[test]
    fn scatter_missing_y_names_the_parameter() {
        let mut params = Map::new();
        params.insert("x".to_string(), json!("a"));
        let err = PlotSpec::from_request("scatter", &params).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error: 'x' and 'y' parameters required for scatter plot"
        );
        assert!(err.to_string().contains("y"));
    }

    #[test]
    fn histogram_requires_column() {
        let err = PlotSpec::from_request("histogram", &Map::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error: 'column' parameter required for histogram"
        );
    }

    #[test]
    fn unknown_plot_type_names_the_kind() {
        let err = PlotSpec::from_request("pie", &Map::new()).unwrap_err();
        assert_eq!(err.to_string(), "Error: Unsupported plot type 'pie'");
    }

    #[test]
    fn padded_range_handles_degenerate_input() {
        assert_eq!(ChartRenderer::padded_range([3.0].into_iter()), (2.0, 4.0));
        let (min, max) = ChartRenderer::padded_range([0.0, 10.0].into_iter());
        assert_eq!((min, max), (-0.5, 10.5));
    }

    #[test]
    fn heatmap_color_endpoints() {
        assert_eq!(ChartRenderer::heatmap_color(1.0), RGBColor(255, 0, 0));
        assert_eq!(ChartRenderer::heatmap_color(-1.0), RGBColor(0, 0, 255));
        assert_eq!(ChartRenderer::heatmap_color(0.0), RGBColor(255, 255, 255));
    }
}
