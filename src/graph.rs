use crate::error::ChartError;
use crate::table::TabularModel;
use log::{debug, warn};
use plotters::prelude::*;
use std::io::Cursor;

/// Canvas options for chart rendering
#[derive(Clone, Debug)]
pub struct ChartOptions {
    /// Width of the chart in pixels
    pub width: u32,

    /// Height of the chart in pixels
    pub height: u32,
}

impl Default for ChartOptions {
    /// 640x480, the canvas size reports have always used
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// Which columns of a model feed the chart
///
/// The category axis is the first text column, falling back to the first
/// numeric column when the table has no text at all. The value axis is always
/// the first numeric column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChartSpec {
    /// Column index used for the category (x) axis
    pub category: usize,

    /// Column index used for the value (y) axis
    pub value: usize,
}

/// Data extracted from a model according to a [`ChartSpec`]
#[derive(Clone, Debug, PartialEq)]
pub struct ChartSeries {
    pub x_label: String,
    pub y_label: String,
    pub categories: Vec<String>,
    pub values: Vec<f64>,
}

// Beyond this many bars the category labels overlap; only some are drawn.
const MAX_X_LABELS: usize = 20;

impl ChartSpec {
    /// Pick the chart axes for a model
    ///
    /// # Returns
    /// * `Option<ChartSpec>` - `None` when the model has no numeric column
    pub fn select(model: &TabularModel) -> Option<Self> {
        let value = *model.numeric_columns().first()?;
        let category = model.text_columns().first().copied().unwrap_or(value);
        Some(Self { category, value })
    }

    /// Pull the category labels and values out of the model
    ///
    /// Blank cells in the value column are plotted as zero.
    ///
    /// # Returns
    /// * `Option<ChartSeries>` - `None` if either column index is outside `model`
    pub fn series(&self, model: &TabularModel) -> Option<ChartSeries> {
        let columns = model.columns();
        let x_label = columns.get(self.category)?.clone();
        let y_label = columns.get(self.value)?.clone();

        Some(ChartSeries {
            x_label,
            y_label,
            categories: model
                .rows()
                .iter()
                .map(|row| row.get(self.category).cloned().unwrap_or_default())
                .collect(),
            values: (0..model.row_count())
                .map(|r| model.numeric_value(r, self.value).unwrap_or(0.0))
                .collect(),
        })
    }
}

/// Renders a bar chart of a model as PNG bytes
///
/// This is the entry point used by the report workflow. The chart is drawn
/// into an in-memory bitmap; nothing touches the disk.
///
/// # Arguments
/// * `model` - The uploaded table
/// * `options` - Canvas size
///
/// # Returns
/// * `Ok(Some(png))` - The encoded chart
/// * `Ok(None)` - The model has no numeric column; there is nothing to plot
/// * `Err(ChartError)` - Drawing or encoding failed
///
/// # Examples
/// ```
/// use report_dashboard::graph::{ChartOptions, render};
/// use report_dashboard::table::TabularModel;
///
/// let model = TabularModel::ingest(b"city,country\nOslo,Norway\n").unwrap();
/// assert!(render(&model, &ChartOptions::default()).unwrap().is_none());
/// ```
pub fn render(model: &TabularModel, options: &ChartOptions) -> Result<Option<Vec<u8>>, ChartError> {
    let Some(spec) = ChartSpec::select(model) else {
        warn!("No numeric data available to generate a chart");
        return Ok(None);
    };

    let series = spec
        .series(model)
        .ok_or_else(|| ChartError::Draw("chart columns are outside the table".to_string()))?;
    debug!(
        "Rendering bar chart of '{}' by '{}' ({} bars)",
        series.y_label,
        series.x_label,
        series.values.len()
    );

    match draw_bar_chart(&series, options, true) {
        Ok(png) => Ok(Some(png)),
        Err(e) => {
            // Hosts without usable fonts fail on the caption; the bars alone still work
            warn!("Chart text could not be drawn ({}), rendering without labels", e);
            draw_bar_chart(&series, options, false).map(Some)
        }
    }
}

/// Draws the bars, and optionally caption and axis labels, then encodes PNG
fn draw_bar_chart(
    series: &ChartSeries,
    options: &ChartOptions,
    with_text: bool,
) -> Result<Vec<u8>, ChartError> {
    let (width, height) = (options.width, options.height);
    let mut pixels = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(draw_error)?;

        let bars = series.values.len().max(1) as u32;
        let (y_min, y_max) = value_range(&series.values);
        let caption = format!("{} by {}", series.y_label, series.x_label);

        let mut builder = ChartBuilder::on(&root);
        builder.margin(10);
        if with_text {
            builder
                .caption(&caption, ("sans-serif", 24).into_font())
                .x_label_area_size(40)
                .y_label_area_size(50);
        }

        let mut chart = builder
            .build_cartesian_2d((0u32..bars).into_segmented(), y_min..y_max)
            .map_err(draw_error)?;

        if with_text {
            let label_for = |segment: &SegmentValue<u32>| match segment {
                SegmentValue::CenterOf(i) => series
                    .categories
                    .get(*i as usize)
                    .cloned()
                    .unwrap_or_default(),
                _ => String::new(),
            };

            chart
                .configure_mesh()
                .disable_x_mesh()
                .x_desc(&series.x_label)
                .y_desc(&series.y_label)
                .x_labels(series.categories.len().min(MAX_X_LABELS))
                .x_label_formatter(&label_for)
                .draw()
                .map_err(draw_error)?;
        }

        chart
            .draw_series(
                Histogram::vertical(&chart)
                    .style(BLUE.mix(0.8).filled())
                    .margin(8)
                    .data(
                        series
                            .values
                            .iter()
                            .enumerate()
                            .map(|(i, v)| (i as u32, *v)),
                    ),
            )
            .map_err(draw_error)?;

        root.present().map_err(draw_error)?;
    }

    encode_png(pixels, width, height)
}

/// Y range covering every bar and the zero baseline, with headroom on top
fn value_range(values: &[f64]) -> (f64, f64) {
    let min = values.iter().copied().fold(0.0_f64, f64::min);
    let max = values.iter().copied().fold(0.0_f64, f64::max);
    if max - min < f64::EPSILON {
        return (min, min + 1.0);
    }
    (min, max + (max - min) * 0.1)
}

fn encode_png(pixels: Vec<u8>, width: u32, height: u32) -> Result<Vec<u8>, ChartError> {
    let bitmap = image::RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| ChartError::Encode("pixel buffer does not match canvas size".to_string()))?;

    let mut png = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(bitmap)
        .write_to(&mut png, image::ImageOutputFormat::Png)
        .map_err(|e| ChartError::Encode(e.to_string()))?;

    Ok(png.into_inner())
}

fn draw_error<E: std::fmt::Display>(e: E) -> ChartError {
    ChartError::Draw(e.to_string())
}
