//! The `chart` renderer. Charts are drawn to SVG with `plotters` and linked
//! from the document as images.

use std::fmt::Display;
use std::path::Path;

use plotters::element::Pie;
use plotters::prelude::*;
use plotters::style::Palette;
use serde_json::Value;

use crate::DatamdConfig;
use crate::DatamdError;
use crate::DatamdResult;
use crate::sanitize::ChartOptions;
use crate::sanitize::ChartType;
use crate::sanitize::sanitize_chart_options;
use crate::sanitize::sanitize_chart_type;
use crate::sanitize::sanitize_sheet_name;
use crate::shortcode::Shortcode;
use crate::table::Table;
use crate::tabular::json_to_table;
use crate::tabular::parse_separator;
use crate::tabular::read_csv;
use crate::tabular::read_spreadsheet;
use crate::transform::apply_transformations;

const DEFAULT_WIDTH: u32 = 800;
const DEFAULT_HEIGHT: u32 = 500;
const HISTOGRAM_BINS: usize = 10;
const DEFAULT_COLOR: RGBColor = RGBColor(31, 119, 180);

fn chart_err<E: Display>(error: E) -> DatamdError {
	DatamdError::Chart(error.to_string())
}

/// Everything needed to draw a chart, resolved from shortcode arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
	pub chart_type: ChartType,
	pub x: Option<String>,
	pub y: Option<String>,
	pub options: ChartOptions,
}

impl ChartSpec {
	/// `{{ chart "data.csv" [type] [x] [y] ["key=value,..."] }}`. Keyword
	/// arguments other than `type`, `x`, `y` and `transform` are chart
	/// options and keep their value whole, commas included.
	pub fn from_shortcode(shortcode: &Shortcode) -> Self {
		let arg = |index: usize, key: &str| {
			shortcode
				.keyword(key)
				.or_else(|| shortcode.positional_at(index))
				.map(String::from)
		};

		let mut options = ChartOptions::default();
		for extra in shortcode.positional().into_iter().skip(3) {
			options.merge(sanitize_chart_options(Some(extra)));
		}

		for (key, value) in shortcode.keywords() {
			if matches!(key, "type" | "x" | "y" | "transform") {
				continue;
			}

			options.insert_raw(key, value);
		}

		Self {
			chart_type: sanitize_chart_type(arg(0, "type").as_deref()),
			x: arg(1, "x"),
			y: arg(2, "y"),
			options,
		}
	}

	pub fn title(&self) -> String {
		self.options
			.text("title")
			.filter(|title| !title.trim().is_empty())
			.unwrap_or_else(|| self.chart_type.default_title())
	}

	/// Sizes of 50 or less are read as inches at 100 pixels per inch.
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	fn dimension(&self, key: &str, default: u32) -> u32 {
		let Some(value) = self.options.number(key).filter(|value| *value > 0.0) else {
			return default;
		};
		let pixels = if value <= 50.0 { value * 100.0 } else { value };

		pixels.clamp(100.0, 4000.0).round() as u32
	}

	pub fn size(&self) -> (u32, u32) {
		(
			self.dimension("width", DEFAULT_WIDTH),
			self.dimension("height", DEFAULT_HEIGHT),
		)
	}

	fn color(&self) -> RGBColor {
		self.options
			.text("color")
			.and_then(|color| parse_color(&color))
			.unwrap_or(DEFAULT_COLOR)
	}

	fn alpha(&self) -> f64 {
		self.options
			.number("alpha")
			.map_or(1.0, |alpha| alpha.clamp(0.0, 1.0))
	}

	fn grid(&self) -> bool {
		self.options.flag("grid").unwrap_or(true)
	}
}

/// Named colors and `#rrggbb` hex values.
pub fn parse_color(value: &str) -> Option<RGBColor> {
	let value = value.trim().to_ascii_lowercase();
	if let Some(hex) = value.strip_prefix('#') {
		if hex.len() != 6 {
			return None;
		}

		let channel = |range: std::ops::Range<usize>| u8::from_str_radix(hex.get(range)?, 16).ok();
		return Some(RGBColor(channel(0..2)?, channel(2..4)?, channel(4..6)?));
	}

	let color = match value.as_str() {
		"red" => RGBColor(214, 39, 40),
		"green" => RGBColor(44, 160, 44),
		"blue" => DEFAULT_COLOR,
		"orange" => RGBColor(255, 127, 14),
		"purple" => RGBColor(148, 103, 189),
		"brown" => RGBColor(140, 86, 75),
		"pink" => RGBColor(227, 119, 194),
		"gray" | "grey" => RGBColor(127, 127, 127),
		"olive" => RGBColor(188, 189, 34),
		"cyan" => RGBColor(23, 190, 207),
		"black" => BLACK,
		"yellow" => RGBColor(255, 215, 0),
		_ => return None,
	};

	Some(color)
}

fn palette_color(index: usize) -> RGBColor {
	let colors = Palette99::COLORS;
	let (red, green, blue) = colors[index % colors.len()];
	RGBColor(red, green, blue)
}

/// Load the chart data based on the file extension.
pub fn load_chart_table(path: &Path, config: &DatamdConfig) -> DatamdResult<Table> {
	let extension = path
		.extension()
		.map(|extension| extension.to_string_lossy().to_ascii_lowercase())
		.unwrap_or_default();

	match extension.as_str() {
		"csv" => {
			read_csv(
				path,
				parse_separator(&config.processing.default_csv_separator)?,
			)
		}
		"json" => {
			let content = std::fs::read_to_string(path)?;
			let data: Value =
				serde_json::from_str(&content).map_err(|e| DatamdError::Json(e.to_string()))?;
			match data {
				Value::Array(items) => Ok(json_to_table(&items)),
				object @ Value::Object(_) => Ok(json_to_table(std::slice::from_ref(&object))),
				_ => Err(DatamdError::Chart("JSON chart data must be an array or object".to_string())),
			}
		}
		"xlsx" | "xls" | "xlsm" | "ods" => read_spreadsheet(path, &sanitize_sheet_name(None)),
		other => {
			Err(DatamdError::Chart(format!(
				"unsupported chart data format: `{other}`"
			)))
		}
	}
}

/// Data series extracted from the table.
struct Series {
	labels: Vec<String>,
	/// Numeric x values, present when the x column is numeric.
	xs: Option<Vec<f64>>,
	ys: Vec<f64>,
	x_name: String,
	y_name: String,
}

fn extract_series(table: &Table, spec: &ChartSpec) -> DatamdResult<Series> {
	let x_index = match &spec.x {
		Some(name) => table.column_index(name)?,
		None if !table.columns.is_empty() => 0,
		None => return Err(DatamdError::Chart("the data has no columns".to_string())),
	};

	let y_index = match &spec.y {
		Some(name) => table.column_index(name)?,
		None => {
			(0..table.columns.len())
				.filter(|index| *index != x_index)
				.find(|index| table.is_numeric_column(*index))
				.or_else(|| table.is_numeric_column(x_index).then_some(x_index))
				.ok_or_else(|| DatamdError::Chart("no numeric column to plot".to_string()))?
		}
	};

	let mut labels = vec![];
	let mut ys = vec![];
	let mut xs = vec![];

	for row in &table.rows {
		let y = &row[y_index];
		if y.is_empty() {
			continue;
		}

		let value = y.as_f64().ok_or_else(|| {
			DatamdError::Chart(format!(
				"column '{}' has non-numeric value `{y}`",
				table.columns[y_index]
			))
		})?;

		labels.push(row[x_index].to_string());
		xs.push(row[x_index].as_f64());
		ys.push(value);
	}

	let xs = xs.into_iter().collect::<Option<Vec<f64>>>();

	Ok(Series {
		labels,
		xs,
		ys,
		x_name: table.columns[x_index].clone(),
		y_name: table.columns[y_index].clone(),
	})
}

fn value_range(values: impl IntoIterator<Item = f64>, include_zero: bool) -> (f64, f64) {
	let (mut min, mut max) = values
		.into_iter()
		.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), value| {
			(min.min(value), max.max(value))
		});

	if !min.is_finite() || !max.is_finite() {
		return (0.0, 1.0);
	}

	if include_zero {
		min = min.min(0.0);
		max = max.max(0.0);
	}

	let padding = if (max - min).abs() < f64::EPSILON {
		1.0
	} else {
		(max - min) * 0.05
	};

	(
		if include_zero && min >= 0.0 { min } else { min - padding },
		max + padding,
	)
}

/// Draw the chart described by `spec` to an SVG string.
pub fn draw_chart(table: &Table, spec: &ChartSpec) -> DatamdResult<String> {
	let series = extract_series(table, spec)?;
	let (width, height) = spec.size();
	let title = spec.title();
	let x_desc = spec.options.text("xlabel").unwrap_or_else(|| series.x_name.clone());
	let y_desc = spec.options.text("ylabel").unwrap_or_else(|| series.y_name.clone());
	let style = spec.color().mix(spec.alpha());
	let mut svg = String::new();

	{
		let root = SVGBackend::with_string(&mut svg, (width, height)).into_drawing_area();
		root.fill(&WHITE).map_err(chart_err)?;

		match spec.chart_type {
			ChartType::Bar => {
				let count = series.ys.len().max(1);
				let (y_min, y_max) = value_range(series.ys.iter().copied(), true);
				let mut chart = ChartBuilder::on(&root)
					.caption(&title, ("sans-serif", 24).into_font())
					.margin(15)
					.x_label_area_size(40)
					.y_label_area_size(60)
					.build_cartesian_2d((0..count).into_segmented(), y_min..y_max)
					.map_err(chart_err)?;

				let formatter = |value: &SegmentValue<usize>| {
					match value {
						SegmentValue::CenterOf(index) => {
							series.labels.get(*index).cloned().unwrap_or_default()
						}
						_ => String::new(),
					}
				};
				let mut mesh = chart.configure_mesh();
				mesh.x_desc(x_desc.as_str())
					.y_desc(y_desc.as_str())
					.x_labels(count)
					.x_label_formatter(&formatter);
				if !spec.grid() {
					mesh.disable_mesh();
				}
				mesh.draw().map_err(chart_err)?;

				chart
					.draw_series(series.ys.iter().enumerate().map(|(index, value)| {
						let mut bar = Rectangle::new(
							[
								(SegmentValue::Exact(index), 0.0),
								(SegmentValue::Exact(index + 1), *value),
							],
							style.filled(),
						);
						bar.set_margin(0, 0, 5, 5);
						bar
					}))
					.map_err(chart_err)?;
			}
			ChartType::Line | ChartType::Scatter => {
				#[allow(clippy::cast_precision_loss)]
				let xs: Vec<f64> = series
					.xs
					.clone()
					.unwrap_or_else(|| (0..series.ys.len()).map(|index| index as f64).collect());
				let categorical = series.xs.is_none();
				let points: Vec<(f64, f64)> = xs.iter().copied().zip(series.ys.iter().copied()).collect();
				let (x_min, x_max) = value_range(xs.iter().copied(), false);
				let (y_min, y_max) = value_range(series.ys.iter().copied(), false);

				let mut chart = ChartBuilder::on(&root)
					.caption(&title, ("sans-serif", 24).into_font())
					.margin(15)
					.x_label_area_size(40)
					.y_label_area_size(60)
					.build_cartesian_2d(x_min..x_max, y_min..y_max)
					.map_err(chart_err)?;

				let formatter = |value: &f64| {
					if !categorical {
						return format!("{value}");
					}

					let rounded = value.round();
					if (value - rounded).abs() > 1e-6 || rounded < 0.0 {
						return String::new();
					}

					#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
					let index = rounded as usize;
					series.labels.get(index).cloned().unwrap_or_default()
				};
				let mut mesh = chart.configure_mesh();
				mesh.x_desc(x_desc.as_str())
					.y_desc(y_desc.as_str())
					.x_label_formatter(&formatter);
				if categorical {
					mesh.x_labels(points.len().clamp(2, 20));
				}
				if !spec.grid() {
					mesh.disable_mesh();
				}
				mesh.draw().map_err(chart_err)?;

				if spec.chart_type == ChartType::Line {
					chart
						.draw_series(LineSeries::new(points, style.stroke_width(2)))
						.map_err(chart_err)?;
				} else {
					chart
						.draw_series(
							points
								.into_iter()
								.map(|point| Circle::new(point, 4, style.filled())),
						)
						.map_err(chart_err)?;
				}
			}
			ChartType::Histogram => {
				let (low, high) = value_range(series.ys.iter().copied(), false);
				#[allow(clippy::cast_precision_loss)]
				let bin_width = (high - low) / HISTOGRAM_BINS as f64;
				let mut counts = [0_u32; HISTOGRAM_BINS];
				for value in &series.ys {
					#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
					let bin = (((value - low) / bin_width).floor() as usize).min(HISTOGRAM_BINS - 1);
					counts[bin] += 1;
				}
				let max_count = counts.iter().copied().max().unwrap_or(0);

				let mut chart = ChartBuilder::on(&root)
					.caption(&title, ("sans-serif", 24).into_font())
					.margin(15)
					.x_label_area_size(40)
					.y_label_area_size(60)
					.build_cartesian_2d(low..high, 0_u32..max_count + 1)
					.map_err(chart_err)?;

				let mut mesh = chart.configure_mesh();
				mesh.x_desc(spec.options.text("xlabel").unwrap_or_else(|| series.y_name.clone()))
					.y_desc(spec.options.text("ylabel").unwrap_or_else(|| "Frequency".to_string()));
				if !spec.grid() {
					mesh.disable_mesh();
				}
				mesh.draw().map_err(chart_err)?;

				chart
					.draw_series(counts.iter().enumerate().map(|(index, count)| {
						#[allow(clippy::cast_precision_loss)]
						let start = low + bin_width * index as f64;
						Rectangle::new([(start, 0), (start + bin_width, *count)], style.filled())
					}))
					.map_err(chart_err)?;
			}
			ChartType::Pie => {
				let area = root
					.titled(&title, ("sans-serif", 24).into_font())
					.map_err(chart_err)?;
				let (area_width, area_height) = area.dim_in_pixel();
				let center = (
					i32::try_from(area_width / 2).unwrap_or(i32::MAX),
					i32::try_from(area_height / 2).unwrap_or(i32::MAX),
				);
				let radius = f64::from(area_width.min(area_height)) * 0.35;
				let sizes: Vec<f64> = series.ys.iter().map(|value| value.max(0.0)).collect();
				let colors: Vec<RGBColor> = (0..sizes.len()).map(palette_color).collect();

				if sizes.iter().sum::<f64>() <= 0.0 {
					return Err(DatamdError::Chart(
						"pie chart values must contain a positive number".to_string(),
					));
				}

				let mut pie = Pie::new(&center, &radius, &sizes, &colors, &series.labels);
				pie.start_angle(-90.0);
				pie.label_style(("sans-serif", 14).into_font());
				area.draw(&pie).map_err(chart_err)?;
			}
		}

		root.present().map_err(chart_err)?;
	}

	Ok(svg)
}

/// `{{ chart "data.csv" [type] [x] [y] [options...] }}`
///
/// Writes `chart_<hash>.svg` into `output_dir` and returns a Markdown image
/// linking to it.
pub fn render_chart(
	path: &Path,
	shortcode: &Shortcode,
	config: &DatamdConfig,
	output_dir: &Path,
) -> DatamdResult<String> {
	let spec = ChartSpec::from_shortcode(shortcode);
	let mut table = load_chart_table(path, config)?;
	if let Some(transform) = shortcode.keyword("transform") {
		table = apply_transformations(table, transform)?;
	}

	let svg = draw_chart(&table, &spec)?;
	let digest = format!(
		"{:x}",
		md5::compute(format!("{}|{:?}", shortcode.path, shortcode.args))
	);
	let file_name = format!("chart_{}.svg", &digest[..12]);
	std::fs::create_dir_all(output_dir)?;
	std::fs::write(output_dir.join(&file_name), svg)?;
	tracing::debug!(chart = spec.chart_type.as_str(), file = %file_name, "wrote chart");

	Ok(format!("![{}]({file_name})", spec.title()))
}
