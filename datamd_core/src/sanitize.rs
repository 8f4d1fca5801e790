//! Normalisation of user supplied shortcode arguments.
//!
//! Shortcode arguments are free text. Every renderer passes them through one
//! of these functions so that out of range or unknown values fall back to a
//! documented default instead of failing the shortcode.

use std::collections::BTreeMap;
use std::fmt;

use derive_more::Deref;
use derive_more::DerefMut;

/// Default cap applied by [`sanitize_string_input`].
pub const DEFAULT_MAX_STRING_LENGTH: usize = 1000;
/// Spreadsheet sheet names are limited to 31 characters.
pub const MAX_SHEET_NAME_LENGTH: usize = 31;
/// Language used when a requested OCR language is not supported.
pub const DEFAULT_OCR_LANGUAGE: &str = "eng";

/// Parse a number and clamp it to `min..=max`. Missing, empty and
/// unparsable values (including `NaN`) produce `default`.
pub fn sanitize_numeric_input(value: Option<&str>, min: f64, max: f64, default: f64) -> f64 {
	let Some(parsed) = value
		.map(str::trim)
		.filter(|value| !value.is_empty())
		.and_then(|value| value.parse::<f64>().ok())
		.filter(|value| !value.is_nan())
	else {
		return default;
	};

	parsed.clamp(min, max)
}

/// Interpret common spellings of a boolean, falling back to `default`.
pub fn sanitize_boolean_input(value: Option<&str>, default: bool) -> bool {
	let Some(value) = value else {
		return default;
	};

	match value.trim().to_ascii_lowercase().as_str() {
		"true" | "1" | "yes" | "on" | "enabled" => true,
		"false" | "0" | "no" | "off" | "disabled" => false,
		_ => default,
	}
}

/// Keep only `allowed_chars` (all characters when `None`) and truncate to
/// `max_length` characters.
pub fn sanitize_string_input(
	value: Option<&str>,
	max_length: usize,
	allowed_chars: Option<&str>,
) -> String {
	let Some(value) = value else {
		return String::new();
	};

	value
		.chars()
		.filter(|c| allowed_chars.is_none_or(|allowed| allowed.contains(*c)))
		.take(max_length)
		.collect()
}

/// Return `value` when it names supported OCR language(s), otherwise `eng`.
///
/// Tesseract accepts several languages joined with `+` (`eng+fra`); such a
/// value is kept when every part is supported.
pub fn sanitize_language_code(value: Option<&str>, supported: &[String]) -> String {
	let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
		return DEFAULT_OCR_LANGUAGE.to_string();
	};

	let value = value.to_ascii_lowercase();
	let all_supported = value
		.split('+')
		.all(|part| supported.iter().any(|language| language == part));

	if all_supported {
		value
	} else {
		DEFAULT_OCR_LANGUAGE.to_string()
	}
}

/// Which worksheet of a workbook to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSelector {
	Index(usize),
	Name(String),
}

impl Default for SheetSelector {
	fn default() -> Self {
		Self::Index(0)
	}
}

impl fmt::Display for SheetSelector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Index(index) => write!(f, "{index}"),
			Self::Name(name) => write!(f, "{name}"),
		}
	}
}

/// All digits selects a sheet by zero based index, anything else by name.
pub fn sanitize_sheet_name(value: Option<&str>) -> SheetSelector {
	let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
		return SheetSelector::default();
	};

	if value.chars().all(|c| c.is_ascii_digit()) {
		return value
			.parse()
			.map_or_else(|_| SheetSelector::default(), SheetSelector::Index);
	}

	SheetSelector::Name(value.chars().take(MAX_SHEET_NAME_LENGTH).collect())
}

/// How table cells are located on a PDF page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableStrategy {
	/// Rows drawn with ruling characters (`|`, tabs) or, failing that,
	/// whitespace gaps.
	#[default]
	Lines,
	/// Columns separated by runs of whitespace.
	Text,
	/// Only rows that use `|` as an explicit separator.
	Explicit,
}

impl TableStrategy {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Lines => "lines",
			Self::Text => "text",
			Self::Explicit => "explicit",
		}
	}
}

pub fn sanitize_strategy(value: Option<&str>) -> TableStrategy {
	match value.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
		Some("text") => TableStrategy::Text,
		Some("explicit") => TableStrategy::Explicit,
		_ => TableStrategy::Lines,
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartType {
	#[default]
	Bar,
	Line,
	Pie,
	Scatter,
	Histogram,
}

impl ChartType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Bar => "bar",
			Self::Line => "line",
			Self::Pie => "pie",
			Self::Scatter => "scatter",
			Self::Histogram => "histogram",
		}
	}

	/// Title used when the chart options do not provide one.
	pub fn default_title(self) -> String {
		let name = self.as_str();
		let mut chars = name.chars();
		let capitalized: String = chars
			.next()
			.map(|first| first.to_ascii_uppercase())
			.into_iter()
			.chain(chars)
			.collect();

		format!("{capitalized} chart")
	}
}

pub fn sanitize_chart_type(value: Option<&str>) -> ChartType {
	match value.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
		Some("line") => ChartType::Line,
		Some("pie") => ChartType::Pie,
		Some("scatter") => ChartType::Scatter,
		Some("histogram") => ChartType::Histogram,
		_ => ChartType::Bar,
	}
}

/// A typed chart option value.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
	Int(i64),
	Float(f64),
	Bool(bool),
	Text(String),
}

impl OptionValue {
	fn parse(raw: &str) -> Self {
		if let Ok(value) = raw.parse::<i64>() {
			return Self::Int(value);
		}

		if let Ok(value) = raw.parse::<f64>() {
			if value.is_finite() {
				return Self::Float(value);
			}
		}

		match raw.to_ascii_lowercase().as_str() {
			"true" => Self::Bool(true),
			"false" => Self::Bool(false),
			_ => Self::Text(raw.to_string()),
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			#[allow(clippy::cast_precision_loss)]
			Self::Int(value) => Some(*value as f64),
			Self::Float(value) => Some(*value),
			Self::Bool(_) | Self::Text(_) => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(value) => Some(*value),
			Self::Int(value) => Some(*value != 0),
			Self::Float(_) | Self::Text(_) => None,
		}
	}
}

impl fmt::Display for OptionValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Int(value) => write!(f, "{value}"),
			Self::Float(value) => write!(f, "{value}"),
			Self::Bool(value) => write!(f, "{value}"),
			Self::Text(value) => write!(f, "{value}"),
		}
	}
}

/// Chart options keyed by option name.
#[derive(Debug, Clone, Default, PartialEq, Deref, DerefMut)]
pub struct ChartOptions(BTreeMap<String, OptionValue>);

impl ChartOptions {
	pub fn number(&self, key: &str) -> Option<f64> {
		self.get(key).and_then(OptionValue::as_f64)
	}

	pub fn flag(&self, key: &str) -> Option<bool> {
		self.get(key).and_then(OptionValue::as_bool)
	}

	pub fn text(&self, key: &str) -> Option<String> {
		self.get(key).map(ToString::to_string)
	}

	/// Add every option from `other`, replacing existing keys.
	pub fn merge(&mut self, other: Self) {
		self.0.extend(other.0);
	}

	pub fn insert_raw(&mut self, key: &str, raw: &str) {
		self.0
			.insert(key.trim().to_string(), OptionValue::parse(raw.trim()));
	}
}

/// Parse `key=value` pairs separated by commas. Pairs without `=` or with an
/// empty key are ignored.
pub fn sanitize_chart_options(value: Option<&str>) -> ChartOptions {
	let mut options = ChartOptions::default();
	let Some(value) = value else {
		return options;
	};

	for pair in value.split(',') {
		let Some((key, raw)) = pair.split_once('=') else {
			continue;
		};

		if key.trim().is_empty() {
			continue;
		}

		options.insert_raw(key, raw);
	}

	options
}
