use std::cmp::Ordering;
use std::fmt;

use crate::DatamdError;
use crate::DatamdResult;

/// A single typed table value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
	Empty,
	Int(i64),
	Float(f64),
	Bool(bool),
	Text(String),
}

impl Cell {
	/// Infer the type of a textual value, as read from csv or pdf text.
	pub fn parse(raw: &str) -> Self {
		let trimmed = raw.trim();
		if trimmed.is_empty() {
			return Self::Empty;
		}

		if let Ok(value) = trimmed.parse::<i64>() {
			return Self::Int(value);
		}

		if is_float_literal(trimmed) {
			if let Ok(value) = trimmed.parse::<f64>() {
				if value.is_finite() {
					return Self::Float(value);
				}
			}
		}

		match trimmed {
			"true" | "True" | "TRUE" => Self::Bool(true),
			"false" | "False" | "FALSE" => Self::Bool(false),
			_ => Self::Text(raw.to_string()),
		}
	}

	pub fn is_empty(&self) -> bool {
		matches!(self, Self::Empty)
	}

	pub fn is_numeric(&self) -> bool {
		matches!(self, Self::Int(_) | Self::Float(_))
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			#[allow(clippy::cast_precision_loss)]
			Self::Int(value) => Some(*value as f64),
			Self::Float(value) => Some(*value),
			Self::Empty | Self::Bool(_) | Self::Text(_) => None,
		}
	}

	/// Ordering used by sorting: numbers before booleans before text, empty
	/// cells last.
	pub fn sort_cmp(&self, other: &Self) -> Ordering {
		match (self, other) {
			(Self::Empty, Self::Empty) => Ordering::Equal,
			(Self::Empty, _) => Ordering::Greater,
			(_, Self::Empty) => Ordering::Less,
			(Self::Int(left), Self::Int(right)) => left.cmp(right),
			(Self::Bool(left), Self::Bool(right)) => left.cmp(right),
			(Self::Text(left), Self::Text(right)) => left.cmp(right),
			(left, right) => {
				match (left.as_f64(), right.as_f64()) {
					(Some(left), Some(right)) => left.total_cmp(&right),
					_ => left.rank().cmp(&right.rank()),
				}
			}
		}
	}

	fn rank(&self) -> u8 {
		match self {
			Self::Int(_) | Self::Float(_) => 0,
			Self::Bool(_) => 1,
			Self::Text(_) => 2,
			Self::Empty => 3,
		}
	}
}

impl fmt::Display for Cell {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Empty => Ok(()),
			Self::Int(value) => write!(f, "{value}"),
			Self::Float(value) => write!(f, "{value}"),
			Self::Bool(value) => write!(f, "{value}"),
			Self::Text(value) => write!(f, "{value}"),
		}
	}
}

impl From<&str> for Cell {
	fn from(value: &str) -> Self {
		Self::parse(value)
	}
}

impl From<serde_json::Value> for Cell {
	fn from(value: serde_json::Value) -> Self {
		match value {
			serde_json::Value::Null => Self::Empty,
			serde_json::Value::Bool(value) => Self::Bool(value),
			serde_json::Value::Number(number) => {
				number
					.as_i64()
					.map(Self::Int)
					.or_else(|| number.as_f64().map(Self::Float))
					.unwrap_or_else(|| Self::Text(number.to_string()))
			}
			serde_json::Value::String(value) => Self::Text(value),
			other => Self::Text(other.to_string()),
		}
	}
}

/// Rust's float parser also accepts `inf` and `nan`. Only plain decimal and
/// exponent notation is treated as a number.
fn is_float_literal(value: &str) -> bool {
	value.chars().any(|c| c.is_ascii_digit())
		&& value
			.chars()
			.all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
}

/// Column names plus rows of typed cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
	pub columns: Vec<String>,
	pub rows: Vec<Vec<Cell>>,
}

impl Table {
	/// Build a table, padding or truncating every row to the column count.
	pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
		let width = columns.len();
		let rows = rows
			.into_iter()
			.map(|mut row| {
				row.resize(width, Cell::Empty);
				row
			})
			.collect();

		Self { columns, rows }
	}

	/// Build a table from textual rows; the first row is the header.
	pub fn from_text_rows(mut rows: Vec<Vec<String>>) -> Option<Self> {
		if rows.is_empty() {
			return None;
		}

		let header = rows.remove(0);
		let columns = header_names(header);
		let rows = rows
			.iter()
			.map(|row| row.iter().map(|value| Cell::parse(value)).collect())
			.collect();

		Some(Self::new(columns, rows))
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	pub fn column_index(&self, name: &str) -> DatamdResult<usize> {
		self.columns
			.iter()
			.position(|column| column == name)
			.ok_or_else(|| DatamdError::ColumnNotFound(name.to_string()))
	}

	pub fn column(&self, name: &str) -> DatamdResult<Vec<&Cell>> {
		let index = self.column_index(name)?;
		Ok(self.rows.iter().map(|row| &row[index]).collect())
	}

	/// Whether every non empty value in the column is a number and at least
	/// one value is present.
	pub fn is_numeric_column(&self, index: usize) -> bool {
		let mut values = self
			.rows
			.iter()
			.filter_map(|row| row.get(index))
			.filter(|cell| !cell.is_empty())
			.peekable();

		values.peek().is_some() && values.all(Cell::is_numeric)
	}

	/// Render as a GitHub flavored Markdown pipe table. Numeric columns are
	/// right aligned.
	pub fn to_markdown(&self) -> String {
		if self.columns.is_empty() {
			return String::new();
		}

		let header: Vec<String> = self.columns.iter().map(|name| escape_cell(name)).collect();
		let body: Vec<Vec<String>> = self
			.rows
			.iter()
			.map(|row| row.iter().map(|cell| escape_cell(&cell.to_string())).collect())
			.collect();
		let numeric: Vec<bool> = (0..self.columns.len())
			.map(|index| self.is_numeric_column(index))
			.collect();
		let widths: Vec<usize> = header
			.iter()
			.enumerate()
			.map(|(index, name)| {
				body.iter()
					.map(|row| row[index].chars().count())
					.chain([name.chars().count(), 3])
					.max()
					.unwrap_or(3)
			})
			.collect();

		let render_row = |values: &[String]| {
			let cells: Vec<String> = values
				.iter()
				.enumerate()
				.map(|(index, value)| {
					if numeric[index] {
						format!("{value:>width$}", width = widths[index])
					} else {
						format!("{value:<width$}", width = widths[index])
					}
				})
				.collect();
			format!("| {} |", cells.join(" | "))
		};

		let separator: Vec<String> = widths
			.iter()
			.enumerate()
			.map(|(index, width)| {
				let dashes = "-".repeat(width - 1);
				if numeric[index] {
					format!("{dashes}:")
				} else {
					format!(":{dashes}")
				}
			})
			.collect();

		let mut lines = vec![render_row(&header), format!("| {} |", separator.join(" | "))];
		lines.extend(body.iter().map(|row| render_row(row)));
		lines.join("\n")
	}
}

/// Blank header cells become `Unnamed: <index>`.
pub(crate) fn header_names(header: Vec<String>) -> Vec<String> {
	header
		.into_iter()
		.enumerate()
		.map(|(index, name)| {
			let name = name.trim().to_string();
			if name.is_empty() {
				format!("Unnamed: {index}")
			} else {
				name
			}
		})
		.collect()
}

fn escape_cell(value: &str) -> String {
	value
		.replace('|', "\\|")
		.replace("\r\n", " ")
		.replace(['\n', '\r'], " ")
}
