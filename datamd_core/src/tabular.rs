//! Renderers for tabular sources: `csv`, `json` and the spreadsheet formats.

use std::fs::File;
use std::path::Path;

use calamine::Data;
use calamine::Reader;
use calamine::open_workbook_auto;
use serde_json::Map;
use serde_json::Value;

use crate::DatamdConfig;
use crate::DatamdError;
use crate::DatamdResult;
use crate::config::BYTES_PER_MB;
use crate::sanitize::SheetSelector;
use crate::sanitize::sanitize_boolean_input;
use crate::sanitize::sanitize_sheet_name;
use crate::shortcode::Shortcode;
use crate::table::Cell;
use crate::table::Table;
use crate::table::header_names;
use crate::transform::apply_transformations;

/// Rows shown when a large csv file is previewed.
pub const PREVIEW_ROWS: usize = 100;

/// Parse a csv separator argument. `\t` and `tab` select a tab.
pub fn parse_separator(value: &str) -> DatamdResult<u8> {
	match value {
		"\\t" | "tab" | "\t" => Ok(b'\t'),
		value if value.len() == 1 => Ok(value.as_bytes()[0]),
		value => {
			Err(DatamdError::InvalidArgument(format!(
				"csv separator must be a single byte character, got `{value}`"
			)))
		}
	}
}

fn csv_reader(path: &Path, separator: u8) -> DatamdResult<csv::Reader<File>> {
	csv::ReaderBuilder::new()
		.delimiter(separator)
		.flexible(true)
		.from_path(path)
		.map_err(|e| DatamdError::Csv(e.to_string()))
}

fn record_cells(record: &csv::StringRecord) -> Vec<Cell> {
	record.iter().map(Cell::parse).collect()
}

/// Read a whole csv file. The first record is the header.
pub fn read_csv(path: &Path, separator: u8) -> DatamdResult<Table> {
	let mut reader = csv_reader(path, separator)?;
	let columns = csv_header(&mut reader)?;
	let rows = reader
		.records()
		.map(|record| {
			record
				.map(|record| record_cells(&record))
				.map_err(|e| DatamdError::Csv(e.to_string()))
		})
		.collect::<DatamdResult<Vec<_>>>()?;

	Ok(Table::new(columns, rows))
}

fn csv_header(reader: &mut csv::Reader<File>) -> DatamdResult<Vec<String>> {
	let header = reader
		.headers()
		.map_err(|e| DatamdError::Csv(e.to_string()))?;

	Ok(header_names(header.iter().map(String::from).collect()))
}

/// Iterator over fixed size chunks of a csv file, each chunk a [`Table`]
/// sharing the file's header.
pub struct CsvChunks {
	reader: csv::Reader<File>,
	columns: Vec<String>,
	chunk_size: usize,
	done: bool,
}

impl Iterator for CsvChunks {
	type Item = DatamdResult<Table>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.done {
			return None;
		}

		let mut rows = Vec::with_capacity(self.chunk_size.min(PREVIEW_ROWS * 10));
		let mut record = csv::StringRecord::new();

		while rows.len() < self.chunk_size {
			match self.reader.read_record(&mut record) {
				Ok(true) => rows.push(record_cells(&record)),
				Ok(false) => {
					self.done = true;
					break;
				}
				Err(e) => {
					self.done = true;
					return Some(Err(DatamdError::Csv(e.to_string())));
				}
			}
		}

		if rows.is_empty() {
			return None;
		}

		Some(Ok(Table::new(self.columns.clone(), rows)))
	}
}

/// Stream a csv file in chunks of `chunk_size` rows.
pub fn read_csv_chunked(path: &Path, separator: u8, chunk_size: usize) -> DatamdResult<CsvChunks> {
	let mut reader = csv_reader(path, separator)?;
	let columns = csv_header(&mut reader)?;

	Ok(CsvChunks {
		reader,
		columns,
		chunk_size: chunk_size.max(1),
		done: false,
	})
}

/// Render every chunk of a csv file as its own Markdown table, applying
/// `transform` to each chunk. Chunks left empty by the transform are
/// skipped.
pub fn process_csv_streaming(
	path: &Path,
	separator: u8,
	chunk_size: usize,
	transform: Option<&str>,
) -> DatamdResult<Vec<String>> {
	let mut rendered = vec![];

	for chunk in read_csv_chunked(path, separator, chunk_size)? {
		let mut chunk = chunk?;
		if let Some(transform) = transform {
			chunk = apply_transformations(chunk, transform)?;
		}

		if !chunk.is_empty() {
			rendered.push(chunk.to_markdown());
		}
	}

	Ok(rendered)
}

/// Preview a csv file that is too large to load at once: the first
/// [`PREVIEW_ROWS`] rows plus a note with the total row count.
pub fn render_large_csv(
	path: &Path,
	separator: u8,
	chunk_size: usize,
	transform: Option<&str>,
) -> DatamdResult<String> {
	let size = std::fs::metadata(path)?.len();
	let mut preview: Option<Table> = None;
	let mut total_rows = 0;

	for chunk in read_csv_chunked(path, separator, chunk_size)? {
		let mut chunk = chunk?;
		if let Some(transform) = transform {
			chunk = apply_transformations(chunk, transform)?;
		}

		total_rows += chunk.len();
		match preview.as_mut() {
			Some(table) => {
				let wanted = PREVIEW_ROWS.saturating_sub(table.len());
				table.rows.extend(chunk.rows.into_iter().take(wanted));
			}
			None => {
				chunk.rows.truncate(PREVIEW_ROWS);
				preview = Some(chunk);
			}
		}
	}

	let Some(preview) = preview else {
		return Ok(String::new());
	};

	#[allow(clippy::cast_precision_loss)]
	let size_mb = size as f64 / BYTES_PER_MB as f64;
	tracing::debug!(path = %path.display(), total_rows, "previewing large csv file");

	Ok(format!(
		"{}\n\n*Large file detected ({size_mb:.2} MB). Showing first {} rows of {total_rows}.*",
		preview.to_markdown(),
		preview.len(),
	))
}

/// `{{ csv "file.csv" [sep] transform="..." }}`
pub fn render_csv(path: &Path, shortcode: &Shortcode, config: &DatamdConfig) -> DatamdResult<String> {
	let separator = parse_separator(
		shortcode
			.positional_at(0)
			.or_else(|| shortcode.keyword("sep"))
			.unwrap_or(config.processing.default_csv_separator.as_str()),
	)?;
	let transform = shortcode.keyword("transform");
	let size = std::fs::metadata(path)?.len();

	if size >= config.streaming_threshold_bytes() {
		return render_large_csv(path, separator, config.chunk_size(), transform);
	}

	let mut table = read_csv(path, separator)?;
	if let Some(transform) = transform {
		table = apply_transformations(table, transform)?;
	}

	Ok(table.to_markdown())
}

/// Flatten nested objects into dotted keys, preserving first seen order.
fn flatten_object(prefix: &str, object: &Map<String, Value>, out: &mut Vec<(String, Value)>) {
	for (key, value) in object {
		let name = if prefix.is_empty() {
			key.clone()
		} else {
			format!("{prefix}.{key}")
		};

		match value {
			Value::Object(nested) if !nested.is_empty() => flatten_object(&name, nested, out),
			other => out.push((name, other.clone())),
		}
	}
}

/// Normalise a list of JSON values into a table. Objects contribute one
/// column per (dotted) key; other values go into a `value` column.
pub fn json_to_table(items: &[Value]) -> Table {
	let mut columns: Vec<String> = vec![];
	let mut records: Vec<Vec<(String, Value)>> = vec![];

	for item in items {
		let mut fields = vec![];
		match item {
			Value::Object(object) => flatten_object("", object, &mut fields),
			other => fields.push(("value".to_string(), other.clone())),
		}

		for (name, _) in &fields {
			if !columns.contains(name) {
				columns.push(name.clone());
			}
		}

		records.push(fields);
	}

	let rows = records
		.into_iter()
		.map(|fields| {
			let mut row = vec![Cell::Empty; columns.len()];
			for (name, value) in fields {
				if let Some(index) = columns.iter().position(|column| *column == name) {
					row[index] = json_cell(value);
				}
			}
			row
		})
		.collect();

	Table::new(columns, rows)
}

fn json_cell(value: Value) -> Cell {
	match value {
		Value::Array(_) | Value::Object(_) => Cell::Text(value.to_string()),
		other => Cell::from(other),
	}
}

/// `{{ json "file.json" [flatten] transform="..." }}`
pub fn render_json(path: &Path, shortcode: &Shortcode) -> DatamdResult<String> {
	let content = std::fs::read_to_string(path)?;
	let data: Value = serde_json::from_str(&content).map_err(|e| DatamdError::Json(e.to_string()))?;
	let flatten = sanitize_boolean_input(
		shortcode
			.positional_at(0)
			.or_else(|| shortcode.keyword("flatten")),
		false,
	);
	let transform = shortcode.keyword("transform");

	let table = match data {
		Value::Array(items) => json_to_table(&items),
		Value::Object(_) if flatten => json_to_table(std::slice::from_ref(&data)),
		Value::Object(_) => {
			let pretty =
				serde_json::to_string_pretty(&data).map_err(|e| DatamdError::Json(e.to_string()))?;
			return Ok(format!("```json\n{pretty}\n```"));
		}
		Value::String(text) => return Ok(format!("JSON content: {text}")),
		scalar => return Ok(format!("JSON content: {scalar}")),
	};

	let table = match transform {
		Some(transform) => apply_transformations(table, transform)?,
		None => table,
	};

	Ok(table.to_markdown())
}

fn spreadsheet_cell(data: &Data) -> Cell {
	match data {
		Data::Empty => Cell::Empty,
		Data::Int(value) => Cell::Int(*value),
		Data::Float(value) => Cell::Float(*value),
		Data::Bool(value) => Cell::Bool(*value),
		Data::String(value) => Cell::Text(value.clone()),
		other => Cell::Text(other.to_string()),
	}
}

/// Read one worksheet. The first row is the header.
pub fn read_spreadsheet(path: &Path, sheet: &SheetSelector) -> DatamdResult<Table> {
	let mut workbook =
		open_workbook_auto(path).map_err(|e| DatamdError::Spreadsheet(e.to_string()))?;

	let range = match sheet {
		SheetSelector::Index(index) => {
			workbook
				.worksheet_range_at(*index)
				.ok_or_else(|| DatamdError::Spreadsheet(format!("worksheet {index} not found")))?
				.map_err(|e| DatamdError::Spreadsheet(e.to_string()))?
		}
		SheetSelector::Name(name) => {
			workbook
				.worksheet_range(name)
				.map_err(|e| DatamdError::Spreadsheet(format!("worksheet `{name}`: {e}")))?
		}
	};

	let mut rows = range.rows();
	let Some(header) = rows.next() else {
		return Ok(Table::default());
	};

	let columns = header_names(header.iter().map(ToString::to_string).collect());
	let rows = rows
		.map(|row| row.iter().map(spreadsheet_cell).collect())
		.collect();

	Ok(Table::new(columns, rows))
}

/// `{{ xlsx "file.xlsx" [sheet] transform="..." }}`, also used for `xls`,
/// `xlsm` and `ods`.
pub fn render_spreadsheet(path: &Path, shortcode: &Shortcode) -> DatamdResult<String> {
	let sheet = sanitize_sheet_name(
		shortcode
			.positional_at(0)
			.or_else(|| shortcode.keyword("sheet")),
	);
	let mut table = read_spreadsheet(path, &sheet)?;

	if let Some(transform) = shortcode.keyword("transform") {
		table = apply_transformations(table, transform)?;
	}

	Ok(table.to_markdown())
}
