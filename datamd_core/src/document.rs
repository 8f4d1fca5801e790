//! PDF renderers: `pdf` for page text and `pdf_table` for tables laid out in
//! the page text.

use std::panic::AssertUnwindSafe;
use std::path::Path;

use crate::DatamdConfig;
use crate::DatamdError;
use crate::DatamdResult;
use crate::sanitize::TableStrategy;
use crate::sanitize::sanitize_numeric_input;
use crate::sanitize::sanitize_strategy;
use crate::shortcode::Shortcode;
use crate::table::Table;

pub const NO_TABLES_FOUND: &str = "No tables found on this page.";

/// Extract the text of every page.
///
/// Malformed fonts can make the extractor panic, so the panic is caught and
/// reported as an ordinary error.
pub fn extract_pages(path: &Path) -> DatamdResult<Vec<String>> {
	let bytes = std::fs::read(path)?;

	match std::panic::catch_unwind(AssertUnwindSafe(|| {
		pdf_extract::extract_text_from_mem_by_pages(&bytes)
	})) {
		Ok(Ok(pages)) => {
			tracing::debug!(path = %path.display(), pages = pages.len(), "extracted pdf text");
			Ok(pages)
		}
		Ok(Err(e)) => Err(DatamdError::Pdf(e.to_string())),
		Err(_) => {
			Err(DatamdError::Pdf(
				"text extraction panicked, the document is likely malformed".to_string(),
			))
		}
	}
}

/// Page numbers are 1 based.
fn page_text(pages: &[String], page: &str) -> DatamdResult<String> {
	let number: usize = page
		.trim()
		.parse()
		.map_err(|_| DatamdError::InvalidArgument(format!("invalid page number `{page}`")))?;

	number
		.checked_sub(1)
		.and_then(|index| pages.get(index))
		.cloned()
		.ok_or(DatamdError::PageOutOfRange {
			page: number,
			total: pages.len(),
		})
}

/// `{{ pdf "file.pdf" [all|page] }}`
pub fn render_pdf(path: &Path, shortcode: &Shortcode, config: &DatamdConfig) -> DatamdResult<String> {
	let pages = extract_pages(path)?;
	let selection = shortcode
		.positional_at(0)
		.or_else(|| shortcode.keyword("pages"))
		.unwrap_or("all");

	if selection.eq_ignore_ascii_case("all") {
		let limit = config.limits.max_pages_pdf;
		if pages.len() > limit {
			tracing::debug!(total = pages.len(), limit, "truncating pdf to page limit");
		}

		let text = pages
			.iter()
			.take(limit)
			.map(|page| page.trim())
			.collect::<Vec<_>>()
			.join("\n\n");
		return Ok(text.trim().to_string());
	}

	Ok(page_text(&pages, selection)?.trim().to_string())
}

/// Settings for locating tables in page text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableSettings {
	pub horizontal_strategy: TableStrategy,
	pub vertical_strategy: TableStrategy,
	/// Smallest run of spaces that separates two columns in text layout.
	pub snap_tolerance: usize,
	/// Fewest rows, header included, that make a table.
	pub edge_min_length: usize,
	/// How many cells a row may differ from the header before it starts a
	/// new table.
	pub intersection_tolerance: usize,
}

impl Default for TableSettings {
	fn default() -> Self {
		Self {
			horizontal_strategy: TableStrategy::Lines,
			vertical_strategy: TableStrategy::Lines,
			snap_tolerance: 2,
			edge_min_length: 2,
			intersection_tolerance: 0,
		}
	}
}

impl TableSettings {
	/// Build settings from `pdf_table` arguments.
	pub fn from_shortcode(shortcode: &Shortcode, config: &DatamdConfig) -> Self {
		let default_strategy = config.processing.default_pdf_strategy.as_str();
		let horizontal = shortcode
			.positional_at(1)
			.or_else(|| shortcode.keyword("horizontal_strategy"))
			.unwrap_or(default_strategy);
		let vertical = shortcode
			.positional_at(2)
			.or_else(|| shortcode.keyword("vertical_strategy"))
			.unwrap_or(horizontal);

		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		let number = |key: &str, min: f64, max: f64, default: f64| {
			sanitize_numeric_input(shortcode.keyword(key), min, max, default) as usize
		};

		Self {
			horizontal_strategy: sanitize_strategy(Some(horizontal)),
			vertical_strategy: sanitize_strategy(Some(vertical)),
			snap_tolerance: number("snap", 1.0, 20.0, 2.0),
			edge_min_length: number("edge", 1.0, 1000.0, 2.0),
			intersection_tolerance: number("intersect", 0.0, 10.0, 0.0),
		}
	}

	/// The strictest of the two strategies decides how rows are split.
	fn strategy(&self) -> TableStrategy {
		let rank = |strategy: TableStrategy| {
			match strategy {
				TableStrategy::Text => 0,
				TableStrategy::Lines => 1,
				TableStrategy::Explicit => 2,
			}
		};

		if rank(self.horizontal_strategy) >= rank(self.vertical_strategy) {
			self.horizontal_strategy
		} else {
			self.vertical_strategy
		}
	}
}

/// Horizontal rules such as `-----`, `+---+---+` or `|===|===|`.
fn is_ruling_line(line: &str) -> bool {
	let trimmed = line.trim();
	trimmed.chars().any(|c| matches!(c, '-' | '=' | '_'))
		&& trimmed
			.chars()
			.all(|c| matches!(c, '-' | '=' | '_' | '+' | '|' | ':' | ' '))
}

fn split_explicit(line: &str) -> Option<Vec<String>> {
	if !line.contains('|') {
		return None;
	}

	let trimmed = line.trim();
	let trimmed = trimmed.strip_prefix('|').unwrap_or(trimmed);
	let trimmed = trimmed.strip_suffix('|').unwrap_or(trimmed);
	Some(trimmed.split('|').map(|cell| cell.trim().to_string()).collect())
}

/// Split on runs of at least `gap` spaces. Tabs always separate.
fn split_whitespace_gaps(line: &str, gap: usize) -> Vec<String> {
	let mut cells = vec![];
	let mut current = String::new();
	let mut spaces = 0;

	for c in line.trim().chars() {
		match c {
			'\t' => {
				spaces = gap;
			}
			' ' => {
				spaces += 1;
			}
			_ => {
				if spaces >= gap && !current.is_empty() {
					cells.push(std::mem::take(&mut current));
				} else {
					current.extend(std::iter::repeat_n(' ', spaces));
				}
				spaces = 0;
				current.push(c);
			}
		}
	}

	if !current.is_empty() {
		cells.push(current);
	}

	cells
}

fn split_row(line: &str, strategy: TableStrategy, gap: usize) -> Option<Vec<String>> {
	let cells = match strategy {
		TableStrategy::Explicit => split_explicit(line)?,
		TableStrategy::Lines => {
			split_explicit(line).unwrap_or_else(|| {
				if line.contains('\t') {
					line.trim().split('\t').map(|cell| cell.trim().to_string()).collect()
				} else {
					split_whitespace_gaps(line, gap)
				}
			})
		}
		TableStrategy::Text => split_whitespace_gaps(line, gap),
	};

	(cells.len() >= 2).then_some(cells)
}

/// Locate tables in the text of a single page.
pub fn find_tables(text: &str, settings: &TableSettings) -> Vec<Table> {
	let strategy = settings.strategy();
	let gap = settings.snap_tolerance.max(1);
	let mut blocks: Vec<Vec<Vec<String>>> = vec![];
	let mut current: Vec<Vec<String>> = vec![];

	for line in text.lines() {
		if !current.is_empty() && is_ruling_line(line) {
			continue;
		}

		let Some(cells) = split_row(line, strategy, gap) else {
			if !current.is_empty() {
				blocks.push(std::mem::take(&mut current));
			}
			continue;
		};

		let starts_new_table = current
			.first()
			.is_some_and(|header| header.len().abs_diff(cells.len()) > settings.intersection_tolerance);
		if starts_new_table {
			blocks.push(std::mem::take(&mut current));
		}

		current.push(cells);
	}

	if !current.is_empty() {
		blocks.push(current);
	}

	blocks
		.into_iter()
		.filter(|rows| rows.len() >= settings.edge_min_length.max(2))
		.filter_map(Table::from_text_rows)
		.collect()
}

/// `{{ pdf_table "file.pdf" [page] [h_strategy] [v_strategy] snap= edge= intersect= }}`
pub fn render_pdf_table(
	path: &Path,
	shortcode: &Shortcode,
	config: &DatamdConfig,
) -> DatamdResult<String> {
	let pages = extract_pages(path)?;
	let page = shortcode
		.positional_at(0)
		.or_else(|| shortcode.keyword("page"))
		.unwrap_or("1");
	let text = page_text(&pages, page)?;
	let settings = TableSettings::from_shortcode(shortcode, config);
	let tables = find_tables(&text, &settings);

	if tables.is_empty() {
		return Ok(NO_TABLES_FOUND.to_string());
	}

	let sections: Vec<String> = tables
		.iter()
		.enumerate()
		.map(|(index, table)| format!("### Table {}\n\n{}", index + 1, table.to_markdown()))
		.collect();

	Ok(sections.join("\n\n"))
}
