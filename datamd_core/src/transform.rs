use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::DatamdError;
use crate::DatamdResult;
use crate::table::Cell;
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
	Eq,
	Ne,
	Lt,
	Gt,
	Le,
	Ge,
	/// Case insensitive substring match.
	Contains,
}

impl FilterOperator {
	/// Two character operators come first so that `<=` is not read as `<`.
	const SYMBOLS: [(&'static str, Self); 7] = [
		("==", Self::Eq),
		("!=", Self::Ne),
		("<=", Self::Le),
		(">=", Self::Ge),
		("<", Self::Lt),
		(">", Self::Gt),
		("contains", Self::Contains),
	];
}

/// `<column> <operator> <value>`, e.g. `age > 25` or `name contains jo`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
	pub column: String,
	pub operator: FilterOperator,
	pub value: Cell,
	/// The literal as written, without surrounding quotes.
	pub raw: String,
}

impl FromStr for FilterCondition {
	type Err = DatamdError;

	fn from_str(condition: &str) -> Result<Self, Self::Err> {
		let invalid = || DatamdError::Transform(format!("Invalid filter condition: {condition}"));
		let trimmed = condition.trim();

		let column_end = trimmed
			.char_indices()
			.find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
			.map_or(trimmed.len(), |(index, _)| index);
		let column = &trimmed[..column_end];
		if column.is_empty() || column.starts_with(|c: char| c.is_ascii_digit()) {
			return Err(invalid());
		}

		let rest = trimmed[column_end..].trim_start();
		let (symbol, operator) = FilterOperator::SYMBOLS
			.iter()
			.find(|(symbol, _)| rest.starts_with(symbol))
			.ok_or_else(invalid)?;

		let raw = rest[symbol.len()..].trim();
		if raw.is_empty() {
			return Err(invalid());
		}

		let unquoted = raw.trim_matches(|c| c == '"' || c == '\'').to_string();
		let value = if raw.contains('.') {
			raw.parse::<f64>()
				.map_or_else(|_| Cell::Text(unquoted.clone()), Cell::Float)
		} else {
			raw.parse::<i64>()
				.map_or_else(|_| Cell::Text(unquoted.clone()), Cell::Int)
		};

		Ok(Self {
			column: column.to_string(),
			operator: *operator,
			value,
			raw: unquoted,
		})
	}
}

impl FilterCondition {
	fn matches(&self, cell: &Cell) -> bool {
		if cell.is_empty() {
			return self.operator == FilterOperator::Ne;
		}

		if self.operator == FilterOperator::Contains {
			return cell
				.to_string()
				.to_lowercase()
				.contains(&self.raw.to_lowercase());
		}

		let ordering = match (cell.as_f64(), self.value.as_f64()) {
			(Some(left), Some(right)) => left.partial_cmp(&right),
			(None, None) => Some(cell.to_string().as_str().cmp(self.raw.as_str())),
			_ => None,
		};

		match (self.operator, ordering) {
			(FilterOperator::Eq, Some(ordering)) => ordering == Ordering::Equal,
			(FilterOperator::Ne, Some(ordering)) => ordering != Ordering::Equal,
			(FilterOperator::Ne, None) => true,
			(FilterOperator::Lt, Some(ordering)) => ordering == Ordering::Less,
			(FilterOperator::Gt, Some(ordering)) => ordering == Ordering::Greater,
			(FilterOperator::Le, Some(ordering)) => ordering != Ordering::Greater,
			(FilterOperator::Ge, Some(ordering)) => ordering != Ordering::Less,
			_ => false,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
	Sum,
	Mean,
	Count,
	Min,
	Max,
	/// Sample standard deviation.
	Std,
}

impl FromStr for AggregateFunction {
	type Err = DatamdError;

	fn from_str(name: &str) -> Result<Self, Self::Err> {
		match name.trim().to_ascii_lowercase().as_str() {
			"sum" => Ok(Self::Sum),
			"mean" => Ok(Self::Mean),
			"count" => Ok(Self::Count),
			"min" => Ok(Self::Min),
			"max" => Ok(Self::Max),
			"std" => Ok(Self::Std),
			other => {
				Err(DatamdError::Transform(format!(
					"Unsupported aggregation function: {other}"
				)))
			}
		}
	}
}

impl fmt::Display for AggregateFunction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Sum => "sum",
			Self::Mean => "mean",
			Self::Count => "count",
			Self::Min => "min",
			Self::Max => "max",
			Self::Std => "std",
		};

		write!(f, "{name}")
	}
}

impl AggregateFunction {
	fn apply(self, column: &str, cells: &[&Cell]) -> DatamdResult<Cell> {
		let present: Vec<&Cell> = cells
			.iter()
			.copied()
			.filter(|cell| !cell.is_empty())
			.collect();

		match self {
			Self::Count => Ok(Cell::Int(i64::try_from(present.len()).unwrap_or(i64::MAX))),
			Self::Min => {
				Ok(present
					.into_iter()
					.min_by(|left, right| left.sort_cmp(right))
					.cloned()
					.unwrap_or(Cell::Empty))
			}
			Self::Max => {
				Ok(present
					.into_iter()
					.max_by(|left, right| left.sort_cmp(right))
					.cloned()
					.unwrap_or(Cell::Empty))
			}
			Self::Sum => {
				if present.iter().all(|cell| matches!(cell, Cell::Int(_))) {
					let total = present
						.iter()
						.filter_map(|cell| {
							match cell {
								Cell::Int(value) => Some(*value),
								_ => None,
							}
						})
						.fold(0_i64, i64::saturating_add);
					return Ok(Cell::Int(total));
				}

				Ok(Cell::Float(numbers(column, self, &present)?.iter().sum()))
			}
			Self::Mean => {
				let values = numbers(column, self, &present)?;
				if values.is_empty() {
					return Ok(Cell::Empty);
				}

				#[allow(clippy::cast_precision_loss)]
				let count = values.len() as f64;
				Ok(Cell::Float(values.iter().sum::<f64>() / count))
			}
			Self::Std => {
				let values = numbers(column, self, &present)?;
				if values.len() < 2 {
					return Ok(Cell::Empty);
				}

				#[allow(clippy::cast_precision_loss)]
				let count = values.len() as f64;
				let mean = values.iter().sum::<f64>() / count;
				let variance = values
					.iter()
					.map(|value| (value - mean).powi(2))
					.sum::<f64>()
					/ (count - 1.0);
				Ok(Cell::Float(variance.sqrt()))
			}
		}
	}
}

fn numbers(column: &str, function: AggregateFunction, cells: &[&Cell]) -> DatamdResult<Vec<f64>> {
	cells
		.iter()
		.map(|cell| {
			cell.as_f64().ok_or_else(|| {
				DatamdError::Transform(format!(
					"cannot apply `{function}` to non-numeric value `{cell}` in column '{column}'"
				))
			})
		})
		.collect()
}

/// One step of a transform string.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOperation {
	Filter(FilterCondition),
	/// Sort by `columns`, or by every column when empty.
	Sort {
		columns: Vec<String>,
		ascending: bool,
	},
	Limit(usize),
	GroupBy(Vec<String>),
	Aggregate(Vec<(String, AggregateFunction)>),
}

/// Parse `filter:age>25|sort:-age|limit:10` style transform strings.
pub fn parse_transform_string(transform: &str) -> DatamdResult<Vec<TransformOperation>> {
	let mut operations = vec![];

	for part in transform.split('|').map(str::trim).filter(|part| !part.is_empty()) {
		let Some((name, args)) = part.split_once(':') else {
			if part.eq_ignore_ascii_case("sort") {
				operations.push(TransformOperation::Sort {
					columns: vec![],
					ascending: true,
				});
				continue;
			}

			return Err(DatamdError::Transform(format!(
				"Invalid transformation operation: {part}"
			)));
		};

		let args = args.trim();
		let operation = match name.trim().to_ascii_lowercase().as_str() {
			"filter" => TransformOperation::Filter(args.parse()?),
			"sort" => {
				let (columns, ascending) = match args.strip_prefix('-') {
					Some(columns) => (columns, false),
					None => (args, true),
				};
				TransformOperation::Sort {
					columns: split_columns(columns),
					ascending,
				}
			}
			"limit" => {
				let limit: i64 = args.parse().map_err(|_| {
					DatamdError::Transform(format!("Invalid limit value: {args}"))
				})?;
				let limit = usize::try_from(limit)
					.ok()
					.filter(|limit| *limit > 0)
					.ok_or_else(|| {
						DatamdError::Transform("Limit must be a positive integer".to_string())
					})?;
				TransformOperation::Limit(limit)
			}
			"groupby" => TransformOperation::GroupBy(split_columns(args)),
			"agg" => TransformOperation::Aggregate(parse_aggregations(args)?),
			other => {
				return Err(DatamdError::Transform(format!(
					"Unsupported transformation operation: {other}"
				)));
			}
		};

		operations.push(operation);
	}

	Ok(operations)
}

fn split_columns(columns: &str) -> Vec<String> {
	columns
		.split(',')
		.map(str::trim)
		.filter(|column| !column.is_empty())
		.map(String::from)
		.collect()
}

fn parse_aggregations(args: &str) -> DatamdResult<Vec<(String, AggregateFunction)>> {
	args.split(',')
		.map(str::trim)
		.filter(|pair| !pair.is_empty())
		.map(|pair| {
			let (column, function) = pair.split_once('=').ok_or_else(|| {
				DatamdError::Transform(format!("Invalid aggregation: {pair}"))
			})?;
			Ok((column.trim().to_string(), function.parse()?))
		})
		.collect()
}

/// Chainable table operations.
#[derive(Debug, Clone)]
pub struct DataTransformer {
	table: Table,
}

impl DataTransformer {
	pub fn new(table: Table) -> Self {
		Self { table }
	}

	pub fn filter(self, condition: &str) -> DatamdResult<Self> {
		if condition.trim().is_empty() {
			return Ok(self);
		}

		let condition: FilterCondition = condition.parse()?;
		self.filter_by(&condition)
	}

	pub fn filter_by(mut self, condition: &FilterCondition) -> DatamdResult<Self> {
		let index = self.table.column_index(&condition.column)?;
		self.table.rows.retain(|row| condition.matches(&row[index]));
		Ok(self)
	}

	/// Stable sort by `columns` in order. An empty slice sorts by every
	/// column.
	pub fn sort(mut self, columns: &[String], ascending: bool) -> DatamdResult<Self> {
		let indexes: Vec<usize> = if columns.is_empty() {
			(0..self.table.columns.len()).collect()
		} else {
			columns
				.iter()
				.map(|column| self.table.column_index(column))
				.collect::<DatamdResult<_>>()?
		};

		self.table.rows.sort_by(|left, right| {
			let ordering = indexes
				.iter()
				.map(|index| left[*index].sort_cmp(&right[*index]))
				.find(|ordering| ordering.is_ne())
				.unwrap_or(Ordering::Equal);

			if ascending { ordering } else { ordering.reverse() }
		});

		Ok(self)
	}

	/// Group rows by `group_by` (all rows form one group when empty) and
	/// compute one column per aggregation. Without aggregations each group
	/// gets a `count` column.
	pub fn aggregate(
		self,
		group_by: &[String],
		aggregations: &[(String, AggregateFunction)],
	) -> DatamdResult<Self> {
		let group_indexes: Vec<usize> = group_by
			.iter()
			.map(|column| self.table.column_index(column))
			.collect::<DatamdResult<_>>()?;
		let aggregate_indexes: Vec<usize> = aggregations
			.iter()
			.map(|(column, _)| self.table.column_index(column))
			.collect::<DatamdResult<_>>()?;

		let mut groups: Vec<(Vec<Cell>, Vec<&Vec<Cell>>)> = vec![];
		for row in &self.table.rows {
			let key: Vec<Cell> = group_indexes.iter().map(|index| row[*index].clone()).collect();
			match groups.iter_mut().find(|(existing, _)| *existing == key) {
				Some((_, rows)) => rows.push(row),
				None => groups.push((key, vec![row])),
			}
		}

		groups.sort_by(|(left, _), (right, _)| {
			left.iter()
				.zip(right)
				.map(|(left, right)| left.sort_cmp(right))
				.find(|ordering| ordering.is_ne())
				.unwrap_or(Ordering::Equal)
		});

		let mut columns = group_by.to_vec();
		if aggregations.is_empty() {
			columns.push("count".to_string());
		} else {
			columns.extend(aggregations.iter().map(|(column, _)| column.clone()));
		}

		let mut rows = vec![];
		for (key, members) in &groups {
			let mut row = key.clone();
			if aggregations.is_empty() {
				row.push(Cell::Int(i64::try_from(members.len()).unwrap_or(i64::MAX)));
			}

			for ((column, function), index) in aggregations.iter().zip(&aggregate_indexes) {
				let cells: Vec<&Cell> = members.iter().map(|member| &member[*index]).collect();
				row.push(function.apply(column, &cells)?);
			}

			rows.push(row);
		}

		Ok(Self::new(Table::new(columns, rows)))
	}

	pub fn limit(mut self, n: usize) -> DatamdResult<Self> {
		if n == 0 {
			return Err(DatamdError::Transform(
				"Limit must be a positive integer".to_string(),
			));
		}

		self.table.rows.truncate(n);
		Ok(self)
	}

	pub fn apply(self, operation: &TransformOperation) -> DatamdResult<Self> {
		match operation {
			TransformOperation::Filter(condition) => self.filter_by(condition),
			TransformOperation::Sort { columns, ascending } => self.sort(columns, *ascending),
			TransformOperation::Limit(n) => self.limit(*n),
			TransformOperation::GroupBy(columns) => self.aggregate(columns, &[]),
			TransformOperation::Aggregate(aggregations) => self.aggregate(&[], aggregations),
		}
	}

	pub fn into_table(self) -> Table {
		self.table
	}
}

/// Apply a transform string to `table`. `groupby` followed by `agg` forms a
/// single grouped aggregation.
pub fn apply_transformations(table: Table, transform: &str) -> DatamdResult<Table> {
	let operations = parse_transform_string(transform)?;
	let mut transformer = DataTransformer::new(table);
	let mut operations = operations.iter().peekable();

	while let Some(operation) = operations.next() {
		transformer = match (operation, operations.peek().copied()) {
			(
				TransformOperation::GroupBy(columns),
				Some(TransformOperation::Aggregate(aggregations)),
			) => {
				operations.next();
				transformer.aggregate(columns, aggregations)?
			}
			(operation, _) => transformer.apply(operation)?,
		};
	}

	Ok(transformer.into_table())
}
