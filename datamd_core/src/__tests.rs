use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;

use rstest::rstest;
use serde_json::json;
use similar_asserts::assert_eq;
use tracing_test::traced_test;

use super::*;
use crate::chart::ChartSpec;
use crate::chart::draw_chart;
use crate::chart::render_chart;
use crate::chart::parse_color;
use crate::document::TableSettings;
use crate::document::find_tables;
use crate::media::ThumbnailRequest;
use crate::media::render_video;
use crate::media::video_mime_type;
use crate::sanitize::*;
use crate::security::resolve_secure_path;
use crate::security::validate_source;
use crate::tabular::json_to_table;
use crate::tabular::parse_separator;
use crate::tabular::process_csv_streaming;
use crate::tabular::render_csv;
use crate::tabular::render_json;
use crate::tabular::read_spreadsheet;
use crate::tabular::render_large_csv;
use crate::tabular::render_spreadsheet;
use crate::transform::AggregateFunction;
use crate::transform::DataTransformer;
use crate::transform::FilterCondition;
use crate::transform::FilterOperator;
use crate::transform::TransformOperation;
use crate::transform::apply_transformations;
use crate::transform::parse_transform_string;

const PEOPLE_CSV: &str = "name,age,city\nAlice,30,NYC\nBob,25,LA\nCharlie,35,NYC\nDavid,28,LA\n";
const SMALL_CSV: &str = "name,age\nAlice,30\nBob,25\n";
const SMALL_TABLE: &str = "| name  | age |\n| :---- | --: |\n| Alice |  30 |\n| Bob   |  25 |";

fn shortcode(line: &str) -> Shortcode {
	parse_shortcode(line).unwrap_or_else(|| panic!("not a shortcode: {line}"))
}

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
	let path = dir.join(name);
	std::fs::write(&path, content).unwrap_or_else(|e| panic!("write {name}: {e}"));
	path
}

fn people() -> Table {
	let rows = PEOPLE_CSV
		.lines()
		.map(|line| line.split(',').map(String::from).collect())
		.collect();
	Table::from_text_rows(rows).unwrap_or_else(|| panic!("people table"))
}

fn names(table: &Table) -> Vec<String> {
	table.rows.iter().map(|row| row[0].to_string()).collect()
}

fn set_mtime(path: &Path, time: SystemTime) -> DatamdResult<()> {
	std::fs::File::options()
		.write(true)
		.open(path)?
		.set_modified(time)?;
	Ok(())
}

#[rstest]
#[case::in_range(Some("5"), 5.0)]
#[case::above_max(Some("15"), 10.0)]
#[case::below_min(Some("-3"), 0.0)]
#[case::padded(Some(" 2.5 "), 2.5)]
#[case::not_a_number(Some("abc"), 1.0)]
#[case::nan(Some("NaN"), 1.0)]
#[case::empty(Some(""), 1.0)]
#[case::missing(None, 1.0)]
fn sanitizes_numbers(#[case] value: Option<&str>, #[case] expected: f64) {
	let result = sanitize_numeric_input(value, 0.0, 10.0, 1.0);
	assert!(float_cmp::approx_eq!(f64, result, expected), "{result} != {expected}");
}

#[rstest]
#[case::yes(Some("yes"), false, true)]
#[case::one(Some("1"), false, true)]
#[case::upper_off(Some("OFF"), true, false)]
#[case::disabled(Some("disabled"), true, false)]
#[case::unknown(Some("maybe"), true, true)]
#[case::missing(None, false, false)]
fn sanitizes_booleans(#[case] value: Option<&str>, #[case] default: bool, #[case] expected: bool) {
	assert_eq!(sanitize_boolean_input(value, default), expected);
}

#[rstest]
#[case::truncated(Some("hello world"), 5, None, "hello")]
#[case::filtered(Some("a-b_c!"), 100, Some("abc_"), "ab_c")]
#[case::missing(None, 10, None, "")]
fn sanitizes_strings(
	#[case] value: Option<&str>,
	#[case] max_length: usize,
	#[case] allowed: Option<&str>,
	#[case] expected: &str,
) {
	assert_eq!(sanitize_string_input(value, max_length, allowed), expected);
}

#[rstest]
#[case::lowercased(Some("FRA"), "fra")]
#[case::combined(Some("eng+spa"), "eng+spa")]
#[case::partly_unsupported(Some("eng+xyz"), "eng")]
#[case::unsupported(Some("xyz"), "eng")]
#[case::missing(None, "eng")]
fn sanitizes_language_codes(#[case] value: Option<&str>, #[case] expected: &str) {
	let config = DatamdConfig::default();
	assert_eq!(
		sanitize_language_code(value, &config.limits.supported_languages),
		expected
	);
}

#[test]
fn sanitizes_sheet_names() {
	assert_eq!(sanitize_sheet_name(Some("2")), SheetSelector::Index(2));
	assert_eq!(
		sanitize_sheet_name(Some(" Sales ")),
		SheetSelector::Name("Sales".to_string())
	);
	assert_eq!(sanitize_sheet_name(None), SheetSelector::Index(0));

	let long = "x".repeat(40);
	assert_eq!(
		sanitize_sheet_name(Some(&long)),
		SheetSelector::Name("x".repeat(MAX_SHEET_NAME_LENGTH))
	);
}

#[rstest]
#[case::text(Some("TEXT"), TableStrategy::Text)]
#[case::explicit(Some("explicit"), TableStrategy::Explicit)]
#[case::unknown(Some("bogus"), TableStrategy::Lines)]
#[case::missing(None, TableStrategy::Lines)]
fn sanitizes_strategies(#[case] value: Option<&str>, #[case] expected: TableStrategy) {
	assert_eq!(sanitize_strategy(value), expected);
}

#[rstest]
#[case::pie(Some("PIE"), ChartType::Pie, "Pie chart")]
#[case::histogram(Some("histogram"), ChartType::Histogram, "Histogram chart")]
#[case::unknown(Some("radar"), ChartType::Bar, "Bar chart")]
#[case::missing(None, ChartType::Bar, "Bar chart")]
fn sanitizes_chart_types(
	#[case] value: Option<&str>,
	#[case] expected: ChartType,
	#[case] title: &str,
) {
	let chart_type = sanitize_chart_type(value);
	assert_eq!(chart_type, expected);
	assert_eq!(chart_type.default_title(), title);
}

#[test]
fn parses_typed_chart_options() {
	let options =
		sanitize_chart_options(Some("width=10, alpha=0.5, grid=false, title=Sales, bogus, =x"));

	assert_eq!(options.len(), 4);
	assert_eq!(options.get("width"), Some(&OptionValue::Int(10)));
	assert_eq!(options.get("alpha"), Some(&OptionValue::Float(0.5)));
	assert_eq!(options.flag("grid"), Some(false));
	assert_eq!(options.text("title"), Some("Sales".to_string()));
	assert_eq!(sanitize_chart_options(None).len(), 0);
}

#[rstest]
#[case::int("42", Cell::Int(42))]
#[case::negative_float("-3.5", Cell::Float(-3.5))]
#[case::bool("True", Cell::Bool(true))]
#[case::blank("   ", Cell::Empty)]
#[case::infinity_is_text("inf", Cell::Text("inf".to_string()))]
#[case::text("N/A", Cell::Text("N/A".to_string()))]
fn infers_cell_types(#[case] raw: &str, #[case] expected: Cell) {
	assert_eq!(Cell::parse(raw), expected);
}

#[test]
fn renders_markdown_table_with_numeric_alignment() {
	let table = Table::new(
		vec!["name".to_string(), "age".to_string()],
		vec![
			vec![Cell::from("Alice"), Cell::Int(30)],
			vec![Cell::from("Bob"), Cell::Int(25)],
		],
	);

	insta::assert_snapshot!(table.to_markdown(), @r"
	| name  | age |
	| :---- | --: |
	| Alice |  30 |
	| Bob   |  25 |
	");
}

#[test]
fn escapes_pipes_and_newlines_in_cells() {
	let table = Table::new(
		vec!["note".to_string()],
		vec![vec![Cell::Text("a|b\nc".to_string())]],
	);

	assert_eq!(table.to_markdown(), "| note   |\n| :----- |\n| a\\|b c |");
	assert_eq!(Table::default().to_markdown(), "");
}

#[test]
fn names_blank_headers() {
	let table = Table::from_text_rows(vec![
		vec!["id".to_string(), String::new()],
		vec!["1".to_string()],
	])
	.unwrap_or_else(|| panic!("table"));

	assert_eq!(table.columns, vec!["id", "Unnamed: 1"]);
	assert_eq!(table.rows, vec![vec![Cell::Int(1), Cell::Empty]]);
}

#[rstest]
#[case::bare(r#"{{ csv "data.csv" }}"#, "csv", "data.csv", vec![])]
#[case::no_inner_space(r#"{{csv "data.csv"}}"#, "csv", "data.csv", vec![])]
#[case::positional_and_keyword(
	r#"{{ csv "data.csv" ; transform="filter:age>25|sort:-age" }}"#,
	"csv",
	"data.csv",
	vec![
		Argument::Positional(";".to_string()),
		Argument::Keyword("transform".to_string(), "filter:age>25|sort:-age".to_string()),
	],
)]
#[case::chart_options(
	r#"{{ chart "sales.csv" bar month revenue title=Sales,color=red }}"#,
	"chart",
	"sales.csv",
	vec![
		Argument::Positional("bar".to_string()),
		Argument::Positional("month".to_string()),
		Argument::Positional("revenue".to_string()),
		Argument::Keyword("title".to_string(), "Sales,color=red".to_string()),
	],
)]
#[case::quoted_positional(
	r#"{{ xlsx "book.xlsx" 'Q1 Sales' }} trailing"#,
	"xlsx",
	"book.xlsx",
	vec![Argument::Positional("Q1 Sales".to_string())],
)]
#[case::path_with_spaces(r#"{{ pdf "annual report.pdf" 2 }}"#, "pdf", "annual report.pdf", vec![Argument::Positional("2".to_string())])]
fn parses_shortcodes(
	#[case] line: &str,
	#[case] command: &str,
	#[case] path: &str,
	#[case] args: Vec<Argument>,
) {
	let parsed = shortcode(line);

	assert_eq!(parsed.command, command);
	assert_eq!(parsed.path, path);
	assert_eq!(parsed.args, args);
}

#[rstest]
#[case::plain_text("Just some text")]
#[case::not_at_line_start(r#"See {{ csv "data.csv" }}"#)]
#[case::indented(r#"  {{ csv "data.csv" }}"#)]
#[case::unquoted_path(r#"{{ csv data.csv }}"#)]
#[case::empty_path(r#"{{ csv "" }}"#)]
#[case::unclosed(r#"{{ csv "data.csv""#)]
#[case::bad_command(r#"{{ c-s-v "data.csv" }}"#)]
fn rejects_non_shortcodes(#[case] line: &str) {
	assert!(!is_shortcode(line), "{line} should not be a shortcode");
}

#[test]
fn shortcode_accessors() {
	let parsed = shortcode(r#"{{ video "clip.mp4" 800 width=1024 width=1280 controls=false }}"#);

	assert_eq!(parsed.positional(), vec!["800"]);
	assert_eq!(parsed.positional_at(0), Some("800"));
	assert_eq!(parsed.positional_at(1), None);
	assert_eq!(parsed.keyword("width"), Some("1280"));
	assert_eq!(parsed.keyword("height"), None);

	let params = parsed.cache_params();
	assert_eq!(params.get("command").map(String::as_str), Some("video"));
	assert_eq!(params.get("arg0").map(String::as_str), Some("800"));
	assert_eq!(params.get("controls").map(String::as_str), Some("false"));
}

#[rstest]
#[case::less_equal("age <= 30", FilterOperator::Le, Cell::Int(30))]
#[case::greater("age>25", FilterOperator::Gt, Cell::Int(25))]
#[case::float("score >= 1.5", FilterOperator::Ge, Cell::Float(1.5))]
#[case::not_equal("city != 'LA'", FilterOperator::Ne, Cell::Text("LA".to_string()))]
#[case::contains("name contains li", FilterOperator::Contains, Cell::Text("li".to_string()))]
fn parses_filter_conditions(
	#[case] condition: &str,
	#[case] operator: FilterOperator,
	#[case] value: Cell,
) -> DatamdResult<()> {
	let parsed: FilterCondition = condition.parse()?;

	assert_eq!(parsed.operator, operator);
	assert_eq!(parsed.value, value);

	Ok(())
}

#[rstest]
#[case::filter_sort_limit("filter:age>25|sort:age|limit:2", vec!["David", "Alice"])]
#[case::descending("sort:-age", vec!["Charlie", "Alice", "David", "Bob"])]
#[case::contains("filter:name contains LI", vec!["Alice", "Charlie"])]
#[case::text_equality("filter:city==NYC", vec!["Alice", "Charlie"])]
#[case::greater_equal("filter:age>=30", vec!["Alice", "Charlie"])]
#[case::multi_column_sort("sort:city,name", vec!["Bob", "David", "Alice", "Charlie"])]
#[case::empty("", vec!["Alice", "Bob", "Charlie", "David"])]
fn applies_row_transformations(
	#[case] transform: &str,
	#[case] expected: Vec<&str>,
) -> DatamdResult<()> {
	let table = apply_transformations(people(), transform)?;
	assert_eq!(names(&table), expected);

	Ok(())
}

#[test]
fn parses_transform_strings() -> DatamdResult<()> {
	let operations = parse_transform_string("sort:-age,name | limit:3 | sort")?;

	assert_eq!(
		operations,
		vec![
			TransformOperation::Sort {
				columns: vec!["age".to_string(), "name".to_string()],
				ascending: false,
			},
			TransformOperation::Limit(3),
			TransformOperation::Sort {
				columns: vec![],
				ascending: true,
			},
		]
	);

	Ok(())
}

#[test]
fn groups_and_aggregates() -> DatamdResult<()> {
	let table = apply_transformations(people(), "groupby:city|agg:age=mean")?;
	assert_eq!(table.columns, vec!["city", "age"]);
	assert_eq!(
		table.rows,
		vec![
			vec![Cell::from("LA"), Cell::Float(26.5)],
			vec![Cell::from("NYC"), Cell::Float(32.5)],
		]
	);

	let counted = apply_transformations(people(), "groupby:city")?;
	assert_eq!(counted.columns, vec!["city", "count"]);
	assert_eq!(counted.rows[0], vec![Cell::from("LA"), Cell::Int(2)]);

	let summed = apply_transformations(people(), "agg:age=sum")?;
	assert_eq!(summed.rows, vec![vec![Cell::Int(118)]]);

	Ok(())
}

#[test]
fn aggregates_with_transformer() -> DatamdResult<()> {
	let table = DataTransformer::new(people())
		.filter("city == NYC")?
		.aggregate(&[], &[
			("age".to_string(), AggregateFunction::Std),
			("name".to_string(), AggregateFunction::Max),
		])?
		.into_table();

	// Sample standard deviation of 30 and 35.
	assert_eq!(table.columns, vec!["age", "name"]);
	let Cell::Float(std) = table.rows[0][0] else {
		panic!("expected a float, got {:?}", table.rows[0][0]);
	};
	assert!(float_cmp::approx_eq!(f64, std, 3.535_533_905_932_737_6, epsilon = 1e-9));
	assert_eq!(table.rows[0][1], Cell::from("Charlie"));

	Ok(())
}

#[rstest]
#[case::zero_limit("limit:0", "invalid transformation: Limit must be a positive integer")]
#[case::bad_limit("limit:abc", "invalid transformation: Invalid limit value: abc")]
#[case::unknown_operation(
	"pivot:city",
	"invalid transformation: Unsupported transformation operation: pivot"
)]
#[case::no_arguments(
	"nonsense",
	"invalid transformation: Invalid transformation operation: nonsense"
)]
#[case::missing_column("filter:height>1", "Column 'height' not found")]
#[case::non_numeric_sum(
	"agg:name=sum",
	"invalid transformation: cannot apply `sum` to non-numeric value `Alice` in column 'name'"
)]
#[case::unknown_function(
	"agg:age=median",
	"invalid transformation: Unsupported aggregation function: median"
)]
fn rejects_invalid_transformations(#[case] transform: &str, #[case] message: &str) {
	let error = apply_transformations(people(), transform)
		.err()
		.unwrap_or_else(|| panic!("`{transform}` should fail"));

	assert_eq!(error.to_string(), message);
}

#[test]
fn config_get_and_set() -> DatamdResult<()> {
	let mut config = DatamdConfig::default();

	assert_eq!(config.get("features.ocr_enabled"), Some(json!(true)));
	assert_eq!(config.get("application.name"), Some(json!("DataMD Processor")));
	assert_eq!(config.get("features.missing"), None);

	config.set("performance.chunk_size", 500)?;
	assert_eq!(config.performance.chunk_size, 500);
	assert_eq!(config.chunk_size(), 500);

	config.set("custom.section.key", "value")?;
	assert_eq!(config.get("custom.section.key"), Some(json!("value")));

	let error = config
		.set("performance.chunk_size", "lots")
		.err()
		.unwrap_or_else(|| panic!("a string chunk size should be rejected"));
	assert!(matches!(error, DatamdError::InvalidConfigValue { .. }));
	assert_eq!(config.performance.chunk_size, 500);

	assert!(config.set("", 1).is_err());

	Ok(())
}

#[test]
fn config_environment_overrides() {
	let env: HashMap<&str, &str> = HashMap::from([
		("DATAMD_OCR_ENABLED", "no"),
		("DATAMD_PDF_PROCESSING", "YES"),
		("DATAMD_MAX_FILE_SIZE_MB", "5"),
		("DATAMD_MAX_PAGES_PDF", "ten"),
		("DATAMD_APP_NAME", ""),
		("DATAMD_DEFAULT_CSV_SEPARATOR", ";"),
		("DATAMD_CACHE_DIR", "/tmp/datamd-cache"),
	]);
	let mut config = DatamdConfig::default();
	config.apply_env(|name| env.get(name).map(|value| (*value).to_string()));

	assert!(!config.is_feature_enabled(Feature::Ocr));
	assert!(config.is_feature_enabled(Feature::PdfProcessing));
	assert_eq!(config.limits.max_file_size_mb, 5);
	assert_eq!(config.max_file_size_bytes(), 5 * BYTES_PER_MB);
	assert_eq!(config.limits.max_pages_pdf, 50);
	assert_eq!(config.application_name(), "DataMD Processor");
	assert_eq!(config.processing.default_csv_separator, ";");
	assert_eq!(
		config.cache.directory,
		Some(PathBuf::from("/tmp/datamd-cache"))
	);
}

#[rstest]
#[case::json("config.json", r#"{ "features": { "ocr_enabled": false }, "performance": { "chunk_size": 42 } }"#)]
#[case::toml("config.toml", "[features]\nocr_enabled = false\n\n[performance]\nchunk_size = 42\n")]
#[case::yaml("config.yaml", "features:\n  ocr_enabled: false\nperformance:\n  chunk_size: 42\n")]
#[case::yml("config.yml", "features:\n  ocr_enabled: false\nperformance:\n  chunk_size: 42\n")]
fn loads_config_files(#[case] name: &str, #[case] content: &str) -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	let path = write_file(tmp.path(), name, content);
	let config = DatamdConfig::load_file(&path)?;

	assert!(!config.features.ocr_enabled);
	assert_eq!(config.performance.chunk_size, 42);
	assert_eq!(config.limits, DatamdConfig::default().limits);

	Ok(())
}

#[test]
fn rejects_bad_config_files() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;

	let ini = write_file(tmp.path(), "config.ini", "[features]\n");
	assert!(matches!(
		DatamdConfig::load_file(&ini),
		Err(DatamdError::UnsupportedConfigFormat(format)) if format == "ini"
	));

	let broken = write_file(tmp.path(), "config.json", "{ not json");
	assert!(matches!(
		DatamdConfig::load_file(&broken),
		Err(DatamdError::ConfigParse { .. })
	));

	Ok(())
}

#[test]
fn saves_and_reloads_config() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	let path = tmp.path().join("saved.json");
	let mut config = DatamdConfig::default();
	config.set("limits.max_pages_pdf", 3)?;
	config.save(&path)?;

	assert_eq!(DatamdConfig::load_file(&path)?, config);

	Ok(())
}

#[test]
fn streaming_threshold_is_capped_by_memory_limit() {
	let mut config = DatamdConfig::default();
	assert_eq!(config.streaming_threshold_bytes(), 10 * BYTES_PER_MB);

	config.performance.max_memory_mb = 4;
	assert_eq!(config.streaming_threshold_bytes(), 4 * BYTES_PER_MB);

	config.performance.chunk_size = 0;
	assert_eq!(config.chunk_size(), 1);
}

#[test]
fn resolves_paths_inside_base() -> DatamdResult<()> {
	let base = tempfile::tempdir()?;
	let file = write_file(base.path(), "data.csv", SMALL_CSV);
	let expected = file.canonicalize()?;

	assert_eq!(
		resolve_secure_path("data.csv", Some(base.path()), false)?,
		expected
	);
	assert_eq!(
		resolve_secure_path(&file.to_string_lossy(), Some(base.path()), false)?,
		expected
	);

	Ok(())
}

#[test]
fn rejects_paths_outside_base() -> DatamdResult<()> {
	let base = tempfile::tempdir()?;
	let other = tempfile::tempdir()?;
	write_file(base.path(), "data.csv", SMALL_CSV);
	let outside = write_file(other.path(), "secret.csv", SMALL_CSV);

	assert!(matches!(
		resolve_secure_path("../secret.csv", Some(base.path()), false),
		Err(DatamdError::PathTraversal(_))
	));
	assert!(matches!(
		resolve_secure_path(&outside.to_string_lossy(), Some(base.path()), false),
		Err(DatamdError::OutsideBase(_))
	));
	assert!(matches!(
		resolve_secure_path("missing.csv", Some(base.path()), false),
		Err(DatamdError::FileNotFound(path)) if path == "missing.csv"
	));

	Ok(())
}

#[test]
fn allows_traversal_when_configured() -> DatamdResult<()> {
	let base = tempfile::tempdir()?;
	let nested = base.path().join("docs");
	std::fs::create_dir_all(&nested)?;
	let file = write_file(base.path(), "data.csv", SMALL_CSV);

	assert_eq!(
		resolve_secure_path("../data.csv", Some(&nested), true)?,
		file.canonicalize()?
	);

	Ok(())
}

#[test]
fn validates_sources_against_config() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	let csv = write_file(tmp.path(), "data.csv", SMALL_CSV);
	let txt = write_file(tmp.path(), "notes.txt", "hello");
	let mut config = DatamdConfig::default();

	validate_source(&csv, &config)?;
	assert!(matches!(
		validate_source(&txt, &config),
		Err(DatamdError::FileTypeNotAllowed(name)) if name == "notes.txt"
	));

	config.security.allowed_file_extensions.clear();
	validate_source(&txt, &config)?;

	config.security.max_filename_length = 4;
	assert!(matches!(
		validate_source(&csv, &config),
		Err(DatamdError::FilenameTooLong { length: 8, limit: 4, .. })
	));

	config.security.max_filename_length = 255;
	config.limits.max_file_size_mb = 0;
	assert!(matches!(
		validate_source(&csv, &config),
		Err(DatamdError::FileTooLarge { limit: 0, .. })
	));

	Ok(())
}

#[test]
fn cache_key_covers_path_and_params() {
	let params = CacheParams::from([
		("sep".to_string(), ";".to_string()),
		("command".to_string(), "csv".to_string()),
	]);

	assert_eq!(
		CacheManager::cache_key("data.csv", &params),
		"b1d4e7de726f28e44ba545ac7a24c594"
	);
	assert_ne!(
		CacheManager::cache_key("data.csv", &params),
		CacheManager::cache_key("other.csv", &params)
	);
}

#[test]
fn cache_serves_fresh_entries_only() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	let cache = CacheManager::new(tmp.path().join("cache"))?;
	let source = write_file(tmp.path(), "data.csv", SMALL_CSV);
	let key = source.to_string_lossy().into_owned();
	let params = CacheParams::from([("command".to_string(), "csv".to_string())]);
	let now = SystemTime::now();

	set_mtime(&source, now - Duration::from_secs(3600))?;
	assert!(cache.set(&key, "rendered", &params));
	assert_eq!(cache.get(&key, &params), Some("rendered".to_string()));
	assert_eq!(cache.get(&key, &CacheParams::new()), None);

	set_mtime(&source, now + Duration::from_secs(3600))?;
	assert_eq!(cache.get(&key, &params), None);

	Ok(())
}

#[test]
fn cache_keeps_entries_for_missing_sources() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	let cache = CacheManager::new(tmp.path())?;
	let params = CacheParams::new();

	assert!(cache.set("/no/such/file.csv", "value", &params));
	assert_eq!(cache.get("/no/such/file.csv", &params), Some("value".to_string()));
	assert!(cache.invalidate("/no/such/file.csv", &params));
	assert!(!cache.invalidate("/no/such/file.csv", &params));
	assert_eq!(cache.get("/no/such/file.csv", &params), None);

	Ok(())
}

#[test]
fn cache_removes_corrupt_entries() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	let cache = CacheManager::new(tmp.path())?;
	let params = CacheParams::new();
	let entry = tmp
		.path()
		.join(format!("{}.cache", CacheManager::cache_key("gone.csv", &params)));
	std::fs::write(&entry, "not json")?;

	assert_eq!(cache.get("gone.csv", &params), None);
	assert!(!entry.exists());

	Ok(())
}

#[test]
fn cache_info_and_clear() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	let cache = CacheManager::new(tmp.path())?;
	let params = CacheParams::new();
	write_file(tmp.path(), "keep.txt", "not a cache entry");

	assert!(cache.set("a.csv", "first", &params));
	assert!(cache.set("b.csv", "second", &params));

	let info = cache.info();
	assert_eq!(info.cache_dir.as_path(), tmp.path());
	assert_eq!(info.cache_files, 2);
	assert!(info.total_size_bytes > 0);
	assert!(float_cmp::approx_eq!(f64, info.total_size_mb, 0.0));

	assert!(cache.clear());
	assert_eq!(cache.info().cache_files, 0);
	assert!(tmp.path().join("keep.txt").exists());

	Ok(())
}

#[test]
#[traced_test]
fn logs_cache_misses() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	let cache = CacheManager::new(tmp.path())?;

	assert_eq!(cache.get("absent.csv", &CacheParams::new()), None);
	assert!(logs_contain("cache miss"));

	Ok(())
}

#[rstest]
#[case::comma(",", b',')]
#[case::semicolon(";", b';')]
#[case::escaped_tab("\\t", b'\t')]
#[case::tab_word("tab", b'\t')]
fn parses_separators(#[case] value: &str, #[case] expected: u8) -> DatamdResult<()> {
	assert_eq!(parse_separator(value)?, expected);
	Ok(())
}

#[test]
fn rejects_long_separators() {
	assert!(matches!(
		parse_separator("ab"),
		Err(DatamdError::InvalidArgument(_))
	));
}

#[test]
fn renders_csv_with_separator_and_transform() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	let config = DatamdConfig::default();
	let path = write_file(tmp.path(), "data.csv", "name;age\nAlice;30\nBob;25\n");

	let rendered = render_csv(&path, &shortcode(r#"{{ csv "data.csv" ; }}"#), &config)?;
	assert_eq!(rendered, SMALL_TABLE);

	let people = write_file(tmp.path(), "people.csv", PEOPLE_CSV);
	let rendered = render_csv(
		&people,
		&shortcode(r#"{{ csv "people.csv" transform="filter:city==LA|sort:-age" }}"#),
		&config,
	)?;
	assert_eq!(
		rendered,
		"| name  | age | city |\n| :---- | --: | :--- |\n| David |  28 | LA   |\n| Bob   |  25 | LA   |"
	);

	Ok(())
}

fn numbered_csv(dir: &Path, rows: usize) -> PathBuf {
	let mut content = String::from("id,value\n");
	for index in 0..rows {
		content.push_str(&format!("{index},{index}\n"));
	}

	write_file(dir, "numbers.csv", &content)
}

#[test]
fn streams_csv_in_chunks() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	let path = numbered_csv(tmp.path(), 25);

	assert_eq!(process_csv_streaming(&path, b',', 10, None)?.len(), 3);

	let filtered = process_csv_streaming(&path, b',', 10, Some("filter:value>19"))?;
	assert_eq!(filtered.len(), 1);
	assert!(filtered[0].contains("|  24 |"));

	Ok(())
}

#[test]
fn previews_large_csv_files() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	let path = numbered_csv(tmp.path(), 150);

	let rendered = render_large_csv(&path, b',', 40, None)?;
	assert!(rendered.ends_with("*Large file detected (0.00 MB). Showing first 100 rows of 150.*"));
	assert!(rendered.contains("|  99 |"));
	assert!(!rendered.contains("| 100 |"));

	// A zero threshold routes every csv through the preview.
	let mut config = DatamdConfig::default();
	config.performance.streaming_threshold_mb = 0;
	let rendered = render_csv(&path, &shortcode(r#"{{ csv "numbers.csv" }}"#), &config)?;
	assert!(rendered.contains("Showing first 100 rows of 150."));

	Ok(())
}

#[test]
fn flattens_json_records() {
	let items = vec![
		json!({ "name": "Ann", "address": { "city": "Paris" } }),
		json!({ "name": "Ben", "age": 3 }),
		json!(7),
	];
	let table = json_to_table(&items);

	assert_eq!(table.columns, vec!["name", "address.city", "age", "value"]);
	assert_eq!(
		table.rows,
		vec![
			vec![Cell::from("Ann"), Cell::from("Paris"), Cell::Empty, Cell::Empty],
			vec![Cell::from("Ben"), Cell::Empty, Cell::Int(3), Cell::Empty],
			vec![Cell::Empty, Cell::Empty, Cell::Empty, Cell::Int(7)],
		]
	);
}

#[rstest]
#[case::object(
	r#"{ "name": "Widget", "tags": ["a"] }"#,
	r#"{{ json "data.json" }}"#,
	"```json\n{\n  \"name\": \"Widget\",\n  \"tags\": [\n    \"a\"\n  ]\n}\n```"
)]
#[case::flattened_object(
	r#"{ "name": "Widget", "size": { "w": 2 } }"#,
	r#"{{ json "data.json" true }}"#,
	"| name   | size.w |\n| :----- | -----: |\n| Widget |      2 |"
)]
#[case::array(
	r#"[{ "name": "Alice", "age": 30 }, { "name": "Bob", "age": 25 }]"#,
	r#"{{ json "data.json" }}"#,
	SMALL_TABLE
)]
#[case::string_scalar(r#""hello""#, r#"{{ json "data.json" }}"#, "JSON content: hello")]
#[case::number_scalar("42", r#"{{ json "data.json" }}"#, "JSON content: 42")]
fn renders_json(#[case] content: &str, #[case] line: &str, #[case] expected: &str) -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	let path = write_file(tmp.path(), "data.json", content);

	assert_eq!(render_json(&path, &shortcode(line))?, expected);

	Ok(())
}

#[test]
fn finds_whitespace_tables() {
	let text = "Quarterly report\n\nName  Age  City\nAlice  30  NYC\nBob  25  LA\n\nSome paragraph text here\n";
	let tables = find_tables(text, &TableSettings::default());

	assert_eq!(tables.len(), 1);
	assert_eq!(tables[0].columns, vec!["Name", "Age", "City"]);
	assert_eq!(tables[0].len(), 2);

	let explicit = TableSettings {
		horizontal_strategy: TableStrategy::Explicit,
		..TableSettings::default()
	};
	assert!(find_tables(text, &explicit).is_empty());
}

#[test]
fn finds_ruled_tables() {
	let text = "| Item | Qty |\n|------|-----|\n| Pen  | 3   |\n| Ink  | 12  |\n";
	let settings = TableSettings {
		horizontal_strategy: TableStrategy::Explicit,
		vertical_strategy: TableStrategy::Text,
		..TableSettings::default()
	};
	let tables = find_tables(text, &settings);

	assert_eq!(tables.len(), 1);
	assert_eq!(
		tables[0].to_markdown(),
		"| Item | Qty |\n| :--- | --: |\n| Pen  |   3 |\n| Ink  |  12 |"
	);
}

#[test]
fn splits_tables_on_column_count() {
	let text = "a  b\n1  2\nx  y  z\n3  4  5\n";
	let strict = find_tables(text, &TableSettings::default());
	assert_eq!(strict.len(), 2);

	let tolerant = TableSettings {
		intersection_tolerance: 1,
		..TableSettings::default()
	};
	assert_eq!(find_tables(text, &tolerant).len(), 1);
}

#[test]
fn reads_table_settings_from_shortcode() {
	let config = DatamdConfig::default();
	let settings = TableSettings::from_shortcode(
		&shortcode(r#"{{ pdf_table "report.pdf" 1 text explicit snap=3 edge=4 }}"#),
		&config,
	);

	assert_eq!(settings.horizontal_strategy, TableStrategy::Text);
	assert_eq!(settings.vertical_strategy, TableStrategy::Explicit);
	assert_eq!(settings.snap_tolerance, 3);
	assert_eq!(settings.edge_min_length, 4);
	assert_eq!(settings.intersection_tolerance, 0);
}

#[test]
fn renders_video_elements() {
	assert_eq!(
		render_video(&shortcode(r#"{{ video "clip.webm" 800 600 false true }}"#)),
		"<video width=\"800\" height=\"600\" autoplay>\n  <source src=\"clip.webm\" \
		 type=\"video/webm\">\n  Your browser does not support the video tag.\n</video>"
	);
	assert_eq!(
		render_video(&shortcode(r#"{{ video "media/clip.mp4" }}"#)),
		"<video width=\"640\" height=\"480\" controls>\n  <source src=\"media/clip.mp4\" \
		 type=\"video/mp4\">\n  Your browser does not support the video tag.\n</video>"
	);
	assert_eq!(video_mime_type("movie.MOV"), "video/quicktime");
}

#[test]
fn resolves_thumbnail_requests() -> DatamdResult<()> {
	let config = DatamdConfig::default();

	let request =
		ThumbnailRequest::from_shortcode(&shortcode(r#"{{ video_thumb "clip.mp4" 12.5 640 }}"#), &config)?;
	assert_eq!(request, ThumbnailRequest {
		time: 12.5,
		width: 640,
		height: 480,
	});
	assert!(request.file_name("clip.mp4").starts_with("thumb_"));

	let error = ThumbnailRequest::from_shortcode(&shortcode(r#"{{ video_thumb "clip.mp4" }}"#), &config)
		.err()
		.unwrap_or_else(|| panic!("time is required"));
	assert_eq!(error.to_string(), "video_thumb requires time parameter");

	Ok(())
}

#[test]
fn builds_chart_specs() {
	let spec = ChartSpec::from_shortcode(&shortcode(
		r#"{{ chart "sales.csv" line month revenue "title=Sales,color=red" width=10 }}"#,
	));

	assert_eq!(spec.chart_type, ChartType::Line);
	assert_eq!(spec.x.as_deref(), Some("month"));
	assert_eq!(spec.y.as_deref(), Some("revenue"));
	assert_eq!(spec.title(), "Sales");
	assert_eq!(spec.size(), (1000, 500));
	assert_eq!(spec.options.text("color"), Some("red".to_string()));
	assert_eq!(parse_color("#ff8000"), Some(plotters::style::RGBColor(255, 128, 0)));
	assert_eq!(parse_color("chartreuse"), None);
}

#[test]
fn keyword_chart_options_keep_commas() {
	let spec = ChartSpec::from_shortcode(&shortcode(
		r#"{{ chart "sales.csv" bar month revenue title="Sales, 2024" color=green }}"#,
	));

	assert_eq!(spec.title(), "Sales, 2024");
	assert_eq!(spec.options.text("color"), Some("green".to_string()));
	assert_eq!(spec.options.len(), 2);
}

#[test]
fn draws_bar_charts_as_svg() -> DatamdResult<()> {
	let table = Table::new(
		vec!["month".to_string(), "revenue".to_string()],
		vec![
			vec![Cell::from("Jan"), Cell::Int(120)],
			vec![Cell::from("Feb"), Cell::Int(90)],
		],
	);
	let spec = ChartSpec::from_shortcode(&shortcode(
		r#"{{ chart "sales.csv" bar month revenue title=Revenue }}"#,
	));
	let svg = draw_chart(&table, &spec)?;

	assert!(svg.contains("<svg"));
	assert!(svg.contains("Revenue"));

	let missing = ChartSpec::from_shortcode(&shortcode(r#"{{ chart "sales.csv" bar month profit }}"#));
	assert!(matches!(
		draw_chart(&table, &missing),
		Err(DatamdError::ColumnNotFound(column)) if column == "profit"
	));

	Ok(())
}

fn revenue_table(rows: usize) -> Table {
	let data = [("Jan", 120), ("Feb", 90), ("Mar", 150)];

	Table::new(
		vec!["month".to_string(), "revenue".to_string()],
		data.iter()
			.take(rows)
			.map(|(month, revenue)| vec![Cell::from(*month), Cell::Int(*revenue)])
			.collect(),
	)
}

#[rstest]
#[case::bar("bar")]
#[case::line("line")]
#[case::scatter("scatter")]
#[case::pie("pie")]
#[case::histogram("histogram")]
fn draws_every_chart_type(#[case] chart_type: &str, #[values(1, 3)] rows: usize) -> DatamdResult<()> {
	let spec = ChartSpec::from_shortcode(&shortcode(&format!(
		r#"{{{{ chart "sales.csv" {chart_type} month revenue }}}}"#
	)));
	assert_eq!(spec.chart_type.as_str(), chart_type);

	let svg = draw_chart(&revenue_table(rows), &spec)?;
	assert!(svg.contains("<svg"));
	assert!(svg.contains(&spec.title()));

	Ok(())
}

#[test]
fn pie_charts_need_a_positive_value() {
	let table = Table::new(
		vec!["month".to_string(), "revenue".to_string()],
		vec![
			vec![Cell::from("Jan"), Cell::Int(0)],
			vec![Cell::from("Feb"), Cell::Int(-5)],
		],
	);
	let spec = ChartSpec::from_shortcode(&shortcode(r#"{{ chart "sales.csv" pie month revenue }}"#));

	let result = draw_chart(&table, &spec);
	assert!(matches!(
		result,
		Err(DatamdError::Chart(message)) if message.contains("positive")
	));
}

#[test]
fn renders_chart_next_to_output() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	let source = write_file(tmp.path(), "sales.csv", "month,revenue\nJan,120\nFeb,90\n");
	let output_dir = tmp.path().join("site");
	let chart = shortcode(r#"{{ chart "sales.csv" bar month revenue title="Sales, 2024" }}"#);

	let markdown = render_chart(&source, &chart, &DatamdConfig::default(), &output_dir)?;
	let file_name = markdown
		.strip_prefix("![Sales, 2024](")
		.and_then(|rest| rest.strip_suffix(')'))
		.unwrap_or_else(|| panic!("unexpected chart markdown: {markdown}"));

	assert!(file_name.starts_with("chart_"));
	assert!(Path::new(file_name).extension().is_some_and(|ext| ext == "svg"));
	let svg = std::fs::read_to_string(output_dir.join(file_name))?;
	assert!(svg.contains("Sales, 2024"));

	Ok(())
}

fn fixture(name: &str) -> PathBuf {
	Path::new(env!("CARGO_MANIFEST_DIR"))
		.join("tests/fixtures")
		.join(name)
}

#[rstest]
#[case::first_sheet_by_default(SheetSelector::default(), &["name", "age"], &["Alice", "Bob", "Charlie"])]
#[case::sheet_by_index(SheetSelector::Index(1), &["city", "population"], &["NYC", "LA"])]
#[case::sheet_by_name(SheetSelector::Name("Cities".to_string()), &["city", "population"], &["NYC", "LA"])]
fn reads_spreadsheet_sheets(
	#[case] sheet: SheetSelector,
	#[case] columns: &[&str],
	#[case] first_column: &[&str],
) -> DatamdResult<()> {
	let table = read_spreadsheet(&fixture("people.xlsx"), &sheet)?;

	let owned = |values: &[&str]| values.iter().map(ToString::to_string).collect::<Vec<_>>();
	assert_eq!(table.columns, owned(columns));
	assert_eq!(names(&table), owned(first_column));

	Ok(())
}

#[rstest]
#[case::index_out_of_range(SheetSelector::Index(5))]
#[case::unknown_name(SheetSelector::Name("Missing".to_string()))]
fn rejects_missing_spreadsheet_sheets(#[case] sheet: SheetSelector) {
	let result = read_spreadsheet(&fixture("people.xlsx"), &sheet);

	assert!(matches!(result, Err(DatamdError::Spreadsheet(_))));
}

#[test]
fn renders_spreadsheet_with_transform() -> DatamdResult<()> {
	let rendered = render_spreadsheet(
		&fixture("people.xlsx"),
		&shortcode(r#"{{ xlsx "people.xlsx" People transform="filter:age>28|sort:-age" }}"#),
	)?;

	assert!(rendered.starts_with("| name"));
	assert!(rendered.contains("Charlie"));
	assert!(!rendered.contains("Bob"));
	assert!(rendered.find("Charlie") < rendered.find("Alice"));

	Ok(())
}

#[test]
fn renders_markdown_with_raw_html() -> DatamdResult<()> {
	let html = markdown_to_html("| a |\n| - |\n| 1 |\n\n<video controls></video>\n")?;

	assert!(html.contains("<table>"));
	assert!(html.contains("<video controls></video>"));

	Ok(())
}

#[test]
fn renders_page_template() -> DatamdResult<()> {
	let page = render_page("<p>hi</p>\n", "<Report>", &StyleOptions::default())?;

	assert!(page.starts_with("<!DOCTYPE html>"));
	assert!(page.contains("<title>&lt;Report&gt;</title>"));
	assert!(page.contains("<body>\n<p>hi</p>\n</body>"));
	assert!(page.contains("border-collapse: collapse;"));

	Ok(())
}

#[test]
fn preprocesses_csv_shortcodes() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	write_file(tmp.path(), "data.csv", SMALL_CSV);
	let config = DatamdConfig::default();
	let preprocessor = Preprocessor::new(&config, tmp.path());

	let result = preprocessor.run("# Title\n{{ csv \"data.csv\" }}\nAfter\n");
	assert_eq!(result.text, format!("# Title\n\n{SMALL_TABLE}\n\nAfter\n"));
	assert_eq!(result.shortcodes, 1);
	assert!(result.failures.is_empty());

	Ok(())
}

#[test]
fn leaves_fenced_code_untouched() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	let config = DatamdConfig::default();
	let preprocessor = Preprocessor::new(&config, tmp.path());
	let source = "```markdown\n{{ csv \"data.csv\" }}\n```\n~~~\n{{ json \"x.json\" }}\n~~~";

	let result = preprocessor.run(source);
	assert_eq!(result.text, source);
	assert_eq!(result.shortcodes, 0);

	Ok(())
}

#[rstest]
#[case::unknown_command(
	r#"{{ foo "data.csv" }}"#,
	"Unknown Data Markdown (DataMD) command: foo",
	false
)]
#[case::missing_file(
	r#"{{ csv "missing.csv" }}"#,
	"Error processing csv file missing.csv: File not found: missing.csv",
	true
)]
#[case::traversal(
	r#"{{ csv "../secret.csv" }}"#,
	"Error processing csv file ../secret.csv: Path traversal attempt detected: `../secret.csv`",
	true
)]
#[case::video_traversal(
	r#"{{ video "../clip.mp4" }}"#,
	"Error processing video file ../clip.mp4: Path traversal attempt detected: `../clip.mp4`",
	true
)]
#[case::bad_transform(
	r#"{{ csv "data.csv" transform="limit:0" }}"#,
	"Error processing csv file data.csv: invalid transformation: Limit must be a positive integer",
	true
)]
fn reports_shortcode_errors_inline(
	#[case] line: &str,
	#[case] expected: &str,
	#[case] failed: bool,
) -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	write_file(tmp.path(), "data.csv", SMALL_CSV);
	let config = DatamdConfig::default();
	let preprocessor = Preprocessor::new(&config, tmp.path());

	let result = preprocessor.run(line);
	assert_eq!(result.text, format!("\n{expected}\n"));
	assert_eq!(result.failures.len(), usize::from(failed));
	if failed {
		assert_eq!(result.failures[0].line, 1);
	}

	Ok(())
}

#[test]
fn gates_shortcodes_by_feature() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	let mut config = DatamdConfig::default();
	config.features.pdf_processing = false;
	config.features.excel_formats = vec!["xlsx".to_string()];
	let preprocessor = Preprocessor::new(&config, tmp.path());

	let lines = preprocessor.run_lines([r#"{{ pdf "doc.pdf" }}"#, r#"{{ ods "book.ods" }}"#]);
	assert_eq!(lines, vec![
		"",
		"Error processing pdf file doc.pdf: PDF processing is disabled by configuration",
		"",
		"",
		"Error processing ods file book.ods: The `ods` format is disabled by configuration",
	]);

	Ok(())
}

#[test]
fn caches_rendered_shortcodes() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	let source = write_file(tmp.path(), "data.csv", SMALL_CSV);
	set_mtime(&source, SystemTime::now() - Duration::from_secs(3600))?;
	let cache = CacheManager::new(tmp.path().join("cache"))?;
	let config = DatamdConfig::default();
	let preprocessor = Preprocessor::new(&config, tmp.path()).with_cache(Some(cache.clone()));

	let first = preprocessor.run(r#"{{ csv "data.csv" }}"#);
	assert_eq!(cache.info().cache_files, 1);

	preprocessor.run(r#"{{ video "clip.mp4" }}"#);
	assert_eq!(cache.info().cache_files, 1);

	let second = preprocessor.run(r#"{{ csv "data.csv" }}"#);
	assert_eq!(first, second);

	Ok(())
}

#[test]
fn config_changes_invalidate_cached_shortcodes() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	let source = write_file(tmp.path(), "data.csv", "a;b\n1;2\n");
	set_mtime(&source, SystemTime::now() - Duration::from_secs(3600))?;
	let cache = CacheManager::new(tmp.path().join("cache"))?;
	let line = r#"{{ csv "data.csv" }}"#;

	let comma = DatamdConfig::default();
	let first = Preprocessor::new(&comma, tmp.path())
		.with_cache(Some(cache.clone()))
		.run_lines([line]);

	let mut semicolon = DatamdConfig::default();
	semicolon.processing.default_csv_separator = ";".to_string();
	let cached = Preprocessor::new(&semicolon, tmp.path())
		.with_cache(Some(cache.clone()))
		.run_lines([line]);
	let uncached = Preprocessor::new(&semicolon, tmp.path()).run_lines([line]);

	assert_eq!(cached, uncached);
	assert_ne!(cached, first);
	assert!(cached.iter().any(|row| row.contains("| a ") || row.contains(" a |")));
	assert_eq!(cache.info().cache_files, 2);

	Ok(())
}

#[test]
fn cache_params_follow_config_reads() {
	let csv = shortcode(r#"{{ csv "data.csv" }}"#);
	let json = shortcode(r#"{{ json "data.json" }}"#);
	let base = DatamdConfig::default();
	let mut streaming = DatamdConfig::default();
	streaming.performance.max_memory_mb = 0;
	streaming.performance.chunk_size = 10;

	let before = Preprocessor::new(&base, ".");
	let after = Preprocessor::new(&streaming, ".");

	assert_ne!(
		before.cache_params(Command::Csv, &csv),
		after.cache_params(Command::Csv, &csv)
	);
	assert_eq!(
		before.cache_params(Command::Json, &json),
		after.cache_params(Command::Json, &json)
	);
	assert_eq!(
		before.cache_params(Command::Csv, &csv).get("config.csv_separator"),
		Some(&",".to_string())
	);
}

#[test]
fn processes_dmd_file_to_html() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	write_file(tmp.path(), "data.csv", SMALL_CSV);
	let input = write_file(
		tmp.path(),
		"report.dmd",
		"# Sales\n\n{{ csv \"data.csv\" }}\n\n{{ json \"missing.json\" }}\n",
	);
	let mut options = ProcessOptions::default();
	options.use_cache = false;

	let outcome = process_file(&input, None, &options)?;
	assert_eq!(outcome.output, tmp.path().join("report.html"));
	assert_eq!(outcome.shortcodes, 2);
	assert_eq!(outcome.failures.len(), 1);
	assert!(!tmp.path().join(".datamd").exists());

	let html = std::fs::read_to_string(&outcome.output)?;
	assert!(html.contains("<title>DataMD Processor Document</title>"));
	assert!(html.contains("<h1>Sales</h1>"));
	assert!(html.contains("<table>"));
	assert!(html.contains("Alice"));
	assert!(html.contains("Error processing json file missing.json"));

	Ok(())
}

#[test]
fn process_file_writes_cache_next_to_document() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	write_file(tmp.path(), "data.csv", SMALL_CSV);
	let input = write_file(tmp.path(), "report.dmd", "{{ csv \"data.csv\" }}\n");
	let output = tmp.path().join("out").join("page.html");

	let outcome = process_file(&input, Some(&output), &ProcessOptions::default())?;
	assert_eq!(outcome.output, output);
	assert!(output.is_file());

	let cache = CacheManager::new(default_cache_dir(tmp.path()))?;
	assert_eq!(cache.info().cache_files, 1);

	Ok(())
}

#[test]
fn rejects_invalid_inputs() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	let markdown = write_file(tmp.path(), "notes.md", "# Notes\n");
	let options = ProcessOptions::default();

	assert!(matches!(
		process_file(&markdown, None, &options),
		Err(DatamdError::InvalidInput(_))
	));
	assert!(matches!(
		process_file(&tmp.path().join("absent.dmd"), None, &options),
		Err(DatamdError::FileNotFound(_))
	));

	Ok(())
}

#[test]
fn processes_directories() -> DatamdResult<()> {
	let tmp = tempfile::tempdir()?;
	write_file(tmp.path(), "b.dmd", "# B\n");
	write_file(tmp.path(), "a.dmd", "# A\n");
	write_file(tmp.path(), "skip.dmd", "# Skip\n");
	write_file(tmp.path(), "readme.md", "# Readme\n");
	write_file(tmp.path(), ".gitignore", "skip.dmd\n");

	let files = find_dmd_files(tmp.path())?;
	assert_eq!(files, vec![tmp.path().join("a.dmd"), tmp.path().join("b.dmd")]);

	let mut options = ProcessOptions::default();
	options.use_cache = false;
	let outcomes = process_directory(tmp.path(), &options)?;
	assert_eq!(outcomes.len(), 2);
	assert!(outcomes.iter().all(Result::is_ok));
	assert!(tmp.path().join("a.html").is_file());
	assert!(!tmp.path().join("skip.html").exists());

	Ok(())
}
