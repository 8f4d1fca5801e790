use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum DatamdError {
	#[error(transparent)]
	#[diagnostic(code(datamd::io_error))]
	Io(#[from] std::io::Error),

	#[error("failed to render markdown: {0}")]
	#[diagnostic(code(datamd::markdown))]
	Markdown(String),

	#[error("failed to parse config file `{path}`: {reason}")]
	#[diagnostic(
		code(datamd::config_parse),
		help("the config file must contain the application/features/limits/processing/performance/security sections")
	)]
	ConfigParse { path: String, reason: String },

	#[error("unsupported config file format: `{0}`")]
	#[diagnostic(
		code(datamd::unsupported_config_format),
		help("supported formats: json, toml, yaml, yml")
	)]
	UnsupportedConfigFormat(String),

	#[error("invalid value for config key `{key}`: {reason}")]
	#[diagnostic(code(datamd::invalid_config_value))]
	InvalidConfigValue { key: String, reason: String },

	#[error("Path traversal attempt detected: `{0}`")]
	#[diagnostic(
		code(datamd::path_traversal),
		help("reference data files relative to the document without `..` segments")
	)]
	PathTraversal(String),

	#[error("Access to path outside of working directory is not allowed: `{0}`")]
	#[diagnostic(code(datamd::outside_base))]
	OutsideBase(String),

	#[error("File not found: {0}")]
	#[diagnostic(code(datamd::file_not_found))]
	FileNotFound(String),

	#[error("file name is too long: `{name}` has {length} characters (limit: {limit})")]
	#[diagnostic(code(datamd::filename_too_long))]
	FilenameTooLong {
		name: String,
		length: usize,
		limit: usize,
	},

	#[error("file type not allowed: `{0}`")]
	#[diagnostic(
		code(datamd::file_type_not_allowed),
		help("add the extension to `security.allowed_file_extensions` in the config file")
	)]
	FileTypeNotAllowed(String),

	#[error("file too large: `{path}` is {size} bytes (limit: {limit} bytes)")]
	#[diagnostic(
		code(datamd::file_too_large),
		help("increase `limits.max_file_size_mb` in the config file")
	)]
	FileTooLarge { path: String, size: u64, limit: u64 },

	#[error("{0} is disabled by configuration")]
	#[diagnostic(code(datamd::feature_disabled))]
	FeatureDisabled(String),

	#[error("{command} requires {argument} parameter")]
	#[diagnostic(code(datamd::missing_argument))]
	MissingArgument { command: String, argument: String },

	#[error("invalid argument: {0}")]
	#[diagnostic(code(datamd::invalid_argument))]
	InvalidArgument(String),

	#[error("failed to read csv: {0}")]
	#[diagnostic(code(datamd::csv))]
	Csv(String),

	#[error("failed to read json: {0}")]
	#[diagnostic(code(datamd::json))]
	Json(String),

	#[error("failed to read spreadsheet: {0}")]
	#[diagnostic(code(datamd::spreadsheet))]
	Spreadsheet(String),

	#[error("failed to read PDF: {0}")]
	#[diagnostic(code(datamd::pdf))]
	Pdf(String),

	#[error("page {page} is out of range (document has {total} page(s))")]
	#[diagnostic(code(datamd::page_out_of_range))]
	PageOutOfRange { page: usize, total: usize },

	#[error("OCR failed: {0}")]
	#[diagnostic(
		code(datamd::ocr),
		help("install tesseract or point `DATAMD_TESSERACT` at the executable")
	)]
	Ocr(String),

	#[error("failed to generate thumbnail: {0}")]
	#[diagnostic(
		code(datamd::video_thumb),
		help("install ffmpeg or point `DATAMD_FFMPEG` at the executable")
	)]
	VideoThumb(String),

	#[error("failed to draw chart: {0}")]
	#[diagnostic(code(datamd::chart))]
	Chart(String),

	#[error("invalid transformation: {0}")]
	#[diagnostic(
		code(datamd::transform),
		help("supported operations: filter, sort, limit, groupby, agg")
	)]
	Transform(String),

	#[error("Column '{0}' not found")]
	#[diagnostic(code(datamd::column_not_found))]
	ColumnNotFound(String),

	#[error("template rendering failed: {0}")]
	#[diagnostic(code(datamd::template_render))]
	TemplateRender(String),

	#[error("input file must have a `.dmd` extension: `{0}`")]
	#[diagnostic(code(datamd::invalid_input))]
	InvalidInput(String),

	#[error("failed to walk directory: {0}")]
	#[diagnostic(code(datamd::walk))]
	Walk(String),
}

pub type DatamdResult<T> = Result<T, DatamdError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
