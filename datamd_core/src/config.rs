use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::DatamdError;
use crate::DatamdResult;

/// Environment variable that supplies the config file path when `--config`
/// is not given.
pub const CONFIG_FILE_ENV: &str = "DATAMD_CONFIG_FILE";

/// Number of bytes in a megabyte, used for every `*_mb` limit.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Configuration tree for the processor.
///
/// Values are resolved in order: built-in defaults, then the config file,
/// then `DATAMD_*` environment variables, then command line flags.
///
/// ```json
/// {
///   "application": { "name": "DataMD Processor" },
///   "features": { "ocr_enabled": false },
///   "performance": { "chunk_size": 5000 }
/// }
/// ```
///
/// Missing sections and keys keep their defaults. Unknown sections are kept
/// and remain reachable through [`DatamdConfig::get`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatamdConfig {
	pub application: ApplicationConfig,
	pub features: FeaturesConfig,
	pub limits: LimitsConfig,
	pub processing: ProcessingConfig,
	pub performance: PerformanceConfig,
	pub security: SecurityConfig,
	pub cache: CacheConfig,
	/// Sections without a typed counterpart.
	#[serde(flatten)]
	pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
	pub name: String,
	pub version: String,
	pub environment: String,
}

impl Default for ApplicationConfig {
	fn default() -> Self {
		Self {
			name: "DataMD Processor".to_string(),
			version: "1.0.0".to_string(),
			environment: "production".to_string(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
	pub ocr_enabled: bool,
	pub pdf_processing: bool,
	pub video_support: bool,
	/// Spreadsheet shortcodes that may be used (`xlsx`, `xls`, `xlsm`, `ods`).
	pub excel_formats: Vec<String>,
}

impl Default for FeaturesConfig {
	fn default() -> Self {
		Self {
			ocr_enabled: true,
			pdf_processing: true,
			video_support: true,
			excel_formats: ["xlsx", "xls", "xlsm", "ods"]
				.map(String::from)
				.to_vec(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
	pub max_file_size_mb: u64,
	pub max_pages_pdf: usize,
	/// OCR languages accepted by `image_ocr`.
	pub supported_languages: Vec<String>,
}

impl Default for LimitsConfig {
	fn default() -> Self {
		Self {
			max_file_size_mb: 100,
			max_pages_pdf: 50,
			supported_languages: ["eng", "spa", "fra", "deu", "ind"]
				.map(String::from)
				.to_vec(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
	pub default_csv_separator: String,
	pub default_pdf_strategy: String,
	pub default_ocr_language: String,
	pub video_thumb_width: u32,
	pub video_thumb_height: u32,
}

impl Default for ProcessingConfig {
	fn default() -> Self {
		Self {
			default_csv_separator: ",".to_string(),
			default_pdf_strategy: "lines".to_string(),
			default_ocr_language: "eng".to_string(),
			video_thumb_width: 320,
			video_thumb_height: 240,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
	/// Rows per chunk when a csv file is streamed.
	pub chunk_size: usize,
	pub max_memory_mb: u64,
	/// Files larger than this are streamed and previewed instead of loaded.
	pub streaming_threshold_mb: u64,
}

impl Default for PerformanceConfig {
	fn default() -> Self {
		Self {
			chunk_size: 10_000,
			max_memory_mb: 100,
			streaming_threshold_mb: 10,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
	pub allow_directory_traversal: bool,
	pub max_filename_length: usize,
	/// Extensions (with leading dot) a shortcode may read. Empty allows all.
	pub allowed_file_extensions: Vec<String>,
}

impl Default for SecurityConfig {
	fn default() -> Self {
		Self {
			allow_directory_traversal: false,
			max_filename_length: 255,
			allowed_file_extensions: [
				".csv", ".json", ".xlsx", ".xls", ".xlsm", ".ods", ".pdf", ".jpg", ".jpeg", ".png",
				".gif", ".bmp", ".mp4", ".avi", ".mov", ".wmv",
			]
			.map(String::from)
			.to_vec(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
	pub enabled: bool,
	/// Cache directory. Defaults to `.datamd/cache` next to the processed
	/// document.
	pub directory: Option<PathBuf>,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			directory: None,
		}
	}
}

impl Default for DatamdConfig {
	fn default() -> Self {
		Self {
			application: ApplicationConfig::default(),
			features: FeaturesConfig::default(),
			limits: LimitsConfig::default(),
			processing: ProcessingConfig::default(),
			performance: PerformanceConfig::default(),
			security: SecurityConfig::default(),
			cache: CacheConfig::default(),
			extra: BTreeMap::new(),
		}
	}
}

/// Feature switches that gate shortcode commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
	Ocr,
	PdfProcessing,
	VideoSupport,
}

impl Feature {
	/// The config key under `features`.
	pub fn key(self) -> &'static str {
		match self {
			Self::Ocr => "ocr_enabled",
			Self::PdfProcessing => "pdf_processing",
			Self::VideoSupport => "video_support",
		}
	}

	pub fn label(self) -> &'static str {
		match self {
			Self::Ocr => "OCR processing",
			Self::PdfProcessing => "PDF processing",
			Self::VideoSupport => "Video support",
		}
	}
}

impl DatamdConfig {
	/// Defaults with `DATAMD_*` environment overrides applied.
	pub fn from_env() -> Self {
		let mut config = Self::default();
		config.apply_env(|name| std::env::var(name).ok());
		config
	}

	/// Load a config file and apply `DATAMD_*` environment overrides.
	///
	/// The format is picked from the file extension: `json` (also used when
	/// there is no extension), `toml`, `yaml` or `yml`.
	pub fn load(path: &Path) -> DatamdResult<Self> {
		let mut config = Self::load_file(path)?;
		config.apply_env(|name| std::env::var(name).ok());
		Ok(config)
	}

	/// Load a config file without looking at the environment.
	pub fn load_file(path: &Path) -> DatamdResult<Self> {
		let content = std::fs::read_to_string(path)?;
		let format = path
			.extension()
			.and_then(|e| e.to_str())
			.unwrap_or("json")
			.to_ascii_lowercase();
		let path_display = path.display().to_string();

		let config: Self = match format.as_str() {
			"json" => serde_json::from_str(&content).map_err(|e| {
				DatamdError::ConfigParse {
					path: path_display.clone(),
					reason: e.to_string(),
				}
			})?,
			"toml" => toml::from_str(&content).map_err(|e| {
				DatamdError::ConfigParse {
					path: path_display.clone(),
					reason: e.to_string(),
				}
			})?,
			"yaml" | "yml" => serde_yaml_ng::from_str(&content).map_err(|e| {
				DatamdError::ConfigParse {
					path: path_display.clone(),
					reason: e.to_string(),
				}
			})?,
			other => return Err(DatamdError::UnsupportedConfigFormat(other.to_string())),
		};

		tracing::debug!(path = %path_display, "loaded config file");
		Ok(config)
	}

	/// Apply `DATAMD_*` overrides using `lookup` to read variables.
	///
	/// Boolean variables are true for `true`, `1` or `yes` (any case) and
	/// false otherwise. Numeric variables are ignored unless they are all
	/// digits. Empty string variables are ignored.
	pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
		let text = |name: &str| lookup(name).filter(|value| !value.is_empty());
		let flag = |name: &str| lookup(name).map(|value| is_truthy(&value));
		let number = |name: &str| {
			lookup(name)
				.filter(|value| !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()))
				.and_then(|value| value.parse::<u64>().ok())
		};

		if let Some(value) = text("DATAMD_APP_NAME") {
			self.application.name = value;
		}
		if let Some(value) = text("DATAMD_APP_VERSION") {
			self.application.version = value;
		}
		if let Some(value) = text("DATAMD_ENVIRONMENT") {
			self.application.environment = value;
		}
		if let Some(value) = flag("DATAMD_OCR_ENABLED") {
			self.features.ocr_enabled = value;
		}
		if let Some(value) = flag("DATAMD_PDF_PROCESSING") {
			self.features.pdf_processing = value;
		}
		if let Some(value) = flag("DATAMD_VIDEO_SUPPORT") {
			self.features.video_support = value;
		}
		if let Some(value) = number("DATAMD_MAX_FILE_SIZE_MB") {
			self.limits.max_file_size_mb = value;
		}
		if let Some(value) = number("DATAMD_MAX_PAGES_PDF") {
			self.limits.max_pages_pdf = usize::try_from(value).unwrap_or(usize::MAX);
		}
		if let Some(value) = text("DATAMD_DEFAULT_CSV_SEPARATOR") {
			self.processing.default_csv_separator = value;
		}
		if let Some(value) = text("DATAMD_DEFAULT_PDF_STRATEGY") {
			self.processing.default_pdf_strategy = value;
		}
		if let Some(value) = text("DATAMD_DEFAULT_OCR_LANGUAGE") {
			self.processing.default_ocr_language = value;
		}
		if let Some(value) = flag("DATAMD_ALLOW_DIRECTORY_TRAVERSAL") {
			self.security.allow_directory_traversal = value;
		}
		if let Some(value) = flag("DATAMD_CACHE_ENABLED") {
			self.cache.enabled = value;
		}
		if let Some(value) = text("DATAMD_CACHE_DIR") {
			self.cache.directory = Some(PathBuf::from(value));
		}
	}

	/// The whole tree as a JSON value.
	pub fn to_value(&self) -> Value {
		serde_json::to_value(self).unwrap_or(Value::Null)
	}

	/// Look up a value by dot-separated path, e.g. `features.ocr_enabled`.
	pub fn get(&self, key_path: &str) -> Option<Value> {
		let root = self.to_value();
		key_path
			.split('.')
			.try_fold(&root, |value, key| value.get(key))
			.cloned()
	}

	/// Assign a value by dot-separated path. Missing intermediate sections are
	/// created. The assignment is rejected when it would give a typed key a
	/// value of the wrong type.
	pub fn set(&mut self, key_path: &str, value: impl Into<Value>) -> DatamdResult<()> {
		let invalid = |reason: &str| {
			DatamdError::InvalidConfigValue {
				key: key_path.to_string(),
				reason: reason.to_string(),
			}
		};

		let mut keys: Vec<&str> = key_path.split('.').collect();
		let Some(last) = keys.pop().filter(|key| !key.is_empty()) else {
			return Err(invalid("empty key"));
		};

		let mut root = self.to_value();
		let mut cursor = &mut root;
		for key in keys {
			let map = cursor
				.as_object_mut()
				.ok_or_else(|| invalid("parent is not a section"))?;
			cursor = map
				.entry(key.to_string())
				.or_insert_with(|| Value::Object(serde_json::Map::new()));
		}

		cursor
			.as_object_mut()
			.ok_or_else(|| invalid("parent is not a section"))?
			.insert(last.to_string(), value.into());

		*self = serde_json::from_value(root).map_err(|e| invalid(&e.to_string()))?;
		Ok(())
	}

	/// Write the configuration as pretty JSON.
	pub fn save(&self, path: &Path) -> DatamdResult<()> {
		let payload = serde_json::to_string_pretty(self).map_err(|e| {
			DatamdError::ConfigParse {
				path: path.display().to_string(),
				reason: e.to_string(),
			}
		})?;
		std::fs::write(path, payload)?;
		Ok(())
	}

	pub fn application_name(&self) -> &str {
		&self.application.name
	}

	pub fn is_feature_enabled(&self, feature: Feature) -> bool {
		match feature {
			Feature::Ocr => self.features.ocr_enabled,
			Feature::PdfProcessing => self.features.pdf_processing,
			Feature::VideoSupport => self.features.video_support,
		}
	}

	pub fn is_excel_format_enabled(&self, format: &str) -> bool {
		self.features
			.excel_formats
			.iter()
			.any(|enabled| enabled.eq_ignore_ascii_case(format))
	}

	pub fn max_file_size_bytes(&self) -> u64 {
		self.limits.max_file_size_mb.saturating_mul(BYTES_PER_MB)
	}

	pub fn streaming_threshold_bytes(&self) -> u64 {
		self.performance
			.streaming_threshold_mb
			.min(self.performance.max_memory_mb)
			.saturating_mul(BYTES_PER_MB)
	}

	/// Rows per chunk for streamed csv reads, never zero.
	pub fn chunk_size(&self) -> usize {
		self.performance.chunk_size.max(1)
	}
}

fn is_truthy(value: &str) -> bool {
	matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}
