use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use crate::CacheManager;
use crate::CacheParams;
use crate::DatamdConfig;
use crate::DatamdError;
use crate::DatamdResult;
use crate::Feature;
use crate::chart::render_chart;
use crate::document::render_pdf;
use crate::document::render_pdf_table;
use crate::media::render_image_ocr;
use crate::media::render_video;
use crate::media::render_video_thumb;
use crate::security::resolve_secure_path;
use crate::security::validate_source;
use crate::shortcode::Shortcode;
use crate::shortcode::parse_shortcode;
use crate::tabular::render_csv;
use crate::tabular::render_json;
use crate::tabular::render_spreadsheet;

/// Shortcode commands understood by the preprocessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
	Csv,
	Json,
	/// `xlsx`, `xls`, `xlsm` or `ods`.
	Spreadsheet,
	Pdf,
	PdfTable,
	ImageOcr,
	Video,
	VideoThumb,
	Chart,
}

impl Command {
	pub fn parse(name: &str) -> Option<Self> {
		let command = match name {
			"csv" => Self::Csv,
			"json" => Self::Json,
			"xlsx" | "xls" | "xlsm" | "ods" => Self::Spreadsheet,
			"pdf" => Self::Pdf,
			"pdf_table" => Self::PdfTable,
			"image_ocr" => Self::ImageOcr,
			"video" => Self::Video,
			"video_thumb" => Self::VideoThumb,
			"chart" => Self::Chart,
			_ => return None,
		};

		Some(command)
	}

	/// The feature switch that must be on for this command.
	pub fn feature(self) -> Option<Feature> {
		match self {
			Self::Pdf | Self::PdfTable => Some(Feature::PdfProcessing),
			Self::ImageOcr => Some(Feature::Ocr),
			Self::Video | Self::VideoThumb => Some(Feature::VideoSupport),
			Self::Csv | Self::Json | Self::Spreadsheet | Self::Chart => None,
		}
	}

	/// Commands whose output depends only on the source file and the
	/// arguments. Commands that write files next to the output are not
	/// cached.
	pub fn is_cacheable(self) -> bool {
		matches!(
			self,
			Self::Csv | Self::Json | Self::Spreadsheet | Self::Pdf | Self::PdfTable | Self::ImageOcr
		)
	}
}

/// A shortcode that failed and was replaced by an inline error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcodeFailure {
	/// 1 based line number in the source document.
	pub line: usize,
	pub command: String,
	pub path: String,
	pub message: String,
}

/// The preprocessed Markdown document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preprocessed {
	pub text: String,
	/// Number of shortcodes that were replaced, including failed ones.
	pub shortcodes: usize,
	pub failures: Vec<ShortcodeFailure>,
}

/// Replaces shortcode lines with rendered Markdown or HTML.
#[derive(Debug, Clone)]
pub struct Preprocessor<'a> {
	config: &'a DatamdConfig,
	/// Shortcode paths are resolved relative to this directory.
	base_dir: PathBuf,
	/// Generated thumbnails and charts are written here.
	output_dir: PathBuf,
	cache: Option<CacheManager>,
}

impl<'a> Preprocessor<'a> {
	pub fn new(config: &'a DatamdConfig, base_dir: impl Into<PathBuf>) -> Self {
		let base_dir = base_dir.into();

		Self {
			config,
			output_dir: base_dir.clone(),
			base_dir,
			cache: None,
		}
	}

	#[must_use]
	pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
		self.output_dir = output_dir.into();
		self
	}

	#[must_use]
	pub fn with_cache(mut self, cache: Option<CacheManager>) -> Self {
		self.cache = cache;
		self
	}

	pub fn base_dir(&self) -> &Path {
		&self.base_dir
	}

	/// Preprocess a whole document. Lines inside fenced code blocks are left
	/// untouched.
	pub fn run(&self, source: &str) -> Preprocessed {
		let mut output: Vec<String> = vec![];
		let mut result = Preprocessed::default();
		let mut fence: Option<&str> = None;

		for (index, line) in source.lines().enumerate() {
			let trimmed = line.trim_start();
			let marker = ["```", "~~~"]
				.into_iter()
				.find(|marker| trimmed.starts_with(marker));

			match (fence, marker) {
				(None, Some(marker)) => fence = Some(marker),
				(Some(open), Some(marker)) if open == marker => fence = None,
				_ => {}
			}

			let shortcode = if fence.is_none() && marker.is_none() {
				parse_shortcode(line)
			} else {
				None
			};

			let Some(shortcode) = shortcode else {
				output.push(line.to_string());
				continue;
			};

			result.shortcodes += 1;
			let replacement = match self.render_shortcode(&shortcode) {
				Ok(rendered) => rendered,
				Err(error) => {
					tracing::warn!(
						line = index + 1,
						command = %shortcode.command,
						path = %shortcode.path,
						error = %error,
						"shortcode failed"
					);
					result.failures.push(ShortcodeFailure {
						line: index + 1,
						command: shortcode.command.clone(),
						path: shortcode.path.clone(),
						message: error.to_string(),
					});
					format!(
						"Error processing {} file {}: {error}",
						shortcode.command, shortcode.path
					)
				}
			};

			output.push(String::new());
			output.push(replacement);
			output.push(String::new());
		}

		result.text = output.join("\n");
		if source.ends_with('\n') {
			result.text.push('\n');
		}

		result
	}

	/// Preprocess a document given as lines, returning the new lines.
	pub fn run_lines<'l>(&self, lines: impl IntoIterator<Item = &'l str>) -> Vec<String> {
		let source = lines.into_iter().collect::<Vec<_>>().join("\n");
		self.run(&source).text.lines().map(String::from).collect()
	}

	/// Cache parameters for `shortcode`: its arguments plus the configuration
	/// values `command` reads, so a config change invalidates old entries.
	pub fn cache_params(&self, command: Command, shortcode: &Shortcode) -> CacheParams {
		let mut params = shortcode.cache_params();
		let config = self.config;
		let settings: Vec<(&str, String)> = match command {
			Command::Csv => {
				vec![
					("csv_separator", config.processing.default_csv_separator.clone()),
					("streaming_threshold", config.streaming_threshold_bytes().to_string()),
					("chunk_size", config.chunk_size().to_string()),
				]
			}
			Command::Pdf => vec![("max_pages_pdf", config.limits.max_pages_pdf.to_string())],
			Command::PdfTable => {
				vec![("pdf_strategy", config.processing.default_pdf_strategy.clone())]
			}
			Command::ImageOcr => {
				vec![
					("ocr_language", config.processing.default_ocr_language.clone()),
					("supported_languages", config.limits.supported_languages.join(",")),
				]
			}
			Command::Json
			| Command::Spreadsheet
			| Command::Video
			| Command::VideoThumb
			| Command::Chart => vec![],
		};

		for (key, value) in settings {
			params.insert(format!("config.{key}"), value);
		}

		params
	}

	/// Render a single shortcode.
	pub fn render_shortcode(&self, shortcode: &Shortcode) -> DatamdResult<String> {
		let Some(command) = Command::parse(&shortcode.command) else {
			return Ok(format!(
				"Unknown Data Markdown (DataMD) command: {}",
				shortcode.command
			));
		};

		tracing::debug!(command = %shortcode.command, path = %shortcode.path, "rendering shortcode");

		if let Some(feature) = command.feature() {
			if !self.config.is_feature_enabled(feature) {
				return Err(DatamdError::FeatureDisabled(feature.label().to_string()));
			}
		}

		if command == Command::Spreadsheet && !self.config.is_excel_format_enabled(&shortcode.command)
		{
			return Err(DatamdError::FeatureDisabled(format!(
				"The `{}` format",
				shortcode.command
			)));
		}

		let allow_traversal = self.config.security.allow_directory_traversal;

		// The player loads the video itself, so the path may be a URL or a
		// file that only exists next to the published page.
		if command == Command::Video {
			let has_parent = Path::new(&shortcode.path)
				.components()
				.any(|component| matches!(component, Component::ParentDir));
			if has_parent && !allow_traversal {
				return Err(DatamdError::PathTraversal(shortcode.path.clone()));
			}

			return Ok(render_video(shortcode));
		}

		let path = resolve_secure_path(&shortcode.path, Some(&self.base_dir), allow_traversal)?;
		validate_source(&path, self.config)?;

		let cache = self.cache.as_ref().filter(|_| command.is_cacheable());
		let cache_path = path.to_string_lossy().into_owned();
		let params = self.cache_params(command, shortcode);

		if let Some(cached) = cache.and_then(|cache| cache.get(&cache_path, &params)) {
			return Ok(cached);
		}

		let rendered = match command {
			Command::Csv => render_csv(&path, shortcode, self.config)?,
			Command::Json => render_json(&path, shortcode)?,
			Command::Spreadsheet => render_spreadsheet(&path, shortcode)?,
			Command::Pdf => render_pdf(&path, shortcode, self.config)?,
			Command::PdfTable => render_pdf_table(&path, shortcode, self.config)?,
			Command::ImageOcr => render_image_ocr(&path, shortcode, self.config)?,
			Command::VideoThumb => {
				render_video_thumb(&path, shortcode, self.config, &self.output_dir)?
			}
			Command::Chart => render_chart(&path, shortcode, self.config, &self.output_dir)?,
			Command::Video => render_video(shortcode),
		};

		if let Some(cache) = cache {
			if !cache.set(&cache_path, &rendered, &params) {
				tracing::debug!(path = %cache_path, "could not write cache entry");
			}
		}

		Ok(rendered)
	}
}
