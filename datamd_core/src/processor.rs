use std::path::Path;
use std::path::PathBuf;

use ignore::gitignore::Gitignore;
use ignore::gitignore::GitignoreBuilder;

use crate::CacheManager;
use crate::DatamdConfig;
use crate::DatamdError;
use crate::DatamdResult;
use crate::Preprocessor;
use crate::ShortcodeFailure;
use crate::StyleOptions;
use crate::cache::default_cache_dir;
use crate::markdown_to_html;
use crate::render_page;

/// Extension of documents handled by the processor.
pub const DMD_EXTENSION: &str = "dmd";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
	#[default]
	Html,
}

impl OutputFormat {
	pub fn extension(self) -> &'static str {
		match self {
			Self::Html => "html",
		}
	}
}

/// Settings shared by every processed document.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
	pub config: DatamdConfig,
	pub styles: StyleOptions,
	pub format: OutputFormat,
	/// Set to `false` to bypass the cache for this run.
	pub use_cache: bool,
	/// Overrides `cache.directory` from the config.
	pub cache_dir: Option<PathBuf>,
}

impl Default for ProcessOptions {
	fn default() -> Self {
		Self::new(DatamdConfig::default())
	}
}

impl ProcessOptions {
	pub fn new(config: DatamdConfig) -> Self {
		Self {
			config,
			styles: StyleOptions::default(),
			format: OutputFormat::Html,
			use_cache: true,
			cache_dir: None,
		}
	}

	/// The cache for documents in `base_dir`, or `None` when caching is off
	/// or the cache directory cannot be created.
	pub fn cache_for(&self, base_dir: &Path) -> Option<CacheManager> {
		if !self.use_cache || !self.config.cache.enabled {
			return None;
		}

		let dir = self
			.cache_dir
			.clone()
			.or_else(|| self.config.cache.directory.clone())
			.unwrap_or_else(|| default_cache_dir(base_dir));

		match CacheManager::new(&dir) {
			Ok(cache) => Some(cache),
			Err(error) => {
				tracing::warn!(dir = %dir.display(), error = %error, "cache disabled");
				None
			}
		}
	}
}

/// Result of processing one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
	pub input: PathBuf,
	pub output: PathBuf,
	pub shortcodes: usize,
	pub failures: Vec<ShortcodeFailure>,
}

pub fn is_dmd_file(path: &Path) -> bool {
	path.extension()
		.is_some_and(|extension| extension == DMD_EXTENSION)
}

/// Convert a `.dmd` document. The output defaults to the input path with the
/// output format's extension.
pub fn process_file(
	input: &Path,
	output: Option<&Path>,
	options: &ProcessOptions,
) -> DatamdResult<ProcessOutcome> {
	if !input.is_file() {
		return Err(DatamdError::FileNotFound(input.display().to_string()));
	}

	if !is_dmd_file(input) {
		return Err(DatamdError::InvalidInput(input.display().to_string()));
	}

	let source = std::fs::read_to_string(input)?;
	let base_dir = match input.parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
		_ => PathBuf::from("."),
	};
	let output = output.map_or_else(
		|| input.with_extension(options.format.extension()),
		Path::to_path_buf,
	);
	let output_dir = match output.parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
		_ => PathBuf::from("."),
	};

	let preprocessor = Preprocessor::new(&options.config, &base_dir)
		.with_output_dir(&output_dir)
		.with_cache(options.cache_for(&base_dir));
	let preprocessed = preprocessor.run(&source);

	let body = markdown_to_html(&preprocessed.text)?;
	let title = format!("{} Document", options.config.application_name());
	let page = match options.format {
		OutputFormat::Html => render_page(&body, &title, &options.styles)?,
	};

	std::fs::create_dir_all(&output_dir)?;
	std::fs::write(&output, page)?;
	tracing::debug!(
		input = %input.display(),
		output = %output.display(),
		shortcodes = preprocessed.shortcodes,
		failures = preprocessed.failures.len(),
		"processed document"
	);

	Ok(ProcessOutcome {
		input: input.to_path_buf(),
		output,
		shortcodes: preprocessed.shortcodes,
		failures: preprocessed.failures,
	})
}

/// Build a matcher for the `.gitignore` in `dir`, if there is one.
fn build_gitignore(dir: &Path) -> Gitignore {
	let mut builder = GitignoreBuilder::new(dir);
	let gitignore_path = dir.join(".gitignore");
	if gitignore_path.is_file() {
		if let Some(error) = builder.add(gitignore_path) {
			tracing::debug!(error = %error, "ignoring unreadable .gitignore");
		}
	}

	builder.build().unwrap_or_else(|_| Gitignore::empty())
}

/// `.dmd` files directly inside `dir`, sorted by path. Files excluded by the
/// directory's `.gitignore` are skipped.
pub fn find_dmd_files(dir: &Path) -> DatamdResult<Vec<PathBuf>> {
	let gitignore = build_gitignore(dir);
	let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
		.map_err(|e| DatamdError::Walk(format!("{}: {e}", dir.display())))?
		.filter_map(Result::ok)
		.map(|entry| entry.path())
		.filter(|path| path.is_file() && is_dmd_file(path))
		.filter(|path| !gitignore.matched(path, false).is_ignore())
		.collect();

	files.sort();
	Ok(files)
}

/// Convert every `.dmd` file directly inside `dir`. A failing document does
/// not stop the others; its error is returned in place of an outcome.
pub fn process_directory(
	dir: &Path,
	options: &ProcessOptions,
) -> DatamdResult<Vec<DatamdResult<ProcessOutcome>>> {
	let files = find_dmd_files(dir)?;

	Ok(files
		.iter()
		.map(|file| process_file(file, None, options))
		.collect())
}
