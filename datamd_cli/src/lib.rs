use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::Instant;

use clap::Parser;
use clap::ValueEnum;
use datamd_core::DatamdConfig;
use datamd_core::OutputFormat;
use datamd_core::ProcessOptions;
use datamd_core::StyleOptions;
use datamd_core::is_dmd_file;

/// Events for the same file closer together than this are ignored.
pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Render data-driven markdown (.dmd) documents to HTML.",
	long_about = "datamd converts `.dmd` documents to HTML. A `.dmd` file is ordinary markdown in \
	              which lines such as `{{ csv \"sales.csv\" }}` are replaced by a rendering of \
	              the referenced file: tables for csv, json and spreadsheets, text for pdf \
	              pages and images, players and thumbnails for video, and charts.\n\nExamples:\n  \
	              datamd report.dmd              Write report.html\n  datamd docs/ -o site/      \
	              Convert every .dmd file in docs/\n  datamd report.dmd --watch      Rebuild on \
	              every change"
)]
#[allow(clippy::struct_excessive_bools)]
pub struct DatamdCli {
	/// A `.dmd` file or a directory containing `.dmd` files.
	pub input: PathBuf,

	/// Output file. When the input is a directory this is the directory the
	/// rendered documents are written to.
	#[arg(long, short)]
	pub output: Option<PathBuf>,

	/// Rebuild whenever the input changes. For a directory only the `.dmd`
	/// files directly inside it are watched, nested directories are not watched.
	#[arg(long, short, default_value_t = false)]
	pub watch: bool,

	/// Configuration file (json, toml or yaml).
	#[arg(long, short, env = "DATAMD_CONFIG_FILE")]
	pub config: Option<PathBuf>,

	/// Output format.
	#[arg(long, short, value_enum, default_value_t = FormatArg::Html)]
	pub format: FormatArg,

	/// CSS declarations for the page `body`.
	#[arg(long)]
	pub style_body: Option<String>,

	/// CSS declarations for `table` elements.
	#[arg(long)]
	pub style_table: Option<String>,

	/// CSS declarations for table cells (`th` and `td`).
	#[arg(long)]
	pub style_cell: Option<String>,

	/// CSS declarations for table headers (`th`).
	#[arg(long)]
	pub style_header: Option<String>,

	/// CSS declarations for `pre` blocks.
	#[arg(long)]
	pub style_pre: Option<String>,

	/// CSS declarations for `video` elements.
	#[arg(long)]
	pub style_video: Option<String>,

	/// CSS declarations for `img` elements.
	#[arg(long)]
	pub style_img: Option<String>,

	/// Rows per chunk when a large csv file is streamed.
	#[arg(long)]
	pub chunk_size: Option<usize>,

	/// Memory budget in megabytes. Csv files larger than this are streamed.
	#[arg(long)]
	pub max_memory: Option<u64>,

	/// Directory for cached shortcode output.
	#[arg(long)]
	pub cache_dir: Option<PathBuf>,

	/// Render every shortcode without reading or writing the cache.
	#[arg(long, default_value_t = false)]
	pub no_cache: bool,

	/// Enable verbose output.
	#[arg(long, short, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
	/// A standalone HTML page.
	Html,
}

impl From<FormatArg> for OutputFormat {
	fn from(format: FormatArg) -> Self {
		match format {
			FormatArg::Html => Self::Html,
		}
	}
}

impl DatamdCli {
	/// Apply the flags that override configuration values.
	pub fn apply_overrides(&self, config: &mut DatamdConfig) {
		if let Some(chunk_size) = self.chunk_size {
			config.performance.chunk_size = chunk_size;
		}

		if let Some(max_memory) = self.max_memory {
			config.performance.max_memory_mb = max_memory;
		}
	}

	/// The default page styles with any `--style-*` flags applied.
	pub fn styles(&self) -> StyleOptions {
		let mut styles = StyleOptions::default();
		let overrides = [
			(&self.style_body, &mut styles.body),
			(&self.style_table, &mut styles.table),
			(&self.style_cell, &mut styles.cell),
			(&self.style_header, &mut styles.header),
			(&self.style_pre, &mut styles.pre),
			(&self.style_video, &mut styles.video),
			(&self.style_img, &mut styles.img),
		];

		for (flag, style) in overrides {
			if let Some(value) = flag {
				style.clone_from(value);
			}
		}

		styles
	}

	pub fn process_options(&self, mut config: DatamdConfig) -> ProcessOptions {
		self.apply_overrides(&mut config);

		ProcessOptions {
			config,
			styles: self.styles(),
			format: self.format.into(),
			use_cache: !self.no_cache,
			cache_dir: self.cache_dir.clone(),
		}
	}

	/// Where a document from a directory input is written.
	pub fn directory_output(&self, file: &Path, format: OutputFormat) -> Option<PathBuf> {
		let output_dir = self.output.as_ref()?;
		let name = file.file_name()?;

		Some(output_dir.join(name).with_extension(format.extension()))
	}
}

/// What a watch session rebuilds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchTarget {
	/// A single document; only changes to it trigger a rebuild.
	File(PathBuf),
	/// Every `.dmd` file directly inside the directory.
	Directory(PathBuf),
}

impl WatchTarget {
	/// Build a target from the command line input. Paths are canonicalized
	/// so that they compare equal to the paths reported by the watcher.
	pub fn from_input(input: &Path) -> std::io::Result<Self> {
		let canonical = input.canonicalize()?;

		if canonical.is_dir() {
			Ok(Self::Directory(canonical))
		} else {
			Ok(Self::File(canonical))
		}
	}

	/// The directory handed to the watcher.
	pub fn watch_dir(&self) -> &Path {
		match self {
			Self::File(file) => file.parent().unwrap_or(file.as_path()),
			Self::Directory(dir) => dir.as_path(),
		}
	}

	pub fn matches(&self, path: &Path) -> bool {
		let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

		match self {
			Self::File(file) => canonical == *file,
			Self::Directory(dir) => {
				is_dmd_file(&canonical) && canonical.parent() == Some(dir.as_path())
			}
		}
	}
}

/// Per path debounce: a path is rebuilt at most once per interval.
#[derive(Debug, Clone)]
pub struct Debouncer {
	interval: Duration,
	last_run: HashMap<PathBuf, Instant>,
}

impl Debouncer {
	pub fn new(interval: Duration) -> Self {
		Self {
			interval,
			last_run: HashMap::new(),
		}
	}

	/// Record a run for `path` at `now` unless the previous run was less than
	/// the interval ago.
	pub fn should_run(&mut self, path: &Path, now: Instant) -> bool {
		if let Some(last) = self.last_run.get(path) {
			if now.saturating_duration_since(*last) < self.interval {
				return false;
			}
		}

		self.last_run.insert(path.to_path_buf(), now);
		true
	}
}
