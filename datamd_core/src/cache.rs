use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

use crate::DatamdResult;
use crate::config::BYTES_PER_MB;

pub(crate) const CACHE_SCHEMA_VERSION: u32 = 1;
const CACHE_FILE_EXTENSION: &str = "cache";

/// Parameters that distinguish two renderings of the same source file.
pub type CacheParams = BTreeMap<String, String>;

/// Default cache directory for documents under `base`.
pub fn default_cache_dir(base: &Path) -> PathBuf {
	base.join(".datamd").join("cache")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
	schema_version: u32,
	source: String,
	value: String,
}

/// Summary of the files held by a [`CacheManager`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheInfo {
	pub cache_dir: PathBuf,
	pub cache_files: usize,
	pub total_size_bytes: u64,
	pub total_size_mb: f64,
}

/// File backed cache of rendered shortcode output.
///
/// Each entry is stored as `<key>.cache` where the key is derived from the
/// source path and the shortcode parameters. An entry is only served while
/// the source file is older than the entry.
#[derive(Debug, Clone)]
pub struct CacheManager {
	dir: PathBuf,
}

impl CacheManager {
	/// Create a cache rooted at `dir`, creating the directory when needed.
	pub fn new(dir: impl Into<PathBuf>) -> DatamdResult<Self> {
		let dir = dir.into();
		std::fs::create_dir_all(&dir)?;
		Ok(Self { dir })
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// MD5 hex digest of `file_path` followed by `|key=value` for every
	/// parameter in key order.
	pub fn cache_key(file_path: &str, params: &CacheParams) -> String {
		let mut material = file_path.to_string();
		for (key, value) in params {
			material.push('|');
			material.push_str(key);
			material.push('=');
			material.push_str(value);
		}

		format!("{:x}", md5::compute(material.as_bytes()))
	}

	fn entry_path(&self, file_path: &str, params: &CacheParams) -> PathBuf {
		self.dir.join(format!(
			"{}.{CACHE_FILE_EXTENSION}",
			Self::cache_key(file_path, params)
		))
	}

	/// Cached value for `file_path`, or `None` when the entry is missing,
	/// unreadable or older than the source file.
	pub fn get(&self, file_path: &str, params: &CacheParams) -> Option<String> {
		let entry_path = self.entry_path(file_path, params);
		let Ok(entry_modified) = std::fs::metadata(&entry_path).and_then(|m| m.modified()) else {
			tracing::debug!(source = file_path, "cache miss");
			return None;
		};

		if !is_fresh(Path::new(file_path), entry_modified) {
			tracing::debug!(source = file_path, "cache entry is stale");
			return None;
		}

		let entry = std::fs::read(&entry_path)
			.ok()
			.and_then(|bytes| serde_json::from_slice::<CacheEntry>(&bytes).ok())
			.filter(|entry| entry.schema_version == CACHE_SCHEMA_VERSION);

		let Some(entry) = entry else {
			tracing::debug!(path = %entry_path.display(), "removing corrupt cache entry");
			let _ = std::fs::remove_file(&entry_path);
			return None;
		};

		tracing::debug!(source = file_path, "cache hit");
		Some(entry.value)
	}

	/// Store `value` for `file_path`. Returns `false` when the entry could
	/// not be written.
	pub fn set(&self, file_path: &str, value: &str, params: &CacheParams) -> bool {
		let entry_path = self.entry_path(file_path, params);
		let entry = CacheEntry {
			schema_version: CACHE_SCHEMA_VERSION,
			source: file_path.to_string(),
			value: value.to_string(),
		};

		if std::fs::create_dir_all(&self.dir).is_err() {
			return false;
		}

		let Ok(payload) = serde_json::to_vec(&entry) else {
			return false;
		};

		let temp_path = entry_path.with_extension(format!(
			"{CACHE_FILE_EXTENSION}.tmp-{}-{}",
			std::process::id(),
			SystemTime::now()
				.duration_since(UNIX_EPOCH)
				.map_or(0, |duration| duration.as_nanos())
		));

		if std::fs::write(&temp_path, payload).is_err() {
			return false;
		}

		if std::fs::rename(&temp_path, &entry_path).is_err() {
			let _ = std::fs::remove_file(temp_path);
			return false;
		}

		true
	}

	/// Remove the entry for `file_path`. Returns `true` when an entry
	/// existed.
	pub fn invalidate(&self, file_path: &str, params: &CacheParams) -> bool {
		std::fs::remove_file(self.entry_path(file_path, params)).is_ok()
	}

	/// Remove every cache entry. Returns `false` when any removal failed.
	pub fn clear(&self) -> bool {
		let Ok(entries) = std::fs::read_dir(&self.dir) else {
			return false;
		};

		let mut cleared = true;
		for path in entries.flatten().map(|entry| entry.path()) {
			if is_cache_file(&path) && std::fs::remove_file(&path).is_err() {
				cleared = false;
			}
		}

		cleared
	}

	pub fn info(&self) -> CacheInfo {
		let sizes: Vec<u64> = std::fs::read_dir(&self.dir)
			.map(|entries| {
				entries
					.flatten()
					.filter(|entry| is_cache_file(&entry.path()))
					.filter_map(|entry| entry.metadata().ok())
					.map(|metadata| metadata.len())
					.collect()
			})
			.unwrap_or_default();
		let total_size_bytes: u64 = sizes.iter().sum();

		#[allow(clippy::cast_precision_loss)]
		let total_size_mb = total_size_bytes as f64 / BYTES_PER_MB as f64;

		CacheInfo {
			cache_dir: self.dir.clone(),
			cache_files: sizes.len(),
			total_size_bytes,
			total_size_mb: (total_size_mb * 100.0).round() / 100.0,
		}
	}
}

/// A cache entry is fresh while the source is strictly older than it. Missing
/// sources never invalidate their entries.
fn is_fresh(source: &Path, entry_modified: SystemTime) -> bool {
	match std::fs::metadata(source).and_then(|m| m.modified()) {
		Ok(source_modified) => source_modified < entry_modified,
		Err(_) => true,
	}
}

fn is_cache_file(path: &Path) -> bool {
	path.is_file()
		&& path
			.extension()
			.is_some_and(|extension| extension == CACHE_FILE_EXTENSION)
}
