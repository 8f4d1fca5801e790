use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use crate::DatamdConfig;
use crate::DatamdError;
use crate::DatamdResult;

/// Resolve a path referenced by a shortcode so that it stays inside
/// `base_dir`.
///
/// Relative paths are joined to `base_dir` (the current directory when
/// `None`). Paths with a `..` component and paths that resolve outside the
/// base are rejected unless `allow_traversal` is set. The returned path is
/// canonical and points at an existing file or directory.
pub fn resolve_secure_path(
	file_path: &str,
	base_dir: Option<&Path>,
	allow_traversal: bool,
) -> DatamdResult<PathBuf> {
	let requested = Path::new(file_path);

	if !allow_traversal
		&& requested
			.components()
			.any(|component| matches!(component, Component::ParentDir))
	{
		return Err(DatamdError::PathTraversal(file_path.to_string()));
	}

	let base = match base_dir {
		Some(base) => base.to_path_buf(),
		None => std::env::current_dir()?,
	};
	let canonical_base = base.canonicalize().unwrap_or_else(|_| base.clone());

	if !allow_traversal
		&& requested.is_absolute()
		&& !requested.starts_with(&base)
		&& !requested.starts_with(&canonical_base)
	{
		return Err(DatamdError::OutsideBase(file_path.to_string()));
	}

	let joined = if requested.is_absolute() {
		requested.to_path_buf()
	} else {
		canonical_base.join(requested)
	};

	let resolved = joined
		.canonicalize()
		.map_err(|_| DatamdError::FileNotFound(file_path.to_string()))?;

	// Symlinks can still point outside the base after canonicalization.
	if !allow_traversal && !resolved.starts_with(&canonical_base) {
		return Err(DatamdError::OutsideBase(file_path.to_string()));
	}

	Ok(resolved)
}

/// Check a resolved source file against the `security` and `limits`
/// sections of the configuration.
pub fn validate_source(path: &Path, config: &DatamdConfig) -> DatamdResult<()> {
	let name = path
		.file_name()
		.map(|name| name.to_string_lossy().into_owned())
		.unwrap_or_default();
	let length = name.chars().count();
	let limit = config.security.max_filename_length;

	if length > limit {
		return Err(DatamdError::FilenameTooLong {
			name,
			length,
			limit,
		});
	}

	let allowed = &config.security.allowed_file_extensions;
	if !allowed.is_empty() {
		let extension = path
			.extension()
			.map(|extension| format!(".{}", extension.to_string_lossy().to_ascii_lowercase()))
			.unwrap_or_default();

		if !allowed
			.iter()
			.any(|allowed| allowed.eq_ignore_ascii_case(&extension))
		{
			return Err(DatamdError::FileTypeNotAllowed(name));
		}
	}

	let size = std::fs::metadata(path)?.len();
	let limit = config.max_file_size_bytes();
	if size > limit {
		return Err(DatamdError::FileTooLarge {
			path: path.display().to_string(),
			size,
			limit,
		});
	}

	Ok(())
}
