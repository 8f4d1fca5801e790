//! Image and video renderers: `image_ocr`, `video` and `video_thumb`.
//!
//! OCR and frame extraction run the `tesseract` and `ffmpeg` executables.
//! Set `DATAMD_TESSERACT` or `DATAMD_FFMPEG` to use a binary that is not on
//! `PATH`.

use std::ffi::OsString;
use std::path::Path;
use std::process::Command;
use std::process::Output;

use image::ImageFormat;

use crate::DatamdConfig;
use crate::DatamdError;
use crate::DatamdResult;
use crate::sanitize::sanitize_boolean_input;
use crate::sanitize::sanitize_language_code;
use crate::sanitize::sanitize_numeric_input;
use crate::shortcode::Shortcode;

pub const TESSERACT_ENV: &str = "DATAMD_TESSERACT";
pub const FFMPEG_ENV: &str = "DATAMD_FFMPEG";

/// Largest accepted video or thumbnail dimension in pixels.
pub const MAX_DIMENSION: f64 = 3840.0;

fn program(env_name: &str, default: &str) -> OsString {
	std::env::var_os(env_name)
		.filter(|value| !value.is_empty())
		.unwrap_or_else(|| OsString::from(default))
}

fn stderr_message(output: &Output) -> String {
	let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
	if stderr.is_empty() {
		format!("exited with {}", output.status)
	} else {
		stderr
	}
}

/// `{{ image_ocr "scan.png" [lang] }}`
///
/// The image is decoded and written out as PNG first so that any format the
/// `image` crate understands can be recognised.
pub fn render_image_ocr(
	path: &Path,
	shortcode: &Shortcode,
	config: &DatamdConfig,
) -> DatamdResult<String> {
	let requested = shortcode
		.positional_at(0)
		.or_else(|| shortcode.keyword("lang"))
		.unwrap_or(config.processing.default_ocr_language.as_str());
	let language = sanitize_language_code(Some(requested), &config.limits.supported_languages);

	let image = image::open(path).map_err(|e| DatamdError::Ocr(e.to_string()))?;
	let normalized = tempfile::Builder::new()
		.prefix("datamd-ocr-")
		.suffix(".png")
		.tempfile()?;
	image
		.save_with_format(normalized.path(), ImageFormat::Png)
		.map_err(|e| DatamdError::Ocr(e.to_string()))?;

	let tesseract = program(TESSERACT_ENV, "tesseract");
	tracing::debug!(path = %path.display(), language = %language, "running tesseract");
	let output = Command::new(&tesseract)
		.arg(normalized.path())
		.arg("stdout")
		.arg("-l")
		.arg(&language)
		.output()
		.map_err(|e| {
			DatamdError::Ocr(format!(
				"could not run `{}`: {e}",
				tesseract.to_string_lossy()
			))
		})?;

	if !output.status.success() {
		return Err(DatamdError::Ocr(stderr_message(&output)));
	}

	Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn escape_attribute(value: &str) -> String {
	value
		.replace('&', "&amp;")
		.replace('"', "&quot;")
		.replace('<', "&lt;")
		.replace('>', "&gt;")
}

/// MIME type for the `<source>` element.
pub fn video_mime_type(path: &str) -> &'static str {
	let extension = Path::new(path)
		.extension()
		.map(|extension| extension.to_string_lossy().to_ascii_lowercase())
		.unwrap_or_default();

	match extension.as_str() {
		"webm" => "video/webm",
		"ogg" | "ogv" => "video/ogg",
		"mov" => "video/quicktime",
		"avi" => "video/x-msvideo",
		"wmv" => "video/x-ms-wmv",
		_ => "video/mp4",
	}
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn dimension(value: Option<&str>, default: u32) -> u32 {
	sanitize_numeric_input(value, 1.0, MAX_DIMENSION, f64::from(default)).round() as u32
}

/// `{{ video "clip.mp4" [width] [height] [controls] [autoplay] }}`
///
/// `src` is the path as written in the shortcode so that it resolves
/// relative to the rendered page.
pub fn render_video(shortcode: &Shortcode) -> String {
	let arg = |index: usize, key: &str| {
		shortcode
			.positional_at(index)
			.or_else(|| shortcode.keyword(key))
	};
	let width = dimension(arg(0, "width"), 640);
	let height = dimension(arg(1, "height"), 480);
	let controls = sanitize_boolean_input(arg(2, "controls"), true);
	let autoplay = sanitize_boolean_input(arg(3, "autoplay"), false);

	let controls_attr = if controls { " controls" } else { "" };
	let autoplay_attr = if autoplay { " autoplay" } else { "" };

	format!(
		"<video width=\"{width}\" height=\"{height}\"{controls_attr}{autoplay_attr}>\n  <source \
		 src=\"{}\" type=\"{}\">\n  Your browser does not support the video tag.\n</video>",
		escape_attribute(&shortcode.path),
		video_mime_type(&shortcode.path),
	)
}

/// Resolved `video_thumb` arguments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThumbnailRequest {
	pub time: f64,
	pub width: u32,
	pub height: u32,
}

impl ThumbnailRequest {
	/// The time is required. A missing height follows the aspect ratio of the
	/// configured thumbnail size when only the width is given.
	pub fn from_shortcode(shortcode: &Shortcode, config: &DatamdConfig) -> DatamdResult<Self> {
		let arg = |index: usize, key: &str| {
			shortcode
				.positional_at(index)
				.or_else(|| shortcode.keyword(key))
		};

		let time = arg(0, "time").ok_or_else(|| {
			DatamdError::MissingArgument {
				command: shortcode.command.clone(),
				argument: "time".to_string(),
			}
		})?;
		let time = sanitize_numeric_input(Some(time), 0.0, f64::MAX, 0.0);

		let default_width = config.processing.video_thumb_width.max(1);
		let default_height = config.processing.video_thumb_height.max(1);
		let width = dimension(arg(1, "width"), default_width);
		let height = match (arg(2, "height"), arg(1, "width")) {
			(Some(height), _) => dimension(Some(height), default_height),
			(None, Some(_)) => {
				let scaled = u64::from(width) * u64::from(default_height) / u64::from(default_width);
				u32::try_from(scaled.max(1)).unwrap_or(u32::MAX)
			}
			(None, None) => default_height,
		};

		Ok(Self {
			time,
			width,
			height,
		})
	}

	pub fn file_name(&self, source: &str) -> String {
		let digest = format!(
			"{:x}",
			md5::compute(format!("{source}|{}|{}|{}", self.time, self.width, self.height))
		);
		format!("thumb_{}.png", &digest[..12])
	}
}

/// `{{ video_thumb "clip.mp4" time [width] [height] }}`
///
/// Writes `thumb_<hash>.png` into `output_dir` and returns a Markdown image
/// linking to it.
pub fn render_video_thumb(
	path: &Path,
	shortcode: &Shortcode,
	config: &DatamdConfig,
	output_dir: &Path,
) -> DatamdResult<String> {
	let request = ThumbnailRequest::from_shortcode(shortcode, config)?;
	let file_name = request.file_name(&shortcode.path);
	let target = output_dir.join(&file_name);
	std::fs::create_dir_all(output_dir)?;

	let ffmpeg = program(FFMPEG_ENV, "ffmpeg");
	tracing::debug!(path = %path.display(), time = request.time, "extracting video frame");
	let output = Command::new(&ffmpeg)
		.args(["-y", "-loglevel", "error", "-ss"])
		.arg(request.time.to_string())
		.arg("-i")
		.arg(path)
		.args(["-frames:v", "1", "-vf"])
		.arg(format!("scale={}:{}", request.width, request.height))
		.arg(&target)
		.output()
		.map_err(|e| {
			DatamdError::VideoThumb(format!(
				"could not run `{}`: {e}",
				ffmpeg.to_string_lossy()
			))
		})?;

	if !output.status.success() || !target.is_file() {
		return Err(DatamdError::VideoThumb(stderr_message(&output)));
	}

	Ok(format!(
		"![Video thumbnail at {}s]({file_name})",
		request.time
	))
}
