//! `datamd_core` is the core library for datamd, a processor for data-driven
//! Markdown documents. A `.dmd` file is ordinary Markdown in which a line such
//! as `{{ csv "sales.csv" }}` is replaced by a rendering of the referenced
//! file before the document is converted to HTML.
//!
//! ## Processing Pipeline
//!
//! ```text
//! .dmd file
//!   → Shortcode lexer (recognises `{{ command "path" args }}` lines)
//!   → Preprocessor (resolves the path securely, consults the cache, renders)
//!   → Markdown renderer (GitHub flavored Markdown, raw HTML allowed)
//!   → Page template (wraps the body in a styled HTML page)
//! ```
//!
//! ## Shortcodes
//!
//! | Command | Arguments | Output |
//! | --- | --- | --- |
//! | `csv` | `[sep]`, `transform=` | Markdown table |
//! | `json` | `[flatten]`, `transform=` | table, fenced JSON or scalar text |
//! | `xlsx` / `xls` / `xlsm` / `ods` | `[sheet]`, `transform=` | Markdown table |
//! | `pdf` | `[all\|page]` | page text |
//! | `pdf_table` | `[page] [h_strategy] [v_strategy]` | one table per detected table |
//! | `image_ocr` | `[lang]` | recognised text |
//! | `video` | `[width] [height] [controls] [autoplay]` | `<video>` element |
//! | `video_thumb` | `time [width] [height]` | thumbnail image |
//! | `chart` | `[type] [x] [y] [options]` | SVG chart image |
//!
//! Tabular commands accept a transform string such as
//! `transform="filter:age>25|sort:-age|limit:10"`.
//!
//! ## Modules
//!
//! - [`config`]: Configuration tree with file, environment and dotted-path
//!   overrides.
//! - [`cache`]: File backed cache of rendered shortcodes.
//! - [`security`]: Path resolution that keeps shortcodes inside the document
//!   directory.
//! - [`sanitize`]: Normalisation of shortcode arguments.
//! - [`transform`]: Filter, sort, limit and aggregate operations on tables.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use datamd_core::ProcessOptions;
//! use datamd_core::process_file;
//!
//! let outcome = process_file(Path::new("report.dmd"), None, &ProcessOptions::default()).unwrap();
//! println!("wrote {}", outcome.output.display());
//! ```

pub use cache::*;
pub use config::*;
pub use error::*;
pub use preprocessor::*;
pub use processor::*;
pub use render::*;
pub use shortcode::*;
pub use table::*;

pub mod cache;
pub mod chart;
pub mod config;
pub mod document;
#[allow(unused_assignments)]
mod error;
pub mod media;
mod preprocessor;
mod processor;
mod render;
pub mod sanitize;
pub mod security;
mod shortcode;
mod table;
pub mod tabular;
pub mod transform;

#[cfg(test)]
mod __tests;
