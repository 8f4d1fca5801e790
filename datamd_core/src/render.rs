use markdown::CompileOptions;
use markdown::Options;
use serde::Serialize;

use crate::DatamdError;
use crate::DatamdResult;

const PAGE_TEMPLATE_NAME: &str = "page";
const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{{ title|e }}</title>
    <style>
        body {
            {{ styles.body }}
        }
        table {
            {{ styles.table }}
        }
        th, td {
            {{ styles.cell }}
        }
        th {
            {{ styles.header }}
        }
        pre {
            {{ styles.pre }}
        }
        video {
            {{ styles.video }}
        }
        img {
            {{ styles.img }}
        }
    </style>
</head>
<body>
{{ body }}
</body>
</html>"#;

/// CSS declarations for the elements of the rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyleOptions {
	pub body: String,
	pub table: String,
	/// Applied to `th` and `td`.
	pub cell: String,
	/// Applied to `th` after `cell`.
	pub header: String,
	pub pre: String,
	pub video: String,
	pub img: String,
}

impl Default for StyleOptions {
	fn default() -> Self {
		Self {
			body: "font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; \
			       max-width: 800px; margin: 0 auto; padding: 20px; line-height: 1.6;"
				.to_string(),
			table: "border-collapse: collapse; width: 100%; margin: 20px 0;".to_string(),
			cell: "border: 1px solid #ddd; padding: 8px; text-align: left;".to_string(),
			header: "background-color: #f2f2f2; font-weight: bold;".to_string(),
			pre: "background-color: #f4f4f4; padding: 15px; border-radius: 5px; overflow-x: auto;"
				.to_string(),
			video: "max-width: 100%; height: auto;".to_string(),
			img: "max-width: 100%; height: auto;".to_string(),
		}
	}
}

/// Render GitHub flavored Markdown to HTML. Raw HTML in the document (such as
/// `<video>` elements produced by shortcodes) is passed through.
pub fn markdown_to_html(source: &str) -> DatamdResult<String> {
	let options = Options {
		compile: CompileOptions {
			allow_dangerous_html: true,
			..CompileOptions::gfm()
		},
		..Options::gfm()
	};

	markdown::to_html_with_options(source, &options).map_err(|e| DatamdError::Markdown(e.to_string()))
}

#[derive(Serialize)]
struct PageContext<'a> {
	title: &'a str,
	body: &'a str,
	styles: &'a StyleOptions,
}

/// Wrap an HTML body in a complete page.
pub fn render_page(body: &str, title: &str, styles: &StyleOptions) -> DatamdResult<String> {
	let mut env = minijinja::Environment::new();
	env.set_keep_trailing_newline(true);
	env.add_template(PAGE_TEMPLATE_NAME, PAGE_TEMPLATE)
		.map_err(|e| DatamdError::TemplateRender(e.to_string()))?;

	let template = env
		.get_template(PAGE_TEMPLATE_NAME)
		.map_err(|e| DatamdError::TemplateRender(e.to_string()))?;

	template
		.render(minijinja::Value::from_serialize(PageContext {
			title,
			body: body.trim_end(),
			styles,
		}))
		.map_err(|e| DatamdError::TemplateRender(e.to_string()))
}
