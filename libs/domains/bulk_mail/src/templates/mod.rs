//! Body rendering.
//!
//! This module provides the `BodyRenderer` seam and a Handlebars-based
//! implementation with a built-in html layout.

use crate::error::{BulkMailError, BulkMailResult};
use crate::models::Locale;
use handlebars::Handlebars;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

/// Name of the layout every html body is wrapped in.
pub const LAYOUT_HTML: &str = "layout_html";

/// Template set shipped with the renderer.
pub const ANNOUNCEMENT: &str = "announcement";

/// Values available to a template while it renders.
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// Locale the body is rendered in.
    pub locale: Locale,
    /// strftime pattern for dates shown in the body.
    pub date_format: String,
    /// Caller supplied view variables.
    pub vars: Map<String, Value>,
    /// Rendered inner content, set while the layout renders.
    pub content: Option<String>,
}

impl RenderContext {
    pub fn new(locale: Locale, date_format: impl Into<String>, vars: Map<String, Value>) -> Self {
        Self {
            locale,
            date_format: date_format.into(),
            vars,
            content: None,
        }
    }

    /// Same context with the inner content set, for the layout pass.
    pub fn with_content(&self, content: String) -> Self {
        Self {
            content: Some(content),
            ..self.clone()
        }
    }

    /// Today's date in the context's date format, or `None` when the
    /// format string is not a valid strftime pattern.
    pub fn formatted_today(&self) -> Option<String> {
        use std::fmt::Write;

        let mut out = String::new();
        write!(out, "{}", chrono::Local::now().format(&self.date_format)).ok()?;
        Some(out)
    }

    /// Flatten into the JSON object handed to the template engine.
    /// View variables never override the reserved keys.
    pub fn to_value(&self) -> Value {
        let mut data = self.vars.clone();
        data.insert("locale".to_string(), Value::String(self.locale.to_string()));
        data.insert("date_format".to_string(), Value::String(self.date_format.clone()));
        if let Some(today) = self.formatted_today() {
            data.insert("today".to_string(), Value::String(today));
        }
        if let Some(content) = &self.content {
            data.insert("content".to_string(), Value::String(content.clone()));
        }
        Value::Object(data)
    }
}

/// Renders a named template.
pub trait BodyRenderer: Send + Sync {
    fn render(&self, template_name: &str, context: &RenderContext) -> BulkMailResult<String>;
}

/// Handlebars renderer with the html layout and the announcement templates
/// registered up front.
pub struct HandlebarsRenderer {
    handlebars: Handlebars<'static>,
}

impl HandlebarsRenderer {
    pub fn new() -> BulkMailResult<Self> {
        let mut handlebars = Handlebars::new();

        handlebars
            .register_template_string(LAYOUT_HTML, LAYOUT_HTML_TEMPLATE)
            .map_err(|e| BulkMailError::TemplateError(format!("Failed to register {}: {}", LAYOUT_HTML, e)))?;
        handlebars
            .register_template_string("announcement_html", ANNOUNCEMENT_HTML_TEMPLATE)
            .map_err(|e| BulkMailError::TemplateError(format!("Failed to register announcement_html: {}", e)))?;
        handlebars
            .register_template_string("announcement_text", ANNOUNCEMENT_TEXT_TEMPLATE)
            .map_err(|e| BulkMailError::TemplateError(format!("Failed to register announcement_text: {}", e)))?;

        Ok(Self { handlebars })
    }

    /// Register (or replace) a template.
    pub fn register_template(&mut self, name: &str, source: &str) -> BulkMailResult<()> {
        self.handlebars
            .register_template_string(name, source)
            .map_err(|e| BulkMailError::TemplateError(format!("Failed to register {}: {}", name, e)))
    }

    /// Register every `*.hbs` file in a directory under its file stem, so
    /// `newsletter_html.hbs` becomes `newsletter_html`.
    pub fn register_directory(&mut self, dir: &Path) -> BulkMailResult<usize> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            BulkMailError::TemplateError(format!("Failed to read {}: {}", dir.display(), e))
        })?;

        let mut count = 0;
        for entry in entries {
            let path = entry
                .map_err(|e| BulkMailError::TemplateError(e.to_string()))?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("hbs") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let source = std::fs::read_to_string(&path).map_err(|e| {
                BulkMailError::TemplateError(format!("Failed to read {}: {}", path.display(), e))
            })?;
            self.register_template(name, &source)?;
            debug!(template = %name, "Registered template");
            count += 1;
        }
        Ok(count)
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.handlebars.has_template(name)
    }
}

impl BodyRenderer for HandlebarsRenderer {
    fn render(&self, template_name: &str, context: &RenderContext) -> BulkMailResult<String> {
        debug!(template = %template_name, locale = %context.locale, "Rendering body");
        Ok(self.handlebars.render(template_name, &context.to_value())?)
    }
}

// ============================================================================
// Built-in templates
// ============================================================================

const LAYOUT_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="{{locale}}">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background-color: #f4f4f5;">
  <table role="presentation" width="100%" cellspacing="0" cellpadding="0" style="max-width: 600px; margin: 0 auto; padding: 40px 20px;">
    <tr>
      <td style="background-color: #ffffff; border-radius: 8px; padding: 40px;">
{{{content}}}
      </td>
    </tr>
  </table>
</body>
</html>"#;

const ANNOUNCEMENT_HTML_TEMPLATE: &str = r#"<h1 style="color: #18181b; font-size: 24px; font-weight: 600; margin: 0 0 16px 0;">{{title}}</h1>
<p style="color: #52525b; font-size: 16px; line-height: 24px; margin: 0 0 24px 0;">{{message}}</p>
{{#if today}}<p style="color: #71717a; font-size: 12px; margin: 0;">{{today}}</p>{{/if}}"#;

const ANNOUNCEMENT_TEXT_TEMPLATE: &str = r#"{{{title}}}

{{{message}}}
{{#if today}}
{{today}}
{{/if}}"#;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(vars: Value) -> RenderContext {
        let Value::Object(vars) = vars else {
            panic!("vars must be an object");
        };
        RenderContext::new(Locale::from("en_US"), "%Y-%m-%d", vars)
    }

    #[test]
    fn test_renderer_creation() {
        let renderer = HandlebarsRenderer::new().unwrap();
        assert!(renderer.has_template(LAYOUT_HTML));
        assert!(renderer.has_template("announcement_html"));
        assert!(renderer.has_template("announcement_text"));
    }

    #[test]
    fn test_render_announcement_text() {
        let renderer = HandlebarsRenderer::new().unwrap();
        let ctx = context(json!({"title": "Maintenance", "message": "We are down at noon."}));

        let body = renderer.render("announcement_text", &ctx).unwrap();
        assert!(body.starts_with("Maintenance"));
        assert!(body.contains("We are down at noon."));
    }

    #[test]
    fn test_layout_wraps_unescaped_content() {
        let renderer = HandlebarsRenderer::new().unwrap();
        let ctx = context(json!({})).with_content("<p>inner</p>".to_string());

        let body = renderer.render(LAYOUT_HTML, &ctx).unwrap();
        assert!(body.contains("<p>inner</p>"));
        assert!(body.contains(r#"lang="en_US""#));
    }

    #[test]
    fn test_reserved_keys_win_over_vars() {
        let ctx = context(json!({"locale": "xx", "team": "ops"}));
        let value = ctx.to_value();
        assert_eq!(value["locale"], "en_US");
        assert_eq!(value["team"], "ops");
        assert!(value["today"].is_string());
    }

    #[test]
    fn test_missing_template_is_a_template_error() {
        let renderer = HandlebarsRenderer::new().unwrap();
        let err = renderer.render("nope_html", &context(json!({}))).unwrap_err();
        assert!(matches!(err, BulkMailError::TemplateError(_)));
    }

    #[test]
    fn test_register_template() {
        let mut renderer = HandlebarsRenderer::new().unwrap();
        renderer
            .register_template("digest_text", "Hi {{team}} ({{locale}})")
            .unwrap();

        let body = renderer
            .render("digest_text", &context(json!({"team": "ops"})))
            .unwrap();
        assert_eq!(body, "Hi ops (en_US)");
    }
}
