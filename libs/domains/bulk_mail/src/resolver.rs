//! Body resolution for a recipient group.
//!
//! The locale a body renders in is carried by an explicit [`LocaleContext`].
//! The resolver derives a scoped context for each group and never touches
//! the caller's, so a failed render cannot leave a different locale behind.

use crate::directory::LocaleService;
use crate::error::BulkMailResult;
use crate::models::{Bodies, ContentFormat, Locale, MIME_TEXT_PLAIN, RecipientGroup};
use crate::templates::{BodyRenderer, LAYOUT_HTML, RenderContext};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;

/// Longest line a transport accepts, in characters.
pub const MAX_LINE_LENGTH: usize = 900;

/// Locale the caller is operating in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleContext {
    locale: Locale,
}

impl LocaleContext {
    pub fn new(locale: impl Into<Locale>) -> Self {
        Self {
            locale: locale.into(),
        }
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    /// A child context for rendering in another locale. `self` is left as is.
    pub fn scoped(&self, locale: &Locale) -> LocaleContext {
        LocaleContext {
            locale: locale.clone(),
        }
    }
}

/// Renders the bodies a recipient group needs.
pub struct BodyResolver {
    renderer: Arc<dyn BodyRenderer>,
    locales: Arc<dyn LocaleService>,
}

impl BodyResolver {
    pub fn new(renderer: Arc<dyn BodyRenderer>, locales: Arc<dyn LocaleService>) -> Self {
        Self { renderer, locales }
    }

    /// Render `template` for the group's format and locale.
    ///
    /// Html groups render `<template>_html` and wrap it in the html layout;
    /// text groups render `<template>_text`. The result holds one body keyed
    /// by the format's mime type, with lines wrapped to [`MAX_LINE_LENGTH`].
    pub fn resolve(
        &self,
        group: &RecipientGroup,
        template: &str,
        vars: &Map<String, Value>,
        caller: &LocaleContext,
    ) -> BulkMailResult<Bodies> {
        let scope = caller.scoped(&group.key.locale);
        let ctx = RenderContext::new(
            scope.locale().clone(),
            self.date_format_for(group),
            vars.clone(),
        );

        let body = match group.key.format {
            ContentFormat::Html => {
                let content = self.renderer.render(&format!("{}_html", template), &ctx)?;
                self.renderer.render(LAYOUT_HTML, &ctx.with_content(content))?
            }
            ContentFormat::Text => self.renderer.render(&format!("{}_text", template), &ctx)?,
        };

        debug!(
            group = %group.key,
            template = %template,
            caller_locale = %caller.locale(),
            bytes = body.len(),
            "Resolved body"
        );

        let mut bodies = Bodies::new();
        bodies.insert(
            group.key.format.mime_type().to_string(),
            wrap_long_lines(&body, MAX_LINE_LENGTH),
        );
        Ok(bodies)
    }

    /// Plain text body handed to the spool store.
    ///
    /// Text groups reuse the body already in `bodies`; html groups render
    /// `<template>_text` as a companion, since the retry process re-renders
    /// per recipient format downstream.
    pub fn resolve_spool_body(
        &self,
        group: &RecipientGroup,
        template: &str,
        vars: &Map<String, Value>,
        caller: &LocaleContext,
        bodies: &Bodies,
    ) -> BulkMailResult<String> {
        if let Some(text) = bodies.get(MIME_TEXT_PLAIN) {
            return Ok(text.clone());
        }

        let scope = caller.scoped(&group.key.locale);
        let ctx = RenderContext::new(
            scope.locale().clone(),
            self.date_format_for(group),
            vars.clone(),
        );
        let text = self.renderer.render(&format!("{}_text", template), &ctx)?;
        Ok(wrap_long_lines(&text, MAX_LINE_LENGTH))
    }

    /// A lone recipient gets their own date format; larger groups use the
    /// locale default.
    fn date_format_for(&self, group: &RecipientGroup) -> String {
        match group.recipients.as_slice() {
            [only] => only
                .date_format
                .clone()
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| self.locales.default_date_format(&group.key.locale)),
            _ => self.locales.default_date_format(&group.key.locale),
        }
    }
}

/// Break lines longer than `width` columns at spaces.
///
/// Lines that already fit are left untouched. A run with no space inside
/// the limit is kept whole and broken at the first space after it.
pub fn wrap_long_lines(body: &str, width: usize) -> String {
    let options = textwrap::Options::new(width)
        .break_words(false)
        .word_separator(textwrap::WordSeparator::AsciiSpace)
        .word_splitter(textwrap::WordSplitter::NoHyphenation);

    body.split('\n')
        .map(|line| {
            if textwrap::core::display_width(line) <= width {
                Cow::Borrowed(line)
            } else {
                Cow::Owned(textwrap::fill(line, &options))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
