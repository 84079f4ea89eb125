//! ENML note document builder.
//!
//! # Responsibility
//! - Build the complete note payload (title, ENML body, attachments) in memory.
//! - Keep markup escaping and `en-media` references in one place.
//!
//! # Invariants
//! - Every attached resource is referenced by exactly one `en-media` tag.
//! - User-provided text is XML-escaped before it enters the document.

use crate::model::note::{NoteDraft, Resource};

const ENML_PROLOGUE: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8"?>"#,
    r#"<!DOCTYPE en-note SYSTEM "http://xml.evernote.com/pub/enml2.dtd">"#
);
const TITLE_MAX_CHARS: usize = 15;
const FALLBACK_TITLE: &str = "Note";

/// Derives a note title from a gist description.
///
/// Keeps the first 15 characters; blank descriptions fall back to `Note`.
pub fn note_title(description: &str) -> String {
    let truncated: String = description
        .trim()
        .chars()
        .take(TITLE_MAX_CHARS)
        .collect();
    let trimmed = truncated.trim();
    if trimmed.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Incremental builder for a `NoteDraft`.
#[derive(Debug, Clone, Default)]
pub struct NoteBuilder {
    title: String,
    body: String,
    resources: Vec<Resource>,
    notebook_guid: Option<String>,
}

impl NoteBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Appends escaped plain text.
    pub fn text(mut self, text: &str) -> Self {
        self.body.push_str(&escape_xml(text));
        self
    }

    /// Appends a hyperlink whose label is the URL itself.
    pub fn link(mut self, url: &str) -> Self {
        let escaped = escape_xml(url);
        self.body
            .push_str(&format!(r#"<a href="{escaped}">{escaped}</a>"#));
        self
    }

    pub fn attach(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn notebook(mut self, notebook_guid: Option<String>) -> Self {
        self.notebook_guid = notebook_guid;
        self
    }

    pub fn build(self) -> NoteDraft {
        let mut content = String::from(ENML_PROLOGUE);
        content.push_str("<en-note>");
        content.push_str(&self.body);

        if !self.resources.is_empty() {
            content.push_str("<br/><br/>");
            for resource in &self.resources {
                let hash = escape_xml(&resource.body_hash);
                let mime = escape_xml(&resource.mime);
                content.push_str(&format!(
                    r#"Attachment with hash {hash}: <br/><en-media type="{mime}" hash="{hash}"/><br/>"#
                ));
            }
        }
        content.push_str("</en-note>");

        NoteDraft {
            title: self.title,
            content,
            resources: self.resources,
            notebook_guid: self.notebook_guid,
        }
    }
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}
