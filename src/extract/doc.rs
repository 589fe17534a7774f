//! Format-specific text extraction
//!
//! Converts uploaded support documents into plain text:
//! - Markdown is flattened to its text content, one block per paragraph
//! - JSON is rendered as an indented key/value outline
//! - HTML keeps visible text plus an element inventory (see [`super::html`])
//! - PDF text is pulled with `pdf-extract`

use super::{html::HtmlOutline, Document, DocumentKind};
use crate::error::{QaError, Result};
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use std::path::Path;

/// Read and extract a document from disk
pub fn extract_file(path: &Path) -> Result<Document> {
    let source_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());

    let bytes = std::fs::read(path)?;
    extract_bytes(&source_name, &bytes)
}

/// Extract a document from raw bytes, choosing the format by file name
pub fn extract_bytes(source_name: &str, bytes: &[u8]) -> Result<Document> {
    let kind = DocumentKind::from_file_name(source_name);

    let text = match kind {
        DocumentKind::Pdf => pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
            QaError::Extraction {
                source_name: source_name.to_string(),
                message: e.to_string(),
            }
        })?,
        _ => {
            let content = decode_utf8(source_name, bytes)?;
            match kind {
                DocumentKind::Markdown => markdown_to_text(&content),
                DocumentKind::Json => json_to_text(source_name, &content)?,
                DocumentKind::Html => HtmlOutline::parse(&content).to_text(),
                _ => content,
            }
        }
    };

    tracing::debug!("Extracted {} characters from {}", text.chars().count(), source_name);

    Ok(Document::new(source_name, &text, kind))
}

fn decode_utf8(source_name: &str, bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| QaError::Extraction {
        source_name: source_name.to_string(),
        message: format!("not valid UTF-8: {}", e),
    })
}

/// Flatten Markdown into plain text, keeping block structure as blank lines
pub fn markdown_to_text(content: &str) -> String {
    let mut text = String::new();

    for event in Parser::new(content) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            Event::Start(Tag::Item) => text.push_str("- "),
            Event::End(TagEnd::Item) => text.push('\n'),
            Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Heading(_))
            | Event::End(TagEnd::CodeBlock)
            | Event::End(TagEnd::List(_)) => {
                if !text.ends_with("\n\n") {
                    text.push_str(if text.ends_with('\n') { "\n" } else { "\n\n" });
                }
            }
            _ => {}
        }
    }

    text.trim_end().to_string()
}

/// Render a JSON document as an indented outline
pub fn json_to_text(source_name: &str, content: &str) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_str(content).map_err(|e| QaError::Extraction {
            source_name: source_name.to_string(),
            message: format!("invalid JSON: {}", e),
        })?;

    let mut lines = Vec::new();
    render_json(&value, 0, &mut lines);
    Ok(lines.join("\n"))
}

fn render_json(value: &serde_json::Value, indent: usize, lines: &mut Vec<String>) {
    use serde_json::Value;

    let prefix = "  ".repeat(indent);

    match value {
        Value::Object(map) => {
            for (key, v) in map {
                match v {
                    Value::Object(_) | Value::Array(_) => {
                        lines.push(format!("{}{}:", prefix, key));
                        render_json(v, indent + 1, lines);
                    }
                    _ => lines.push(format!("{}{}: {}", prefix, key, scalar(v))),
                }
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Object(_) | Value::Array(_) => {
                        lines.push(format!("{}Item {}:", prefix, i + 1));
                        render_json(item, indent + 1, lines);
                    }
                    _ => lines.push(format!("{}- {}", prefix, scalar(item))),
                }
            }
        }
        other => lines.push(format!("{}{}", prefix, scalar(other))),
    }
}

fn scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_to_text() {
        let content = r#"# Discounts

The code `SAVE15` gives 15% off.

- Applies to subtotal
- One code per order
"#;

        let text = markdown_to_text(content);
        assert!(text.starts_with("Discounts\n\n"));
        assert!(text.contains("The code SAVE15 gives 15% off."));
        assert!(text.contains("- Applies to subtotal\n- One code per order"));
        assert!(!text.contains('#'));
    }

    #[test]
    fn test_json_to_text() {
        let content = r#"{"discounts": {"SAVE15": 15}, "shipping": ["standard", "express"]}"#;
        let text = json_to_text("api.json", content).unwrap();

        assert!(text.contains("discounts:\n  SAVE15: 15"));
        assert!(text.contains("shipping:\n  - standard\n  - express"));
    }

    #[test]
    fn test_invalid_json_is_extraction_error() {
        let err = extract_bytes("broken.json", b"{not json").unwrap_err();
        assert!(matches!(err, QaError::Extraction { .. }));
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_extract_plain_text() {
        let doc = extract_bytes("notes.txt", b"Shipping is free over $50.").unwrap();
        assert_eq!(doc.kind, DocumentKind::Text);
        assert_eq!(doc.raw_text, "Shipping is free over $50.");
        assert_eq!(doc.source_name, "notes.txt");
    }

    #[test]
    fn test_extract_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ui_guide.md");
        std::fs::write(&path, "## Errors\n\nShow errors in red.").unwrap();

        let doc = extract_file(&path).unwrap();
        assert_eq!(doc.source_name, "ui_guide.md");
        assert_eq!(doc.kind, DocumentKind::Markdown);
        assert!(doc.raw_text.contains("Show errors in red."));
    }
}
