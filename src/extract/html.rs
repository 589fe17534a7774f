//! HTML extraction for the target page
//!
//! The page under test is both a retrieval document and the source of truth
//! for selector resolution, so extraction keeps two views of it: the visible
//! text and an inventory of interactive or addressable elements.

use serde::{Deserialize, Serialize};

/// Tags always recorded in the element inventory
const INVENTORY_TAGS: &[&str] = &["form", "input", "textarea", "button", "select", "a", "label"];

/// Tags whose inner text is captured as the element's label
const TEXT_TAGS: &[&str] = &["button", "a", "label", "option", "h1", "h2", "h3", "span", "div", "p"];

/// Elements whose contents never render as text
const RAW_TEXT_TAGS: &[&str] = &["script", "style"];

/// An addressable element found in the page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub tag: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub class: Option<String>,
    pub input_type: Option<String>,
    pub placeholder: Option<String>,
    pub text: String,
}

impl ElementInfo {
    /// One-line description used in prompts
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        let attr = |label: &str, value: &Option<String>| {
            value.as_ref().map(|v| format!("{}='{}'", label, v))
        };

        parts.extend(attr("type", &self.input_type));
        parts.extend(attr("id", &self.id));
        parts.extend(attr("name", &self.name));
        parts.extend(attr("class", &self.class));
        parts.extend(attr("placeholder", &self.placeholder));
        if !self.text.is_empty() {
            parts.push(format!("text='{}'", self.text));
        }

        format!("{}: {}", self.tag, parts.join(", "))
    }
}

/// Visible text plus element inventory of an HTML page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HtmlOutline {
    pub text_lines: Vec<String>,
    pub elements: Vec<ElementInfo>,
}

impl HtmlOutline {
    /// Scan an HTML document
    pub fn parse(html: &str) -> Self {
        let mut outline = HtmlOutline::default();
        let mut capture: Option<(usize, String)> = None;
        let mut rest = html;

        while !rest.is_empty() {
            let Some(lt) = rest.find('<') else {
                outline.push_text(rest, &mut capture);
                break;
            };

            outline.push_text(&rest[..lt], &mut capture);
            rest = &rest[lt..];

            if let Some(after) = rest.strip_prefix("<!--") {
                rest = after.find("-->").map(|i| &after[i + 3..]).unwrap_or("");
                continue;
            }

            let Some(gt) = rest.find('>') else {
                break;
            };
            let inner = &rest[1..gt];
            rest = &rest[gt + 1..];

            if inner.starts_with('!') || inner.starts_with('?') {
                continue;
            }

            if let Some(closing) = inner.strip_prefix('/') {
                let tag = closing.trim().to_ascii_lowercase();
                if capture.as_ref().is_some_and(|(_, t)| *t == tag) {
                    capture = None;
                }
                continue;
            }

            let (tag, attrs) = parse_tag(inner);

            if RAW_TEXT_TAGS.contains(&tag.as_str()) {
                let close = format!("</{}", tag);
                rest = find_ignore_case(rest, &close)
                    .map(|i| &rest[i..])
                    .unwrap_or("");
                continue;
            }

            let lookup = |key: &str| {
                attrs
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
                    .filter(|v| !v.is_empty())
            };

            let class = lookup("class");
            let is_error = class
                .as_ref()
                .is_some_and(|c| c.to_ascii_lowercase().contains("error"));
            let id = lookup("id");

            if INVENTORY_TAGS.contains(&tag.as_str()) || id.is_some() || is_error {
                let input_type = match tag.as_str() {
                    "input" => Some(lookup("type").unwrap_or_else(|| "text".to_string())),
                    _ => lookup("type"),
                };

                outline.elements.push(ElementInfo {
                    tag: tag.clone(),
                    id,
                    name: lookup("name"),
                    class,
                    input_type,
                    placeholder: lookup("placeholder"),
                    text: String::new(),
                });

                let self_closing = inner.trim_end().ends_with('/');
                if TEXT_TAGS.contains(&tag.as_str()) && !self_closing {
                    capture = Some((outline.elements.len() - 1, tag));
                }
            }
        }

        outline
    }

    fn push_text(&mut self, raw: &str, capture: &mut Option<(usize, String)>) {
        let text = collapse_whitespace(&decode_entities(raw));
        if text.is_empty() {
            return;
        }

        if let Some((idx, _)) = capture {
            let element = &mut self.elements[*idx];
            if !element.text.is_empty() {
                element.text.push(' ');
            }
            element.text.push_str(&text);
        }

        self.text_lines.push(text);
    }

    /// Element inventory, one description per line
    pub fn structure(&self) -> String {
        self.elements
            .iter()
            .map(ElementInfo::describe)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Plain-text rendering used for indexing
    pub fn to_text(&self) -> String {
        format!(
            "HTML Content:\n{}\n\nHTML Structure:\n{}",
            self.text_lines.join("\n"),
            self.structure()
        )
    }
}

/// Split a start tag into its lowercase name and attributes
fn parse_tag(inner: &str) -> (String, Vec<(String, String)>) {
    let inner = inner.trim().trim_end_matches('/');
    let name_end = inner
        .find(|c: char| c.is_whitespace())
        .unwrap_or(inner.len());
    let tag = inner[..name_end].to_ascii_lowercase();

    let mut attrs = Vec::new();
    let mut rest = inner[name_end..].trim_start();

    while !rest.is_empty() {
        let key_end = rest
            .find(|c: char| c.is_whitespace() || c == '=')
            .unwrap_or(rest.len());
        let key = rest[..key_end].to_ascii_lowercase();
        rest = rest[key_end..].trim_start();

        let value = if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            match after_eq.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let body = &after_eq[1..];
                    let end = body.find(quote).unwrap_or(body.len());
                    rest = body.get(end + 1..).unwrap_or("");
                    body[..end].to_string()
                }
                _ => {
                    let end = after_eq
                        .find(|c: char| c.is_whitespace())
                        .unwrap_or(after_eq.len());
                    rest = &after_eq[end..];
                    after_eq[..end].to_string()
                }
            }
        } else {
            String::new()
        };

        if !key.is_empty() {
            attrs.push((key, decode_entities(&value)));
        }
        rest = rest.trim_start();
    }

    (tag, attrs)
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
