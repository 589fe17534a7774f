//! Automation script synthesis from structured test cases
//!
//! Steps are mapped onto a small set of browser primitives through a fixed
//! keyword table. Targets are resolved to selectors by the generation
//! collaborator; anything that cannot be mapped or resolved becomes a
//! commented placeholder in the script.

pub mod selector;
pub mod template;

pub use selector::{SelectorResolution, SelectorResolver};
pub use template::{LANGUAGE_TAG, TEMPLATE_VERSION};

use crate::extract::ElementInfo;
use crate::llm::{CompletionProvider, TestCase, TestStep};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use template::{comment_text, locator, py_str, INDENT};

/// Browser primitive a step maps onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Primitive {
    Navigate,
    Click,
    TypeText,
    SelectOption,
    AssertText,
    AssertElementPresent,
}

/// Fixed action vocabulary, checked against the whole action first and then
/// its leading word
const ACTION_TABLE: &[(&str, Primitive)] = &[
    ("navigate", Primitive::Navigate),
    ("go to", Primitive::Navigate),
    ("open", Primitive::Navigate),
    ("visit", Primitive::Navigate),
    ("load", Primitive::Navigate),
    ("click", Primitive::Click),
    ("press", Primitive::Click),
    ("tap", Primitive::Click),
    ("submit", Primitive::Click),
    ("type", Primitive::TypeText),
    ("enter", Primitive::TypeText),
    ("input", Primitive::TypeText),
    ("fill", Primitive::TypeText),
    ("fill in", Primitive::TypeText),
    ("type text", Primitive::TypeText),
    ("select", Primitive::SelectOption),
    ("choose", Primitive::SelectOption),
    ("select option", Primitive::SelectOption),
    ("assert text", Primitive::AssertText),
    ("verify text", Primitive::AssertText),
    ("verify", Primitive::AssertText),
    ("assert", Primitive::AssertText),
    ("check", Primitive::AssertText),
    ("observe", Primitive::AssertText),
    ("assert element present", Primitive::AssertElementPresent),
    ("verify element present", Primitive::AssertElementPresent),
    ("assert visible", Primitive::AssertElementPresent),
    ("verify visible", Primitive::AssertElementPresent),
    ("wait for", Primitive::AssertElementPresent),
];

impl Primitive {
    /// Map a free-text action onto a primitive
    pub fn lookup(action: &str) -> Option<Self> {
        let normalized = action
            .to_lowercase()
            .replace(['-', '_'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        let find = |key: &str| {
            ACTION_TABLE
                .iter()
                .find(|(word, _)| *word == key)
                .map(|(_, p)| *p)
        };

        find(&normalized).or_else(|| normalized.split(' ').next().and_then(find))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Primitive::Navigate => "navigate",
            Primitive::Click => "click",
            Primitive::TypeText => "type-text",
            Primitive::SelectOption => "select-option",
            Primitive::AssertText => "assert-text",
            Primitive::AssertElementPresent => "assert-element-present",
        }
    }

    fn needs_selector(&self) -> bool {
        !matches!(self, Primitive::Navigate)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A target left as a placeholder in the script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedSelector {
    /// 1-based step number
    pub step: usize,
    pub target: String,
    pub reason: String,
}

/// Generated automation script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub test_case_id: String,
    pub language_tag: String,
    pub template_version: String,
    pub body: String,
    pub unresolved: Vec<UnresolvedSelector>,
}

/// Builds scripts for test cases against one page
pub struct ScriptSynthesizer {
    resolver: SelectorResolver,
    page_url: String,
    wait_seconds: u64,
}

impl ScriptSynthesizer {
    /// Create a synthesizer for the page described by `elements`
    pub fn new(
        llm: Arc<dyn CompletionProvider>,
        elements: Vec<ElementInfo>,
        page_url: &str,
    ) -> Self {
        Self::with_resolver(SelectorResolver::new(llm, elements), page_url)
    }

    /// Create a synthesizer around a configured resolver
    pub fn with_resolver(resolver: SelectorResolver, page_url: &str) -> Self {
        Self {
            resolver,
            page_url: page_url.to_string(),
            wait_seconds: 10,
        }
    }

    pub fn with_wait_seconds(mut self, wait_seconds: u64) -> Self {
        self.wait_seconds = wait_seconds;
        self
    }

    pub fn resolver(&self) -> &SelectorResolver {
        &self.resolver
    }

    /// Generate the script for `case`
    ///
    /// Never fails: unmapped actions and unresolved targets become commented
    /// placeholders.
    pub async fn generate_script(&self, case: &TestCase) -> Script {
        let mut body = template::setup_block(case, &self.page_url, self.wait_seconds);
        let mut unresolved = Vec::new();

        for (i, step) in case.steps.iter().enumerate() {
            let number = i + 1;
            body.push('\n');
            body.push_str(&format!(
                "{}# Step {}: {} {}\n",
                INDENT,
                number,
                comment_text(&step.action),
                comment_text(&step.target)
            ));

            let Some(primitive) = Primitive::lookup(&step.action) else {
                tracing::warn!("Step {} has unsupported action '{}'", number, step.action);
                body.push_str(&format!(
                    "{}# MANUAL STEP: unsupported action {}\n",
                    INDENT,
                    py_str(&comment_text(&step.action))
                ));
                push_expected(&mut body, step);
                continue;
            };

            let selector = if primitive.needs_selector() {
                match self.resolver.resolve(&step.target, &step.action).await {
                    SelectorResolution::Resolved { selector, .. } => Some(selector),
                    SelectorResolution::Unresolved { reason } => {
                        body.push_str(&format!(
                            "{}# UNRESOLVED SELECTOR for {} ({}): {} skipped\n",
                            INDENT,
                            py_str(&comment_text(&step.target)),
                            comment_text(&reason),
                            primitive
                        ));
                        push_expected(&mut body, step);
                        unresolved.push(UnresolvedSelector {
                            step: number,
                            target: step.target.clone(),
                            reason,
                        });
                        continue;
                    }
                }
            } else {
                None
            };

            for line in self.render(primitive, step, selector.as_deref()) {
                body.push_str(INDENT);
                body.push_str(&line);
                body.push('\n');
            }
            push_expected(&mut body, step);
        }

        body.push('\n');
        body.push_str(&template::teardown_block(case));

        tracing::info!(
            "Generated script for {} ({} unresolved selectors)",
            case.id,
            unresolved.len()
        );

        Script {
            test_case_id: case.id.clone(),
            language_tag: LANGUAGE_TAG.to_string(),
            template_version: TEMPLATE_VERSION.to_string(),
            body,
            unresolved,
        }
    }

    fn render(&self, primitive: Primitive, step: &TestStep, selector: Option<&str>) -> Vec<String> {
        let value = step.input_value.as_deref().unwrap_or_default();
        let by = locator(selector.unwrap_or_default());

        match primitive {
            Primitive::Navigate => {
                let url = [step.input_value.as_deref(), Some(step.target.as_str())]
                    .into_iter()
                    .flatten()
                    .find(|t| looks_like_url(t));
                match url {
                    Some(url) => vec![format!("driver.get({})", py_str(url))],
                    None => vec!["driver.get(PAGE_URL)".to_string()],
                }
            }
            Primitive::Click => vec![format!(
                "wait.until(EC.element_to_be_clickable({})).click()",
                by
            )],
            Primitive::TypeText => vec![
                format!("field = wait.until(EC.visibility_of_element_located({}))", by),
                "field.clear()".to_string(),
                format!("field.send_keys({})", py_str(value)),
            ],
            Primitive::SelectOption => vec![format!(
                "Select(wait.until(EC.presence_of_element_located({}))).select_by_visible_text({})",
                by,
                py_str(value)
            )],
            Primitive::AssertText if !value.is_empty() => vec![
                format!("element = wait.until(EC.visibility_of_element_located({}))", by),
                format!(
                    "assert {} in element.text, {}",
                    py_str(value),
                    py_str(&format!("expected text {:?} not found", value))
                ),
            ],
            // Nothing concrete to compare against, so check presence only
            Primitive::AssertText | Primitive::AssertElementPresent => vec![format!(
                "wait.until(EC.presence_of_element_located({}))",
                by
            )],
        }
    }
}

fn push_expected(body: &mut String, step: &TestStep) {
    if !step.expected_result.trim().is_empty() {
        body.push_str(&format!(
            "{}# Expected: {}\n",
            INDENT,
            comment_text(&step.expected_result)
        ));
    }
}

fn looks_like_url(text: &str) -> bool {
    let text = text.trim();
    text.starts_with("http://") || text.starts_with("https://") || text.starts_with("file://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, Priority};

    fn step(action: &str, target: &str, input: Option<&str>, expected: &str) -> TestStep {
        TestStep {
            action: action.to_string(),
            target: target.to_string(),
            input_value: input.map(|s| s.to_string()),
            expected_result: expected.to_string(),
        }
    }

    fn case(steps: Vec<TestStep>) -> TestCase {
        TestCase {
            id: "tc-42".to_string(),
            title: "Apply discount".to_string(),
            preconditions: vec!["Cart has items".to_string()],
            steps,
            priority: Priority::High,
            category: "positive".to_string(),
        }
    }

    fn llm() -> Arc<MockLlmClient> {
        let mut mock = MockLlmClient::new();
        mock.add_response(
            "**Target:** discount code field",
            r##"{"selector": "#discount-code", "confidence": 0.95}"##,
        );
        mock.add_response(
            "**Target:** apply button",
            r##"{"selector": "#apply-discount", "confidence": 0.9}"##,
        );
        mock.add_response(
            "**Target:** the mystery widget",
            r#"{"selector": "", "confidence": 0.0}"#,
        );
        Arc::new(mock)
    }

    #[test]
    fn test_primitive_lookup() {
        assert_eq!(Primitive::lookup("Click"), Some(Primitive::Click));
        assert_eq!(Primitive::lookup("type_text"), Some(Primitive::TypeText));
        assert_eq!(Primitive::lookup("Go to"), Some(Primitive::Navigate));
        assert_eq!(
            Primitive::lookup("verify element present"),
            Some(Primitive::AssertElementPresent)
        );
        assert_eq!(Primitive::lookup("verify total"), Some(Primitive::AssertText));
        assert_eq!(Primitive::lookup("drag"), None);
        assert_eq!(Primitive::lookup(""), None);
    }

    #[tokio::test]
    async fn test_generates_executable_steps() {
        let synthesizer = ScriptSynthesizer::new(llm(), Vec::new(), "file:///checkout.html");
        let script = synthesizer
            .generate_script(&case(vec![
                step("type", "discount code field", Some("SAVE15"), "Code entered"),
                step("click", "apply button", None, "Total reduced by 15%"),
            ]))
            .await;

        assert_eq!(script.language_tag, "python-selenium");
        assert_eq!(script.test_case_id, "tc-42");
        assert!(script.unresolved.is_empty());
        assert!(script
            .body
            .contains("field = wait.until(EC.visibility_of_element_located((By.CSS_SELECTOR, \"#discount-code\")))"));
        assert!(script.body.contains("field.send_keys(\"SAVE15\")"));
        assert!(script
            .body
            .contains("wait.until(EC.element_to_be_clickable((By.CSS_SELECTOR, \"#apply-discount\"))).click()"));
        assert!(script.body.contains("# Expected: Total reduced by 15%"));
    }

    #[tokio::test]
    async fn test_unresolved_target_becomes_placeholder() {
        let synthesizer = ScriptSynthesizer::new(llm(), Vec::new(), "file:///checkout.html");
        let script = synthesizer
            .generate_script(&case(vec![step(
                "click",
                "the mystery widget",
                None,
                "Something happens",
            )]))
            .await;

        assert_eq!(script.unresolved.len(), 1);
        assert_eq!(script.unresolved[0].target, "the mystery widget");
        assert_eq!(script.unresolved[0].step, 1);

        let body = &script.body;
        assert!(body.contains("# UNRESOLVED SELECTOR for \"the mystery widget\""));
        assert!(!body.contains(".click()"));
        assert!(body.contains("from selenium import webdriver"));
        assert!(body.contains("driver = webdriver.Chrome()"));
        assert!(body.ends_with("finally:\n    driver.quit()\n"));
    }

    #[tokio::test]
    async fn test_unknown_action_is_commented() {
        let synthesizer = ScriptSynthesizer::new(llm(), Vec::new(), "file:///checkout.html");
        let script = synthesizer
            .generate_script(&case(vec![step("drag", "slider", None, "Moved")]))
            .await;

        assert!(script.body.contains("# MANUAL STEP: unsupported action \"drag\""));
        assert!(script.unresolved.is_empty());
    }

    #[tokio::test]
    async fn test_regeneration_is_stable() {
        let mock = llm();
        let synthesizer = ScriptSynthesizer::new(mock.clone(), Vec::new(), "file:///checkout.html");
        let tc = case(vec![
            step("navigate", "https://shop.test/checkout", None, "Page loads"),
            step("click", "apply button", None, "Applied"),
            step("verify", "apply button", Some("Applied"), "Shows Applied"),
        ]);

        let first = synthesizer.generate_script(&tc).await;
        let second = synthesizer.generate_script(&tc).await;

        assert_eq!(first, second);
        assert_eq!(mock.calls(), 1);
        assert!(first.body.contains("driver.get(\"https://shop.test/checkout\")"));
        assert!(first.body.contains("assert \"Applied\" in element.text"));
    }
}
