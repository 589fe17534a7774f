//! Prompt templates for LLM interactions

use crate::extract::ElementInfo;
use crate::index::{format_context, RetrievalResult};

/// One query per functional area, run independently in exhaustive mode
pub const EXHAUSTIVE_QUERIES: &[&str] = &[
    "Generate positive and negative test cases for the product cart rules: adding items, \
     changing quantities, removing items and total calculation.",
    "Generate positive and negative test cases for the discount code rules: valid codes, \
     invalid codes, expired codes and the resulting price reduction.",
    "Generate positive and negative test cases for the shipping rules: available shipping \
     methods and their costs.",
    "Generate positive and negative test cases for the payment rules: supported payment \
     methods and their selection.",
    "Generate positive and negative test cases for the form validation rules: required \
     fields, field formats and error messages.",
    "Generate positive and negative test cases for the order submission rules: successful \
     submission, blocked submission and confirmation messages.",
];

/// Query used for a named feature
pub fn feature_query(feature: &str) -> String {
    format!(
        "Generate all positive and negative test cases for the {} feature. \
         Include edge cases and boundary conditions. \
         Cover all scenarios mentioned in the documentation.",
        feature
    )
}

/// Prompt for test-case generation
pub struct TestCasePrompt;

impl TestCasePrompt {
    /// Generate a prompt for `query` grounded in `context`
    pub fn generate(query: &str, context: &[RetrievalResult]) -> String {
        let mut prompt = String::new();

        prompt.push_str(TEST_CASE_SYSTEM_PROMPT);
        prompt.push('\n');

        prompt.push_str("## Documentation Context\n\n");
        prompt.push_str(&format_context(context));
        prompt.push_str("\n\n");

        prompt.push_str("## Request\n\n");
        prompt.push_str(query);
        prompt.push_str("\n\n");

        prompt.push_str(TEST_CASE_INSTRUCTIONS);

        prompt
    }

    /// Append a corrective instruction after a rejected response
    pub fn corrective(original: &str, problem: &str) -> String {
        format!(
            "{}\n## Correction\n\nYour previous response was rejected: {}.\n\
             Respond again with a single JSON object that follows the schema exactly. \
             Every test case needs a non-empty title, at least one precondition, at \
             least one step, a priority and a category. Every step needs an action, a \
             target and an expected_result, and the last expected_result must not be \
             empty.\n",
            original, problem
        )
    }
}

/// Prompt for resolving a natural-language target to a CSS selector
pub struct SelectorPrompt;

impl SelectorPrompt {
    pub fn generate(target: &str, action: &str, elements: &[ElementInfo]) -> String {
        let mut prompt = String::new();

        prompt.push_str(SELECTOR_SYSTEM_PROMPT);
        prompt.push('\n');

        prompt.push_str("## Page Elements\n\n");
        if elements.is_empty() {
            prompt.push_str("(no element inventory available)\n");
        }
        for element in elements {
            prompt.push_str("- ");
            prompt.push_str(&element.describe());
            prompt.push('\n');
        }
        prompt.push('\n');

        prompt.push_str("## Step\n\n");
        prompt.push_str(&format!("**Action:** {}\n", action));
        prompt.push_str(&format!("**Target:** {}\n\n", target));

        prompt.push_str(SELECTOR_INSTRUCTIONS);

        prompt
    }
}

const TEST_CASE_SYSTEM_PROMPT: &str = r#"You are a QA test engineer. Your task is to write test cases based STRICTLY on the provided documentation.

Rules:
1. Only test features mentioned in the documentation
2. Do not invent features that are not documented
3. Include both positive and negative test cases
4. Be specific about inputs and expected results
"#;

const TEST_CASE_INSTRUCTIONS: &str = r#"## Instructions

Respond with a JSON object of exactly this shape:

```json
{
  "test_cases": [
    {
      "title": "Apply a valid discount code",
      "preconditions": ["Cart contains at least one item"],
      "steps": [
        {"action": "type", "target": "discount code field", "input_value": "CODE", "expected_result": "Code is entered"},
        {"action": "click", "target": "apply button", "expected_result": "Total is reduced"}
      ],
      "priority": "high",
      "category": "positive"
    }
  ]
}
```

Guidelines:
- title, preconditions, steps, priority and category are required on every test case
- Every step needs action, target and expected_result
- priority is one of: critical, high, medium, low
- input_value may be omitted when the step takes no input
- The last step must state the expected result of the test

Respond ONLY with the JSON object, no additional text.
"#;

const SELECTOR_SYSTEM_PROMPT: &str = r#"You are a Selenium automation engineer. Map a test step target to a CSS selector on the page described below.

Prefer an id selector, then a name attribute selector, then a class or tag selector. Only use elements listed under Page Elements.
"#;

const SELECTOR_INSTRUCTIONS: &str = r##"## Instructions

Respond with a JSON object:

```json
{"selector": "#apply-discount", "confidence": 0.9}
```

If no listed element matches the target, respond with an empty selector and confidence 0.0.

Respond ONLY with the JSON object, no additional text.
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::DocumentKind;

    #[test]
    fn test_prompt_embeds_attributed_context() {
        let context = vec![RetrievalResult {
            chunk_id: "c1".to_string(),
            text: "Discount code SAVE15 gives 15% off.".to_string(),
            score: 0.8,
            source_name: "product_specs.md".to_string(),
            kind: DocumentKind::Markdown,
        }];

        let prompt = TestCasePrompt::generate("test discount code validation", &context);

        assert!(prompt.contains("[Source: product_specs.md]\nDiscount code SAVE15 gives 15% off."));
        assert!(prompt.contains("test discount code validation"));
        assert!(prompt.contains("\"test_cases\""));
    }

    #[test]
    fn test_prompt_without_context() {
        let prompt = TestCasePrompt::generate("anything", &[]);
        assert!(prompt.contains("No relevant documentation found."));
    }

    #[test]
    fn test_corrective_names_problem() {
        let retry = TestCasePrompt::corrective("base prompt", "test case 1 has no steps");
        assert!(retry.starts_with("base prompt"));
        assert!(retry.contains("test case 1 has no steps"));
    }

    #[test]
    fn test_selector_prompt_lists_elements() {
        let element = ElementInfo {
            tag: "button".to_string(),
            id: Some("apply-discount".to_string()),
            ..Default::default()
        };
        let prompt = SelectorPrompt::generate("apply button", "click", &[element]);

        assert!(prompt.contains("apply-discount"));
        assert!(prompt.contains("**Target:** apply button"));
        assert!(prompt.contains(r##"{"selector": "#apply-discount", "confidence": 0.9}"##));
        assert!(prompt.trim_end().ends_with("no additional text."));
    }

    #[test]
    fn test_feature_query() {
        let q = feature_query("discount code");
        assert!(q.contains("discount code feature"));
        assert!(q.contains("boundary"));
        assert_eq!(EXHAUSTIVE_QUERIES.len(), 6);
    }
}
