//! Structured test cases and parsing of untrusted generator output

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Test case priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

impl TryFrom<String> for Priority {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One step of a test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestStep {
    pub action: String,
    pub target: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "scalar_as_string"
    )]
    pub input_value: Option<String>,
    pub expected_result: String,
}

/// A validated test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub title: String,
    pub preconditions: Vec<String>,
    pub steps: Vec<TestStep>,
    pub priority: Priority,
    pub category: String,
}

impl TestCase {
    /// Render as a markdown section
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!("## {}\n\n", self.title));
        out.push_str(&format!("**ID:** {}\n", self.id));
        out.push_str(&format!("**Priority:** {}\n", self.priority));
        out.push_str(&format!("**Category:** {}\n\n", self.category));

        out.push_str("### Preconditions\n\n");
        for precondition in &self.preconditions {
            out.push_str(&format!("- {}\n", precondition));
        }

        out.push_str("\n### Steps\n\n");
        for (i, step) in self.steps.iter().enumerate() {
            out.push_str(&format!("{}. {} {}", i + 1, step.action, step.target));
            if let Some(ref value) = step.input_value {
                out.push_str(&format!(" with `{}`", value));
            }
            out.push('\n');
            if !step.expected_result.is_empty() {
                out.push_str(&format!("   Expected: {}\n", step.expected_result));
            }
        }

        out
    }
}

/// A validated test case awaiting an id
#[derive(Debug, Clone, PartialEq)]
pub struct TestCaseDraft {
    pub title: String,
    pub preconditions: Vec<String>,
    pub steps: Vec<TestStep>,
    pub priority: Priority,
    pub category: String,
}

impl TestCaseDraft {
    pub fn into_test_case(self, id: String) -> TestCase {
        TestCase {
            id,
            title: self.title,
            preconditions: self.preconditions,
            steps: self.steps,
            priority: self.priority,
            category: self.category,
        }
    }
}

/// Test case exactly as the generator wrote it; every field may be missing
#[derive(Debug, Deserialize)]
struct RawCase {
    title: Option<String>,
    preconditions: Option<Vec<String>>,
    steps: Option<Vec<RawStep>>,
    priority: Option<Priority>,
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    action: Option<String>,
    target: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    input_value: Option<String>,
    expected_result: Option<String>,
}

impl RawCase {
    /// Check required fields and structural invariants
    fn validate(self) -> Result<TestCaseDraft, String> {
        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "title is empty".to_string())?;

        let preconditions = self
            .preconditions
            .filter(|p| !p.is_empty())
            .ok_or_else(|| "it has no preconditions".to_string())?;

        let raw_steps = self
            .steps
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "it has no steps".to_string())?;

        let priority = self
            .priority
            .ok_or_else(|| "priority is missing".to_string())?;

        let category = self
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| "category is missing".to_string())?;

        let mut steps = Vec::with_capacity(raw_steps.len());
        for (i, step) in raw_steps.into_iter().enumerate() {
            let number = i + 1;

            let action = step
                .action
                .filter(|a| !a.trim().is_empty())
                .ok_or_else(|| format!("step {} has no action", number))?;
            let target = step
                .target
                .ok_or_else(|| format!("step {} has no target", number))?;
            let expected_result = step
                .expected_result
                .ok_or_else(|| format!("step {} has no expected_result", number))?;

            steps.push(TestStep {
                action,
                target,
                input_value: step.input_value,
                expected_result,
            });
        }

        if steps
            .last()
            .is_some_and(|s| s.expected_result.trim().is_empty())
        {
            return Err("the last step has no expected_result".to_string());
        }

        Ok(TestCaseDraft {
            title,
            preconditions,
            steps,
            priority,
            category,
        })
    }
}

/// Parse and validate generator output into drafts
///
/// Accepts `{"test_cases": [...]}`, a bare array, or a single test case
/// object. The error string names the problem and is suitable for a
/// corrective instruction.
pub fn parse_test_cases(raw: &str) -> Result<Vec<TestCaseDraft>, String> {
    let value = extract_json(raw).ok_or_else(|| "response contained no JSON".to_string())?;

    let parsed = if let Some(list) = value.get("test_cases") {
        serde_json::from_value::<Vec<RawCase>>(list.clone())
    } else if value.is_array() {
        serde_json::from_value(value)
    } else if value.is_object() {
        serde_json::from_value(value).map(|single| vec![single])
    } else {
        return Err("response JSON is neither an object nor an array".to_string());
    };

    let raw_cases =
        parsed.map_err(|e| format!("JSON does not match the test case schema ({})", e))?;

    if raw_cases.is_empty() {
        return Err("response contained no test cases".to_string());
    }

    raw_cases
        .into_iter()
        .enumerate()
        .map(|(i, raw)| {
            raw.validate()
                .map_err(|reason| format!("test case {} is invalid: {}", i + 1, reason))
        })
        .collect()
}

/// Locate a JSON value in free-form text
///
/// Tries the whole text, then a fenced code block, then the first balanced
/// object or array.
pub fn extract_json(raw: &str) -> Option<serde_json::Value> {
    let trimmed = raw.trim();

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(block) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str(block) {
            return Some(value);
        }
    }

    balanced_span(trimmed).and_then(|span| serde_json::from_str(span).ok())
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    // Skip an info string such as `json`
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

fn balanced_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

fn scalar_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
