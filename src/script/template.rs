//! Fixed Python + Selenium template grammar

use crate::llm::TestCase;

pub const LANGUAGE_TAG: &str = "python-selenium";
pub const TEMPLATE_VERSION: &str = "v1";

/// Indentation of lines inside the `try:` block
pub const INDENT: &str = "    ";

/// Quote `text` as a Python string literal
///
/// JSON string escapes are a subset of Python's.
pub fn py_str(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

/// Collapse `text` onto one line for use inside a comment
pub fn comment_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Everything up to and including the opening of the `try:` block
pub fn setup_block(case: &TestCase, page_url: &str, wait_seconds: u64) -> String {
    let mut out = String::new();

    out.push_str(&format!("# Test: {}\n", comment_text(&case.title)));
    out.push_str(&format!("# Test case: {}\n", case.id));
    out.push_str(&format!("# Priority: {}\n", case.priority));
    out.push_str(&format!("# Template: {}\n", TEMPLATE_VERSION));
    for precondition in &case.preconditions {
        out.push_str(&format!("# Precondition: {}\n", comment_text(precondition)));
    }
    out.push('\n');

    out.push_str("from selenium import webdriver\n");
    out.push_str("from selenium.webdriver.common.by import By\n");
    out.push_str("from selenium.webdriver.support import expected_conditions as EC\n");
    out.push_str("from selenium.webdriver.support.ui import Select, WebDriverWait\n");
    out.push('\n');

    out.push_str(&format!("PAGE_URL = {}\n", py_str(page_url)));
    out.push('\n');

    out.push_str("driver = webdriver.Chrome()\n");
    out.push_str(&format!("wait = WebDriverWait(driver, {})\n", wait_seconds));
    out.push('\n');

    out.push_str("try:\n");
    out.push_str(INDENT);
    out.push_str("driver.get(PAGE_URL)\n");

    out
}

/// Closing of the `try:` block and driver shutdown
pub fn teardown_block(case: &TestCase) -> String {
    let mut out = String::new();

    out.push_str(INDENT);
    out.push_str(&format!(
        "print({})\n",
        py_str(&format!("PASSED: {}", comment_text(&case.title)))
    ));
    out.push_str("finally:\n");
    out.push_str(INDENT);
    out.push_str("driver.quit()\n");

    out
}

/// Locator tuple for a CSS selector
pub fn locator(selector: &str) -> String {
    format!("(By.CSS_SELECTOR, {})", py_str(selector))
}
