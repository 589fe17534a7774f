//! End-to-end pipeline: documents to knowledge base to test cases to script

use qaforge::extract::{extract_bytes, ChunkConfig, DocumentKind, HtmlOutline};
use qaforge::index::{MockEmbedding, RetrievalFilter};
use qaforge::llm::{GenerationMode, MockLlmClient, ScriptedLlm};
use qaforge::{
    Chunker, Database, EmbeddingIndex, KnowledgeBase, QaError, Retriever, ScriptSynthesizer,
    TestCaseSynthesizer,
};
use std::sync::Arc;

const PRODUCT_SPECS: &str = "# Discounts\n\n\
The discount code SAVE15 applies a 15% discount to the cart subtotal.\n\n\
# Shipping\n\n\
Express shipping costs $10. Standard shipping is free.";

const CHECKOUT_HTML: &str = r#"<html><body>
<form id="checkout">
  <input id="discount-code" name="discount" placeholder="Discount code">
  <button id="apply-discount" type="button">Apply</button>
  <span id="total">$100.00</span>
</form>
</body></html>"#;

const GENERATED: &str = r#"Here are the test cases:
```json
{"test_cases": [{
  "title": "Apply SAVE15 discount code",
  "preconditions": ["Cart subtotal is $100"],
  "steps": [
    {"action": "type", "target": "discount code field", "input_value": "SAVE15", "expected_result": "Code is entered"},
    {"action": "click", "target": "apply button", "expected_result": "Total shows $85.00"},
    {"action": "drag", "target": "the mystery widget", "expected_result": "Nothing breaks"}
  ],
  "priority": "high",
  "category": "positive"
}]}
```"#;

async fn knowledge_base() -> (Arc<EmbeddingIndex>, Vec<qaforge::Document>) {
    let docs = vec![
        extract_bytes("product_specs.md", PRODUCT_SPECS.as_bytes()).unwrap(),
        extract_bytes("checkout.html", CHECKOUT_HTML.as_bytes()).unwrap(),
    ];

    let index = Arc::new(EmbeddingIndex::new(Arc::new(MockEmbedding::new(64))));
    let kb = KnowledgeBase::new(index.clone(), Chunker::new(ChunkConfig::default()));
    let report = kb.rebuild(&docs).await.unwrap();
    assert_eq!(report.documents, 2);

    (index, docs)
}

#[tokio::test]
async fn test_full_pipeline() {
    let (index, _) = knowledge_base().await;

    let generator = Arc::new(ScriptedLlm::new().then_respond(GENERATED));
    let synthesizer = TestCaseSynthesizer::new(generator.clone(), Retriever::new(index));

    let cases = synthesizer
        .synthesize(&GenerationMode::Custom {
            query: "test discount code validation".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(cases.len(), 1);
    assert!(generator.prompts()[0].contains("SAVE15"));

    let mut selectors = MockLlmClient::new();
    selectors.add_response(
        "**Target:** discount code field",
        r##"{"selector": "#discount-code", "confidence": 0.95}"##,
    );
    selectors.add_response(
        "**Target:** apply button",
        r##"{"selector": "#apply-discount", "confidence": 0.9}"##,
    );
    let selectors = Arc::new(selectors);

    let elements = HtmlOutline::parse(CHECKOUT_HTML).elements;
    let script_synthesizer =
        ScriptSynthesizer::new(selectors.clone(), elements, "file:///checkout.html");
    let script = script_synthesizer.generate_script(&cases[0]).await;

    assert_eq!(script.test_case_id, cases[0].id);
    assert!(script.body.contains("send_keys(\"SAVE15\")"));
    assert!(script.body.contains("#apply-discount"));
    assert!(script.body.contains("# MANUAL STEP: unsupported action \"drag\""));
    assert!(script.unresolved.is_empty());

    // The unsupported step never reaches the selector service
    assert_eq!(selectors.calls(), 2);
}

#[tokio::test]
async fn test_persisted_index_serves_queries() {
    let (index, docs) = knowledge_base().await;

    let db = Database::open_in_memory().unwrap();
    db.replace_knowledge_base(&docs, &index.snapshot()).unwrap();

    let restored = Arc::new(EmbeddingIndex::new(Arc::new(MockEmbedding::new(64))));
    restored.restore(db.load_snapshot().unwrap()).unwrap();
    assert_eq!(restored.len(), index.len());

    let retriever = Retriever::new(restored);
    let results = retriever
        .retrieve(
            "SAVE15 discount",
            5,
            Some(&RetrievalFilter::kind(DocumentKind::Markdown)),
        )
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.source_name == "product_specs.md"));
}

#[tokio::test]
async fn test_switching_embedding_model_is_rejected() {
    let (index, docs) = knowledge_base().await;

    let db = Database::open_in_memory().unwrap();
    db.replace_knowledge_base(&docs, &index.snapshot()).unwrap();

    let other = Arc::new(EmbeddingIndex::new(Arc::new(MockEmbedding::new(32))));
    other.restore(db.load_snapshot().unwrap()).unwrap();

    let err = Retriever::new(other)
        .retrieve("discount", 3, None)
        .await
        .unwrap_err();
    assert!(matches!(err, QaError::DimensionMismatch(_)));
}
