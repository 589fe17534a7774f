//! Command implementations

use crate::extract::{extract_file, Document, DocumentKind, HtmlOutline};
use crate::index::{EmbeddingIndex, KnowledgeBase, RetrievalFilter, RetrievalResult, Retriever};
use crate::llm::{GenerationMode, TestCase, TestCaseSynthesizer};
use crate::project::Project;
use crate::script::{Script, ScriptSynthesizer, SelectorResolver};
use crate::storage::{Database, DatabaseStats};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of a `build`
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildSummary {
    pub files: usize,
    pub documents: usize,
    pub chunks: usize,
    pub pages: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    pub appended: bool,
}

/// Knowledge base status
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub root: PathBuf,
    #[serde(flatten)]
    pub stats: DatabaseStats,
    pub sources: Vec<SourceCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceCount {
    pub source_name: String,
    pub chunks: usize,
}

/// Initialize qaforge in a directory
pub fn init(path: &Path, force: bool) -> Result<Project> {
    let project = Project::init(path, force)?;

    println!("✓ Initialized qaforge in {:?}", project.root());
    println!("  Database: {:?}", project.db_path());
    println!("  Config: {:?}", project.config_path());

    Ok(project)
}

/// Build (or extend) the knowledge base from files and directories
pub async fn build(project: &Project, paths: &[PathBuf], append: bool) -> Result<BuildSummary> {
    let db = project.open_database()?;
    let files = project.collect_files(paths)?;

    if files.is_empty() {
        anyhow::bail!("No supported documents found in {:?}", paths);
    }

    let mut summary = BuildSummary {
        files: files.len(),
        appended: append,
        ..Default::default()
    };

    let mut documents = Vec::new();
    let mut pages = Vec::new();

    for file in &files {
        match extract_file(file) {
            Ok(doc) => {
                if doc.kind == DocumentKind::Html {
                    let html = std::fs::read_to_string(file)
                        .with_context(|| format!("Failed to read {:?}", file))?;
                    pages.push((doc.source_name.clone(), html));
                }
                documents.push(doc);
            }
            Err(e) => {
                eprintln!("Warning: Failed to extract {:?}: {}", file, e);
                summary.failed.push(file.to_string_lossy().to_string());
            }
        }
    }

    let index = Arc::new(EmbeddingIndex::new(project.embedding_provider()?));
    let kb = KnowledgeBase::new(index.clone(), project.chunker()?);

    let (report, all_documents) = if append {
        index
            .restore(db.load_snapshot()?)
            .context("Stored index is unreadable; rebuild without --append")?;

        let stored = db.list_documents()?;
        let known: HashSet<&str> = stored.iter().map(|d| d.id.as_str()).collect();
        let fresh: Vec<Document> = documents
            .into_iter()
            .filter(|d| !known.contains(d.id.as_str()))
            .collect();

        // A changed file replaces every stored version of the same source
        let replaced_sources: HashSet<&str> =
            fresh.iter().map(|d| d.source_name.as_str()).collect();
        let (replaced, mut kept): (Vec<Document>, Vec<Document>) = stored
            .into_iter()
            .partition(|d| replaced_sources.contains(d.source_name.as_str()));

        if !replaced.is_empty() {
            let ids: HashSet<String> = replaced.iter().map(|d| d.id.clone()).collect();
            let removed = index.remove_documents(&ids);
            tracing::info!(
                "Replacing {} outdated documents ({} chunks)",
                replaced.len(),
                removed
            );
        }

        let report = kb.ingest(&fresh).await?;
        kept.extend(fresh);
        (report, kept)
    } else {
        let report = kb.rebuild(&documents).await?;
        (report, documents)
    };

    db.commit_build(&all_documents, &index.snapshot(), &pages, !append)?;
    summary.pages = pages.into_iter().map(|(name, _)| name).collect();

    summary.documents = report.documents;
    summary.chunks = report.chunks;
    summary.skipped = report.skipped;

    tracing::info!(
        "Knowledge base holds {} chunks from {} documents",
        index.len(),
        all_documents.len()
    );

    Ok(summary)
}

/// Restore the persisted index for querying
fn load_index(project: &Project, db: &Database) -> Result<Arc<EmbeddingIndex>> {
    let provider = project.embedding_provider()?;
    let snapshot = db.load_snapshot()?;

    if let Some(ref model) = snapshot.model {
        if model != provider.model_id() {
            anyhow::bail!(
                "The knowledge base was built with embedding model '{}' but '{}' is configured. \
                 Run 'qaforge build <paths>' to rebuild it.",
                model,
                provider.model_id()
            );
        }
    }

    let index = Arc::new(EmbeddingIndex::new(provider));
    index.restore(snapshot)?;

    if index.is_empty() {
        eprintln!("Warning: The knowledge base is empty. Run 'qaforge build <paths>' first.");
    }

    Ok(index)
}

/// Retrieve passages for a query
pub async fn search(
    project: &Project,
    query: &str,
    top_k: Option<i64>,
    filter: &RetrievalFilter,
) -> Result<Vec<RetrievalResult>> {
    let db = project.open_database()?;
    let retriever = Retriever::new(load_index(project, &db)?);
    let k = top_k.unwrap_or(project.config().retrieval.top_k);

    let filter = (!filter.is_empty()).then_some(filter);
    Ok(retriever.retrieve(query, k, filter).await?)
}

/// Generate and store test cases
pub async fn generate(project: &Project, mode: &GenerationMode) -> Result<Vec<TestCase>> {
    let db = project.open_database()?;
    let retriever = Retriever::new(load_index(project, &db)?);

    let retrieval = &project.config().retrieval;
    let synthesizer = TestCaseSynthesizer::new(project.completion_provider()?, retriever)
        .with_top_k(retrieval.top_k, retrieval.exhaustive_top_k);

    let cases = synthesizer.synthesize(mode).await?;

    let label = match mode {
        GenerationMode::Custom { query } => query.clone(),
        GenerationMode::Exhaustive => "exhaustive".to_string(),
        GenerationMode::Feature { name } => format!("feature: {}", name),
    };
    db.save_test_cases(&cases, &label)?;

    tracing::info!("Stored {} test cases", cases.len());

    Ok(cases)
}

/// Generate a Selenium script for a stored test case
pub async fn script(
    project: &Project,
    test_case_id: &str,
    page: Option<&str>,
    url: Option<&str>,
) -> Result<Script> {
    let db = project.open_database()?;

    let case = db
        .find_test_case(test_case_id)?
        .with_context(|| format!("Test case not found: {}", test_case_id))?;

    let (page_name, elements) = match db.get_page(page)? {
        Some((name, html)) => {
            let elements = HtmlOutline::parse(&html).elements;
            tracing::info!("Resolving selectors against {} ({} elements)", name, elements.len());
            (Some(name), elements)
        }
        None => {
            if let Some(name) = page {
                anyhow::bail!("No ingested HTML page named '{}'", name);
            }
            eprintln!("Warning: No HTML page has been ingested; selectors cannot be grounded.");
            (None, Vec::new())
        }
    };

    let settings = &project.config().script;
    let cached = match page_name.as_deref() {
        Some(name) => db.load_selector_cache(name)?,
        None => Vec::new(),
    };

    let resolver = SelectorResolver::new(project.completion_provider()?, elements)
        .with_min_confidence(settings.min_confidence)
        .with_cached(cached);

    let synthesizer =
        ScriptSynthesizer::with_resolver(resolver, url.unwrap_or(&settings.page_url))
            .with_wait_seconds(settings.wait_seconds);

    let script = synthesizer.generate_script(&case).await;

    if let Some(name) = page_name.as_deref() {
        db.save_selector_cache(name, &synthesizer.resolver().cached_entries().await)?;
    }

    Ok(script)
}

/// Show knowledge base statistics
pub fn status(project: &Project) -> Result<StatusReport> {
    let db = project.open_database()?;

    let sources = db
        .list_sources()?
        .into_iter()
        .map(|(source_name, chunks)| SourceCount {
            source_name,
            chunks,
        })
        .collect();

    Ok(StatusReport {
        root: project.root().to_path_buf(),
        stats: db.get_stats()?,
        sources,
    })
}

/// Clear the knowledge base, keeping generated test cases
pub fn reset(project: &Project) -> Result<()> {
    let db = project.open_database()?;
    db.clear_knowledge_base()?;

    println!("✓ Knowledge base cleared");

    Ok(())
}

/// List stored test cases
pub fn list(project: &Project) -> Result<Vec<TestCase>> {
    let db = project.open_database()?;
    Ok(db.list_test_cases()?)
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_build_text(summary: &BuildSummary) {
    println!(
        "✓ {} knowledge base",
        if summary.appended { "Extended" } else { "Built" }
    );
    println!("  Files: {}", summary.files);
    println!("  Documents indexed: {}", summary.documents);
    println!("  Chunks: {}", summary.chunks);

    if !summary.pages.is_empty() {
        println!("  HTML pages: {}", summary.pages.join(", "));
    }
    if !summary.skipped.is_empty() {
        println!("  Skipped (no text): {}", summary.skipped.join(", "));
    }
    if !summary.failed.is_empty() {
        println!("  Failed: {}", summary.failed.len());
    }
}

pub fn print_results_text(results: &[RetrievalResult]) {
    if results.is_empty() {
        println!("No matching passages.");
        return;
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{}] {} (score {:.3})",
            i + 1,
            result.kind,
            result.source_name,
            result.score
        );
        for line in result.text.lines() {
            println!("   {}", line);
        }
        println!();
    }
}

pub fn print_cases_text(cases: &[TestCase]) {
    if cases.is_empty() {
        println!("No test cases.");
        return;
    }

    for case in cases {
        println!("{}", case.to_markdown());
    }
}

/// One line per test case
pub fn print_case_list_text(cases: &[TestCase]) {
    if cases.is_empty() {
        println!("No test cases. Run 'qaforge generate' first.");
        return;
    }

    for case in cases {
        let short_id: String = case.id.chars().take(8).collect();
        println!(
            "{}  [{}] {} ({})",
            short_id, case.priority, case.title, case.category
        );
    }
}

pub fn print_status_text(report: &StatusReport) {
    let stats = &report.stats;

    println!("qaforge Status");
    println!("==============\n");

    println!("Project: {:?}", report.root);
    println!("Documents: {}", stats.documents);
    println!("Chunks: {}", stats.chunks);
    println!("HTML pages: {}", stats.pages);
    println!("Test cases: {}", stats.test_cases);

    if let Some(ref model) = stats.model {
        println!(
            "Embedding model: {} ({} dimensions)",
            model,
            stats.dimension.unwrap_or_default()
        );
    }
    if let Some(built_at) = stats.built_at {
        println!("Last build: {}", built_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    if !report.sources.is_empty() {
        println!("\nSources:");
        for source in &report.sources {
            println!("  {} ({} chunks)", source.source_name, source.chunks);
        }
    }
}

/// Print a script, or write it to `output`
pub fn write_script(script: &Script, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, &script.body)
                .with_context(|| format!("Failed to write {:?}", path))?;
            println!("✓ Wrote {:?}", path);
        }
        None => print!("{}", script.body),
    }

    for unresolved in &script.unresolved {
        eprintln!(
            "Warning: step {} target \"{}\" unresolved: {}",
            unresolved.step, unresolved.target, unresolved.reason
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Provider;
    use tempfile::TempDir;

    fn project_with_docs() -> (TempDir, Project) {
        let dir = TempDir::new().unwrap();
        let mut project = Project::init(dir.path(), false).unwrap();
        project.config_mut().embedding.provider = Provider::Mock;
        project.config_mut().embedding.dimension = 64;

        let docs = dir.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(
            docs.join("product_specs.md"),
            "# Discounts\n\nDiscount code SAVE15 gives 15% off the cart subtotal.",
        )
        .unwrap();
        std::fs::write(
            docs.join("checkout.html"),
            r#"<html><body><input id="discount-code" placeholder="Discount code"><button id="apply">Apply</button></body></html>"#,
        )
        .unwrap();

        (dir, project)
    }

    #[tokio::test]
    async fn test_build_and_search() {
        let (_dir, project) = project_with_docs();

        let summary = build(&project, &[PathBuf::from("docs")], false)
            .await
            .unwrap();
        assert_eq!(summary.files, 2);
        assert_eq!(summary.documents, 2);
        assert_eq!(summary.pages, vec!["checkout.html".to_string()]);

        let results = search(&project, "SAVE15 discount", Some(5), &RetrievalFilter::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);

        let html_only = search(
            &project,
            "SAVE15 discount",
            None,
            &RetrievalFilter::kind(DocumentKind::Html),
        )
        .await
        .unwrap();
        assert!(html_only.iter().all(|r| r.kind == DocumentKind::Html));
    }

    #[tokio::test]
    async fn test_append_skips_known_documents() {
        let (dir, project) = project_with_docs();
        build(&project, &[PathBuf::from("docs")], false)
            .await
            .unwrap();

        std::fs::write(
            dir.path().join("docs").join("ui_guide.txt"),
            "Error messages are shown in red below the field.",
        )
        .unwrap();

        let summary = build(&project, &[PathBuf::from("docs")], true)
            .await
            .unwrap();
        assert_eq!(summary.documents, 1);

        let report = status(&project).unwrap();
        assert_eq!(report.stats.documents, 3);
        assert_eq!(report.sources.len(), 3);
    }

    #[tokio::test]
    async fn test_append_replaces_edited_source() {
        let (dir, project) = project_with_docs();
        build(&project, &[PathBuf::from("docs")], false)
            .await
            .unwrap();

        std::fs::write(
            dir.path().join("docs").join("product_specs.md"),
            "# Discounts\n\nDiscount code SAVE20 gives 20% off the cart subtotal.",
        )
        .unwrap();

        let summary = build(&project, &[PathBuf::from("docs")], true)
            .await
            .unwrap();
        assert_eq!(summary.documents, 1);

        let report = status(&project).unwrap();
        assert_eq!(report.stats.documents, 2);
        assert_eq!(report.sources.len(), 2);

        let results = search(&project, "SAVE15 SAVE20", Some(10), &RetrievalFilter::default())
            .await
            .unwrap();
        assert!(results.iter().any(|r| r.text.contains("SAVE20")));
        assert!(results.iter().all(|r| !r.text.contains("SAVE15")));
    }

    #[tokio::test]
    async fn test_rebuild_drops_pages_of_removed_files() {
        let (dir, project) = project_with_docs();
        build(&project, &[PathBuf::from("docs")], false)
            .await
            .unwrap();

        std::fs::remove_file(dir.path().join("docs").join("checkout.html")).unwrap();
        build(&project, &[PathBuf::from("docs")], false)
            .await
            .unwrap();

        let report = status(&project).unwrap();
        assert_eq!(report.stats.pages, 0);
        assert_eq!(report.stats.documents, 1);
    }

    #[tokio::test]
    async fn test_build_rejects_zero_dimension() {
        let (_dir, mut project) = project_with_docs();
        project.config_mut().embedding.dimension = 0;

        let err = build(&project, &[PathBuf::from("docs")], false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dimension must be positive"));
        assert_eq!(status(&project).unwrap().stats.documents, 0);
    }

    #[tokio::test]
    async fn test_reset_clears_index() {
        let (_dir, project) = project_with_docs();
        build(&project, &[PathBuf::from("docs")], false)
            .await
            .unwrap();

        reset(&project).unwrap();

        let report = status(&project).unwrap();
        assert_eq!(report.stats.chunks, 0);
        assert_eq!(report.stats.pages, 0);
        assert!(list(&project).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_script_requires_known_case() {
        let (_dir, project) = project_with_docs();
        let err = script(&project, "missing", None, None).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
