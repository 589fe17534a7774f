//! qaforge - grounded QA test case and automation script generator
//!
//! Builds a knowledge base from support documents, generates structured test
//! cases from it, and turns them into Selenium scripts.

use anyhow::Result;
use qaforge::cli::{
    build, generate, init, list, print_build_text, print_case_list_text, print_cases_text,
    print_json, print_results_text, print_status_text, reset, script, search, status,
    write_script, Cli, Commands, OutputFormat,
};
use qaforge::index::RetrievalFilter;
use qaforge::llm::GenerationMode;
use qaforge::project::Project;
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let project_path = Path::new(&cli.path);

    if let Commands::Init(args) = &cli.command {
        init(project_path, args.force)?;
        return Ok(());
    }

    let mut project = Project::open(project_path)?;

    // Keys from the command line or environment override the config file
    if let Some(key) = cli.llm_api_key.clone() {
        project.config_mut().llm.api_key = Some(key);
    }
    if let Some(key) = cli.embedding_api_key.clone() {
        project.config_mut().embedding.api_key = Some(key);
    }

    match cli.command {
        Commands::Init(_) => {}

        Commands::Build(args) => {
            let summary = build(&project, &args.paths, args.append).await?;

            match cli.format {
                OutputFormat::Json => print_json(&summary)?,
                OutputFormat::Text => print_build_text(&summary),
            }
        }

        Commands::Search(args) => {
            let filter = RetrievalFilter {
                kinds: args.kind.into_iter().collect(),
                sources: args.source,
            };
            let results = search(&project, &args.query, args.top_k, &filter).await?;

            match cli.format {
                OutputFormat::Json => print_json(&results)?,
                OutputFormat::Text => print_results_text(&results),
            }
        }

        Commands::Generate(args) => {
            let mode = match (args.query, args.feature) {
                (Some(query), _) => GenerationMode::Custom { query },
                (None, Some(name)) => GenerationMode::Feature { name },
                (None, None) => GenerationMode::Exhaustive,
            };
            let cases = generate(&project, &mode).await?;

            match cli.format {
                OutputFormat::Json => print_json(&cases)?,
                OutputFormat::Text => print_cases_text(&cases),
            }
        }

        Commands::Script(args) => {
            let script = script(
                &project,
                &args.test_case_id,
                args.page.as_deref(),
                args.url.as_deref(),
            )
            .await?;

            match cli.format {
                OutputFormat::Json => print_json(&script)?,
                OutputFormat::Text => write_script(&script, args.output.as_deref())?,
            }
        }

        Commands::Status => {
            let report = status(&project)?;

            match cli.format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Text => print_status_text(&report),
            }
        }

        Commands::Reset => reset(&project)?,

        Commands::List => {
            let cases = list(&project)?;

            match cli.format {
                OutputFormat::Json => print_json(&cases)?,
                OutputFormat::Text => print_case_list_text(&cases),
            }
        }
    }

    Ok(())
}
