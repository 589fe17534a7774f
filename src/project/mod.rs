//! Project layout and collaborator wiring
//!
//! A project is a working directory with a `.qaforge/` folder holding the
//! configuration file and the SQLite database.

mod config;

pub use config::{
    AppConfig, ChunkSettings, EmbeddingSettings, IngestSettings, LlmSettings, Provider,
    RetrievalSettings, ScriptSettings, CONFIG_FILE, PROJECT_DIR,
};

use crate::extract::{ChunkConfig, Chunker};
use crate::index::{EmbeddingProvider, LocalEmbedding, MockEmbedding, OpenAIEmbedding};
use crate::llm::{ApiFlavor, CompletionProvider, LlmClient, LlmConfig};
use crate::storage::Database;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Database file name inside [`PROJECT_DIR`]
pub const DATABASE_FILE: &str = "qaforge.db";

/// A qaforge working directory
pub struct Project {
    root: PathBuf,
    config: AppConfig,
}

impl Project {
    /// Open the project rooted at `path`, loading its configuration
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path
            .as_ref()
            .canonicalize()
            .with_context(|| format!("Failed to resolve project path {:?}", path.as_ref()))?;

        let config = AppConfig::load_or_default(&root)?;

        Ok(Self { root, config })
    }

    /// Create `.qaforge/` with a default configuration and an empty database
    ///
    /// An existing configuration is kept unless `force` is set.
    pub fn init<P: AsRef<Path>>(path: P, force: bool) -> Result<Self> {
        let project = Self::open(path)?;
        let project_dir = project.project_dir();

        std::fs::create_dir_all(&project_dir)
            .with_context(|| format!("Failed to create {:?}", project_dir))?;

        let config = if force || !project.config_path().exists() {
            let config = AppConfig::default();
            config.save(&project.root)?;
            config
        } else {
            project.config.clone()
        };

        if force && project.db_path().exists() {
            std::fs::remove_file(project.db_path())
                .with_context(|| format!("Failed to remove {:?}", project.db_path()))?;
        }

        Database::open(project.db_path())
            .with_context(|| format!("Failed to create database at {:?}", project.db_path()))?;

        tracing::info!("Initialized project at {:?}", project.root);

        Ok(Self {
            root: project.root,
            config,
        })
    }

    /// Get the project root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    /// Get the path to the .qaforge directory
    pub fn project_dir(&self) -> PathBuf {
        self.root.join(PROJECT_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.project_dir().join(CONFIG_FILE)
    }

    pub fn db_path(&self) -> PathBuf {
        self.project_dir().join(DATABASE_FILE)
    }

    pub fn is_initialized(&self) -> bool {
        self.db_path().exists()
    }

    /// Open the project database, failing if `init` has not been run
    pub fn open_database(&self) -> Result<Database> {
        if !self.is_initialized() {
            anyhow::bail!(
                "No qaforge project at {:?}. Run 'qaforge init' first.",
                self.root
            );
        }

        Database::open(self.db_path())
            .with_context(|| format!("Failed to open database at {:?}", self.db_path()))
    }

    /// Chunker configured from the project settings
    pub fn chunker(&self) -> Result<Chunker> {
        let config = ChunkConfig::new(self.config.chunk.max_size, self.config.chunk.overlap)
            .context("Invalid [chunk] configuration")?;
        Ok(Chunker::new(config))
    }

    /// Embedding collaborator configured from the project settings
    pub fn embedding_provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let settings = &self.config.embedding;

        if settings.dimension == 0 {
            anyhow::bail!("Invalid [embedding] configuration: dimension must be positive");
        }

        let provider: Arc<dyn EmbeddingProvider> = match settings.provider {
            Provider::Ollama => Arc::new(
                LocalEmbedding::new(&settings.endpoint, &settings.model)
                    .with_dimension(settings.dimension)
                    .with_timeout(settings.timeout_secs),
            ),
            Provider::OpenAI => Arc::new(
                OpenAIEmbedding::new(
                    &settings.endpoint,
                    &settings.model,
                    settings.api_key.as_deref(),
                )
                .with_dimension(settings.dimension)
                .with_timeout(settings.timeout_secs),
            ),
            Provider::Mock => Arc::new(MockEmbedding::new(settings.dimension)),
        };

        Ok(provider)
    }

    /// Generation client configured from the project settings
    pub fn llm_client(&self) -> Result<LlmClient> {
        let settings = &self.config.llm;

        let flavor = match settings.provider {
            Provider::Ollama => ApiFlavor::Ollama,
            Provider::OpenAI => ApiFlavor::OpenAI,
            Provider::Mock => {
                anyhow::bail!("The mock provider is only available for embeddings")
            }
        };

        Ok(LlmClient::new(LlmConfig {
            flavor,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout_secs: settings.timeout_secs,
            json_mode: settings.json_mode,
            ..Default::default()
        }))
    }

    /// Generation collaborator as a trait object
    pub fn completion_provider(&self) -> Result<Arc<dyn CompletionProvider>> {
        Ok(Arc::new(self.llm_client()?))
    }

    /// Expand files and directories into ingestible files, sorted
    pub fn collect_files(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for path in paths {
            let joined = if path.is_absolute() {
                path.clone()
            } else {
                self.root.join(path)
            };
            let path = joined
                .canonicalize()
                .with_context(|| format!("No such file or directory: {:?}", joined))?;

            if path.is_file() {
                // Explicitly named files are taken as-is
                files.push(path);
                continue;
            }

            for entry in WalkDir::new(&path)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let file = entry.path();
                if !entry.file_type().is_file() || !self.config.is_supported(file) {
                    continue;
                }

                let relative = file
                    .strip_prefix(&self.root)
                    .unwrap_or(file)
                    .to_string_lossy()
                    .replace('\\', "/");
                if self.config.should_ignore(&relative) {
                    tracing::debug!("Ignoring {}", relative);
                    continue;
                }

                files.push(file.to_path_buf());
            }
        }

        files.sort();
        files.dedup();

        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_layout() {
        let dir = TempDir::new().unwrap();
        let project = Project::init(dir.path(), false).unwrap();

        assert!(project.config_path().exists());
        assert!(project.is_initialized());
        assert!(project.open_database().is_ok());
    }

    #[test]
    fn test_init_keeps_existing_config_without_force() {
        let dir = TempDir::new().unwrap();
        let mut project = Project::init(dir.path(), false).unwrap();
        project.config_mut().chunk.max_size = 300;
        project.config().save(project.root()).unwrap();

        let again = Project::init(dir.path(), false).unwrap();
        assert_eq!(again.config().chunk.max_size, 300);

        let forced = Project::init(dir.path(), true).unwrap();
        assert_eq!(forced.config().chunk.max_size, 500);
    }

    #[test]
    fn test_open_database_requires_init() {
        let dir = TempDir::new().unwrap();
        let project = Project::open(dir.path()).unwrap();
        assert!(project.open_database().is_err());
    }

    #[test]
    fn test_collect_files_filters_and_ignores() {
        let dir = TempDir::new().unwrap();
        let project = Project::init(dir.path(), false).unwrap();

        let docs = dir.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("product_specs.md"), "# Specs").unwrap();
        std::fs::write(docs.join("checkout.html"), "<html></html>").unwrap();
        std::fs::write(docs.join("logo.png"), [0u8; 4]).unwrap();

        let files = project
            .collect_files(&[PathBuf::from("docs"), PathBuf::from(".")])
            .unwrap();

        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["checkout.html", "product_specs.md"]);

        assert!(project.collect_files(&[PathBuf::from("missing")]).is_err());
    }

    #[test]
    fn test_mock_llm_provider_rejected() {
        let dir = TempDir::new().unwrap();
        let mut project = Project::open(dir.path()).unwrap();
        project.config_mut().llm.provider = Provider::Mock;
        assert!(project.llm_client().is_err());

        project.config_mut().embedding.provider = Provider::Mock;
        project.config_mut().embedding.dimension = 32;
        assert_eq!(project.embedding_provider().unwrap().model_id(), "mock-32");
    }

    #[test]
    fn test_zero_embedding_dimension_rejected() {
        let dir = TempDir::new().unwrap();
        let mut project = Project::open(dir.path()).unwrap();
        project.config_mut().embedding.provider = Provider::Mock;
        project.config_mut().embedding.dimension = 0;

        let err = project.embedding_provider().err().unwrap();
        assert!(err.to_string().contains("dimension must be positive"));
    }
}
