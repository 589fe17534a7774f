//! qaforge - grounded QA test case and automation script generator
//!
//! This library provides the core pipeline: documents are chunked and
//! embedded into a knowledge base, retrieved passages ground LLM-generated
//! test cases, and test cases are turned into Selenium scripts.

pub mod cli;
pub mod error;
pub mod extract;
pub mod index;
pub mod llm;
pub mod project;
pub mod script;
pub mod storage;

/// Re-export commonly used types
pub use error::{QaError, Result};
pub use extract::{Chunk, Chunker, Document};
pub use index::{EmbeddingIndex, KnowledgeBase, Retriever};
pub use llm::{TestCase, TestCaseSynthesizer};
pub use project::Project;
pub use script::{Script, ScriptSynthesizer};
pub use storage::Database;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "qaforge";
