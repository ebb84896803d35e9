//! # SME History Builder
//!
//! A library for synthesizing the multi-year financial history of a fictitious
//! Japanese small or medium enterprise with a large language model, and for
//! turning that history into structured financial documents.
//!
//! ## Core Concepts
//!
//! - **History**: one [`YearlyData`] per fiscal year, generated in a single model call
//!   and reconciled so the statements add up
//! - **Local documents**: balance sheet, P&L and cash flow, rendered from known figures
//!   without any model call
//! - **Heavy documents**: journal entries and newsletters, generated in chunks of years
//! - **Salvage**: model output is never trusted blindly. JSON is extracted with a fallback
//!   chain, malformed shapes are repaired, and what cannot be repaired becomes a
//!   clearly marked placeholder
//!
//! ## Example
//!
//! ```rust,ignore
//! use sme_history_builder::*;
//! use std::sync::Arc;
//!
//! let client = Arc::new(GeminiClient::from_env()?);
//! let pipeline = HistoryPipeline::new(client, GenerationConfig::from_env()?);
//!
//! let history = pipeline.generate_history(&company).await?;
//! let years: Vec<i32> = history.iter().map(|y| y.year).collect();
//! let documents = pipeline
//!     .generate_documents(&company, &history, &years, &DocumentType::ALL, |done, label| {
//!         println!("{done}: {label}");
//!     })
//!     .await;
//! ```

pub mod artifacts;
pub mod batch;
pub mod bulk;
pub mod coerce;
pub mod config;
pub mod error;
pub mod extract;
pub mod history;
pub mod llm;
pub mod normalize;
pub mod rate_limit;
pub mod reconcile;
pub mod render;
pub mod salvage;
pub mod schema;
pub mod utils;

pub use artifacts::{ArtifactSink, FsArtifactSink, NullArtifactSink};
pub use batch::BatchController;
pub use bulk::{BulkGenerator, BulkProgress, ChunkStage, PLACEHOLDER_MARKER};
pub use config::GenerationConfig;
pub use error::{HistoryError, Result};
pub use extract::{extract_json, parse_loose};
pub use history::{decode_history, HistoryGenerator};
pub use llm::{ContentGenerator, GenerateRequest, LlmResponse, ResponseConfig, Usage};
#[cfg(feature = "gemini")]
pub use llm::GeminiClient;
pub use normalize::{ensure_year_months, normalize_journal, normalize_newsletters, RawShape};
pub use rate_limit::RateLimiter;
pub use reconcile::{reconcile, verify_financials, FlatRateTax, Reconciler, TaxPolicy};
pub use render::{render_local_batch, render_statement};
pub use salvage::{Provenance, Salvage};
pub use schema::*;

use log::info;
use std::sync::Arc;

/// Picks the artifact sink for a configuration: files under `debug_dir` when
/// set, the log otherwise.
pub fn artifact_sink_for(config: &GenerationConfig) -> Arc<dyn ArtifactSink> {
    match &config.debug_dir {
        Some(dir) => Arc::new(FsArtifactSink::new(dir.clone())),
        None => Arc::new(NullArtifactSink),
    }
}

/// History generation and document generation wired to one client and one
/// configuration.
pub struct HistoryPipeline {
    history: HistoryGenerator,
    batch: BatchController,
}

impl HistoryPipeline {
    pub fn new(client: Arc<dyn ContentGenerator>, config: GenerationConfig) -> Self {
        let sink = artifact_sink_for(&config);
        Self::with_sink(client, sink, config)
    }

    pub fn with_sink(
        client: Arc<dyn ContentGenerator>,
        sink: Arc<dyn ArtifactSink>,
        config: GenerationConfig,
    ) -> Self {
        info!(
            "Pipeline using model {} with chunks of {} years",
            config.model, config.chunk_size
        );
        let history = HistoryGenerator::new(client.clone(), sink.clone(), config.clone());
        let batch = BatchController::new(BulkGenerator::new(client, sink, config));
        Self { history, batch }
    }

    pub async fn generate_history(&self, company: &CompanyInput) -> Result<Vec<YearlyData>> {
        self.history.generate(company).await
    }

    pub async fn generate_documents(
        &self,
        company: &CompanyInput,
        history: &[YearlyData],
        years: &[i32],
        types: &[DocumentType],
        on_progress: impl FnMut(usize, &str) + Send,
    ) -> Vec<GeneratedDocument> {
        self.batch
            .batch_generate(company, history, years, types, on_progress)
            .await
    }
}
