use crate::bulk::{BulkGenerator, ChunkStage};
use crate::rate_limit::RateLimiter;
use crate::render::render_statement;
use crate::schema::{CompanyInput, DocumentType, GeneratedDocument, YearlyData};
use log::{info, warn};

/// Routes document requests: local statements are rendered directly, heavy
/// types go through the bulk generator with a per-year fallback.
pub struct BatchController {
    bulk: BulkGenerator,
    fallback_limiter: RateLimiter,
}

impl BatchController {
    pub fn new(bulk: BulkGenerator) -> Self {
        let fallback_limiter = RateLimiter::per_interval(bulk.config().fallback_interval);
        Self {
            bulk,
            fallback_limiter,
        }
    }

    pub fn with_fallback_limiter(mut self, limiter: RateLimiter) -> Self {
        self.fallback_limiter = limiter;
        self
    }

    /// Generates every requested type for every requested year.
    ///
    /// `on_progress` receives the number of finished steps and a label after
    /// each local document, each bulk chunk and each fallback year. The batch
    /// never fails as a whole; documents that cannot be produced are logged
    /// and left out.
    pub async fn batch_generate(
        &self,
        company: &CompanyInput,
        history: &[YearlyData],
        years: &[i32],
        types: &[DocumentType],
        mut on_progress: impl FnMut(usize, &str) + Send,
    ) -> Vec<GeneratedDocument> {
        let selected: Vec<YearlyData> = years
            .iter()
            .filter_map(|&year| {
                let found = history.iter().find(|d| d.year == year).cloned();
                if found.is_none() {
                    warn!("No history entry for {}; it will be skipped", year);
                }
                found
            })
            .collect();

        let mut documents = Vec::new();
        let mut completed = 0;

        for &doc_type in types.iter().filter(|t| t.is_local()) {
            for data in &selected {
                let doc_id = doc_type.document_id(data.year);
                match render_statement(data, doc_type) {
                    Ok(doc) => documents.push(doc),
                    Err(e) => warn!("Skipping {}: {}", doc_id, e),
                }
                completed += 1;
                on_progress(completed, &doc_id);
            }
        }

        for &doc_type in types.iter().filter(|t| !t.is_local()) {
            info!("Starting bulk generation of {}", doc_type);
            let bulk_result = self
                .bulk
                .generate_bulk(company, &selected, doc_type, |p| {
                    if p.stage != ChunkStage::Requesting {
                        completed += 1;
                        let label = format!("{} ({}/{})", p.doc_id, p.index, p.total);
                        on_progress(completed, &label);
                    }
                })
                .await;

            match bulk_result {
                Ok(docs) => documents.extend(docs),
                Err(e) => {
                    warn!(
                        "Bulk generation of {} failed ({}); falling back to single years",
                        doc_type, e
                    );
                    for data in &selected {
                        self.fallback_limiter.acquire().await;
                        let doc_id = doc_type.document_id(data.year);
                        match self.bulk.generate_single(company, data, doc_type).await {
                            Ok(doc) => documents.push(doc),
                            Err(e) => warn!("Skipping {}: {}", doc_id, e),
                        }
                        completed += 1;
                        on_progress(completed, &doc_id);
                    }
                }
            }
        }

        info!("Batch finished with {} documents", documents.len());
        documents
    }
}
