use crate::artifacts::ArtifactSink;
use crate::coerce::year_of;
use crate::config::GenerationConfig;
use crate::error::{HistoryError, Result};
use crate::extract::extract_json;
use crate::llm::prompts::history_prompt;
use crate::llm::{ContentGenerator, GenerateRequest};
use crate::normalize::{locate_primary, Primary};
use crate::rate_limit::RateLimiter;
use crate::reconcile::Reconciler;
use crate::schema::{response_schema_for, CompanyInput, HistoryResponse, YearlyData};
use log::{debug, info, warn};
use serde_json::Value;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Produces the reconciled multi-year history of a company with one model call.
pub struct HistoryGenerator {
    client: Arc<dyn ContentGenerator>,
    sink: Arc<dyn ArtifactSink>,
    limiter: RateLimiter,
    config: GenerationConfig,
    reconciler: Reconciler,
}

impl HistoryGenerator {
    pub fn new(
        client: Arc<dyn ContentGenerator>,
        sink: Arc<dyn ArtifactSink>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            client,
            sink,
            limiter: RateLimiter::per_interval(config.request_interval),
            config,
            reconciler: Reconciler::new(),
        }
    }

    pub fn with_reconciler(mut self, reconciler: Reconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub async fn generate(&self, company: &CompanyInput) -> Result<Vec<YearlyData>> {
        company.validate()?;

        let schema = match response_schema_for::<HistoryResponse>() {
            Ok(schema) => Some(schema),
            Err(e) => {
                warn!("Could not build history response schema: {}", e);
                None
            }
        };
        let request =
            GenerateRequest::json(self.config.model.clone(), history_prompt(company), schema);

        info!(
            "Requesting history for {} ({}-{})",
            company.name, company.founding_year, company.simulation_end_year
        );
        self.limiter.acquire().await;
        let response = self.client.generate_content(request).await?;

        let years = extract_json(&response.text)
            .into_value()
            .map(|parsed| decode_history(&parsed, company.simulation_years()))
            .unwrap_or_default();

        if years.is_empty() {
            let name = format!("HISTORY-{:08x}", rand::random::<u32>());
            let location = self
                .sink
                .persist(&name, response.text.as_bytes())
                .unwrap_or_else(|e| format!("(not saved: {})", e));
            return Err(HistoryError::Parse(format!(
                "history response contained no usable years; raw text at {}",
                location
            )));
        }

        info!("Decoded {} history years", years.len());
        Ok(self.reconciler.reconcile(&years))
    }
}

/// Decodes yearly entries from a parsed history response.
///
/// Entries without a usable year, outside `range`, or repeating an earlier
/// year are dropped. The result is sorted by year.
pub fn decode_history(parsed: &Value, range: RangeInclusive<i32>) -> Vec<YearlyData> {
    let items: &[Value] = match locate_primary(parsed, "years") {
        Primary::Array { items, .. } => items,
        Primary::Single(entry) => std::slice::from_ref(entry),
        Primary::Text(_) | Primary::Missing => match parsed.get("history") {
            Some(Value::Array(items)) => items,
            _ => &[],
        },
    };

    let mut years: Vec<YearlyData> = Vec::new();
    for item in items {
        let Some(year) = item.get("year").and_then(year_of) else {
            debug!("Dropping history entry without a usable year");
            continue;
        };
        if !range.contains(&year) || years.iter().any(|y| y.year == year) {
            continue;
        }
        let mut entry = item.clone();
        entry["year"] = Value::from(year);
        match serde_json::from_value::<YearlyData>(entry) {
            Ok(data) => years.push(data),
            Err(e) => debug!("Dropping history entry for {}: {}", year, e),
        }
    }

    years.sort_by_key(|y| y.year);
    years
}
