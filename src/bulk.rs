//! Chunked generation of journal entries and newsletters.
//!
//! Years are requested in chunks. Every failure is contained to its chunk:
//! a failed request, an unparseable response or a response that matches none
//! of the requested years turns into placeholder documents for that chunk
//! only. Years a usable response leaves out are filled individually.

use crate::artifacts::ArtifactSink;
use crate::config::GenerationConfig;
use crate::error::{HistoryError, Result};
use crate::extract::extract_json;
use crate::llm::prompts::{chunk_prompt, single_year_prompt};
use crate::llm::{ContentGenerator, GenerateRequest};
use crate::normalize::{ensure_year_months, normalize_journal, normalize_newsletters};
use crate::rate_limit::RateLimiter;
use crate::salvage::{Provenance, Salvage};
use crate::schema::{
    response_schema_for, CompanyInput, DocumentContent, DocumentType, FinancialSection,
    GeneratedDocument, JournalBook, JournalLine, JournalYear, LineItem, Newsletter,
    NewsletterBatch, YearlyData,
};
use crate::utils::{fiscal_month_end, month_label, FISCAL_MONTHS};
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::Arc;

pub const PLACEHOLDER_MARKER: &str = " [生成失敗]";
const JOURNAL_HEADER: [&str; 5] = ["日付", "勘定科目", "借方", "貸方", "摘要"];
const MONTHS_PER_PAGE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStage {
    Requesting,
    /// Every year came back in the requested shape.
    Completed,
    /// Some years were recovered from a malformed response.
    Reconstructed,
    /// At least one year fell back to a placeholder.
    Placeholder,
}

/// Per-chunk progress; `index` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkProgress {
    pub index: usize,
    pub total: usize,
    /// Id of the first document in the chunk.
    pub doc_id: String,
    pub stage: ChunkStage,
}

pub struct BulkGenerator {
    client: Arc<dyn ContentGenerator>,
    sink: Arc<dyn ArtifactSink>,
    limiter: RateLimiter,
    config: GenerationConfig,
}

impl BulkGenerator {
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
        }
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Generates `doc_type` for every entry of `years`, chunk by chunk.
    ///
    /// Returns documents in input order. Fails only when `doc_type` is a
    /// local statement or when every chunk request failed.
    pub async fn generate_bulk(
        &self,
        company: &CompanyInput,
        years: &[YearlyData],
        doc_type: DocumentType,
        mut progress: impl FnMut(BulkProgress) + Send,
    ) -> Result<Vec<GeneratedDocument>> {
        if doc_type.is_local() {
            return Err(HistoryError::NotHeavy(doc_type.code().to_string()));
        }
        if years.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_size = self.config.chunk_size.max(1);
        let total = years.len().div_ceil(chunk_size);
        let mut documents = Vec::with_capacity(years.len());
        let mut failed_requests = 0;
        let mut last_error = None;

        info!(
            "Generating {} for {} years in {} chunks",
            doc_type,
            years.len(),
            total
        );

        for (idx, chunk) in years.chunks(chunk_size).enumerate() {
            let doc_id = doc_type.document_id(chunk[0].year);
            progress(BulkProgress {
                index: idx + 1,
                total,
                doc_id: doc_id.clone(),
                stage: ChunkStage::Requesting,
            });

            self.limiter.acquire().await;
            let refs: Vec<&YearlyData> = chunk.iter().collect();
            let request = self.request_for(doc_type, chunk_prompt(company, doc_type, &refs));

            let chunk_docs = match self.client.generate_content(request).await {
                Ok(response) => self.materialize(company, doc_type, chunk, &response.text),
                Err(e) => {
                    warn!(
                        "{} chunk {}/{} request failed: {}",
                        doc_type,
                        idx + 1,
                        total,
                        e
                    );
                    failed_requests += 1;
                    last_error = Some(e);
                    placeholders_for(company, doc_type, chunk)
                }
            };

            progress(BulkProgress {
                index: idx + 1,
                total,
                doc_id,
                stage: stage_of(&chunk_docs),
            });
            documents.extend(chunk_docs);
        }

        if failed_requests == total {
            let detail = last_error.map(|e| e.to_string()).unwrap_or_default();
            return Err(HistoryError::Request(format!(
                "all {} {} chunk requests failed: {}",
                total, doc_type, detail
            )));
        }

        Ok(documents)
    }

    /// One request for one year. Request errors are returned; unusable
    /// responses still produce a placeholder document.
    pub async fn generate_single(
        &self,
        company: &CompanyInput,
        data: &YearlyData,
        doc_type: DocumentType,
    ) -> Result<GeneratedDocument> {
        if doc_type.is_local() {
            return Err(HistoryError::NotHeavy(doc_type.code().to_string()));
        }
        let request = self.request_for(doc_type, single_year_prompt(company, doc_type, data));
        let response = self.client.generate_content(request).await?;
        let mut docs =
            self.materialize(company, doc_type, std::slice::from_ref(data), &response.text);
        docs.pop()
            .ok_or_else(|| HistoryError::Parse(format!("no document for {}", data.year)))
    }

    fn request_for(&self, doc_type: DocumentType, prompt: String) -> GenerateRequest {
        GenerateRequest::json(self.config.model.clone(), prompt, response_schema(doc_type))
    }

    fn materialize(
        &self,
        company: &CompanyInput,
        doc_type: DocumentType,
        chunk: &[YearlyData],
        raw: &str,
    ) -> Vec<GeneratedDocument> {
        let expected: Vec<i32> = chunk.iter().map(|d| d.year).collect();
        let extracted = extract_json(raw);
        let extraction_note = extracted.reason().map(str::to_string);
        let parsed = extracted.value();

        let documents = match doc_type {
            DocumentType::JournalEntries => {
                let result =
                    downgrade_if(normalize_journal(parsed, &expected, raw), extraction_note);
                let provenance = result.provenance();
                match result
                    .into_value()
                    .filter(|book| covers_any(&book.years, &expected))
                {
                    Some(book) => {
                        let book = ensure_year_months(book);
                        self.journal_documents(company, chunk, book, provenance)
                    }
                    None => placeholders_for(company, doc_type, chunk),
                }
            }
            DocumentType::Newsletter => {
                let result =
                    downgrade_if(normalize_newsletters(parsed, &expected, raw), extraction_note);
                let provenance = result.provenance();
                match result
                    .into_value()
                    .filter(|letters| letters.iter().any(|n| expected.contains(&n.year)))
                {
                    Some(letters) => self.newsletter_documents(company, chunk, &letters, provenance),
                    None => placeholders_for(company, doc_type, chunk),
                }
            }
            DocumentType::BalanceSheet | DocumentType::ProfitAndLoss | DocumentType::CashFlow => {
                return Vec::new();
            }
        };

        // A response can name the right years and still carry nothing usable.
        if !documents.is_empty() && documents.iter().all(GeneratedDocument::is_placeholder) {
            self.persist_raw(doc_type, chunk, raw);
        }
        documents
    }

    fn journal_documents(
        &self,
        company: &CompanyInput,
        chunk: &[YearlyData],
        book: JournalBook,
        provenance: Provenance,
    ) -> Vec<GeneratedDocument> {
        chunk
            .iter()
            .map(|data| match book.years.iter().find(|y| y.year == data.year) {
                Some(year) if year.line_count() > 0 => journal_document(year, provenance),
                _ => {
                    debug!("Response had no journal lines for {}", data.year);
                    placeholder(company, DocumentType::JournalEntries, data)
                }
            })
            .collect()
    }

    fn newsletter_documents(
        &self,
        company: &CompanyInput,
        chunk: &[YearlyData],
        letters: &[Newsletter],
        provenance: Provenance,
    ) -> Vec<GeneratedDocument> {
        chunk
            .iter()
            .map(|data| {
                match letters
                    .iter()
                    .find(|n| n.year == data.year && !n.content.trim().is_empty())
                {
                    Some(letter) => GeneratedDocument {
                        id: DocumentType::Newsletter.document_id(data.year),
                        doc_type: DocumentType::Newsletter,
                        year: data.year,
                        title: DocumentType::Newsletter.title_for(data.year),
                        content: DocumentContent::Text(letter.content.clone()),
                        provenance,
                    },
                    None => {
                        debug!("Response had no newsletter for {}", data.year);
                        placeholder(company, DocumentType::Newsletter, data)
                    }
                }
            })
            .collect()
    }

    /// Saves the raw text of a response that produced only placeholders.
    fn persist_raw(&self, doc_type: DocumentType, chunk: &[YearlyData], raw: &str) {
        let first = chunk.first().map_or(0, |d| d.year);
        let last = chunk.last().map_or(0, |d| d.year);
        let request_id = format!("{:08x}", rand::random::<u32>());
        let name = format!("{}-{}-{}-{}", doc_type.code(), first, last, request_id);
        match self.sink.persist(&name, raw.as_bytes()) {
            Ok(location) => warn!(
                "Unusable {} response for {}-{}; raw text saved to {}",
                doc_type, first, last, location
            ),
            Err(e) => warn!(
                "Unusable {} response for {}-{}; could not save raw text: {}",
                doc_type, first, last, e
            ),
        }
    }
}

fn placeholders_for(
    company: &CompanyInput,
    doc_type: DocumentType,
    chunk: &[YearlyData],
) -> Vec<GeneratedDocument> {
    chunk
        .iter()
        .map(|data| placeholder(company, doc_type, data))
        .collect()
}

fn response_schema(doc_type: DocumentType) -> Option<Value> {
    let schema = match doc_type {
        DocumentType::JournalEntries => response_schema_for::<JournalBook>(),
        DocumentType::Newsletter => response_schema_for::<NewsletterBatch>(),
        _ => return None,
    };
    match schema {
        Ok(schema) => Some(schema),
        Err(e) => {
            warn!("Could not build response schema for {}: {}", doc_type, e);
            None
        }
    }
}

fn downgrade_if<T>(result: Salvage<T>, note: Option<String>) -> Salvage<T> {
    match note {
        Some(reason) => result.downgrade(reason),
        None => result,
    }
}

fn covers_any(years: &[JournalYear], expected: &[i32]) -> bool {
    years.iter().any(|y| expected.contains(&y.year))
}

fn stage_of(documents: &[GeneratedDocument]) -> ChunkStage {
    if documents.iter().any(GeneratedDocument::is_placeholder) {
        ChunkStage::Placeholder
    } else if documents
        .iter()
        .any(|d| d.provenance == Provenance::Reconstructed)
    {
        ChunkStage::Reconstructed
    } else {
        ChunkStage::Completed
    }
}

fn journal_section(index: usize, title: String, items: Vec<JournalLine>) -> FinancialSection {
    FinancialSection {
        title: Some(title),
        header: Some(JOURNAL_HEADER.iter().map(|h| h.to_string()).collect()),
        page_break: index > 0 && index % MONTHS_PER_PAGE == 0,
        items: items.into_iter().map(LineItem::Journal).collect(),
    }
}

fn journal_document(year: &JournalYear, provenance: Provenance) -> GeneratedDocument {
    let sections = year
        .months
        .iter()
        .enumerate()
        .map(|(i, month)| journal_section(i, month.title.clone(), month.items.clone()))
        .collect();

    GeneratedDocument {
        id: DocumentType::JournalEntries.document_id(year.year),
        doc_type: DocumentType::JournalEntries,
        year: year.year,
        title: DocumentType::JournalEntries.title_for(year.year),
        content: DocumentContent::Sections { sections },
        provenance,
    }
}

/// Deterministic stand-in for a year the model did not deliver.
pub fn placeholder(
    company: &CompanyInput,
    doc_type: DocumentType,
    data: &YearlyData,
) -> GeneratedDocument {
    let content = match doc_type {
        DocumentType::Newsletter => DocumentContent::Text(format!(
            "# {} 社内報 {}年度\n\n本年度の社内報は自動生成に失敗しました。再生成してください。",
            company.name, data.year
        )),
        _ => DocumentContent::Sections {
            sections: placeholder_journal(data),
        },
    };

    GeneratedDocument {
        id: doc_type.document_id(data.year),
        doc_type,
        year: data.year,
        title: format!("{}{}", doc_type.title_for(data.year), PLACEHOLDER_MARKER),
        content,
        provenance: Provenance::Placeholder,
    }
}

/// Twelve months of a single sales entry: revenue (millions of yen) / 12 per month.
fn placeholder_journal(data: &YearlyData) -> Vec<FinancialSection> {
    let monthly = (data.revenue * 1_000_000.0 / 12.0).round();
    FISCAL_MONTHS
        .iter()
        .enumerate()
        .map(|(i, &month)| {
            let date = fiscal_month_end(data.year, month);
            let label = format!("{}分売上計上（自動生成）", month_label(month));
            let items = vec![
                JournalLine {
                    date: date.clone(),
                    account: "売掛金".to_string(),
                    debit: Some(monthly),
                    credit: None,
                    label: label.clone(),
                },
                JournalLine {
                    date,
                    account: "売上高".to_string(),
                    debit: None,
                    credit: Some(monthly),
                    label,
                },
            ];
            journal_section(i, month_label(month), items)
        })
        .collect()
}
