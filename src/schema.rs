use crate::coerce::{
    lenient_amount, lenient_count, lenient_f64, lenient_input, lenient_text, lenient_year, n,
};
use crate::error::{HistoryError, Result};
use crate::salvage::Provenance;
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::RangeInclusive;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CeoTenure {
    pub name: String,
    /// `None` marks the incumbent.
    #[serde(default, deserialize_with = "lenient_year")]
    pub resignation_year: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyInput {
    pub name: String,
    pub industry: String,
    pub founding_year: i32,
    pub simulation_end_year: i32,
    pub initial_employees: u32,
    pub current_employees: u32,
    /// Free-text description of the company's character and business.
    #[serde(default)]
    pub persona: String,
    #[serde(default)]
    pub key_events: String,
    pub ceos: Vec<CeoTenure>,
}

impl CompanyInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(HistoryError::InvalidInput(
                "company name must not be empty".to_string(),
            ));
        }
        if self.ceos.is_empty() {
            return Err(HistoryError::InvalidInput(
                "at least one CEO record is required".to_string(),
            ));
        }
        if self.simulation_end_year < self.founding_year {
            return Err(HistoryError::InvalidInput(format!(
                "simulation end year {} is before founding year {}",
                self.simulation_end_year, self.founding_year
            )));
        }
        Ok(())
    }

    /// The first CEO (in order) still in office during `year`, else the last one listed.
    pub fn ceo_for_year(&self, year: i32) -> Option<&CeoTenure> {
        self.ceos
            .iter()
            .find(|ceo| ceo.resignation_year.map_or(true, |resigned| resigned >= year))
            .or_else(|| self.ceos.last())
    }

    pub fn simulation_years(&self) -> RangeInclusive<i32> {
        self.founding_year..=self.simulation_end_year
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CurrentAssets {
    #[serde(default, deserialize_with = "lenient_amount")]
    pub cash: Option<f64>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub accounts_receivable: Option<f64>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub inventory: Option<f64>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub other: Option<f64>,
}

impl CurrentAssets {
    pub fn entries(&self) -> [(&'static str, Option<f64>); 4] {
        [
            ("現金及び預金", self.cash),
            ("売掛金", self.accounts_receivable),
            ("棚卸資産", self.inventory),
            ("その他流動資産", self.other),
        ]
    }

    pub fn sum(&self) -> f64 {
        self.entries().iter().map(|(_, v)| n(*v)).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FixedAssets {
    #[serde(default, deserialize_with = "lenient_amount")]
    pub tangible: Option<f64>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub intangible: Option<f64>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub investments: Option<f64>,
}

impl FixedAssets {
    pub fn entries(&self) -> [(&'static str, Option<f64>); 3] {
        [
            ("有形固定資産", self.tangible),
            ("無形固定資産", self.intangible),
            ("投資その他の資産", self.investments),
        ]
    }

    pub fn sum(&self) -> f64 {
        self.entries().iter().map(|(_, v)| n(*v)).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CurrentLiabilities {
    #[serde(default, deserialize_with = "lenient_amount")]
    pub accounts_payable: Option<f64>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub short_term_debt: Option<f64>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub other: Option<f64>,
}

impl CurrentLiabilities {
    pub fn entries(&self) -> [(&'static str, Option<f64>); 3] {
        [
            ("買掛金", self.accounts_payable),
            ("短期借入金", self.short_term_debt),
            ("その他流動負債", self.other),
        ]
    }

    pub fn sum(&self) -> f64 {
        self.entries().iter().map(|(_, v)| n(*v)).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FixedLiabilities {
    #[serde(default, deserialize_with = "lenient_amount")]
    pub long_term_debt: Option<f64>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub other: Option<f64>,
}

impl FixedLiabilities {
    pub fn entries(&self) -> [(&'static str, Option<f64>); 2] {
        [
            ("長期借入金", self.long_term_debt),
            ("その他固定負債", self.other),
        ]
    }

    pub fn sum(&self) -> f64 {
        self.entries().iter().map(|(_, v)| n(*v)).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetAssets {
    #[serde(default, deserialize_with = "lenient_amount")]
    pub capital_stock: Option<f64>,
    /// Balancing plug after reconciliation.
    #[serde(default, deserialize_with = "lenient_amount")]
    pub retained_earnings: Option<f64>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub other: Option<f64>,
}

impl NetAssets {
    pub fn entries(&self) -> [(&'static str, Option<f64>); 3] {
        [
            ("資本金", self.capital_stock),
            ("利益剰余金", self.retained_earnings),
            ("その他純資産", self.other),
        ]
    }

    pub fn sum(&self) -> f64 {
        self.entries().iter().map(|(_, v)| n(*v)).sum()
    }
}

/// Full statement snapshot for one fiscal year, in millions of yen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DetailedFinancials {
    #[serde(default, deserialize_with = "lenient_input")]
    pub sales: Option<f64>,
    #[serde(default, alias = "cogs", deserialize_with = "lenient_input")]
    pub cost_of_sales: Option<f64>,
    #[serde(default, deserialize_with = "lenient_input")]
    pub gross_profit: Option<f64>,
    #[serde(default, alias = "sgaExpenses", deserialize_with = "lenient_input")]
    pub sga: Option<f64>,
    #[serde(default, deserialize_with = "lenient_input")]
    pub operating_profit: Option<f64>,
    #[serde(default, deserialize_with = "lenient_input")]
    pub non_operating_income: Option<f64>,
    #[serde(default, deserialize_with = "lenient_input")]
    pub non_operating_expenses: Option<f64>,
    #[serde(default, deserialize_with = "lenient_input")]
    pub ordinary_profit: Option<f64>,
    #[serde(default, deserialize_with = "lenient_input")]
    pub extraordinary_income: Option<f64>,
    #[serde(default, deserialize_with = "lenient_input")]
    pub extraordinary_loss: Option<f64>,
    #[serde(default, alias = "incomeBeforeTax", deserialize_with = "lenient_input")]
    pub pre_tax_profit: Option<f64>,
    #[serde(default, alias = "incomeTax", deserialize_with = "lenient_input")]
    pub tax: Option<f64>,
    #[serde(default, alias = "netIncome", deserialize_with = "lenient_input")]
    pub net_profit: Option<f64>,

    #[serde(default, deserialize_with = "lenient_block")]
    pub current_assets: CurrentAssets,
    #[serde(default, deserialize_with = "lenient_block")]
    pub fixed_assets: FixedAssets,
    #[serde(default, deserialize_with = "lenient_block")]
    pub current_liabilities: CurrentLiabilities,
    #[serde(default, deserialize_with = "lenient_block")]
    pub fixed_liabilities: FixedLiabilities,
    #[serde(default, deserialize_with = "lenient_block")]
    pub net_assets: NetAssets,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total_assets: Option<f64>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total_liabilities: Option<f64>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total_net_assets: Option<f64>,

    #[serde(default, deserialize_with = "lenient_input")]
    pub operating_cf: Option<f64>,
    #[serde(default, deserialize_with = "lenient_input")]
    pub investing_cf: Option<f64>,
    #[serde(default, deserialize_with = "lenient_input")]
    pub financing_cf: Option<f64>,
    #[serde(default, deserialize_with = "lenient_input")]
    pub beginning_cash: Option<f64>,
    #[serde(default, deserialize_with = "lenient_input")]
    pub ending_cash: Option<f64>,
}

/// One simulated fiscal year. Headline figures are in millions of yen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct YearlyData {
    pub year: i32,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub revenue: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub operating_profit: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cash_flow: f64,
    #[serde(default, alias = "employeeCount", deserialize_with = "lenient_count")]
    pub employees: u32,
    #[serde(default, alias = "marketTrend", deserialize_with = "lenient_text")]
    pub market_context: String,
    #[serde(default, alias = "event", deserialize_with = "lenient_text")]
    pub company_event: String,
    #[serde(
        default,
        alias = "detailedFinancials",
        deserialize_with = "lenient_optional_block"
    )]
    pub financials: Option<DetailedFinancials>,
}

/// A user edit to a single headline field.
#[derive(Debug, Clone, PartialEq)]
pub enum YearlyEdit {
    Revenue(f64),
    OperatingProfit(f64),
    CashFlow(f64),
    Employees(u32),
    MarketContext(String),
    CompanyEvent(String),
}

impl YearlyData {
    /// Applies `edit`, carrying revenue and operating-profit changes into the
    /// detailed financials so that `gross - sga == operating profit` still holds.
    pub fn apply_edit(&mut self, edit: YearlyEdit) {
        match edit {
            YearlyEdit::Revenue(value) => {
                self.revenue = value;
                if let Some(fin) = self.financials.as_mut() {
                    fin.sales = Some(value);
                    if let Some(cogs) = fin.cost_of_sales {
                        fin.gross_profit = Some(value - cogs);
                    }
                    if let (Some(gross), Some(sga)) = (fin.gross_profit, fin.sga) {
                        fin.operating_profit = Some(gross - sga);
                        self.operating_profit = gross - sga;
                    }
                }
            }
            YearlyEdit::OperatingProfit(value) => {
                self.operating_profit = value;
                if let Some(fin) = self.financials.as_mut() {
                    fin.operating_profit = Some(value);
                    if let Some(gross) = fin.gross_profit {
                        fin.sga = Some(gross - value);
                    }
                }
            }
            YearlyEdit::CashFlow(value) => self.cash_flow = value,
            YearlyEdit::Employees(count) => self.employees = count,
            YearlyEdit::MarketContext(text) => self.market_context = text,
            YearlyEdit::CompanyEvent(text) => self.company_event = text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "BS")]
    BalanceSheet,
    #[serde(rename = "PL")]
    ProfitAndLoss,
    #[serde(rename = "CF")]
    CashFlow,
    #[serde(rename = "JE")]
    JournalEntries,
    #[serde(rename = "NEWSLETTER")]
    Newsletter,
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::BalanceSheet,
        DocumentType::ProfitAndLoss,
        DocumentType::CashFlow,
        DocumentType::JournalEntries,
        DocumentType::Newsletter,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            DocumentType::BalanceSheet => "BS",
            DocumentType::ProfitAndLoss => "PL",
            DocumentType::CashFlow => "CF",
            DocumentType::JournalEntries => "JE",
            DocumentType::Newsletter => "NEWSLETTER",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DocumentType::BalanceSheet => "貸借対照表",
            DocumentType::ProfitAndLoss => "損益計算書",
            DocumentType::CashFlow => "キャッシュ・フロー計算書",
            DocumentType::JournalEntries => "仕訳帳",
            DocumentType::Newsletter => "社内報",
        }
    }

    /// Local types are computed from known figures without an LLM call.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            DocumentType::BalanceSheet | DocumentType::ProfitAndLoss | DocumentType::CashFlow
        )
    }

    pub fn document_id(&self, year: i32) -> String {
        format!("{}-{}", self.code(), year)
    }

    pub fn title_for(&self, year: i32) -> String {
        format!("{} ({}年度)", self.display_name(), year)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JournalLine {
    #[serde(default, alias = "日付", deserialize_with = "lenient_text")]
    pub date: String,
    #[serde(default, alias = "勘定科目", deserialize_with = "lenient_text")]
    pub account: String,
    #[serde(default, alias = "借方", deserialize_with = "lenient_amount")]
    pub debit: Option<f64>,
    #[serde(default, alias = "貸方", deserialize_with = "lenient_amount")]
    pub credit: Option<f64>,
    #[serde(
        default,
        alias = "description",
        alias = "memo",
        alias = "摘要",
        deserialize_with = "lenient_text"
    )]
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JournalMonth {
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(default)]
    pub items: Vec<JournalLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JournalYear {
    pub year: i32,
    #[serde(default)]
    pub months: Vec<JournalMonth>,
}

impl JournalYear {
    pub fn line_count(&self) -> usize {
        self.months.iter().map(|m| m.items.len()).sum()
    }
}

/// Canonical journal-entry response shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JournalBook {
    pub years: Vec<JournalYear>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Newsletter {
    pub year: i32,
    /// Markdown body.
    pub content: String,
}

/// Canonical newsletter response shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NewsletterBatch {
    pub newsletters: Vec<Newsletter>,
}

/// Canonical history response shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HistoryResponse {
    pub years: Vec<YearlyData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueLine {
    pub label: String,
    pub value: Option<f64>,
    #[serde(default)]
    pub indent: u8,
    #[serde(default)]
    pub is_total: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineItem {
    Value(ValueLine),
    Journal(JournalLine),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub page_break: bool,
    pub items: Vec<LineItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentContent {
    Text(String),
    Sections { sections: Vec<FinancialSection> },
}

/// Unit handed to the export pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedDocument {
    pub id: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub year: i32,
    pub title: String,
    pub content: DocumentContent,
    pub provenance: Provenance,
}

impl GeneratedDocument {
    pub fn sections(&self) -> Option<&[FinancialSection]> {
        match &self.content {
            DocumentContent::Sections { sections } => Some(sections),
            DocumentContent::Text(_) => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            DocumentContent::Text(text) => Some(text),
            DocumentContent::Sections { .. } => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.provenance == Provenance::Placeholder
    }
}

/// Generates a Gemini-compatible response schema (inlined, no `$schema` or definitions).
pub fn response_schema_for<T: JsonSchema>() -> serde_json::Result<Value> {
    let settings = SchemaSettings::openapi3().with(|s| {
        s.inline_subschemas = true;
        s.meta_schema = None;
    });
    let root = settings.into_generator().into_root_schema_for::<T>();
    let mut schema = serde_json::to_value(root)?;
    clean_schema(&mut schema);
    Ok(schema)
}

fn clean_schema(schema: &mut Value) {
    match schema {
        Value::Object(map) => {
            for keyword in ["$schema", "definitions", "title", "default"] {
                map.remove(keyword);
            }
            for (key, child) in map.iter_mut() {
                if key == "properties" {
                    if let Value::Object(properties) = child {
                        properties.values_mut().for_each(clean_schema);
                    }
                } else {
                    clean_schema(child);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(clean_schema),
        _ => {}
    }
}

fn lenient_block<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default())
}

fn lenient_optional_block<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .filter(Value::is_object)
        .and_then(|v| serde_json::from_value(v).ok()))
}
