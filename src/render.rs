//! Pure rendering of balance sheet, profit & loss and cash-flow statements
//! from already-known figures. No LLM involvement.

use crate::coerce::n;
use crate::error::{HistoryError, Result};
use crate::salvage::Provenance;
use crate::schema::{
    DetailedFinancials, DocumentContent, DocumentType, FinancialSection, GeneratedDocument,
    LineItem, ValueLine, YearlyData,
};
use log::warn;

fn header() -> Option<Vec<String>> {
    Some(vec!["科目".to_string(), "金額（百万円）".to_string()])
}

fn line(label: &str, value: Option<f64>, indent: u8) -> LineItem {
    LineItem::Value(ValueLine {
        label: label.to_string(),
        value,
        indent,
        is_total: false,
    })
}

fn total(label: &str, value: f64, indent: u8) -> LineItem {
    LineItem::Value(ValueLine {
        label: label.to_string(),
        value: Some(value),
        indent,
        is_total: true,
    })
}

fn caption(label: &str) -> LineItem {
    line(label, None, 0)
}

fn block(items: &mut Vec<LineItem>, entries: &[(&'static str, Option<f64>)]) {
    items.extend(entries.iter().map(|(label, value)| line(label, *value, 1)));
}

fn section(title: &str, items: Vec<LineItem>) -> FinancialSection {
    FinancialSection {
        title: Some(title.to_string()),
        header: header(),
        page_break: false,
        items,
    }
}

fn balance_sheet(f: &DetailedFinancials) -> Vec<FinancialSection> {
    let current_assets = f.current_assets.sum();
    let fixed_assets = f.fixed_assets.sum();
    let current_liabilities = f.current_liabilities.sum();
    let fixed_liabilities = f.fixed_liabilities.sum();
    let liabilities = current_liabilities + fixed_liabilities;
    let net_assets = f.net_assets.sum();

    let mut assets = vec![caption("流動資産")];
    block(&mut assets, &f.current_assets.entries());
    assets.push(total("流動資産合計", current_assets, 0));
    assets.push(caption("固定資産"));
    block(&mut assets, &f.fixed_assets.entries());
    assets.push(total("固定資産合計", fixed_assets, 0));
    assets.push(total("資産合計", current_assets + fixed_assets, 0));

    let mut debts = vec![caption("流動負債")];
    block(&mut debts, &f.current_liabilities.entries());
    debts.push(total("流動負債合計", current_liabilities, 0));
    debts.push(caption("固定負債"));
    block(&mut debts, &f.fixed_liabilities.entries());
    debts.push(total("固定負債合計", fixed_liabilities, 0));
    debts.push(total("負債合計", liabilities, 0));

    let mut equity = Vec::new();
    block(&mut equity, &f.net_assets.entries());
    equity.push(total("純資産合計", net_assets, 0));
    equity.push(total("負債純資産合計", liabilities + net_assets, 0));

    vec![
        section("資産の部", assets),
        section("負債の部", debts),
        section("純資産の部", equity),
    ]
}

fn profit_and_loss(f: &DetailedFinancials) -> Vec<FinancialSection> {
    let subtotal = |label: &str, value: Option<f64>| {
        LineItem::Value(ValueLine {
            label: label.to_string(),
            value,
            indent: 0,
            is_total: true,
        })
    };

    let items = vec![
        line("売上高", f.sales, 1),
        line("売上原価", f.cost_of_sales, 1),
        subtotal("売上総利益", f.gross_profit),
        line("販売費及び一般管理費", f.sga, 1),
        subtotal("営業利益", f.operating_profit),
        line("営業外収益", f.non_operating_income, 1),
        line("営業外費用", f.non_operating_expenses, 1),
        subtotal("経常利益", f.ordinary_profit),
        line("特別利益", f.extraordinary_income, 1),
        line("特別損失", f.extraordinary_loss, 1),
        subtotal("税引前当期純利益", f.pre_tax_profit),
        line("法人税等", f.tax, 1),
        subtotal("当期純利益", f.net_profit),
    ];

    vec![FinancialSection {
        title: None,
        header: header(),
        page_break: false,
        items,
    }]
}

fn cash_flow(f: &DetailedFinancials) -> Vec<FinancialSection> {
    let flows = [f.operating_cf, f.investing_cf, f.financing_cf];
    let net_change = flows
        .iter()
        .any(Option::is_some)
        .then(|| flows.iter().map(|v| n(*v)).sum::<f64>());

    let items = vec![
        line("営業活動によるキャッシュ・フロー", f.operating_cf, 0),
        line("投資活動によるキャッシュ・フロー", f.investing_cf, 0),
        line("財務活動によるキャッシュ・フロー", f.financing_cf, 0),
        LineItem::Value(ValueLine {
            label: "現金及び現金同等物の増減額".to_string(),
            value: net_change,
            indent: 0,
            is_total: true,
        }),
        line("現金及び現金同等物の期首残高", f.beginning_cash, 0),
        LineItem::Value(ValueLine {
            label: "現金及び現金同等物の期末残高".to_string(),
            value: f.ending_cash,
            indent: 0,
            is_total: true,
        }),
    ];

    vec![FinancialSection {
        title: None,
        header: header(),
        page_break: false,
        items,
    }]
}

/// Renders one locally computable statement for one year.
///
/// # Errors
/// - [`HistoryError::NotLocal`] for journal entries and newsletters
/// - [`HistoryError::MissingFinancials`] when the year has no detailed financials
pub fn render_statement(data: &YearlyData, doc_type: DocumentType) -> Result<GeneratedDocument> {
    let build: fn(&DetailedFinancials) -> Vec<FinancialSection> = match doc_type {
        DocumentType::BalanceSheet => balance_sheet,
        DocumentType::ProfitAndLoss => profit_and_loss,
        DocumentType::CashFlow => cash_flow,
        DocumentType::JournalEntries | DocumentType::Newsletter => {
            return Err(HistoryError::NotLocal(doc_type.code().to_string()))
        }
    };
    let f = data
        .financials
        .as_ref()
        .ok_or(HistoryError::MissingFinancials { year: data.year })?;
    let sections = build(f);

    Ok(GeneratedDocument {
        id: doc_type.document_id(data.year),
        doc_type,
        year: data.year,
        title: doc_type.title_for(data.year),
        content: DocumentContent::Sections { sections },
        provenance: Provenance::Trusted,
    })
}

/// Renders every local type in `types` for each requested year, type by type.
/// Years that are missing or lack financials are skipped with a warning.
pub fn render_local_batch(
    history: &[YearlyData],
    years: &[i32],
    types: &[DocumentType],
) -> Vec<GeneratedDocument> {
    let mut documents = Vec::new();
    for &doc_type in types.iter().filter(|t| t.is_local()) {
        for &year in years {
            let Some(data) = history.iter().find(|d| d.year == year) else {
                warn!("No history entry for {}; skipping {}", year, doc_type);
                continue;
            };
            match render_statement(data, doc_type) {
                Ok(doc) => documents.push(doc),
                Err(e) => warn!("Skipping {}: {}", doc_type.document_id(year), e),
            }
        }
    }
    documents
}
