// Prompts for history synthesis and document generation

use crate::schema::{CompanyInput, DocumentType, YearlyData};

const MAX_EVENT_CHARS: usize = 80;

pub const SYSTEM_PROMPT_HISTORY: &str = r#"
あなたは日本の中小企業の経営史と財務諸表を作成する専門家です。

## 目的
架空企業の創業から現在までの年次履歴を作成してください。

## ルール
- 金額はすべて百万円単位の数値で出力する
- 年度は4月始まり3月終わりの会計年度とする
- 売上高 - 売上原価 = 売上総利益、売上総利益 - 販売費及び一般管理費 = 営業利益 を満たす
- 資産合計 = 負債合計 + 純資産合計 を満たす
- 期首現金 + 営業CF + 投資CF + 財務CF = 期末現金 を満たす
- 従業員数は初期人数から現在人数へ自然に推移させる
- 業界の景気動向と会社の出来事を年ごとに簡潔に記述する

## 出力形式
JSONのみを出力する。説明文やMarkdownは付けない。
{"years": [{"year": 2000, "revenue": 120, "operatingProfit": 8, "cashFlow": 5,
  "employees": 10, "marketContext": "...", "companyEvent": "...",
  "financials": {...}}]}
"#;

pub const SYSTEM_PROMPT_JOURNAL: &str = r#"
あなたは日本の中小企業の経理担当者です。指定された各年度の代表的な仕訳帳を作成してください。

## ルール
- 各年度について4月から翌年3月までの12か月分を作成する
- 各月に3〜6件の仕訳を記載する
- 借方と貸方は必ず同額で対応させる
- 日付は YYYY-MM-DD 形式、金額は円単位の整数
- 勘定科目は日本の一般的な科目名を使う（売掛金、売上高、仕入高、給料手当、普通預金 など）
- 年間の売上計上額は各年度の売上高と整合させる

## 出力形式
JSONのみを出力する。
{"years": [{"year": 2020, "months": [{"title": "4月", "items": [
  {"date": "2020-04-30", "account": "売掛金", "debit": 1000000, "credit": null, "label": "4月分売上"}]}]}]}
"#;

pub const SYSTEM_PROMPT_NEWSLETTER: &str = r##"
あなたは日本の中小企業の広報担当者です。指定された各年度の社内報を作成してください。

## ルール
- 各年度1本、Markdown形式で600〜1000字程度
- 社長メッセージ、業績のふり返り、トピックス、社員紹介の見出しを含める
- その年度の出来事と業績に触れ、数字は提示された値と矛盾させない
- 社長名は各年度に指定された人物を使う

## 出力形式
JSONのみを出力する。
{"newsletters": [{"year": 2020, "content": "# 社内報 2020年度\n..."}]}
"##;

fn company_profile(company: &CompanyInput) -> String {
    let mut out = String::new();
    out.push_str(&format!("会社名: {}\n", company.name));
    out.push_str(&format!("業種: {}\n", company.industry));
    out.push_str(&format!(
        "創業: {}年度 / 従業員: {}名 → {}名\n",
        company.founding_year, company.initial_employees, company.current_employees
    ));
    if !company.persona.trim().is_empty() {
        out.push_str(&format!("会社の特徴: {}\n", company.persona.trim()));
    }
    out
}

fn ceo_timeline(company: &CompanyInput) -> String {
    let mut out = String::from("歴代社長:\n");
    for ceo in &company.ceos {
        let line = match ceo.resignation_year {
            Some(year) => format!("- {} ({}年度まで)\n", ceo.name, year),
            None => format!("- {} (現職)\n", ceo.name),
        };
        out.push_str(&line);
    }
    out
}

fn truncate_chars(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max {
        trimmed.to_string()
    } else {
        let mut cut: String = trimmed.chars().take(max).collect();
        cut.push('…');
        cut
    }
}

/// One line of figures per year; keeps chunk prompts small.
pub fn year_context(company: &CompanyInput, data: &YearlyData) -> String {
    let ceo = company
        .ceo_for_year(data.year)
        .map(|c| c.name.as_str())
        .unwrap_or("不明");
    let mut line = format!(
        "- {}年度: 売上高 {:.0}百万円, 営業利益 {:.0}百万円, 従業員 {}名, 社長 {}",
        data.year, data.revenue, data.operating_profit, data.employees, ceo
    );
    if !data.company_event.trim().is_empty() {
        line.push_str(&format!(
            ", 出来事: {}",
            truncate_chars(&data.company_event, MAX_EVENT_CHARS)
        ));
    }
    line
}

pub fn history_prompt(company: &CompanyInput) -> String {
    let mut prompt = SYSTEM_PROMPT_HISTORY.trim_start().to_string();
    prompt.push_str("\n## 会社情報\n");
    prompt.push_str(&company_profile(company));
    prompt.push_str(&ceo_timeline(company));
    if !company.key_events.trim().is_empty() {
        prompt.push_str(&format!("主な出来事: {}\n", company.key_events.trim()));
    }
    prompt.push_str(&format!(
        "\n{}年度から{}年度まで、すべての年度を1件ずつ出力してください。\n",
        company.founding_year, company.simulation_end_year
    ));
    prompt
}

/// Prompt for a chunk of years of one heavy document type.
pub fn chunk_prompt(company: &CompanyInput, doc_type: DocumentType, years: &[&YearlyData]) -> String {
    let system = match doc_type {
        DocumentType::Newsletter => SYSTEM_PROMPT_NEWSLETTER,
        _ => SYSTEM_PROMPT_JOURNAL,
    };
    let mut prompt = system.trim_start().to_string();
    prompt.push_str("\n## 会社情報\n");
    prompt.push_str(&company_profile(company));
    prompt.push_str("\n## 対象年度\n");
    for data in years {
        prompt.push_str(&year_context(company, data));
        prompt.push('\n');
    }
    let listed: Vec<String> = years.iter().map(|d| d.year.to_string()).collect();
    prompt.push_str(&format!(
        "\n上記 {} の各年度を必ず含め、年度ごとに \"year\" を明記してください。\n",
        listed.join(", ")
    ));
    prompt
}

/// Prompt for a single year; used when a chunked request failed outright.
pub fn single_year_prompt(company: &CompanyInput, doc_type: DocumentType, data: &YearlyData) -> String {
    let mut prompt = chunk_prompt(company, doc_type, &[data]);
    if !data.market_context.trim().is_empty() {
        prompt.push_str(&format!(
            "市場環境: {}\n",
            truncate_chars(&data.market_context, MAX_EVENT_CHARS * 2)
        ));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CeoTenure;

    fn company() -> CompanyInput {
        CompanyInput {
            name: "青葉食品".to_string(),
            industry: "食品製造".to_string(),
            founding_year: 2018,
            simulation_end_year: 2022,
            initial_employees: 4,
            current_employees: 30,
            persona: "地元野菜の総菜".to_string(),
            key_events: "2020年に工場新設".to_string(),
            ceos: vec![
                CeoTenure {
                    name: "青葉一郎".to_string(),
                    resignation_year: Some(2020),
                },
                CeoTenure {
                    name: "青葉二郎".to_string(),
                    resignation_year: None,
                },
            ],
        }
    }

    #[test]
    fn test_year_context_is_compact() {
        let data = YearlyData {
            year: 2021,
            revenue: 350.4,
            operating_profit: 21.0,
            employees: 18,
            company_event: "あ".repeat(200),
            ..Default::default()
        };
        let line = year_context(&company(), &data);
        assert!(line.starts_with("- 2021年度: 売上高 350百万円"));
        assert!(line.contains("社長 青葉二郎"));
        assert!(line.chars().count() < 160);
        assert!(line.ends_with('…'));
    }

    #[test]
    fn test_chunk_prompt_lists_every_year() {
        let a = YearlyData {
            year: 2019,
            ..Default::default()
        };
        let b = YearlyData {
            year: 2020,
            ..Default::default()
        };
        let prompt = chunk_prompt(&company(), DocumentType::JournalEntries, &[&a, &b]);
        assert!(prompt.contains("仕訳帳"));
        assert!(prompt.contains("- 2019年度"));
        assert!(prompt.contains("- 2020年度"));
        assert!(prompt.contains("2019, 2020"));

        let newsletter = chunk_prompt(&company(), DocumentType::Newsletter, &[&a]);
        assert!(newsletter.contains("社内報"));
    }

    #[test]
    fn test_newsletter_prompt_keeps_full_output_example() {
        let example = r##"{"newsletters": [{"year": 2020, "content": "# 社内報 2020年度\n..."}]}"##;
        assert!(SYSTEM_PROMPT_NEWSLETTER.trim_end().ends_with(example));
        assert!(SYSTEM_PROMPT_NEWSLETTER.contains("## ルール"));
    }

    #[test]
    fn test_single_year_prompt_adds_market_context() {
        let data = YearlyData {
            year: 2021,
            market_context: "原材料高".to_string(),
            ..Default::default()
        };
        let prompt = single_year_prompt(&company(), DocumentType::Newsletter, &data);
        assert!(prompt.contains("会社名: 青葉食品\n業種: 食品製造\n"));
        assert!(prompt.contains("創業: 2018年度 / 従業員: 4名 → 30名\n"));
        assert!(prompt.ends_with("市場環境: 原材料高\n"));
    }

    #[test]
    fn test_history_prompt_includes_timeline() {
        let prompt = history_prompt(&company());
        assert!(prompt.contains("青葉一郎 (2020年度まで)"));
        assert!(prompt.contains("青葉二郎 (現職)"));
        assert!(prompt.contains("2018年度から2022年度まで"));
    }
}
