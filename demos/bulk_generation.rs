use dotenv::dotenv;
use sme_history_builder::{
    CeoTenure, CompanyInput, DocumentType, GeminiClient, GenerationConfig, HistoryPipeline,
    YearlyEdit,
};
use std::error::Error;
use std::fs::File;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();
    println!("🚀 Starting SME history generation example...");

    let company = CompanyInput {
        name: "株式会社さくら精工".to_string(),
        industry: "自動車部品の精密加工".to_string(),
        founding_year: 2012,
        simulation_end_year: 2024,
        initial_employees: 6,
        current_employees: 58,
        persona: "愛知県の町工場から始まり、品質の高さで大手の二次下請けに成長した".to_string(),
        key_events: "2016年に第二工場、2020年はコロナ禍で減収、2023年にEV部品へ参入".to_string(),
        ceos: vec![
            CeoTenure {
                name: "桜井健一".to_string(),
                resignation_year: Some(2019),
            },
            CeoTenure {
                name: "桜井美咲".to_string(),
                resignation_year: None,
            },
        ],
    };

    let config = GenerationConfig::from_env()?;
    let client = Arc::new(GeminiClient::from_env()?);
    let pipeline = HistoryPipeline::new(client, config);

    let mut history = pipeline.generate_history(&company).await?;
    println!("📈 Generated {} fiscal years", history.len());
    for year in &history {
        println!(
            "  {}: revenue {:.0}, operating profit {:.0}, employees {}",
            year.year, year.revenue, year.operating_profit, year.employees
        );
    }

    // A user correction before documents are produced.
    if let Some(covid_year) = history.iter_mut().find(|y| y.year == 2020) {
        covid_year.apply_edit(YearlyEdit::OperatingProfit(-12.0));
    }

    let years: Vec<i32> = history.iter().rev().take(3).map(|y| y.year).rev().collect();
    let documents = pipeline
        .generate_documents(&company, &history, &years, &DocumentType::ALL, |done, label| {
            println!("  [{:>2}] {}", done, label);
        })
        .await;

    let placeholders = documents.iter().filter(|d| d.is_placeholder()).count();
    println!(
        "📄 {} documents ({} placeholders)",
        documents.len(),
        placeholders
    );

    let file = File::create("generated_documents.json")?;
    serde_json::to_writer_pretty(file, &documents)?;
    println!("✓ Documents written to generated_documents.json");

    Ok(())
}
