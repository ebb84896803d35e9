use proptest::prelude::*;
use serde_json::{json, Value};
use sme_history_builder::*;

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 年月:{}]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

fn arb_amount() -> impl Strategy<Value = Option<f64>> {
    prop::option::of((-10_000_000i64..10_000_000).prop_map(|cents| cents as f64 / 100.0))
}

fn arb_month_title() -> impl Strategy<Value = String> {
    prop_oneof![
        (1u32..=12).prop_map(|m| format!("{}月", m)),
        (1u32..=12).prop_map(|m| format!("2021-{:02}", m)),
        "[a-z]{0,5}",
    ]
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(256))]

    #[test]
    fn prop_extractor_is_total(text in "\\PC{0,200}") {
        let salvaged = extract_json(&text);
        prop_assert_eq!(salvaged.is_failed(), parse_loose(&text).is_none());
        if text.trim().is_empty() {
            prop_assert!(salvaged.is_failed());
        }
    }

    #[test]
    fn prop_extractor_round_trips_valid_json(value in arb_json()) {
        let text = serde_json::to_string(&value).unwrap();
        let salvaged = extract_json(&text);
        prop_assert!(salvaged.is_trusted());
        prop_assert_eq!(salvaged.into_value(), Some(value));
    }

    #[test]
    fn prop_normalizers_are_total(value in arb_json(), raw in "\\PC{0,80}") {
        let years = [2020, 2021];
        let journal = normalize_journal(Some(&value), &years, &raw);
        if let Some(book) = journal.into_value() {
            let book = ensure_year_months(book);
            for year in &book.years {
                prop_assert_eq!(year.months.len(), 12);
            }
        }
        let _ = normalize_newsletters(Some(&value), &years, &raw);
    }
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(128))]

    #[test]
    fn prop_balance_identity_after_reconcile(
        cash in arb_amount(),
        receivable in arb_amount(),
        inventory in arb_amount(),
        tangible in arb_amount(),
        investments in arb_amount(),
        payable in arb_amount(),
        short_debt in arb_amount(),
        long_debt in arb_amount(),
        capital in arb_amount(),
        retained in arb_amount(),
        other_equity in arb_amount(),
        stated_total in arb_amount()
    ) {
        let year = YearlyData {
            year: 2020,
            financials: Some(DetailedFinancials {
                current_assets: CurrentAssets {
                    cash,
                    accounts_receivable: receivable,
                    inventory,
                    ..Default::default()
                },
                fixed_assets: FixedAssets {
                    tangible,
                    investments,
                    ..Default::default()
                },
                current_liabilities: CurrentLiabilities {
                    accounts_payable: payable,
                    short_term_debt: short_debt,
                    ..Default::default()
                },
                fixed_liabilities: FixedLiabilities {
                    long_term_debt: long_debt,
                    ..Default::default()
                },
                net_assets: NetAssets {
                    capital_stock: capital,
                    retained_earnings: retained,
                    other: other_equity,
                },
                total_assets: stated_total,
                ..Default::default()
            }),
            ..Default::default()
        };

        let reconciled = reconcile(&[year]);
        let f = reconciled[0].financials.as_ref().unwrap();
        let assets = f.total_assets.unwrap();
        let liabilities = f.total_liabilities.unwrap();
        let net_assets = f.total_net_assets.unwrap();

        prop_assert!((assets - (liabilities + net_assets)).abs() < 1e-6);
        prop_assert!((assets - (f.current_assets.sum() + f.fixed_assets.sum())).abs() < 1e-6);
        prop_assert!((net_assets - f.net_assets.sum()).abs() < 1e-6);
        prop_assert!(verify_financials(2020, f, 1e-6).is_ok());
    }

    #[test]
    fn prop_profit_chain_after_reconcile(
        sales in arb_amount(),
        cogs in arb_amount(),
        sga in arb_amount(),
        non_op_income in arb_amount(),
        non_op_expenses in arb_amount(),
        extraordinary_loss in arb_amount()
    ) {
        let year = YearlyData {
            year: 2020,
            financials: Some(DetailedFinancials {
                sales,
                cost_of_sales: cogs,
                sga,
                non_operating_income: non_op_income,
                non_operating_expenses: non_op_expenses,
                extraordinary_loss,
                ..Default::default()
            }),
            ..Default::default()
        };

        let reconciled = reconcile(&[year]);
        let f = reconciled[0].financials.as_ref().unwrap();

        let zero_if_absent = |v: Option<f64>| v.unwrap_or(0.0);
        if sales.is_some() || cogs.is_some() {
            let gross = zero_if_absent(sales) - zero_if_absent(cogs);
            prop_assert_eq!(f.gross_profit, Some(gross));
            prop_assert_eq!(f.operating_profit, Some(gross - zero_if_absent(sga)));
        } else {
            prop_assert_eq!(f.gross_profit, None);
        }
        if let (Some(pre_tax), Some(net)) = (f.pre_tax_profit, f.net_profit) {
            let tax = f.tax.unwrap();
            prop_assert!(tax >= 0.0);
            prop_assert!((net - (pre_tax - tax)).abs() < 1e-6);
        }
        prop_assert!(f.tax.is_some());
    }

    #[test]
    fn prop_ensure_year_months_is_complete(
        titles in prop::collection::vec(arb_month_title(), 0..20),
        lines_per_month in 0usize..3
    ) {
        let months: Vec<JournalMonth> = titles
            .into_iter()
            .map(|title| JournalMonth {
                title,
                items: vec![JournalLine::default(); lines_per_month],
            })
            .collect();
        let before: usize = months.iter().map(|m| m.items.len()).sum();

        let book = ensure_year_months(JournalBook {
            years: vec![JournalYear { year: 2021, months }],
        });
        let year = &book.years[0];

        let titles: Vec<&str> = year.months.iter().map(|m| m.title.as_str()).collect();
        prop_assert_eq!(
            titles,
            vec!["4月", "5月", "6月", "7月", "8月", "9月", "10月", "11月", "12月", "1月", "2月", "3月"]
        );
        prop_assert_eq!(year.line_count(), before);
    }
}
