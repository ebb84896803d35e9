use crate::coerce::n;
use crate::error::{HistoryError, Result};
use crate::schema::{DetailedFinancials, YearlyData};

/// Estimates income tax when the model left it out.
pub trait TaxPolicy: Send + Sync {
    fn tax_for(&self, pre_tax_profit: f64) -> f64;
}

/// A flat rate on positive pre-tax profit; losses pay nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatRateTax {
    pub rate: f64,
}

impl Default for FlatRateTax {
    fn default() -> Self {
        Self { rate: 0.30 }
    }
}

impl TaxPolicy for FlatRateTax {
    fn tax_for(&self, pre_tax_profit: f64) -> f64 {
        if pre_tax_profit > 0.0 {
            pre_tax_profit * self.rate
        } else {
            0.0
        }
    }
}

pub struct Reconciler {
    tax_policy: Box<dyn TaxPolicy>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            tax_policy: Box::new(FlatRateTax::default()),
        }
    }

    pub fn with_tax_policy(policy: impl TaxPolicy + 'static) -> Self {
        Self {
            tax_policy: Box::new(policy),
        }
    }

    /// Returns reconciled copies; years without detailed financials pass through unchanged.
    pub fn reconcile(&self, history: &[YearlyData]) -> Vec<YearlyData> {
        history
            .iter()
            .map(|year| {
                let mut year = year.clone();
                if let Some(financials) = year.financials.as_mut() {
                    self.reconcile_financials(financials);
                }
                year
            })
            .collect()
    }

    pub fn reconcile_financials(&self, f: &mut DetailedFinancials) {
        self.enforce_profit_chain(f);
        self.enforce_balance_identity(f);
        self.enforce_cash_roll_forward(f);
        clear_unusable(f);
    }

    fn enforce_profit_chain(&self, f: &mut DetailedFinancials) {
        f.gross_profit = derive(f.gross_profit, &[(f.sales, 1.0), (f.cost_of_sales, -1.0)]);
        f.operating_profit = derive(f.operating_profit, &[(f.gross_profit, 1.0), (f.sga, -1.0)]);
        f.ordinary_profit = derive(
            f.ordinary_profit,
            &[
                (f.operating_profit, 1.0),
                (f.non_operating_income, 1.0),
                (f.non_operating_expenses, -1.0),
            ],
        );
        f.pre_tax_profit = derive(
            f.pre_tax_profit,
            &[
                (f.ordinary_profit, 1.0),
                (f.extraordinary_income, 1.0),
                (f.extraordinary_loss, -1.0),
            ],
        );

        if f.tax.map_or(true, f64::is_nan) {
            f.tax = Some(match f.pre_tax_profit.filter(|p| !p.is_nan()) {
                Some(pre_tax) => self.tax_policy.tax_for(pre_tax),
                None => 0.0,
            });
        }

        if f.pre_tax_profit.is_some() {
            f.net_profit = derive(f.net_profit, &[(f.pre_tax_profit, 1.0), (f.tax, -1.0)]);
        }
    }

    /// Totals come from the sub-fields; retained earnings absorbs whatever
    /// difference remains so that assets = liabilities + net assets.
    fn enforce_balance_identity(&self, f: &mut DetailedFinancials) {
        let assets = f.current_assets.sum() + f.fixed_assets.sum();
        let liabilities = f.current_liabilities.sum() + f.fixed_liabilities.sum();
        let net_assets = assets - liabilities;

        f.total_assets = Some(assets);
        f.total_liabilities = Some(liabilities);
        f.total_net_assets = Some(net_assets);
        f.net_assets.retained_earnings =
            Some(net_assets - n(f.net_assets.capital_stock) - n(f.net_assets.other));
    }

    fn enforce_cash_roll_forward(&self, f: &mut DetailedFinancials) {
        let flows = [f.beginning_cash, f.operating_cf, f.investing_cf, f.financing_cf];
        if flows.iter().all(|v| v.map_or(false, |v| !v.is_nan())) {
            f.ending_cash = Some(flows.iter().map(|v| n(*v)).sum());
        }
    }

    pub fn verify_financials(
        &self,
        year: i32,
        f: &DetailedFinancials,
        tolerance: f64,
    ) -> Result<()> {
        let assets = f.current_assets.sum() + f.fixed_assets.sum();
        let liabilities = f.current_liabilities.sum() + f.fixed_liabilities.sum();
        let net_assets = f.net_assets.sum();

        let totals_match = [
            (f.total_assets, assets),
            (f.total_liabilities, liabilities),
            (f.total_net_assets, net_assets),
        ]
        .iter()
        .all(|(reported, computed)| reported.map_or(true, |r| (r - computed).abs() <= tolerance));

        if !totals_match || (assets - (liabilities + net_assets)).abs() > tolerance {
            return Err(HistoryError::AccountingIdentityViolation {
                year,
                assets,
                liabilities,
                net_assets,
            });
        }

        Ok(())
    }
}

/// Evaluates a signed sum of `terms`, counting absent terms as zero.
///
/// The supplied value stands when no term was given at all or when any term
/// was present but not numeric (`NaN`).
fn derive(supplied: Option<f64>, terms: &[(Option<f64>, f64)]) -> Option<f64> {
    let given = terms.iter().any(|(value, _)| value.is_some());
    let unusable = terms.iter().any(|(value, _)| value.map_or(false, f64::is_nan));
    if !given || unusable {
        return supplied;
    }
    Some(terms.iter().map(|(value, sign)| n(*value) * sign).sum())
}

/// Non-numeric statement lines only steer derivation; afterwards they are absent.
fn clear_unusable(f: &mut DetailedFinancials) {
    let lines = [
        &mut f.sales,
        &mut f.cost_of_sales,
        &mut f.gross_profit,
        &mut f.sga,
        &mut f.operating_profit,
        &mut f.non_operating_income,
        &mut f.non_operating_expenses,
        &mut f.ordinary_profit,
        &mut f.extraordinary_income,
        &mut f.extraordinary_loss,
        &mut f.pre_tax_profit,
        &mut f.tax,
        &mut f.net_profit,
        &mut f.operating_cf,
        &mut f.investing_cf,
        &mut f.financing_cf,
        &mut f.beginning_cash,
        &mut f.ending_cash,
    ];
    for line in lines {
        if line.map_or(false, f64::is_nan) {
            *line = None;
        }
    }
}

pub fn reconcile(history: &[YearlyData]) -> Vec<YearlyData> {
    Reconciler::new().reconcile(history)
}

pub fn verify_financials(year: i32, f: &DetailedFinancials, tolerance: f64) -> Result<()> {
    Reconciler::new().verify_financials(year, f, tolerance)
}
