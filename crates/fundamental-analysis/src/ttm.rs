use analysis_core::{Financials, FundamentalInputs};

/// Derive scoring inputs from quarterly statements.
pub trait FromFinancials {
    /// `quarters` are newest first. Flow metrics use the trailing four
    /// quarters; balance sheet items come from the latest quarter.
    fn from_financials(symbol: &str, quarters: &[Financials], price: Option<f64>) -> Self;
}

/// Sum a field across quarters, `None` if no quarter reports it.
fn sum_ttm(quarters: &[Financials], accessor: fn(&Financials) -> Option<f64>) -> Option<f64> {
    let values: Vec<f64> = quarters.iter().filter_map(accessor).collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum())
    }
}

/// Annualized revenue over reported quarters, needing at least three.
fn annualized_revenue(quarters: &[Financials]) -> Option<f64> {
    let reported: Vec<f64> = quarters.iter().filter_map(|f| f.revenue).collect();
    if reported.len() < 3 {
        return None;
    }
    Some(reported.iter().sum::<f64>() / reported.len() as f64 * 4.0)
}

/// TTM revenue against the prior year's TTM, percent. Normalizing by
/// reported quarter count tolerates a missing quarter on either side.
fn revenue_growth(quarters: &[Financials]) -> Option<f64> {
    if quarters.len() < 5 {
        return None;
    }
    let current = annualized_revenue(&quarters[..4])?;
    let prior = annualized_revenue(&quarters[4..quarters.len().min(8)])?;
    if prior <= 0.0 {
        return None;
    }
    Some((current - prior) / prior * 100.0)
}

impl FromFinancials for FundamentalInputs {
    fn from_financials(symbol: &str, quarters: &[Financials], price: Option<f64>) -> Self {
        let ttm = &quarters[..quarters.len().min(4)];
        let ttm_revenue = sum_ttm(ttm, |f| f.revenue);
        let ttm_net_income = sum_ttm(ttm, |f| f.net_income);
        let ttm_eps = sum_ttm(ttm, |f| f.eps);

        let latest = quarters.first();
        let equity = latest
            .and_then(|f| f.shareholders_equity)
            .filter(|e| *e > 0.0);
        let liabilities = latest.and_then(|f| f.total_liabilities);

        let profit_margin = match (ttm_net_income, ttm_revenue) {
            (Some(income), Some(revenue)) if revenue > 0.0 => Some(income / revenue * 100.0),
            _ => None,
        };
        let return_on_equity = match (ttm_net_income, equity) {
            (Some(income), Some(equity)) => Some(income / equity * 100.0),
            _ => None,
        };
        let debt_to_equity = match (liabilities, equity) {
            (Some(liabilities), Some(equity)) => Some(liabilities / equity),
            _ => None,
        };
        let price = price.filter(|p| p.is_finite() && *p > 0.0);
        let pe_ratio = match (price, ttm_eps) {
            (Some(price), Some(eps)) if eps > 0.0 => Some(price / eps),
            _ => None,
        };

        FundamentalInputs {
            symbol: symbol.to_string(),
            profit_margin,
            revenue_growth: revenue_growth(quarters),
            debt_to_equity,
            return_on_equity,
            eps: ttm_eps,
            price,
            pe_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quarter(revenue: Option<f64>, net_income: f64, eps: f64) -> Financials {
        Financials {
            symbol: "EXMP".to_string(),
            fiscal_period: "Q".to_string(),
            fiscal_year: 2024,
            revenue,
            net_income: Some(net_income),
            eps: Some(eps),
            total_liabilities: Some(600.0),
            shareholders_equity: Some(400.0),
        }
    }

    #[test]
    fn test_ttm_metrics() {
        let quarters: Vec<Financials> = (0..8)
            .map(|i| {
                // Newest first: this year 110/quarter, last year 100/quarter
                let revenue = if i < 4 { 110.0 } else { 100.0 };
                quarter(Some(revenue), 11.0, 0.5)
            })
            .collect();

        let inputs = FundamentalInputs::from_financials("EXMP", &quarters, Some(30.0));

        assert!((inputs.profit_margin.unwrap() - 10.0).abs() < 1e-9);
        assert!((inputs.revenue_growth.unwrap() - 10.0).abs() < 1e-9);
        assert!((inputs.return_on_equity.unwrap() - 11.0).abs() < 1e-9);
        assert_eq!(inputs.debt_to_equity, Some(1.5));
        assert_eq!(inputs.eps, Some(2.0));
        assert_eq!(inputs.pe_ratio, Some(15.0));
    }

    #[test]
    fn test_growth_tolerates_one_missing_quarter() {
        let mut quarters: Vec<Financials> = (0..8)
            .map(|i| quarter(Some(if i < 4 { 120.0 } else { 100.0 }), 5.0, 0.1))
            .collect();
        quarters[5].revenue = None;

        let inputs = FundamentalInputs::from_financials("EXMP", &quarters, None);
        assert!((inputs.revenue_growth.unwrap() - 20.0).abs() < 1e-9);
        assert_eq!(inputs.pe_ratio, None);
    }

    #[test]
    fn test_short_history_leaves_growth_unknown() {
        let quarters = vec![quarter(Some(100.0), 5.0, 0.1); 4];
        let inputs = FundamentalInputs::from_financials("EXMP", &quarters, Some(10.0));
        assert_eq!(inputs.revenue_growth, None);
        assert!(inputs.profit_margin.is_some());
    }

    #[test]
    fn test_no_statements_gives_empty_inputs() {
        let inputs = FundamentalInputs::from_financials("EXMP", &[], Some(10.0));
        assert_eq!(
            inputs,
            FundamentalInputs {
                symbol: "EXMP".to_string(),
                price: Some(10.0),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_negative_equity_skips_ratios() {
        let mut q = quarter(Some(100.0), 5.0, 0.1);
        q.shareholders_equity = Some(-50.0);
        let inputs = FundamentalInputs::from_financials("EXMP", &[q], None);
        assert_eq!(inputs.debt_to_equity, None);
        assert_eq!(inputs.return_on_equity, None);
    }
}
