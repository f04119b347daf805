use crate::error::{AnalysisError, Result};

/// Division that reports an absent ratio instead of producing inf/NaN.
pub fn safe_div(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        None
    } else {
        Some(numerator / denominator)
    }
}

/// Percentage of `part` relative to `whole`. Zero when the base is zero,
/// matching how a missing revenue line is treated across the engines.
pub fn pct_of(part: f64, whole: f64) -> f64 {
    safe_div(part, whole).map(|r| r * 100.0).unwrap_or(0.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn round0(value: f64) -> f64 {
    value.round()
}

pub fn clamp_score(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// Standard annuity payment for a principal `p`, periodic rate `r` (as a
/// fraction, e.g. 0.035) over `n` periods: M = P·r·(1+r)^n / ((1+r)^n − 1).
/// A zero rate degenerates to straight-line repayment.
pub fn annuity_payment(principal: f64, rate: f64, periods: u32) -> Result<f64> {
    if periods == 0 {
        return Err(AnalysisError::InvalidLoanTerms(
            "loan duration must be at least one period".to_string(),
        ));
    }
    if principal < 0.0 || rate < 0.0 {
        return Err(AnalysisError::InvalidLoanTerms(format!(
            "principal ({}) and rate ({}) must be non-negative",
            principal, rate
        )));
    }
    if principal == 0.0 {
        return Ok(0.0);
    }
    if rate == 0.0 {
        return Ok(principal / periods as f64);
    }
    let factor = (1.0 + rate).powi(periods as i32);
    Ok(principal * rate * factor / (factor - 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_div() {
        assert_eq!(safe_div(10.0, 2.0), Some(5.0));
        assert_eq!(safe_div(10.0, 0.0), None);
        assert_eq!(safe_div(f64::NAN, 2.0), None);
    }

    #[test]
    fn test_pct_of() {
        assert!((pct_of(200_000.0, 500_000.0) - 40.0).abs() < 1e-10);
        assert_eq!(pct_of(100.0, 0.0), 0.0);
    }

    #[test]
    fn test_annuity_payment() {
        // 200k at 3.5% over 15 annual payments
        let m = annuity_payment(200_000.0, 0.035, 15).unwrap();
        assert!((m - 17_367.0).abs() < 50.0, "annuity was {}", m);

        // Zero rate falls back to straight-line
        let m = annuity_payment(120_000.0, 0.0, 10).unwrap();
        assert!((m - 12_000.0).abs() < 0.01);

        assert!(annuity_payment(100.0, 0.05, 0).is_err());
        assert!(annuity_payment(-1.0, 0.05, 10).is_err());
    }
}
