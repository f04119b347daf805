use crate::accounting::{RatioSet, TrendClass, TrendEvaluation};
use crate::utils::{clamp_score, round0};
use serde::{Deserialize, Serialize};

// Dimension weights, fixed and summing to 1.0.
const POIDS_RENTABILITE: f64 = 0.35;
const POIDS_SOLVABILITE: f64 = 0.25;
const POIDS_LIQUIDITE: f64 = 0.20;
const POIDS_ACTIVITE: f64 = 0.20;

/// Composite financial health, 0-100 overall with a four-dimension
/// breakdown. An empty analysis scores zero everywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthScore {
    pub overall: f64,
    pub rentabilite: f64,
    pub liquidite: f64,
    pub solvabilite: f64,
    pub activite: f64,
}

impl HealthScore {
    pub fn empty() -> Self {
        Self {
            overall: 0.0,
            rentabilite: 0.0,
            liquidite: 0.0,
            solvabilite: 0.0,
            activite: 0.0,
        }
    }
}

fn bucket(value: f64, thresholds: &[(f64, f64)], floor: f64) -> f64 {
    for &(limit, score) in thresholds {
        if value >= limit {
            return score;
        }
    }
    floor
}

fn score_rentabilite(ratios: &RatioSet) -> f64 {
    let ebe = ratios.taux_ebe_pct.unwrap_or(0.0);
    let rn = ratios.taux_resultat_net_pct.unwrap_or(0.0);

    let ebe_score = bucket(ebe, &[(20.0, 100.0), (15.0, 85.0), (10.0, 65.0), (5.0, 40.0), (0.0, 20.0)], 0.0);
    let rn_score = bucket(rn, &[(10.0, 100.0), (6.0, 80.0), (3.0, 60.0), (0.0, 35.0)], 0.0);

    (ebe_score * 0.6 + rn_score * 0.4).round()
}

fn score_liquidite(ratios: &RatioSet) -> f64 {
    // Lower working-capital pressure and shorter client delays score higher.
    let bfr = ratios.bfr_jours_ca;
    let clients = ratios.delai_clients_jours;

    let bfr_score: f64 = match bfr {
        Some(j) if j <= 0.0 => 100.0,
        Some(j) if j <= 30.0 => 80.0,
        Some(j) if j <= 60.0 => 60.0,
        Some(j) if j <= 90.0 => 40.0,
        Some(_) => 20.0,
        None => 50.0,
    };
    let clients_score: f64 = match clients {
        Some(j) if j <= 15.0 => 100.0,
        Some(j) if j <= 45.0 => 75.0,
        Some(j) if j <= 90.0 => 50.0,
        Some(j) if j <= 180.0 => 30.0,
        Some(_) => 10.0,
        None => 50.0,
    };

    (bfr_score * 0.5 + clients_score * 0.5).round()
}

fn score_solvabilite(ratios: &RatioSet) -> f64 {
    let endettement_score: f64 = match ratios.taux_endettement_pct {
        Some(t) if t <= 50.0 => 100.0,
        Some(t) if t <= 100.0 => 80.0,
        Some(t) if t <= 150.0 => 60.0,
        Some(t) if t <= 300.0 => 30.0,
        Some(_) => 5.0,
        None => 50.0,
    };
    let caf_score: f64 = match ratios.capacite_autofinancement {
        Some(caf) if caf > 0.0 => 100.0,
        Some(_) => 0.0,
        None => 50.0,
    };

    (endettement_score * 0.7 + caf_score * 0.3).round()
}

fn score_activite(trend: Option<&TrendEvaluation>) -> f64 {
    let Some(trend) = trend else { return 50.0 };

    let base = match trend.classification {
        TrendClass::Croissance => 85.0,
        TrendClass::Stable => 60.0,
        TrendClass::Declin => 25.0,
    };
    // EBE moving with revenue confirms the trend; diverging EBE tempers it.
    let adjustment = match trend.ebe_evolution_pct {
        Some(e) if e > 5.0 => 15.0,
        Some(e) if e < -5.0 => -15.0,
        _ => 0.0,
    };

    clamp_score(base + adjustment)
}

/// Scores financial health from the latest ratios and the multi-year trend.
/// Weights: rentabilité 0.35, solvabilité 0.25, liquidité 0.20, activité 0.20.
pub fn score_health(ratios: &RatioSet, trend: Option<&TrendEvaluation>) -> HealthScore {
    let rentabilite = score_rentabilite(ratios);
    let liquidite = score_liquidite(ratios);
    let solvabilite = score_solvabilite(ratios);
    let activite = score_activite(trend);

    let overall = clamp_score(round0(
        rentabilite * POIDS_RENTABILITE
            + solvabilite * POIDS_SOLVABILITE
            + liquidite * POIDS_LIQUIDITE
            + activite * POIDS_ACTIVITE,
    ));

    HealthScore {
        overall,
        rentabilite,
        liquidite,
        solvabilite,
        activite,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy_ratios() -> RatioSet {
        RatioSet {
            year: 2023,
            marge_commerciale_pct: Some(40.0),
            taux_ebe_pct: Some(17.0),
            taux_resultat_net_pct: Some(8.0),
            rotation_stocks_jours: Some(14.6),
            delai_clients_jours: Some(10.0),
            delai_fournisseurs_jours: Some(30.0),
            bfr_jours_ca: Some(-5.0),
            taux_endettement_pct: Some(80.0),
            capacite_autofinancement: Some(55_000.0),
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let sum = POIDS_RENTABILITE + POIDS_SOLVABILITE + POIDS_LIQUIDITE + POIDS_ACTIVITE;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_healthy_business_scores_high() {
        let score = score_health(&healthy_ratios(), None);
        assert!(score.overall >= 70.0, "overall was {}", score.overall);
        assert!(score.rentabilite >= 80.0);
        assert_eq!(score.activite, 50.0);
    }

    #[test]
    fn test_liquidity_and_solvency_blends() {
        let ratios = healthy_ratios();
        // bfr -5 j (100) and clients 10 j (100), weighted 0.5/0.5
        assert_eq!(score_liquidite(&ratios), 100.0);
        // endettement 80% (80) and positive CAF (100), weighted 0.7/0.3
        assert_eq!(score_solvabilite(&ratios), 86.0);
    }

    #[test]
    fn test_distressed_business_scores_low() {
        let ratios = RatioSet {
            year: 2023,
            taux_ebe_pct: Some(-2.0),
            taux_resultat_net_pct: Some(-6.0),
            delai_clients_jours: Some(200.0),
            bfr_jours_ca: Some(120.0),
            taux_endettement_pct: Some(350.0),
            capacite_autofinancement: Some(-12_000.0),
            ..Default::default()
        };
        let score = score_health(&ratios, None);
        assert!(score.overall < 30.0, "overall was {}", score.overall);
        assert_eq!(score.rentabilite, 0.0);
    }

    #[test]
    fn test_score_within_bounds() {
        let score = score_health(&RatioSet::default(), None);
        assert!(score.overall >= 0.0 && score.overall <= 100.0);
        let score = score_health(&healthy_ratios(), None);
        assert!(score.overall >= 0.0 && score.overall <= 100.0);
    }

    #[test]
    fn test_trend_moves_activity_score() {
        let growth = TrendEvaluation {
            first_year: 2021,
            last_year: 2023,
            ca_evolution_pct: Some(12.0),
            ebe_evolution_pct: Some(9.0),
            resultat_net_evolution_pct: Some(8.0),
            classification: TrendClass::Croissance,
        };
        let decline = TrendEvaluation {
            classification: TrendClass::Declin,
            ca_evolution_pct: Some(-12.0),
            ebe_evolution_pct: Some(-9.0),
            ..growth.clone()
        };
        let up = score_health(&healthy_ratios(), Some(&growth));
        let down = score_health(&healthy_ratios(), Some(&decline));
        assert!(up.activite > down.activite);
        assert!(up.overall > down.overall);
    }
}
