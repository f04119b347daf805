use crate::accounting::RatioSet;
use crate::utils::round2;
use log::debug;
use serde::{Deserialize, Serialize};

/// Sector coefficients and benchmark averages for one family of NAF/APE
/// codes. Multiples and percentages come from the usual barèmes used for
/// fonds de commerce transactions; averages are mid-range figures for the
/// sector.
#[derive(Debug, Clone)]
pub struct SectorProfile {
    pub code_prefix: &'static str,
    pub label: &'static str,
    /// EBE valuation multiple [low, median, high].
    pub coef_ebe: [f64; 3],
    /// Revenue-percentage valuation [low, median, high], as fractions of CA.
    pub coef_ca: [f64; 3],
    pub marge_commerciale_moyenne_pct: f64,
    pub taux_ebe_moyen_pct: f64,
    pub rotation_stocks_moyenne_jours: f64,
    pub taux_endettement_moyen_pct: f64,
    /// Regulated retail (tabac/presse/loto) qualifies for the hybrid
    /// commission-based valuation instead of the classical methods.
    pub regulated_retail: bool,
}

pub const GENERIC_SECTOR: SectorProfile = SectorProfile {
    code_prefix: "",
    label: "Commerce de proximité (générique)",
    coef_ebe: [2.5, 3.5, 4.5],
    coef_ca: [0.30, 0.50, 0.70],
    marge_commerciale_moyenne_pct: 45.0,
    taux_ebe_moyen_pct: 12.0,
    rotation_stocks_moyenne_jours: 35.0,
    taux_endettement_moyen_pct: 80.0,
    regulated_retail: false,
};

static SECTORS: &[SectorProfile] = &[
    SectorProfile {
        code_prefix: "1071",
        label: "Boulangerie-pâtisserie",
        coef_ebe: [2.8, 3.5, 4.2],
        coef_ca: [0.60, 0.75, 0.90],
        marge_commerciale_moyenne_pct: 71.0,
        taux_ebe_moyen_pct: 18.0,
        rotation_stocks_moyenne_jours: 8.0,
        taux_endettement_moyen_pct: 90.0,
        regulated_retail: false,
    },
    SectorProfile {
        code_prefix: "5610",
        label: "Restauration traditionnelle",
        coef_ebe: [2.5, 3.2, 4.0],
        coef_ca: [0.55, 0.70, 0.90],
        marge_commerciale_moyenne_pct: 68.0,
        taux_ebe_moyen_pct: 15.0,
        rotation_stocks_moyenne_jours: 10.0,
        taux_endettement_moyen_pct: 85.0,
        regulated_retail: false,
    },
    SectorProfile {
        code_prefix: "5630",
        label: "Débit de boissons",
        coef_ebe: [2.5, 3.3, 4.2],
        coef_ca: [0.45, 0.70, 1.00],
        marge_commerciale_moyenne_pct: 70.0,
        taux_ebe_moyen_pct: 16.0,
        rotation_stocks_moyenne_jours: 15.0,
        taux_endettement_moyen_pct: 85.0,
        regulated_retail: false,
    },
    SectorProfile {
        code_prefix: "4711",
        label: "Alimentation générale / supérette",
        coef_ebe: [2.2, 3.0, 3.8],
        coef_ca: [0.15, 0.25, 0.40],
        marge_commerciale_moyenne_pct: 25.0,
        taux_ebe_moyen_pct: 6.0,
        rotation_stocks_moyenne_jours: 25.0,
        taux_endettement_moyen_pct: 75.0,
        regulated_retail: false,
    },
    SectorProfile {
        code_prefix: "4726",
        label: "Tabac-presse",
        coef_ebe: [2.8, 3.6, 4.5],
        coef_ca: [0.40, 0.65, 0.95],
        marge_commerciale_moyenne_pct: 30.0,
        taux_ebe_moyen_pct: 20.0,
        rotation_stocks_moyenne_jours: 30.0,
        taux_endettement_moyen_pct: 70.0,
        regulated_retail: true,
    },
    SectorProfile {
        code_prefix: "4773",
        label: "Pharmacie",
        coef_ebe: [5.0, 6.5, 8.0],
        coef_ca: [0.70, 0.85, 1.00],
        marge_commerciale_moyenne_pct: 31.0,
        taux_ebe_moyen_pct: 12.0,
        rotation_stocks_moyenne_jours: 45.0,
        taux_endettement_moyen_pct: 110.0,
        regulated_retail: false,
    },
    SectorProfile {
        code_prefix: "9602",
        label: "Coiffure et soins de beauté",
        coef_ebe: [2.2, 3.0, 3.8],
        coef_ca: [0.45, 0.60, 0.80],
        marge_commerciale_moyenne_pct: 88.0,
        taux_ebe_moyen_pct: 14.0,
        rotation_stocks_moyenne_jours: 40.0,
        taux_endettement_moyen_pct: 60.0,
        regulated_retail: false,
    },
    SectorProfile {
        code_prefix: "4520",
        label: "Entretien et réparation automobile",
        coef_ebe: [2.0, 2.8, 3.5],
        coef_ca: [0.25, 0.40, 0.55],
        marge_commerciale_moyenne_pct: 40.0,
        taux_ebe_moyen_pct: 11.0,
        rotation_stocks_moyenne_jours: 50.0,
        taux_endettement_moyen_pct: 80.0,
        regulated_retail: false,
    },
];

/// Looks up the sector row for an activity code by longest prefix match.
/// Returns the generic fallback (and `true`) when the code is unknown or
/// absent — never an error, per the fallback policy.
pub fn lookup_sector(activity_code: Option<&str>) -> (&'static SectorProfile, bool) {
    if let Some(code) = activity_code {
        let digits: String = code.chars().filter(|c| c.is_ascii_digit()).collect();
        for profile in SECTORS {
            if digits.starts_with(profile.code_prefix) {
                return (profile, false);
            }
        }
        debug!("Unknown activity code '{}', using generic sector row", code);
    }
    (&GENERIC_SECTOR, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkPosition {
    Superieur,
    Inferieur,
    Similaire,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatioComparison {
    pub ratio: String,
    pub value: f64,
    pub sector_average: f64,
    pub deviation_pct: f64,
    pub position: BenchmarkPosition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorBenchmark {
    pub sector_code: Option<String>,
    pub sector_label: String,
    /// True when the activity code was unknown and the generic row was used.
    pub generic_fallback: bool,
    pub comparisons: Vec<RatioComparison>,
    pub limitations: Vec<String>,
}

fn classify(value: f64, average: f64) -> (f64, BenchmarkPosition) {
    if average == 0.0 {
        return (0.0, BenchmarkPosition::Similaire);
    }
    let deviation = (value - average) / average * 100.0;
    let position = if deviation > 10.0 {
        BenchmarkPosition::Superieur
    } else if deviation < -10.0 {
        BenchmarkPosition::Inferieur
    } else {
        BenchmarkPosition::Similaire
    };
    (round2(deviation), position)
}

/// Compares the latest-year ratios against the sector averages. Ratios that
/// could not be computed upstream are simply absent from the comparison list.
pub fn benchmark_ratios(
    activity_code: Option<&str>,
    ratios: &RatioSet,
) -> SectorBenchmark {
    let (profile, generic_fallback) = lookup_sector(activity_code);

    let mut comparisons = Vec::new();
    let mut push = |name: &str, value: Option<f64>, average: f64| {
        if let Some(v) = value {
            let (deviation_pct, position) = classify(v, average);
            comparisons.push(RatioComparison {
                ratio: name.to_string(),
                value: round2(v),
                sector_average: average,
                deviation_pct,
                position,
            });
        }
    };

    push(
        "marge_commerciale_pct",
        ratios.marge_commerciale_pct,
        profile.marge_commerciale_moyenne_pct,
    );
    push("taux_ebe_pct", ratios.taux_ebe_pct, profile.taux_ebe_moyen_pct);
    push(
        "rotation_stocks_jours",
        ratios.rotation_stocks_jours,
        profile.rotation_stocks_moyenne_jours,
    );
    push(
        "taux_endettement_pct",
        ratios.taux_endettement_pct,
        profile.taux_endettement_moyen_pct,
    );

    let mut limitations = Vec::new();
    if generic_fallback {
        limitations.push(
            "Code d'activité inconnu: comparaison établie sur les moyennes génériques du commerce de proximité".to_string(),
        );
    }

    SectorBenchmark {
        sector_code: activity_code.map(|c| c.to_string()),
        sector_label: profile.label.to_string(),
        generic_fallback,
        comparisons,
        limitations,
    }
}
