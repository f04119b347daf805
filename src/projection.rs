use crate::accounting::AccountingOutput;
use crate::error::Result;
use crate::realestate::RealEstateOutput;
use crate::schema::{FiscalYearRecord, ProjectionHypotheses, UserOverrides};
use crate::utils::{annuity_payment, round0, round2, safe_div};
use crate::valuation::ValuationOutput;
use log::info;
use serde::{Deserialize, Serialize};

const DEFAULT_GROWTH_PCT: f64 = 1.0;
const DEFAULT_LOAN_RATE_PCT: f64 = 4.0;
const DEFAULT_LOAN_YEARS: u32 = 7;
/// Reduced corporate tax rate applied to the projected surplus.
const TAUX_IS: f64 = 0.15;

/// One projected year. Year 0 is the reference (last known) year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessPlanYear {
    pub annee: u32,
    pub chiffre_affaires: f64,
    pub charges: f64,
    pub ebe: f64,
    pub annuite: f64,
    pub impots: f64,
    pub tresorerie_residuelle: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessPlanProjection {
    pub years: Vec<BusinessPlanYear>,
    pub hypotheses: ProjectionHypotheses,
}

/// Lender-style viability indicators, taken on the first full year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankIndicators {
    /// DSCR: EBE over annual debt service.
    pub ratio_couverture: Option<f64>,
    pub capacite_autofinancement: f64,
    pub point_mort: Option<f64>,
    pub roi_pct: Option<f64>,
    pub payback_mois: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionOutput {
    pub plan: BusinessPlanProjection,
    pub indicators: BankIndicators,
    pub degraded: bool,
}

struct BaseYear {
    ca: f64,
    charges_variables_ratio: f64,
    charges_fixes: f64,
}

fn base_year(accounting: &AccountingOutput, record: Option<&FiscalYearRecord>) -> Option<BaseYear> {
    let sig = accounting.sig_records.last()?;
    let ca = sig.chiffre_affaires;
    if ca <= 0.0 {
        return None;
    }
    let record = record?;
    let achats = record.achats_marchandises.unwrap_or(0.0);
    let charges_fixes = record.charges_externes.unwrap_or(0.0)
        + record.charges_personnel.unwrap_or(0.0)
        + record.charges_exploitant.unwrap_or(0.0);
    Some(BaseYear {
        ca,
        charges_variables_ratio: (achats / ca).clamp(0.0, 1.0),
        charges_fixes,
    })
}

fn growth_factor(hypotheses: &ProjectionHypotheses, year: u32) -> f64 {
    if year == 0 {
        return 1.0;
    }
    let base = 1.0 + hypotheses.croissance_annuelle_pct.unwrap_or(DEFAULT_GROWTH_PCT) / 100.0;
    let mut factor = base.powi(year as i32);

    // Extended hours apply from year 1, renovation uplift from year 2 and
    // stays acquired afterwards.
    if let Some(h) = hypotheses.impact_horaires_pct {
        factor *= 1.0 + h / 100.0;
    }
    if year >= 2 {
        if let Some(t) = hypotheses.impact_travaux_pct {
            factor *= 1.0 + t / 100.0;
        }
    }
    factor
}

/// Projection stage entry point. Returns `Err` only on contractual problems
/// (impossible loan terms); missing accounting data degrades the output.
pub fn run_projection(
    accounting: &AccountingOutput,
    latest_record: Option<&FiscalYearRecord>,
    valuation: Option<&ValuationOutput>,
    real_estate: Option<&RealEstateOutput>,
    overrides: &UserOverrides,
) -> Result<ProjectionOutput> {
    let hypotheses = &overrides.hypotheses;
    let Some(base) = base_year(accounting, latest_record) else {
        return Ok(ProjectionOutput {
            plan: BusinessPlanProjection {
                years: Vec::new(),
                hypotheses: hypotheses.clone(),
            },
            indicators: BankIndicators {
                ratio_couverture: None,
                capacite_autofinancement: 0.0,
                point_mort: None,
                roi_pct: None,
                payback_mois: None,
            },
            degraded: true,
        });
    };

    // Investment defaults to the valuation median plus mandatory works.
    let investissement = hypotheses.investissement_total.or_else(|| {
        let fonds = valuation
            .and_then(|v| v.synthesis.as_ref())
            .map(|s| s.valeur_mediane)?;
        let travaux = real_estate
            .and_then(|re| re.renovation.as_ref())
            .map(|r| (r.total_bas + r.total_haut) / 2.0)
            .unwrap_or(0.0);
        Some(fonds + travaux)
    });

    let emprunt = hypotheses
        .emprunt_montant
        .or(investissement)
        .unwrap_or(0.0);
    let taux = hypotheses.emprunt_taux_pct.unwrap_or(DEFAULT_LOAN_RATE_PCT) / 100.0;
    let duree = hypotheses.emprunt_duree_annees.unwrap_or(DEFAULT_LOAN_YEARS);
    let annuite = annuity_payment(emprunt, taux, duree)?;

    let masse_delta = hypotheses.variation_masse_salariale.unwrap_or(0.0);

    // Rent renegotiation lowers fixed charges from year 1 onward.
    let economie_loyer = match (
        latest_record.and_then(|r| r.loyer_annuel),
        overrides.loyer_negocie,
    ) {
        (Some(actuel), Some(negocie)) => actuel - negocie,
        _ => 0.0,
    };

    let mut years = Vec::with_capacity(6);
    for annee in 0..=5u32 {
        let ca = base.ca * growth_factor(hypotheses, annee);
        let charges_variables = ca * base.charges_variables_ratio;
        let charges_fixes = base.charges_fixes
            + if annee >= 1 {
                masse_delta - economie_loyer
            } else {
                0.0
            };
        let charges = charges_variables + charges_fixes;
        let ebe = ca - charges;
        let annuite_annee = if annee >= 1 && annee <= duree { annuite } else { 0.0 };
        let impots = (TAUX_IS * (ebe - annuite_annee)).max(0.0);
        let tresorerie = ebe - annuite_annee - impots;

        years.push(BusinessPlanYear {
            annee,
            chiffre_affaires: round0(ca),
            charges: round0(charges),
            ebe: round0(ebe),
            annuite: round0(annuite_annee),
            impots: round0(impots),
            tresorerie_residuelle: round0(tresorerie),
        });
    }

    // Indicators read the first post-acquisition year.
    let year1 = &years[1];
    let ratio_couverture = safe_div(year1.ebe, year1.annuite).map(round2);
    let capacite_autofinancement = round0(year1.ebe - year1.impots);
    let point_mort = safe_div(
        base.charges_fixes + year1.annuite,
        1.0 - base.charges_variables_ratio,
    )
    .map(round0);
    let cashflow_annuel = year1.tresorerie_residuelle;
    let roi_pct = investissement
        .and_then(|inv| safe_div(cashflow_annuel, inv))
        .map(|r| round2(r * 100.0));
    let payback_mois = investissement
        .and_then(|inv| safe_div(inv, cashflow_annuel / 12.0))
        .filter(|m| *m > 0.0)
        .map(round0);

    info!(
        "Projection stage: CA année 1 {:.0} €, annuité {:.0} €",
        year1.chiffre_affaires, year1.annuite
    );

    Ok(ProjectionOutput {
        plan: BusinessPlanProjection {
            years,
            hypotheses: hypotheses.clone(),
        },
        indicators: BankIndicators {
            ratio_couverture,
            capacite_autofinancement,
            point_mort,
            roi_pct,
            payback_mois,
        },
        degraded: false,
    })
}
