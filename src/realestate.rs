use crate::schema::{FiscalYearRecord, LeaseInput, PropertyCondition, UserOverrides};
use crate::utils::{round0, round2, safe_div};
use chrono::NaiveDate;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Default market rent reference when none is supplied, €/m²/year for a
/// secondary-city commercial street.
const DEFAULT_MARKET_RENT_M2: f64 = 180.0;

/// Droit-au-bail cross-check band against the business value.
const DAB_BUSINESS_VALUE_MAX_PCT: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseAppreciation {
    Avantageux,
    Marche,
    Desavantageux,
}

/// Analyzed commercial lease terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub loyer_annuel: f64,
    pub surface: Option<f64>,
    pub loyer_m2: Option<f64>,
    pub loyer_marche_m2: f64,
    pub appreciation: LeaseAppreciation,
    pub date_fin: Option<NaiveDate>,
    pub indexation: Option<String>,
}

/// Market value of the right to the lease.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroitAuBail {
    pub valeur: f64,
    /// Years of annual rent retained (1-3), zero in degraded mode.
    pub annees_loyer: u8,
    pub note: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseRecommendation {
    Acheter,
    Negocier,
    Louer,
}

/// Buy-the-building analysis, run only when a walls price is supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyPurchaseAnalysis {
    pub prix: f64,
    pub rendement_brut_pct: f64,
    pub rendement_net_pct: f64,
    pub recommandation: PurchaseRecommendation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkUrgency {
    Immediat,
    CourtTerme,
    MoyenTerme,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenovationItem {
    pub label: String,
    pub obligatoire: bool,
    pub urgence: WorkUrgency,
    pub cout_bas: f64,
    pub cout_haut: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenovationEstimate {
    pub etat_local: PropertyCondition,
    pub surface: f64,
    pub items: Vec<RenovationItem>,
    pub total_bas: f64,
    pub total_haut: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealEstateScore {
    /// min(100, lease + renovation + property)
    pub total: f64,
    pub lease_score: f64,
    pub renovation_score: f64,
    pub property_score: f64,
}

/// Full output of the real-estate stage. The stage always returns a record,
/// at reduced score, even with no lease data at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealEstateOutput {
    pub lease: Option<LeaseRecord>,
    pub droit_au_bail: DroitAuBail,
    pub purchase: Option<PropertyPurchaseAnalysis>,
    pub renovation: Option<RenovationEstimate>,
    pub score: RealEstateScore,
    pub degraded: bool,
}

/// Merges the manual lease over the extracted one, field by field, with
/// manual input taking precedence.
pub fn merge_lease(
    extracted: Option<&LeaseInput>,
    manual: Option<&LeaseInput>,
) -> Option<LeaseInput> {
    match (extracted, manual) {
        (None, None) => None,
        (Some(e), None) => Some(e.clone()),
        (None, Some(m)) => Some(m.clone()),
        (Some(e), Some(m)) => Some(LeaseInput {
            loyer_annuel: m.loyer_annuel.or(e.loyer_annuel),
            surface: m.surface.or(e.surface),
            loyer_marche_m2: m.loyer_marche_m2.or(e.loyer_marche_m2),
            date_debut: m.date_debut.or(e.date_debut),
            date_fin: m.date_fin.or(e.date_fin),
            indexation: m.indexation.clone().or_else(|| e.indexation.clone()),
            etat_local: m.etat_local.or(e.etat_local),
        }),
    }
}

pub fn analyze_lease(input: &LeaseInput) -> Option<LeaseRecord> {
    let loyer_annuel = input.loyer_annuel?;
    let loyer_marche_m2 = input.loyer_marche_m2.unwrap_or(DEFAULT_MARKET_RENT_M2);
    let loyer_m2 = input
        .surface
        .and_then(|s| safe_div(loyer_annuel, s))
        .map(round2);

    // ±10% around the market reference classifies the rent.
    let appreciation = match loyer_m2 {
        Some(m2) if m2 < loyer_marche_m2 * 0.9 => LeaseAppreciation::Avantageux,
        Some(m2) if m2 > loyer_marche_m2 * 1.1 => LeaseAppreciation::Desavantageux,
        Some(_) => LeaseAppreciation::Marche,
        // Without a surface the rent level cannot be judged.
        None => LeaseAppreciation::Marche,
    };

    Some(LeaseRecord {
        loyer_annuel,
        surface: input.surface,
        loyer_m2,
        loyer_marche_m2,
        appreciation,
        date_fin: input.date_fin,
        indexation: input.indexation.clone(),
    })
}

/// Droit au bail: 1-3 years of annual rent depending on how favorable the
/// lease is, optionally capped against the business value.
pub fn estimate_droit_au_bail(
    lease: Option<&LeaseRecord>,
    business_value: Option<f64>,
) -> DroitAuBail {
    let Some(lease) = lease else {
        return DroitAuBail {
            valeur: 0.0,
            annees_loyer: 0,
            note: "Aucune donnée de bail: droit au bail non estimable".to_string(),
        };
    };

    let annees: u8 = match lease.appreciation {
        LeaseAppreciation::Avantageux => 3,
        LeaseAppreciation::Marche => 2,
        LeaseAppreciation::Desavantageux => 1,
    };
    let mut valeur = annees as f64 * lease.loyer_annuel;
    let mut note = format!("{} année(s) de loyer annuel ({:.0} €)", annees, lease.loyer_annuel);

    if let Some(bv) = business_value {
        let cap = bv * DAB_BUSINESS_VALUE_MAX_PCT / 100.0;
        if bv > 0.0 && valeur > cap {
            valeur = cap;
            note.push_str(&format!(
                ", plafonné à {:.0}% de la valeur du fonds",
                DAB_BUSINESS_VALUE_MAX_PCT
            ));
        }
    }

    DroitAuBail {
        valeur: round0(valeur),
        annees_loyer: annees,
        note,
    }
}

/// Gross yield > 7% favors buying, 5-7% calls for negotiating the walls
/// price, below 5% renting stays preferable. Net yield assumes 15% carrying
/// costs.
pub fn analyze_property_purchase(
    rent_annual: f64,
    price: f64,
) -> Option<PropertyPurchaseAnalysis> {
    let gross = safe_div(rent_annual, price).map(|r| round2(r * 100.0))?;
    let net = round2(gross * 0.85);
    let recommandation = if gross > 7.0 {
        PurchaseRecommendation::Acheter
    } else if gross >= 5.0 {
        PurchaseRecommendation::Negocier
    } else {
        PurchaseRecommendation::Louer
    };
    Some(PropertyPurchaseAnalysis {
        prix: price,
        rendement_brut_pct: gross,
        rendement_net_pct: net,
        recommandation,
    })
}

fn condition_factor(condition: PropertyCondition) -> f64 {
    match condition {
        PropertyCondition::Neuf => 0.0,
        PropertyCondition::Bon => 0.4,
        PropertyCondition::Moyen => 1.0,
        PropertyCondition::Degrade => 1.6,
    }
}

/// Itemized works estimate: mandatory accessibility and fire-safety
/// compliance, plus recommended cosmetic refresh. Cost bands are €/m² scaled
/// by the condition rating.
pub fn estimate_renovation(
    surface: f64,
    condition: PropertyCondition,
) -> Option<RenovationEstimate> {
    if surface <= 0.0 {
        return None;
    }
    let factor = condition_factor(condition);

    let bands: [(&str, bool, WorkUrgency, f64, f64); 3] = [
        ("Mise aux normes accessibilité PMR", true, WorkUrgency::Immediat, 80.0, 150.0),
        ("Sécurité incendie", true, WorkUrgency::Immediat, 40.0, 90.0),
        ("Rafraîchissement du local", false, WorkUrgency::MoyenTerme, 150.0, 400.0),
    ];

    let mut items = Vec::new();
    let mut total_bas = 0.0;
    let mut total_haut = 0.0;
    for (label, obligatoire, urgence, low_m2, high_m2) in bands {
        let cout_bas = round0(low_m2 * surface * factor);
        let cout_haut = round0(high_m2 * surface * factor);
        total_bas += cout_bas;
        total_haut += cout_haut;
        items.push(RenovationItem {
            label: label.to_string(),
            obligatoire,
            urgence,
            cout_bas,
            cout_haut,
        });
    }

    Some(RenovationEstimate {
        etat_local: condition,
        surface,
        items,
        total_bas,
        total_haut,
    })
}

fn lease_score(lease: Option<&LeaseRecord>) -> f64 {
    match lease.map(|l| l.appreciation) {
        Some(LeaseAppreciation::Avantageux) => 40.0,
        Some(LeaseAppreciation::Marche) => 25.0,
        Some(LeaseAppreciation::Desavantageux) => 10.0,
        None => 0.0,
    }
}

fn renovation_score(renovation: Option<&RenovationEstimate>) -> f64 {
    match renovation.map(|r| r.etat_local) {
        Some(PropertyCondition::Neuf) => 30.0,
        Some(PropertyCondition::Bon) => 24.0,
        Some(PropertyCondition::Moyen) => 15.0,
        Some(PropertyCondition::Degrade) => 5.0,
        // Unknown condition: neutral midpoint
        None => 15.0,
    }
}

fn property_score(purchase: Option<&PropertyPurchaseAnalysis>) -> f64 {
    match purchase.map(|p| p.recommandation) {
        Some(PurchaseRecommendation::Acheter) => 30.0,
        Some(PurchaseRecommendation::Negocier) => 20.0,
        Some(PurchaseRecommendation::Louer) => 10.0,
        // Walls not for sale: neutral midpoint
        None => 15.0,
    }
}

/// Real-estate stage entry point. `business_value` is the valuation stage's
/// median estimate when that stage produced one.
pub fn run_real_estate(
    latest_record: Option<&FiscalYearRecord>,
    extracted_lease: Option<&LeaseInput>,
    overrides: &UserOverrides,
    business_value: Option<f64>,
) -> RealEstateOutput {
    // Rent can also come straight from the income statement.
    let mut base = merge_lease(extracted_lease, overrides.bail.as_ref())
        .filter(|l| !l.is_empty());
    if base.is_none() {
        if let Some(loyer) = latest_record.and_then(|r| r.loyer_annuel) {
            debug!("No lease document, deriving rent from accounting line");
            base = Some(LeaseInput {
                loyer_annuel: Some(loyer),
                ..Default::default()
            });
        }
    }

    let lease = base.as_ref().and_then(analyze_lease);
    let degraded = lease.is_none();

    let droit_au_bail = estimate_droit_au_bail(lease.as_ref(), business_value);

    let purchase = match (lease.as_ref(), overrides.prix_murs) {
        (Some(l), Some(prix)) => analyze_property_purchase(l.loyer_annuel, prix),
        _ => None,
    };

    let renovation = base.as_ref().and_then(|input| {
        let surface = input.surface?;
        let condition = input.etat_local.unwrap_or(PropertyCondition::Moyen);
        estimate_renovation(surface, condition)
    });

    let score_total = (lease_score(lease.as_ref())
        + renovation_score(renovation.as_ref())
        + property_score(purchase.as_ref()))
    .min(100.0);

    info!(
        "Real-estate stage: score {}/100 (degraded: {})",
        score_total, degraded
    );

    RealEstateOutput {
        score: RealEstateScore {
            total: score_total,
            lease_score: lease_score(lease.as_ref()),
            renovation_score: renovation_score(renovation.as_ref()),
            property_score: property_score(purchase.as_ref()),
        },
        lease,
        droit_au_bail,
        purchase,
        renovation,
        degraded,
    }
}
