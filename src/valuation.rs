use crate::accounting::{AccountingOutput, TrendClass};
use crate::schema::{FiscalYearRecord, UserOverrides};
use crate::sector::{lookup_sector, SectorProfile};
use crate::utils::{round0, round2, safe_div};
use log::{debug, info};
use serde::{Deserialize, Serialize};

// Blend weights per preference branch. Each triple sums to 1.0.
const WEIGHTS_EBE_PREFERRED: MethodWeights = MethodWeights {
    ebe: 0.70,
    revenue: 0.20,
    patrimonial: 0.10,
};
const WEIGHTS_PATRIMONIAL_PREFERRED: MethodWeights = MethodWeights {
    ebe: 0.10,
    revenue: 0.30,
    patrimonial: 0.60,
};

/// Goodwill retained in the patrimonial method, as a multiple of the
/// reference EBE.
const GOODWILL_EBE_MULTIPLE: f64 = 1.5;

/// Price-deviation band: within ±15% (inclusive) is market price.
const PRICE_MARKET_BAND_PCT: f64 = 15.0;

#[derive(Debug, Clone, Copy)]
struct MethodWeights {
    ebe: f64,
    revenue: f64,
    patrimonial: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    MultipleEbe,
    PourcentageCa,
    Patrimoniale,
    HybrideReglemente,
}

/// Output of one valuation method: a low/median/high range plus the
/// reasoning behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationMethodResult {
    pub method: MethodKind,
    pub valeur_basse: f64,
    pub valeur_mediane: f64,
    pub valeur_haute: f64,
    pub justification: String,
}

/// Everything the methods need, assembled from the accounting stage output
/// and the raw records.
pub struct ValuationContext<'a> {
    pub accounting: &'a AccountingOutput,
    pub latest_record: Option<&'a FiscalYearRecord>,
    pub sector: &'a SectorProfile,
    pub overrides: &'a UserOverrides,
}

impl<'a> ValuationContext<'a> {
    /// Normalized EBE when available, otherwise the 3-year average of
    /// accounting EBE (latest year when fewer than 3 years exist).
    pub fn ebe_reference(&self) -> Option<f64> {
        if let Some(retraitement) = &self.accounting.retraitement {
            return Some(retraitement.ebe_normatif);
        }
        let sigs = &self.accounting.sig_records;
        if sigs.is_empty() {
            return None;
        }
        if sigs.len() >= 3 {
            let tail = &sigs[sigs.len() - 3..];
            let sum: f64 = tail.iter().map(|s| s.ebe.value).sum();
            Some(round2(sum / 3.0))
        } else {
            sigs.last().map(|s| s.ebe.value)
        }
    }

    /// 3-year average revenue (or fewer when fewer years exist).
    pub fn ca_reference(&self) -> Option<f64> {
        let sigs = &self.accounting.sig_records;
        if sigs.is_empty() {
            return None;
        }
        let n = sigs.len().min(3);
        let tail = &sigs[sigs.len() - n..];
        let sum: f64 = tail.iter().map(|s| s.chiffre_affaires).sum();
        Some(round2(sum / n as f64))
    }
}

/// A valuation method prices the business from the accounting output and the
/// sector coefficients. Returns `None` when its inputs are absent.
pub trait ValuationMethod {
    fn kind(&self) -> MethodKind;
    fn compute(&self, ctx: &ValuationContext) -> Option<ValuationMethodResult>;
}

pub struct EbeMultipleMethod;

impl ValuationMethod for EbeMultipleMethod {
    fn kind(&self) -> MethodKind {
        MethodKind::MultipleEbe
    }

    fn compute(&self, ctx: &ValuationContext) -> Option<ValuationMethodResult> {
        let ebe = ctx.ebe_reference()?;
        let [low, median, high] = ctx.sector.coef_ebe;
        Some(ValuationMethodResult {
            method: MethodKind::MultipleEbe,
            valeur_basse: round0(ebe * low),
            valeur_mediane: round0(ebe * median),
            valeur_haute: round0(ebe * high),
            justification: format!(
                "EBE de référence {:.0} € × coefficient sectoriel {:.1} ({})",
                ebe, median, ctx.sector.label
            ),
        })
    }
}

pub struct RevenuePctMethod;

impl ValuationMethod for RevenuePctMethod {
    fn kind(&self) -> MethodKind {
        MethodKind::PourcentageCa
    }

    fn compute(&self, ctx: &ValuationContext) -> Option<ValuationMethodResult> {
        let ca = ctx.ca_reference()?;
        let [low, median, high] = ctx.sector.coef_ca;
        Some(ValuationMethodResult {
            method: MethodKind::PourcentageCa,
            valeur_basse: round0(ca * low),
            valeur_mediane: round0(ca * median),
            valeur_haute: round0(ca * high),
            justification: format!(
                "CA moyen {:.0} € × {:.0}% du CA ({})",
                ca,
                median * 100.0,
                ctx.sector.label
            ),
        })
    }
}

pub struct PatrimonialMethod;

impl ValuationMethod for PatrimonialMethod {
    fn kind(&self) -> MethodKind {
        MethodKind::Patrimoniale
    }

    fn compute(&self, ctx: &ValuationContext) -> Option<ValuationMethodResult> {
        let record = ctx.latest_record?;
        let actif = record.total_actif?;
        let dettes = record.total_dettes?;
        let actif_net = actif - dettes;
        let revalorisation = ctx.overrides.revalorisation_actifs.unwrap_or(0.0);
        let goodwill = GOODWILL_EBE_MULTIPLE * ctx.ebe_reference().unwrap_or(0.0).max(0.0);
        let value = actif_net + revalorisation + goodwill;

        Some(ValuationMethodResult {
            method: MethodKind::Patrimoniale,
            valeur_basse: round0(value * 0.90),
            valeur_mediane: round0(value),
            valeur_haute: round0(value * 1.10),
            justification: format!(
                "Actif net {:.0} € + revalorisation {:.0} € + goodwill ({}× EBE) {:.0} €",
                actif_net, revalorisation, GOODWILL_EBE_MULTIPLE, goodwill
            ),
        })
    }
}

/// Location classes for regulated retail (tabac/presse), each mapped to a
/// commission coefficient within the 2.0-3.2 band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationClass {
    UrbainPremium,
    CentreVille,
    Touristique,
    Transit,
    Etudiant,
    Peripherie,
    Rural,
}

impl LocationClass {
    pub fn commission_coefficient(self) -> f64 {
        match self {
            LocationClass::UrbainPremium => 3.2,
            LocationClass::CentreVille => 3.0,
            LocationClass::Touristique => 2.9,
            LocationClass::Transit => 2.8,
            LocationClass::Etudiant => 2.6,
            LocationClass::Peripherie => 2.4,
            LocationClass::Rural => 2.0,
        }
    }
}

/// Hybrid method for regulated retail: commission block plus boutique block.
/// Used instead of the classical three when the sector qualifies.
pub fn compute_hybrid(
    ctx: &ValuationContext,
    location: LocationClass,
) -> Option<ValuationMethodResult> {
    let record = ctx.latest_record?;
    let commissions = record.commissions_nettes?;
    let boutique = record.ca_boutique.unwrap_or(0.0);

    let coef = location.commission_coefficient();
    let coef_low = (coef - 0.3).max(2.0);
    let coef_high = (coef + 0.3).min(3.2);

    // Boutique block: 12-25% of counter revenue.
    let low = commissions * coef_low + boutique * 0.12;
    let median = commissions * coef + boutique * 0.185;
    let high = commissions * coef_high + boutique * 0.25;

    Some(ValuationMethodResult {
        method: MethodKind::HybrideReglemente,
        valeur_basse: round0(low),
        valeur_mediane: round0(median),
        valeur_haute: round0(high),
        justification: format!(
            "Commissions réglementées {:.0} € × {:.1} (emplacement {:?}) + boutique {:.0} € × 18,5%",
            commissions, coef, location, boutique
        ),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceCategory {
    SousEvalue,
    PrixMarche,
    SurEvalue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceComparison {
    pub prix_demande: f64,
    pub valeur_mediane: f64,
    pub deviation_pct: f64,
    pub categorie: PriceCategory,
}

/// Classifies the asking price against the median estimate. The ±15% band is
/// inclusive: a deviation of exactly +15% still reads as market price.
pub fn compare_price(asking_price: f64, median: f64) -> Option<PriceComparison> {
    let deviation_pct = safe_div(asking_price - median, median).map(|r| round2(r * 100.0))?;
    let categorie = if deviation_pct < -PRICE_MARKET_BAND_PCT {
        PriceCategory::SousEvalue
    } else if deviation_pct > PRICE_MARKET_BAND_PCT {
        PriceCategory::SurEvalue
    } else {
        PriceCategory::PrixMarche
    };
    Some(PriceComparison {
        prix_demande: asking_price,
        valeur_mediane: median,
        deviation_pct,
        categorie,
    })
}

/// Whether the hybrid method replaces the classical methods outright or the
/// classical three are also run for comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HybridMode {
    #[default]
    Replace,
    CompareClassical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationSynthesis {
    pub methode_preferee: MethodKind,
    pub raison_preference: String,
    pub valeur_basse: f64,
    pub valeur_mediane: f64,
    pub valeur_haute: f64,
    /// Weights actually used in the blend, keyed by method; sum to 1.0.
    pub ponderations: Vec<(MethodKind, f64)>,
    pub comparaison_prix: Option<PriceComparison>,
    pub arguments_acheteur: Vec<String>,
    pub arguments_vendeur: Vec<String>,
    pub limitations: Vec<String>,
}

/// Full output of the valuation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationOutput {
    pub methods: Vec<ValuationMethodResult>,
    /// Classical methods run alongside the hybrid, in comparison mode only.
    pub comparison_methods: Vec<ValuationMethodResult>,
    pub synthesis: Option<ValuationSynthesis>,
    pub degraded: bool,
}

fn classical_methods(ctx: &ValuationContext) -> Vec<ValuationMethodResult> {
    let methods: [&dyn ValuationMethod; 3] =
        [&EbeMultipleMethod, &RevenuePctMethod, &PatrimonialMethod];
    methods.iter().filter_map(|m| m.compute(ctx)).collect()
}

fn find(results: &[ValuationMethodResult], kind: MethodKind) -> Option<&ValuationMethodResult> {
    results.iter().find(|r| r.method == kind)
}

fn blend(
    results: &[ValuationMethodResult],
    weights: MethodWeights,
) -> (f64, f64, f64, Vec<(MethodKind, f64)>) {
    // Missing methods drop out and the remaining weights are renormalized so
    // the published weights still sum to 1.0.
    let weighted: Vec<(MethodKind, f64, &ValuationMethodResult)> = results
        .iter()
        .filter_map(|r| {
            let w = match r.method {
                MethodKind::MultipleEbe => weights.ebe,
                MethodKind::PourcentageCa => weights.revenue,
                MethodKind::Patrimoniale => weights.patrimonial,
                MethodKind::HybrideReglemente => return None,
            };
            Some((r.method, w, r))
        })
        .collect();

    let total: f64 = weighted.iter().map(|(_, w, _)| w).sum();
    if total == 0.0 {
        return (0.0, 0.0, 0.0, Vec::new());
    }

    let mut low = 0.0;
    let mut median = 0.0;
    let mut high = 0.0;
    let mut ponderations = Vec::new();
    for (kind, w, r) in &weighted {
        let w = w / total;
        low += r.valeur_basse * w;
        median += r.valeur_mediane * w;
        high += r.valeur_haute * w;
        ponderations.push((*kind, w));
    }

    (round0(low), round0(median), round0(high), ponderations)
}

fn negotiation_arguments(
    accounting: &AccountingOutput,
    comparison: Option<&PriceComparison>,
) -> (Vec<String>, Vec<String>) {
    let mut buyer = Vec::new();
    let mut seller = Vec::new();

    if let Some(cmp) = comparison {
        match cmp.categorie {
            PriceCategory::SurEvalue => buyer.push(format!(
                "Le prix demandé dépasse de {:.1}% la valeur médiane estimée ({:.0} €)",
                cmp.deviation_pct, cmp.valeur_mediane
            )),
            PriceCategory::SousEvalue => seller.push(format!(
                "Le prix demandé est inférieur de {:.1}% à la valeur médiane estimée ({:.0} €)",
                cmp.deviation_pct.abs(),
                cmp.valeur_mediane
            )),
            PriceCategory::PrixMarche => seller.push(
                "Le prix demandé est cohérent avec la fourchette de marché".to_string(),
            ),
        }
    }

    if let Some(trend) = &accounting.trend {
        match trend.classification {
            TrendClass::Declin => buyer.push(format!(
                "Chiffre d'affaires en déclin ({:+.1}% entre {} et {})",
                trend.ca_evolution_pct.unwrap_or(0.0),
                trend.first_year,
                trend.last_year
            )),
            TrendClass::Croissance => seller.push(format!(
                "Chiffre d'affaires en croissance ({:+.1}% entre {} et {})",
                trend.ca_evolution_pct.unwrap_or(0.0),
                trend.first_year,
                trend.last_year
            )),
            TrendClass::Stable => {}
        }
    }

    if accounting.health.overall < 40.0 {
        buyer.push(format!(
            "Santé financière fragile (score {}/100)",
            accounting.health.overall
        ));
    } else if accounting.health.overall >= 70.0 {
        seller.push(format!(
            "Santé financière solide (score {}/100)",
            accounting.health.overall
        ));
    }

    if let Some(retraitement) = &accounting.retraitement {
        if retraitement.ecart_pct > 25.0 {
            seller.push(format!(
                "La rentabilité réelle pour un repreneur dépasse l'EBE comptable de {:.0}%",
                retraitement.ecart_pct
            ));
        }
    }

    if !accounting.gaps.is_empty() {
        buyer.push(format!(
            "{} ligne(s) comptable(s) manquante(s) dans les documents fournis",
            accounting.gaps.len()
        ));
    }

    (buyer, seller)
}

/// Request parameters for the valuation stage.
#[derive(Debug, Clone, Default)]
pub struct ValuationRequest {
    pub hybrid_mode: HybridMode,
    pub location: Option<LocationClass>,
}

/// Valuation stage entry point. Degrades to an empty output (no synthesis)
/// when the accounting stage produced nothing usable.
pub fn run_valuation(
    accounting: &AccountingOutput,
    latest_record: Option<&FiscalYearRecord>,
    activity_code: Option<&str>,
    overrides: &UserOverrides,
    request: &ValuationRequest,
) -> ValuationOutput {
    let (sector, _) = lookup_sector(activity_code);
    let ctx = ValuationContext {
        accounting,
        latest_record,
        sector,
        overrides,
    };

    let mut limitations = Vec::new();

    // Regulated retail path: the hybrid two-block sum is the synthesis.
    if sector.regulated_retail {
        let location = request.location.unwrap_or(LocationClass::CentreVille);
        if let Some(hybrid) = compute_hybrid(&ctx, location) {
            let comparison_methods = match request.hybrid_mode {
                HybridMode::CompareClassical => classical_methods(&ctx),
                HybridMode::Replace => Vec::new(),
            };
            let comparaison_prix = overrides
                .prix_demande
                .and_then(|p| compare_price(p, hybrid.valeur_mediane));
            let (arguments_acheteur, arguments_vendeur) =
                negotiation_arguments(accounting, comparaison_prix.as_ref());

            if request.location.is_none() {
                limitations.push(
                    "Emplacement non qualifié: coefficient centre-ville appliqué par défaut"
                        .to_string(),
                );
            }

            info!(
                "Valuation (hybride réglementée): {:.0} € médian",
                hybrid.valeur_mediane
            );

            let synthesis = ValuationSynthesis {
                methode_preferee: MethodKind::HybrideReglemente,
                raison_preference: format!(
                    "Secteur réglementé ({}) : valorisation par blocs commissions + boutique",
                    sector.label
                ),
                valeur_basse: hybrid.valeur_basse,
                valeur_mediane: hybrid.valeur_mediane,
                valeur_haute: hybrid.valeur_haute,
                ponderations: vec![(MethodKind::HybrideReglemente, 1.0)],
                comparaison_prix,
                arguments_acheteur,
                arguments_vendeur,
                limitations,
            };
            return ValuationOutput {
                methods: vec![hybrid],
                comparison_methods,
                synthesis: Some(synthesis),
                degraded: false,
            };
        }
        limitations.push(
            "Commissions réglementées absentes des documents: retour aux méthodes classiques"
                .to_string(),
        );
    }

    let methods = classical_methods(&ctx);
    if methods.is_empty() {
        debug!("No valuation method could run, stage degrades");
        return ValuationOutput {
            methods,
            comparison_methods: Vec::new(),
            synthesis: None,
            degraded: true,
        };
    }

    let ebe_reference = ctx.ebe_reference().unwrap_or(0.0);
    let ebe_median = find(&methods, MethodKind::MultipleEbe).map(|m| m.valeur_mediane);
    let actif_net = latest_record
        .and_then(|r| Some(r.total_actif? - r.total_dettes?));

    let patrimonial_preferred = ebe_reference <= 0.0
        || matches!(
            (actif_net, ebe_median),
            (Some(net), Some(med)) if net > 2.0 * med
        );

    let (weights, methode_preferee, raison_preference) = if patrimonial_preferred {
        (
            WEIGHTS_PATRIMONIAL_PREFERRED,
            MethodKind::Patrimoniale,
            "EBE de référence faible ou actif net prépondérant: approche patrimoniale privilégiée"
                .to_string(),
        )
    } else {
        (
            WEIGHTS_EBE_PREFERRED,
            MethodKind::MultipleEbe,
            "Rentabilité établie: le multiple d'EBE reflète la capacité bénéficiaire".to_string(),
        )
    };

    let (valeur_basse, valeur_mediane, valeur_haute, ponderations) = blend(&methods, weights);

    let comparaison_prix = overrides
        .prix_demande
        .and_then(|p| compare_price(p, valeur_mediane));
    let (arguments_acheteur, arguments_vendeur) =
        negotiation_arguments(accounting, comparaison_prix.as_ref());

    if accounting.retraitement.is_none() {
        limitations
            .push("EBE non retraité: valorisation fondée sur l'EBE comptable".to_string());
    }
    if methods.len() < 3 {
        limitations.push(format!(
            "Seulement {} méthode(s) applicable(s): pondérations renormalisées",
            methods.len()
        ));
    }

    info!("Valuation: {:.0} € médian (blend)", valeur_mediane);

    ValuationOutput {
        methods,
        comparison_methods: Vec::new(),
        synthesis: Some(ValuationSynthesis {
            methode_preferee,
            raison_preference,
            valeur_basse,
            valeur_mediane,
            valeur_haute,
            ponderations,
            comparaison_prix,
            arguments_acheteur,
            arguments_vendeur,
            limitations,
        }),
        degraded: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::run_accounting;
    use crate::schema::FiscalYearRecord;

    fn record(year: i32, ca: f64) -> FiscalYearRecord {
        FiscalYearRecord {
            year,
            chiffre_affaires: Some(ca),
            achats_marchandises: Some(ca * 0.55),
            charges_externes: Some(ca * 0.12),
            charges_personnel: Some(ca * 0.09),
            dotations_amortissements: Some(ca * 0.03),
            impots: Some(ca * 0.02),
            stock: Some(ca * 0.03),
            total_actif: Some(ca * 0.45),
            total_dettes: Some(ca * 0.18),
            fonds_propres: Some(ca * 0.22),
            ..Default::default()
        }
    }

    fn accounting_for(records: &[FiscalYearRecord]) -> AccountingOutput {
        run_accounting(records, Some("5610A"), &UserOverrides::default())
    }

    #[test]
    fn test_ebe_method_worked_example() {
        // ebe_retraite 120000 × coefficient médian 3.5 => 420000
        let sector = SectorProfile {
            coef_ebe: [2.5, 3.5, 4.5],
            ..crate::sector::GENERIC_SECTOR.clone()
        };
        let records = vec![record(2023, 400_000.0)];
        let mut accounting = accounting_for(&records);
        accounting.retraitement.as_mut().unwrap().ebe_normatif = 120_000.0;

        let ctx = ValuationContext {
            accounting: &accounting,
            latest_record: records.last(),
            sector: &sector,
            overrides: &UserOverrides::default(),
        };
        let result = EbeMultipleMethod.compute(&ctx).unwrap();
        assert!((result.valeur_mediane - 420_000.0).abs() < 0.5);
    }

    #[test]
    fn test_ebe_reference_falls_back_to_average() {
        let records = vec![
            record(2021, 400_000.0),
            record(2022, 420_000.0),
            record(2023, 440_000.0),
        ];
        let mut accounting = accounting_for(&records);
        accounting.retraitement = None;

        let (sector, _) = lookup_sector(Some("5610A"));
        let ctx = ValuationContext {
            accounting: &accounting,
            latest_record: records.last(),
            sector,
            overrides: &UserOverrides::default(),
        };
        let expected: f64 = accounting
            .sig_records
            .iter()
            .map(|s| s.ebe.value)
            .sum::<f64>()
            / 3.0;
        assert!((ctx.ebe_reference().unwrap() - round2(expected)).abs() < 0.01);
    }

    #[test]
    fn test_blend_weights_sum_to_one() {
        for weights in [WEIGHTS_EBE_PREFERRED, WEIGHTS_PATRIMONIAL_PREFERRED] {
            let sum = weights.ebe + weights.revenue + weights.patrimonial;
            assert!((sum - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_synthesis_ponderations_sum_to_one() {
        let records = vec![record(2022, 480_000.0), record(2023, 500_000.0)];
        let accounting = accounting_for(&records);
        let output = run_valuation(
            &accounting,
            records.last(),
            Some("5610A"),
            &UserOverrides::default(),
            &ValuationRequest::default(),
        );
        let synthesis = output.synthesis.unwrap();
        let sum: f64 = synthesis.ponderations.iter().map(|(_, w)| w).sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert_eq!(synthesis.methode_preferee, MethodKind::MultipleEbe);
    }

    #[test]
    fn test_patrimonial_preferred_on_negative_ebe() {
        let mut r = record(2023, 300_000.0);
        r.charges_personnel = Some(200_000.0); // drives EBE well below zero
        let records = vec![r];
        let accounting = accounting_for(&records);
        let output = run_valuation(
            &accounting,
            records.last(),
            Some("5610A"),
            &UserOverrides::default(),
            &ValuationRequest::default(),
        );
        let synthesis = output.synthesis.unwrap();
        assert_eq!(synthesis.methode_preferee, MethodKind::Patrimoniale);
        let sum: f64 = synthesis.ponderations.iter().map(|(_, w)| w).sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_price_comparison_boundary() {
        // Exactly +15% is still market price; beyond is overvalued.
        let cmp = compare_price(115_000.0, 100_000.0).unwrap();
        assert_eq!(cmp.categorie, PriceCategory::PrixMarche);

        let cmp = compare_price(115_100.0, 100_000.0).unwrap();
        assert_eq!(cmp.categorie, PriceCategory::SurEvalue);

        // +14% is market price under the inclusive band rule.
        let cmp = compare_price(114_000.0, 100_000.0).unwrap();
        assert_eq!(cmp.categorie, PriceCategory::PrixMarche);

        let cmp = compare_price(80_000.0, 100_000.0).unwrap();
        assert_eq!(cmp.categorie, PriceCategory::SousEvalue);
    }

    #[test]
    fn test_hybrid_replaces_classical_for_tabac() {
        let mut r = record(2023, 350_000.0);
        r.commissions_nettes = Some(90_000.0);
        r.ca_boutique = Some(120_000.0);
        let records = vec![r];
        let accounting = run_accounting(&records, Some("4726Z"), &UserOverrides::default());

        let request = ValuationRequest {
            hybrid_mode: HybridMode::Replace,
            location: Some(LocationClass::CentreVille),
        };
        let output = run_valuation(
            &accounting,
            records.last(),
            Some("4726Z"),
            &UserOverrides::default(),
            &request,
        );
        let synthesis = output.synthesis.unwrap();
        assert_eq!(synthesis.methode_preferee, MethodKind::HybrideReglemente);
        assert!(output.comparison_methods.is_empty());

        // 90000 × 3.0 + 120000 × 0.185 = 292200
        assert!((synthesis.valeur_mediane - 292_200.0).abs() < 0.5);
    }

    #[test]
    fn test_hybrid_compare_mode_attaches_classical() {
        let mut r = record(2023, 350_000.0);
        r.commissions_nettes = Some(90_000.0);
        r.ca_boutique = Some(120_000.0);
        let records = vec![r];
        let accounting = run_accounting(&records, Some("4726Z"), &UserOverrides::default());

        let request = ValuationRequest {
            hybrid_mode: HybridMode::CompareClassical,
            location: Some(LocationClass::Rural),
        };
        let output = run_valuation(
            &accounting,
            records.last(),
            Some("4726Z"),
            &UserOverrides::default(),
            &request,
        );
        assert!(!output.comparison_methods.is_empty());
        // Synthesis stays the hybrid two-block sum
        let synthesis = output.synthesis.unwrap();
        assert_eq!(synthesis.methode_preferee, MethodKind::HybrideReglemente);
    }

    #[test]
    fn test_location_coefficients_within_band() {
        for class in [
            LocationClass::UrbainPremium,
            LocationClass::CentreVille,
            LocationClass::Touristique,
            LocationClass::Transit,
            LocationClass::Etudiant,
            LocationClass::Peripherie,
            LocationClass::Rural,
        ] {
            let c = class.commission_coefficient();
            assert!((2.0..=3.2).contains(&c));
        }
    }

    #[test]
    fn test_degraded_valuation_on_empty_accounting() {
        let accounting = run_accounting(&[], None, &UserOverrides::default());
        let output = run_valuation(
            &accounting,
            None,
            None,
            &UserOverrides::default(),
            &ValuationRequest::default(),
        );
        assert!(output.degraded);
        assert!(output.synthesis.is_none());
    }

    #[test]
    fn test_negotiation_arguments_follow_deviation() {
        let records = vec![record(2021, 520_000.0), record(2023, 460_000.0)];
        let accounting = accounting_for(&records);
        let overrides = UserOverrides {
            prix_demande: Some(1_000_000.0),
            ..Default::default()
        };
        let output = run_valuation(
            &accounting,
            records.last(),
            Some("5610A"),
            &overrides,
            &ValuationRequest::default(),
        );
        let synthesis = output.synthesis.unwrap();
        assert_eq!(
            synthesis.comparaison_prix.as_ref().unwrap().categorie,
            PriceCategory::SurEvalue
        );
        assert!(!synthesis.arguments_acheteur.is_empty());
    }
}
