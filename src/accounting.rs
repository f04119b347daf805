use crate::health::{score_health, HealthScore};
use crate::schema::{FiscalYearRecord, UserOverrides};
use crate::sector::{benchmark_ratios, SectorBenchmark};
use crate::utils::{pct_of, round2, safe_div};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Default VAT rate used to reconstruct TTC figures for the turnover-day
/// ratios when only HT amounts are extracted.
const TVA_RATE: f64 = 0.20;

/// Owner compensation reference below which the exploitant is considered
/// underpaid; the gap to this reference is reintegrated as an estimation.
const SALAIRE_DIRIGEANT_REFERENCE: f64 = 30_000.0;

/// One line of the SIG cascade: absolute value plus its share of revenue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SigLine {
    pub value: f64,
    pub pct_of_revenue: f64,
}

impl SigLine {
    fn new(value: f64, revenue: f64) -> Self {
        Self {
            value: round2(value),
            pct_of_revenue: round2(pct_of(value, revenue)),
        }
    }
}

/// Soldes Intermédiaires de Gestion for one fiscal year. Produced once by
/// the accounting stage and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigRecord {
    pub year: i32,
    pub chiffre_affaires: f64,
    pub marge_commerciale: SigLine,
    pub valeur_ajoutee: SigLine,
    pub ebe: SigLine,
    pub resultat_exploitation: SigLine,
    pub resultat_courant: SigLine,
    pub resultat_net: SigLine,
}

/// Computes the SIG cascade for one year. Missing inputs default to zero and
/// are returned as named gaps rather than failing the computation.
pub fn compute_sig(record: &FiscalYearRecord) -> (SigRecord, Vec<String>) {
    let mut gaps = Vec::new();
    let mut line = |name: &str, value: Option<f64>| -> f64 {
        match value {
            Some(v) => v,
            None => {
                gaps.push(format!("{}:{}", record.year, name));
                0.0
            }
        }
    };

    let ca = line("chiffre_affaires", record.chiffre_affaires);
    let achats = line("achats_marchandises", record.achats_marchandises);
    let charges_externes = line("charges_externes", record.charges_externes);
    let charges_personnel = line("charges_personnel", record.charges_personnel);
    // Absent exploitant compensation is common for sociétés; not a gap.
    let charges_exploitant = record.charges_exploitant.unwrap_or(0.0);
    let dotations = line("dotations_amortissements", record.dotations_amortissements);
    let resultat_financier = record.resultat_financier.unwrap_or(0.0);
    let resultat_exceptionnel = record.resultat_exceptionnel.unwrap_or(0.0);
    let impots = line("impots", record.impots);

    let marge_commerciale = ca - achats;
    let valeur_ajoutee = marge_commerciale - charges_externes;
    let ebe = valeur_ajoutee - charges_personnel - charges_exploitant;
    let resultat_exploitation = ebe - dotations;
    let resultat_courant = resultat_exploitation + resultat_financier;
    let resultat_net = resultat_courant + resultat_exceptionnel - impots;

    let sig = SigRecord {
        year: record.year,
        chiffre_affaires: round2(ca),
        marge_commerciale: SigLine::new(marge_commerciale, ca),
        valeur_ajoutee: SigLine::new(valeur_ajoutee, ca),
        ebe: SigLine::new(ebe, ca),
        resultat_exploitation: SigLine::new(resultat_exploitation, ca),
        resultat_courant: SigLine::new(resultat_courant, ca),
        resultat_net: SigLine::new(resultat_net, ca),
    };

    (sig, gaps)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentSource {
    Estimation,
    UserInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    SalaireDirigeant,
    PersonnelNonRepris,
    EmbauchesSaisonnieres,
    EconomieLoyer,
    ChargesExceptionnelles,
    ProduitsExceptionnels,
}

/// One signed normalization applied to the accounting EBE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EbeAdjustment {
    pub kind: AdjustmentKind,
    pub label: String,
    /// Signed amount: positive increases the buyer's real earning power.
    pub amount: f64,
    pub source: AdjustmentSource,
}

/// Normalization of the latest-year EBE to the buyer's real earning power.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EbeRetraitement {
    pub ebe_comptable: f64,
    pub retraitements: Vec<EbeAdjustment>,
    pub ebe_normatif: f64,
    pub ecart_pct: f64,
}

/// Builds the EBE retraitement from the latest SIG, the matching raw record
/// and the buyer's overrides. Adjustments keep their sign so that
/// `ebe_normatif == ebe_comptable + sum(amounts)` holds exactly.
pub fn compute_retraitement(
    sig: &SigRecord,
    record: &FiscalYearRecord,
    overrides: &UserOverrides,
) -> EbeRetraitement {
    let mut retraitements = Vec::new();

    // Owner salary reintegration. Exact when supplied, otherwise estimated
    // from the gap to the reference compensation when the owner is underpaid.
    if let Some(salaire) = overrides.salaire_dirigeant {
        retraitements.push(EbeAdjustment {
            kind: AdjustmentKind::SalaireDirigeant,
            label: "Réintégration rémunération dirigeant".to_string(),
            amount: salaire,
            source: AdjustmentSource::UserInput,
        });
    } else if let Some(exploitant) = record.charges_exploitant {
        if exploitant > 0.0 && exploitant < SALAIRE_DIRIGEANT_REFERENCE {
            retraitements.push(EbeAdjustment {
                kind: AdjustmentKind::SalaireDirigeant,
                label: "Rémunération dirigeant sous-évaluée (estimation)".to_string(),
                amount: round2(SALAIRE_DIRIGEANT_REFERENCE - exploitant),
                source: AdjustmentSource::Estimation,
            });
        }
    }

    if overrides.reprise_personnel == Some(false) {
        if let Some(masse) = overrides.masse_salariale_non_reprise {
            retraitements.push(EbeAdjustment {
                kind: AdjustmentKind::PersonnelNonRepris,
                label: "Masse salariale non reprise".to_string(),
                amount: masse,
                source: AdjustmentSource::UserInput,
            });
        }
    }

    if let Some(cout) = overrides.cout_embauches_saisonnieres {
        retraitements.push(EbeAdjustment {
            kind: AdjustmentKind::EmbauchesSaisonnieres,
            label: "Embauches saisonnières prévues".to_string(),
            amount: -cout,
            source: AdjustmentSource::UserInput,
        });
    }

    if let (Some(actuel), Some(negocie)) = (record.loyer_annuel, overrides.loyer_negocie) {
        let economie = actuel - negocie;
        if economie != 0.0 {
            retraitements.push(EbeAdjustment {
                kind: AdjustmentKind::EconomieLoyer,
                label: "Renégociation du loyer".to_string(),
                amount: round2(economie),
                source: AdjustmentSource::UserInput,
            });
        }
    }

    if let Some(charges) = record.charges_exceptionnelles {
        if charges > 0.0 {
            retraitements.push(EbeAdjustment {
                kind: AdjustmentKind::ChargesExceptionnelles,
                label: "Charges exceptionnelles non récurrentes".to_string(),
                amount: charges,
                source: AdjustmentSource::Estimation,
            });
        }
    }

    if let Some(produits) = record.produits_exceptionnels {
        if produits > 0.0 {
            retraitements.push(EbeAdjustment {
                kind: AdjustmentKind::ProduitsExceptionnels,
                label: "Produits exceptionnels non récurrents".to_string(),
                amount: -produits,
                source: AdjustmentSource::Estimation,
            });
        }
    }

    let ebe_comptable = sig.ebe.value;
    let total: f64 = retraitements.iter().map(|r| r.amount).sum();
    let ebe_normatif = ebe_comptable + total;
    let ecart_pct = round2(pct_of(total, ebe_comptable));

    debug!(
        "EBE retraité: comptable={} normatif={} ({} ajustements)",
        ebe_comptable,
        ebe_normatif,
        retraitements.len()
    );

    EbeRetraitement {
        ebe_comptable,
        retraitements,
        ebe_normatif: round2(ebe_normatif),
        ecart_pct,
    }
}

/// Latest-year financial ratios. A ratio whose denominator is missing or
/// zero is reported as `None`, never as infinity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatioSet {
    pub year: i32,
    pub marge_commerciale_pct: Option<f64>,
    pub taux_ebe_pct: Option<f64>,
    pub taux_resultat_net_pct: Option<f64>,
    pub rotation_stocks_jours: Option<f64>,
    pub delai_clients_jours: Option<f64>,
    pub delai_fournisseurs_jours: Option<f64>,
    pub bfr_jours_ca: Option<f64>,
    pub taux_endettement_pct: Option<f64>,
    pub capacite_autofinancement: Option<f64>,
}

pub fn compute_ratios(sig: &SigRecord, record: &FiscalYearRecord) -> RatioSet {
    let ca = sig.chiffre_affaires;
    let ca_ttc = ca * (1.0 + TVA_RATE);
    let achats = record.achats_marchandises.unwrap_or(0.0);
    let achats_ttc = achats * (1.0 + TVA_RATE);

    let rotation_stocks_jours = record
        .stock
        .and_then(|stock| safe_div(stock, achats).map(|r| r * 365.0));
    let delai_clients_jours = record
        .creances_clients
        .and_then(|creances| safe_div(creances, ca_ttc).map(|r| r * 365.0));
    let delai_fournisseurs_jours = record
        .dettes_fournisseurs
        .and_then(|dettes| safe_div(dettes, achats_ttc).map(|r| r * 365.0));

    let bfr = match (record.stock, record.creances_clients, record.dettes_fournisseurs) {
        (Some(stock), creances, fournisseurs) => {
            Some(stock + creances.unwrap_or(0.0) - fournisseurs.unwrap_or(0.0))
        }
        (None, Some(creances), fournisseurs) => Some(creances - fournisseurs.unwrap_or(0.0)),
        _ => None,
    };
    let bfr_jours_ca = bfr.and_then(|b| safe_div(b, ca).map(|r| r * 365.0));

    let taux_endettement_pct = match (record.total_dettes, record.fonds_propres) {
        (Some(dettes), Some(fonds)) => safe_div(dettes, fonds).map(|r| r * 100.0),
        _ => None,
    };

    let capacite_autofinancement = record
        .dotations_amortissements
        .map(|dot| round2(sig.resultat_net.value + dot));

    RatioSet {
        year: sig.year,
        marge_commerciale_pct: Some(sig.marge_commerciale.pct_of_revenue),
        taux_ebe_pct: Some(sig.ebe.pct_of_revenue),
        taux_resultat_net_pct: Some(sig.resultat_net.pct_of_revenue),
        rotation_stocks_jours: rotation_stocks_jours.map(round2),
        delai_clients_jours: delai_clients_jours.map(round2),
        delai_fournisseurs_jours: delai_fournisseurs_jours.map(round2),
        bfr_jours_ca: bfr_jours_ca.map(round2),
        taux_endettement_pct: taux_endettement_pct.map(round2),
        capacite_autofinancement,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendClass {
    Croissance,
    Stable,
    Declin,
}

/// Evolution between the earliest and latest available fiscal years.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendEvaluation {
    pub first_year: i32,
    pub last_year: i32,
    pub ca_evolution_pct: Option<f64>,
    pub ebe_evolution_pct: Option<f64>,
    pub resultat_net_evolution_pct: Option<f64>,
    pub classification: TrendClass,
}

fn evolution(first: f64, last: f64) -> Option<f64> {
    safe_div(last - first, first).map(|r| round2(r * 100.0))
}

/// Requires at least two years; a single year reads as stable by default.
pub fn compute_trend(sig_records: &[SigRecord]) -> Option<TrendEvaluation> {
    let first = sig_records.first()?;
    let last = sig_records.last()?;
    if first.year == last.year {
        return None;
    }

    let ca_evolution_pct = evolution(first.chiffre_affaires, last.chiffre_affaires);
    let ebe_evolution_pct = evolution(first.ebe.value, last.ebe.value);
    let resultat_net_evolution_pct = evolution(first.resultat_net.value, last.resultat_net.value);

    let classification = match ca_evolution_pct {
        Some(e) if e > 5.0 => TrendClass::Croissance,
        Some(e) if e < -5.0 => TrendClass::Declin,
        _ => TrendClass::Stable,
    };

    Some(TrendEvaluation {
        first_year: first.year,
        last_year: last.year,
        ca_evolution_pct,
        ebe_evolution_pct,
        resultat_net_evolution_pct,
        classification,
    })
}

/// Full output of the accounting stage. Always well-formed: an empty
/// document set yields empty collections, a zero health score and the
/// degraded flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingOutput {
    pub sig_records: Vec<SigRecord>,
    pub retraitement: Option<EbeRetraitement>,
    pub ratios: Option<RatioSet>,
    pub trend: Option<TrendEvaluation>,
    pub benchmark: Option<SectorBenchmark>,
    pub health: HealthScore,
    pub gaps: Vec<String>,
    pub limitations: Vec<String>,
    pub degraded: bool,
}

/// Accounting stage entry point. Never fails on business data: problems are
/// carried as gaps and limitations in the output.
pub fn run_accounting(
    records: &[FiscalYearRecord],
    activity_code: Option<&str>,
    overrides: &UserOverrides,
) -> AccountingOutput {
    if records.is_empty() {
        warn!("No fiscal records available, accounting stage runs degraded");
        return AccountingOutput {
            sig_records: Vec::new(),
            retraitement: None,
            ratios: None,
            trend: None,
            benchmark: None,
            health: HealthScore::empty(),
            gaps: vec!["aucun_document_comptable".to_string()],
            limitations: vec![
                "Aucun document comptable exploitable: analyse financière impossible".to_string(),
            ],
            degraded: true,
        };
    }

    info!(
        "Accounting stage: {} fiscal year(s), {}..{}",
        records.len(),
        records.first().map(|r| r.year).unwrap_or_default(),
        records.last().map(|r| r.year).unwrap_or_default()
    );

    let mut sig_records = Vec::with_capacity(records.len());
    let mut gaps = Vec::new();
    for record in records {
        let (sig, mut record_gaps) = compute_sig(record);
        gaps.append(&mut record_gaps);
        sig_records.push(sig);
    }

    let latest_sig = sig_records.last().expect("records is non-empty");
    let latest_record = records.last().expect("records is non-empty");

    let retraitement = compute_retraitement(latest_sig, latest_record, overrides);
    let ratios = compute_ratios(latest_sig, latest_record);
    let trend = compute_trend(&sig_records);
    let benchmark = benchmark_ratios(activity_code, &ratios);

    let mut limitations = benchmark.limitations.clone();
    if sig_records.len() < 3 {
        limitations.push(format!(
            "Seulement {} exercice(s) disponible(s): tendance et moyennes peu fiables",
            sig_records.len()
        ));
    }

    let health = score_health(&ratios, trend.as_ref());

    AccountingOutput {
        sig_records,
        retraitement: Some(retraitement),
        ratios: Some(ratios),
        trend,
        benchmark: Some(benchmark),
        health,
        gaps,
        limitations,
        degraded: false,
    }
}
