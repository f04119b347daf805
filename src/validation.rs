use crate::accounting::{AccountingOutput, RatioSet};
use crate::realestate::RealEstateOutput;
use crate::schema::FiscalYearRecord;
use crate::utils::{clamp_score, round0};
use crate::valuation::ValuationOutput;
use log::info;
use serde::{Deserialize, Serialize};

// Confidence dimension weights, fixed and summing to 1.0.
const POIDS_COMPLETUDE: f64 = 0.40;
const POIDS_FIABILITE: f64 = 0.35;
const POIDS_RECENCE: f64 = 0.25;

/// Tolerance for cross-stage revenue equality, in percent.
const REVENUE_COHERENCE_EPSILON_PCT: f64 = 2.0;

/// Baseline exercice count for the completeness dimension; fewer available
/// years lower the confidence score.
const EXPECTED_FISCAL_YEARS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

/// One cross-stage consistency test. Reported, never thrown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoherenceCheck {
    pub id: String,
    pub label: String,
    pub status: CheckStatus,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub code: String,
    pub severity: Severity,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub overall: f64,
    pub completude: f64,
    pub fiabilite: f64,
    pub recence: f64,
}

/// A rule-based finding. The alert list is a pure function of the analysis
/// state: identical inputs always produce the identical ordered list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeterministicAlert {
    pub id: String,
    pub category: String,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutput {
    pub checks: Vec<CoherenceCheck>,
    pub anomalies: Vec<Anomaly>,
    pub confidence: ConfidenceScore,
    pub alerts: Vec<DeterministicAlert>,
    /// Blocking issues that prevent a usable analysis.
    pub points_bloquants: Vec<String>,
}

fn check(id: &str, label: &str, status: CheckStatus, details: String) -> CoherenceCheck {
    CoherenceCheck {
        id: id.to_string(),
        label: label.to_string(),
        status,
        details,
    }
}

fn coherence_checks(
    records: &[FiscalYearRecord],
    accounting: &AccountingOutput,
    valuation: Option<&ValuationOutput>,
) -> Vec<CoherenceCheck> {
    let mut checks = Vec::new();

    // Extracted revenue vs SIG revenue, per year, within epsilon.
    for (record, sig) in records.iter().zip(accounting.sig_records.iter()) {
        let extracted = record.chiffre_affaires.unwrap_or(0.0);
        let status = if extracted == 0.0 && sig.chiffre_affaires == 0.0 {
            CheckStatus::Warning
        } else if extracted == 0.0 {
            CheckStatus::Error
        } else {
            let gap_pct = ((sig.chiffre_affaires - extracted) / extracted * 100.0).abs();
            if gap_pct <= REVENUE_COHERENCE_EPSILON_PCT {
                CheckStatus::Ok
            } else {
                CheckStatus::Error
            }
        };
        checks.push(check(
            &format!("coherence_ca_{}", record.year),
            "Cohérence du chiffre d'affaires extrait",
            status,
            format!(
                "Exercice {}: CA extrait {:.0} €, CA SIG {:.0} €",
                record.year, extracted, sig.chiffre_affaires
            ),
        ));
    }

    // Year coverage between raw records and SIG records.
    let status = if records.len() == accounting.sig_records.len() {
        CheckStatus::Ok
    } else {
        CheckStatus::Error
    };
    checks.push(check(
        "coherence_exercices",
        "Couverture des exercices analysés",
        status,
        format!(
            "{} exercice(s) extraits, {} SIG calculés",
            records.len(),
            accounting.sig_records.len()
        ),
    ));

    // A high valuation should not coexist silently with poor health.
    if let Some(synthesis) = valuation.and_then(|v| v.synthesis.as_ref()) {
        let ebe = accounting
            .retraitement
            .as_ref()
            .map(|r| r.ebe_normatif)
            .or_else(|| accounting.sig_records.last().map(|s| s.ebe.value))
            .unwrap_or(0.0);
        let status = if accounting.health.overall < 30.0 && ebe > 0.0
            && synthesis.valeur_mediane > 4.5 * ebe
        {
            CheckStatus::Warning
        } else {
            CheckStatus::Ok
        };
        checks.push(check(
            "coherence_valorisation",
            "Valorisation vs santé financière",
            status,
            format!(
                "Valeur médiane {:.0} € pour un score santé {}/100",
                synthesis.valeur_mediane, accounting.health.overall
            ),
        ));
    }

    checks
}

fn detect_anomalies(records: &[FiscalYearRecord], ratios: Option<&RatioSet>) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    let mut push = |code: &str, severity: Severity, description: String| {
        anomalies.push(Anomaly {
            code: code.to_string(),
            severity,
            description,
        });
    };

    if let Some(ratios) = ratios {
        if let Some(j) = ratios.delai_clients_jours {
            if j > 180.0 {
                push(
                    "delai_clients_excessif",
                    Severity::Warning,
                    format!("Délai de règlement clients anormal: {:.0} jours", j),
                );
            }
        }
        if let Some(t) = ratios.taux_endettement_pct {
            if t > 300.0 {
                push(
                    "surendettement",
                    Severity::Critical,
                    format!("Taux d'endettement de {:.0}% des fonds propres", t),
                );
            }
        }
        if let Some(caf) = ratios.capacite_autofinancement {
            if caf < 0.0 {
                push(
                    "caf_negative",
                    Severity::Critical,
                    format!("Capacité d'autofinancement négative: {:.0} €", caf),
                );
            }
        }
        if let Some(rot) = ratios.rotation_stocks_jours {
            if rot > 120.0 {
                push(
                    "stocks_dormants",
                    Severity::Info,
                    format!("Rotation des stocks lente: {:.0} jours", rot),
                );
            }
        }
    }

    for record in records {
        if let (Some(ca), Some(achats)) = (record.chiffre_affaires, record.achats_marchandises) {
            if achats > ca {
                push(
                    "achats_superieurs_ca",
                    Severity::Warning,
                    format!(
                        "Exercice {}: achats ({:.0} €) supérieurs au CA ({:.0} €)",
                        record.year, achats, ca
                    ),
                );
            }
        }
    }

    anomalies
}

fn anomaly_resultat_net(accounting: &AccountingOutput) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    for sig in &accounting.sig_records {
        if sig.chiffre_affaires > 0.0 && sig.resultat_net.value > sig.chiffre_affaires {
            anomalies.push(Anomaly {
                code: "resultat_superieur_ca".to_string(),
                severity: Severity::Critical,
                description: format!(
                    "Exercice {}: résultat net ({:.0} €) supérieur au CA ({:.0} €), extraction suspecte",
                    sig.year, sig.resultat_net.value, sig.chiffre_affaires
                ),
            });
        }
    }
    anomalies
}

fn completeness(records: &[FiscalYearRecord], real_estate: Option<&RealEstateOutput>) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    // Three exercices are the baseline for a trustworthy analysis, so a
    // shorter history counts its absent years as missing lines.
    let expected_per_year = 9.0;
    let expected_years = records.len().max(EXPECTED_FISCAL_YEARS);
    let expected = expected_years as f64 * expected_per_year + 1.0;

    let mut present = 0.0;
    for record in records {
        present += expected_per_year - record.missing_lines().len() as f64;
    }
    // Lease availability contributes one slot.
    if real_estate.map(|re| !re.degraded).unwrap_or(false) {
        present += 1.0;
    }
    clamp_score(present / expected * 100.0).round()
}

fn reliability(anomalies: &[Anomaly]) -> f64 {
    let penalty: f64 = anomalies
        .iter()
        .map(|a| match a.severity {
            Severity::Critical => 25.0,
            Severity::Warning => 10.0,
            Severity::Info => 3.0,
        })
        .sum();
    clamp_score(100.0 - penalty)
}

fn recency(records: &[FiscalYearRecord], current_year: i32) -> f64 {
    let Some(latest) = records.last() else { return 0.0 };
    match current_year.saturating_sub(latest.year) {
        i32::MIN..=1 => 100.0,
        2 => 80.0,
        3 => 60.0,
        _ => 40.0,
    }
}

fn build_alerts(
    accounting: &AccountingOutput,
    anomalies: &[Anomaly],
    checks: &[CoherenceCheck],
    points_bloquants: &[String],
) -> Vec<DeterministicAlert> {
    // Fixed emission order: blocking points, failed checks, anomalies by
    // rule order, then limitations. No map iteration is involved anywhere,
    // so the list is reproducible byte for byte.
    let mut alerts = Vec::new();

    for (i, point) in points_bloquants.iter().enumerate() {
        alerts.push(DeterministicAlert {
            id: format!("bloquant-{:02}", i + 1),
            category: "points_bloquants".to_string(),
            severity: Severity::Critical,
            message: point.clone(),
        });
    }

    for check in checks {
        if check.status != CheckStatus::Ok {
            let severity = match check.status {
                CheckStatus::Error => Severity::Critical,
                _ => Severity::Warning,
            };
            alerts.push(DeterministicAlert {
                id: format!("check-{}", check.id),
                category: "coherence".to_string(),
                severity,
                message: format!("{}: {}", check.label, check.details),
            });
        }
    }

    for anomaly in anomalies {
        alerts.push(DeterministicAlert {
            id: format!("anomalie-{}", anomaly.code),
            category: "anomalie".to_string(),
            severity: anomaly.severity,
            message: anomaly.description.clone(),
        });
    }

    for (i, limitation) in accounting.limitations.iter().enumerate() {
        alerts.push(DeterministicAlert {
            id: format!("limite-{:02}", i + 1),
            category: "limitation".to_string(),
            severity: Severity::Info,
            message: limitation.clone(),
        });
    }

    alerts
}

/// Validation stage entry point. Pure: no clock, no randomness — the caller
/// provides `current_year` so recency stays reproducible.
pub fn run_validation(
    records: &[FiscalYearRecord],
    accounting: &AccountingOutput,
    valuation: Option<&ValuationOutput>,
    real_estate: Option<&RealEstateOutput>,
    current_year: i32,
) -> ValidationOutput {
    let checks = coherence_checks(records, accounting, valuation);

    let mut anomalies = detect_anomalies(records, accounting.ratios.as_ref());
    anomalies.extend(anomaly_resultat_net(accounting));

    let mut points_bloquants = Vec::new();
    if accounting.degraded {
        points_bloquants.push(
            "Aucune donnée comptable exploitable: la valorisation et le prévisionnel reposent sur des valeurs nulles"
                .to_string(),
        );
    }

    let completude = completeness(records, real_estate);
    let fiabilite = reliability(&anomalies);
    let recence = recency(records, current_year);
    let overall = if records.is_empty() {
        0.0
    } else {
        clamp_score(round0(
            completude * POIDS_COMPLETUDE + fiabilite * POIDS_FIABILITE + recence * POIDS_RECENCE,
        ))
    };

    let confidence = ConfidenceScore {
        overall,
        completude,
        fiabilite,
        recence,
    };

    let alerts = build_alerts(accounting, &anomalies, &checks, &points_bloquants);

    info!(
        "Validation stage: confiance {}/100, {} alerte(s)",
        confidence.overall,
        alerts.len()
    );

    ValidationOutput {
        checks,
        anomalies,
        confidence,
        alerts,
        points_bloquants,
    }
}
