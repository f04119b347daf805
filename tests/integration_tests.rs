use business_acquisition_analyzer::*;
use std::collections::BTreeMap;

fn doc(year: i32, document_type: DocumentType, pairs: &[(&str, f64)]) -> FiscalDocument {
    FiscalDocument {
        filename: format!("{:?}-{}.pdf", document_type, year),
        document_type,
        year,
        tables: vec![],
        key_values: pairs
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect::<BTreeMap<String, f64>>(),
    }
}

/// Three clean exercices for a boulangerie. The 2023 lines are chosen so the
/// SIG cascade lands on round figures: marge 350 000, VA 290 000, EBE
/// 140 000, résultat net 108 000.
fn boulangerie_documents() -> Vec<FiscalDocument> {
    [460_000.0, 480_000.0, 500_000.0]
        .iter()
        .enumerate()
        .map(|(i, &ca)| {
            doc(
                2021 + i as i32,
                DocumentType::LiasseFiscale,
                &[
                    ("chiffre_affaires", ca),
                    ("achats_marchandises", ca * 0.30),
                    ("charges_externes", ca * 0.12),
                    ("charges_personnel", ca * 0.30),
                    ("dotations_amortissements", ca * 0.04),
                    ("impots", ca * 0.024),
                    ("stock", 18_000.0),
                    ("creances_clients", 5_000.0),
                    ("dettes_fournisseurs", 25_000.0),
                    ("total_actif", 250_000.0),
                    ("total_dettes", 100_000.0),
                    ("fonds_propres", 120_000.0),
                    ("loyer_annuel", 24_000.0),
                ],
            )
        })
        .collect()
}

fn boulangerie() -> BusinessInfo {
    BusinessInfo {
        name: "Boulangerie du Marché".to_string(),
        siret: Some("12345678900012".to_string()),
        activity_code: Some("1071C".to_string()),
        activity_label: Some("Boulangerie-pâtisserie".to_string()),
    }
}

#[test]
fn test_boulangerie_full_analysis() {
    let state = analyze(
        boulangerie(),
        boulangerie_documents(),
        UserOverrides::default(),
        2024,
    );

    assert!(state.failures.is_empty(), "failures: {:?}", state.failures);
    assert_eq!(state.sections_included().len(), 5);

    // SIG cascade on the latest year
    let accounting = state.accounting.as_ref().unwrap();
    let sig = accounting.sig_records.last().unwrap();
    assert_eq!(sig.year, 2023);
    assert!((sig.marge_commerciale.value - 350_000.0).abs() < 0.01);
    assert!((sig.marge_commerciale.pct_of_revenue - 70.0).abs() < 0.01);
    assert!((sig.valeur_ajoutee.value - 290_000.0).abs() < 0.01);
    assert!((sig.ebe.value - 140_000.0).abs() < 0.01);
    assert!((sig.resultat_exploitation.value - 120_000.0).abs() < 0.01);
    assert!((sig.resultat_net.value - 108_000.0).abs() < 0.01);
    assert!(accounting.gaps.is_empty());

    // No adjustment inputs, so the normalized EBE equals the accounting one
    let retraitement = accounting.retraitement.as_ref().unwrap();
    assert!(retraitement.retraitements.is_empty());
    assert!((retraitement.ebe_normatif - 140_000.0).abs() < 0.01);

    // EBE multiple for a boulangerie: coefficients 2.8 / 3.5 / 4.2
    let valuation = state.valuation.as_ref().unwrap();
    let ebe_method = valuation
        .methods
        .iter()
        .find(|m| m.method == MethodKind::MultipleEbe)
        .unwrap();
    assert!((ebe_method.valeur_basse - 392_000.0).abs() < 1.0);
    assert!((ebe_method.valeur_mediane - 490_000.0).abs() < 1.0);
    assert!((ebe_method.valeur_haute - 588_000.0).abs() < 1.0);

    // Profitable business with a modest actif net: EBE method leads the blend
    let synthesis = valuation.synthesis.as_ref().unwrap();
    assert_eq!(synthesis.methode_preferee, MethodKind::MultipleEbe);
    assert!(synthesis.valeur_basse <= synthesis.valeur_mediane);
    assert!(synthesis.valeur_mediane <= synthesis.valeur_haute);
    let weight_sum: f64 = synthesis.ponderations.iter().map(|(_, w)| w).sum();
    assert!((weight_sum - 1.0).abs() < 1e-9);

    // Steadily growing revenue reads as favorable
    let trend = accounting.trend.as_ref().unwrap();
    assert!(trend.ca_evolution_pct.unwrap() > 5.0);

    let validation = state.validation.as_ref().unwrap();
    assert!(validation.points_bloquants.is_empty());
    assert!(validation.confidence.overall > 50.0);
}

#[test]
fn test_boulangerie_buyer_scenario_with_financing() {
    let overrides = UserOverrides {
        prix_demande: Some(520_000.0),
        salaire_dirigeant: Some(36_000.0),
        hypotheses: ProjectionHypotheses {
            croissance_annuelle_pct: Some(2.0),
            emprunt_montant: Some(210_000.0),
            emprunt_taux_pct: Some(4.0),
            emprunt_duree_annees: Some(7),
            investissement_total: Some(250_000.0),
            ..Default::default()
        },
        ..Default::default()
    };

    let state = analyze(boulangerie(), boulangerie_documents(), overrides, 2024);
    assert!(state.failures.is_empty());

    // Owner salary flows into the normalized EBE
    let retraitement = state
        .accounting
        .as_ref()
        .unwrap()
        .retraitement
        .as_ref()
        .unwrap();
    assert!((retraitement.ebe_normatif - 176_000.0).abs() < 0.01);

    let synthesis = state
        .valuation
        .as_ref()
        .unwrap()
        .synthesis
        .as_ref()
        .unwrap();
    let comparison = synthesis.comparaison_prix.as_ref().unwrap();
    assert_eq!(comparison.prix_demande, 520_000.0);

    // 210 000 € at 4% over 7 years: fixed annuity near 34 988 €
    let projection = state.projection.as_ref().unwrap();
    assert!(!projection.degraded);
    assert_eq!(projection.plan.years.len(), 6);
    assert_eq!(projection.plan.years[0].annuite, 0.0);
    assert!((projection.plan.years[1].annuite - 34_988.0).abs() < 2.0);

    let indicators = &projection.indicators;
    assert!(indicators.ratio_couverture.unwrap() > 1.0);
    assert!(indicators.point_mort.is_some());
    assert!(indicators.roi_pct.is_some());
}

#[test]
fn test_tabac_presse_hybrid_valuation() {
    let business = BusinessInfo {
        name: "Tabac de la Gare".to_string(),
        siret: None,
        activity_code: Some("4726Z".to_string()),
        activity_label: Some("Tabac-presse".to_string()),
    };
    let documents: Vec<FiscalDocument> = [2021, 2022, 2023]
        .iter()
        .map(|&year| {
            doc(
                year,
                DocumentType::LiasseFiscale,
                &[
                    ("chiffre_affaires", 210_000.0),
                    ("achats_marchandises", 95_000.0),
                    ("charges_externes", 25_000.0),
                    ("charges_personnel", 30_000.0),
                    ("dotations_amortissements", 8_000.0),
                    ("impots", 4_000.0),
                    ("stock", 30_000.0),
                    ("total_actif", 160_000.0),
                    ("total_dettes", 60_000.0),
                    ("fonds_propres", 85_000.0),
                    ("commissions_nettes", 90_000.0),
                    ("ca_boutique", 120_000.0),
                ],
            )
        })
        .collect();

    let request = ValuationRequest {
        hybrid_mode: HybridMode::CompareClassical,
        location: Some(LocationClass::CentreVille),
    };
    let state = Pipeline::new()
        .with_valuation_request(request)
        .run(AnalysisState::new(
            business,
            documents,
            UserOverrides::default(),
            2024,
        ));

    assert!(state.failures.is_empty());
    let valuation = state.valuation.as_ref().unwrap();
    let synthesis = valuation.synthesis.as_ref().unwrap();

    // Centre-ville: 90 000 × 3.0 + 120 000 × 18.5% = 292 200 median,
    // 90 000 × 2.7 + 120 000 × 12% = 257 400 low,
    // 90 000 × 3.2 + 120 000 × 25% = 318 000 high.
    assert_eq!(synthesis.methode_preferee, MethodKind::HybrideReglemente);
    assert!((synthesis.valeur_mediane - 292_200.0).abs() < 1.0);
    assert!((synthesis.valeur_basse - 257_400.0).abs() < 1.0);
    assert!((synthesis.valeur_haute - 318_000.0).abs() < 1.0);
    assert_eq!(
        synthesis.ponderations,
        vec![(MethodKind::HybrideReglemente, 1.0)]
    );

    // Comparison mode keeps the classical methods alongside
    assert!(!valuation.comparison_methods.is_empty());
}

#[test]
fn test_lease_and_property_analysis() {
    let mut documents = boulangerie_documents();
    documents.push(doc(
        2023,
        DocumentType::BailCommercial,
        &[("loyer_annuel", 24_000.0), ("surface", 120.0)],
    ));

    let overrides = UserOverrides {
        prix_murs: Some(300_000.0),
        ..Default::default()
    };
    let state = analyze(boulangerie(), documents, overrides, 2024);

    let real_estate = state.real_estate.as_ref().unwrap();
    let lease = real_estate.lease.as_ref().unwrap();
    assert_eq!(lease.loyer_annuel, 24_000.0);
    assert_eq!(lease.loyer_m2, Some(200.0));

    // 24 000 / 300 000 = 8% gross yield: buying the walls beats renting
    let purchase = real_estate.purchase.as_ref().unwrap();
    assert!((purchase.rendement_brut_pct - 8.0).abs() < 0.01);
}

#[test]
fn test_zero_documents_is_degraded_not_fatal() {
    let state = analyze(boulangerie(), vec![], UserOverrides::default(), 2024);

    assert_eq!(state.sections_included().len(), 5);

    let accounting = state.accounting.as_ref().unwrap();
    assert!(accounting.degraded);
    assert!(accounting.sig_records.is_empty());
    assert_eq!(accounting.health.overall, 0.0);

    let valuation = state.valuation.as_ref().unwrap();
    assert!(valuation.degraded);
    assert!(valuation.synthesis.is_none());

    let validation = state.validation.as_ref().unwrap();
    assert_eq!(validation.confidence.overall, 0.0);
    assert!(!validation.points_bloquants.is_empty());
    assert!(!validation.alerts.is_empty());

    assert!(state.projection.as_ref().unwrap().degraded);
}

#[test]
fn test_identical_sessions_produce_identical_json() -> anyhow::Result<()> {
    let run = || -> anyhow::Result<String> {
        let overrides = UserOverrides {
            prix_demande: Some(520_000.0),
            ..Default::default()
        };
        Ok(analyze(boulangerie(), boulangerie_documents(), overrides, 2024).to_json()?)
    };
    assert_eq!(run()?, run()?);
    Ok(())
}

#[test]
fn test_single_year_limits_trend_and_confidence() {
    let documents = vec![boulangerie_documents().pop().unwrap()];
    let state = analyze(boulangerie(), documents, UserOverrides::default(), 2024);

    let accounting = state.accounting.as_ref().unwrap();
    assert_eq!(accounting.sig_records.len(), 1);
    assert!(accounting.trend.is_none());
    assert!(!accounting.limitations.is_empty());

    let full = analyze(
        boulangerie(),
        boulangerie_documents(),
        UserOverrides::default(),
        2024,
    );
    let partial_confidence = state.validation.as_ref().unwrap().confidence.overall;
    let full_confidence = full.validation.as_ref().unwrap().confidence.overall;
    assert!(partial_confidence < full_confidence);
}

#[test]
fn test_unknown_sector_falls_back_to_generic() {
    let business = BusinessInfo {
        name: "Atelier Inconnu".to_string(),
        siret: None,
        activity_code: Some("9999Z".to_string()),
        activity_label: None,
    };
    let state = analyze(
        business,
        boulangerie_documents(),
        UserOverrides::default(),
        2024,
    );

    assert!(state.failures.is_empty());
    // The generic row still yields a complete valuation
    assert!(state
        .valuation
        .as_ref()
        .unwrap()
        .synthesis
        .is_some());
    let benchmark = state.accounting.as_ref().unwrap().benchmark.as_ref().unwrap();
    assert!(benchmark.generic_fallback);
}
