//! # Business Acquisition Analyzer
//!
//! A deterministic analysis library for valuing small French businesses
//! (boulangeries, restaurants, tabacs-presse, salons...) from their fiscal
//! documents, ahead of an acquisition.
//!
//! ## Core Concepts
//!
//! - **Fiscal records**: per-year lines merged from extracted documents (bilan,
//!   compte de résultat, liasse fiscale, bail commercial)
//! - **SIG cascade**: the French soldes intermédiaires de gestion, from marge
//!   commerciale down to résultat net
//! - **EBE retraité**: the accounting EBE normalized to the buyer's real
//!   earning power through signed adjustments
//! - **Sector benchmarking**: NAF/APE-prefixed coefficient table with a
//!   generic fallback row
//! - **Valuation synthesis**: EBE-multiple, revenue-percentage, patrimonial
//!   and hybrid (regulated retail) methods blended into one range
//! - **Degraded mode**: every stage yields a well-formed output on missing
//!   data; nothing short of a contractual error aborts a session
//!
//! ## Example
//!
//! ```rust,ignore
//! use business_acquisition_analyzer::*;
//!
//! let business = BusinessInfo {
//!     name: "Boulangerie du Marché".to_string(),
//!     siret: None,
//!     activity_code: Some("1071C".to_string()),
//!     activity_label: None,
//! };
//!
//! let state = analyze(business, documents, UserOverrides::default(), 2024);
//! for section in state.sections_included() {
//!     println!("section ready: {section}");
//! }
//! if let Some(valuation) = &state.valuation {
//!     if let Some(synthesis) = &valuation.synthesis {
//!         println!(
//!             "valeur: {} - {} (médiane {})",
//!             synthesis.valeur_basse, synthesis.valeur_haute, synthesis.valeur_mediane
//!         );
//!     }
//! }
//! ```

pub mod accounting;
pub mod error;
pub mod health;
pub mod pipeline;
pub mod projection;
pub mod realestate;
pub mod schema;
pub mod sector;
pub mod utils;
pub mod validation;
pub mod valuation;

pub use accounting::{
    compute_ratios, compute_retraitement, compute_sig, compute_trend, run_accounting,
    AccountingOutput, AdjustmentKind, AdjustmentSource, EbeAdjustment, EbeRetraitement, RatioSet,
    SigLine, SigRecord, TrendEvaluation,
};
pub use error::{AnalysisError, Result};
pub use health::{score_health, HealthScore};
pub use pipeline::{analyze, AnalysisState, Pipeline, Stage, StageFailure};
pub use projection::{run_projection, BankIndicators, BusinessPlanProjection, ProjectionOutput};
pub use realestate::{
    analyze_lease, estimate_droit_au_bail, run_real_estate, LeaseAppreciation, LeaseRecord,
    PropertyPurchaseAnalysis, RealEstateOutput, RenovationEstimate,
};
pub use schema::*;
pub use sector::{benchmark_ratios, lookup_sector, SectorBenchmark, SectorProfile};
pub use utils::*;
pub use validation::{
    run_validation, Anomaly, CoherenceCheck, ConfidenceScore, DeterministicAlert, Severity,
    ValidationOutput,
};
pub use valuation::{
    compare_price, run_valuation, HybridMode, LocationClass, MethodKind, PriceCategory,
    PriceComparison, ValuationOutput, ValuationRequest, ValuationSynthesis,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn liasse(year: i32, ca: f64) -> FiscalDocument {
        let pairs: BTreeMap<String, f64> = BTreeMap::from([
            ("chiffre_affaires".to_string(), ca),
            ("achats_marchandises".to_string(), ca * 0.50),
            ("charges_externes".to_string(), ca * 0.15),
            ("charges_personnel".to_string(), ca * 0.12),
            ("dotations_amortissements".to_string(), ca * 0.03),
            ("impots".to_string(), ca * 0.02),
            ("stock".to_string(), 12_000.0),
            ("total_actif".to_string(), 180_000.0),
            ("total_dettes".to_string(), 70_000.0),
            ("fonds_propres".to_string(), 90_000.0),
        ]);
        FiscalDocument {
            filename: format!("liasse-{year}.pdf"),
            document_type: DocumentType::LiasseFiscale,
            year,
            tables: vec![],
            key_values: pairs,
        }
    }

    #[test]
    fn test_public_api_end_to_end() {
        let business = BusinessInfo {
            name: "Boulangerie Test".to_string(),
            siret: None,
            activity_code: Some("1071C".to_string()),
            activity_label: None,
        };
        let docs = vec![
            liasse(2021, 400_000.0),
            liasse(2022, 420_000.0),
            liasse(2023, 440_000.0),
        ];

        let state = analyze(business, docs, UserOverrides::default(), 2024);

        assert!(state.failures.is_empty());
        assert_eq!(state.sections_included().len(), 5);

        let accounting = state.accounting.as_ref().unwrap();
        assert_eq!(accounting.sig_records.len(), 3);
        assert!(accounting.health.overall > 0.0);

        let synthesis = state
            .valuation
            .as_ref()
            .and_then(|v| v.synthesis.as_ref())
            .unwrap();
        assert!(synthesis.valeur_basse <= synthesis.valeur_mediane);
        assert!(synthesis.valeur_mediane <= synthesis.valeur_haute);
    }

    #[test]
    fn test_sector_lookup_is_reexported() {
        let (sector, fallback) = lookup_sector(Some("1071C"));
        assert!(!fallback);
        assert_eq!(sector.code_prefix, "1071");
    }
}
