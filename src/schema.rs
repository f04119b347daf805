use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key names the upstream extractor is expected to emit in
/// [`FiscalDocument::key_values`]. Unknown keys are ignored; missing keys
/// become reported gaps, never errors.
pub const KNOWN_FISCAL_KEYS: &[&str] = &[
    "chiffre_affaires",
    "achats_marchandises",
    "charges_externes",
    "charges_personnel",
    "charges_exploitant",
    "dotations_amortissements",
    "resultat_financier",
    "resultat_exceptionnel",
    "charges_exceptionnelles",
    "produits_exceptionnels",
    "impots",
    "stock",
    "creances_clients",
    "dettes_fournisseurs",
    "total_actif",
    "total_dettes",
    "fonds_propres",
    "loyer_annuel",
    "surface",
    "commissions_nettes",
    "ca_boutique",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    #[schemars(description = "Bilan comptable (balance sheet)")]
    Bilan,

    #[schemars(description = "Compte de resultat (income statement)")]
    CompteResultat,

    #[schemars(description = "Liasse fiscale 2033/2050 (tax bundle, mixed content)")]
    LiasseFiscale,

    #[schemars(description = "Bail commercial (commercial lease)")]
    BailCommercial,

    #[schemars(description = "Any other scanned document (ignored by the engines)")]
    Autre,
}

/// A table extracted by the upstream vision/OCR collaborator. Carried through
/// untouched so the narrator can cite original cells; the engines only read
/// [`FiscalDocument::key_values`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedTable {
    #[schemars(description = "Table title as printed on the document, if any")]
    pub title: Option<String>,

    #[schemars(description = "Row-major cell text")]
    pub rows: Vec<Vec<String>>,
}

/// One scanned accounting document, already structured by the external
/// extractor. An empty document set means degraded mode, not an error.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FiscalDocument {
    pub filename: String,

    pub document_type: DocumentType,

    #[schemars(description = "Fiscal year the document covers (e.g. 2023)")]
    pub year: i32,

    #[serde(default)]
    pub tables: Vec<ExtractedTable>,

    #[serde(default)]
    #[schemars(
        description = "Named monetary figures extracted from the document, in euros. Keys should match the published key list (chiffre_affaires, achats_marchandises, ...)."
    )]
    pub key_values: BTreeMap<String, f64>,
}

/// One fiscal year of accounting line items, consolidated from every
/// document covering that year. All figures are optional: a missing line is
/// treated as zero downstream and reported as a gap.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FiscalYearRecord {
    pub year: i32,
    pub chiffre_affaires: Option<f64>,
    pub achats_marchandises: Option<f64>,
    pub charges_externes: Option<f64>,
    pub charges_personnel: Option<f64>,
    pub charges_exploitant: Option<f64>,
    pub dotations_amortissements: Option<f64>,
    pub resultat_financier: Option<f64>,
    pub resultat_exceptionnel: Option<f64>,
    pub charges_exceptionnelles: Option<f64>,
    pub produits_exceptionnels: Option<f64>,
    pub impots: Option<f64>,
    pub stock: Option<f64>,
    pub creances_clients: Option<f64>,
    pub dettes_fournisseurs: Option<f64>,
    pub total_actif: Option<f64>,
    pub total_dettes: Option<f64>,
    pub fonds_propres: Option<f64>,
    pub loyer_annuel: Option<f64>,
    /// Net commissions on regulated products (tabac, presse, jeux).
    pub commissions_nettes: Option<f64>,
    /// Free-trade counter revenue of a regulated-retail business.
    pub ca_boutique: Option<f64>,
}

impl FiscalYearRecord {
    fn set_key(&mut self, key: &str, value: f64) {
        let slot = match key {
            "chiffre_affaires" => &mut self.chiffre_affaires,
            "achats_marchandises" => &mut self.achats_marchandises,
            "charges_externes" => &mut self.charges_externes,
            "charges_personnel" => &mut self.charges_personnel,
            "charges_exploitant" => &mut self.charges_exploitant,
            "dotations_amortissements" => &mut self.dotations_amortissements,
            "resultat_financier" => &mut self.resultat_financier,
            "resultat_exceptionnel" => &mut self.resultat_exceptionnel,
            "charges_exceptionnelles" => &mut self.charges_exceptionnelles,
            "produits_exceptionnels" => &mut self.produits_exceptionnels,
            "impots" => &mut self.impots,
            "stock" => &mut self.stock,
            "creances_clients" => &mut self.creances_clients,
            "dettes_fournisseurs" => &mut self.dettes_fournisseurs,
            "total_actif" => &mut self.total_actif,
            "total_dettes" => &mut self.total_dettes,
            "fonds_propres" => &mut self.fonds_propres,
            "loyer_annuel" => &mut self.loyer_annuel,
            "commissions_nettes" => &mut self.commissions_nettes,
            "ca_boutique" => &mut self.ca_boutique,
            _ => return,
        };
        *slot = Some(value);
    }

    /// Consolidates extracted documents into one record per fiscal year,
    /// sorted ascending. Documents are applied in input order, so a later
    /// document for the same year wins on overlapping keys.
    pub fn from_documents(documents: &[FiscalDocument]) -> Vec<FiscalYearRecord> {
        let mut by_year: BTreeMap<i32, FiscalYearRecord> = BTreeMap::new();

        for doc in documents {
            if doc.document_type == DocumentType::Autre {
                continue;
            }
            let record = by_year.entry(doc.year).or_insert_with(|| FiscalYearRecord {
                year: doc.year,
                ..Default::default()
            });
            for (key, value) in &doc.key_values {
                record.set_key(key, *value);
            }
        }

        by_year.into_values().collect()
    }

    /// Names of the expected lines that are absent on this record. Used by
    /// the confidence score's completeness dimension.
    pub fn missing_lines(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        let checks: [(&'static str, bool); 9] = [
            ("chiffre_affaires", self.chiffre_affaires.is_none()),
            ("achats_marchandises", self.achats_marchandises.is_none()),
            ("charges_externes", self.charges_externes.is_none()),
            ("charges_personnel", self.charges_personnel.is_none()),
            (
                "dotations_amortissements",
                self.dotations_amortissements.is_none(),
            ),
            ("impots", self.impots.is_none()),
            ("stock", self.stock.is_none()),
            ("total_actif", self.total_actif.is_none()),
            ("total_dettes", self.total_dettes.is_none()),
        ];
        for (name, absent) in checks {
            if absent {
                missing.push(name);
            }
        }
        missing
    }
}

/// Identity of the target business. The activity code (NAF/APE) drives every
/// sector coefficient lookup; an unknown or absent code falls back to the
/// generic sector row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct BusinessInfo {
    pub name: String,

    #[schemars(description = "SIRET number, when known")]
    pub siret: Option<String>,

    #[schemars(description = "NAF/APE activity code, e.g. '1071C' for a boulangerie")]
    pub activity_code: Option<String>,

    pub activity_label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PropertyCondition {
    Neuf,
    Bon,
    Moyen,
    Degrade,
}

/// Commercial lease terms, either extracted from a bail document or entered
/// manually. Manual input takes precedence over extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct LeaseInput {
    #[schemars(description = "Annual rent excluding charges, in euros")]
    pub loyer_annuel: Option<f64>,

    #[schemars(description = "Commercial surface in square meters")]
    pub surface: Option<f64>,

    #[schemars(description = "Market rent reference for the area, in euros per square meter per year")]
    pub loyer_marche_m2: Option<f64>,

    pub date_debut: Option<NaiveDate>,
    pub date_fin: Option<NaiveDate>,

    #[schemars(description = "Indexation clause (ILC, ILAT, ...)")]
    pub indexation: Option<String>,

    pub etat_local: Option<PropertyCondition>,
}

impl LeaseInput {
    pub fn is_empty(&self) -> bool {
        self.loyer_annuel.is_none() && self.surface.is_none()
    }
}

/// Macro hypotheses for the 5-year business plan. Every field is optional;
/// the projection engine substitutes conservative defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ProjectionHypotheses {
    #[schemars(description = "Baseline annual revenue growth in percent (default 1.0)")]
    pub croissance_annuelle_pct: Option<f64>,

    #[schemars(description = "One-time revenue uplift from extended opening hours, percent, applied from year 1")]
    pub impact_horaires_pct: Option<f64>,

    #[schemars(description = "Revenue uplift from renovation, percent, applied from year 2 onward")]
    pub impact_travaux_pct: Option<f64>,

    #[schemars(description = "Annual staffing cost change in euros (positive = extra cost)")]
    pub variation_masse_salariale: Option<f64>,

    #[schemars(description = "Acquisition loan principal in euros")]
    pub emprunt_montant: Option<f64>,

    #[schemars(description = "Annual loan rate in percent")]
    pub emprunt_taux_pct: Option<f64>,

    #[schemars(description = "Loan duration in years")]
    pub emprunt_duree_annees: Option<u32>,

    #[schemars(description = "Total invested amount: price, works, fees and working capital")]
    pub investissement_total: Option<f64>,
}

/// Manual figures the buyer supplies to refine the analysis. All optional;
/// each one takes precedence over the corresponding extracted value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct UserOverrides {
    #[schemars(description = "Asking price announced by the seller, in euros")]
    pub prix_demande: Option<f64>,

    #[schemars(description = "Manual lease terms, merged over any extracted bail")]
    pub bail: Option<LeaseInput>,

    #[schemars(description = "Renegotiated annual rent the buyer expects to obtain")]
    pub loyer_negocie: Option<f64>,

    #[schemars(description = "Whether existing staff will be retained after the sale")]
    pub reprise_personnel: Option<bool>,

    #[schemars(description = "Annual payroll of staff NOT retained (reintegrated into normalized EBE)")]
    pub masse_salariale_non_reprise: Option<f64>,

    #[schemars(description = "Annual cost of planned seasonal hires (deducted from normalized EBE)")]
    pub cout_embauches_saisonnieres: Option<f64>,

    #[schemars(description = "Owner compensation to reintegrate, when known precisely")]
    pub salaire_dirigeant: Option<f64>,

    #[schemars(description = "Asking price of the walls, when buying the building is an option")]
    pub prix_murs: Option<f64>,

    #[schemars(description = "Estimated revaluation delta on fixed assets for the patrimonial method")]
    pub revalorisation_actifs: Option<f64>,

    #[serde(default)]
    pub hypotheses: ProjectionHypotheses,
}

impl UserOverrides {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(UserOverrides)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }

    /// Rejects overrides that no honest input can produce. Absent values are
    /// always valid; only supplied figures are checked.
    pub fn validate(&self) -> crate::error::Result<()> {
        let non_negative: [(&str, Option<f64>); 7] = [
            ("prix_demande", self.prix_demande),
            ("loyer_negocie", self.loyer_negocie),
            ("masse_salariale_non_reprise", self.masse_salariale_non_reprise),
            ("cout_embauches_saisonnieres", self.cout_embauches_saisonnieres),
            ("salaire_dirigeant", self.salaire_dirigeant),
            ("prix_murs", self.prix_murs),
            ("emprunt_montant", self.hypotheses.emprunt_montant),
        ];
        for (target, value) in non_negative {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(crate::error::AnalysisError::InvalidOverride {
                        target: target.to_string(),
                        details: format!("valeur négative ou non finie: {}", v),
                    });
                }
            }
        }
        if self.hypotheses.emprunt_duree_annees == Some(0) {
            return Err(crate::error::AnalysisError::InvalidOverride {
                target: "emprunt_duree_annees".to_string(),
                details: "une durée d'emprunt nulle est impossible".to_string(),
            });
        }
        Ok(())
    }
}

impl FiscalDocument {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(FiscalDocument)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(year: i32, ty: DocumentType, pairs: &[(&str, f64)]) -> FiscalDocument {
        FiscalDocument {
            filename: format!("doc-{}.pdf", year),
            document_type: ty,
            year,
            tables: vec![],
            key_values: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn test_from_documents_merges_by_year() {
        let docs = vec![
            doc(
                2023,
                DocumentType::CompteResultat,
                &[("chiffre_affaires", 500_000.0), ("achats_marchandises", 300_000.0)],
            ),
            doc(
                2023,
                DocumentType::Bilan,
                &[("total_actif", 220_000.0), ("total_dettes", 90_000.0)],
            ),
            doc(2022, DocumentType::CompteResultat, &[("chiffre_affaires", 460_000.0)]),
        ];

        let records = FiscalYearRecord::from_documents(&docs);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].year, 2022);
        assert_eq!(records[1].year, 2023);
        assert_eq!(records[1].chiffre_affaires, Some(500_000.0));
        assert_eq!(records[1].total_actif, Some(220_000.0));
    }

    #[test]
    fn test_later_document_wins_on_overlap() {
        let docs = vec![
            doc(2023, DocumentType::LiasseFiscale, &[("chiffre_affaires", 480_000.0)]),
            doc(2023, DocumentType::CompteResultat, &[("chiffre_affaires", 500_000.0)]),
        ];
        let records = FiscalYearRecord::from_documents(&docs);
        assert_eq!(records[0].chiffre_affaires, Some(500_000.0));
    }

    #[test]
    fn test_unclassified_documents_are_skipped() {
        let docs = vec![doc(2023, DocumentType::Autre, &[("chiffre_affaires", 1.0)])];
        assert!(FiscalYearRecord::from_documents(&docs).is_empty());
    }

    #[test]
    fn test_missing_lines() {
        let record = FiscalYearRecord {
            year: 2023,
            chiffre_affaires: Some(100.0),
            ..Default::default()
        };
        let missing = record.missing_lines();
        assert!(!missing.contains(&"chiffre_affaires"));
        assert!(missing.contains(&"total_actif"));
    }

    #[test]
    fn test_override_schema_generation() {
        let schema = UserOverrides::schema_as_json().unwrap();
        assert!(schema.contains("prix_demande"));
        assert!(schema.contains("loyer_negocie"));
        assert!(schema.contains("hypotheses"));
    }

    #[test]
    fn test_document_schema_generation() {
        let schema = FiscalDocument::schema_as_json().unwrap();
        assert!(schema.contains("document_type"));
        assert!(schema.contains("key_values"));
    }

    #[test]
    fn test_override_validation() {
        assert!(UserOverrides::default().validate().is_ok());

        let negative = UserOverrides {
            prix_demande: Some(-1.0),
            ..Default::default()
        };
        assert!(negative.validate().is_err());

        let zero_term = UserOverrides {
            hypotheses: ProjectionHypotheses {
                emprunt_duree_annees: Some(0),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(zero_term.validate().is_err());
    }
}
