use crate::accounting::{run_accounting, AccountingOutput};
use crate::error::AnalysisError;
use crate::projection::{run_projection, ProjectionOutput};
use crate::realestate::{run_real_estate, RealEstateOutput};
use crate::schema::{BusinessInfo, DocumentType, FiscalDocument, FiscalYearRecord, LeaseInput, UserOverrides};
use crate::validation::{run_validation, ValidationOutput};
use crate::valuation::{run_valuation, ValuationOutput, ValuationRequest};
use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Accounting,
    Valuation,
    RealEstate,
    Validation,
    Projection,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Accounting,
        Stage::Valuation,
        Stage::RealEstate,
        Stage::Validation,
        Stage::Projection,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Accounting => "accounting",
            Stage::Valuation => "valuation",
            Stage::RealEstate => "real_estate",
            Stage::Validation => "validation",
            Stage::Projection => "projection",
        }
    }
}

/// A stage-scoped failure, recorded in state while the run continues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

/// The session-scoped shared state. One instance per analyzed business; each
/// stage output lives in its own named slice, written exactly once by the
/// stage that produces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisState {
    pub business: BusinessInfo,
    pub documents: Vec<FiscalDocument>,
    pub fiscal_records: Vec<FiscalYearRecord>,
    pub overrides: UserOverrides,
    pub accounting: Option<AccountingOutput>,
    pub valuation: Option<ValuationOutput>,
    pub real_estate: Option<RealEstateOutput>,
    pub validation: Option<ValidationOutput>,
    pub projection: Option<ProjectionOutput>,
    pub failures: Vec<StageFailure>,
    /// Reference year for recency scoring, fixed at session start so the
    /// whole run stays reproducible.
    pub current_year: i32,
}

impl AnalysisState {
    pub fn new(
        business: BusinessInfo,
        documents: Vec<FiscalDocument>,
        overrides: UserOverrides,
        current_year: i32,
    ) -> Self {
        let fiscal_records = FiscalYearRecord::from_documents(&documents);
        Self {
            business,
            documents,
            fiscal_records,
            overrides,
            accounting: None,
            valuation: None,
            real_estate: None,
            validation: None,
            projection: None,
            failures: Vec::new(),
            current_year,
        }
    }

    /// Manifest of the stage outputs present, for the downstream renderer to
    /// skip absent sections gracefully.
    pub fn sections_included(&self) -> Vec<&'static str> {
        let mut sections = Vec::new();
        if self.accounting.is_some() {
            sections.push(Stage::Accounting.name());
        }
        if self.valuation.is_some() {
            sections.push(Stage::Valuation.name());
        }
        if self.real_estate.is_some() {
            sections.push(Stage::RealEstate.name());
        }
        if self.validation.is_some() {
            sections.push(Stage::Validation.name());
        }
        if self.projection.is_some() {
            sections.push(Stage::Projection.name());
        }
        sections
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn extracted_lease(&self) -> Option<LeaseInput> {
        // Rent and surface extracted from a bail document, if one was scanned.
        let bail = self
            .documents
            .iter()
            .find(|d| d.document_type == DocumentType::BailCommercial)?;
        let lease = LeaseInput {
            loyer_annuel: bail.key_values.get("loyer_annuel").copied(),
            surface: bail.key_values.get("surface").copied(),
            ..Default::default()
        };
        if lease.is_empty() {
            None
        } else {
            Some(lease)
        }
    }
}

/// What each stage hands back to the orchestrator: one written slice of
/// state. Merging is additive and last-write-wins per slice.
enum StageDelta {
    Accounting(AccountingOutput),
    Valuation(ValuationOutput),
    RealEstate(RealEstateOutput),
    Validation(ValidationOutput),
    Projection(ProjectionOutput),
}

fn merge_delta(state: &mut AnalysisState, delta: StageDelta) {
    match delta {
        StageDelta::Accounting(out) => state.accounting = Some(out),
        StageDelta::Valuation(out) => state.valuation = Some(out),
        StageDelta::RealEstate(out) => state.real_estate = Some(out),
        StageDelta::Validation(out) => state.validation = Some(out),
        StageDelta::Projection(out) => state.projection = Some(out),
    }
}

/// The five-stage pipeline. Stages run strictly in order; a stage failure is
/// recorded and the run continues, so a session always terminates with a
/// well-formed state.
pub struct Pipeline {
    pub valuation_request: ValuationRequest,
    /// Cooperative cancellation checkpoint, consulted between stages.
    pub should_continue: Option<Box<dyn Fn() -> bool>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            valuation_request: ValuationRequest::default(),
            should_continue: None,
        }
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_valuation_request(mut self, request: ValuationRequest) -> Self {
        self.valuation_request = request;
        self
    }

    pub fn with_cancellation(mut self, should_continue: Box<dyn Fn() -> bool>) -> Self {
        self.should_continue = Some(should_continue);
        self
    }

    fn cancelled(&self) -> bool {
        self.should_continue
            .as_ref()
            .map(|f| !f())
            .unwrap_or(false)
    }

    fn run_stage(&self, stage: Stage, state: &AnalysisState) -> crate::error::Result<StageDelta> {
        let empty_accounting = || {
            AnalysisError::StageContract {
                stage: stage.name().to_string(),
                details: "accounting slice absent from state".to_string(),
            }
        };

        match stage {
            Stage::Accounting => {
                state.overrides.validate()?;
                Ok(StageDelta::Accounting(run_accounting(
                    &state.fiscal_records,
                    state.business.activity_code.as_deref(),
                    &state.overrides,
                )))
            }
            Stage::Valuation => {
                let accounting = state.accounting.as_ref().ok_or_else(empty_accounting)?;
                Ok(StageDelta::Valuation(run_valuation(
                    accounting,
                    state.fiscal_records.last(),
                    state.business.activity_code.as_deref(),
                    &state.overrides,
                    &self.valuation_request,
                )))
            }
            Stage::RealEstate => {
                let business_value = state
                    .valuation
                    .as_ref()
                    .and_then(|v| v.synthesis.as_ref())
                    .map(|s| s.valeur_mediane);
                Ok(StageDelta::RealEstate(run_real_estate(
                    state.fiscal_records.last(),
                    state.extracted_lease().as_ref(),
                    &state.overrides,
                    business_value,
                )))
            }
            Stage::Validation => {
                let accounting = state.accounting.as_ref().ok_or_else(empty_accounting)?;
                Ok(StageDelta::Validation(run_validation(
                    &state.fiscal_records,
                    accounting,
                    state.valuation.as_ref(),
                    state.real_estate.as_ref(),
                    state.current_year,
                )))
            }
            Stage::Projection => {
                let accounting = state.accounting.as_ref().ok_or_else(empty_accounting)?;
                let output = run_projection(
                    accounting,
                    state.fiscal_records.last(),
                    state.valuation.as_ref(),
                    state.real_estate.as_ref(),
                    &state.overrides,
                )?;
                Ok(StageDelta::Projection(output))
            }
        }
    }

    /// Runs the five stages over a fresh state and returns it. Never returns
    /// an error: per-stage failures are recorded in `state.failures`.
    pub fn run(&self, mut state: AnalysisState) -> AnalysisState {
        info!(
            "Pipeline start: '{}', {} document(s), {} exercice(s)",
            state.business.name,
            state.documents.len(),
            state.fiscal_records.len()
        );

        for stage in Stage::ALL {
            if self.cancelled() {
                warn!("Session cancelled before stage {}", stage.name());
                state.failures.push(StageFailure {
                    stage,
                    message: "session annulée avant ce stage".to_string(),
                });
                continue;
            }

            match self.run_stage(stage, &state) {
                Ok(delta) => merge_delta(&mut state, delta),
                Err(e) => {
                    warn!("Stage {} failed: {}", stage.name(), e);
                    state.failures.push(StageFailure {
                        stage,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Pipeline done: sections {:?}, {} failure(s)",
            state.sections_included(),
            state.failures.len()
        );
        state
    }
}

/// Convenience entry point: builds the state, runs the default pipeline.
pub fn analyze(
    business: BusinessInfo,
    documents: Vec<FiscalDocument>,
    overrides: UserOverrides,
    current_year: i32,
) -> AnalysisState {
    let state = AnalysisState::new(business, documents, overrides, current_year);
    Pipeline::new().run(state)
}
