// 🚀 Pipeline - uploads in, discrepancy report out
// read → classify → normalize APP (+ rates) → normalize SISCO → reconcile
//
// One run, one thread, everything in memory. Any failure aborts the run and
// nothing computed so far is returned.

use crate::authorization::{classify, SheetClassification};
use crate::config::PipelineOptions;
use crate::error::{ReconError, Result};
use crate::parser::{AppNormalizer, SiscoNormalizer, SourceNormalizer};
use crate::rates::RateTable;
use crate::reconciliation::{ReconciliationReport, Reconciler};
use crate::session::Session;
use crate::workbook::Workbook;
use log::info;
use std::path::Path;

pub const APP_LABEL: &str = "APP";
pub const RATES_LABEL: &str = "Cobros";
pub const SISCO_LABEL: &str = "SISCO";

/// The three uploaded workbooks, as raw bytes
#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    pub app: Vec<u8>,
    pub rates: Vec<u8>,
    pub sisco: Vec<u8>,
}

impl PipelineInputs {
    pub fn new(app: Vec<u8>, rates: Vec<u8>, sisco: Vec<u8>) -> Self {
        PipelineInputs { app, rates, sisco }
    }

    /// Read the three files fully into memory
    pub fn from_paths(app: &Path, rates: &Path, sisco: &Path) -> Result<Self> {
        let read = |label: &str, path: &Path| {
            std::fs::read(path).map_err(|e| ReconError::WorkbookRead {
                label: label.to_string(),
                reason: format!("{}: {}", path.display(), e),
            })
        };

        Ok(PipelineInputs {
            app: read(APP_LABEL, app)?,
            rates: read(RATES_LABEL, rates)?,
            sisco: read(SISCO_LABEL, sisco)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub classification: SheetClassification,
    pub report: ReconciliationReport,
}

pub struct Pipeline {
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Pipeline { options }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run one reconciliation for an authenticated session
    pub fn run(&self, session: &Session, inputs: &PipelineInputs) -> Result<PipelineOutcome> {
        info!("Pipeline run started by '{}'", session.username());

        // All three must open before any normalization starts
        let app_workbook = Workbook::from_bytes(APP_LABEL, &inputs.app)?;
        let rates_workbook = Workbook::from_bytes(RATES_LABEL, &inputs.rates)?;
        let sisco_workbook = Workbook::from_bytes(SISCO_LABEL, &inputs.sisco)?;

        let classification = classify(&app_workbook.sheet_names(), session.registry());
        if !classification.unauthorized.is_empty() {
            log::warn!(
                "APP: unauthorized sheet(s) ignored: {}",
                classification.unauthorized.join(", ")
            );
        }
        if !classification.has_authorized() {
            return Err(ReconError::NoAuthorizedSheets {
                label: APP_LABEL.to_string(),
            });
        }

        let rates = RateTable::from_workbook(&rates_workbook)?;
        let app = AppNormalizer::new(
            classification.authorized_set(),
            rates,
            self.options.clone(),
        )
        .normalize(&app_workbook)?;

        let sisco_filter = self
            .options
            .filter_sisco_by_authorization
            .then(|| session.registry().clone());
        let sisco = SiscoNormalizer::new(self.options.clone(), sisco_filter).normalize(&sisco_workbook)?;

        let report = Reconciler::with_tolerance(self.options.tolerance).reconcile(&app, &sisco)?;
        info!("Pipeline run finished: {} report rows", report.rows.len());

        Ok(PipelineOutcome {
            classification,
            report,
        })
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineOptions::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
