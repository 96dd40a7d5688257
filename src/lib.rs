// Parking Reconciliation - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod config;
pub mod workbook;       // Spreadsheet ingestion
pub mod schema;         // Required-column checks
pub mod authorization;  // Authorized complexes + sheet classification
pub mod session;        // Login
pub mod parser;         // APP / SISCO normalizers
pub mod rates;          // Rate table + left join
pub mod reconciliation; // union → melt → pivot → Validacion
pub mod report;         // xlsx / csv export
pub mod pipeline;

// Re-export commonly used types
pub use error::{ReconError, Result, Stage};
pub use config::{AppConfig, AuthorizationConfig, LoginConfig, PipelineOptions};
pub use workbook::{Cell, Sheet, Table, Workbook};
pub use authorization::{classify, classify_workbook, ComplexRegistry, SheetClassification};
pub use session::{Credentials, Session};
pub use parser::{
    AppNormalizer, SiscoNormalizer, SourceNormalizer,
    SlotCountAggregate, SlotCountRow, SourceType,
};
pub use rates::{join_rates, JoinPolicy, RateRow, RateTable};
pub use reconciliation::{
    AmountRow, Reconciler, ReconciliationReport, ReconciliationRow,
    SlotType, SourceTable, VarianceStatus,
};
pub use pipeline::{Pipeline, PipelineInputs, PipelineOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
