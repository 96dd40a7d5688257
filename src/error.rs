// 🚨 Error Types - every failure aborts the current run
// Nothing here is retried: the operator fixes the upload and runs again.

use thiserror::Error;

/// Pipeline stage that raised an error (used in operator-facing messages)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AppNormalization,
    RateTable,
    SiscoNormalization,
    Reconciliation,
}

impl Stage {
    pub fn label(&self) -> &str {
        match self {
            Stage::AppNormalization => "APP normalization",
            Stage::RateTable => "rate table",
            Stage::SiscoNormalization => "SISCO normalization",
            Stage::Reconciliation => "reconciliation",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("Could not read workbook '{label}': {reason}")]
    WorkbookRead { label: String, reason: String },

    #[error("[{stage}] {table} is missing required column(s): {}", missing.join(", "))]
    Schema {
        stage: Stage,
        table: String,
        missing: Vec<String>,
    },

    #[error("Complex '{complex}' matches {matches} rows in the rate table")]
    JoinAmbiguity { complex: String, matches: usize },

    #[error("Workbook '{label}' has no authorized sheets")]
    NoAuthorizedSheets { label: String },

    #[error("Invalid username or password")]
    AuthenticationFailed,

    #[error("Invalid configuration in {path}: {reason}")]
    Config { path: String, reason: String },

    #[error("Failed to write report: {0}")]
    ReportWrite(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReconError {
    /// Stage the error belongs to, when it belongs to one
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ReconError::Schema { stage, .. } => Some(*stage),
            ReconError::JoinAmbiguity { .. } => Some(Stage::RateTable),
            ReconError::NoAuthorizedSheets { .. } => Some(Stage::AppNormalization),
            _ => None,
        }
    }
}

impl From<rust_xlsxwriter::XlsxError> for ReconError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        ReconError::ReportWrite(err.to_string())
    }
}

impl From<csv::Error> for ReconError {
    fn from(err: csv::Error) -> Self {
        ReconError::ReportWrite(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReconError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_names_every_missing_column() {
        let err = ReconError::Schema {
            stage: Stage::SiscoNormalization,
            table: "SISCO".to_string(),
            missing: vec!["cuotaparqu".to_string(), "moto".to_string()],
        };

        let message = err.to_string();
        assert!(message.contains("SISCO normalization"));
        assert!(message.contains("cuotaparqu, moto"));
        assert_eq!(err.stage(), Some(Stage::SiscoNormalization));
    }

    #[test]
    fn test_join_ambiguity_is_a_rate_stage_error() {
        let err = ReconError::JoinAmbiguity {
            complex: "A1".to_string(),
            matches: 2,
        };
        assert_eq!(err.stage(), Some(Stage::RateTable));
        assert!(err.to_string().contains("A1"));
    }
}
