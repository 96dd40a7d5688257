// ⚙️ Configuration - login, authorized list location and pipeline options
// Loaded once per process from a TOML file; read-only afterwards.

use crate::error::{ReconError, Result};
use crate::rates::JoinPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_AUTHORIZED_LIST: &str = "conjuntos_autorizados.txt";

/// Column stamped with the originating sheet (complex) name
pub const SHEET_COLUMN: &str = "Nombre_Hoja";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub login: LoginConfig,

    #[serde(default)]
    pub authorization: AuthorizationConfig,

    #[serde(default)]
    pub pipeline: PipelineOptions,
}

/// Operator credentials. An empty username never authenticates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginConfig {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    /// Newline-delimited list of authorized complexes
    #[serde(default = "default_list_path")]
    pub list_path: PathBuf,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        AuthorizationConfig {
            list_path: default_list_path(),
        }
    }
}

fn default_list_path() -> PathBuf {
    PathBuf::from(DEFAULT_AUTHORIZED_LIST)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Apply the authorized list to SISCO sheets too (APP is always filtered)
    pub filter_sisco_by_authorization: bool,

    /// What to do when a complex matches several rate rows
    pub join_policy: JoinPolicy,

    /// Unit code header in the APP workbook; also the report's unit column
    pub app_unit_column: String,

    /// Unit code header in the SISCO workbook
    pub sisco_unit_column: String,

    /// Parking subtype billed at the car rate
    pub car_label: String,

    /// Parking subtype billed at the motorcycle rate
    pub motorcycle_label: String,

    /// Absolute variance up to which a row counts as matching in summaries
    pub tolerance: f64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            filter_sisco_by_authorization: false,
            join_policy: JoinPolicy::Expand,
            app_unit_column: "Codigo".to_string(),
            sisco_unit_column: "codigo".to_string(),
            car_label: "CARRO".to_string(),
            motorcycle_label: "MOTO".to_string(),
            tolerance: 0.01,
        }
    }
}

impl AppConfig {
    pub fn from_toml(text: &str, origin: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ReconError::Config {
            path: origin.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ReconError::Config {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&text, &path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parses() {
        let text = r#"
            [login]
            username = "admin"
            password = "secreto"

            [authorization]
            list_path = "/etc/parking/conjuntos.txt"

            [pipeline]
            filter_sisco_by_authorization = true
            join_policy = "reject"
            tolerance = 1.0
        "#;

        let config = AppConfig::from_toml(text, "inline").unwrap();

        assert_eq!(config.login.username, "admin");
        assert_eq!(config.login.password, "secreto");
        assert_eq!(
            config.authorization.list_path,
            PathBuf::from("/etc/parking/conjuntos.txt")
        );
        assert!(config.pipeline.filter_sisco_by_authorization);
        assert_eq!(config.pipeline.join_policy, JoinPolicy::Reject);
        assert_eq!(config.pipeline.tolerance, 1.0);
        assert_eq!(config.pipeline.app_unit_column, "Codigo");
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = AppConfig::from_toml("[login]\nusername = \"ops\"\n", "inline").unwrap();

        assert_eq!(config.login.password, "");
        assert_eq!(
            config.authorization.list_path,
            PathBuf::from(DEFAULT_AUTHORIZED_LIST)
        );
        assert_eq!(config.pipeline, PipelineOptions::default());
    }

    #[test]
    fn test_malformed_config_is_a_config_error() {
        let result = AppConfig::from_toml("[pipeline]\njoin_policy = \"sometimes\"\n", "bad.toml");
        assert!(matches!(result, Err(ReconError::Config { .. })));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[login]\nusername = \"a\"\npassword = \"b\"\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.login.username, "a");

        let missing = AppConfig::load(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ReconError::Config { .. })));
    }
}
