// 📐 Shape Layer - Required column validation
// A table either carries every column a stage needs or the stage fails with all of them named.

use crate::error::{ReconError, Result, Stage};
use crate::workbook::Table;

/// Columns from `required` that `table` does not have, in `required` order
pub fn missing_columns(table: &Table, required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|column| !table.has_column(column))
        .map(|column| column.to_string())
        .collect()
}

/// Fail with `ReconError::Schema` unless every required column is present
pub fn require_columns(table: &Table, required: &[&str], stage: Stage, table_label: &str) -> Result<()> {
    let missing = missing_columns(table, required);

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ReconError::Schema {
            stage,
            table: table_label.to_string(),
            missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str]) -> Table {
        Table::new(columns.iter().map(|c| c.to_string()).collect())
    }

    #[test]
    fn test_all_columns_present() {
        let t = table(&["codigo", "cuotaparqu", "moto", "Nombre_Hoja"]);
        assert!(require_columns(&t, &["codigo", "moto"], Stage::SiscoNormalization, "SISCO").is_ok());
    }

    #[test]
    fn test_missing_columns_listed_in_required_order() {
        let t = table(&["codigo", "Nombre_Hoja"]);

        let err = require_columns(
            &t,
            &["codigo", "Nombre_Hoja", "cuotaparqu", "moto"],
            Stage::SiscoNormalization,
            "SISCO",
        )
        .unwrap_err();

        match err {
            ReconError::Schema { stage, table, missing } => {
                assert_eq!(stage, Stage::SiscoNormalization);
                assert_eq!(table, "SISCO");
                assert_eq!(missing, vec!["cuotaparqu", "moto"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_column_names_are_case_sensitive() {
        let t = table(&["CODIGO"]);
        assert_eq!(missing_columns(&t, &["codigo"]), vec!["codigo"]);
    }
}
