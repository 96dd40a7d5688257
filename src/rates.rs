// 💲 Rate Join - slot counts × per-complex rates = APP amounts
// Left join on the complex name: every counted unit survives, matched or not.

use crate::config::PipelineOptions;
use crate::error::{ReconError, Result, Stage};
use crate::parser::{SlotCountAggregate, SourceType};
use crate::reconciliation::{AmountRow, SourceTable};
use crate::schema::require_columns;
use crate::workbook::Workbook;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const COMPLEX_COLUMN: &str = "CONJUNTO";
pub const CAR_RATE_COLUMN: &str = "CARRO";
pub const MOTORCYCLE_RATE_COLUMN: &str = "MOTO";

/// How to treat a complex that matches more than one rate row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinPolicy {
    /// One output row per matching rate row
    #[default]
    Expand,
    /// Abort the run with `ReconError::JoinAmbiguity`
    Reject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateRow {
    pub complex: String,
    pub car_rate: Option<f64>,
    pub motorcycle_rate: Option<f64>,
}

/// Rates per complex, in workbook order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateTable {
    pub rows: Vec<RateRow>,
}

impl RateTable {
    pub fn new(rows: Vec<RateRow>) -> Self {
        RateTable { rows }
    }

    /// Read the first sheet of the rates ("Cobros") workbook
    pub fn from_workbook(workbook: &Workbook) -> Result<Self> {
        let required = [COMPLEX_COLUMN, CAR_RATE_COLUMN, MOTORCYCLE_RATE_COLUMN];

        let sheet = workbook.first_sheet().ok_or_else(|| ReconError::Schema {
            stage: Stage::RateTable,
            table: workbook.label.clone(),
            missing: required.iter().map(|c| c.to_string()).collect(),
        })?;
        let table = &sheet.table;
        require_columns(table, &required, Stage::RateTable, &workbook.label)?;

        // Indices exist: checked above
        let idx = |name: &str| table.column_index(name).unwrap_or_default();
        let (complex_idx, car_idx, moto_idx) = (
            idx(COMPLEX_COLUMN),
            idx(CAR_RATE_COLUMN),
            idx(MOTORCYCLE_RATE_COLUMN),
        );

        let mut rows = Vec::new();
        for row in &table.rows {
            let complex = row[complex_idx].as_key();
            if complex.is_empty() {
                continue;
            }
            rows.push(RateRow {
                complex,
                car_rate: row[car_idx].as_number(),
                motorcycle_rate: row[moto_idx].as_number(),
            });
        }

        info!("Loaded {} rate rows from sheet '{}'", rows.len(), sheet.name);
        Ok(RateTable { rows })
    }

    /// Rate rows per complex name. Exact, case-sensitive keys.
    fn index(&self) -> HashMap<&str, Vec<&RateRow>> {
        let mut index: HashMap<&str, Vec<&RateRow>> = HashMap::new();
        for row in &self.rows {
            index.entry(row.complex.as_str()).or_default().push(row);
        }
        index
    }

    /// Complex names that appear more than once
    pub fn duplicated_complexes(&self) -> Vec<String> {
        let mut duplicated: Vec<String> = self
            .index()
            .into_iter()
            .filter(|(_, rows)| rows.len() > 1)
            .map(|(complex, _)| complex.to_string())
            .collect();
        duplicated.sort();
        duplicated
    }
}

/// Price the slot counts and tag them as the APP source.
///
/// A count row whose complex has no rate row keeps missing amounts. A missing rate
/// yields a missing amount for that slot type only.
pub fn join_rates(
    counts: &SlotCountAggregate,
    rates: &RateTable,
    options: &PipelineOptions,
) -> Result<SourceTable> {
    let index = rates.index();
    let mut rows = Vec::with_capacity(counts.rows.len());
    let mut unmatched = 0usize;

    for count_row in &counts.rows {
        let matches: &[&RateRow] = index
            .get(count_row.complex.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        if matches.len() > 1 && options.join_policy == JoinPolicy::Reject {
            return Err(ReconError::JoinAmbiguity {
                complex: count_row.complex.clone(),
                matches: matches.len(),
            });
        }

        let car_count = counts.count_matching(count_row, &options.car_label) as f64;
        let moto_count = counts.count_matching(count_row, &options.motorcycle_label) as f64;

        if matches.is_empty() {
            unmatched += 1;
            rows.push(AmountRow {
                unit_code: count_row.unit_code.clone(),
                complex: count_row.complex.clone(),
                source: SourceType::App,
                motorcycle: None,
                car: None,
            });
            continue;
        }

        for rate in matches {
            rows.push(AmountRow {
                unit_code: count_row.unit_code.clone(),
                complex: count_row.complex.clone(),
                source: SourceType::App,
                motorcycle: rate.motorcycle_rate.map(|r| r * moto_count),
                car: rate.car_rate.map(|r| r * car_count),
            });
        }
    }

    if unmatched > 0 {
        warn!(
            "{} unit(s) belong to complexes without a rate row; their APP amounts are empty",
            unmatched
        );
    }
    debug!(
        "Rate join: {} count rows -> {} priced rows",
        counts.rows.len(),
        rows.len()
    );

    Ok(SourceTable {
        source: SourceType::App,
        unit_column: options.app_unit_column.clone(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SlotCountRow;
    use crate::workbook::tests::{xlsx_bytes, TestValue::*};

    fn counts(rows: &[(&str, &str, u32, u32)]) -> SlotCountAggregate {
        SlotCountAggregate {
            subtypes: vec!["CARRO".to_string(), "MOTO".to_string()],
            rows: rows
                .iter()
                .map(|(unit, complex, cars, motos)| SlotCountRow {
                    unit_code: unit.to_string(),
                    complex: complex.to_string(),
                    counts: vec![*cars, *motos],
                })
                .collect(),
        }
    }

    fn rate(complex: &str, car: f64, moto: f64) -> RateRow {
        RateRow {
            complex: complex.to_string(),
            car_rate: Some(car),
            motorcycle_rate: Some(moto),
        }
    }

    #[test]
    fn test_join_multiplies_counts_by_rates() {
        let counts = counts(&[("U1", "A1", 2, 1)]);
        let rates = RateTable::new(vec![rate("A1", 100.0, 50.0)]);

        let table = join_rates(&counts, &rates, &PipelineOptions::default()).unwrap();

        assert_eq!(table.source, SourceType::App);
        assert_eq!(table.unit_column, "Codigo");
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].car, Some(200.0));
        assert_eq!(table.rows[0].motorcycle, Some(50.0));
    }

    #[test]
    fn test_join_is_a_left_join() {
        let counts = counts(&[("U1", "A1", 1, 0), ("U2", "B2", 1, 1)]);
        let rates = RateTable::new(vec![rate("A1", 100.0, 50.0)]);

        let table = join_rates(&counts, &rates, &PipelineOptions::default()).unwrap();

        assert_eq!(table.rows.len(), counts.rows.len());
        let unmatched = &table.rows[1];
        assert_eq!(unmatched.unit_code, "U2");
        assert_eq!(unmatched.car, None);
        assert_eq!(unmatched.motorcycle, None);
    }

    #[test]
    fn test_join_key_is_case_sensitive() {
        let counts = counts(&[("U1", "a1", 1, 0)]);
        let rates = RateTable::new(vec![rate("A1", 100.0, 50.0)]);

        let table = join_rates(&counts, &rates, &PipelineOptions::default()).unwrap();
        assert_eq!(table.rows[0].car, None);
    }

    #[test]
    fn test_duplicate_rates_expand_by_default() {
        let counts = counts(&[("U1", "A1", 1, 0)]);
        let rates = RateTable::new(vec![rate("A1", 100.0, 50.0), rate("A1", 120.0, 60.0)]);

        let table = join_rates(&counts, &rates, &PipelineOptions::default()).unwrap();

        assert!(table.rows.len() > counts.rows.len());
        assert_eq!(table.rows[0].car, Some(100.0));
        assert_eq!(table.rows[1].car, Some(120.0));
        assert_eq!(rates.duplicated_complexes(), vec!["A1"]);
    }

    #[test]
    fn test_duplicate_rates_rejected_when_configured() {
        let counts = counts(&[("U1", "A1", 1, 0)]);
        let rates = RateTable::new(vec![rate("A1", 100.0, 50.0), rate("A1", 120.0, 60.0)]);
        let options = PipelineOptions {
            join_policy: JoinPolicy::Reject,
            ..PipelineOptions::default()
        };

        let result = join_rates(&counts, &rates, &options);
        assert!(matches!(
            result,
            Err(ReconError::JoinAmbiguity { matches: 2, .. })
        ));
    }

    #[test]
    fn test_missing_rate_only_blanks_its_own_slot() {
        let counts = counts(&[("U1", "A1", 1, 1)]);
        let rates = RateTable::new(vec![RateRow {
            complex: "A1".to_string(),
            car_rate: Some(100.0),
            motorcycle_rate: None,
        }]);

        let table = join_rates(&counts, &rates, &PipelineOptions::default()).unwrap();
        assert_eq!(table.rows[0].car, Some(100.0));
        assert_eq!(table.rows[0].motorcycle, None);
    }

    #[test]
    fn test_rate_table_from_workbook() {
        let bytes = xlsx_bytes(&[(
            "Cobros",
            vec!["CONJUNTO", "CARRO", "MOTO"],
            vec![
                vec![T("A1"), N(100.0), N(50.0)],
                vec![T("B2"), T("80000"), T("")],
            ],
        )]);
        let workbook = Workbook::from_bytes("Cobros", &bytes).unwrap();

        let rates = RateTable::from_workbook(&workbook).unwrap();

        assert_eq!(rates.rows.len(), 2);
        assert_eq!(rates.rows[0], rate("A1", 100.0, 50.0));
        assert_eq!(rates.rows[1].car_rate, Some(80000.0));
        assert_eq!(rates.rows[1].motorcycle_rate, None);
    }

    #[test]
    fn test_rate_table_requires_columns() {
        let bytes = xlsx_bytes(&[("Cobros", vec!["CONJUNTO", "CARRO"], vec![])]);
        let workbook = Workbook::from_bytes("Cobros", &bytes).unwrap();

        match RateTable::from_workbook(&workbook) {
            Err(ReconError::Schema { stage, missing, .. }) => {
                assert_eq!(stage, Stage::RateTable);
                assert_eq!(missing, vec!["MOTO"]);
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }
}
