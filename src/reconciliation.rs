// ⚖️ Reconciliation Engine - APP amounts vs SISCO amounts
//
// Following the flow:
//   union(APP, SISCO) → melt by slot type → pivot by source → Validacion = APP - SISCO
//
// Positive Validacion means the app bills more than the accounting system charged.

use crate::error::{ReconError, Result, Stage};
use crate::parser::SourceType;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// SLOT TYPE
// ============================================================================

/// Parking slot type. `Car` sorts before `Motorcycle`, matching the internal labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SlotType {
    Car,
    Motorcycle,
}

impl SlotType {
    /// Order in which wide amount columns are melted
    pub const MELT_ORDER: [SlotType; 2] = [SlotType::Motorcycle, SlotType::Car];

    /// Column name in the wide amount tables
    pub fn internal_label(&self) -> &'static str {
        match self {
            SlotType::Car => "cuotaparqu",
            SlotType::Motorcycle => "moto",
        }
    }

    /// Value of the report's `Tipo` column
    pub fn display_label(&self) -> &'static str {
        match self {
            SlotType::Car => "Carro",
            SlotType::Motorcycle => "moto",
        }
    }
}

// ============================================================================
// SOURCE TABLES
// ============================================================================

/// One unit's amounts from one source, wide form (one column per slot type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountRow {
    pub unit_code: String,
    pub complex: String,
    pub source: SourceType,
    pub motorcycle: Option<f64>,
    pub car: Option<f64>,
}

impl AmountRow {
    pub fn amount(&self, slot: SlotType) -> Option<f64> {
        match slot {
            SlotType::Car => self.car,
            SlotType::Motorcycle => self.motorcycle,
        }
    }
}

/// Normalized rows of one source, all carrying the same tag
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTable {
    pub source: SourceType,
    /// Header the unit code goes by; both sides must agree before a union
    pub unit_column: String,
    pub rows: Vec<AmountRow>,
}

/// Long form: one amount per (unit, complex, source, slot type)
#[derive(Debug, Clone, PartialEq)]
pub struct LongRow {
    pub unit_code: String,
    pub complex: String,
    pub source: SourceType,
    pub slot: SlotType,
    pub amount: Option<f64>,
}

// ============================================================================
// RECONCILIATION ROWS & REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarianceStatus {
    /// Within tolerance
    Match,
    /// APP reports more than SISCO charged
    AppHigher,
    /// SISCO charged more than APP reports
    SiscoHigher,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRow {
    pub unit_code: String,
    pub complex: String,
    pub slot: SlotType,
    pub app: f64,
    pub sisco: f64,
    /// `app - sisco`
    pub validation: f64,
}

impl ReconciliationRow {
    /// An exact match is always `Match`, whatever the tolerance
    pub fn status(&self, tolerance: f64) -> VarianceStatus {
        if self.validation == 0.0 || self.validation.abs() <= tolerance {
            VarianceStatus::Match
        } else if self.validation > 0.0 {
            VarianceStatus::AppHigher
        } else {
            VarianceStatus::SiscoHigher
        }
    }
}

/// Reconciliation output, sorted by unit code, complex, then slot type (Carro first).
///
/// The sort is plain string order on the keys, so unit `"10"` precedes `"9"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Header of the unit code column in exports
    pub unit_column: String,
    pub rows: Vec<ReconciliationRow>,
    pub tolerance: f64,
    pub reconciled_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn total_app(&self) -> f64 {
        self.rows.iter().map(|r| r.app).sum()
    }

    pub fn total_sisco(&self) -> f64 {
        self.rows.iter().map(|r| r.sisco).sum()
    }

    pub fn total_validation(&self) -> f64 {
        self.rows.iter().map(|r| r.validation).sum()
    }

    /// Rows whose variance exceeds the tolerance
    pub fn discrepancies(&self) -> Vec<&ReconciliationRow> {
        self.rows
            .iter()
            .filter(|r| r.status(self.tolerance) != VarianceStatus::Match)
            .collect()
    }

    pub fn is_balanced(&self) -> bool {
        self.discrepancies().is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciliation: {} rows, APP ${:.2}, SISCO ${:.2}, difference ${:.2}, {} discrepancies",
            self.rows.len(),
            self.total_app(),
            self.total_sisco(),
            self.total_validation(),
            self.discrepancies().len()
        )
    }
}

// ============================================================================
// PIPELINE STEPS
// ============================================================================

/// Row-concatenate both sources, APP rows first
pub fn union(app: &SourceTable, sisco: &SourceTable) -> Vec<AmountRow> {
    app.rows.iter().chain(&sisco.rows).cloned().collect()
}

/// Wide to long: every row yields one long row per slot type,
/// all motorcycle rows first, then all car rows.
pub fn melt(rows: &[AmountRow]) -> Vec<LongRow> {
    SlotType::MELT_ORDER
        .iter()
        .flat_map(|slot| {
            rows.iter().map(move |row| LongRow {
                unit_code: row.unit_code.clone(),
                complex: row.complex.clone(),
                source: row.source,
                slot: *slot,
                amount: row.amount(*slot),
            })
        })
        .collect()
}

/// Spread sources into columns per (unit, complex, slot type).
///
/// Amounts for the same key are summed; a missing amount or an absent source is 0.
pub fn pivot(long: &[LongRow]) -> Vec<ReconciliationRow> {
    let mut groups: BTreeMap<(String, String, SlotType), (f64, f64)> = BTreeMap::new();

    for row in long {
        let entry = groups
            .entry((row.unit_code.clone(), row.complex.clone(), row.slot))
            .or_insert((0.0, 0.0));
        let amount = row.amount.unwrap_or(0.0);
        match row.source {
            SourceType::App => entry.0 += amount,
            SourceType::Sisco => entry.1 += amount,
        }
    }

    groups
        .into_iter()
        .map(|((unit_code, complex, slot), (app, sisco))| ReconciliationRow {
            unit_code,
            complex,
            slot,
            app,
            sisco,
            validation: app - sisco,
        })
        .collect()
}

// ============================================================================
// RECONCILER
// ============================================================================

pub struct Reconciler {
    /// Variance up to this counts as a match in summaries (default: 0.01)
    pub tolerance: f64,
}

impl Reconciler {
    pub fn new() -> Self {
        Reconciler { tolerance: 0.01 }
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        Reconciler { tolerance }
    }

    /// Reconcile APP amounts against SISCO amounts.
    ///
    /// Pure: the same two tables always give the same rows in the same order.
    pub fn reconcile(&self, app: &SourceTable, sisco: &SourceTable) -> Result<ReconciliationReport> {
        check_source(app, SourceType::App)?;
        check_source(sisco, SourceType::Sisco)?;

        if app.unit_column != sisco.unit_column {
            return Err(ReconError::Schema {
                stage: Stage::Reconciliation,
                table: SourceType::Sisco.code().to_string(),
                missing: vec![app.unit_column.clone()],
            });
        }

        let unioned = union(app, sisco);
        let long = melt(&unioned);
        let rows = pivot(&long);
        debug!(
            "Reconcile: {} wide rows -> {} long rows -> {} report rows",
            unioned.len(),
            long.len(),
            rows.len()
        );

        let report = ReconciliationReport {
            unit_column: app.unit_column.clone(),
            rows,
            tolerance: self.tolerance,
            reconciled_at: Utc::now(),
        };
        info!("{}", report.summary());
        Ok(report)
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

fn check_source(table: &SourceTable, expected: SourceType) -> Result<()> {
    match table.rows.iter().find(|r| r.source != table.source) {
        _ if table.source != expected => Err(ReconError::Schema {
            stage: Stage::Reconciliation,
            table: table.source.code().to_string(),
            missing: vec![expected.code().to_string()],
        }),
        Some(stray) => Err(ReconError::Schema {
            stage: Stage::Reconciliation,
            table: format!("{} (row tagged {})", expected.code(), stray.source.code()),
            missing: vec![expected.code().to_string()],
        }),
        None => Ok(()),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn row(unit: &str, complex: &str, source: SourceType, moto: Option<f64>, car: Option<f64>) -> AmountRow {
        AmountRow {
            unit_code: unit.to_string(),
            complex: complex.to_string(),
            source,
            motorcycle: moto,
            car,
        }
    }

    fn table(source: SourceType, rows: Vec<AmountRow>) -> SourceTable {
        SourceTable {
            source,
            unit_column: "Codigo".to_string(),
            rows,
        }
    }

    #[test]
    fn test_melt_emits_motorcycle_rows_first() {
        let rows = vec![
            row("U1", "A1", SourceType::App, Some(50.0), Some(100.0)),
            row("U2", "A1", SourceType::App, None, Some(200.0)),
        ];

        let long = melt(&rows);

        assert_eq!(long.len(), 4);
        assert_eq!(long[0].slot, SlotType::Motorcycle);
        assert_eq!(long[1].slot, SlotType::Motorcycle);
        assert_eq!(long[1].amount, None);
        assert_eq!(long[2].slot, SlotType::Car);
        assert_eq!(long[3].amount, Some(200.0));
    }

    #[test]
    fn test_pivot_sums_duplicates_and_fills_zero() {
        let long = vec![
            LongRow {
                unit_code: "U1".to_string(),
                complex: "A1".to_string(),
                source: SourceType::App,
                slot: SlotType::Car,
                amount: Some(100.0),
            },
            LongRow {
                unit_code: "U1".to_string(),
                complex: "A1".to_string(),
                source: SourceType::App,
                slot: SlotType::Car,
                amount: Some(20.0),
            },
        ];

        let rows = pivot(&long);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].app, 120.0);
        assert_eq!(rows[0].sisco, 0.0);
        assert_eq!(rows[0].validation, 120.0);
    }

    #[test]
    fn test_reconcile_example_balances() {
        let app = table(
            SourceType::App,
            vec![row("U1", "A1", SourceType::App, Some(50.0), Some(100.0))],
        );
        let sisco = table(
            SourceType::Sisco,
            vec![row("U1", "A1", SourceType::Sisco, Some(50.0), Some(100.0))],
        );

        let report = Reconciler::new().reconcile(&app, &sisco).unwrap();

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].slot.display_label(), "Carro");
        assert_eq!(report.rows[0].app, 100.0);
        assert_eq!(report.rows[0].sisco, 100.0);
        assert_eq!(report.rows[1].slot.display_label(), "moto");
        assert_eq!(report.rows[1].validation, 0.0);
        assert!(report.is_balanced());

        println!("✅ Test passed: {}", report.summary());
    }

    #[test]
    fn test_validation_is_app_minus_sisco_with_missing_side_zero() {
        let app = table(
            SourceType::App,
            vec![
                row("U1", "A1", SourceType::App, None, Some(100.0)),
                row("U3", "A1", SourceType::App, Some(30.0), None),
            ],
        );
        let sisco = table(
            SourceType::Sisco,
            vec![
                row("U1", "A1", SourceType::Sisco, Some(10.0), Some(140.0)),
                row("U2", "B2", SourceType::Sisco, Some(5.0), None),
            ],
        );

        let report = Reconciler::new().reconcile(&app, &sisco).unwrap();

        for r in &report.rows {
            assert_eq!(r.validation, r.app - r.sisco);
        }
        let keys: Vec<(&str, &str, &str)> = report
            .rows
            .iter()
            .map(|r| (r.unit_code.as_str(), r.complex.as_str(), r.slot.display_label()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("U1", "A1", "Carro"),
                ("U1", "A1", "moto"),
                ("U2", "B2", "Carro"),
                ("U2", "B2", "moto"),
                ("U3", "A1", "Carro"),
                ("U3", "A1", "moto"),
            ]
        );
        assert_eq!(report.rows[0].validation, -40.0);
        assert_eq!(report.rows[0].status(0.01), VarianceStatus::SiscoHigher);
        assert_eq!(report.rows[5].validation, 30.0);
        assert_eq!(report.rows[5].status(0.01), VarianceStatus::AppHigher);
        assert_eq!(report.discrepancies().len(), 4);
    }

    #[test]
    fn test_exact_match_at_zero_tolerance() {
        let app = table(
            SourceType::App,
            vec![row("U1", "A1", SourceType::App, Some(50.0), Some(100.0))],
        );
        let sisco = table(
            SourceType::Sisco,
            vec![row("U1", "A1", SourceType::Sisco, Some(50.0), Some(100.0))],
        );

        let report = Reconciler::with_tolerance(0.0).reconcile(&app, &sisco).unwrap();

        assert_eq!(report.rows[0].validation, 0.0);
        assert_eq!(report.rows[0].status(0.0), VarianceStatus::Match);
        assert!(report.discrepancies().is_empty());
        assert!(report.is_balanced());
    }

    #[test]
    fn test_variance_equal_to_tolerance_matches() {
        let r = ReconciliationRow {
            unit_code: "U1".to_string(),
            complex: "A1".to_string(),
            slot: SlotType::Car,
            app: 100.5,
            sisco: 100.0,
            validation: 0.5,
        };
        assert_eq!(r.status(0.5), VarianceStatus::Match);
        assert_eq!(r.status(0.25), VarianceStatus::AppHigher);
        assert_eq!(r.status(0.0), VarianceStatus::AppHigher);
    }

    #[test]
    fn test_reconcile_is_deterministic() {
        let app = table(
            SourceType::App,
            vec![
                row("U2", "A1", SourceType::App, Some(1.0), Some(2.0)),
                row("U1", "A1", SourceType::App, Some(3.0), Some(4.0)),
            ],
        );
        let sisco = table(SourceType::Sisco, vec![]);

        let first = Reconciler::new().reconcile(&app, &sisco).unwrap();
        let second = Reconciler::new().reconcile(&app, &sisco).unwrap();

        assert_eq!(first.rows, second.rows);
    }

    #[test]
    fn test_reconcile_rejects_mislabeled_sources() {
        let app = table(SourceType::Sisco, vec![]);
        let sisco = table(SourceType::Sisco, vec![]);

        let result = Reconciler::new().reconcile(&app, &sisco);
        assert!(matches!(
            result,
            Err(ReconError::Schema { stage: Stage::Reconciliation, .. })
        ));
    }

    #[test]
    fn test_reconcile_requires_matching_unit_columns() {
        let app = table(SourceType::App, vec![]);
        let mut sisco = table(SourceType::Sisco, vec![]);
        sisco.unit_column = "codigo".to_string();

        match Reconciler::new().reconcile(&app, &sisco) {
            Err(ReconError::Schema { missing, .. }) => assert_eq!(missing, vec!["Codigo"]),
            other => panic!("expected schema error, got {:?}", other),
        }
    }
}
