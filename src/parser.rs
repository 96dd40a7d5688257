// 🏗️ Source Normalizers - one per billing system
// Each source workbook is flattened into (unit, complex, moto, cuotaparqu) amount rows.

use crate::authorization::ComplexRegistry;
use crate::config::{PipelineOptions, SHEET_COLUMN};
use crate::error::{Result, Stage};
use crate::rates::{join_rates, RateTable};
use crate::reconciliation::{AmountRow, SlotType, SourceTable};
use crate::schema::require_columns;
use crate::workbook::{Cell, Sheet, Table, Workbook};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Raw parking slot text in the APP workbook, formatted `<ignored>-<subtype>`
pub const PARKING_COLUMN: &str = "Parqueadero";

/// Subtype derived from `PARKING_COLUMN`
pub const SUBTYPE_COLUMN: &str = "Parqueadero_Parte2";

// ============================================================================
// CORE TYPES
// ============================================================================

/// SourceType - which billing system a row comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceType {
    /// Resident-facing app: slot counts priced with the rate table
    App,
    /// Accounting system: amounts already charged
    Sisco,
}

impl SourceType {
    /// Source tag written into the reconciliation columns
    pub fn code(&self) -> &str {
        match self {
            SourceType::App => "APP",
            SourceType::Sisco => "SISCO",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// SourceNormalizer - turns one uploaded workbook into tagged amount rows
pub trait SourceNormalizer {
    fn normalize(&self, workbook: &Workbook) -> Result<SourceTable>;

    fn source_type(&self) -> SourceType;
}

// ============================================================================
// SLOT COUNT AGGREGATE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SlotCountRow {
    pub unit_code: String,
    pub complex: String,
    /// One count per entry of `SlotCountAggregate::subtypes`
    pub counts: Vec<u32>,
}

/// Parking slots per (unit, complex), one count column per observed subtype.
///
/// Every (unit, complex) pair appears once; subtypes a unit never had count zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotCountAggregate {
    /// Distinct subtypes across the whole dataset, sorted
    pub subtypes: Vec<String>,
    /// Sorted by (unit code, complex)
    pub rows: Vec<SlotCountRow>,
}

impl SlotCountAggregate {
    pub fn count(&self, row: &SlotCountRow, subtype: &str) -> u32 {
        self.subtypes
            .iter()
            .position(|s| s == subtype)
            .and_then(|i| row.counts.get(i).copied())
            .unwrap_or(0)
    }

    /// Sum of the counts whose subtype equals `label`, ignoring case and padding
    pub fn count_matching(&self, row: &SlotCountRow, label: &str) -> u32 {
        let label = label.trim();
        self.subtypes
            .iter()
            .zip(&row.counts)
            .filter(|(subtype, _)| subtype.trim().eq_ignore_ascii_case(label))
            .map(|(_, count)| *count)
            .sum()
    }

    pub fn find(&self, unit_code: &str, complex: &str) -> Option<&SlotCountRow> {
        self.rows
            .iter()
            .find(|r| r.unit_code == unit_code && r.complex == complex)
    }
}

/// Text after the first `-`, or empty when there is none
pub fn parking_subtype(raw: &str) -> &str {
    raw.split_once('-').map(|(_, rest)| rest).unwrap_or("")
}

// ============================================================================
// APP NORMALIZER
// ============================================================================

/// APP workbook: authorized sheets only, counted per slot subtype, then priced
pub struct AppNormalizer {
    authorized: ComplexRegistry,
    rates: RateTable,
    options: PipelineOptions,
}

impl AppNormalizer {
    pub fn new(authorized: ComplexRegistry, rates: RateTable, options: PipelineOptions) -> Self {
        AppNormalizer {
            authorized,
            rates,
            options,
        }
    }

    /// Stack the authorized sheets and derive the parking subtype column
    pub fn tagged_rows(&self, workbook: &Workbook) -> Table {
        let sheets: Vec<&Sheet> = workbook
            .sheets
            .iter()
            .filter(|s| self.authorized.contains(&s.name))
            .collect();
        info!(
            "APP: stacking {} authorized sheet(s) of {}",
            sheets.len(),
            workbook.sheets.len()
        );

        let mut table = Table::stack(sheets, SHEET_COLUMN);

        if table.has_column(PARKING_COLUMN) {
            let subtypes: Vec<Cell> = table
                .column(PARKING_COLUMN)
                .map(|cell| Cell::Text(parking_subtype(&cell.as_key()).to_string()))
                .collect();
            table.set_column(SUBTYPE_COLUMN, subtypes);
        } else {
            warn!("APP: no '{}' column, subtype derivation skipped", PARKING_COLUMN);
        }

        table
    }

    /// Count slot subtypes per (unit code, complex)
    pub fn slot_counts(&self, workbook: &Workbook) -> Result<SlotCountAggregate> {
        let table = self.tagged_rows(workbook);
        let unit_column = self.options.app_unit_column.as_str();

        require_columns(
            &table,
            &[unit_column, SHEET_COLUMN, SUBTYPE_COLUMN],
            Stage::AppNormalization,
            &workbook.label,
        )?;

        let idx = |name: &str| table.column_index(name).unwrap_or_default();
        let (unit_idx, complex_idx, subtype_idx) =
            (idx(unit_column), idx(SHEET_COLUMN), idx(SUBTYPE_COLUMN));

        let mut subtypes: BTreeSet<String> = BTreeSet::new();
        let mut groups: BTreeMap<(String, String), BTreeMap<String, u32>> = BTreeMap::new();
        let mut skipped = 0usize;

        for row in &table.rows {
            let unit_code = row[unit_idx].as_key();
            if unit_code.is_empty() {
                skipped += 1;
                continue;
            }
            let complex = row[complex_idx].as_text();
            let subtype = row[subtype_idx].as_text();

            subtypes.insert(subtype.clone());
            *groups
                .entry((unit_code, complex))
                .or_default()
                .entry(subtype)
                .or_insert(0) += 1;
        }

        if skipped > 0 {
            debug!("APP: skipped {} row(s) without a unit code", skipped);
        }

        let subtypes: Vec<String> = subtypes.into_iter().collect();
        let rows = groups
            .into_iter()
            .map(|((unit_code, complex), observed)| SlotCountRow {
                unit_code,
                complex,
                counts: subtypes
                    .iter()
                    .map(|s| observed.get(s).copied().unwrap_or(0))
                    .collect(),
            })
            .collect::<Vec<_>>();

        info!(
            "APP: {} unit/complex pairs, subtypes observed: {:?}",
            rows.len(),
            subtypes
        );
        Ok(SlotCountAggregate { subtypes, rows })
    }
}

impl SourceNormalizer for AppNormalizer {
    fn normalize(&self, workbook: &Workbook) -> Result<SourceTable> {
        let counts = self.slot_counts(workbook)?;
        join_rates(&counts, &self.rates, &self.options)
    }

    fn source_type(&self) -> SourceType {
        SourceType::App
    }
}

// ============================================================================
// SISCO NORMALIZER
// ============================================================================

/// SISCO workbook: amounts already charged, read as they are
pub struct SiscoNormalizer {
    /// Only set when SISCO sheets are filtered like APP ones
    authorized: Option<ComplexRegistry>,
    options: PipelineOptions,
}

impl SiscoNormalizer {
    /// Every sheet is read unless `authorized` is given
    pub fn new(options: PipelineOptions, authorized: Option<ComplexRegistry>) -> Self {
        SiscoNormalizer {
            authorized,
            options,
        }
    }
}

impl SourceNormalizer for SiscoNormalizer {
    fn normalize(&self, workbook: &Workbook) -> Result<SourceTable> {
        let sheets: Vec<&Sheet> = workbook
            .sheets
            .iter()
            .filter(|s| match &self.authorized {
                Some(registry) => registry.contains(&s.name),
                None => true,
            })
            .collect();
        info!("SISCO: stacking {} sheet(s)", sheets.len());

        let mut table = Table::stack(sheets, SHEET_COLUMN);
        let sisco_unit = self.options.sisco_unit_column.as_str();
        let car_column = SlotType::Car.internal_label();
        let moto_column = SlotType::Motorcycle.internal_label();

        require_columns(
            &table,
            &[sisco_unit, SHEET_COLUMN, car_column, moto_column],
            Stage::SiscoNormalization,
            &workbook.label,
        )?;

        let idx = |table: &Table, name: &str| table.column_index(name).unwrap_or_default();
        let (unit_idx, complex_idx, car_idx, moto_idx) = (
            idx(&table, sisco_unit),
            idx(&table, SHEET_COLUMN),
            idx(&table, car_column),
            idx(&table, moto_column),
        );
        table.rename_column(sisco_unit, &self.options.app_unit_column);

        let mut rows = Vec::with_capacity(table.len());
        for row in &table.rows {
            let unit_code = row[unit_idx].as_key();
            if unit_code.is_empty() {
                continue;
            }
            rows.push(AmountRow {
                unit_code,
                complex: row[complex_idx].as_text(),
                source: SourceType::Sisco,
                motorcycle: row[moto_idx].as_number(),
                car: row[car_idx].as_number(),
            });
        }

        debug!("SISCO: {} amount rows", rows.len());
        Ok(SourceTable {
            source: SourceType::Sisco,
            unit_column: table.columns[unit_idx].clone(),
            rows,
        })
    }

    fn source_type(&self) -> SourceType {
        SourceType::Sisco
    }
}

// ============================================================================
// TESTS
// ============================================================================
