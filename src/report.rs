// 📤 Report Export - the discrepancy table as a downloadable spreadsheet (or CSV)

use crate::config::SHEET_COLUMN;
use crate::error::Result;
use crate::parser::SourceType;
use crate::reconciliation::{ReconciliationReport, ReconciliationRow};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::io::Write;
use std::path::Path;

pub const REPORT_SHEET: &str = "Reconciliacion";
pub const TYPE_COLUMN: &str = "Tipo";
pub const VALIDATION_COLUMN: &str = "Validacion";

/// Header row: unit column, complex, type, APP, SISCO, Validacion
pub fn report_columns(report: &ReconciliationReport) -> Vec<String> {
    vec![
        report.unit_column.clone(),
        SHEET_COLUMN.to_string(),
        TYPE_COLUMN.to_string(),
        SourceType::App.code().to_string(),
        SourceType::Sisco.code().to_string(),
        VALIDATION_COLUMN.to_string(),
    ]
}

fn build_workbook(report: &ReconciliationReport) -> Result<Workbook> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(REPORT_SHEET)?;

    let bold = Format::new().set_bold();
    for (col, name) in report_columns(report).iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, name, &bold)?;
    }

    for (idx, row) in report.rows.iter().enumerate() {
        write_row(worksheet, (idx + 1) as u32, row)?;
    }

    worksheet.autofit();
    Ok(workbook)
}

fn write_row(ws: &mut Worksheet, row: u32, record: &ReconciliationRow) -> Result<()> {
    ws.write_string(row, 0, &record.unit_code)?;
    ws.write_string(row, 1, &record.complex)?;
    ws.write_string(row, 2, record.slot.display_label())?;
    ws.write_number(row, 3, record.app)?;
    ws.write_number(row, 4, record.sisco)?;
    ws.write_number(row, 5, record.validation)?;
    Ok(())
}

/// Serialize the report to xlsx bytes (for downloads)
pub fn to_xlsx_bytes(report: &ReconciliationReport) -> Result<Vec<u8>> {
    let mut workbook = build_workbook(report)?;
    Ok(workbook.save_to_buffer()?)
}

pub fn write_xlsx(report: &ReconciliationReport, path: &Path) -> Result<()> {
    let mut workbook = build_workbook(report)?;
    workbook.save(path)?;
    Ok(())
}

/// Write the report as CSV, same columns as the spreadsheet
pub fn write_csv<W: Write>(report: &ReconciliationReport, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(report_columns(report))?;

    for row in &report.rows {
        csv_writer.write_record([
            row.unit_code.clone(),
            row.complex.clone(),
            row.slot.display_label().to_string(),
            row.app.to_string(),
            row.sisco.to_string(),
            row.validation.to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}
