// 📒 Workbook Layer - uploaded spreadsheets held fully in memory
// Every sheet is read once into a header + rows table; nothing is ever written back.

use crate::error::{ReconError, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::Path;

// ============================================================================
// CELL
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Text form used for grouping and join keys.
    ///
    /// Integral numbers print without a fractional part so a unit code typed
    /// as `101` and one stored as `"101"` land on the same key.
    pub fn as_key(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) => format_number(*n),
            Cell::Bool(b) => b.to_string(),
        }
    }

    /// Text form kept exactly as stored, padding included
    pub fn as_text(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            other => other.as_key(),
        }
    }

    /// Numeric value, parsing numeric text. Blank or non-numeric cells are missing.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}

// ============================================================================
// TABLE
// ============================================================================

/// Header row plus data rows. Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Push a row, padding or truncating it to the column count
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Empty);
        self.rows.push(row);
    }

    /// Iterate one column's cells. Yields nothing when the column is absent.
    pub fn column<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Cell> + 'a {
        let idx = self.column_index(name);
        self.rows
            .iter()
            .filter_map(move |row| idx.and_then(|i| row.get(i)))
    }

    /// Set a column to the given per-row values, replacing it when it already exists
    pub fn set_column(&mut self, name: &str, values: Vec<Cell>) {
        let idx = match self.column_index(name) {
            Some(idx) => idx,
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.push(Cell::Empty);
                }
                self.columns.len() - 1
            }
        };

        for (row, value) in self.rows.iter_mut().zip(values) {
            row[idx] = value;
        }
    }

    /// Rename a column. Returns false when `from` is absent.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.column_index(from) {
            Some(idx) => {
                self.columns[idx] = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Row-concatenate sheets, stamping every row with its sheet name.
    ///
    /// Columns are the union of all sheet headers in first-seen order, followed by
    /// `sheet_column`. Cells a sheet does not have are `Empty`. Sheet order and the
    /// row order inside each sheet are preserved.
    pub fn stack<'a, I>(sheets: I, sheet_column: &str) -> Table
    where
        I: IntoIterator<Item = &'a Sheet>,
    {
        let sheets: Vec<&Sheet> = sheets.into_iter().collect();

        let mut columns: Vec<String> = Vec::new();
        for sheet in &sheets {
            for column in &sheet.table.columns {
                if column != sheet_column && !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        columns.push(sheet_column.to_string());

        let positions: HashMap<&str, usize> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();
        let sheet_idx = columns.len() - 1;

        let mut stacked = Table::new(columns.clone());
        for sheet in &sheets {
            for row in &sheet.table.rows {
                let mut out = vec![Cell::Empty; columns.len()];
                for (column, cell) in sheet.table.columns.iter().zip(row) {
                    if let Some(&pos) = positions.get(column.as_str()) {
                        out[pos] = cell.clone();
                    }
                }
                out[sheet_idx] = Cell::Text(sheet.name.clone());
                stacked.rows.push(out);
            }
        }

        stacked
    }
}

// ============================================================================
// SHEET & WORKBOOK
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub table: Table,
}

impl Sheet {
    /// Build a sheet from raw rows; the first row is the header
    pub fn from_rows(name: &str, rows: &[Vec<Cell>]) -> Self {
        let mut iter = rows.iter();
        let columns = match iter.next() {
            Some(header) => header_names(header),
            None => Vec::new(),
        };

        let mut table = Table::new(columns);
        for row in iter {
            if row.iter().all(Cell::is_empty) {
                continue;
            }
            table.push_row(row.clone());
        }

        Sheet {
            name: name.to_string(),
            table,
        }
    }
}

/// Header cells to column names: trimmed, blanks become `Unnamed: {i}`,
/// repeats get the first free `.1`, `.2` suffix. Names are always unique.
fn header_names(header: &[Cell]) -> Vec<String> {
    let mut suffixes: HashMap<String, usize> = HashMap::new();
    let mut taken: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(header.len());

    for (i, cell) in header.iter().enumerate() {
        let base = match cell.as_key() {
            s if s.is_empty() => format!("Unnamed: {}", i),
            s => s,
        };

        let mut name = base.clone();
        if taken.contains(&name) {
            let count = suffixes.entry(base.clone()).or_insert(0);
            while taken.contains(&name) {
                *count += 1;
                name = format!("{}.{}", base, count);
            }
        }

        taken.insert(name.clone());
        names.push(name);
    }

    names
}

/// A read-only uploaded workbook
#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    /// Which upload this is ("APP", "Cobros", "SISCO", or a file name)
    pub label: String,
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    /// Parse workbook bytes (xlsx, xls, xlsb or ods)
    pub fn from_bytes(label: &str, bytes: &[u8]) -> Result<Self> {
        let read_error = |reason: String| ReconError::WorkbookRead {
            label: label.to_string(),
            reason,
        };

        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| read_error(e.to_string()))?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| read_error(format!("sheet '{}': {}", name, e)))?;

            let rows: Vec<Vec<Cell>> = range
                .rows()
                .map(|row| row.iter().map(Cell::from).collect())
                .collect();

            let sheet = Sheet::from_rows(&name, &rows);
            debug!(
                "{}: sheet '{}' has {} columns and {} rows",
                label,
                name,
                sheet.table.columns.len(),
                sheet.table.len()
            );
            sheets.push(sheet);
        }

        Ok(Workbook {
            label: label.to_string(),
            sheets,
        })
    }

    /// Read a workbook file fully into memory, then parse it
    pub fn open(label: &str, path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| ReconError::WorkbookRead {
            label: label.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::from_bytes(label, &bytes)
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    pub fn first_sheet(&self) -> Option<&Sheet> {
        self.sheets.first()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook as XlsxWorkbook;

    /// Cell value used to build test workbooks
    pub(crate) enum TestValue {
        T(&'static str),
        N(f64),
    }

    /// Build an xlsx in memory: one (sheet name, header, rows) per sheet
    pub(crate) fn xlsx_bytes(sheets: &[(&str, Vec<&str>, Vec<Vec<TestValue>>)]) -> Vec<u8> {
        let mut workbook = XlsxWorkbook::new();
        for (name, header, rows) in sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(*name).unwrap();
            for (col, title) in header.iter().enumerate() {
                worksheet.write_string(0, col as u16, *title).unwrap();
            }
            for (r, row) in rows.iter().enumerate() {
                for (c, value) in row.iter().enumerate() {
                    let (r, c) = ((r + 1) as u32, c as u16);
                    match value {
                        TestValue::T(s) => worksheet.write_string(r, c, *s).unwrap(),
                        TestValue::N(n) => worksheet.write_number(r, c, *n).unwrap(),
                    };
                }
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    fn sheet(name: &str, columns: &[&str], rows: Vec<Vec<Cell>>) -> Sheet {
        let mut table = Table::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            table.push_row(row);
        }
        Sheet {
            name: name.to_string(),
            table,
        }
    }

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    #[test]
    fn test_cell_key_normalizes_integral_numbers() {
        assert_eq!(Cell::Number(101.0).as_key(), "101");
        assert_eq!(Cell::Number(10.5).as_key(), "10.5");
        assert_eq!(text("  U1 ").as_key(), "U1");
        assert_eq!(Cell::Empty.as_key(), "");
    }

    #[test]
    fn test_cell_number_parses_text() {
        assert_eq!(text(" 1500 ").as_number(), Some(1500.0));
        assert_eq!(text("n/a").as_number(), None);
        assert_eq!(Cell::Empty.as_number(), None);
        assert_eq!(Cell::Number(2.5).as_number(), Some(2.5));
    }

    #[test]
    fn test_header_names_fill_blanks_and_dedupe() {
        let header = vec![text("Codigo"), Cell::Empty, text(" Codigo "), text("moto")];
        assert_eq!(
            header_names(&header),
            vec!["Codigo", "Unnamed: 1", "Codigo.1", "moto"]
        );
    }

    #[test]
    fn test_header_suffix_skips_names_already_taken() {
        let header = vec![text("Codigo"), text("Codigo"), text("Codigo.1")];
        assert_eq!(
            header_names(&header),
            vec!["Codigo", "Codigo.1", "Codigo.1.1"]
        );

        let header = vec![text("Codigo.1"), text("Codigo"), text("Codigo"), text("Codigo")];
        let names = header_names(&header);
        assert_eq!(names, vec!["Codigo.1", "Codigo", "Codigo.2", "Codigo.3"]);
        let unique: HashSet<&String> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn test_cell_text_keeps_padding() {
        assert_eq!(text("A1 ").as_text(), "A1 ");
        assert_eq!(text("A1 ").as_key(), "A1");
        assert_eq!(Cell::Number(7.0).as_text(), "7");
    }

    #[test]
    fn test_sheet_from_rows_skips_blank_rows() {
        let rows = vec![
            vec![text("Codigo"), text("Parqueadero")],
            vec![text("U1"), text("X-CARRO")],
            vec![Cell::Empty, text("  ")],
            vec![text("U2")],
        ];
        let sheet = Sheet::from_rows("A1", &rows);

        assert_eq!(sheet.table.columns, vec!["Codigo", "Parqueadero"]);
        assert_eq!(sheet.table.len(), 2);
        assert_eq!(sheet.table.rows[1], vec![text("U2"), Cell::Empty]);
    }

    #[test]
    fn test_stack_unions_columns_and_stamps_sheet() {
        let a = sheet("A1", &["Codigo", "Parqueadero"], vec![vec![text("U1"), text("X-CARRO")]]);
        let b = sheet(
            "b2",
            &["Codigo", "Extra"],
            vec![vec![text("U2"), text("e")], vec![text("U3"), text("f")]],
        );

        let stacked = Table::stack([&a, &b], "Nombre_Hoja");

        assert_eq!(
            stacked.columns,
            vec!["Codigo", "Parqueadero", "Extra", "Nombre_Hoja"]
        );
        assert_eq!(stacked.len(), 3);
        assert_eq!(
            stacked.rows[0],
            vec![text("U1"), text("X-CARRO"), Cell::Empty, text("A1")]
        );
        assert_eq!(
            stacked.rows[2],
            vec![text("U3"), Cell::Empty, text("f"), text("b2")]
        );
    }

    #[test]
    fn test_set_and_rename_column() {
        let mut table = Table::new(vec!["codigo".to_string()]);
        table.push_row(vec![text("U1")]);

        table.set_column("Tipo", vec![text("moto")]);
        assert_eq!(table.columns, vec!["codigo", "Tipo"]);
        assert!(table.rename_column("codigo", "Codigo"));
        assert!(!table.rename_column("missing", "x"));
        assert_eq!(table.column("Codigo").next(), Some(&text("U1")));
    }

    #[test]
    fn test_workbook_from_bytes_reads_every_sheet() {
        let bytes = xlsx_bytes(&[
            (
                "A1",
                vec!["Codigo", "Parqueadero"],
                vec![vec![TestValue::T("U1"), TestValue::T("X-CARRO")]],
            ),
            (
                "B2",
                vec!["codigo", "moto"],
                vec![vec![TestValue::N(101.0), TestValue::N(50.0)]],
            ),
        ]);

        let workbook = Workbook::from_bytes("APP", &bytes).unwrap();

        assert_eq!(workbook.sheet_names(), vec!["A1", "B2"]);
        let b2 = &workbook.sheets[1].table;
        assert_eq!(b2.rows[0][0].as_key(), "101");
        assert_eq!(b2.rows[0][1].as_number(), Some(50.0));
    }

    #[test]
    fn test_workbook_from_garbage_is_a_read_error() {
        let result = Workbook::from_bytes("APP", b"definitely not a spreadsheet");
        assert!(matches!(result, Err(ReconError::WorkbookRead { .. })));
    }
}
