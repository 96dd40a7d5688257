// 🔐 Authorization Filter - which sheets belong to authorized complexes
// Registry identifiers are uppercase; sheet names are uppercased at lookup time.

use crate::error::Result;
use crate::workbook::Workbook;
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

// ============================================================================
// COMPLEX REGISTRY
// ============================================================================

/// Authorized complex ("conjunto") identifiers, fixed for the session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplexRegistry {
    complexes: BTreeSet<String>,
}

impl ComplexRegistry {
    pub fn new<I, S>(complexes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ComplexRegistry {
            complexes: complexes
                .into_iter()
                .map(|c| c.as_ref().trim().to_uppercase())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    /// Parse a newline-delimited list, one identifier per line
    pub fn from_lines(text: &str) -> Self {
        Self::new(text.lines())
    }

    /// Load the authorized list file. A missing file means nobody is authorized.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Authorized complex list {} not found, no sheet will be authorized",
                path.display()
            );
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let registry = Self::from_lines(&text);
        info!(
            "Loaded {} authorized complexes from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Case-insensitive membership test. Only case is normalized: `"A1 "` is not `"A1"`.
    pub fn contains(&self, name: &str) -> bool {
        self.complexes.contains(&name.to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.complexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.complexes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.complexes.iter().map(String::as_str)
    }
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Sheet names split by authorization, each side in workbook order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SheetClassification {
    pub authorized: Vec<String>,
    pub unauthorized: Vec<String>,
}

impl SheetClassification {
    pub fn has_authorized(&self) -> bool {
        !self.authorized.is_empty()
    }

    /// Uppercase authorized names, the form the APP normalizer filters on
    pub fn authorized_set(&self) -> ComplexRegistry {
        ComplexRegistry::new(&self.authorized)
    }
}

/// Partition sheet names into authorized and unauthorized.
///
/// Names keep their original casing and relative order in both outputs.
pub fn classify<S: AsRef<str>>(sheet_names: &[S], registry: &ComplexRegistry) -> SheetClassification {
    let mut classification = SheetClassification::default();

    for name in sheet_names {
        let name = name.as_ref();
        if registry.contains(name) {
            classification.authorized.push(name.to_string());
        } else {
            classification.unauthorized.push(name.to_string());
        }
    }

    classification
}

/// Open workbook bytes and classify their sheets
pub fn classify_workbook(
    label: &str,
    bytes: &[u8],
    registry: &ComplexRegistry,
) -> Result<SheetClassification> {
    let workbook = Workbook::from_bytes(label, bytes)?;
    Ok(classify(&workbook.sheet_names(), registry))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconError;
    use std::collections::HashSet;

    #[test]
    fn test_registry_from_lines_uppercases_and_skips_blanks() {
        let registry = ComplexRegistry::from_lines("torres del parque\n\n  A1  \r\nb2\n");

        assert_eq!(registry.len(), 3);
        assert!(registry.contains("TORRES DEL PARQUE"));
        assert!(registry.contains("a1"));
        assert!(registry.contains("B2"));
        assert!(!registry.contains("C3"));
    }

    #[test]
    fn test_classify_preserves_order_and_case() {
        let registry = ComplexRegistry::new(["A1", "C3"]);
        let sheets = ["c3", "B2", "A1", "Resumen"];

        let result = classify(&sheets, &registry);

        assert_eq!(result.authorized, vec!["c3", "A1"]);
        assert_eq!(result.unauthorized, vec!["B2", "Resumen"]);
    }

    #[test]
    fn test_classify_partitions_every_sheet() {
        let registry = ComplexRegistry::new(["A1", "B2", "Z9"]);
        let sheets = ["A1", "b2", "X", "Y", "a1"];

        let result = classify(&sheets, &registry);

        let authorized: HashSet<&String> = result.authorized.iter().collect();
        let unauthorized: HashSet<&String> = result.unauthorized.iter().collect();
        assert!(authorized.is_disjoint(&unauthorized));
        assert_eq!(result.authorized.len() + result.unauthorized.len(), sheets.len());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_padded_sheet_name_is_not_authorized() {
        let registry = ComplexRegistry::new(["A1"]);

        let result = classify(&["A1 ", "A1", " a1"], &registry);

        assert_eq!(result.authorized, vec!["A1"]);
        assert_eq!(result.unauthorized, vec!["A1 ", " a1"]);
    }

    #[test]
    fn test_classify_with_empty_registry() {
        let result = classify(&["A1"], &ComplexRegistry::default());
        assert!(!result.has_authorized());
        assert_eq!(result.unauthorized, vec!["A1"]);
    }

    #[test]
    fn test_classify_workbook_rejects_unreadable_bytes() {
        let registry = ComplexRegistry::new(["A1"]);
        let result = classify_workbook("APP", b"not a workbook", &registry);
        assert!(matches!(result, Err(ReconError::WorkbookRead { .. })));
    }

    #[test]
    fn test_load_missing_file_is_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ComplexRegistry::load(&dir.path().join("missing.txt")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_load_reads_list_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conjuntos_autorizados.txt");
        std::fs::write(&path, "a1\nb2\n").unwrap();

        let registry = ComplexRegistry::load(&path).unwrap();
        assert_eq!(registry.iter().collect::<Vec<_>>(), vec!["A1", "B2"]);
    }
}
