//! Debug symbol data attached to a module.

use std::fmt;

use crate::core::body::InstrId;

/// Debug-symbol container formats.
///
/// `Pdb` is checked first when both companions exist; `Mdb` is the canonical
/// output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolFormat {
    Pdb,
    Mdb,
}

impl SymbolFormat {
    /// File extension of the companion file.
    pub fn extension(self) -> &'static str {
        match self {
            SymbolFormat::Pdb => "pdb",
            SymbolFormat::Mdb => "mdb",
        }
    }
}

impl fmt::Display for SymbolFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Maps an instruction to a source location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencePoint {
    pub instruction: InstrId,
    /// Index into [`SymbolData::documents`]
    pub document: u32,
    pub line: u32,
    pub column: u16,
}

/// Module-level symbol information.
///
/// Per-instruction locations live on each method body; this holds what is
/// shared across the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolData {
    /// Format the symbols were read from
    pub source_format: SymbolFormat,

    /// Source document paths
    pub documents: Vec<String>,
}

impl SymbolData {
    pub fn new(source_format: SymbolFormat) -> Self {
        SymbolData {
            source_format,
            documents: Vec::new(),
        }
    }

    /// Index of a document, adding it if needed.
    pub fn document_index(&mut self, path: &str) -> u32 {
        if let Some(index) = self.documents.iter().position(|d| d == path) {
            return index as u32;
        }
        self.documents.push(path.to_string());
        (self.documents.len() - 1) as u32
    }
}
