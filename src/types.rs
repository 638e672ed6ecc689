//! Cell and row types shared by the table writer and reader

use std::fmt;

/// Cell style presets understood by the generated `styles.xml`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CellStyle {
    /// Default style - no formatting
    #[default]
    Default = 0,
    /// Bold text for headers
    HeaderBold = 1,
}

impl CellStyle {
    /// Get the style index for XML
    pub fn index(&self) -> u32 {
        *self as u32
    }
}

/// Represents a single cell value in a worksheet
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Empty or missing cell
    Empty,
    /// Text value
    String(String),
    /// Integral numeric value
    Int(i64),
    /// Non-integral numeric value
    Float(f64),
    /// Boolean value
    Bool(bool),
    /// Error value (`t="e"`)
    Error(String),
}

impl CellValue {
    /// Convert cell value to string
    pub fn as_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::String(s) => s.clone(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Error(e) => format!("ERROR: {}", e),
        }
    }

    /// Check if cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Try to convert to integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(i) => Some(*i),
            CellValue::Float(f) => Some(*f as i64),
            CellValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Parse the raw `<v>` text of a numeric cell
    ///
    /// Integral text becomes `Int`, anything else numeric becomes `Float`.
    pub fn from_numeric_text(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Some(CellValue::Empty);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Some(CellValue::Int(i));
        }
        let f = raw.parse::<f64>().ok()?;
        if f.fract() == 0.0 && f.abs() < 9.0e15 {
            Some(CellValue::Int(f as i64))
        } else {
            Some(CellValue::Float(f))
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

impl From<i32> for CellValue {
    fn from(i: i32) -> Self {
        CellValue::Int(i64::from(i))
    }
}

/// Columns in a worksheet (`A` through `XFD`)
pub const MAX_COLUMNS: usize = 16_384;

/// Cell addressing helpers (`A1` style references)
pub struct Cell;

impl Cell {
    /// Convert a 0-based column index to letters (0 -> A, 25 -> Z, 26 -> AA)
    pub fn col_to_letter(col: u32) -> String {
        let mut result = String::new();
        let mut col = col + 1;

        while col > 0 {
            col -= 1;
            result.insert(0, (b'A' + (col % 26) as u8) as char);
            col /= 26;
        }

        result
    }

    /// Parse the column part of a reference ("A1" -> 0, "AA7" -> 26)
    ///
    /// Returns `None` when there are no letters or the letters overflow.
    pub fn column_index(reference: &str) -> Option<usize> {
        let mut col_idx = 0usize;
        let mut seen = false;
        for ch in reference.chars() {
            if ch.is_ascii_alphabetic() {
                seen = true;
                let digit = ch.to_ascii_uppercase() as usize - 'A' as usize + 1;
                col_idx = col_idx.checked_mul(26)?.checked_add(digit)?;
            } else {
                break;
            }
        }
        if seen {
            Some(col_idx - 1)
        } else {
            None
        }
    }
}

/// Represents one row read from a worksheet
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Row index (0-based, in read order)
    pub index: u64,
    /// Cells in this row; gaps before the last present cell are `Empty`
    pub cells: Vec<CellValue>,
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl Row {
    /// Create a new row
    pub fn new(index: u64, cells: Vec<CellValue>) -> Self {
        Row { index, cells }
    }

    /// Get the cell at a column, `Empty` when the row is shorter
    pub fn cell(&self, col: usize) -> &CellValue {
        self.cells.get(col).unwrap_or(&EMPTY_CELL)
    }

    /// Get number of cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if row is empty
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() || self.cells.iter().all(|c| c.is_empty())
    }

    /// Convert row to vector of strings
    pub fn to_strings(&self) -> Vec<String> {
        self.cells.iter().map(|c| c.as_string()).collect()
    }
}
