//! Streaming XLSX writer
//!
//! Rows are rendered straight into the deflate stream of the worksheet entry,
//! with at most a window of rows held in memory.

mod workbook;
mod xml_writer;

pub use workbook::TableWriter;
pub use xml_writer::{escape_into, XmlWriter};
