//! Quoting encoder and parser for the `Quoted` text dialect

mod encoder;
mod parser;

pub use encoder::CsvEncoder;
pub use parser::CsvParser;

/// Field delimiter of the delimited text wire format
pub const DELIMITER: u8 = b',';

/// Quote character used by the `Quoted` dialect
pub const QUOTE: u8 = b'"';
