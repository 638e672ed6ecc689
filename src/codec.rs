//! Row codec shared by the generator, the converter and the bulk loader
//!
//! Cells are read leniently (a missing cell is the type's zero value) while
//! delimited lines are parsed into a two-variant [`LineOutcome`]: a line
//! that cannot become a [`Record`] is skipped, never raised.
//!
//! The `Plain` dialect splits on every comma and never quotes, so a text
//! field containing a comma shifts the columns after it. `Quoted` encodes
//! such fields RFC 4180 style instead.

use crate::csv::{CsvEncoder, CsvParser, DELIMITER, QUOTE};
use crate::error::{Result, TableError};
use crate::record::{Record, FIELD_COUNT, HEADER};
use crate::types::CellValue;
use chrono::NaiveDate;
use serde::Deserialize;

/// Delimited text dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Split on the delimiter, no quoting or escaping
    #[default]
    Plain,
    /// RFC 4180 quoting for fields containing the delimiter, quotes or newlines
    Quoted,
}

impl std::str::FromStr for Dialect {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(Dialect::Plain),
            "quoted" | "rfc4180" => Ok(Dialect::Quoted),
            other => Err(TableError::Config(format!("unknown dialect '{}'", other))),
        }
    }
}

/// Result of parsing one delimited line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Record(Record),
    /// Too few fields or an unparseable id, date or score
    Skip,
}

/// Text rendering of a cell; numbers render as truncated integers
pub fn cell_to_text(cell: &CellValue) -> String {
    match cell {
        CellValue::Empty => String::new(),
        CellValue::String(s) => s.clone(),
        CellValue::Int(i) => itoa::Buffer::new().format(*i).to_string(),
        CellValue::Float(f) => itoa::Buffer::new().format(f.trunc() as i64).to_string(),
        other => other.as_string(),
    }
}

/// Integer reading of a cell
///
/// Empty cells, booleans and error cells read as 0; floats round to nearest.
/// A text cell that does not parse as an integer is a format error.
pub fn cell_to_int(cell: &CellValue) -> Result<i64> {
    match cell {
        CellValue::Empty | CellValue::Bool(_) | CellValue::Error(_) => Ok(0),
        CellValue::Int(i) => Ok(*i),
        CellValue::Float(f) => Ok(f.round() as i64),
        CellValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| TableError::Format(format!("expected an integer cell, found '{}'", s))),
    }
}

/// Split a line into raw (untrimmed) fields
pub fn split_line(line: &str, dialect: Dialect) -> Vec<String> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    match dialect {
        Dialect::Plain => line.split(DELIMITER as char).map(str::to_string).collect(),
        Dialect::Quoted => CsvParser::new(DELIMITER, QUOTE).parse_line(line),
    }
}

/// Parse a delimited line into a record
pub fn parse_line(line: &str, dialect: Dialect) -> LineOutcome {
    let fields = split_line(line, dialect);
    if fields.len() < FIELD_COUNT {
        return LineOutcome::Skip;
    }
    let parsed = (|| {
        Some(Record {
            id: fields[0].trim().parse().ok()?,
            first_name: fields[1].trim().to_string(),
            last_name: fields[2].trim().to_string(),
            date_of_birth: NaiveDate::parse_from_str(fields[3].trim(), "%Y-%m-%d").ok()?,
            group_label: fields[4].trim().to_string(),
            score: fields[5].trim().parse().ok()?,
        })
    })();
    match parsed {
        Some(record) => LineOutcome::Record(record),
        None => LineOutcome::Skip,
    }
}

/// Append `fields` to `out` as one newline-terminated line
pub fn write_fields<S: AsRef<str>>(out: &mut String, fields: &[S], dialect: Dialect) {
    match dialect {
        Dialect::Plain => {
            for (i, field) in fields.iter().enumerate() {
                if i > 0 {
                    out.push(DELIMITER as char);
                }
                out.push_str(field.as_ref());
            }
        }
        Dialect::Quoted => CsvEncoder::new(DELIMITER, QUOTE).encode_row(fields, out),
    }
    out.push('\n');
}

/// Append five text fields plus `score + offset` as one line
pub fn write_scored_line<S: AsRef<str>>(
    out: &mut String,
    text_fields: &[S; FIELD_COUNT - 1],
    score: i64,
    offset: i64,
    dialect: Dialect,
) {
    let mut score_buf = itoa::Buffer::new();
    let score = score_buf.format(score.saturating_add(offset));
    let fields: [&str; FIELD_COUNT] = [
        text_fields[0].as_ref(),
        text_fields[1].as_ref(),
        text_fields[2].as_ref(),
        text_fields[3].as_ref(),
        text_fields[4].as_ref(),
        score,
    ];
    write_fields(out, &fields, dialect);
}

/// Append a record with `offset` added to its score
pub fn write_record(out: &mut String, record: &Record, offset: i64, dialect: Dialect) {
    let mut id_buf = itoa::Buffer::new();
    let dob = record.date_of_birth.format("%Y-%m-%d").to_string();
    let text_fields = [
        id_buf.format(record.id),
        record.first_name.as_str(),
        record.last_name.as_str(),
        dob.as_str(),
        record.group_label.as_str(),
    ];
    write_scored_line(out, &text_fields, i64::from(record.score), offset, dialect);
}

/// Serialize a record to a newline-terminated line
pub fn serialize_record(record: &Record, offset: i64, dialect: Dialect) -> String {
    let mut line = String::with_capacity(64);
    write_record(&mut line, record, offset, dialect);
    line
}

/// The fixed header line, newline-terminated
pub fn header_line() -> String {
    let mut line = String::with_capacity(48);
    write_fields(&mut line, &HEADER, Dialect::Plain);
    line
}
