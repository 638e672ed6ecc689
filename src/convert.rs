//! Spreadsheet to delimited text conversion

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info};

use crate::codec::{cell_to_int, cell_to_text};
use crate::config::{ConvertConfig, ReaderConfig};
use crate::csv_writer::CsvWriter;
use crate::error::Result;
use crate::record::FIELD_COUNT;
use crate::streaming_reader::TableReader;

/// Outcome of a completed conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionSummary {
    /// Data rows written, header excluded
    pub rows: u64,
    pub destination: PathBuf,
}

/// Convert the first sheet of `source` into a delimited text file
///
/// The source header row is skipped and replaced with the fixed header line.
/// Each score is written as `score + config.score_offset`. A score cell that
/// is not an integer fails the whole conversion and no output file is left.
pub fn convert<S, D>(
    source: S,
    destination: D,
    reader_config: &ReaderConfig,
    config: &ConvertConfig,
) -> Result<ConversionSummary>
where
    S: AsRef<Path>,
    D: AsRef<Path>,
{
    let started = Instant::now();
    let source = source.as_ref();
    let mut reader = TableReader::open(source, reader_config)?;
    let mut writer = CsvWriter::new(destination, config.batch_size, config.dialect)?;
    writer.write_header()?;

    let mut rows = reader.rows()?;
    if !rows.skip_header()? {
        debug!(source = %source.display(), "source sheet has no header row");
    }

    while let Some(row) = rows.next_row()? {
        let text: [String; FIELD_COUNT - 1] =
            std::array::from_fn(|col| cell_to_text(row.cell(col)));
        let score = cell_to_int(row.cell(FIELD_COUNT - 1))?;
        writer.write_scored_row(&text, score, config.score_offset)?;
    }

    let rows = writer.row_count();
    let destination = writer.save()?;
    info!(
        rows,
        source = %source.display(),
        destination = %destination.display(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "converted spreadsheet"
    );
    Ok(ConversionSummary { rows, destination })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::error::TableError;
    use crate::fast_writer::TableWriter;
    use crate::record::HEADER;
    use crate::types::CellValue;
    use tempfile::tempdir;

    #[test]
    fn test_bad_score_removes_output() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("bad.xlsx");
        let mut writer = TableWriter::create(&source, &HEADER, &GeneratorConfig::default()).unwrap();
        writer
            .append_row([
                CellValue::Int(1),
                "A".into(),
                "B".into(),
                "2004-01-01".into(),
                "Class1".into(),
                "high".into(),
            ])
            .unwrap();
        writer.close().unwrap();

        let destination = dir.path().join("bad.csv");
        let err = convert(
            &source,
            &destination,
            &ReaderConfig::default(),
            &ConvertConfig::default(),
        )
        .unwrap_err();

        assert!(matches!(err, TableError::Format(_)));
        assert!(!destination.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_missing_cells_read_as_zero_values() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("sparse.xlsx");
        let mut writer = TableWriter::create(&source, &HEADER, &GeneratorConfig::default()).unwrap();
        writer.append_row([CellValue::Int(9), "ONLY".into()]).unwrap();
        writer.close().unwrap();

        let destination = dir.path().join("sparse.csv");
        let summary = convert(
            &source,
            &destination,
            &ReaderConfig::default(),
            &ConvertConfig::default(),
        )
        .unwrap();

        assert_eq!(summary.rows, 1);
        let content = std::fs::read_to_string(&destination).unwrap();
        assert_eq!(content.lines().nth(1), Some("9,ONLY,,,,10"));
    }
}
