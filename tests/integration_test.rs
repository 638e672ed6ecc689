//! Integration tests for generation and conversion

use chrono::NaiveDate;
use tabload::codec::{parse_line, Dialect, LineOutcome};
use tabload::config::{ConvertConfig, GeneratorConfig, ReaderConfig};
use tabload::generate::{CLASSES, NAME_LEN_RANGE, SCORE_RANGE};
use tabload::record::HEADER;
use tabload::types::CellValue;
use tabload::{convert, DatasetGenerator, TableError, TableReader, TableWriter};
use tempfile::tempdir;

fn read_rows(path: &std::path::Path) -> Vec<tabload::Row> {
    let mut reader = TableReader::open(path, &ReaderConfig::default()).unwrap();
    let rows = reader.rows().unwrap().collect::<Result<Vec<_>, _>>().unwrap();
    rows
}

#[test]
fn test_generated_workbook_has_header_and_count_rows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("students.xlsx");
    let small_window = GeneratorConfig {
        window_size: 50,
        flush_interval: 30,
        ..GeneratorConfig::default()
    };

    let mut generator = DatasetGenerator::seeded(small_window, 11).unwrap();
    generator.generate(500, &path).unwrap();

    let rows = read_rows(&path);
    assert_eq!(rows.len(), 501);
    assert_eq!(rows[0].to_strings(), HEADER);

    let first = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
    let last = NaiveDate::from_ymd_opt(2010, 12, 31).unwrap();
    for (i, row) in rows[1..].iter().enumerate() {
        assert_eq!(row.cell(0), &CellValue::Int(i as i64 + 1));
        for col in [1, 2] {
            let name = row.cell(col).as_string();
            assert!(NAME_LEN_RANGE.contains(&name.len()));
            assert!(name.chars().all(|c| c.is_ascii_uppercase()));
        }
        let dob = NaiveDate::parse_from_str(&row.cell(3).as_string(), "%Y-%m-%d").unwrap();
        assert!(dob >= first && dob <= last);
        assert!(CLASSES.contains(&row.cell(4).as_string().as_str()));
        let score = row.cell(5).as_i64().unwrap();
        assert!(SCORE_RANGE.contains(&(score as i32)));
    }
}

#[test]
fn test_zero_count_yields_header_only() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.xlsx");

    DatasetGenerator::new(GeneratorConfig::default())
        .unwrap()
        .generate(0, &path)
        .unwrap();

    let rows = read_rows(&path);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].to_strings(), HEADER);
}

#[test]
fn test_conversion_adds_ten_and_preserves_rows() {
    let dir = tempdir().unwrap();
    let xlsx = dir.path().join("students.xlsx");
    let csv = dir.path().join("students.csv");

    let mut generator = DatasetGenerator::seeded(GeneratorConfig::default(), 3).unwrap();
    generator.generate(2_345, &xlsx).unwrap();
    let source_rows = read_rows(&xlsx);

    let config = ConvertConfig {
        batch_size: 100,
        ..ConvertConfig::default()
    };
    let summary = convert(&xlsx, &csv, &ReaderConfig::default(), &config).unwrap();
    assert_eq!(summary.rows, 2_345);
    assert_eq!(summary.destination, csv);

    let content = std::fs::read_to_string(&csv).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some("studentId,firstName,lastName,dob,class,score"));

    let mut count = 0;
    for (line, source) in lines.zip(&source_rows[1..]) {
        let LineOutcome::Record(record) = parse_line(line, Dialect::Plain) else {
            panic!("unparseable line {line}");
        };
        assert_eq!(record.id, source.cell(0).as_i64().unwrap());
        assert_eq!(record.first_name, source.cell(1).as_string());
        assert_eq!(i64::from(record.score), source.cell(5).as_i64().unwrap() + 10);
        count += 1;
    }
    assert_eq!(count, 2_345);
}

#[test]
fn test_end_to_end_example_row() {
    let dir = tempdir().unwrap();
    let xlsx = dir.path().join("one.xlsx");
    let csv = dir.path().join("one.csv");

    let mut writer = TableWriter::create(&xlsx, &HEADER, &GeneratorConfig::default()).unwrap();
    writer
        .append_row([
            CellValue::Int(1),
            "John".into(),
            "Doe".into(),
            "2005-06-15".into(),
            "Class1".into(),
            CellValue::Int(70),
        ])
        .unwrap();
    writer.close().unwrap();

    convert(&xlsx, &csv, &ReaderConfig::default(), &ConvertConfig::default()).unwrap();

    let content = std::fs::read_to_string(&csv).unwrap();
    assert_eq!(
        content,
        "studentId,firstName,lastName,dob,class,score\n1,John,Doe,2005-06-15,Class1,80\n"
    );
}

#[test]
fn test_zero_byte_source_fails_without_output() {
    let dir = tempdir().unwrap();
    let xlsx = dir.path().join("empty.xlsx");
    std::fs::write(&xlsx, b"").unwrap();
    let csv = dir.path().join("out.csv");

    let err = convert(&xlsx, &csv, &ReaderConfig::default(), &ConvertConfig::default()).unwrap_err();

    assert!(matches!(err, TableError::Format(_)));
    assert!(!csv.exists());
}

#[test]
fn test_oversized_source_is_rejected() {
    let dir = tempdir().unwrap();
    let xlsx = dir.path().join("big.xlsx");
    DatasetGenerator::seeded(GeneratorConfig::default(), 5)
        .unwrap()
        .generate(200, &xlsx)
        .unwrap();

    let tight = ReaderConfig {
        max_bytes: 512,
        ..ReaderConfig::default()
    };
    let err = TableReader::open(&xlsx, &tight).err().unwrap();
    assert!(matches!(err, TableError::SizeLimitExceeded { limit: 512, .. }));
}

#[test]
fn test_highly_compressible_sheet_fails_ratio_check() {
    let dir = tempdir().unwrap();
    let xlsx = dir.path().join("repetitive.xlsx");
    let mut writer = TableWriter::create(&xlsx, &HEADER, &GeneratorConfig::default()).unwrap();
    for _ in 0..5_000 {
        writer
            .append_row([CellValue::Int(1), "AAAA".into(), "AAAA".into()])
            .unwrap();
    }
    writer.close().unwrap();

    let strict = ReaderConfig {
        min_inflate_ratio: 0.5,
        ..ReaderConfig::default()
    };
    let err = TableReader::open(&xlsx, &strict).err().unwrap();
    assert!(matches!(err, TableError::CompressionRatio { .. }));
}
