//! Windowed single-sheet XLSX writer
//!
//! Rows are buffered in a window of at most `window_size` rows and flushed
//! into the worksheet entry of the ZIP stream, so memory stays bounded by the
//! window no matter how many rows are written. Strings are written inline
//! (`t="inlineStr"`) rather than through a shared strings table, which would
//! otherwise grow with every distinct value.
//!
//! The package is staged in a temporary file next to the destination and
//! only moved into place by [`TableWriter::close`]. Dropping a writer that
//! was never closed removes the staged file.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::CompressionMethod;

use super::xml_writer::{escape_into, XmlWriter};
use crate::config::GeneratorConfig;
use crate::error::{Result, TableError};
use crate::types::{Cell, CellStyle, CellValue};

const SHEET_PATH: &str = "xl/worksheets/sheet1.xml";
const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Streaming XLSX writer with a bounded row window
pub struct TableWriter {
    zip: ZipWriter<BufWriter<File>>,
    staged: NamedTempFile,
    destination: PathBuf,
    sheet_name: String,
    window: VecDeque<Vec<CellValue>>,
    window_size: usize,
    flush_interval: usize,
    since_flush: usize,
    flushed: u64,
    xml_buffer: Vec<u8>,     // reused for every rendered row
    column_refs: Vec<String>, // A, B, C, ...
}

impl TableWriter {
    /// Create a writer for `destination` and write the header row
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tabload::config::GeneratorConfig;
    /// use tabload::fast_writer::TableWriter;
    /// use tabload::types::CellValue;
    ///
    /// let mut writer = TableWriter::create("out.xlsx", &["id", "name"], &GeneratorConfig::default())?;
    /// writer.append_row([CellValue::Int(1), CellValue::from("ANNA")])?;
    /// writer.close()?;
    /// # Ok::<(), tabload::TableError>(())
    /// ```
    pub fn create<P, S>(destination: P, header: &[S], config: &GeneratorConfig) -> Result<Self>
    where
        P: AsRef<Path>,
        S: AsRef<str>,
    {
        if config.window_size == 0 || config.flush_interval == 0 {
            return Err(TableError::WriteError(
                "window size and flush interval must be positive".to_string(),
            ));
        }

        let destination = destination.as_ref().to_path_buf();
        let parent = match destination.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let staged = tempfile::Builder::new()
            .prefix(".tabload-")
            .suffix(".xlsx.part")
            .tempfile_in(&parent)?;
        let file = staged.as_file().try_clone()?;
        let mut zip = ZipWriter::new(BufWriter::with_capacity(256 * 1024, file));

        let options = Self::file_options();
        zip.start_file("[Content_Types].xml", options)?;
        zip.write_all(CONTENT_TYPES.as_bytes())?;
        zip.start_file("_rels/.rels", options)?;
        zip.write_all(ROOT_RELS.as_bytes())?;
        zip.start_file("docProps/app.xml", options)?;
        zip.write_all(APP_PROPS.as_bytes())?;

        zip.start_file(SHEET_PATH, options)?;
        {
            let mut xml = XmlWriter::new(&mut zip);
            xml.write_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n")?;
            xml.start_element("worksheet")?;
            xml.attribute("xmlns", NS_MAIN)?;
            xml.attribute("xmlns:r", NS_REL)?;
            xml.close_start_tag()?;
            xml.start_element("sheetData")?;
            xml.close_start_tag()?;
            xml.flush()?;
        }

        let column_refs = (0..26).map(Cell::col_to_letter).collect();

        let mut writer = TableWriter {
            zip,
            staged,
            destination,
            sheet_name: config.sheet_name.clone(),
            window: VecDeque::with_capacity(config.window_size.min(65_536)),
            window_size: config.window_size,
            flush_interval: config.flush_interval,
            since_flush: 0,
            flushed: 0,
            xml_buffer: Vec::with_capacity(8192),
            column_refs,
        };

        let header: Vec<CellValue> = header
            .iter()
            .map(|h| CellValue::String(h.as_ref().to_string()))
            .collect();
        writer.write_row_xml(&header, CellStyle::HeaderBold)?;
        Ok(writer)
    }

    fn file_options() -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(6))
            .large_file(true) // ZIP64 for sheets > 4GB
    }

    /// Append one row to the window
    ///
    /// The window is flushed every `flush_interval` appended rows; in between,
    /// the oldest rows are flushed whenever the window would exceed
    /// `window_size`.
    pub fn append_row<I>(&mut self, cells: I) -> Result<()>
    where
        I: IntoIterator<Item = CellValue>,
    {
        if self.window.len() >= self.window_size {
            let excess = self.window.len() + 1 - self.window_size;
            self.flush_oldest(excess)?;
        }
        self.window.push_back(cells.into_iter().collect());
        self.since_flush += 1;

        if self.since_flush >= self.flush_interval {
            self.flush()?;
        }
        Ok(())
    }

    /// Flush every buffered row to the worksheet stream
    pub fn flush(&mut self) -> Result<()> {
        let pending = self.window.len();
        self.flush_oldest(pending)?;
        self.since_flush = 0;
        debug!(flushed = self.flushed, "flushed row window");
        Ok(())
    }

    fn flush_oldest(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            let Some(row) = self.window.pop_front() else {
                break;
            };
            self.write_row_xml(&row, CellStyle::Default)?;
        }
        Ok(())
    }

    /// Render one row and hand it to the ZIP stream
    fn write_row_xml(&mut self, cells: &[CellValue], style: CellStyle) -> Result<()> {
        let row_num = self.flushed + 1;
        let mut num = itoa::Buffer::new();
        let row_ref = num.format(row_num).to_string();

        self.xml_buffer.clear();
        self.xml_buffer.extend_from_slice(b"<row r=\"");
        self.xml_buffer.extend_from_slice(row_ref.as_bytes());
        self.xml_buffer.extend_from_slice(b"\">");

        for (col_idx, value) in cells.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let generated;
            let col_letter = match self.column_refs.get(col_idx) {
                Some(letter) => letter.as_str(),
                None => {
                    generated = Cell::col_to_letter(col_idx as u32);
                    generated.as_str()
                }
            };

            self.xml_buffer.extend_from_slice(b"<c r=\"");
            self.xml_buffer.extend_from_slice(col_letter.as_bytes());
            self.xml_buffer.extend_from_slice(row_ref.as_bytes());
            self.xml_buffer.push(b'"');
            if style.index() > 0 {
                self.xml_buffer.extend_from_slice(b" s=\"");
                self.xml_buffer
                    .extend_from_slice(num.format(style.index()).as_bytes());
                self.xml_buffer.push(b'"');
            }

            match value {
                CellValue::Int(n) => {
                    self.xml_buffer.extend_from_slice(b"><v>");
                    self.xml_buffer.extend_from_slice(num.format(*n).as_bytes());
                    self.xml_buffer.extend_from_slice(b"</v></c>");
                }
                CellValue::Float(f) if f.is_finite() => {
                    self.xml_buffer.extend_from_slice(b"><v>");
                    self.xml_buffer.extend_from_slice(f.to_string().as_bytes());
                    self.xml_buffer.extend_from_slice(b"</v></c>");
                }
                CellValue::Bool(b) => {
                    self.xml_buffer.extend_from_slice(b" t=\"b\"><v>");
                    self.xml_buffer.push(if *b { b'1' } else { b'0' });
                    self.xml_buffer.extend_from_slice(b"</v></c>");
                }
                CellValue::Error(e) => {
                    self.xml_buffer.extend_from_slice(b" t=\"e\"><v>");
                    escape_into(&mut self.xml_buffer, e);
                    self.xml_buffer.extend_from_slice(b"</v></c>");
                }
                other => {
                    let text = match other {
                        CellValue::String(s) => s.clone(),
                        non_finite => non_finite.as_string(),
                    };
                    let needs_preserve = text.starts_with(char::is_whitespace)
                        || text.ends_with(char::is_whitespace);
                    self.xml_buffer.extend_from_slice(b" t=\"inlineStr\"><is>");
                    if needs_preserve {
                        self.xml_buffer.extend_from_slice(b"<t xml:space=\"preserve\">");
                    } else {
                        self.xml_buffer.extend_from_slice(b"<t>");
                    }
                    escape_into(&mut self.xml_buffer, &text);
                    self.xml_buffer.extend_from_slice(b"</t></is></c>");
                }
            }
        }

        self.xml_buffer.extend_from_slice(b"</row>");
        self.zip.write_all(&self.xml_buffer)?;
        self.flushed += 1;
        Ok(())
    }

    /// Rows already handed to the container, header included
    pub fn flushed_rows(&self) -> u64 {
        self.flushed
    }

    /// Rows currently held in the window
    pub fn buffered_rows(&self) -> usize {
        self.window.len()
    }

    /// All rows written so far, header included
    pub fn rows_written(&self) -> u64 {
        self.flushed + self.window.len() as u64
    }

    /// Flush the window, finish the package and move it to the destination
    pub fn close(mut self) -> Result<PathBuf> {
        self.flush()?;

        {
            let mut xml = XmlWriter::new(&mut self.zip);
            xml.end_element("sheetData")?;
            xml.end_element("worksheet")?;
            xml.flush()?;
        }

        let options = Self::file_options();
        self.zip.start_file("xl/workbook.xml", options)?;
        self.write_workbook_xml()?;
        self.zip.start_file("xl/_rels/workbook.xml.rels", options)?;
        self.zip.write_all(WORKBOOK_RELS.as_bytes())?;
        self.zip.start_file("xl/styles.xml", options)?;
        self.zip.write_all(STYLES.as_bytes())?;

        let buffered = self.zip.finish()?;
        let file = buffered
            .into_inner()
            .map_err(|e| TableError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        let rows = self.flushed;
        let destination = self.destination;
        self.staged.persist(&destination)?;
        debug!(rows, path = %destination.display(), "closed workbook");
        Ok(destination)
    }

    fn write_workbook_xml(&mut self) -> Result<()> {
        let mut xml = XmlWriter::new(&mut self.zip);

        xml.write_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n")?;
        xml.start_element("workbook")?;
        xml.attribute("xmlns", NS_MAIN)?;
        xml.attribute("xmlns:r", NS_REL)?;
        xml.close_start_tag()?;

        xml.start_element("sheets")?;
        xml.close_start_tag()?;
        xml.start_element("sheet")?;
        xml.attribute("name", &self.sheet_name)?;
        xml.attribute_int("sheetId", 1)?;
        xml.attribute("r:id", "rId1")?;
        xml.close_empty_tag()?;
        xml.end_element("sheets")?;

        xml.end_element("workbook")?;
        xml.flush()
    }
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
<Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>
</Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>
</Relationships>"#;

const APP_PROPS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties">
<Application>tabload</Application>
<DocSecurity>0</DocSecurity>
<ScaleCrop>false</ScaleCrop>
<LinksUpToDate>false</LinksUpToDate>
<SharedDoc>false</SharedDoc>
<HyperlinksChanged>false</HyperlinksChanged>
<AppVersion>1.0</AppVersion>
</Properties>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<fonts count="2">
<font><sz val="11"/><name val="Calibri"/></font>
<font><b/><sz val="11"/><name val="Calibri"/></font>
</fonts>
<fills count="2">
<fill><patternFill patternType="none"/></fill>
<fill><patternFill patternType="gray125"/></fill>
</fills>
<borders count="1">
<border><left/><right/><top/><bottom/><diagonal/></border>
</borders>
<cellStyleXfs count="1">
<xf numFmtId="0" fontId="0" fillId="0" borderId="0"/>
</cellStyleXfs>
<cellXfs count="2">
<xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>
<xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/>
</cellXfs>
</styleSheet>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn small_window(window_size: usize, flush_interval: usize) -> GeneratorConfig {
        GeneratorConfig {
            window_size,
            flush_interval,
            sheet_name: "students".to_string(),
        }
    }

    #[test]
    fn test_header_only_workbook() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("header.xlsx");

        let writer = TableWriter::create(&path, &["a", "b"], &GeneratorConfig::default())?;
        assert_eq!(writer.rows_written(), 1);
        let closed = writer.close()?;

        assert_eq!(closed, path);
        assert!(path.exists());
        Ok(())
    }

    #[test]
    fn test_window_invariant_holds_while_appending() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("window.xlsx");
        let mut writer = TableWriter::create(&path, &["n"], &small_window(3, 5))?;

        for i in 0..12i64 {
            writer.append_row([CellValue::Int(i)])?;
            assert!(writer.buffered_rows() <= 3);
            assert_eq!(
                writer.flushed_rows() + writer.buffered_rows() as u64,
                writer.rows_written()
            );
            assert_eq!(writer.rows_written(), i as u64 + 2);
        }

        writer.close()?;
        Ok(())
    }

    #[test]
    fn test_unclosed_writer_leaves_nothing_behind() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("abandoned.xlsx");
        {
            let mut writer = TableWriter::create(&path, &["n"], &small_window(2, 2))?;
            writer.append_row([CellValue::Int(1)])?;
            writer.append_row([CellValue::Int(2)])?;
            writer.append_row([CellValue::Int(3)])?;
        }

        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_rejects_zero_window() {
        let dir = tempdir().unwrap();
        let result = TableWriter::create(dir.path().join("x.xlsx"), &["n"], &small_window(0, 1));
        assert!(matches!(result, Err(TableError::WriteError(_))));
    }
}
