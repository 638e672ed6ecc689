//! Streaming reader for XLSX files with bounded memory usage
//!
//! Only the first worksheet is read. Its XML is pulled from the ZIP entry in
//! fixed-size chunks and split into complete `<row>` elements, so memory is
//! bounded by the chunk size plus the largest single row, never by the sheet.
//!
//! **Memory Usage:**
//! - Shared Strings Table (SST): loaded fully when present; files written by
//!   [`TableWriter`](crate::fast_writer::TableWriter) have none
//! - Worksheet XML: one chunk plus the pending row
//!
//! **Safety limits** (see [`ReaderConfig`]):
//! - the container and the decompressed worksheet are both capped by
//!   `max_bytes`, so a small archive cannot inflate without bound
//! - `min_inflate_ratio` rejects worksheet entries whose compressed size is
//!   suspiciously small relative to their declared size

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::config::ReaderConfig;
use crate::error::{Result, TableError};
use crate::types::{Cell, CellValue, Row, MAX_COLUMNS};

/// Streaming reader over the first worksheet of an XLSX package
pub struct TableReader<R: Read + Seek = File> {
    archive: ZipArchive<R>,
    sst: Vec<String>,
    sheet_name: String,
    sheet_path: String,
    config: ReaderConfig,
}

impl TableReader<File> {
    /// Open an XLSX file for streaming read
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tabload::config::ReaderConfig;
    /// use tabload::streaming_reader::TableReader;
    ///
    /// let mut reader = TableReader::open("students.xlsx", &ReaderConfig::default())?;
    /// let mut rows = reader.rows()?;
    /// rows.skip_header()?;
    /// for row in rows {
    ///     println!("{:?}", row?.to_strings());
    /// }
    /// # Ok::<(), tabload::TableError>(())
    /// ```
    pub fn open<P: AsRef<Path>>(path: P, config: &ReaderConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        if size == 0 {
            return Err(TableError::Format(format!(
                "{} is empty, not an XLSX container",
                path.display()
            )));
        }
        if size > config.max_bytes {
            return Err(TableError::SizeLimitExceeded {
                size,
                limit: config.max_bytes,
            });
        }
        Self::from_reader(file, config)
    }
}

impl<R: Read + Seek> TableReader<R> {
    /// Read from any seekable source, e.g. an in-memory `Cursor<Vec<u8>>`
    pub fn from_reader(reader: R, config: &ReaderConfig) -> Result<Self> {
        let mut archive = ZipArchive::new(reader).map_err(|e| match e {
            ZipError::Io(io) => TableError::Io(io),
            other => TableError::Format(format!("not an XLSX container: {}", other)),
        })?;

        let (sheet_name, sheet_path) = Self::first_sheet(&mut archive, config.max_bytes)?;
        Self::check_sheet_entry(&mut archive, &sheet_path, config)?;
        let sst = Self::load_shared_strings(&mut archive, config.max_bytes)?;

        debug!(
            sheet = %sheet_name,
            path = %sheet_path,
            shared_strings = sst.len(),
            "opened workbook"
        );

        Ok(TableReader {
            archive,
            sst,
            sheet_name,
            sheet_path,
            config: config.clone(),
        })
    }

    /// Name of the worksheet being read
    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// Stream the rows of the worksheet, header included
    pub fn rows(&mut self) -> Result<RowCursor<'_>> {
        let entry = self.archive.by_name(&self.sheet_path)?;
        Ok(RowCursor {
            source: Box::new(entry),
            sst: &self.sst,
            buffer: Vec::with_capacity(self.config.chunk_size * 2),
            pos: 0,
            chunk: vec![0u8; self.config.chunk_size.max(1)],
            inflated: 0,
            limit: self.config.max_bytes,
            eof: false,
            finished: false,
            position: 0,
        })
    }

    /// Reject worksheet entries that exceed the size ceiling or inflate too far
    fn check_sheet_entry(archive: &mut ZipArchive<R>, path: &str, config: &ReaderConfig) -> Result<()> {
        let entry = archive.by_name(path).map_err(|e| match e {
            ZipError::FileNotFound => {
                TableError::Format(format!("worksheet '{}' missing from container", path))
            }
            other => TableError::Zip(other),
        })?;

        let size = entry.size();
        if size > config.max_bytes {
            return Err(TableError::SizeLimitExceeded {
                size,
                limit: config.max_bytes,
            });
        }
        if config.min_inflate_ratio > 0.0 && size > 0 {
            let ratio = entry.compressed_size() as f64 / size as f64;
            if ratio < config.min_inflate_ratio {
                return Err(TableError::CompressionRatio {
                    ratio,
                    minimum: config.min_inflate_ratio,
                });
            }
        }
        Ok(())
    }

    /// Load the Shared Strings Table, if the package has one
    fn load_shared_strings(archive: &mut ZipArchive<R>, limit: u64) -> Result<Vec<String>> {
        let Some(xml) = read_entry(archive, "xl/sharedStrings.xml", limit)? else {
            return Ok(Vec::new()); // all cells are inline
        };

        let mut sst = Vec::new();
        let mut pos = 0;
        while let Some(si_start) = xml[pos..].find("<si") {
            let si_start = pos + si_start;
            let Some(si_end) = xml[si_start..].find("</si>") else {
                break;
            };
            let si_end = si_start + si_end + 5;
            sst.push(collect_text_runs(&xml[si_start..si_end]));
            pos = si_end;
        }
        Ok(sst)
    }

    /// Name and entry path of the first sheet listed in `workbook.xml`
    fn first_sheet(archive: &mut ZipArchive<R>, limit: u64) -> Result<(String, String)> {
        let workbook = read_entry(archive, "xl/workbook.xml", limit)?
            .ok_or_else(|| TableError::Format("xl/workbook.xml missing from container".into()))?;

        // <sheet name="Sheet1" sheetId="1" r:id="rId1"/>
        let sheet_tag = workbook
            .find("<sheet ")
            .and_then(|start| {
                let end = workbook[start..].find('>')?;
                Some(&workbook[start..start + end + 1])
            })
            .ok_or_else(|| TableError::Format("workbook contains no sheets".into()))?;

        let name = attribute(sheet_tag, "name")
            .map(decode_entities)
            .unwrap_or_else(|| "Sheet1".to_string());
        let rid = attribute(sheet_tag, "r:id").map(str::to_string);

        let target = match (rid, read_entry(archive, "xl/_rels/workbook.xml.rels", limit)?) {
            (Some(rid), Some(rels)) => relationship_target(&rels, &rid),
            _ => None,
        };
        let path = match target {
            Some(target) => match target.strip_prefix('/') {
                Some(absolute) => absolute.to_string(),
                None => format!("xl/{}", target),
            },
            None => "xl/worksheets/sheet1.xml".to_string(),
        };
        Ok((name, path))
    }
}

/// Read a small XML part fully, bounded by `limit`
fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    limit: u64,
) -> Result<Option<String>> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if entry.size() > limit {
        return Err(TableError::SizeLimitExceeded {
            size: entry.size(),
            limit,
        });
    }

    let mut xml = String::new();
    let read = entry.take(limit.saturating_add(1)).read_to_string(&mut xml)?;
    if read as u64 > limit {
        return Err(TableError::SizeLimitExceeded {
            size: read as u64,
            limit,
        });
    }
    Ok(Some(xml))
}

/// `Target` of the relationship whose `Id` is `rid`
fn relationship_target(rels: &str, rid: &str) -> Option<String> {
    let mut pos = 0;
    while let Some(start) = rels[pos..].find("<Relationship ") {
        let start = pos + start;
        let end = start + rels[start..].find('>')? + 1;
        let tag = &rels[start..end];
        if attribute(tag, "Id") == Some(rid) {
            return attribute(tag, "Target").map(decode_entities);
        }
        pos = end;
    }
    None
}

/// Value of `name="..."` inside a start tag
fn attribute<'x>(tag: &'x str, name: &str) -> Option<&'x str> {
    let mut pos = 0;
    while let Some(found) = tag[pos..].find(name) {
        let start = pos + found;
        let after = start + name.len();
        let preceded_by_space = tag[..start]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        if preceded_by_space && tag[after..].starts_with("=\"") {
            let value_start = after + 2;
            let value_end = value_start + tag[value_start..].find('"')?;
            return Some(&tag[value_start..value_end]);
        }
        pos = after;
    }
    None
}

/// Concatenate every `<t>` run in `xml`, entity-decoded
fn collect_text_runs(xml: &str) -> String {
    let mut text = String::new();
    let mut pos = 0;
    while let Some(found) = xml[pos..].find("<t") {
        let start = pos + found;
        let rest = &xml[start + 2..];
        // <t> or <t xml:space="preserve">, but not <tc> or similar
        if !(rest.starts_with('>') || rest.starts_with(char::is_whitespace)) {
            pos = start + 2;
            continue;
        }
        let Some(tag_end) = rest.find('>') else {
            break;
        };
        let content_start = start + 2 + tag_end + 1;
        if xml[..content_start].ends_with("/>") {
            pos = content_start; // <t/>
            continue;
        }
        let Some(close) = xml[content_start..].find("</t>") else {
            break;
        };
        text.push_str(&decode_entities(&xml[content_start..content_start + close]));
        pos = content_start + close + 4;
    }
    text
}

/// Decode the predefined XML entities and numeric character references
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').and_then(|semi| {
            let entity = &tail[1..semi];
            let ch = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity.strip_prefix('#').and_then(|num| {
                    let code = match num.strip_prefix(['x', 'X']) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                        None => num.parse().ok()?,
                    };
                    char::from_u32(code)
                }),
            }?;
            Some((ch, semi + 1))
        });
        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Find `<name` followed by a delimiter, so `<c` never matches `<col`
///
/// Returns `Err(start)` when the tag name runs into the end of `buf`.
fn find_tag(buf: &[u8], name: &[u8]) -> std::result::Result<Option<usize>, usize> {
    let mut pos = 0;
    while let Some(found) = find_bytes(&buf[pos..], name) {
        let start = pos + found;
        match buf.get(start + name.len()) {
            Some(b' ' | b'>' | b'/' | b'\t' | b'\n' | b'\r') => return Ok(Some(start)),
            Some(_) => pos = start + 1,
            None => return Err(start),
        }
    }
    Ok(None)
}

enum RowScan {
    Complete { start: usize, end: usize },
    Partial { start: usize },
    Nothing,
}

fn scan_row(buf: &[u8]) -> RowScan {
    let start = match find_tag(buf, b"<row") {
        Ok(Some(start)) => start,
        Ok(None) => return RowScan::Nothing,
        Err(start) => return RowScan::Partial { start },
    };
    let Some(gt) = buf[start..].iter().position(|&b| b == b'>') else {
        return RowScan::Partial { start };
    };
    let tag_end = start + gt + 1;
    if buf[tag_end - 2] == b'/' {
        return RowScan::Complete { start, end: tag_end }; // <row r="3"/>
    }
    match find_bytes(&buf[tag_end..], b"</row>") {
        Some(close) => RowScan::Complete {
            start,
            end: tag_end + close + 6,
        },
        None => RowScan::Partial { start },
    }
}

/// Cursor over the rows of a worksheet
///
/// Yields rows in document order. The first row is the header;
/// [`skip_header`](RowCursor::skip_header) consumes it.
pub struct RowCursor<'a> {
    source: Box<dyn Read + 'a>,
    sst: &'a [String],
    buffer: Vec<u8>,
    pos: usize, // start of unconsumed data in buffer
    chunk: Vec<u8>,
    inflated: u64,
    limit: u64,
    eof: bool,
    finished: bool,
    position: u64,
}

impl RowCursor<'_> {
    /// Consume the header row; returns false when the sheet is empty
    pub fn skip_header(&mut self) -> Result<bool> {
        if self.position > 0 {
            return Ok(true);
        }
        Ok(self.next_row()?.is_some())
    }

    /// Number of rows yielded so far, header included
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Next row, or `None` at the end of the sheet
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        if self.finished {
            return Ok(None);
        }

        loop {
            let pending = match scan_row(&self.buffer[self.pos..]) {
                RowScan::Complete { start, end } => {
                    let row_start = self.pos + start;
                    let row_end = self.pos + end;
                    self.pos = row_end;
                    let row_xml = std::str::from_utf8(&self.buffer[row_start..row_end])
                        .map_err(|e| TableError::Format(format!("invalid UTF-8 in worksheet: {}", e)))?;
                    let cells = parse_cells(row_xml, self.sst)?;
                    let row = Row::new(self.position, cells);
                    self.position += 1;
                    return Ok(Some(row));
                }
                RowScan::Partial { start } => Some(self.pos + start),
                RowScan::Nothing => None,
            };

            if self.eof {
                self.finished = true;
                if pending.is_some() {
                    return Err(TableError::Format(format!(
                        "worksheet ends inside row {}",
                        self.position + 1
                    )));
                }
                return Ok(None);
            }

            // Keep the pending row, or a short tail that may hold a split tag
            let keep_from = pending.unwrap_or_else(|| self.buffer.len().saturating_sub(8).max(self.pos));
            self.buffer.drain(..keep_from);
            self.pos = 0;
            self.fill()?;
        }
    }

    fn fill(&mut self) -> Result<()> {
        let n = self.source.read(&mut self.chunk)?;
        if n == 0 {
            self.eof = true;
            return Ok(());
        }
        self.inflated += n as u64;
        if self.inflated > self.limit {
            self.finished = true;
            return Err(TableError::SizeLimitExceeded {
                size: self.inflated,
                limit: self.limit,
            });
        }
        self.buffer.extend_from_slice(&self.chunk[..n]);
        Ok(())
    }
}

impl Iterator for RowCursor<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => None,
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Parse the `<c>` elements of one complete `<row>` element
fn parse_cells(row_xml: &str, sst: &[String]) -> Result<Vec<CellValue>> {
    let mut cells = Vec::new();
    let bytes = row_xml.as_bytes();
    // skip the <row ...> start tag itself
    let mut pos = row_xml.find('>').map_or(row_xml.len(), |gt| gt + 1);

    while let Ok(Some(found)) = find_tag(&bytes[pos..], b"<c") {
        let start = pos + found;
        let Some(gt) = row_xml[start..].find('>') else {
            break;
        };
        let tag_end = start + gt + 1;
        let tag = &row_xml[start..tag_end];

        let (inner, cell_end) = if tag.ends_with("/>") {
            ("", tag_end)
        } else {
            match row_xml[tag_end..].find("</c>") {
                Some(close) => (&row_xml[tag_end..tag_end + close], tag_end + close + 4),
                None => {
                    return Err(TableError::Format(format!(
                        "unterminated cell in row: {}",
                        row_xml
                    )))
                }
            }
        };

        if let Some(reference) = attribute(tag, "r") {
            if reference.starts_with(|c: char| c.is_ascii_alphabetic()) {
                let col = Cell::column_index(reference)
                    .filter(|&col| col < MAX_COLUMNS)
                    .ok_or_else(|| {
                        TableError::Format(format!("cell reference '{}' is outside the sheet", reference))
                    })?;
                if cells.len() < col {
                    cells.resize(col, CellValue::Empty);
                }
            }
        }
        cells.push(cell_value(attribute(tag, "t"), inner, sst)?);
        pos = cell_end;
    }

    Ok(cells)
}

fn cell_value(cell_type: Option<&str>, inner: &str, sst: &[String]) -> Result<CellValue> {
    if cell_type == Some("inlineStr") {
        return Ok(CellValue::String(collect_text_runs(inner)));
    }

    let Some(raw) = element_text(inner, "v") else {
        return Ok(CellValue::Empty);
    };

    let value = match cell_type {
        Some("s") => {
            let idx: usize = raw
                .trim()
                .parse()
                .map_err(|_| TableError::Format(format!("bad shared string index '{}'", raw)))?;
            let text = sst.get(idx).ok_or_else(|| {
                TableError::Format(format!(
                    "shared string index {} out of range ({} entries)",
                    idx,
                    sst.len()
                ))
            })?;
            CellValue::String(text.clone())
        }
        Some("str") => CellValue::String(decode_entities(raw)),
        Some("b") => CellValue::Bool(raw.trim() == "1"),
        Some("e") => CellValue::Error(decode_entities(raw)),
        _ => CellValue::from_numeric_text(raw)
            .unwrap_or_else(|| CellValue::String(decode_entities(raw))),
    };
    Ok(value)
}

/// Text content of the first `<name>...</name>` child
fn element_text<'x>(xml: &'x str, name: &str) -> Option<&'x str> {
    let open = format!("<{}>", name);
    let close = format!("</{}>", name);
    let start = xml.find(&open)? + open.len();
    let end = start + xml[start..].find(&close)?;
    Some(&xml[start..end])
}
