//! Buffered XML writer with minimal allocations

use crate::error::Result;
use std::io::Write;

/// Append `text` to `buffer` with XML escaping
///
/// Control characters other than tab, LF and CR are dropped; they are not
/// representable in XML 1.0.
pub fn escape_into(buffer: &mut Vec<u8>, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => buffer.extend_from_slice(b"&amp;"),
            '<' => buffer.extend_from_slice(b"&lt;"),
            '>' => buffer.extend_from_slice(b"&gt;"),
            '"' => buffer.extend_from_slice(b"&quot;"),
            '\'' => buffer.extend_from_slice(b"&apos;"),
            c if (c as u32) < 0x20 && c != '\t' && c != '\n' && c != '\r' => continue,
            c => {
                let mut utf8 = [0u8; 4];
                buffer.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
            }
        }
    }
}

/// XML writer that batches output before handing it to the underlying writer
pub struct XmlWriter<W: Write> {
    writer: W,
    buffer: Vec<u8>,
    flush_threshold: usize,
}

impl<W: Write> XmlWriter<W> {
    pub fn new(writer: W) -> Self {
        Self::with_capacity(writer, 8192)
    }

    pub fn with_capacity(writer: W, capacity: usize) -> Self {
        XmlWriter {
            writer,
            buffer: Vec::with_capacity(capacity),
            flush_threshold: capacity / 2,
        }
    }

    #[inline]
    fn auto_flush(&mut self) -> Result<()> {
        if self.buffer.len() >= self.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Write raw bytes directly
    #[inline]
    pub fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(data);
        self.auto_flush()
    }

    #[inline]
    pub fn write_str(&mut self, s: &str) -> Result<()> {
        self.write_raw(s.as_bytes())
    }

    /// Write `<name` (attributes may follow)
    #[inline]
    pub fn start_element(&mut self, name: &str) -> Result<()> {
        self.write_raw(b"<")?;
        self.write_str(name)
    }

    #[inline]
    pub fn end_element(&mut self, name: &str) -> Result<()> {
        self.write_raw(b"</")?;
        self.write_str(name)?;
        self.write_raw(b">")
    }

    #[inline]
    pub fn attribute(&mut self, name: &str, value: &str) -> Result<()> {
        self.write_raw(b" ")?;
        self.write_str(name)?;
        self.write_raw(b"=\"")?;
        self.write_escaped(value)?;
        self.write_raw(b"\"")
    }

    #[inline]
    pub fn attribute_int(&mut self, name: &str, value: i64) -> Result<()> {
        self.write_raw(b" ")?;
        self.write_str(name)?;
        self.write_raw(b"=\"")?;
        self.write_str(itoa::Buffer::new().format(value))?;
        self.write_raw(b"\"")
    }

    #[inline]
    pub fn close_start_tag(&mut self) -> Result<()> {
        self.write_raw(b">")
    }

    /// Close a start tag as an empty element (`/>`)
    #[inline]
    pub fn close_empty_tag(&mut self) -> Result<()> {
        self.write_raw(b"/>")
    }

    #[inline]
    pub fn write_escaped(&mut self, text: &str) -> Result<()> {
        escape_into(&mut self.buffer, text);
        self.auto_flush()
    }

    /// Flush buffer to underlying writer
    pub fn flush(&mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            self.writer.write_all(&self.buffer)?;
            self.buffer.clear();
        }
        self.writer.flush()?;
        Ok(())
    }
}
