//! Quoting encoder for the `Quoted` text dialect (RFC 4180-like)

/// CSV encoder for writing properly quoted fields
pub struct CsvEncoder {
    delimiter: char,
    quote_char: char,
}

impl CsvEncoder {
    /// Create a new CSV encoder with custom delimiter and quote character
    pub fn new(delimiter: u8, quote_char: u8) -> Self {
        Self {
            delimiter: delimiter as char,
            quote_char: quote_char as char,
        }
    }

    /// Append an entire row to `buffer`, without a line terminator
    pub fn encode_row<S: AsRef<str>>(&self, fields: &[S], buffer: &mut String) {
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                buffer.push(self.delimiter);
            }
            self.encode_field(field.as_ref(), buffer);
        }
    }

    /// Append one field, quoting and doubling quotes when needed
    pub fn encode_field(&self, field: &str, buffer: &mut String) {
        if !self.needs_quoting(field) {
            buffer.push_str(field);
            return;
        }
        buffer.push(self.quote_char);
        for ch in field.chars() {
            if ch == self.quote_char {
                buffer.push(self.quote_char);
            }
            buffer.push(ch);
        }
        buffer.push(self.quote_char);
    }

    fn needs_quoting(&self, field: &str) -> bool {
        field
            .chars()
            .any(|c| c == self.delimiter || c == self.quote_char || c == '\n' || c == '\r')
    }
}
