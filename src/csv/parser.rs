//! Quote-aware line splitter for the `Quoted` text dialect

/// CSV parser for reading quoted delimited lines
pub struct CsvParser {
    delimiter: char,
    quote_char: char,
}

impl CsvParser {
    /// Create a new CSV parser with custom delimiter and quote character
    pub fn new(delimiter: u8, quote_char: u8) -> Self {
        Self {
            delimiter: delimiter as char,
            quote_char: quote_char as char,
        }
    }

    /// Parse one line into fields
    pub fn parse_line(&self, line: &str) -> Vec<String> {
        let mut fields = Vec::new();
        let mut current_field = String::new();
        let mut in_quotes = false;
        let mut chars = line.chars().peekable();

        while let Some(ch) = chars.next() {
            if ch == self.quote_char {
                if in_quotes {
                    // "" inside quotes is a literal quote
                    if chars.peek() == Some(&self.quote_char) {
                        current_field.push(self.quote_char);
                        chars.next();
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            } else if ch == self.delimiter && !in_quotes {
                fields.push(std::mem::take(&mut current_field));
            } else {
                current_field.push(ch);
            }
        }

        fields.push(current_field);
        fields
    }
}
