//! Minimal CSV reading and writing.
//!
//! The two data tables and the batch export use plain comma-separated
//! text with standard double-quote escaping: a field containing a comma,
//! a quote or a newline is wrapped in quotes, and embedded quotes are
//! doubled. That is the whole dialect: no configurable delimiters, no
//! comments, no type inference.

/// Escapes one field for CSV output. Returns the field unchanged when no
/// quoting is needed.
pub fn escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Splits one record into fields, honoring quoted fields with doubled
/// quote escapes. The input must be a complete record (use
/// [`parse_document`] when fields may contain newlines).
pub fn parse_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }

    fields.push(current);
    fields
}

/// Splits a whole document into records. Unlike a per-line split this
/// keeps newlines that occur inside quoted fields, so exported tables
/// with multi-line cells parse back intact. A trailing newline does not
/// produce an empty record.
pub fn parse_document(content: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();
    let mut saw_any = false;

    while let Some(c) = chars.next() {
        saw_any = true;
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            '\r' if !in_quotes => {
                // CRLF handled by the '\n' arm
                if chars.peek() != Some(&'\n') {
                    current.push('\r');
                }
            }
            '\n' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
                records.push(std::mem::take(&mut fields));
                saw_any = false;
            }
            _ => current.push(c),
        }
    }

    if saw_any {
        fields.push(current);
        records.push(fields);
    }

    records
}

/// Joins escaped fields into one output record (no trailing newline).
pub fn write_record(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| escape(f))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_fields_pass_through() {
        assert_eq!(parse_line("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn quoted_fields_keep_commas_and_quotes() {
        assert_eq!(
            parse_line(r#"W01,"Walnut, Dark","said ""warm"""#),
            vec!["W01", "Walnut, Dark", r#"said "warm""#]
        );
        assert_eq!(escape("Walnut, Dark"), "\"Walnut, Dark\"");
        assert_eq!(escape(r#"said "warm""#), r#""said ""warm""""#);
    }

    #[test]
    fn empty_fields_survive() {
        assert_eq!(parse_line("a,,c,"), vec!["a", "", "c", ""]);
    }

    #[test]
    fn document_keeps_quoted_newlines() {
        let doc = "name,note\nOak,\"line one\nline two\"\nAsh,plain\n";
        let records = parse_document(doc);
        assert_eq!(records.len(), 3);
        assert_eq!(records[1], vec!["Oak", "line one\nline two"]);
        assert_eq!(records[2], vec!["Ash", "plain"]);
    }

    #[test]
    fn document_handles_crlf() {
        let records = parse_document("a,b\r\nc,d\r\n");
        assert_eq!(records, vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn escape_round_trips() {
        let cells = ["plain", "with, comma", "with \"quote\"", "multi\nline", ""];
        let line = write_record(&cells);
        let mut parsed = parse_document(&line);
        assert_eq!(parsed.remove(0), cells);
    }
}
