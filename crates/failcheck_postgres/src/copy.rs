//! `COPY ... FROM STDIN` text-format encoding.

use chrono::SecondsFormat;
use failcheck_core::Record;

/// Size at which a buffered chunk is flushed to the server.
pub(crate) const CHUNK_SIZE: usize = 64 * 1024;

/// Appends `record` to `buf` as one COPY text row.
pub(crate) fn encode_row(buf: &mut String, record: &Record) {
    buf.push_str(&record.id.to_string());
    buf.push('\t');
    buf.push_str(&record.ts.to_rfc3339_opts(SecondsFormat::AutoSi, false));
    buf.push('\t');
    escape_into(buf, &record.payload);
    buf.push('\n');
}

/// Escapes the characters COPY text format treats specially.
fn escape_into(buf: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => buf.push_str("\\\\"),
            '\t' => buf.push_str("\\t"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            c => buf.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn record(payload: &str) -> Record {
        let ts = DateTime::parse_from_rfc3339("2024-03-01T10:00:00.123456+02:00").unwrap();
        Record::new(42, ts, payload)
    }

    #[test]
    fn encodes_tab_separated_row() {
        let mut buf = String::new();
        encode_row(&mut buf, &record("abc"));
        assert_eq!(buf, "42\t2024-03-01T10:00:00.123456+02:00\tabc\n");
    }

    #[test]
    fn escapes_backslash() {
        let mut buf = String::new();
        encode_row(&mut buf, &record(r"a\N"));
        assert!(buf.ends_with("\ta\\\\N\n"));
    }

    #[test]
    fn escapes_control_characters() {
        let mut buf = String::new();
        escape_into(&mut buf, "a\tb\nc\rd");
        assert_eq!(buf, "a\\tb\\nc\\rd");
    }

    #[test]
    fn empty_payload_is_empty_string() {
        let mut buf = String::new();
        encode_row(&mut buf, &record(""));
        assert!(buf.ends_with("+02:00\t\n"));
    }
}
