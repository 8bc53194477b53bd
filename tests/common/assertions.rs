//! Buffer inspection helpers

use provider_pulse::buffer::CSV_COLUMNS;
use std::collections::HashMap;

/// Split CSV text into records, honouring quoted fields with embedded
/// newlines and doubled quotes
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match (ch, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', _) => in_quotes = !in_quotes,
            (',', false) => record.push(std::mem::take(&mut field)),
            ('\n', false) => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            (c, _) => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

/// Data rows of a buffer keyed by column name; panics if the header is wrong
pub fn buffer_rows(text: &str) -> Vec<HashMap<String, String>> {
    let mut records = parse_csv(text).into_iter();
    let header = records.next().expect("buffer has a header");
    assert_eq!(header, CSV_COLUMNS.to_vec(), "buffer header mismatch");

    records
        .map(|record| {
            assert_eq!(record.len(), CSV_COLUMNS.len(), "row has wrong column count");
            CSV_COLUMNS
                .iter()
                .map(|c| c.to_string())
                .zip(record)
                .collect()
        })
        .collect()
}
