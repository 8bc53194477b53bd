//! CSV encoding of buffered outcomes
//!
//! The column order is consumed downstream and must not change. String
//! columns are always quoted with embedded quotes doubled; the two integer
//! columns are written bare.

use crate::types::CallOutcome;
use std::fmt::Write;

/// Buffer columns, in file order
pub const CSV_COLUMNS: [&str; 14] = [
    "cycle_timestamp_iso",
    "model_id",
    "provider_name",
    "provider_model_id",
    "request_url",
    "request_body",
    "request_headers_sanitized",
    "request_start_iso",
    "response_end_iso",
    "duration_ms",
    "response_status_code",
    "response_body_raw",
    "response_headers_sanitized",
    "error_message",
];

/// First line of every buffer file, without the line terminator
pub const CSV_HEADER: &str = "cycle_timestamp_iso,model_id,provider_name,provider_model_id,request_url,request_body,request_headers_sanitized,request_start_iso,response_end_iso,duration_ms,response_status_code,response_body_raw,response_headers_sanitized,error_message";

/// Header line including its terminator
pub fn header_line() -> String {
    format!("{CSV_HEADER}\n")
}

/// Encode one outcome as a newline-terminated CSV row
pub fn encode_row(outcome: &CallOutcome) -> String {
    let mut row = String::with_capacity(
        outcome.request_body.len() + outcome.response_body_raw.len() + 256,
    );

    for field in [
        &outcome.cycle_timestamp,
        &outcome.model_id,
        &outcome.provider_name,
        &outcome.provider_model_id,
        &outcome.request_url,
        &outcome.request_body,
        &outcome.request_headers_sanitized,
        &outcome.request_start,
        &outcome.response_end,
    ] {
        push_quoted(&mut row, field);
        row.push(',');
    }

    // Writing to a String cannot fail
    let _ = write!(
        row,
        "{},{},",
        outcome.duration_ms, outcome.response_status_code
    );

    push_quoted(&mut row, &outcome.response_body_raw);
    row.push(',');
    push_quoted(&mut row, &outcome.response_headers_sanitized);
    row.push(',');
    push_quoted(&mut row, &outcome.error_message);
    row.push('\n');
    row
}

/// Encode a batch of outcomes, one row each
pub fn encode_rows(outcomes: &[CallOutcome]) -> String {
    outcomes.iter().map(encode_row).collect()
}

fn push_quoted(out: &mut String, field: &str) {
    out.push('"');
    for ch in field.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
}
