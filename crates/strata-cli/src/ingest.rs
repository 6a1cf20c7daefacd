//! Reading events from newline-delimited JSON.

use std::io::BufRead;

use strata_core::event::{NewEvent, RawEvent};

/// A line that could not be turned into an event.
#[derive(Debug)]
pub struct BadLine {
  /// 1-based line number.
  pub line:   usize,
  pub reason: String,
}

/// Parse one `RawEvent` JSON object per line, skipping blank lines.
///
/// Every line is checked so the caller can report all problems at once.
pub fn parse_lines(reader: impl BufRead) -> std::io::Result<(Vec<NewEvent>, Vec<BadLine>)> {
  let mut events = Vec::new();
  let mut bad = Vec::new();

  for (n, line) in reader.lines().enumerate() {
    let line = line?;
    if line.trim().is_empty() {
      continue;
    }
    let parsed = serde_json::from_str::<RawEvent>(&line)
      .map_err(|e| e.to_string())
      .and_then(|raw| NewEvent::try_from(raw).map_err(|e| e.to_string()));
    match parsed {
      Ok(event) => events.push(event),
      Err(reason) => bad.push(BadLine { line: n + 1, reason }),
    }
  }

  Ok((events, bad))
}

#[cfg(test)]
mod tests {
  use strata_core::event::OrderStatus;

  use super::*;

  #[test]
  fn parses_valid_lines_and_collects_bad_ones() {
    let input = r#"{"entity_id":"ORD-1","observed_status":"pending","observed_at":"2025-03-01T09:00:00Z","payload":{"total_amount":"18.50"}}

{"entity_id":"ORD-1","observed_status":"lost","observed_at":"2025-03-01T10:00:00Z"}
not json
{"entity_id":"ORD-2","observed_status":"refunded","observed_at":"2025-03-02T00:00:00+02:00"}
"#;
    let (events, bad) = parse_lines(input.as_bytes()).unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].status, OrderStatus::Pending);
    assert_eq!(events[0].payload.get("total_amount"), Some(&"18.50".into()));
    assert_eq!(events[1].observed_at.to_rfc3339(), "2025-03-01T22:00:00+00:00");

    let lines: Vec<_> = bad.iter().map(|b| b.line).collect();
    assert_eq!(lines, [3, 4]);
    assert!(bad[0].reason.contains("lost"));
  }
}
