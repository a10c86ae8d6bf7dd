//! Packs `(path, content)` pairs into one text block and recovers them from
//! model output.
//!
//! The raw format puts each file behind a marker line:
//!
//! ```text
//! <<<< copilot-ops file: src/main.rs >>>>
//! fn main() {}
//! ```
//!
//! Content lines that would read as a marker are byte-stuffed with one
//! extra leading `\` on encode, and one `\` is stripped again on decode, so
//! every content round-trips exactly.

use crate::domain::models::OutputFormat;
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;

pub const MARKER_PREFIX: &str = "<<<< copilot-ops file:";
pub const MARKER_SUFFIX: &str = ">>>>";

/// Pairs recovered from a model response plus the blocks that were dropped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DecodedUpdate {
    pub updates: Vec<(String, String)>,
    pub warnings: Vec<String>,
}

#[derive(Serialize)]
struct JsonFile<'a> {
    path: &'a str,
    content: &'a str,
}

pub fn marker_line(path: &str) -> String {
    format!("{} {} {}", MARKER_PREFIX, path, MARKER_SUFFIX)
}

enum MarkerLine<'a> {
    Path(&'a str),
    /// Starts like a marker but carries text after the closing `>>>>`.
    Malformed,
}

/// Classifies a line that starts with the marker prefix. The closing `>>>>`
/// is optional since models sometimes drop it.
fn parse_marker(line: &str) -> Option<MarkerLine<'_>> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let rest = line.strip_prefix(MARKER_PREFIX)?;
    match rest.find(MARKER_SUFFIX) {
        Some(end) if !rest[end + MARKER_SUFFIX.len()..].trim().is_empty() => {
            Some(MarkerLine::Malformed)
        }
        Some(end) => Some(MarkerLine::Path(rest[..end].trim())),
        None => Some(MarkerLine::Path(rest.trim())),
    }
}

fn needs_stuffing(line: &str) -> bool {
    line.trim_start_matches('\\').starts_with(MARKER_PREFIX)
}

fn escape_line(line: &str, out: &mut String) {
    if needs_stuffing(line) {
        out.push('\\');
    }
    out.push_str(line);
}

fn unescape_line(line: &str) -> &str {
    match line.strip_prefix('\\') {
        Some(rest) if needs_stuffing(rest) => rest,
        _ => line,
    }
}

pub fn encode<'a>(
    format: OutputFormat,
    entries: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> serde_json::Result<String> {
    match format {
        OutputFormat::Raw => Ok(encode_raw(entries)),
        OutputFormat::Json => encode_json(entries),
    }
}

pub fn encode_raw<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut out = String::new();
    for (path, content) in entries {
        out.push_str(&marker_line(path));
        out.push('\n');
        for (i, line) in content.split('\n').enumerate() {
            if i > 0 {
                out.push('\n');
            }
            escape_line(line, &mut out);
        }
        out.push('\n');
    }
    out
}

pub fn encode_json<'a>(
    entries: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> serde_json::Result<String> {
    let files: Vec<JsonFile<'a>> = entries
        .into_iter()
        .map(|(path, content)| JsonFile { path, content })
        .collect();
    serde_json::to_string_pretty(&files)
}

/// Decodes model output in whichever format it arrived in. JSON is tried
/// first when the text looks like JSON; otherwise the marker format is
/// parsed, falling back to unescaping literal `\n` sequences when that
/// yields no updates.
pub fn decode(text: &str) -> DecodedUpdate {
    if let Some(decoded) = decode_json(text) {
        debug!("Decoded {} JSON entries", decoded.updates.len());
        return decoded;
    }

    let decoded = decode_raw(text);
    if decoded.updates.is_empty() && text.contains("\\n") {
        debug!("No updates decoded, retrying with escaped newlines normalized");
        let normalized = text.replace("\\r\\n", "\r\n").replace("\\n", "\n");
        let retried = decode_raw(&normalized);
        if !retried.updates.is_empty() {
            return retried;
        }
    }
    decoded
}

enum DecodeState<'a> {
    ScanningForMarker,
    CapturingPath(String),
    CapturingBody { path: String, lines: Vec<&'a str> },
}

fn emit(path: String, lines: Vec<&str>, decoded: &mut DecodedUpdate) {
    if decoded.updates.iter().any(|(seen, _)| *seen == path) {
        let message = format!("{} returned more than once, keeping the last copy", path);
        warn!("{}", message);
        decoded.warnings.push(message);
    }
    decoded.updates.push((path, lines.join("\n")));
}

/// Runs the marker state machine over `text`.
pub fn decode_raw(text: &str) -> DecodedUpdate {
    let mut decoded = DecodedUpdate::default();

    let mut lines: Vec<&str> = text.split('\n').collect();
    if text.ends_with('\n') {
        lines.pop();
    }

    let mut state = DecodeState::ScanningForMarker;
    for line in lines {
        if let Some(marker) = parse_marker(line) {
            match std::mem::replace(&mut state, DecodeState::ScanningForMarker) {
                DecodeState::CapturingPath(previous) => decoded
                    .warnings
                    .push(format!("no content returned for {}", previous)),
                DecodeState::CapturingBody { path, lines } => emit(path, lines, &mut decoded),
                DecodeState::ScanningForMarker => {}
            }

            match marker {
                MarkerLine::Path("") => decoded
                    .warnings
                    .push("skipping block with an empty file path".to_string()),
                MarkerLine::Path(path) => state = DecodeState::CapturingPath(path.to_string()),
                MarkerLine::Malformed => decoded
                    .warnings
                    .push(format!("skipping malformed marker line: {}", line.trim_end())),
            }
            continue;
        }

        state = match state {
            DecodeState::ScanningForMarker => DecodeState::ScanningForMarker,
            DecodeState::CapturingPath(path) => DecodeState::CapturingBody {
                path,
                lines: vec![unescape_line(line)],
            },
            DecodeState::CapturingBody { path, mut lines } => {
                lines.push(unescape_line(line));
                DecodeState::CapturingBody { path, lines }
            }
        };
    }

    match state {
        DecodeState::CapturingPath(path) => decoded
            .warnings
            .push(format!("output ended before any content for {}", path)),
        DecodeState::CapturingBody { path, lines } => emit(path, lines, &mut decoded),
        DecodeState::ScanningForMarker => {}
    }

    decoded
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Returns `None` when the text is not JSON at all so the caller can fall
/// back to the marker format.
pub fn decode_json(text: &str) -> Option<DecodedUpdate> {
    let body = strip_code_fence(text);
    if !body.starts_with('[') && !body.starts_with('{') {
        return None;
    }

    let value: Value = serde_json::from_str(body).ok()?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("files") {
            Some(Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };

    let mut decoded = DecodedUpdate::default();
    for (i, item) in items.iter().enumerate() {
        let path = item.get("path").and_then(Value::as_str).map(str::trim);
        let content = item.get("content").and_then(Value::as_str);
        match (path, content) {
            (Some(path), Some(content)) if !path.is_empty() => {
                decoded.updates.push((path.to_string(), content.to_string()));
            }
            _ => decoded.warnings.push(format!(
                "skipping JSON entry {} without a string path and content",
                i
            )),
        }
    }
    Some(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    #[test]
    fn test_encode_two_files_in_order() {
        let encoded = encode_raw([("a.txt", "hello"), ("b.txt", "world")]);
        assert_eq!(
            encoded,
            "<<<< copilot-ops file: a.txt >>>>\nhello\n<<<< copilot-ops file: b.txt >>>>\nworld\n"
        );
    }

    #[test]
    fn test_decode_model_response() {
        let response = format!(
            "{}\ngoodbye\n{}\nworld\n",
            marker_line("a.txt"),
            marker_line("b.txt")
        );
        let decoded = decode(&response);
        assert_eq!(
            decoded.updates,
            pairs(&[("a.txt", "goodbye"), ("b.txt", "world")])
        );
        assert!(decoded.warnings.is_empty());
    }

    #[test]
    fn test_round_trip_preserves_awkward_content() {
        let files = [
            ("empty.txt", ""),
            ("newline.txt", "\n"),
            ("blank_edges.md", "\n\nbody\n\n"),
            ("crlf.txt", "one\r\ntwo\r\n"),
            (
                "tricky.txt",
                "<<<< copilot-ops file: fake.txt >>>>\n\\<<<< copilot-ops file: x >>>>\n\\\\plain",
            ),
            ("escapes.rs", "println!(\"a\\nb\");"),
        ];

        let decoded = decode(&encode_raw(files));
        assert_eq!(decoded.updates, pairs(&files));
        assert!(decoded.warnings.is_empty());
    }

    #[test]
    fn test_json_round_trip() {
        let files = [("a.txt", "line1\nline2"), ("dir/b.rs", "")];
        let encoded = encode_json(files).unwrap();
        assert!(encoded.trim_start().starts_with('['));

        let decoded = decode(&encoded);
        assert_eq!(decoded.updates, pairs(&files));
    }

    #[test]
    fn test_preamble_is_ignored() {
        let response = format!("Sure, here you go:\n\n{}\nnew\n", marker_line("a.txt"));
        assert_eq!(decode(&response).updates, pairs(&[("a.txt", "new")]));
    }

    #[test]
    fn test_truncated_entry_is_dropped_with_warning() {
        let response = format!("{}\nkept\n{}\n", marker_line("a.txt"), marker_line("b.txt"));
        let decoded = decode(&response);
        assert_eq!(decoded.updates, pairs(&[("a.txt", "kept")]));
        assert_eq!(decoded.warnings.len(), 1);
        assert!(decoded.warnings[0].contains("b.txt"));
    }

    #[test]
    fn test_back_to_back_markers_skip_first() {
        let response = format!("{}\n{}\nbody", marker_line("a.txt"), marker_line("b.txt"));
        let decoded = decode(&response);
        assert_eq!(decoded.updates, pairs(&[("b.txt", "body")]));
        assert!(decoded.warnings[0].contains("a.txt"));
    }

    #[test]
    fn test_empty_body_is_a_valid_update() {
        let response = format!("{}\n\n", marker_line("gone.txt"));
        assert_eq!(decode(&response).updates, pairs(&[("gone.txt", "")]));
    }

    #[test]
    fn test_marker_without_suffix_or_path() {
        let response = "<<<< copilot-ops file: a.txt\nA\n<<<< copilot-ops file: >>>>\nlost\n";
        let decoded = decode(response);
        assert_eq!(decoded.updates, pairs(&[("a.txt", "A")]));
        assert_eq!(decoded.warnings.len(), 1);
    }

    #[test]
    fn test_no_markers_yields_nothing() {
        let decoded = decode("I could not understand the request.");
        assert!(decoded.updates.is_empty());
    }

    #[test]
    fn test_escaped_newlines_on_a_single_line() {
        let response = format!("{}\\nfirst\\nsecond\\n", marker_line("a.txt"));
        assert_eq!(decode(&response).updates, pairs(&[("a.txt", "first\nsecond")]));
    }

    #[test]
    fn test_escaped_newlines_after_preamble_line() {
        let response = format!("Here you go:\n{}\\nfirst\\nsecond\\n", marker_line("a.txt"));
        let decoded = decode(&response);
        assert_eq!(decoded.updates, pairs(&[("a.txt", "first\nsecond")]));
        assert!(decoded.warnings.is_empty());
    }

    #[test]
    fn test_literal_escapes_kept_when_markers_decode() {
        let response = format!("{}\nprintln!(\"a\\nb\");\n", marker_line("main.rs"));
        assert_eq!(
            decode(&response).updates,
            pairs(&[("main.rs", "println!(\"a\\nb\");")])
        );
    }

    #[test]
    fn test_text_after_marker_suffix_is_not_part_of_path() {
        let response = format!(
            "{} trailing\nlost\n{}\nkept\n",
            marker_line("a.txt"),
            marker_line("b.txt")
        );
        let decoded = decode(&response);
        assert_eq!(decoded.updates, pairs(&[("b.txt", "kept")]));
        assert_eq!(decoded.warnings.len(), 1);
        assert!(decoded.warnings[0].contains("malformed"));
    }

    #[test]
    fn test_duplicate_path_is_reported() {
        let response = format!(
            "{}\nold\n{}\nnew\n",
            marker_line("a.txt"),
            marker_line("a.txt")
        );
        let decoded = decode(&response);
        assert_eq!(decoded.updates.len(), 2);
        assert_eq!(decoded.warnings.len(), 1);
        assert!(decoded.warnings[0].contains("a.txt"));
    }

    #[test]
    fn test_json_with_fence_and_bad_entry() {
        let response = "```json\n[{\"path\": \"a.txt\", \"content\": \"x\"}, {\"path\": 3}]\n```";
        let decoded = decode(response);
        assert_eq!(decoded.updates, pairs(&[("a.txt", "x")]));
        assert_eq!(decoded.warnings.len(), 1);
    }

    #[test]
    fn test_json_object_with_files_key() {
        let response = r#"{"files": [{"path": "a.txt", "content": "y"}]}"#;
        assert_eq!(decode(response).updates, pairs(&[("a.txt", "y")]));
    }

    #[test]
    fn test_invalid_json_falls_back_to_markers() {
        let response = format!("{}\n{{ not json\n", marker_line("a.json"));
        assert_eq!(decode(&response).updates, pairs(&[("a.json", "{ not json")]));
    }
}
