//! Structured-output recovery for fix proposals.
//!
//! The repair pass is best effort: it only balances quote, bracket and
//! brace counts and ignores escaping and string contents, so pathological
//! input can still be mis-repaired.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// One whole-file replacement proposed by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedFix {
    pub file_path: String,
    pub fixed_code: String,
    #[serde(default)]
    pub summary: String,
}

/// Decoded fix-generation response. Never constructed with empty `fixes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixProposal {
    pub fixes: Vec<ProposedFix>,
    #[serde(default)]
    pub pr_title: Option<String>,
    #[serde(default)]
    pub pr_description: Option<String>,
}

/// Strip markdown code fences from a response. The body ends at the first
/// closing fence, so trailing prose is dropped. A reply truncated before
/// its closing fence keeps everything after the opening one.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    // Skip any preamble before an opening json fence.
    let trimmed = match trimmed.find("```json") {
        Some(pos) if pos > 0 => &trimmed[pos..],
        _ => trimmed,
    };
    let clean = if let Some(rest) = trimmed.strip_prefix("```json") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest
    } else {
        return trimmed;
    };
    match clean.find("```") {
        Some(end) => clean[..end].trim(),
        None => clean.trim(),
    }
}

/// Close an unterminated string and any unclosed arrays/objects.
///
/// Input that already parses is returned unchanged. Otherwise one `"` is
/// appended if the quote count is odd, then one `]` per excess `[`, then
/// one `}` per excess `{`.
pub fn repair_truncated_json(json: &str) -> String {
    if serde_json::from_str::<Value>(json).is_ok() {
        return json.to_string();
    }

    let mut repaired = json.trim().to_string();

    if repaired.matches('"').count() % 2 != 0 {
        repaired.push('"');
    }

    let open_brackets = excess(&repaired, '[', ']');
    let open_braces = excess(&repaired, '{', '}');
    repaired.extend(std::iter::repeat(']').take(open_brackets));
    repaired.extend(std::iter::repeat('}').take(open_braces));

    repaired
}

fn excess(text: &str, open: char, close: char) -> usize {
    let opened = text.matches(open).count();
    let closed = text.matches(close).count();
    opened.saturating_sub(closed)
}

/// Decode a fix-generation response, repairing truncation once if needed.
///
/// Returns `None` when the text cannot be parsed, when `fixes` is missing
/// or empty, or when an entry lacks `filePath`/`fixedCode`.
pub fn parse_fix_proposal(raw: &str) -> Option<FixProposal> {
    let body = strip_code_fences(raw);

    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Fix response is not valid JSON, attempting repair");
            match serde_json::from_str(&repair_truncated_json(body)) {
                Ok(value) => {
                    info!("Fix response repaired");
                    value
                }
                Err(e) => {
                    warn!(error = %e, raw_len = raw.len(), "Fix response could not be repaired");
                    return None;
                }
            }
        }
    };

    match value.get("fixes").and_then(Value::as_array) {
        Some(fixes) if !fixes.is_empty() => {}
        _ => {
            warn!("Fix response has no fixes");
            return None;
        }
    }

    match serde_json::from_value::<FixProposal>(value) {
        Ok(proposal) => Some(proposal),
        Err(e) => {
            warn!(error = %e, "Fix response has malformed entries");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences_variants() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(
            strip_code_fences("Here is the fix:\n```json\n{\"a\":1}\n```"),
            "{\"a\":1}"
        );
        // Truncated before the closing fence
        assert_eq!(strip_code_fences("```json\n{\"a\": \"x"), "{\"a\": \"x");
    }

    #[test]
    fn test_trailing_prose_after_fence_is_dropped() {
        let raw = "```json\n{\"fixes\": [{\"filePath\": \"App/A.swift\", \"fixedCode\": \"let a = 1\"}]}\n```\n\nLet me know if you need more changes.";
        assert_eq!(
            strip_code_fences(raw),
            "{\"fixes\": [{\"filePath\": \"App/A.swift\", \"fixedCode\": \"let a = 1\"}]}"
        );
        let proposal = parse_fix_proposal(raw).unwrap();
        assert_eq!(proposal.fixes[0].file_path, "App/A.swift");
    }

    #[test]
    fn test_repair_leaves_valid_json_untouched() {
        let valid = r#"{"fixes": [{"filePath": "a", "fixedCode": "b"}]}"#;
        assert_eq!(repair_truncated_json(valid), valid);
        assert_eq!(repair_truncated_json("[]"), "[]");
    }

    #[test]
    fn test_repair_closes_string_then_brackets_then_braces() {
        let truncated = r#"{"fixes": [{"filePath": "App/A.swift", "fixedCode": "let x"#;
        let repaired = repair_truncated_json(truncated);
        assert!(repaired.ends_with(r#"let x"]}}"#));
        // Closer order is not nesting-aware, so this shape stays invalid
        assert!(serde_json::from_str::<Value>(&repaired).is_err());
    }

    #[test]
    fn test_repair_makes_simple_truncation_parse() {
        let truncated = r#"{"prTitle": "Fix crash", "fixes": [1, 2"#;
        let repaired = repair_truncated_json(truncated);
        assert_eq!(repaired, r#"{"prTitle": "Fix crash", "fixes": [1, 2]}"#);
        assert!(serde_json::from_str::<Value>(&repaired).is_ok());
    }

    #[test]
    fn test_parse_full_proposal() {
        let raw = r#"```json
{
  "fixes": [{"filePath": "App/UserService.swift", "fixedCode": "guard let name else { return \"\" }", "summary": "Guard nil name"}],
  "prTitle": "Fix nil user name crash",
  "prDescription": "Replaces a force unwrap."
}
```"#;
        let proposal = parse_fix_proposal(raw).unwrap();
        assert_eq!(proposal.fixes.len(), 1);
        assert_eq!(proposal.fixes[0].file_path, "App/UserService.swift");
        assert_eq!(proposal.fixes[0].summary, "Guard nil name");
        assert_eq!(proposal.pr_title.as_deref(), Some("Fix nil user name crash"));
    }

    #[test]
    fn test_empty_fixes_is_none() {
        assert!(parse_fix_proposal(r#"{"fixes": [], "prTitle": "x"}"#).is_none());
    }

    #[test]
    fn test_missing_fixes_after_repair_is_none() {
        let truncated = r#"```json
{"prTitle": "Fix crash", "prDescription": "Long text cut off"#;
        assert!(parse_fix_proposal(truncated).is_none());
    }

    #[test]
    fn test_summary_defaults_but_paths_are_required() {
        let proposal =
            parse_fix_proposal(r#"{"fixes": [{"filePath": "a", "fixedCode": "b"}]}"#).unwrap();
        assert_eq!(proposal.fixes[0].summary, "");
        assert!(proposal.pr_title.is_none());

        assert!(parse_fix_proposal(r#"{"fixes": [{"filePath": "a"}]}"#).is_none());
    }

    #[test]
    fn test_unrepairable_text_is_none() {
        assert!(parse_fix_proposal("I could not produce a fix.").is_none());
        assert!(parse_fix_proposal("").is_none());
    }
}
