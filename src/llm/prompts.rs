use crate::crash::CrashIssue;
use crate::resolver::{Resolution, ResolvedFile, SourceExcerpt};

/// Well-known crash signals and what usually causes them. Matched as
/// substrings of the upper-cased crash title.
pub const CRASH_PATTERNS: &[(&str, &str)] = &[
    (
        "EXC_BAD_ACCESS",
        "Memory access violation: a deallocated object, dangling pointer or force-unwrapped nil",
    ),
    (
        "EXC_BREAKPOINT",
        "Swift runtime trap: force unwrap (!), fatalError() or an out-of-range index",
    ),
    (
        "EXC_CRASH (SIGABRT)",
        "Explicit abort: assertion failure, uncaught exception or failed precondition",
    ),
    (
        "EXC_RESOURCE",
        "Resource limit exceeded: memory limit, CPU overuse or a watchdog timeout",
    ),
    (
        "EXC_BAD_INSTRUCTION",
        "Illegal instruction: an implicitly unwrapped optional was nil",
    ),
    (
        "SIGABRT",
        "Process abort: NSException, fatalError or UI updated off the main thread",
    ),
    (
        "SIGSEGV",
        "Segmentation fault: invalid memory access, often around C/C++ interop",
    ),
];

const NO_PATTERN: &str = "No known crash pattern matched";
const NO_SOURCE_CONTEXT: &str = "No source context: no source file could be identified or retrieved for this crash.";

/// Bullet list of the crash-pattern descriptions matching `title`.
pub fn pattern_hints(title: &str) -> String {
    let upper = title.to_uppercase();
    let hints: Vec<String> = CRASH_PATTERNS
        .iter()
        .filter(|(signal, _)| upper.contains(signal))
        .map(|(_, description)| format!("• {}", description))
        .collect();

    if hints.is_empty() {
        NO_PATTERN.to_string()
    } else {
        hints.join("\n")
    }
}

fn fence_language(path: &str) -> &str {
    path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("")
}

fn line_label(line: Option<u32>) -> String {
    line.map(|l| l.to_string()).unwrap_or_else(|| "N/A".to_string())
}

fn source_context(excerpts: &[SourceExcerpt]) -> String {
    if excerpts.is_empty() {
        return NO_SOURCE_CONTEXT.to_string();
    }

    excerpts
        .iter()
        .map(|excerpt| match &excerpt.resolution {
            Resolution::Failed { reason } => format!(
                "### {} (line {})\nLookup failed: {}",
                excerpt.location.file,
                line_label(excerpt.line()),
                reason
            ),
            Resolution::Resolved(file) => format!(
                "### {} (crash line: {})\n```{}\n{}\n```\n\n**Recent changes:**\n{}",
                file.path,
                line_label(excerpt.line()),
                fence_language(&file.path),
                file.excerpt,
                file.history_text()
            ),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Free-text diagnosis request.
pub fn analysis_prompt(issue: &CrashIssue, alert_label: &str, excerpts: &[SourceExcerpt]) -> String {
    format!(
        r#"You are an expert in iOS/Swift crash analysis. Analyze the crash below, detected by the crash reporting service.

## Crash details
- Alert type: {label}
- Error title: {title}
- Details (method/location): {subtitle}
- App version: {version}

## Crash pattern hints
{hints}

## Related source code (from the repository)
{context}

---

Cover the following:

1. **🔍 Root cause**
   Combine the error name, method and source code to explain exactly why the app crashed.

2. **🔄 Reproduction scenario**
   Describe one or two user flows that can trigger this crash.

3. **🛠️ Suggested fix**
   Propose a concrete Swift patch. Use guard let, optional chaining, nil coalescing or other defensive code as appropriate.

4. **🛡️ Defensive coding**
   Suggest any extra guards that would prevent the same class of crash.

5. **⚠️ Nearby risk areas**
   Point out places in the same file or project that may carry the same risk.

This will be shown in a chat message, so keep it concise and use Markdown. At most 3-5 sentences per item."#,
        label = alert_label,
        title = CrashIssue::or_na(&issue.title),
        subtitle = CrashIssue::or_na(&issue.subtitle),
        version = CrashIssue::or_na(&issue.app_version),
        hints = pattern_hints(&issue.title),
        context = source_context(excerpts),
    )
}

/// Structured fix request over the full content of every resolved file.
pub fn fix_prompt(issue: &CrashIssue, files: &[(&ResolvedFile, Option<u32>)]) -> String {
    let files_context = files
        .iter()
        .map(|(file, line)| {
            format!(
                "### File: {} (crash line: {})\n```{}\n{}\n```",
                file.path,
                line_label(*line),
                fence_language(&file.path),
                file.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You are a senior iOS/Swift developer fixing a production crash.

## Crash details
- Error: {title}
- Details: {subtitle}

## Source files to fix (full content)
{files_context}

---

Fix the crash above.

IMPORTANT: to save tokens, change only what the fix needs. `fixedCode` must hold the complete fixed file; keep every part unrelated to the crash exactly as it was.

Respond ONLY with JSON in the format below. Do not include any other text.

```json
{{
  "fixes": [
    {{
      "filePath": "exact repository path of the file being fixed",
      "fixedCode": "complete fixed file content",
      "summary": "one-line summary of the change"
    }}
  ],
  "prTitle": "short pull request title",
  "prDescription": "detailed description of the fix (Markdown)"
}}
```

Rules:
- `fixedCode` must be the **complete** fixed content of that file.
- Only fix files listed above, using their exact paths.
- Keep the existing structure and style; fix only the cause of the crash.
- Prefer Swift safety patterns: guard let, optional chaining, nil coalescing.
- No unrelated changes. Make the smallest change that fixes the crash.
- Reply with JSON only, wrapped in a ```json fence."#,
        title = CrashIssue::or_na(&issue.title),
        subtitle = CrashIssue::or_na(&issue.subtitle),
        files_context = files_context,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::FileLocation;
    use crate::resolver::ResolutionTier;

    fn resolved(path: &str) -> ResolvedFile {
        ResolvedFile {
            path: path.to_string(),
            content: "let a = b!".to_string(),
            excerpt: " → 1: let a = b!".to_string(),
            sha: "abc".to_string(),
            history: Vec::new(),
            tier: ResolutionTier::CodeSearch,
        }
    }

    #[test]
    fn test_pattern_hints_match_title_substrings() {
        let hints = pattern_hints("exc_bad_access (code=1, address=0x0)");
        assert!(hints.contains("Memory access violation"));
        assert_eq!(hints.lines().count(), 1);

        let hints = pattern_hints("EXC_CRASH (SIGABRT)");
        assert_eq!(hints.lines().count(), 2);

        assert_eq!(pattern_hints("NSInvalidArgumentException"), NO_PATTERN);
    }

    #[test]
    fn test_analysis_prompt_without_sources() {
        let issue = CrashIssue::new("1", "EXC_BREAKPOINT", "", "");
        let prompt = analysis_prompt(&issue, "New fatal issue", &[]);
        assert!(prompt.contains(NO_SOURCE_CONTEXT));
        assert!(prompt.contains("- Details (method/location): N/A"));
        assert!(prompt.contains("Swift runtime trap"));
    }

    #[test]
    fn test_analysis_prompt_includes_failed_and_resolved_sources() {
        let issue = CrashIssue::new("1", "SIGSEGV", "A.swift:3", "1.0.2");
        let excerpts = vec![
            SourceExcerpt {
                location: FileLocation::new("A.swift", Some(3)),
                resolution: Resolution::Resolved(resolved("App/A.swift")),
            },
            SourceExcerpt {
                location: FileLocation::new("Ghost.swift", None),
                resolution: Resolution::Failed {
                    reason: "file not found in repository".to_string(),
                },
            },
        ];
        let prompt = analysis_prompt(&issue, "Regressed issue", &excerpts);
        assert!(prompt.contains("### App/A.swift (crash line: 3)\n```swift"));
        assert!(prompt.contains("### Ghost.swift (line N/A)\nLookup failed: file not found"));
        assert!(prompt.contains("(no recent commits found)"));
    }

    #[test]
    fn test_fix_prompt_carries_full_content_and_schema() {
        let issue = CrashIssue::new("1", "EXC_BREAKPOINT", "A.swift line 1", "1.0");
        let file = resolved("App/A.swift");
        let prompt = fix_prompt(&issue, &[(&file, Some(1))]);
        assert!(prompt.contains("### File: App/A.swift (crash line: 1)"));
        assert!(prompt.contains("let a = b!"));
        assert!(prompt.contains("\"fixes\": ["));
        assert!(prompt.contains("\"prTitle\""));
    }
}
