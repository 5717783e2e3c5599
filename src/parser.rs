//! Crash signal parser
//!
//! Pulls candidate `file[:line]` hints out of the free text of a crash
//! issue. Patterns run in priority order and deduplicate by file name,
//! first match wins:
//!
//! 1. `File.ext:42`
//! 2. `File.ext ... line 42`
//! 3. bare `File.ext`
//! 4. only when 1-3 found nothing: `TypeName.method(` infers `TypeName.ext`

use crate::util::base_name;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A parsed source hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLocation {
    /// Bare file name or full repository path
    pub file: String,
    pub line: Option<u32>,
}

impl FileLocation {
    pub fn new(file: impl Into<String>, line: Option<u32>) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// Extracts [`FileLocation`]s for one source-file extension.
#[derive(Debug, Clone)]
pub struct SignalParser {
    extension: String,
    file_line: Regex,
    file_then_line: Regex,
    file_only: Regex,
    call_site: Regex,
}

impl SignalParser {
    /// Build a parser for files ending in `.{extension}` (e.g. `swift`).
    pub fn new(extension: &str) -> anyhow::Result<Self> {
        let ext = regex::escape(extension.trim_start_matches('.'));
        // Optional directory prefix so full repository paths survive intact.
        let file = format!(r"((?:[\w.-]+/)*\w+\.{ext})");

        Ok(Self {
            extension: extension.trim_start_matches('.').to_string(),
            file_line: Regex::new(&format!(r"{file}:(\d+)"))?,
            file_then_line: Regex::new(&format!(r"(?i){file}\b.*?\bline\s+(\d+)"))?,
            file_only: Regex::new(&format!(r"{file}\b"))?,
            call_site: Regex::new(r"(\w+)\.\w+\(")?,
        })
    }

    /// Parse hints out of arbitrary crash text. Never fails; malformed or
    /// empty input yields an empty list.
    pub fn parse(&self, text: &str) -> Vec<FileLocation> {
        let mut found: Vec<FileLocation> = Vec::new();

        for caps in self.file_line.captures_iter(text) {
            push_unique(&mut found, &caps[1], parse_line(&caps[2]));
        }

        for caps in self.file_then_line.captures_iter(text) {
            push_unique(&mut found, &caps[1], parse_line(&caps[2]));
        }

        for caps in self.file_only.captures_iter(text) {
            push_unique(&mut found, &caps[1], None);
        }

        if found.is_empty() {
            for caps in self.call_site.captures_iter(text) {
                let inferred = format!("{}.{}", &caps[1], self.extension);
                push_unique(&mut found, &inferred, None);
            }
        }

        found
    }
}

fn parse_line(raw: &str) -> Option<u32> {
    raw.parse::<u32>().ok().filter(|line| *line > 0)
}

/// Dedup by file name so a full path and a bare name for the same file
/// collapse into the first hint seen.
fn push_unique(found: &mut Vec<FileLocation>, file: &str, line: Option<u32>) {
    let name = base_name(file);
    if !found.iter().any(|existing| base_name(&existing.file) == name) {
        found.push(FileLocation::new(file, line));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> SignalParser {
        SignalParser::new("swift").unwrap()
    }

    #[test]
    fn test_file_colon_line_yields_single_location() {
        let found = parser().parse("EXC_BREAKPOINT Foo.swift:42");
        assert_eq!(found, vec![FileLocation::new("Foo.swift", Some(42))]);
    }

    #[test]
    fn test_file_then_line_pattern() {
        let found = parser().parse("EXC_BREAKPOINT UserService.swift line 53 in getCurrentUserName");
        assert_eq!(found, vec![FileLocation::new("UserService.swift", Some(53))]);
    }

    #[test]
    fn test_line_keyword_is_case_insensitive() {
        let found = parser().parse("CartService.swift - getAveragePrice() Line 71");
        assert_eq!(found, vec![FileLocation::new("CartService.swift", Some(71))]);
    }

    #[test]
    fn test_first_match_wins_for_duplicate_files() {
        let found = parser().parse("Foo.swift:10 crashed, see Foo.swift line 99 and Foo.swift");
        assert_eq!(found, vec![FileLocation::new("Foo.swift", Some(10))]);
    }

    #[test]
    fn test_bare_file_name_has_no_line() {
        let found = parser().parse("AppView2.swift - closure #3 in closure #1 in AppView2.body.getter");
        assert_eq!(found, vec![FileLocation::new("AppView2.swift", None)]);
    }

    #[test]
    fn test_multiple_distinct_files_keep_order() {
        let found = parser().parse("B.swift line 2, then A.swift:1 and C.swift");
        assert_eq!(
            found,
            vec![
                FileLocation::new("A.swift", Some(1)),
                FileLocation::new("B.swift", Some(2)),
                FileLocation::new("C.swift", None),
            ]
        );
    }

    #[test]
    fn test_call_site_inference_only_without_real_files() {
        let found = parser().parse("EXC_BREAKPOINT ChatService.getLastMessage() crashed");
        assert_eq!(found, vec![FileLocation::new("ChatService.swift", None)]);

        let found = parser().parse("CrashScenarios.swift - ChatService.getLastMessage() line 180");
        assert_eq!(found, vec![FileLocation::new("CrashScenarios.swift", Some(180))]);
    }

    #[test]
    fn test_no_recognizable_file_is_empty() {
        assert!(parser().parse("EXC_BAD_ACCESS (code=1, address=0x0)").is_empty());
        assert!(parser().parse("").is_empty());
        assert!(parser().parse("}{)(::: line line 0x").is_empty());
    }

    #[test]
    fn test_full_repository_path_is_kept() {
        let found = parser().parse("App/Services/UserService.swift:53");
        assert_eq!(found, vec![FileLocation::new("App/Services/UserService.swift", Some(53))]);
    }

    #[test]
    fn test_path_and_bare_name_collapse_to_first_hint() {
        let found = parser().parse("EXC_BREAKPOINT App/Services/UserService.swift:53 in UserService.swift");
        assert_eq!(found, vec![FileLocation::new("App/Services/UserService.swift", Some(53))]);
    }

    #[test]
    fn test_other_extensions() {
        let kotlin = SignalParser::new(".kt").unwrap();
        let found = kotlin.parse("java.lang.NullPointerException at MainActivity.kt:88");
        assert_eq!(found, vec![FileLocation::new("MainActivity.kt", Some(88))]);
    }

    #[test]
    fn test_line_zero_is_treated_as_unknown() {
        let found = parser().parse("Foo.swift:0");
        assert_eq!(found, vec![FileLocation::new("Foo.swift", None)]);
    }
}
