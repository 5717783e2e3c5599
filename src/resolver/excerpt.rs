//! Numbered source views handed to the model.

/// Lines shown either side of a known crash line
pub const CONTEXT_RADIUS: usize = 20;
/// Lines shown from the top of the file when the crash line is unknown
pub const HEAD_LINES: usize = 100;

const CRASH_MARKER: &str = " → ";
const PLAIN_MARKER: &str = "   ";

/// Render the part of `content` around `line` (1-based), marking the crash
/// line. Without a usable line number the first [`HEAD_LINES`] are shown.
pub fn excerpt_window(content: &str, line: Option<u32>) -> String {
    let lines: Vec<&str> = content.lines().collect();

    match line.map(|l| l as usize) {
        Some(target) if target >= 1 && target <= lines.len() => {
            let start = target.saturating_sub(CONTEXT_RADIUS);
            let end = (target + CONTEXT_RADIUS).min(lines.len());
            lines[start..end]
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    let number = start + i + 1;
                    let marker = if number == target {
                        CRASH_MARKER
                    } else {
                        PLAIN_MARKER
                    };
                    format!("{}{}: {}", marker, number, text)
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        _ => lines
            .iter()
            .take(HEAD_LINES)
            .enumerate()
            .map(|(i, text)| format!("{}{}: {}", PLAIN_MARKER, i + 1, text))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
