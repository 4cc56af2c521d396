//! Line patterns for each recognized dialect, compiled once per process.

use regex::Regex;
use std::sync::OnceLock;

pub struct Patterns {
    pub compiler: Regex,
    pub traceback_start: Regex,
    pub traceback_frame: Regex,
    pub traceback_exception: Regex,
    pub gdb_signal: Regex,
    pub gdb_signal_short: Regex,
    pub gdb_location: Regex,
    pub gdb_frame: Regex,
    pub generic_level: Regex,
    pub file_line: Regex,
    pub function: Regex,
}

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

fn re(src: &str) -> Regex {
    // Sources are literals below; a failure here is a programming error caught by the unit tests.
    Regex::new(src).unwrap_or_else(|e| panic!("invalid built-in pattern {}: {}", src, e))
}

pub fn patterns() -> &'static Patterns {
    PATTERNS.get_or_init(|| Patterns {
        compiler: re(r"(?i)^(?P<file>[^:\s]+):(?P<line>\d+):(?:(?P<col>\d+):)?\s*(?P<level>warning|error):\s*(?P<msg>.*)$"),
        traceback_start: re(r"^Traceback \(most recent call last\):"),
        traceback_frame: re(r#"^\s*File "([^"]+)", line (\d+)(?:, in ([\w<>]+))?"#),
        traceback_exception: re(r"^\s*([A-Za-z_][\w.]*)(?::\s*(.*))?$"),
        gdb_signal: re(r"Program received signal\s+(SIG[A-Z0-9]+)"),
        gdb_signal_short: re(r"^(SIG[A-Z0-9]+)\b"),
        gdb_location: re(r"\bat\s+([^:\s]+):(\d+)"),
        gdb_frame: re(r"^#\d+\s+([^\s(]+)"),
        generic_level: re(r"(?i)\b(ERROR|WARNING|FATAL|FAILED)\b"),
        file_line: re(r"([A-Za-z0-9_./-]+):(\d+)"),
        function: re(r"\bin\s+([A-Za-z_]\w*)\b"),
    })
}

/// Line numbers are positive; `0` or a value past `u32::MAX` counts as unknown.
pub fn parse_line_no(digits: &str) -> Option<u32> {
    digits.parse::<u32>().ok().filter(|n| *n > 0)
}
