use comfy_table::{ContentArrangement, Table};
use serde::{Deserialize, Serialize};

use crate::model::{Event, Level};

pub const NO_ISSUES: &str = "No errors or warnings detected.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFmt { Text, Json }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TextFormat { Lines, Table }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub errors: usize,
    pub error_occurrences: usize,
    pub warnings: usize,
    pub warning_occurrences: usize,
}

impl Summary {
    pub fn from_events(events: &[Event]) -> Self {
        let mut s = Summary::default();
        for e in events {
            if e.is_error() {
                s.errors += 1;
                s.error_occurrences += e.occurrences;
            } else {
                s.warnings += 1;
                s.warning_occurrences += e.occurrences;
            }
        }
        s
    }

    pub fn is_clean(&self) -> bool { self.errors == 0 && self.warnings == 0 }
}

pub fn paint(s: &str, code: &str, color: bool) -> String {
    if color { format!("\x1b[{}m{}\x1b[0m", code, s) } else { s.to_string() }
}

fn level_code(l: Level) -> &'static str { match l { Level::Error => "1;31", Level::Warning => "1;33" } }

/// Errors first, then warnings; each group by count desc, then type, then message.
fn grouped(events: &[Event]) -> Vec<(Level, Vec<&Event>)> {
    let mut out = vec![];
    for level in [Level::Error, Level::Warning] {
        let mut group: Vec<&Event> = events.iter().filter(|e| e.level == level).collect();
        if group.is_empty() { continue; }
        group.sort_by(|a, b| b.occurrences.cmp(&a.occurrences).then_with(|| a.kind.cmp(&b.kind)).then_with(|| a.message.cmp(&b.message)));
        out.push((level, group));
    }
    out
}

fn group_title(level: Level) -> &'static str { match level { Level::Error => "Errors", Level::Warning => "Warnings" } }

pub fn generate_text(events: &[Event]) -> String { generate_text_colored(events, false) }

pub fn generate_text_colored(events: &[Event], color: bool) -> String {
    if events.is_empty() { return paint(NO_ISSUES, "1;32", color); }
    let mut lines: Vec<String> = vec![];
    for (level, group) in grouped(events) {
        let total: usize = group.iter().map(|e| e.occurrences).sum();
        lines.push(paint(&format!("{}: {} unique, {} occurrences", group_title(level), group.len(), total), "1", color));
        for e in group {
            let count = if e.occurrences > 1 { format!(" ({}x)", e.occurrences) } else { String::new() };
            let tag = paint(&format!("[{}]", e.level), level_code(e.level), color);
            lines.push(format!("- {} {}{}: {}", tag, e.kind, count, e.message));
            let location = e.location();
            if !location.is_empty() { lines.push(format!("  Location: {}", location)); }
        }
    }
    lines.join("\n")
}

pub fn generate_table(events: &[Event]) -> String {
    if events.is_empty() { return NO_ISSUES.to_string(); }
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Disabled);
    table.set_header(vec!["Level", "Type", "Count", "Message", "Location"]);
    for (_, group) in grouped(events) {
        for e in group {
            table.add_row(vec![e.level.to_string(), e.kind.clone(), e.occurrences.to_string(), e.message.clone(), e.location()]);
        }
    }
    let s = Summary::from_events(events);
    format!("{}\nErrors: {} unique, {} occurrences; Warnings: {} unique, {} occurrences", table, s.errors, s.error_occurrences, s.warnings, s.warning_occurrences)
}

/// Pretty JSON array in event order. Keys come out sorted because `serde_json::Map` is a BTreeMap.
pub fn generate_json(events: &[Event]) -> anyhow::Result<String> {
    let value = serde_json::to_value(events)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Recent raw lines, appended to text reports on request.
pub fn render_context(lines: &[String], color: bool) -> String {
    let mut out = vec![paint(&format!("Recent output ({} lines):", lines.len()), "1;36", color)];
    for l in lines { out.push(format!("  | {}", l)); }
    out.join("\n")
}
