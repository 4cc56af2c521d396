//! Streaming line classifier.
//!
//! Lines are fed one at a time; cross-line constructs (tracebacks, debugger
//! signal reports) are tracked in two independent slots, and every detection
//! is folded into a first-seen ordered table keyed by [`EventKey`].

use std::collections::{HashMap, VecDeque};

use crate::model::{Event, EventKey, Level};
use crate::patterns::{parse_line_no, patterns};

pub const DEFAULT_CONTEXT_LINES: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Location {
    file: String,
    line: Option<u32>,
    function: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
enum Traceback {
    #[default]
    Idle,
    Active { last: Option<Location> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct PendingSignal {
    name: String,
    message: String,
}

#[derive(Debug)]
pub struct Analyzer {
    context: VecDeque<String>,
    context_lines: usize,
    traceback: Traceback,
    pending_signal: Option<PendingSignal>,
    events: Vec<Event>,
    index: HashMap<EventKey, usize>,
    lines_processed: u64,
}

impl Default for Analyzer {
    fn default() -> Self { Self::new() }
}

impl Analyzer {
    pub fn new() -> Self { Self::with_context_lines(DEFAULT_CONTEXT_LINES) }

    pub fn with_context_lines(context_lines: usize) -> Self {
        Self {
            context: VecDeque::with_capacity(context_lines),
            context_lines,
            traceback: Traceback::Idle,
            pending_signal: None,
            events: vec![],
            index: HashMap::new(),
            lines_processed: 0,
        }
    }

    pub fn process_lines<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines { self.process_line(line.as_ref()); }
    }

    pub fn process_line(&mut self, line: &str) {
        let raw = line.trim_end_matches(['\r', '\n']);
        self.push_context(raw);
        self.lines_processed += 1;
        let p = patterns();

        if p.traceback_start.is_match(raw) {
            log::trace!("traceback opened at line {}", self.lines_processed);
            self.traceback = Traceback::Active { last: None };
            return;
        }

        if self.traceback != Traceback::Idle {
            if let Some(loc) = traceback_frame(raw) {
                self.traceback = Traceback::Active { last: Some(loc) };
                return;
            }
            let trimmed = raw.trim();
            if let Some(c) = p.traceback_exception.captures(trimmed) {
                let last = match std::mem::take(&mut self.traceback) {
                    Traceback::Active { last } => last,
                    Traceback::Idle => None,
                };
                let mut event = Event::error(&c[1], trimmed);
                if let Some(loc) = last {
                    event = event.with_location(Some(loc.file), loc.line).with_function(loc.function);
                }
                self.add_event(event);
                return;
            }
            // Source echo lines between frames: keep the block open and let other dialects look at the line.
        }

        if self.classify_compiler(raw) { return; }

        if let Some(signal) = self.pending_signal.take() { self.resolve_signal(signal, raw); }

        if let Some(name) = signal_name(raw) {
            log::trace!("{} pending, waiting for a frame line", name);
            self.pending_signal = Some(PendingSignal { name, message: raw.trim().to_string() });
            return;
        }

        self.classify_generic(raw);
    }

    /// Flushes a signal that never got its frame line. An unterminated traceback is dropped.
    pub fn finalize(&mut self) {
        if let Some(PendingSignal { name, message }) = self.pending_signal.take() {
            self.add_event(Event::error(name, message));
        }
        if self.traceback != Traceback::Idle {
            log::debug!("dropping traceback without exception line");
            self.traceback = Traceback::Idle;
        }
    }

    pub fn events(&self) -> &[Event] { &self.events }

    pub fn recent_context(&self) -> Vec<String> { self.context.iter().cloned().collect() }

    pub fn lines_processed(&self) -> u64 { self.lines_processed }

    fn push_context(&mut self, raw: &str) {
        if self.context_lines == 0 { return; }
        if self.context.len() == self.context_lines { self.context.pop_front(); }
        self.context.push_back(raw.to_string());
    }

    fn classify_compiler(&mut self, raw: &str) -> bool {
        let Some(c) = patterns().compiler.captures(raw) else { return false };
        let file = Some(c["file"].to_string());
        let line = parse_line_no(&c["line"]);
        let msg = c["msg"].trim();
        let event = if c["level"].eq_ignore_ascii_case("warning") {
            Event::warning("compiler_warning", msg)
        } else {
            Event::error("compiler_error", msg)
        };
        self.add_event(event.with_location(file, line));
        true
    }

    fn resolve_signal(&mut self, signal: PendingSignal, raw: &str) {
        let p = patterns();
        let mut event = Event::error(signal.name, signal.message);
        if let Some(loc) = p.gdb_location.captures(raw) {
            let function = p.gdb_frame.captures(raw.trim()).map(|f| f[1].to_string());
            event = event.with_location(Some(loc[1].to_string()), parse_line_no(&loc[2])).with_function(function);
        }
        self.add_event(event);
    }

    fn classify_generic(&mut self, raw: &str) {
        let p = patterns();
        let Some(c) = p.generic_level.captures(raw) else { return };
        let (level, kind) = match c[1].to_ascii_uppercase().as_str() {
            "WARNING" => (Level::Warning, "unknown_warning"),
            "FATAL" => (Level::Error, "fatal"),
            "FAILED" => (Level::Error, "failed"),
            _ => (Level::Error, "unknown_error"),
        };
        let (file, line) = match p.file_line.captures(raw) {
            Some(m) => match parse_line_no(&m[2]) {
                Some(n) => (Some(m[1].to_string()), Some(n)),
                None => (None, None),
            },
            None => (None, None),
        };
        let function = p.function.captures(raw).map(|m| m[1].to_string());
        let message = raw.trim();
        let event = match level {
            Level::Warning => Event::warning(kind, message),
            Level::Error => Event::error(kind, message),
        };
        self.add_event(event.with_location(file, line).with_function(function));
    }

    fn add_event(&mut self, event: Event) {
        let key = event.key();
        if let Some(&i) = self.index.get(&key) {
            self.events[i].occurrences += 1;
            return;
        }
        log::debug!("{} {}: {} [{}]", event.level, event.kind, event.message, event.location());
        self.index.insert(key, self.events.len());
        self.events.push(event);
    }
}

fn traceback_frame(raw: &str) -> Option<Location> {
    let c = patterns().traceback_frame.captures(raw)?;
    Some(Location {
        file: c[1].to_string(),
        line: parse_line_no(&c[2]),
        function: c.get(3).map(|m| m.as_str().to_string()),
    })
}

fn signal_name(raw: &str) -> Option<String> {
    let p = patterns();
    p.gdb_signal.captures(raw)
        .or_else(|| p.gdb_signal_short.captures(raw.trim()))
        .map(|c| c[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(lines: &[&str]) -> Analyzer {
        let mut a = Analyzer::new();
        a.process_lines(lines);
        a
    }

    #[test]
    fn compiler_warning() {
        let a = run(&["main.c:10:5: warning: unused variable 'x'\n"]);
        let events = a.events();
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.level, Level::Warning);
        assert_eq!(e.kind, "compiler_warning");
        assert_eq!(e.file.as_deref(), Some("main.c"));
        assert_eq!(e.line, Some(10));
        assert_eq!(e.message, "unused variable 'x'");
        assert_eq!(e.function, None);
    }

    #[test]
    fn compiler_error_without_column_and_uppercase_level() {
        let a = run(&["utils.c:87: ERROR: expected ';' before 'return'"]);
        let e = &a.events()[0];
        assert_eq!(e.level, Level::Error);
        assert_eq!(e.kind, "compiler_error");
        assert_eq!(e.file.as_deref(), Some("utils.c"));
        assert_eq!(e.line, Some(87));
    }

    #[test]
    fn python_traceback_uses_last_frame() {
        let a = run(&[
            "Traceback (most recent call last):\n",
            "  File \"/tmp/main.py\", line 3, in <module>\n",
            "    run()\n",
            "  File \"/tmp/app.py\", line 42, in run\n",
            "    raise ValueError('bad')\n",
            "ValueError: bad\n",
        ]);
        let events = a.events();
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.level, Level::Error);
        assert_eq!(e.kind, "ValueError");
        assert_eq!(e.message, "ValueError: bad");
        assert_eq!(e.file.as_deref(), Some("/tmp/app.py"));
        assert_eq!(e.line, Some(42));
        assert_eq!(e.function.as_deref(), Some("run"));
    }

    #[test]
    fn traceback_without_frames_has_no_location() {
        let a = run(&["Traceback (most recent call last):", "KeyboardInterrupt"]);
        let e = &a.events()[0];
        assert_eq!(e.kind, "KeyboardInterrupt");
        assert_eq!(e.location(), "");
    }

    #[test]
    fn traceback_state_resets_between_blocks() {
        let a = run(&[
            "Traceback (most recent call last):",
            "  File \"a.py\", line 1, in f",
            "Traceback (most recent call last):",
            "pkg.errors.Boom: again",
        ]);
        let e = &a.events()[0];
        assert_eq!(e.kind, "pkg.errors.Boom");
        assert_eq!(e.file, None);
    }

    #[test]
    fn interrupting_line_is_still_classified() {
        let a = run(&[
            "Traceback (most recent call last):",
            "  File \"a.py\", line 1, in f",
            "src/x.c:3:1: error: oops",
            "RuntimeError: late",
        ]);
        let kinds: Vec<&str> = a.events().iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["compiler_error", "RuntimeError"]);
        assert_eq!(a.events()[1].file.as_deref(), Some("a.py"));
    }

    #[test]
    fn unterminated_traceback_is_not_flushed() {
        let mut a = run(&["Traceback (most recent call last):", "  File \"a.py\", line 1, in f"]);
        a.finalize();
        assert!(a.events().is_empty());
    }

    #[test]
    fn gdb_signal_with_location() {
        let a = run(&["Program received signal SIGSEGV, Segmentation fault.\n", "#0  main () at main.c:12\n"]);
        let events = a.events();
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.level, Level::Error);
        assert_eq!(e.kind, "SIGSEGV");
        assert_eq!(e.message, "Program received signal SIGSEGV, Segmentation fault.");
        assert_eq!(e.file.as_deref(), Some("main.c"));
        assert_eq!(e.line, Some(12));
        assert_eq!(e.function.as_deref(), Some("main"));
    }

    #[test]
    fn gdb_signal_location_without_frame_number() {
        let a = run(&["Program received signal SIGSEGV, Segmentation fault.", "0x000055555555515d in compute_value () at calc.c:128"]);
        let e = &a.events()[0];
        assert_eq!(e.file.as_deref(), Some("calc.c"));
        assert_eq!(e.line, Some(128));
        assert_eq!(e.function, None);
    }

    #[test]
    fn signal_without_location_emits_and_line_falls_through() {
        let a = run(&["Program received signal SIGABRT, Aborted.", "FATAL: core dumped"]);
        let events = a.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, "SIGABRT");
        assert_eq!(events[0].file, None);
        assert_eq!(events[1].kind, "fatal");
    }

    #[test]
    fn signal_followed_by_signal_reports_both() {
        let mut a = run(&["SIGINT", "SIGTERM"]);
        assert_eq!(a.events().len(), 1);
        a.finalize();
        let kinds: Vec<&str> = a.events().iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["SIGINT", "SIGTERM"]);
    }

    #[test]
    fn pending_signal_flushes_on_finalize() {
        let mut a = run(&["SIGABRT\n"]);
        assert!(a.events().is_empty());
        a.finalize();
        let events = a.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "SIGABRT");
        assert_eq!(events[0].message, "SIGABRT");
        assert_eq!(events[0].location(), "");
    }

    #[test]
    fn compiler_line_leaves_signal_pending() {
        let a = run(&[
            "Program received signal SIGSEGV, Segmentation fault.",
            "main.c:1:1: error: boom",
            "#0 main () at main.c:12",
        ]);
        let got: Vec<(&str, Option<u32>)> = a.events().iter().map(|e| (e.kind.as_str(), e.line)).collect();
        assert_eq!(got, vec![("compiler_error", Some(1)), ("SIGSEGV", Some(12))]);
    }

    #[test]
    fn finalize_resets_cross_line_state() {
        let mut a = run(&["Traceback (most recent call last):", "  File \"/tmp/a.py\", line 1, in <module>"]);
        a.finalize();
        a.process_line("Done");
        a.process_line("ValueError: late");
        a.finalize();
        assert!(a.events().is_empty(), "{:?}", a.events());

        let mut a = run(&["SIGABRT"]);
        a.finalize();
        a.process_line("#0 main () at main.c:12");
        a.finalize();
        assert_eq!(a.events().len(), 1);
        assert_eq!(a.events()[0].line, None);
    }

    #[test]
    fn finalize_twice_is_harmless() {
        let mut a = run(&["SIGABRT"]);
        a.finalize();
        a.finalize();
        assert_eq!(a.events().len(), 1);
        assert_eq!(a.events()[0].occurrences, 1);
    }

    #[test]
    fn generic_error_extracts_location() {
        let a = run(&["ERROR: failed to open config at config.yml:9\n"]);
        let events = a.events();
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.level, Level::Error);
        assert_eq!(e.kind, "unknown_error");
        assert_eq!(e.file.as_deref(), Some("config.yml"));
        assert_eq!(e.line, Some(9));
    }

    #[test]
    fn generic_keyword_order_decides_type() {
        let a = run(&[
            "WARNING: configuration file not found, using defaults",
            "FATAL: unable to initialize subsystem",
            "step failed in setup_db",
            "warning after error: both",
        ]);
        let events = a.events();
        assert_eq!(events[0].level, Level::Warning);
        assert_eq!(events[0].kind, "unknown_warning");
        assert_eq!(events[1].kind, "fatal");
        assert_eq!(events[2].kind, "failed");
        assert_eq!(events[2].function.as_deref(), Some("setup_db"));
        assert_eq!(events[3].kind, "unknown_warning");
    }

    #[test]
    fn noise_is_ignored_but_kept_in_context() {
        let a = run(&["[INFO] processing step 1", "random noise line"]);
        assert!(a.events().is_empty());
        assert_eq!(a.recent_context(), vec!["[INFO] processing step 1", "random noise line"]);
        assert_eq!(a.lines_processed(), 2);
    }

    #[test]
    fn repeated_events_are_counted() {
        let a = run(&["a.c:1:1: warning: w", "ERROR: boom", "a.c:1:1: warning: w", "a.c:2:1: warning: w", "a.c:1:1: warning: w"]);
        let events = a.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].occurrences, 3);
        assert_eq!(events[0].line, Some(1));
        assert_eq!(events[1].kind, "unknown_error");
        assert_eq!(events[2].line, Some(2));
        assert_eq!(events[2].occurrences, 1);
    }

    #[test]
    fn context_ring_is_bounded() {
        let mut a = Analyzer::with_context_lines(3);
        a.process_lines((0..10).map(|i| format!("line {}\n", i)));
        assert_eq!(a.recent_context(), vec!["line 7", "line 8", "line 9"]);
        let mut none = Analyzer::with_context_lines(0);
        none.process_line("ERROR: x");
        assert!(none.recent_context().is_empty());
        assert_eq!(none.events().len(), 1);
    }

    #[test]
    fn crlf_is_stripped() {
        let a = run(&["main.c:1:1: error: bad\r\n"]);
        assert_eq!(a.events()[0].message, "bad");
        assert_eq!(a.recent_context(), vec!["main.c:1:1: error: bad"]);
    }

    #[test]
    fn zero_line_number_is_unknown() {
        let a = run(&["gen.c:0: error: generated"]);
        let e = &a.events()[0];
        assert_eq!(e.file.as_deref(), Some("gen.c"));
        assert_eq!(e.line, None);
    }
}
