use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level { Error, Warning }

impl Level {
    pub fn as_str(self) -> &'static str { match self { Level::Error => "ERROR", Level::Warning => "WARNING" } }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// Identity used for deduplication: two detections are the same event iff all six fields match.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub level: Level,
    pub kind: String,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub function: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub level: Level,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub function: Option<String>,
    pub occurrences: usize,
}

impl Event {
    fn new(level: Level, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self { level, kind: kind.into(), message: message.into(), file: None, line: None, function: None, occurrences: 1 }
    }

    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self { Self::new(Level::Error, kind, message) }

    pub fn warning(kind: impl Into<String>, message: impl Into<String>) -> Self { Self::new(Level::Warning, kind, message) }

    pub fn with_location(mut self, file: Option<String>, line: Option<u32>) -> Self {
        self.file = file;
        self.line = line;
        self
    }

    pub fn with_function(mut self, function: Option<String>) -> Self {
        self.function = function;
        self
    }

    pub fn key(&self) -> EventKey {
        EventKey {
            level: self.level,
            kind: self.kind.clone(),
            message: self.message.clone(),
            file: self.file.clone(),
            line: self.line,
            function: self.function.clone(),
        }
    }

    pub fn is_error(&self) -> bool { self.level == Level::Error }

    /// `file (Line n) in function`, with absent parts left out. Empty when nothing is known.
    pub fn location(&self) -> String {
        let mut parts: Vec<String> = vec![];
        if let Some(file) = self.file.as_ref() {
            match self.line {
                Some(l) => parts.push(format!("{} (Line {})", file, l)),
                None => parts.push(file.clone()),
            }
        }
        if let Some(func) = self.function.as_ref() { parts.push(format!("in {}", func)); }
        parts.join(" ")
    }
}
