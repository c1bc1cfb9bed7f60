//! Structured script diagnostics.
//!
//! Rhai provides rich error types (parse + runtime) with positions. These are
//! wrapped into a stable, JSON-serializable diagnostic that the editor panel
//! can surface without access to the host log.

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptDiagnosticKind {
    /// Syntax/parse errors (compile time).
    ParseError,
    /// Runtime errors in user code, including `throw`.
    RuntimeError,
    /// Script used the block vocabulary incorrectly (unknown function, wrong argument types).
    HostApiMisuse,
    /// The run could not be carried out by the host (worker thread lost, etc).
    HostError,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptPhase {
    Compile,
    Run,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScriptLocation {
    /// 1-based line number in the user script.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScriptDiagnostic {
    pub kind: ScriptDiagnosticKind,
    pub phase: ScriptPhase,
    pub message: String,
    pub location: Option<ScriptLocation>,
    /// Raw engine error string (useful for bug reports).
    #[serde(default)]
    pub raw: Option<String>,
}

impl ScriptDiagnostic {
    pub fn host_error(message: impl Into<String>) -> Self {
        Self {
            kind: ScriptDiagnosticKind::HostError,
            phase: ScriptPhase::Run,
            message: message.into(),
            location: None,
            raw: None,
        }
    }

    /// Compilation failures; the run never started.
    pub fn is_compile_error(&self) -> bool {
        self.phase == ScriptPhase::Compile
    }
}

impl std::fmt::Display for ScriptDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{} (line {}, column {})", self.message, loc.line, loc.column),
            None => write!(f, "{}", self.message),
        }
    }
}

fn classify_message(message: &str) -> ScriptDiagnosticKind {
    // Rhai error strings are fairly stable; this avoids depending on its enum variants.
    let lower = message.to_ascii_lowercase();

    if lower.contains("function not found")
        || lower.contains("variable not found")
        || lower.contains("property not found")
        || lower.contains("mismatched types")
        || lower.contains("array index")
    {
        return ScriptDiagnosticKind::HostApiMisuse;
    }

    ScriptDiagnosticKind::RuntimeError
}

fn location_of(pos: rhai::Position) -> Option<ScriptLocation> {
    let line = pos.line()? as u32;
    if line == 0 {
        return None;
    }
    Some(ScriptLocation {
        line,
        column: (pos.position().unwrap_or(0) as u32).max(1),
    })
}

pub fn from_parse_error(err: &rhai::ParseError) -> ScriptDiagnostic {
    let raw = err.to_string();
    ScriptDiagnostic {
        kind: ScriptDiagnosticKind::ParseError,
        phase: ScriptPhase::Compile,
        message: raw.clone(),
        location: location_of(err.position()),
        raw: Some(raw),
    }
}

pub fn from_eval_error(err: &rhai::EvalAltResult) -> ScriptDiagnostic {
    let raw = err.to_string();
    ScriptDiagnostic {
        kind: classify_message(&raw),
        phase: ScriptPhase::Run,
        message: raw.clone(),
        location: location_of(err.position()),
        raw: Some(raw),
    }
}
