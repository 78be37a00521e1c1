//! Error taxonomy and the VM unwind currency.
//!
//! Three layers: `SyntaxError` at the compile boundary, `ScriptError` for
//! script-level errors (thrown values included), and `Signal` for everything
//! the VM unwinds with. Route signals and host interrupts share the signal
//! channel with script errors but are filtered apart by the exception
//! regions and the catchability predicate.

use crate::runner::ds::value::JsValue;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    ReferenceError,
    SyntaxError,
    UriError,
    EvalError,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::UriError => "URIError",
            ErrorKind::EvalError => "EvalError",
        }
    }
}

/// A script-level error. `value` carries the thrown value verbatim when the
/// script threw something other than an engine-made error.
#[derive(Debug, Clone)]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
    pub value: Option<JsValue>,
    pub line: u32,
}

impl ScriptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ScriptError {
            kind,
            message: message.into(),
            value: None,
            line: 0,
        }
    }

    pub fn thrown(value: JsValue, line: u32) -> Self {
        let message = value.to_display_string();
        ScriptError {
            kind: ErrorKind::Error,
            message,
            value: Some(value),
            line,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        ScriptError::new(ErrorKind::TypeError, message)
    }

    pub fn reference_error(message: impl Into<String>) -> Self {
        ScriptError::new(ErrorKind::ReferenceError, message)
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        ScriptError::new(ErrorKind::RangeError, message)
    }

    /// The value a catch clause binds.
    pub fn catch_value(&self) -> JsValue {
        match &self.value {
            Some(v) => v.clone(),
            None => JsValue::String(format!("{}: {}", self.kind.name(), self.message)),
        }
    }
}

impl Display for ScriptError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)
    }
}

/// What the VM unwinds with. Only `Script` signals are catchable by default;
/// `Route` is internal plumbing for control transfers out of finally bodies
/// and is intercepted solely by route-filtered regions.
#[derive(Debug, Clone)]
pub enum Signal {
    Script(ScriptError),
    Route(u32),
    Cancellation(String),
    StackOverflow,
}

impl Signal {
    pub fn script(kind: ErrorKind, message: impl Into<String>) -> Self {
        Signal::Script(ScriptError::new(kind, message))
    }
}

/// Syntax error with source coordinates, produced by the parser.
#[derive(Debug, Clone)]
pub struct SyntaxError {
    pub message: String,
    pub line: u32,
    pub path: String,
}

impl Display for SyntaxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SyntaxError: {} ({}:{})", self.message, self.path, self.line)
    }
}

/// Host-facing error type returned by the engine API.
#[derive(Debug, Clone)]
pub enum EngineError {
    Syntax(SyntaxError),
    Script { error: ScriptError, stack_trace: String },
    StackOverflow,
    Cancelled(String),
}

impl EngineError {
    pub(crate) fn from_signal(signal: Signal, stack_trace: String) -> Self {
        match signal {
            Signal::Script(error) => EngineError::Script { error, stack_trace },
            Signal::Cancellation(m) => EngineError::Cancelled(m),
            Signal::StackOverflow => EngineError::StackOverflow,
            // Route signals never escape a compiled function body.
            Signal::Route(_) => EngineError::Script {
                error: ScriptError::new(ErrorKind::Error, "internal control signal escaped"),
                stack_trace,
            },
        }
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Syntax(e) => write!(f, "{}", e),
            EngineError::Script { error, stack_trace } => {
                if stack_trace.is_empty() {
                    write!(f, "{}", error)
                } else {
                    write!(f, "{}", stack_trace)
                }
            }
            EngineError::StackOverflow => write!(f, "RangeError: maximum call depth exceeded"),
            EngineError::Cancelled(m) => write!(f, "execution cancelled: {}", m),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<SyntaxError> for EngineError {
    fn from(e: SyntaxError) -> Self {
        EngineError::Syntax(e)
    }
}
