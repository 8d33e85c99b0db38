//! Backtrace text parser
//!
//! Converts the multi-line error text the engine attaches to an exception
//! into a structured frame sequence. The parser is pure: same text in, same
//! frames out, with no dependency on any engine or coordinator state.
//!
//! The engine emits the summary line first, then one frame per line in one
//! of three shapes:
//!
//! ```text
//! Error: message            <- summary, skipped
//!     at func (file:3:5)    <- located frame (optionally `at new func (...)`)
//!     at func (file)        <- frame with an opaque file descriptor
//!     at file:3:5           <- anonymous frame, column optional
//! ```

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

// The located shape must be tried first: the bare-descriptor pattern would
// otherwise swallow a `file:row:col` suffix as part of the file name.
static RE_FRAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s+at\s(?P<new>new\s)?(?P<func>.+)\s\((?P<file>[^:]+):?(?P<row>\d+)?:?(?P<col>\d+)?\)")
        .unwrap()
});

static RE_FUNC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s+at\s(?P<new>new\s)?(?P<func>.+)\s\((?P<file>[^\)]+)\)").unwrap()
});

static RE_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s+at\s(?P<file>[^:]+):?(?P<row>\d+)?:?(?P<col>\d+)?").unwrap()
});

/// One parsed entry of a textual backtrace, outermost call first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Function name; `None` for anonymous frames
    pub func_name: Option<String>,
    /// Script file name, or an opaque descriptor such as `native`
    pub file_name: String,
    /// 1-based line number; `None` when the frame carries no location
    pub row: Option<u32>,
    /// 1-based column number; `None` is distinct from column zero
    pub column: Option<u32>,
    /// Frame was a constructor call (`at new Func (...)`)
    pub is_constructor: bool,
}

impl StackFrame {
    /// Frame originates from an `eval` call.
    pub fn is_eval(&self) -> bool {
        self.func_name.as_deref() == Some("eval") || self.file_name.starts_with("eval at")
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at ")?;
        if self.is_constructor {
            write!(f, "new ")?;
        }
        if let Some(func) = &self.func_name {
            write!(f, "{func} ({}", self.file_name)?;
        } else {
            write!(f, "{}", self.file_name)?;
        }
        if let Some(row) = self.row {
            write!(f, ":{row}")?;
            if let Some(col) = self.column {
                write!(f, ":{col}")?;
            }
        }
        if self.func_name.is_some() {
            write!(f, ")")?;
        }
        Ok(())
    }
}

// A digit run that overflows u32 makes the line malformed too, reported
// through the same assertion as an unmatched line.
fn num(line: &str, m: Option<regex::Match<'_>>) -> Option<u32> {
    m.map(|m| {
        m.as_str()
            .parse()
            .unwrap_or_else(|_| panic!("unrecognized stack frame line: {line:?}"))
    })
}

/// Parse a raw backtrace text into frames, top frame first.
///
/// The first line is the human-readable summary and produces no frame.
/// Each later non-empty line must match one of the three frame shapes;
/// anything else means the engine's output format changed under us, which
/// is an assertion-level failure rather than a droppable line.
pub fn parse_stack(text: &str) -> Vec<StackFrame> {
    let mut frames = Vec::new();

    for line in text.lines().skip(1) {
        if let Some(c) = RE_FRAME.captures(line) {
            frames.push(StackFrame {
                func_name: Some(c["func"].to_string()),
                file_name: c["file"].to_string(),
                row: num(line, c.name("row")),
                column: num(line, c.name("col")),
                is_constructor: c.name("new").is_some(),
            });
            continue;
        }

        if let Some(c) = RE_FUNC.captures(line) {
            frames.push(StackFrame {
                func_name: Some(c["func"].to_string()),
                file_name: c["file"].to_string(),
                row: None,
                column: None,
                is_constructor: c.name("new").is_some(),
            });
            continue;
        }

        if let Some(c) = RE_FILE.captures(line) {
            frames.push(StackFrame {
                func_name: None,
                file_name: c["file"].to_string(),
                row: num(line, c.name("row")),
                column: num(line, c.name("col")),
                is_constructor: false,
            });
            continue;
        }

        assert!(line.is_empty(), "unrecognized stack frame line: {line:?}");
    }

    frames
}
