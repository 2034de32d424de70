//! Small utilities shared across the compiler stages.

use std::fmt::{self, Formatter};
use std::rc::Rc;

/// Macro that can wrap any body, and only executes the body if we are running
/// in debug mode. Debug mode is enabled by setting the environment variable
/// DEBUG=true. This compiles away to nothing when --release is used.
///
/// Example:
/// ```
/// use wat::debug;
/// debug!(println!("Hello!"));
/// ```
///
/// BTW that last assertion about --release hasn't _actually_ been confirmed,
/// feel free to test that yourself.
#[macro_export]
macro_rules! debug {
    ($arg:expr) => {
        #[cfg(debug_assertions)]
        {
            if let Ok(debug_val) = std::env::var("DEBUG") {
                if debug_val.to_lowercase().as_str() == "true" {
                    $arg
                }
            }
        }
    };
}

/// A location in a source file. WAT only ever needs line-level granularity
/// (the original compiler this is descended from tracked the same), so this
/// is much simpler than a column-accurate span.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub struct Position {
    pub file: Rc<str>,
    pub line: u32,
}

impl Position {
    pub fn new(file: impl Into<Rc<str>>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// A position to use for code that has no real source location, e.g.
    /// instructions synthesized by the compiler itself rather than parsed
    /// from a `asm` block.
    pub fn synthetic() -> Self {
        Self::new("<compiler>", 0)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            write!(f, "{}", self.line)
        } else {
            write!(f, "{}({})", self.file, self.line)
        }
    }
}

/// Writes the offending source line (if it can be found) below an error
/// message, for use in `{:#}`-style alternate formatting.
pub fn fmt_src_highlight(
    f: &mut Formatter<'_>,
    pos: &Position,
    source: &str,
) -> fmt::Result {
    if let Some(line_text) = source.lines().nth(pos.line.saturating_sub(1) as usize) {
        write!(f, "\n  {}", line_text.trim_end())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_file() {
        let pos = Position::new("foo.wat", 12);
        assert_eq!(pos.to_string(), "foo.wat(12)");
    }

    #[test]
    fn display_without_file() {
        let pos = Position::new("", 12);
        assert_eq!(pos.to_string(), "12");
    }
}
