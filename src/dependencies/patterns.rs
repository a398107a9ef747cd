//! Glob style class name patterns.
//!
//! Patterns are written with either `.` or `/` as package separator. `*` matches within one
//! package segment, `**` matches across segments, everything else is literal. A pattern has
//! to match the whole internal class name.

use regex::Regex;

use crate::Result;

/// Converts one glob into an anchored regular expression.
fn glob_to_regex(glob: &str) -> String {
    let mut expression = String::with_capacity(glob.len() * 2 + 6);
    expression.push_str("^(?:");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                expression.push_str(".*");
            }
            '*' => expression.push_str(r"\w*"),
            '.' | '/' => expression.push('/'),
            other => expression.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expression.push_str(")$");
    expression
}

/// A compiled set of class name patterns.
#[derive(Debug, Clone, Default)]
pub struct ClassPatterns {
    patterns: Vec<Regex>,
}

impl ClassPatterns {
    /// Compiles every glob of `globs`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Pattern`] if a glob does not form a valid expression.
    pub fn compile<S: AsRef<str>>(globs: &[S]) -> Result<Self> {
        let patterns = globs
            .iter()
            .map(|glob| Regex::new(&glob_to_regex(glob.as_ref())))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ClassPatterns { patterns })
    }

    /// `true` if no pattern was given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// `true` if any pattern matches the internal class name `name`.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(name))
    }
}
