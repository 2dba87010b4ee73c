//! Command blocks and their wire form.

use crate::error::SyntaxErrorKind;

/// The interpreter's own exit command.
pub const EXIT_COMMAND: &str = "exit";

/// A block of source lines accepted for execution.
///
/// Construction enforces the balance invariant: parenthesis, double-quote,
/// and brace counts must each balance across the whole block. A block that
/// fails the check is never sent to the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    lines: Vec<String>,
}

impl CodeBlock {
    /// Validate `source` and build a block from its non-empty lines.
    ///
    /// # Errors
    ///
    /// Returns the first violated balance invariant, checked in order:
    /// parentheses, double quotes, braces.
    pub fn parse(source: &str) -> Result<Self, SyntaxErrorKind> {
        check_balance(source)?;
        let lines = source
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .map(ToOwned::to_owned)
            .collect();
        Ok(Self { lines })
    }

    /// Build a block from a single already-validated lookup command.
    ///
    /// Used for internally synthesized commands whose shape is fixed.
    #[must_use]
    pub fn single(line: impl Into<String>) -> Self {
        Self {
            lines: vec![line.into()],
        }
    }

    /// Whether the block contains no lines at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The accepted source lines, in order.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Lines exactly as written to the interpreter: a leading empty line to
    /// delimit output groups, then each source line verbatim.
    #[must_use]
    pub fn wire_lines(&self) -> Vec<&str> {
        let mut out = Vec::with_capacity(self.lines.len() + 1);
        out.push("");
        out.extend(self.lines.iter().map(String::as_str));
        out
    }

    /// The block as one newline-joined request string.
    #[must_use]
    pub fn joined(&self) -> String {
        self.lines.join("\n")
    }
}

/// Quote `text` as an interpreter string literal.
#[must_use]
pub fn skill_quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        if ch == '"' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Check the balance invariants without building a block.
///
/// # Errors
///
/// Returns the first violation in check order: parentheses, double quotes,
/// braces.
pub fn check_balance(source: &str) -> Result<(), SyntaxErrorKind> {
    let mut parens = 0_i64;
    let mut braces = 0_i64;
    let mut quotes = 0_u64;
    for ch in source.chars() {
        match ch {
            '(' => parens += 1,
            ')' => parens -= 1,
            '{' => braces += 1,
            '}' => braces -= 1,
            '"' => quotes += 1,
            _ => {}
        }
    }
    if parens != 0 {
        return Err(SyntaxErrorKind::UnmatchedParen);
    }
    if quotes % 2 != 0 {
        return Err(SyntaxErrorKind::UnmatchedQuote);
    }
    if braces != 0 {
        return Err(SyntaxErrorKind::UnmatchedBrace);
    }
    Ok(())
}
