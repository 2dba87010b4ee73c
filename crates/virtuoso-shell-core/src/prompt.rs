//! Prompt recognition and the start-up prompt handshake.
//!
//! The interpreter signals readiness only by printing its prompt. At session
//! start it is told to switch to a distinctive prompt literal; everything the
//! synchronizer and classifier do afterwards is anchored to that literal.

use regex::Regex;
use uuid::Uuid;

use crate::code::skill_quote;

/// Default primary prompt literal requested from the interpreter.
pub const PRIMARY_PROMPT: &str = "vsh> ";

/// Default continuation prompt literal, printed while the interpreter waits
/// for the rest of a multi-line expression.
pub const CONTINUATION_PROMPT: &str = "vsh? ";

/// Compiled recognizers for one session's prompts.
#[derive(Debug, Clone)]
pub struct PromptScheme {
    primary: String,
    continuation: String,
    line_start: Regex,
    mid_line: Regex,
    boundary: Regex,
}

impl PromptScheme {
    /// Build a scheme for the given prompt literals.
    #[must_use]
    pub fn new(primary: &str, continuation: &str) -> Self {
        let quoted_primary = regex::escape(primary);
        let quoted_continuation = regex::escape(continuation);
        Self {
            primary: primary.to_owned(),
            continuation: continuation.to_owned(),
            line_start: Regex::new(&format!("(?m)^{quoted_primary}"))
                .expect("escaped literal compiles"),
            mid_line: Regex::new(&quoted_primary).expect("escaped literal compiles"),
            boundary: Regex::new(&format!("{quoted_primary}|{quoted_continuation}"))
                .expect("escaped literal compiles"),
        }
    }

    /// The primary prompt literal.
    #[must_use]
    pub fn primary(&self) -> &str {
        &self.primary
    }

    /// The continuation prompt literal.
    #[must_use]
    pub fn continuation(&self) -> &str {
        &self.continuation
    }

    /// The command instructing the interpreter to switch to these prompts.
    #[must_use]
    pub fn handshake_command(&self) -> String {
        format!(
            "setPrompts({} {})",
            skill_quote(&self.primary),
            skill_quote(&self.continuation)
        )
    }

    /// Locate the first primary-prompt occurrence in `text`.
    ///
    /// The start-of-line variant is consulted first; the embedded variant
    /// covers prompts pushed mid-line by terminal wrapping or overwrites.
    /// Returns the matched byte range.
    #[must_use]
    pub fn find_prompt(&self, text: &str) -> Option<(usize, usize)> {
        self.line_start
            .find(text)
            .or_else(|| self.mid_line.find(text))
            .map(|m| (m.start(), m.end()))
    }

    /// Split `text` on every prompt echo, primary or continuation.
    pub fn split_boundaries<'t>(&self, text: &'t str) -> impl Iterator<Item = &'t str> {
        self.boundary.split(text)
    }
}

impl Default for PromptScheme {
    fn default() -> Self {
        Self::new(PRIMARY_PROMPT, CONTINUATION_PROMPT)
    }
}

/// A uniquely tagged probe for ready-probe synchronization.
///
/// The probe command makes the interpreter print the tag once it has consumed
/// everything sent before it, which disambiguates a real prompt from output
/// that merely looks like one.
#[derive(Debug, Clone)]
pub struct ReadyProbe {
    tag: String,
}

impl ReadyProbe {
    /// Build a probe with a fresh unique tag.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tag: format!("vsh-done-{}", Uuid::new_v4().simple()),
        }
    }

    /// The sentinel tag to look for in accumulated output.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The command instructing the interpreter to print the tag.
    #[must_use]
    pub fn command(&self) -> String {
        format!("printf(\"{}\\n\")", self.tag)
    }

    /// Position of the tag in `text`, if present.
    #[must_use]
    pub fn find(&self, text: &str) -> Option<usize> {
        text.find(&self.tag)
    }
}

impl Default for ReadyProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_quotes_both_literals() {
        let scheme = PromptScheme::default();
        assert_eq!(scheme.handshake_command(), "setPrompts(\"vsh> \" \"vsh? \")");
    }

    #[test]
    fn line_anchored_match_wins_over_embedded() {
        let scheme = PromptScheme::default();
        let text = "noise vsh> not-a-real-prompt\nvsh> ";
        let (start, _) = scheme.find_prompt(text).unwrap();
        assert_eq!(&text[..start], "noise vsh> not-a-real-prompt\n");
    }

    #[test]
    fn embedded_match_is_the_fallback() {
        let scheme = PromptScheme::default();
        let text = "wrapped line vsh> ";
        let (start, end) = scheme.find_prompt(text).unwrap();
        assert_eq!(start, 13);
        assert_eq!(end, text.len());
    }

    #[test]
    fn prompt_at_buffer_start_matches() {
        let scheme = PromptScheme::default();
        assert_eq!(scheme.find_prompt("vsh> "), Some((0, 5)));
    }

    #[test]
    fn boundaries_split_on_both_prompts() {
        let scheme = PromptScheme::default();
        let segments: Vec<&str> = scheme.split_boundaries("one\nvsh> two\nvsh? three").collect();
        assert_eq!(segments, ["one\n", "two\n", "three"]);
    }

    #[test]
    fn probe_tags_are_unique_and_printable() {
        let a = ReadyProbe::new();
        let b = ReadyProbe::new();
        assert_ne!(a.tag(), b.tag());
        assert!(a.command().starts_with("printf(\"vsh-done-"));
        assert!(a.command().ends_with("\\n\")"));
    }

    #[test]
    fn probe_finds_its_own_tag() {
        let probe = ReadyProbe::new();
        let text = format!("output\nvsh> {}\nt\nvsh> ", probe.tag());
        assert_eq!(probe.find(&text), Some(12));
        assert_eq!(probe.find("output without tag"), None);
    }
}
