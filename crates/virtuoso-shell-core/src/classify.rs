//! Classification of accumulated interpreter output.

use regex::Regex;
use tracing::debug;

use crate::error::EvalError;
use crate::prompt::PromptScheme;

/// Marker the interpreter prints in front of runtime error reports.
pub const ERROR_MARKER: &str = "*Error*";

/// One statement's cleaned output, numbered in presentation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementOutput {
    /// 1-based position among the command's statement outputs.
    pub ordinal: usize,
    /// Cleaned output text.
    pub text: String,
}

/// Outcome of classifying one accumulated buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Classified {
    /// Per-statement outputs in presentation order.
    pub statements: Vec<StatementOutput>,
    /// Structured error found behind the marker, if any.
    pub error: Option<EvalError>,
}

impl Classified {
    /// The joined payload. When an error is present this is the text captured
    /// before the marker, so partial output survives alongside the error.
    #[must_use]
    pub fn text(&self) -> String {
        self.statements
            .iter()
            .map(|statement| statement.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parses raw terminal output into cleaned results and structured errors.
///
/// Classification is idempotent: running it again over an already-cleaned
/// payload changes nothing and detects no error, because the marker and all
/// prompt echoes are consumed on the first pass.
#[derive(Debug, Clone)]
pub struct OutputClassifier {
    ansi: Regex,
    error_sig: Regex,
}

impl OutputClassifier {
    /// Build a classifier with the interpreter's fixed error signature.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ansi: Regex::new("\x1b\\[[0-9;?]*[ -/]*[@-~]").expect("static pattern compiles"),
            error_sig: Regex::new(r"(?s)\*Error\*\s*(.*)").expect("static pattern compiles"),
        }
    }

    /// Strip ANSI control sequences and normalize line endings.
    #[must_use]
    pub fn normalize(&self, raw: &str) -> String {
        self.ansi
            .replace_all(raw, "")
            .replace("\r\n", "\n")
            .replace('\r', "")
    }

    /// Classify `raw` output accumulated for one command.
    #[must_use]
    pub fn classify(&self, raw: &str, prompts: &PromptScheme) -> Classified {
        let normalized = self.normalize(raw);
        let (payload, error) = match self.error_sig.find(&normalized) {
            Some(marker) => {
                let rest = &normalized[marker.start() + ERROR_MARKER.len()..];
                let message = prompts
                    .split_boundaries(rest)
                    .collect::<String>()
                    .trim()
                    .to_owned();
                debug!("error marker in shell output: {message}");
                (&normalized[..marker.start()], Some(EvalError::new(message)))
            }
            None => (normalized.as_str(), None),
        };
        let statements = prompts
            .split_boundaries(payload)
            .map(|segment| segment.trim_start_matches('\n').trim_end())
            .filter(|segment| !segment.trim().is_empty())
            .enumerate()
            .map(|(index, text)| StatementOutput {
                ordinal: index + 1,
                text: text.to_owned(),
            })
            .collect();
        Classified { statements, error }
    }
}

impl Default for OutputClassifier {
    fn default() -> Self {
        Self::new()
    }
}
