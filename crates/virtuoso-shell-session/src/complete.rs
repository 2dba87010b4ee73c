//! Interpreter-backed name completion and help lookup.
//!
//! Completion never consults a local symbol table; the interpreter itself is
//! asked. A partial input is classified into one of three request kinds and
//! turned into the matching lookup commands, whose answers are merged,
//! deduplicated and narrowed to the typed prefix.

use regex::Regex;

const BOLD: &str = "\x1b[1m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// Attribute-access operator spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrow {
    /// `->`, direct attribute access.
    Direct,
    /// `~>`, access mapped over database objects.
    Mapped,
}

impl Arrow {
    fn parse(text: &str) -> Self {
        if text == "~>" { Self::Mapped } else { Self::Direct }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "->",
            Self::Mapped => "~>",
        }
    }
}

/// What the caller's partial input is asking to complete.
///
/// Matched most specific first: an attribute of a list head, an attribute of
/// an object, a plain name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionRequest {
    /// `car(name)->prefix`: attributes of the first element of a list.
    ListHeadAttribute {
        base: String,
        arrow: Arrow,
        prefix: String,
    },
    /// `name->prefix`: attributes of an object.
    ObjectAttribute {
        base: String,
        arrow: Arrow,
        prefix: String,
    },
    /// A bare identifier prefix, completed against functions and variables.
    PlainName { prefix: String },
}

impl CompletionRequest {
    /// The prefix candidates must start with.
    #[must_use]
    pub fn prefix(&self) -> &str {
        match self {
            Self::ListHeadAttribute { prefix, .. }
            | Self::ObjectAttribute { prefix, .. }
            | Self::PlainName { prefix } => prefix,
        }
    }

    /// The interpreter commands answering this request.
    ///
    /// Plain names are looked up in both the function and the variable
    /// namespace; attribute requests ask the object for its members with the
    /// `?` wildcard.
    #[must_use]
    pub fn lookups(&self) -> Vec<String> {
        match self {
            Self::PlainName { prefix } => vec![
                format!("listFunctions(\"^{prefix}\")"),
                format!("listVariables(\"^{prefix}\")"),
            ],
            Self::ObjectAttribute { base, arrow, .. } => {
                vec![format!("{base}{}?", arrow.as_str())]
            }
            Self::ListHeadAttribute { base, arrow, .. } => {
                vec![format!("car({base}){}?", arrow.as_str())]
            }
        }
    }
}

/// Recognizes completion and help requests in partial input.
pub struct Completer {
    list_head: Regex,
    object: Regex,
    plain: Regex,
    token: Regex,
    optional_arg: Regex,
}

impl Completer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            list_head: Regex::new(r"car\(\s*(\w+)\s*\)\s*(->|~>)(\w*)$")
                .expect("static pattern compiles"),
            object: Regex::new(r"(\w+)\s*(->|~>)(\w*)$").expect("static pattern compiles"),
            plain: Regex::new(r"(\w+)$").expect("static pattern compiles"),
            token: Regex::new(r"^\w+$").expect("static pattern compiles"),
            optional_arg: Regex::new(r"\?\w+").expect("static pattern compiles"),
        }
    }

    /// Classify the tail of `partial` into a completion request.
    ///
    /// Returns `None` when the tail is not completable, e.g. when it ends in
    /// a delimiter.
    #[must_use]
    pub fn parse(&self, partial: &str) -> Option<CompletionRequest> {
        if let Some(caps) = self.list_head.captures(partial) {
            return Some(CompletionRequest::ListHeadAttribute {
                base: caps[1].to_owned(),
                arrow: Arrow::parse(&caps[2]),
                prefix: caps[3].to_owned(),
            });
        }
        if let Some(caps) = self.object.captures(partial) {
            return Some(CompletionRequest::ObjectAttribute {
                base: caps[1].to_owned(),
                arrow: Arrow::parse(&caps[2]),
                prefix: caps[3].to_owned(),
            });
        }
        self.plain.captures(partial).map(|caps| CompletionRequest::PlainName {
            prefix: caps[1].to_owned(),
        })
    }

    /// The help command for `token`, or `None` when `token` is not a plain
    /// identifier.
    #[must_use]
    pub fn help_command(&self, token: &str) -> Option<String> {
        self.token
            .is_match(token)
            .then(|| format!("help({token})"))
    }

    /// Decorate help text for terminal display: the looked-up keyword bold,
    /// optional-argument markers in color. Cosmetic only.
    #[must_use]
    pub fn style_help(&self, text: &str, keyword: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let keyword_pattern = Regex::new(&format!(r"\b{}\b", regex::escape(keyword)))
            .expect("escaped keyword compiles");
        let replacement = format!("{BOLD}{keyword}{RESET}");
        let bolded = keyword_pattern.replace_all(text, regex::NoExpand(&replacement));
        self.optional_arg
            .replace_all(&bolded, |caps: &regex::Captures<'_>| {
                format!("{CYAN}{}{RESET}", &caps[0])
            })
            .into_owned()
    }
}

impl Default for Completer {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull candidate names out of a lookup answer.
///
/// Answers are printed lists, `("plot" "plotMode")` or `(width height)`;
/// a bare `nil` means no matches. Candidates not starting with `prefix` are
/// dropped.
#[must_use]
pub fn extract_candidates(answer: &str, prefix: &str) -> Vec<String> {
    if answer.trim() == "nil" {
        return Vec::new();
    }
    answer
        .split(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '"' | '\''))
        .filter(|token| !token.is_empty() && token.starts_with(prefix))
        .map(str::to_owned)
        .collect()
}
