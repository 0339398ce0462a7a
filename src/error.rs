/// Diagnostics reported while parsing and compiling, and the crate error type.

use std::fmt;

use thiserror::Error;

/// What went wrong. The `Display` text is the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiagnosticKind {
    #[error("missing closing parenthesis")]
    UnclosedGroup,
    #[error("unmatched closing parenthesis")]
    UnmatchedClosingParenthesis,
    #[error("missing terminating ] for character class")]
    UnclosedClass,
    #[error("quantifier does not follow a repeatable item")]
    NothingToRepeat,
    #[error("numbers out of order in {{{min},{max}}} quantifier")]
    RepetitionOutOfOrder { min: usize, max: usize },
    #[error("number too big in {{}} quantifier (limit {limit})")]
    RepetitionTooLarge { limit: usize },
    #[error("range out of order in character class ({first:?}-{last:?})")]
    RangeOutOfOrder { first: char, last: char },
    #[error("\\ at end of pattern")]
    TrailingBackslash,
    #[error("unrecognized escape sequence \\{0}")]
    UnknownEscape(char),
    #[error("invalid codepoint value {0:#x}")]
    InvalidCodepoint(u32),
    #[error("malformed escape sequence \\{0}")]
    MalformedEscape(char),
    #[error("group name expected")]
    MissingGroupName,
    #[error("unrecognized character after (?")]
    UnknownGroupSyntax,
    #[error("unknown verb or alpha assertion (*{0})")]
    UnknownVerb(String),
    #[error("unknown POSIX class name {0:?}")]
    UnknownPosixClass(String),
    #[error("unknown property name {0:?}")]
    UnknownProperty(String),
    #[error("malformed condition in conditional group")]
    MalformedCondition,
    #[error("conditional group contains more than two branches")]
    TooManyConditionalBranches,
    #[error("DEFINE group contains more than one branch")]
    DefineWithAlternatives,
    #[error("reference to non-existent capture group {0}")]
    UnresolvedNumberedReference(usize),
    #[error("reference to non-existent capture group named {0:?}")]
    UnresolvedNamedReference(String),
    #[error("subroutine call to unknown group {0}")]
    UnresolvedSubroutine(String),
    #[error("condition refers to unknown group {0:?}")]
    UnresolvedCondition(String),
    #[error("lookbehind assertion is not fixed length")]
    VariableLengthLookbehind,
}

/// A diagnostic and, when the construct is locatable, the codepoint offset in
/// the pattern where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub position: Option<usize>,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn at(position: usize, kind: DiagnosticKind) -> Self {
        Diagnostic {
            position: Some(position),
            kind,
        }
    }

    pub fn unlocated(kind: DiagnosticKind) -> Self {
        Diagnostic {
            position: None,
            kind,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "{} at position {}", self.kind, pos),
            None => write!(f, "{}", self.kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid pattern: {}", join(.0))]
    Parse(Vec<Diagnostic>),
    #[error("pattern cannot be compiled: {}", join(.0))]
    Compile(Vec<Diagnostic>),
}

impl Error {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Error::Parse(d) | Error::Compile(d) => d,
        }
    }
}

fn join(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;
