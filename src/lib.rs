//! A PCRE-style backtracking regular expression engine.
//!
//! A pattern goes through three stages: [`parser::parse`] builds an AST,
//! [`compiler::compile`] lowers it into an immutable [`StateMachine`], and
//! the [`vm`] functions run that machine against a subject. [`Regex`] wraps
//! the whole pipeline.
//!
//! ```
//! use backtracking_regex::Regex;
//!
//! let re = Regex::new(r"(?<year>\d{4})-(\d\d)").unwrap();
//! let subject = "released 2024-05";
//! let m = re.find(subject).unwrap();
//! assert_eq!(m.name("year").unwrap().as_str(subject), "2024");
//! assert_eq!(m.get(2).unwrap().as_str(subject), "05");
//! ```

pub mod analysis;
pub mod ast;
pub mod compiler;
pub mod error;
pub mod parser;
pub mod ranges;
pub mod stream;
pub mod unicode;
pub mod vm;

pub use analysis::LengthAnalysis;
pub use compiler::{NamedCaptureRegistry, StateMachine, compile};
pub use error::{Diagnostic, DiagnosticKind, Error, Result};
pub use parser::{ParseOptions, parse, parse_with};
pub use stream::{CodepointStream, Position};
pub use vm::{Capture, MatchResult, find_all, find_next, try_match};

/// Backtracking steps allowed per start position before giving up on it.
pub const DEFAULT_MAX_ITERATIONS: usize = 1_000_000;

/// A compiled pattern. Cheap to share: matching never mutates it.
#[derive(Debug, Clone)]
pub struct Regex {
    machine: StateMachine,
    options: ParseOptions,
    max_iterations: usize,
}

impl Regex {
    /// Compile `pattern` with default options.
    pub fn new(pattern: &str) -> Result<Regex> {
        RegexBuilder::new().build(pattern)
    }

    pub fn builder() -> RegexBuilder {
        RegexBuilder::new()
    }

    pub fn is_match<S: AsRef<[u8]> + ?Sized>(&self, subject: &S) -> bool {
        self.find(subject).is_some()
    }

    /// The leftmost match in `subject`.
    pub fn find<S: AsRef<[u8]> + ?Sized>(&self, subject: &S) -> Option<MatchResult> {
        vm::find_next(CodepointStream::new(subject), &self.machine, self.max_iterations)
    }

    /// The leftmost match starting at or after codepoint `start`.
    pub fn find_at<S: AsRef<[u8]> + ?Sized>(&self, subject: &S, start: usize) -> Option<MatchResult> {
        let mut stream = CodepointStream::new(subject);
        for _ in 0..start {
            stream.take()?;
        }
        vm::find_next(stream, &self.machine, self.max_iterations)
    }

    /// Every non-overlapping match, left to right.
    pub fn find_all<S: AsRef<[u8]> + ?Sized>(&self, subject: &S) -> Vec<MatchResult> {
        let mut matches = Vec::new();
        self.for_each_match(subject, |m| matches.push(m));
        matches
    }

    pub fn for_each_match<S: AsRef<[u8]> + ?Sized>(&self, subject: &S, on_match: impl FnMut(MatchResult)) {
        vm::find_all(CodepointStream::new(subject), &self.machine, self.max_iterations, on_match);
    }

    /// Number of capture slots, group 0 included.
    pub fn capture_count(&self) -> usize {
        self.machine.capture_count
    }

    /// The name of each capture slot, if it has one.
    pub fn capture_names(&self) -> Vec<Option<&str>> {
        (0..self.machine.capture_count)
            .map(|index| self.machine.named_captures.name(index))
            .collect()
    }

    pub fn options(&self) -> ParseOptions {
        self.options
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }
}

impl std::str::FromStr for Regex {
    type Err = Error;

    fn from_str(s: &str) -> Result<Regex> {
        Regex::new(s)
    }
}

/// A builder for a [`Regex`] to allow configuring options.
#[derive(Debug, Clone, Copy)]
pub struct RegexBuilder {
    options: ParseOptions,
    max_iterations: usize,
}

impl Default for RegexBuilder {
    fn default() -> Self {
        RegexBuilder {
            options: ParseOptions::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl RegexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and compile `pattern`. Every diagnostic found is returned at once.
    pub fn build(&self, pattern: &str) -> Result<Regex> {
        let (ast, diagnostics) = parser::parse(CodepointStream::new(pattern), self.options);
        if !diagnostics.is_empty() {
            return Err(Error::Parse(diagnostics));
        }
        let analysis = LengthAnalysis::analyze(&ast);
        let machine = compiler::compile(&ast, &analysis);
        if !machine.is_executable() {
            return Err(Error::Compile(machine.diagnostics));
        }
        Ok(Regex {
            machine,
            options: self.options,
            max_iterations: self.max_iterations,
        })
    }

    pub fn case_insensitive(&mut self, yes: bool) -> &mut Self {
        self.options.case_insensitive = yes;
        self
    }

    pub fn multiline(&mut self, yes: bool) -> &mut Self {
        self.options.multiline = yes;
        self
    }

    pub fn dot_all(&mut self, yes: bool) -> &mut Self {
        self.options.dot_all = yes;
        self
    }

    pub fn extended(&mut self, yes: bool) -> &mut Self {
        self.options.extended = yes;
        self
    }

    pub fn extended_more(&mut self, yes: bool) -> &mut Self {
        self.options.extended = yes;
        self.options.extended_more = yes;
        self
    }

    pub fn no_auto_capture(&mut self, yes: bool) -> &mut Self {
        self.options.no_auto_capture = yes;
        self
    }

    pub fn global(&mut self, yes: bool) -> &mut Self {
        self.options.global = yes;
        self
    }

    /// Backtracking steps allowed per start position. Exceeding the limit fails
    /// that attempt rather than raising an error.
    ///
    /// Default is `1_000_000` (1 million).
    pub fn max_iterations(&mut self, limit: usize) -> &mut Self {
        self.max_iterations = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Regex>();
        assert_send_sync::<StateMachine>();
    }

    #[test]
    fn test_builder_flags() {
        let re = Regex::builder().case_insensitive(true).build("abc").unwrap();
        assert!(re.is_match("xABCx"));
        let re = Regex::builder().dot_all(true).build("a.b").unwrap();
        assert!(re.is_match("a\nb"));
        assert!(!Regex::new("a.b").unwrap().is_match("a\nb"));
        let re = Regex::builder().multiline(true).build("^b$").unwrap();
        assert!(re.is_match("a\nb\nc"));
        let re = Regex::builder().extended(true).build("a b c # letters").unwrap();
        assert!(re.is_match("abc"));
        let re = Regex::builder().no_auto_capture(true).build("(a)(?<n>b)").unwrap();
        assert_eq!(re.capture_count(), 2);
        assert!(re.options().no_auto_capture);
        assert!(!re.options().global);
        let re = Regex::builder().global(true).build("a").unwrap();
        assert!(re.options().global);
    }

    #[test]
    fn test_errors_carry_every_diagnostic() {
        let err = Regex::new("(a\\q").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        assert_eq!(err.diagnostics().len(), 2);
        let err = Regex::new("(?<=a*)b").unwrap_err();
        assert!(matches!(err, Error::Compile(_)));
        assert!("[z-a]".parse::<Regex>().is_err());
    }

    #[test]
    fn test_capture_names_and_find_at() {
        let re = Regex::new("(?<word>\\w+) (\\d)").unwrap();
        assert_eq!(re.capture_names(), vec![None, Some("word"), None]);
        let subject = "ab 1 cd 2";
        let m = re.find_at(subject, 3).unwrap();
        assert_eq!(m.name("word").unwrap().as_str(subject), "cd");
        assert!(re.find_at(subject, 100).is_none());
    }

    #[test]
    fn test_byte_subjects() {
        let re = Regex::new("b+").unwrap();
        let subject: &[u8] = b"a\xffbbb";
        let m = re.find(subject).unwrap().get(0).unwrap();
        assert_eq!(m.as_bytes(subject), b"bbb");
        assert_eq!((m.start(), m.end()), (2, 5));
    }

    #[test]
    fn test_shared_across_threads() {
        let re = std::sync::Arc::new(Regex::new("(\\d+)").unwrap());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let re = std::sync::Arc::clone(&re);
                std::thread::spawn(move || {
                    let subject = format!("n{i}");
                    re.find(subject.as_str()).map(|m| m.start())
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Some(1));
        }
    }
}
