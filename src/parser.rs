/// Regex parser: converts a pattern codepoint stream into an AST.
///
/// Malformed input never aborts the parse. Each problem is reported through the
/// diagnostic callback and leaves a `Node::Error` behind, so one pass over the
/// pattern reports everything wrong with it.

use rustc_hash::FxHashMap;

use crate::ast::*;
use crate::error::{Diagnostic, DiagnosticKind};
use crate::ranges::CodepointRangeList;
use crate::stream::CodepointStream;
use crate::unicode::{self, UnicodeClass};

/// Largest bound accepted in a `{m,n}` quantifier.
pub const MAX_REPETITION: usize = 65_535;

/// Pattern-wide flags. Inline `(?imnsx)` groups change them for their scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// `i`
    pub case_insensitive: bool,
    /// `m`: `^` and `$` match at line breaks.
    pub multiline: bool,
    /// `n`: plain `(...)` does not capture.
    pub no_auto_capture: bool,
    /// `s`: `.` matches line breaks.
    pub dot_all: bool,
    /// `x`: whitespace and `#` comments are ignored outside classes.
    pub extended: bool,
    /// `xx`: also ignore spaces and tabs inside classes.
    pub extended_more: bool,
    /// Report every match instead of the first. Not settable inline.
    pub global: bool,
}

/// Parse `stream` into an AST rooted at capture group 0, collecting diagnostics.
pub fn parse(stream: CodepointStream<'_>, options: ParseOptions) -> (Node, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let ast = parse_with(stream, options, &mut |d| diagnostics.push(d));
    if !diagnostics.is_empty() {
        log::debug!("pattern parsed with {} diagnostics", diagnostics.len());
    }
    (ast, diagnostics)
}

/// Parse `stream`, handing each diagnostic to `on_diagnostic` as it is found.
pub fn parse_with(
    stream: CodepointStream<'_>,
    options: ParseOptions,
    on_diagnostic: &mut dyn FnMut(Diagnostic),
) -> Node {
    Parser::new(stream, options, on_diagnostic).parse()
}

/// A group reference checked once the whole pattern has been seen.
enum Reference {
    Numbered { index: usize, position: usize },
    Named { name: String, position: usize },
}

enum ClassAtom {
    Char(char),
    Set(CodepointRangeList),
    Skip,
}

pub struct Parser<'s, 'd> {
    stream: CodepointStream<'s>,
    options: Vec<ParseOptions>,
    group_count: usize,
    names: FxHashMap<String, Vec<usize>>,
    references: Vec<Reference>,
    on_diagnostic: &'d mut dyn FnMut(Diagnostic),
}

impl<'s, 'd> Parser<'s, 'd> {
    pub fn new(
        stream: CodepointStream<'s>,
        options: ParseOptions,
        on_diagnostic: &'d mut dyn FnMut(Diagnostic),
    ) -> Self {
        Parser {
            stream,
            options: vec![options],
            group_count: 0,
            names: FxHashMap::default(),
            references: Vec::new(),
            on_diagnostic,
        }
    }

    /// Parse the full pattern. The result is always capture group 0.
    pub fn parse(&mut self) -> Node {
        let nodes = self.parse_body(None, false);
        self.check_references();
        Node::Subexpression(Subexpression::capture(nodes, 0, None))
    }

    /// Returns total number of capturing groups found.
    pub fn group_count(&self) -> usize {
        self.group_count
    }

    fn options(&self) -> ParseOptions {
        self.options.last().copied().unwrap_or_default()
    }

    fn position(&self) -> usize {
        self.stream.codepoint_position()
    }

    fn report(&mut self, position: usize, kind: DiagnosticKind) {
        (self.on_diagnostic)(Diagnostic::at(position, kind));
    }

    fn peek(&self) -> Option<char> {
        self.stream.peek()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.stream.peek_nth(n)
    }

    fn advance(&mut self) -> Option<char> {
        self.stream.take()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn looking_at(&self, s: &str) -> bool {
        let mut probe = self.stream;
        s.chars().all(|c| probe.take() == Some(c))
    }

    fn eat_str(&mut self, s: &str) -> bool {
        if self.looking_at(s) {
            for _ in s.chars() {
                self.advance();
            }
            true
        } else {
            false
        }
    }

    /// Parse branches up to the `)` closing the group opened at `open`, or to
    /// the end of the pattern when `open` is `None`.
    fn parse_body(&mut self, open: Option<usize>, duplicate: bool) -> Vec<Node> {
        let base = self.group_count;
        let mut highest = base;
        let mut branches: Vec<Subexpression> = Vec::new();
        let mut current: Vec<Node> = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None => {
                    if let Some(open) = open {
                        self.report(open, DiagnosticKind::UnclosedGroup);
                    }
                    break;
                }
                Some(')') => {
                    let pos = self.position();
                    self.advance();
                    if open.is_some() {
                        break;
                    }
                    self.report(pos, DiagnosticKind::UnmatchedClosingParenthesis);
                    current.push(Node::Error);
                }
                Some('|') => {
                    self.advance();
                    let branch = std::mem::take(&mut current);
                    branches.push(Subexpression::new(branch, SubexpressionKind::NonCapturing));
                    if duplicate {
                        highest = highest.max(self.group_count);
                        self.group_count = base;
                    }
                }
                Some(_) => self.parse_item(&mut current),
            }
        }
        if duplicate {
            self.group_count = highest.max(self.group_count);
        }
        if branches.is_empty() {
            current
        } else {
            branches.push(Subexpression::new(current, SubexpressionKind::NonCapturing));
            vec![Node::Alternative(branches)]
        }
    }

    fn skip_trivia(&mut self) {
        if !self.options().extended {
            return;
        }
        loop {
            match self.peek() {
                Some(c) if is_pattern_whitespace(c) => {
                    self.advance();
                }
                Some('#') => {
                    while let Some(c) = self.advance() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    /// Parse one atom or quantifier into `current`.
    fn parse_item(&mut self, current: &mut Vec<Node>) {
        let pos = self.position();
        let options = self.options();
        let Some(c) = self.peek() else {
            return;
        };
        match c {
            '(' => {
                if let Some(node) = self.parse_group() {
                    current.push(node);
                }
            }
            '[' => {
                let node = self.parse_class();
                current.push(node);
            }
            '.' => {
                self.advance();
                current.push(Node::CharacterClass(dot_class(options.dot_all)));
            }
            '^' => {
                self.advance();
                current.push(Node::SimpleAssertion(if options.multiline {
                    SimpleAssertion::LineStart
                } else {
                    SimpleAssertion::SubjectStart
                }));
            }
            '$' => {
                self.advance();
                current.push(Node::SimpleAssertion(if options.multiline {
                    SimpleAssertion::LineEnd
                } else {
                    SimpleAssertion::SubjectEndOrFinalNewline
                }));
            }
            '\\' => self.parse_escape(current),
            '*' | '+' | '?' => {
                self.advance();
                let (min, max) = match c {
                    '*' => (0, None),
                    '+' => (1, None),
                    _ => (0, Some(1)),
                };
                self.apply_quantifier(current, pos, min, max);
            }
            '{' => match self.try_parse_bounds() {
                Some((min, max)) => self.apply_quantifier(current, pos, min, max),
                None => {
                    self.advance();
                    push_literal(current, '{', options.case_insensitive);
                }
            },
            _ => {
                self.advance();
                push_literal(current, c, options.case_insensitive);
            }
        }
    }

    fn apply_quantifier(
        &mut self,
        current: &mut Vec<Node>,
        pos: usize,
        min: usize,
        max: Option<usize>,
    ) {
        let kind = if self.eat('?') {
            RepetitionKind::Lazy
        } else if self.eat('+') {
            RepetitionKind::Possessive
        } else {
            RepetitionKind::Greedy
        };
        let body = match current.pop() {
            // Only the last codepoint of a literal run is repeated.
            Some(Node::Literal {
                mut text,
                case_insensitive,
            }) if text.len() > 1 => {
                let last = text.split_off(text.len() - 1);
                current.push(Node::Literal {
                    text,
                    case_insensitive,
                });
                Node::Literal {
                    text: last,
                    case_insensitive,
                }
            }
            Some(node) if node.is_repeatable() => node,
            other => {
                current.extend(other);
                self.report(pos, DiagnosticKind::NothingToRepeat);
                current.push(Node::Error);
                return;
            }
        };
        current.push(Node::Repetition(Repetition {
            body: Box::new(body),
            min,
            max,
            kind,
        }));
    }

    /// Parse `{m}`, `{m,}`, `{m,n}` or `{,n}`. Anything else is not a
    /// quantifier and leaves the stream untouched.
    fn try_parse_bounds(&mut self) -> Option<(usize, Option<usize>)> {
        let start = self.stream;
        let pos = self.position();
        self.advance(); // consume '{'
        let min = self.parse_decimal();
        let bounds = if self.eat(',') {
            let max = self.parse_decimal();
            if min.is_none() && max.is_none() {
                None
            } else {
                Some((min.unwrap_or(0), max))
            }
        } else {
            min.map(|m| (m, Some(m)))
        };
        let (mut min, mut max) = match bounds {
            Some(bounds) if self.eat('}') => bounds,
            _ => {
                self.stream = start;
                return None;
            }
        };
        if min > MAX_REPETITION || max.is_some_and(|m| m > MAX_REPETITION) {
            self.report(pos, DiagnosticKind::RepetitionTooLarge { limit: MAX_REPETITION });
            min = min.min(MAX_REPETITION);
            max = max.map(|m| m.min(MAX_REPETITION));
        }
        if let Some(m) = max {
            if m < min {
                self.report(pos, DiagnosticKind::RepetitionOutOfOrder { min, max: m });
                max = Some(min);
            }
        }
        Some((min, max))
    }

    fn parse_decimal(&mut self) -> Option<usize> {
        let mut value: Option<usize> = None;
        while let Some(d) = self.peek().and_then(|c| c.to_digit(10)) {
            self.advance();
            value = Some(value.unwrap_or(0).saturating_mul(10).saturating_add(d as usize));
        }
        value
    }

    /// Parse anything starting with `(`. Returns `None` for constructs that
    /// leave nothing in the tree: comments and option settings.
    fn parse_group(&mut self) -> Option<Node> {
        let open = self.position();
        self.advance(); // consume '('
        if self.peek() == Some('*') {
            return Some(self.parse_verb(open));
        }
        if !self.eat('?') {
            if self.options().no_auto_capture {
                return Some(self.group(open, SubexpressionKind::NonCapturing, None));
            }
            return Some(self.capture_group(open, None));
        }
        let pos = self.position();
        let node = match self.peek() {
            Some('#') => {
                while let Some(c) = self.advance() {
                    if c == ')' {
                        return None;
                    }
                }
                self.report(open, DiagnosticKind::UnclosedGroup);
                return None;
            }
            Some(':') => {
                self.advance();
                self.group(open, SubexpressionKind::NonCapturing, None)
            }
            Some('|') => {
                self.advance();
                self.group(open, SubexpressionKind::Duplicate, None)
            }
            Some('>') => {
                self.advance();
                self.group(open, SubexpressionKind::Atomic, None)
            }
            Some('=') => {
                self.advance();
                self.assertion(open, false, false, false)
            }
            Some('!') => {
                self.advance();
                self.assertion(open, false, true, false)
            }
            Some('*') => {
                self.advance();
                self.assertion(open, false, false, true)
            }
            Some('<') => {
                self.advance();
                if self.eat('=') {
                    self.assertion(open, true, false, false)
                } else if self.eat('!') {
                    self.assertion(open, true, true, false)
                } else if self.eat('*') {
                    self.assertion(open, true, false, true)
                } else {
                    self.named_capture_group(open, '>')
                }
            }
            Some('\'') => {
                self.advance();
                self.named_capture_group(open, '\'')
            }
            Some('P') => {
                self.advance();
                if self.eat('<') {
                    self.named_capture_group(open, '>')
                } else if self.eat('=') {
                    match self.parse_name(')') {
                        Some(name) => {
                            self.named_reference(&name, open);
                            Node::NamedBackreference {
                                name,
                                case_insensitive: self.options().case_insensitive,
                            }
                        }
                        None => self.abandon_group(),
                    }
                } else if self.eat('>') {
                    self.named_subroutine(open, ')')
                } else {
                    self.report(pos, DiagnosticKind::UnknownGroupSyntax);
                    self.abandon_group()
                }
            }
            Some('&') => {
                self.advance();
                self.named_subroutine(open, ')')
            }
            Some('R') if self.peek_nth(1) == Some(')') => {
                self.advance();
                self.advance();
                Node::NumberedSubroutine(0)
            }
            Some(c) if starts_group_number(c, self.peek_nth(1)) => {
                match self.parse_group_number() {
                    Some(index) if self.eat(')') => {
                        self.references.push(Reference::Numbered {
                            index,
                            position: open,
                        });
                        Node::NumberedSubroutine(index)
                    }
                    _ => {
                        self.report(pos, DiagnosticKind::UnknownGroupSyntax);
                        self.abandon_group()
                    }
                }
            }
            Some('(') => {
                self.advance();
                self.parse_conditional(open)
            }
            Some(c) if is_option_char(c) => return self.parse_option_group(open),
            _ => {
                self.report(pos, DiagnosticKind::UnknownGroupSyntax);
                self.abandon_group()
            }
        };
        Some(node)
    }

    /// Skip the rest of a malformed group, including its closing parenthesis.
    fn recover(&mut self) {
        let mut depth = 1usize;
        while let Some(c) = self.advance() {
            match c {
                '\\' => {
                    self.advance();
                }
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    fn abandon_group(&mut self) -> Node {
        self.recover();
        Node::Error
    }

    fn group_body(&mut self, open: usize, options: ParseOptions, duplicate: bool) -> Vec<Node> {
        self.options.push(options);
        let nodes = self.parse_body(Some(open), duplicate);
        self.options.pop();
        nodes
    }

    fn group(&mut self, open: usize, kind: SubexpressionKind, options: Option<ParseOptions>) -> Node {
        let options = options.unwrap_or(self.options());
        let nodes = self.group_body(open, options, kind == SubexpressionKind::Duplicate);
        Node::Subexpression(Subexpression::new(nodes, kind))
    }

    fn capture_group(&mut self, open: usize, name: Option<String>) -> Node {
        self.group_count += 1;
        let index = self.group_count;
        if let Some(name) = &name {
            let indices = self.names.entry(name.clone()).or_default();
            if !indices.contains(&index) {
                indices.push(index);
            }
        }
        let nodes = self.group_body(open, self.options(), false);
        Node::Subexpression(Subexpression::capture(nodes, index, name))
    }

    fn named_capture_group(&mut self, open: usize, terminator: char) -> Node {
        match self.parse_name(terminator) {
            Some(name) => self.capture_group(open, Some(name)),
            None => self.abandon_group(),
        }
    }

    fn named_subroutine(&mut self, open: usize, terminator: char) -> Node {
        match self.parse_name(terminator) {
            Some(name) => {
                self.named_reference(&name, open);
                Node::NamedSubroutine(name)
            }
            None if terminator == ')' => self.abandon_group(),
            None => Node::Error,
        }
    }

    fn assertion(&mut self, open: usize, backward: bool, negative: bool, non_atomic: bool) -> Node {
        Node::ComplexAssertion(self.assertion_body(open, backward, negative, non_atomic))
    }

    fn assertion_body(
        &mut self,
        open: usize,
        backward: bool,
        negative: bool,
        non_atomic: bool,
    ) -> ComplexAssertion {
        let nodes = self.group_body(open, self.options(), false);
        ComplexAssertion {
            body: Subexpression::new(nodes, SubexpressionKind::NonCapturing),
            backward,
            negative,
            non_atomic,
        }
    }

    /// `(*VERB)` and `(*alpha_assertion:...)`.
    fn parse_verb(&mut self, open: usize) -> Node {
        self.advance(); // consume '*'
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c == ')' || c == ':' {
                break;
            }
            name.push(c);
            self.advance();
        }
        if self.eat(':') {
            let (backward, negative, non_atomic) = match name.as_str() {
                "pla" | "positive_lookahead" => (false, false, false),
                "nla" | "negative_lookahead" => (false, true, false),
                "plb" | "positive_lookbehind" => (true, false, false),
                "nlb" | "negative_lookbehind" => (true, true, false),
                "napla" | "non_atomic_positive_lookahead" => (false, false, true),
                "naplb" | "non_atomic_positive_lookbehind" => (true, false, true),
                "atomic" => return self.group(open, SubexpressionKind::Atomic, None),
                _ => {
                    self.report(open, DiagnosticKind::UnknownVerb(name));
                    return self.abandon_group();
                }
            };
            return self.assertion(open, backward, negative, non_atomic);
        }
        if !self.eat(')') {
            self.report(open, DiagnosticKind::UnclosedGroup);
            return Node::Error;
        }
        match name.as_str() {
            "FAIL" | "F" => Node::Feature(Feature::Fail),
            "UTF" | "UTF8" => Node::Feature(Feature::Utf),
            "UCP" => Node::Feature(Feature::Ucp),
            _ => {
                self.report(open, DiagnosticKind::UnknownVerb(name));
                Node::Error
            }
        }
    }

    /// `(?i)`, `(?-s)`, `(?^x)`, `(?i:...)` and so on.
    fn parse_option_group(&mut self, open: usize) -> Option<Node> {
        let mut options = self.options();
        let mut enable = true;
        loop {
            let pos = self.position();
            let Some(c) = self.advance() else {
                self.report(open, DiagnosticKind::UnclosedGroup);
                return Some(Node::Error);
            };
            match c {
                'i' => options.case_insensitive = enable,
                'm' => options.multiline = enable,
                'n' => options.no_auto_capture = enable,
                's' => options.dot_all = enable,
                'x' => {
                    options.extended = enable;
                    if self.eat('x') || !enable {
                        options.extended_more = enable;
                    }
                }
                '^' if enable => {
                    options = ParseOptions {
                        global: options.global,
                        ..ParseOptions::default()
                    };
                }
                '-' if enable => enable = false,
                ')' => {
                    if let Some(top) = self.options.last_mut() {
                        *top = options;
                    }
                    return None;
                }
                ':' => return Some(self.group(open, SubexpressionKind::NonCapturing, Some(options))),
                _ => {
                    self.report(pos, DiagnosticKind::UnknownGroupSyntax);
                    return Some(self.abandon_group());
                }
            }
        }
    }

    /// Everything after `(?(`.
    fn parse_conditional(&mut self, open: usize) -> Node {
        let condition = self.parse_condition();
        let nodes = self.group_body(open, self.options(), false);
        let Some(condition) = condition else {
            return Node::Error;
        };
        let branches = match <[Node; 1]>::try_from(nodes) {
            Ok([Node::Alternative(branches)]) => branches,
            Ok([node]) => vec![Subexpression::new(vec![node], SubexpressionKind::NonCapturing)],
            Err(nodes) => vec![Subexpression::new(nodes, SubexpressionKind::NonCapturing)],
        };
        let define = matches!(condition, Condition::Define);
        if define && branches.len() > 1 {
            self.report(open, DiagnosticKind::DefineWithAlternatives);
            return Node::Error;
        }
        if branches.len() > 2 {
            self.report(open, DiagnosticKind::TooManyConditionalBranches);
            return Node::Error;
        }
        let mut branches = branches.into_iter();
        let if_true = branches
            .next()
            .unwrap_or_else(|| Subexpression::new(Vec::new(), SubexpressionKind::NonCapturing));
        Node::Conditional(Conditional {
            condition,
            if_true,
            if_false: branches.next(),
        })
    }

    /// The condition of a conditional group, including its closing `)`.
    fn parse_condition(&mut self) -> Option<Condition> {
        let pos = self.position();
        if self.peek() == Some('?') {
            let assertion_open = pos.saturating_sub(1);
            self.advance();
            let (backward, negative) = if self.eat('=') {
                (false, false)
            } else if self.eat('!') {
                (false, true)
            } else if self.eat_str("<=") {
                (true, false)
            } else if self.eat_str("<!") {
                (true, true)
            } else {
                self.report(pos, DiagnosticKind::MalformedCondition);
                self.recover();
                return None;
            };
            let assertion = self.assertion_body(assertion_open, backward, negative, false);
            return Some(Condition::Assertion(Box::new(assertion)));
        }

        let condition = if starts_group_number(self.peek().unwrap_or(')'), self.peek_nth(1)) {
            self.parse_group_number()
                .filter(|_| self.eat(')'))
                .map(|index| {
                    self.references.push(Reference::Numbered {
                        index,
                        position: pos,
                    });
                    Condition::NumberedCapture(index)
                })
        } else if self.eat('<') {
            self.parse_name('>')
                .filter(|_| self.eat(')'))
                .map(|name| self.named_condition(name, pos))
        } else if self.eat('\'') {
            self.parse_name('\'')
                .filter(|_| self.eat(')'))
                .map(|name| self.named_condition(name, pos))
        } else if self.eat_str("R&") {
            self.parse_name(')').map(|name| {
                self.named_reference(&name, pos);
                Condition::Recursion(RecursionTarget::Named(name))
            })
        } else if self.eat_str("R)") {
            Some(Condition::Recursion(RecursionTarget::Any))
        } else if self.peek() == Some('R') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            self.parse_decimal().filter(|_| self.eat(')')).map(|index| {
                self.references.push(Reference::Numbered {
                    index,
                    position: pos,
                });
                Condition::Recursion(RecursionTarget::Numbered(index))
            })
        } else if self.eat_str("DEFINE)") {
            Some(Condition::Define)
        } else {
            self.parse_name(')').map(|name| self.named_condition(name, pos))
        };

        if condition.is_none() {
            self.report(pos, DiagnosticKind::MalformedCondition);
            self.recover();
        }
        condition
    }

    fn named_condition(&mut self, name: String, position: usize) -> Condition {
        self.named_reference(&name, position);
        Condition::NamedCapture(name)
    }

    fn named_reference(&mut self, name: &str, position: usize) {
        self.references.push(Reference::Named {
            name: name.to_string(),
            position,
        });
    }

    /// Read a group name followed by `terminator`, consuming both.
    fn parse_name(&mut self, terminator: char) -> Option<String> {
        let pos = self.position();
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) || !self.eat(terminator) {
            self.report(pos, DiagnosticKind::MissingGroupName);
            return None;
        }
        Some(name)
    }

    /// An absolute group number or one relative to the groups opened so far.
    fn parse_group_number(&mut self) -> Option<usize> {
        let pos = self.position();
        let sign = if self.eat('+') {
            1
        } else if self.eat('-') {
            -1
        } else {
            0
        };
        let n = self.parse_decimal()?;
        match sign {
            0 => Some(n),
            1 if n > 0 => Some(self.group_count + n),
            -1 if n > 0 && n <= self.group_count => Some(self.group_count + 1 - n),
            _ => {
                self.report(pos, DiagnosticKind::UnresolvedNumberedReference(n));
                None
            }
        }
    }

    fn check_references(&mut self) {
        for reference in std::mem::take(&mut self.references) {
            match reference {
                Reference::Numbered { index, position } if index > self.group_count => {
                    self.report(position, DiagnosticKind::UnresolvedNumberedReference(index));
                }
                Reference::Named { name, position } if !self.names.contains_key(&name) => {
                    self.report(position, DiagnosticKind::UnresolvedNamedReference(name));
                }
                _ => {}
            }
        }
    }

    /// Parse an escape sequence outside a class.
    fn parse_escape(&mut self, current: &mut Vec<Node>) {
        let pos = self.position();
        let case_insensitive = self.options().case_insensitive;
        self.advance(); // consume '\\'
        let Some(e) = self.advance() else {
            self.report(pos, DiagnosticKind::TrailingBackslash);
            current.push(Node::Error);
            return;
        };
        if let Some((class, negate)) = shorthand(e) {
            current.push(Node::CharacterClass(CharacterClass::new(
                unicode::class_ranges(class).clone(),
                negate,
                false,
            )));
            return;
        }
        let node = match e {
            'p' | 'P' => match self.parse_property(e == 'P', pos) {
                Some(mut class) => {
                    class.case_insensitive = case_insensitive;
                    Node::CharacterClass(class)
                }
                None => Node::Error,
            },
            'N' => Node::CharacterClass(dot_class(false)),
            'R' => newline_sequence(),
            'b' | 'B' => Node::ClassBoundary {
                class: word_class(),
                boundary: e == 'b',
            },
            'A' => Node::SimpleAssertion(SimpleAssertion::SubjectStart),
            'z' => Node::SimpleAssertion(SimpleAssertion::SubjectEnd),
            'Z' => Node::SimpleAssertion(SimpleAssertion::SubjectEndOrFinalNewline),
            'G' => Node::SimpleAssertion(SimpleAssertion::SearchStart),
            'K' => Node::MatchStartOverride,
            'Q' => {
                while !self.looking_at("\\E") {
                    match self.advance() {
                        Some(c) => push_literal(current, c, case_insensitive),
                        None => return,
                    }
                }
                self.eat_str("\\E");
                return;
            }
            'E' => return,
            'k' => {
                let terminator = match self.advance() {
                    Some('<') => '>',
                    Some('\'') => '\'',
                    Some('{') => '}',
                    _ => {
                        self.report(pos, DiagnosticKind::MalformedEscape('k'));
                        current.push(Node::Error);
                        return;
                    }
                };
                match self.parse_name(terminator) {
                    Some(name) => {
                        self.named_reference(&name, pos);
                        Node::NamedBackreference {
                            name,
                            case_insensitive,
                        }
                    }
                    None => Node::Error,
                }
            }
            'g' => self.parse_g_escape(pos, case_insensitive),
            '1'..='9' => {
                let mut index = e.to_digit(10).unwrap_or(0) as usize;
                while let Some(d) = self.peek().and_then(|c| c.to_digit(10)) {
                    self.advance();
                    index = index.saturating_mul(10).saturating_add(d as usize);
                }
                self.numbered_backreference(index, pos, case_insensitive)
            }
            _ => match self.escaped_codepoint(e, pos) {
                Some(c) => {
                    push_literal(current, c, case_insensitive);
                    return;
                }
                None => Node::Error,
            },
        };
        current.push(node);
    }

    fn numbered_backreference(&mut self, index: usize, position: usize, case_insensitive: bool) -> Node {
        if index == 0 {
            self.report(position, DiagnosticKind::UnresolvedNumberedReference(0));
            return Node::Error;
        }
        self.references.push(Reference::Numbered { index, position });
        Node::NumberedBackreference {
            index,
            case_insensitive,
        }
    }

    /// `\g{n}`, `\gn`, `\g{-n}`, `\g{name}` backreferences and `\g<..>`,
    /// `\g'..'` subroutine calls.
    fn parse_g_escape(&mut self, pos: usize, case_insensitive: bool) -> Node {
        match self.peek() {
            Some(open @ ('<' | '\'')) => {
                self.advance();
                let terminator = if open == '<' { '>' } else { '\'' };
                if starts_group_number(self.peek().unwrap_or(terminator), self.peek_nth(1)) {
                    match self.parse_group_number() {
                        Some(index) if self.eat(terminator) => {
                            self.references.push(Reference::Numbered {
                                index,
                                position: pos,
                            });
                            Node::NumberedSubroutine(index)
                        }
                        _ => {
                            self.report(pos, DiagnosticKind::MalformedEscape('g'));
                            Node::Error
                        }
                    }
                } else {
                    self.named_subroutine(pos, terminator)
                }
            }
            Some('{') => {
                self.advance();
                if starts_group_number(self.peek().unwrap_or('}'), self.peek_nth(1)) {
                    match self.parse_group_number() {
                        Some(index) if self.eat('}') => {
                            self.numbered_backreference(index, pos, case_insensitive)
                        }
                        _ => {
                            self.report(pos, DiagnosticKind::MalformedEscape('g'));
                            Node::Error
                        }
                    }
                } else {
                    match self.parse_name('}') {
                        Some(name) => {
                            self.named_reference(&name, pos);
                            Node::NamedBackreference {
                                name,
                                case_insensitive,
                            }
                        }
                        None => Node::Error,
                    }
                }
            }
            _ => match self.parse_group_number() {
                Some(index) => self.numbered_backreference(index, pos, case_insensitive),
                None => {
                    self.report(pos, DiagnosticKind::MalformedEscape('g'));
                    Node::Error
                }
            },
        }
    }

    /// Escapes that denote a single codepoint. `e` has been consumed.
    fn escaped_codepoint(&mut self, e: char, pos: usize) -> Option<char> {
        let c = match e {
            'a' => '\u{7}',
            'e' => '\u{1B}',
            'f' => '\u{C}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            '0' => {
                let value = self.parse_radix(8, 2);
                return self.codepoint(value, pos);
            }
            'o' | 'x' if self.peek() == Some('{') => {
                self.advance();
                let radix = if e == 'o' { 8 } else { 16 };
                let digits_start = self.position();
                let value = self.parse_radix(radix, 8);
                if self.position() == digits_start || !self.eat('}') {
                    self.report(pos, DiagnosticKind::MalformedEscape(e));
                    return None;
                }
                return self.codepoint(value, pos);
            }
            'x' => {
                let value = self.parse_radix(16, 2);
                return self.codepoint(value, pos);
            }
            'c' => match self.advance() {
                Some(x) if x.is_ascii() => char::from(x.to_ascii_uppercase() as u8 ^ 0x40),
                _ => {
                    self.report(pos, DiagnosticKind::MalformedEscape('c'));
                    return None;
                }
            },
            c if c.is_ascii_alphanumeric() => {
                self.report(pos, DiagnosticKind::UnknownEscape(c));
                return None;
            }
            c => c,
        };
        Some(c)
    }

    fn parse_radix(&mut self, radix: u32, max_digits: usize) -> u32 {
        let mut value = 0u32;
        for _ in 0..max_digits {
            match self.peek().and_then(|c| c.to_digit(radix)) {
                Some(d) => {
                    self.advance();
                    value = value.saturating_mul(radix).saturating_add(d);
                }
                None => break,
            }
        }
        value
    }

    fn codepoint(&mut self, value: u32, pos: usize) -> Option<char> {
        let c = char::from_u32(value);
        if c.is_none() {
            self.report(pos, DiagnosticKind::InvalidCodepoint(value));
        }
        c
    }

    /// `\p{Name}`, `\pL`, `\P{..}`, `\p{^..}`. The `p`/`P` has been consumed.
    fn parse_property(&mut self, negate: bool, pos: usize) -> Option<CharacterClass> {
        let escape = if negate { 'P' } else { 'p' };
        let name = if self.eat('{') {
            let mut name = String::new();
            loop {
                match self.advance() {
                    Some('}') => break,
                    Some(c) => name.push(c),
                    None => {
                        self.report(pos, DiagnosticKind::MalformedEscape(escape));
                        return None;
                    }
                }
            }
            name
        } else {
            match self.advance() {
                Some(c) => c.to_string(),
                None => {
                    self.report(pos, DiagnosticKind::MalformedEscape(escape));
                    return None;
                }
            }
        };
        let (negate, name) = match name.strip_prefix('^') {
            Some(rest) => (!negate, rest),
            None => (negate, name.as_str()),
        };
        match unicode::property_class(name) {
            Some(class) => Some(CharacterClass::new(
                unicode::class_ranges(class).clone(),
                negate,
                false,
            )),
            None => {
                self.report(pos, DiagnosticKind::UnknownProperty(name.to_string()));
                None
            }
        }
    }

    /// Parse a character class: `[abc]`, `[a-z]`, `[^\d[:punct:]]`.
    fn parse_class(&mut self) -> Node {
        let open = self.position();
        let options = self.options();
        self.advance(); // consume '['
        let negate = self.eat('^');
        let mut ranges = CodepointRangeList::new();
        // Allow ']' as first character in class
        let mut first = true;
        loop {
            if options.extended_more {
                while matches!(self.peek(), Some(' ' | '\t')) {
                    self.advance();
                }
            }
            let Some(c) = self.peek() else {
                self.report(open, DiagnosticKind::UnclosedClass);
                return Node::Error;
            };
            if c == ']' && !first {
                self.advance();
                break;
            }
            first = false;
            if c == '[' && self.peek_nth(1) == Some(':') {
                if let Some(set) = self.parse_posix_class() {
                    ranges.extend(&set);
                    continue;
                }
            }
            let item_pos = self.position();
            match self.class_atom() {
                ClassAtom::Set(set) => ranges.extend(&set),
                ClassAtom::Char(lo) => {
                    // Check for range like a-z
                    if self.peek() == Some('-') && !matches!(self.peek_nth(1), Some(']') | None) {
                        self.advance(); // consume '-'
                        match self.class_atom() {
                            ClassAtom::Char(hi) if hi >= lo => ranges.push_range(lo as u32, hi as u32),
                            ClassAtom::Char(hi) => {
                                self.report(item_pos, DiagnosticKind::RangeOutOfOrder { first: lo, last: hi });
                            }
                            ClassAtom::Set(set) => {
                                ranges.push(lo);
                                ranges.push('-');
                                ranges.extend(&set);
                            }
                            ClassAtom::Skip => {
                                ranges.push(lo);
                                ranges.push('-');
                            }
                        }
                    } else {
                        ranges.push(lo);
                    }
                }
                ClassAtom::Skip => {}
            }
        }
        ranges.sort_and_compact();
        Node::CharacterClass(CharacterClass::new(ranges, negate, options.case_insensitive))
    }

    /// `[:name:]` or `[:^name:]`. Returns `None`, consuming nothing, when the
    /// text is not POSIX class syntax.
    fn parse_posix_class(&mut self) -> Option<CodepointRangeList> {
        let start = self.stream;
        let pos = self.position();
        self.advance();
        self.advance(); // consume "[:"
        let negate = self.eat('^');
        let mut name = String::new();
        while let Some(c) = self.peek().filter(char::is_ascii_alphabetic) {
            name.push(c);
            self.advance();
        }
        if !self.eat_str(":]") {
            self.stream = start;
            return None;
        }
        match unicode::posix_class(&name) {
            Some(set) if negate => Some(set.complement()),
            Some(set) => Some(set),
            None => {
                self.report(pos, DiagnosticKind::UnknownPosixClass(name));
                Some(CodepointRangeList::new())
            }
        }
    }

    fn class_atom(&mut self) -> ClassAtom {
        let pos = self.position();
        let Some(c) = self.advance() else {
            return ClassAtom::Skip;
        };
        if c != '\\' {
            return ClassAtom::Char(c);
        }
        let Some(e) = self.advance() else {
            self.report(pos, DiagnosticKind::TrailingBackslash);
            return ClassAtom::Skip;
        };
        if let Some((class, negate)) = shorthand(e) {
            let set = unicode::class_ranges(class);
            return ClassAtom::Set(if negate { set.complement() } else { set.clone() });
        }
        match e {
            'p' | 'P' => match self.parse_property(e == 'P', pos) {
                Some(class) => ClassAtom::Set(class.get_effective_ranges()),
                None => ClassAtom::Skip,
            },
            'b' => ClassAtom::Char('\u{8}'),
            'Q' => {
                let mut quoted = Vec::new();
                while !self.looking_at("\\E") {
                    match self.advance() {
                        Some(c) => quoted.push(c),
                        None => break,
                    }
                }
                self.eat_str("\\E");
                ClassAtom::Set(CodepointRangeList::from_chars(&quoted))
            }
            'E' => ClassAtom::Skip,
            _ => match self.escaped_codepoint(e, pos) {
                Some(c) => ClassAtom::Char(c),
                None => ClassAtom::Skip,
            },
        }
    }
}

fn push_literal(current: &mut Vec<Node>, c: char, case_insensitive: bool) {
    if let Some(Node::Literal {
        text,
        case_insensitive: ci,
    }) = current.last_mut()
    {
        if *ci == case_insensitive {
            text.push(c);
            return;
        }
    }
    current.push(Node::literal(c, case_insensitive));
}

fn shorthand(c: char) -> Option<(UnicodeClass, bool)> {
    let class = match c {
        'd' | 'D' => UnicodeClass::Digit,
        'w' | 'W' => UnicodeClass::Word,
        's' | 'S' => UnicodeClass::Space,
        'h' | 'H' => UnicodeClass::HorizontalSpace,
        'v' | 'V' => UnicodeClass::VerticalSpace,
        _ => return None,
    };
    Some((class, c.is_ascii_uppercase()))
}

fn starts_group_number(c: char, next: Option<char>) -> bool {
    c.is_ascii_digit() || (matches!(c, '+' | '-') && next.is_some_and(|d| d.is_ascii_digit()))
}

fn is_option_char(c: char) -> bool {
    matches!(c, 'i' | 'm' | 'n' | 's' | 'x' | '-' | '^' | ')')
}

fn is_pattern_whitespace(c: char) -> bool {
    matches!(
        c,
        '\t'..='\r' | ' ' | '\u{85}' | '\u{200E}' | '\u{200F}' | '\u{2028}' | '\u{2029}'
    )
}

fn dot_class(dot_all: bool) -> CharacterClass {
    if dot_all {
        CharacterClass::any()
    } else {
        CharacterClass::new(CodepointRangeList::from_chars(&['\n', '\r']), true, false)
    }
}

fn word_class() -> CharacterClass {
    CharacterClass::new(unicode::class_ranges(UnicodeClass::Word).clone(), false, false)
}

/// `\R`: `(?>\r\n|\v)`
fn newline_sequence() -> Node {
    let crlf = Subexpression::new(
        vec![Node::Literal {
            text: vec!['\r', '\n'],
            case_insensitive: false,
        }],
        SubexpressionKind::NonCapturing,
    );
    let single = Subexpression::new(
        vec![Node::CharacterClass(CharacterClass::new(
            unicode::class_ranges(UnicodeClass::VerticalSpace).clone(),
            false,
            false,
        ))],
        SubexpressionKind::NonCapturing,
    );
    Node::Subexpression(Subexpression::new(
        vec![Node::Alternative(vec![crlf, single])],
        SubexpressionKind::Atomic,
    ))
}
