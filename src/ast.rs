/// AST types for the regex engine.

pub use crate::ranges::CharacterClass;

/// A single node in the regex AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Marks a construct that failed to parse. A diagnostic was reported for it.
    Error,
    /// A verb or start-of-pattern option such as `(*FAIL)` or `(*UTF)`.
    Feature(Feature),
    /// `\K`: the reported match starts here.
    MatchStartOverride,
    /// One or more literal codepoints.
    Literal {
        text: Vec<char>,
        case_insensitive: bool,
    },
    /// `\1`, `\g{2}`, ...
    NumberedBackreference {
        index: usize,
        case_insensitive: bool,
    },
    /// `\k<name>`, `(?P=name)`, ...
    NamedBackreference {
        name: String,
        case_insensitive: bool,
    },
    /// `(?1)`, `(?R)` (index 0), ...
    NumberedSubroutine(usize),
    /// `(?&name)`, `(?P>name)`, `\g<name>`
    NamedSubroutine(String),
    /// `[...]`, `.`, `\d`, `\p{..}` and friends.
    CharacterClass(CharacterClass),
    /// Any parenthesized group, and the pattern root (capture 0).
    Subexpression(Subexpression),
    /// `a|b|c`. Each branch is a non-capturing subexpression.
    Alternative(Vec<Subexpression>),
    Repetition(Repetition),
    SimpleAssertion(SimpleAssertion),
    /// `\b` / `\B`: membership in `class` differs (or not) on either side.
    ClassBoundary {
        class: CharacterClass,
        boundary: bool,
    },
    /// Lookahead and lookbehind.
    ComplexAssertion(ComplexAssertion),
    Conditional(Conditional),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Fail,
    Utf,
    Ucp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubexpressionKind {
    /// Plain grouping. Captures when `capture_index` is set.
    Normal,
    NonCapturing,
    /// `(?|...)`: every branch restarts capture numbering.
    Duplicate,
    /// `(?>...)`
    Atomic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subexpression {
    pub nodes: Vec<Node>,
    pub capture_name: Option<String>,
    pub capture_index: Option<usize>,
    pub kind: SubexpressionKind,
}

impl Subexpression {
    pub fn new(nodes: Vec<Node>, kind: SubexpressionKind) -> Self {
        Subexpression {
            nodes,
            capture_name: None,
            capture_index: None,
            kind,
        }
    }

    pub fn capture(nodes: Vec<Node>, index: usize, name: Option<String>) -> Self {
        Subexpression {
            nodes,
            capture_name: name,
            capture_index: Some(index),
            kind: SubexpressionKind::Normal,
        }
    }

    /// Call `f` on this group and every group nested inside it, in pattern order.
    pub fn for_each_group<'a>(&'a self, f: &mut impl FnMut(&'a Subexpression)) {
        f(self);
        for node in &self.nodes {
            node.for_each_group(f);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepetitionKind {
    Greedy,
    Lazy,
    Possessive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Repetition {
    pub body: Box<Node>,
    pub min: usize,
    /// `None` means no upper limit.
    pub max: Option<usize>,
    pub kind: RepetitionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleAssertion {
    /// `\A`, or `^` outside multiline mode.
    SubjectStart,
    /// `\z`
    SubjectEnd,
    /// `\Z`, or `$` outside multiline mode.
    SubjectEndOrFinalNewline,
    /// `^` in multiline mode.
    LineStart,
    /// `$` in multiline mode.
    LineEnd,
    /// `\G`: where the current search started.
    SearchStart,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComplexAssertion {
    pub body: Subexpression,
    /// Lookbehind.
    pub backward: bool,
    pub negative: bool,
    /// `(?*...)`: the body may be backtracked into after the assertion succeeds.
    pub non_atomic: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `(?(DEFINE)...)`
    Define,
    NumberedCapture(usize),
    NamedCapture(String),
    /// `(?(R))`, `(?(R2))`, `(?(R&name))`
    Recursion(RecursionTarget),
    Assertion(Box<ComplexAssertion>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecursionTarget {
    Any,
    Numbered(usize),
    Named(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub condition: Condition,
    pub if_true: Subexpression,
    pub if_false: Option<Subexpression>,
}

impl Node {
    pub fn literal(c: char, case_insensitive: bool) -> Node {
        Node::Literal {
            text: vec![c],
            case_insensitive,
        }
    }

    /// Whether a quantifier may follow this node.
    pub fn is_repeatable(&self) -> bool {
        !matches!(
            self,
            Node::Feature(_)
                | Node::MatchStartOverride
                | Node::SimpleAssertion(_)
                | Node::ClassBoundary { .. }
                | Node::Repetition(_)
        )
    }

    /// Call `f` on every group nested inside this node, in pattern order.
    pub fn for_each_group<'a>(&'a self, f: &mut impl FnMut(&'a Subexpression)) {
        match self {
            Node::Subexpression(sub) => sub.for_each_group(f),
            Node::Alternative(branches) => {
                for branch in branches {
                    branch.for_each_group(f);
                }
            }
            Node::Repetition(rep) => rep.body.for_each_group(f),
            Node::ComplexAssertion(assertion) => assertion.body.for_each_group(f),
            Node::Conditional(cond) => {
                if let Condition::Assertion(assertion) = &cond.condition {
                    assertion.body.for_each_group(f);
                }
                cond.if_true.for_each_group(f);
                if let Some(if_false) = &cond.if_false {
                    if_false.for_each_group(f);
                }
            }
            _ => {}
        }
    }
}
