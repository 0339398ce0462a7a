/// Compiler: converts the AST into a flat state machine for the matcher.
///
/// Every state owns a contiguous run of transitions, tried in order. The order
/// is what encodes alternation priority and greedy versus lazy repetition.

use std::ops::Range;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::analysis::LengthAnalysis;
use crate::ast::{self, *};
use crate::error::{Diagnostic, DiagnosticKind};

pub type StateId = usize;

/// What must hold for a transition to be taken, and its side effect.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Always succeeds, consumes nothing.
    Always,
    /// Never succeeds.
    Fail,
    Literal {
        text: Vec<char>,
        case_insensitive: bool,
    },
    Class(CharacterClass),
    Assertion(SimpleAssertion),
    ClassBoundary {
        class: CharacterClass,
        boundary: bool,
    },
    CaptureBegin(usize),
    CaptureEnd(usize),
    NumberedBackreference {
        index: usize,
        case_insensitive: bool,
    },
    /// Matches the first set group among `indices`.
    NamedBackreference {
        indices: Vec<usize>,
        case_insensitive: bool,
    },
    /// Enter `group` at `entry`; the call returns when `exit` is reached and
    /// continues at the transition's target.
    Call {
        group: usize,
        entry: StateId,
        exit: StateId,
    },
    /// `\K`
    ResetMatchStart,
    PushAtomic,
    /// Commit: drop every backtrack frame pushed since the matching `PushAtomic`.
    PopAtomic,
    PushCheckpoint,
    RestoreCheckpoint,
    PushPosition,
    /// Succeeds only if input was consumed since the matching `PushPosition`.
    CheckInfiniteLoop,
    /// Step the cursor back this many codepoints.
    Rewind(usize),
    CaptureSet(usize),
    NamedCaptureSet(Vec<usize>),
    /// Inside a call to the given group, or to any group when `None`.
    InRecursion(Option<usize>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub condition: Condition,
    pub target: StateId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    /// Indices into `StateMachine::transitions`.
    pub transitions: Range<usize>,
}

/// Capture names in both directions. A name maps to several indices when
/// groups share it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedCaptureRegistry {
    by_name: FxHashMap<String, Vec<usize>>,
    by_index: FxHashMap<usize, String>,
}

impl NamedCaptureRegistry {
    fn insert(&mut self, name: &str, index: usize) {
        let indices = self.by_name.entry(name.to_string()).or_default();
        if let Err(at) = indices.binary_search(&index) {
            indices.insert(at, index);
        }
        self.by_index.entry(index).or_insert_with(|| name.to_string());
    }

    /// Sorted indices of the groups called `name`. Empty if there are none.
    pub fn indices(&self, name: &str) -> &[usize] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.by_index.get(&index).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// All names with their indices, ordered by name.
    pub fn names(&self) -> Vec<(&str, &[usize])> {
        let mut names: Vec<_> = self
            .by_name
            .iter()
            .map(|(name, indices)| (name.as_str(), indices.as_slice()))
            .collect();
        names.sort_unstable();
        names
    }
}

/// Compiled pattern. Immutable once built and safe to share between threads.
#[derive(Debug, Clone)]
pub struct StateMachine {
    pub states: Vec<State>,
    pub transitions: Vec<Transition>,
    pub start: StateId,
    pub end: StateId,
    /// Number of capture slots, group 0 included.
    pub capture_count: usize,
    pub named_captures: Arc<NamedCaptureRegistry>,
    /// Problems found while compiling. A machine carrying any is not run.
    pub diagnostics: Vec<Diagnostic>,
    /// The pattern can only match where the search starts.
    pub anchored: bool,
    /// If the pattern must start with a specific literal character, store it here.
    /// Used by the matcher to skip starting positions that can't possibly match.
    pub first_char: Option<char>,
}

impl StateMachine {
    pub fn transitions_of(&self, state: StateId) -> &[Transition] {
        match self.states.get(state) {
            Some(s) => &self.transitions[s.transitions.clone()],
            None => &[],
        }
    }

    pub fn is_executable(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Compile an AST into a state machine.
pub fn compile(ast: &Node, analysis: &LengthAnalysis) -> StateMachine {
    let mut builder = Builder::new(analysis);
    builder.collect_groups(ast);
    let start = builder.new_state();
    let end = builder.node(ast, start);
    builder.resolve_calls();
    let (anchored, first_char) = prefix_hints(ast);
    let machine = builder.finish(start, end, anchored, first_char);
    log::debug!(
        "compiled pattern: {} states, {} transitions, {} capture slots, {} diagnostics",
        machine.states.len(),
        machine.transitions.len(),
        machine.capture_count,
        machine.diagnostics.len()
    );
    machine
}

/// Where the pattern must start: anchored to the search start, or at a known literal.
fn prefix_hints(ast: &Node) -> (bool, Option<char>) {
    let nodes = match ast {
        Node::Subexpression(root) => root.nodes.as_slice(),
        other => std::slice::from_ref(other),
    };
    match nodes.first() {
        Some(Node::SimpleAssertion(SimpleAssertion::SubjectStart | SimpleAssertion::SearchStart)) => {
            (true, None)
        }
        Some(Node::Literal {
            text,
            case_insensitive: false,
        }) => (false, text.first().copied()),
        _ => (false, None),
    }
}

enum CallTarget {
    Numbered(usize),
    Named(String),
}

impl CallTarget {
    fn describe(&self) -> String {
        match self {
            CallTarget::Numbered(index) => index.to_string(),
            CallTarget::Named(name) => name.clone(),
        }
    }
}

/// A `Call` transition whose entry and exit are filled in once every group
/// has been compiled.
struct PendingCall {
    state: StateId,
    transition: usize,
    target: CallTarget,
}

/// Builds states one node at a time. `node(n, from)` attaches `n` to `from`,
/// which has no outgoing transitions yet, and returns the state where the
/// rest of the pattern continues, which has none either.
struct Builder<'a> {
    states: Vec<Vec<Transition>>,
    analysis: &'a LengthAnalysis,
    registry: NamedCaptureRegistry,
    capture_count: usize,
    /// First-seen entry and exit state of each capture group.
    groups: FxHashMap<usize, (StateId, StateId)>,
    pending_calls: Vec<PendingCall>,
    fail_state: Option<StateId>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Builder<'a> {
    fn new(analysis: &'a LengthAnalysis) -> Self {
        Builder {
            states: Vec::new(),
            analysis,
            registry: NamedCaptureRegistry::default(),
            capture_count: 0,
            groups: FxHashMap::default(),
            pending_calls: Vec::new(),
            fail_state: None,
            diagnostics: Vec::new(),
        }
    }

    /// Names are needed before compiling, since references may precede their group.
    fn collect_groups(&mut self, ast: &Node) {
        ast.for_each_group(&mut |group| {
            if let Some(index) = group.capture_index {
                self.capture_count = self.capture_count.max(index + 1);
                if let Some(name) = &group.capture_name {
                    self.registry.insert(name, index);
                }
            }
        });
    }

    fn new_state(&mut self) -> StateId {
        self.states.push(Vec::new());
        self.states.len() - 1
    }

    fn link(&mut self, from: StateId, condition: Condition, target: StateId) {
        self.states[from].push(Transition { condition, target });
    }

    /// Add a transition from `from` to a fresh state and return that state.
    fn edge(&mut self, from: StateId, condition: Condition) -> StateId {
        let target = self.new_state();
        self.link(from, condition, target);
        target
    }

    /// Shared dead end with no transitions; created on first use.
    fn fail_state(&mut self) -> StateId {
        match self.fail_state {
            Some(state) => state,
            None => {
                let state = self.new_state();
                self.fail_state = Some(state);
                state
            }
        }
    }

    fn fail(&mut self, from: StateId) -> StateId {
        let fail = self.fail_state();
        self.link(from, Condition::Fail, fail);
        self.new_state()
    }

    fn report(&mut self, kind: DiagnosticKind) {
        self.diagnostics.push(Diagnostic::unlocated(kind));
    }

    fn node(&mut self, node: &Node, from: StateId) -> StateId {
        match node {
            Node::Error | Node::Feature(Feature::Fail) => self.fail(from),
            Node::Feature(Feature::Utf | Feature::Ucp) => from,
            Node::MatchStartOverride => self.edge(from, Condition::ResetMatchStart),
            Node::Literal {
                text,
                case_insensitive,
            } => self.edge(
                from,
                Condition::Literal {
                    text: text.clone(),
                    case_insensitive: *case_insensitive,
                },
            ),
            Node::NumberedBackreference {
                index,
                case_insensitive,
            } => self.edge(
                from,
                Condition::NumberedBackreference {
                    index: *index,
                    case_insensitive: *case_insensitive,
                },
            ),
            Node::NamedBackreference {
                name,
                case_insensitive,
            } => {
                let indices = self.registry.indices(name).to_vec();
                if indices.is_empty() {
                    self.report(DiagnosticKind::UnresolvedNamedReference(name.clone()));
                    return self.fail(from);
                }
                self.edge(
                    from,
                    Condition::NamedBackreference {
                        indices,
                        case_insensitive: *case_insensitive,
                    },
                )
            }
            Node::NumberedSubroutine(index) => self.call(from, CallTarget::Numbered(*index)),
            Node::NamedSubroutine(name) => self.call(from, CallTarget::Named(name.clone())),
            Node::CharacterClass(class) => self.edge(from, Condition::Class(class.clone())),
            Node::Subexpression(sub) => self.subexpression(sub, from),
            Node::Alternative(branches) => self.alternative(branches, from),
            Node::Repetition(rep) => self.repetition(rep, from),
            Node::SimpleAssertion(assertion) => self.edge(from, Condition::Assertion(*assertion)),
            Node::ClassBoundary { class, boundary } => self.edge(
                from,
                Condition::ClassBoundary {
                    class: class.clone(),
                    boundary: *boundary,
                },
            ),
            Node::ComplexAssertion(assertion) => self.lookaround(assertion, from),
            Node::Conditional(conditional) => self.conditional(conditional, from),
        }
    }

    fn sequence(&mut self, nodes: &[Node], from: StateId) -> StateId {
        nodes.iter().fold(from, |state, node| self.node(node, state))
    }

    fn subexpression(&mut self, sub: &Subexpression, from: StateId) -> StateId {
        if sub.kind == SubexpressionKind::Atomic {
            let inner = self.edge(from, Condition::PushAtomic);
            let end = self.sequence(&sub.nodes, inner);
            return self.edge(end, Condition::PopAtomic);
        }
        let Some(index) = sub.capture_index else {
            return self.sequence(&sub.nodes, from);
        };
        let inner = self.edge(from, Condition::CaptureBegin(index));
        let end = self.sequence(&sub.nodes, inner);
        let exit = self.edge(end, Condition::CaptureEnd(index));
        self.groups.entry(index).or_insert((from, exit));
        exit
    }

    fn alternative(&mut self, branches: &[Subexpression], from: StateId) -> StateId {
        let join = self.new_state();
        for branch in branches {
            let start = self.edge(from, Condition::Always);
            let end = self.subexpression(branch, start);
            self.link(end, Condition::Always, join);
        }
        join
    }

    fn repetition(&mut self, rep: &Repetition, from: StateId) -> StateId {
        match rep.kind {
            RepetitionKind::Possessive => {
                let inner = self.edge(from, Condition::PushAtomic);
                let end = self.repeat(rep, inner, true);
                self.edge(end, Condition::PopAtomic)
            }
            RepetitionKind::Greedy => self.repeat(rep, from, true),
            RepetitionKind::Lazy => self.repeat(rep, from, false),
        }
    }

    fn repeat(&mut self, rep: &Repetition, from: StateId, greedy: bool) -> StateId {
        if rep.max == Some(0) {
            // Never matched in place, but its groups stay callable.
            let detached = self.new_state();
            self.node(&rep.body, detached);
            return from;
        }
        let mut current = from;
        for _ in 0..rep.min {
            current = self.node(&rep.body, current);
        }
        match rep.max {
            Some(max) => {
                let optional = max.saturating_sub(rep.min);
                if optional == 0 {
                    return current;
                }
                // Each optional copy may bail out to the shared exit.
                let exit = self.new_state();
                for _ in 0..optional {
                    let body = self.new_state();
                    if greedy {
                        self.link(current, Condition::Always, body);
                        self.link(current, Condition::Always, exit);
                    } else {
                        self.link(current, Condition::Always, exit);
                        self.link(current, Condition::Always, body);
                    }
                    current = self.node(&rep.body, body);
                }
                self.link(current, Condition::Always, exit);
                exit
            }
            None => {
                let head = self.edge(current, Condition::Always);
                let body = self.new_state();
                let exit = self.new_state();
                if greedy {
                    self.link(head, Condition::PushPosition, body);
                    self.link(head, Condition::Always, exit);
                } else {
                    self.link(head, Condition::Always, exit);
                    self.link(head, Condition::PushPosition, body);
                }
                let end = self.node(&rep.body, body);
                self.link(end, Condition::CheckInfiniteLoop, head);
                exit
            }
        }
    }

    fn lookaround(&mut self, assertion: &ComplexAssertion, from: StateId) -> StateId {
        if assertion.negative {
            // A body match commits past the continuation, then dies.
            let inner = self.edge(from, Condition::PushAtomic);
            let cont = self.edge(from, Condition::Always);
            let end = self.assertion_body(assertion, inner);
            let fail = self.fail_state();
            self.link(end, Condition::PopAtomic, fail);
            return cont;
        }
        if assertion.non_atomic {
            return self.assertion_body(assertion, from);
        }
        let inner = self.edge(from, Condition::PushAtomic);
        let end = self.assertion_body(assertion, inner);
        self.edge(end, Condition::PopAtomic)
    }

    /// The assertion body between a cursor checkpoint and its restore.
    fn assertion_body(&mut self, assertion: &ComplexAssertion, from: StateId) -> StateId {
        let inner = self.edge(from, Condition::PushCheckpoint);
        let end = if assertion.backward {
            self.lookbehind(&assertion.body, inner)
        } else {
            self.subexpression(&assertion.body, inner)
        };
        self.edge(end, Condition::RestoreCheckpoint)
    }

    /// Each top-level branch rewinds by its own fixed width, then matches forward.
    fn lookbehind(&mut self, body: &Subexpression, from: StateId) -> StateId {
        let branches: Vec<&[Node]> = match body.nodes.as_slice() {
            [Node::Alternative(branches)] => branches.iter().map(|b| b.nodes.as_slice()).collect(),
            nodes => vec![nodes],
        };
        let widths: Option<Vec<usize>> = branches
            .iter()
            .map(|nodes| self.analysis.sequence_width(nodes).fixed())
            .collect();
        let Some(widths) = widths else {
            self.report(DiagnosticKind::VariableLengthLookbehind);
            return self.fail(from);
        };
        if let ([nodes], [width]) = (branches.as_slice(), widths.as_slice()) {
            let rewound = self.edge(from, Condition::Rewind(*width));
            return self.sequence(nodes, rewound);
        }
        let join = self.new_state();
        for (nodes, width) in branches.into_iter().zip(widths) {
            let rewound = self.edge(from, Condition::Rewind(width));
            let end = self.sequence(nodes, rewound);
            self.link(end, Condition::Always, join);
        }
        join
    }

    fn conditional(&mut self, conditional: &Conditional, from: StateId) -> StateId {
        let condition = match &conditional.condition {
            ast::Condition::Define => {
                // Only reachable through subroutine calls.
                let detached = self.new_state();
                self.subexpression(&conditional.if_true, detached);
                return self.edge(from, Condition::Always);
            }
            ast::Condition::Assertion(assertion) => {
                return self.assertion_conditional(assertion, conditional, from);
            }
            ast::Condition::NumberedCapture(index) => Condition::CaptureSet(*index),
            ast::Condition::NamedCapture(name) => match self.registry.indices(name) {
                [] => {
                    self.report(DiagnosticKind::UnresolvedCondition(name.clone()));
                    return self.fail(from);
                }
                indices => Condition::NamedCaptureSet(indices.to_vec()),
            },
            ast::Condition::Recursion(RecursionTarget::Any) => Condition::InRecursion(None),
            ast::Condition::Recursion(RecursionTarget::Numbered(index)) => {
                Condition::InRecursion(Some(*index))
            }
            ast::Condition::Recursion(RecursionTarget::Named(name)) => {
                match self.registry.indices(name).first() {
                    Some(index) => Condition::InRecursion(Some(*index)),
                    None => {
                        self.report(DiagnosticKind::UnresolvedCondition(name.clone()));
                        return self.fail(from);
                    }
                }
            }
        };
        let guard = self.edge(from, Condition::PushAtomic);
        let yes = self.edge(guard, condition);
        let no = self.edge(guard, Condition::Always);
        let yes = self.edge(yes, Condition::PopAtomic);
        let no = self.edge(no, Condition::PopAtomic);
        self.conditional_branches(conditional, yes, no)
    }

    fn assertion_conditional(
        &mut self,
        assertion: &ComplexAssertion,
        conditional: &Conditional,
        from: StateId,
    ) -> StateId {
        let guard = self.edge(from, Condition::PushAtomic);
        let probe = self.edge(guard, Condition::Always);
        let other = self.edge(guard, Condition::Always);
        let probe_end = self.assertion_body(assertion, probe);
        let matched = self.edge(probe_end, Condition::PopAtomic);
        let unmatched = self.edge(other, Condition::PopAtomic);
        if assertion.negative {
            self.conditional_branches(conditional, unmatched, matched)
        } else {
            self.conditional_branches(conditional, matched, unmatched)
        }
    }

    fn conditional_branches(&mut self, conditional: &Conditional, yes: StateId, no: StateId) -> StateId {
        let join = self.new_state();
        let yes_end = self.subexpression(&conditional.if_true, yes);
        self.link(yes_end, Condition::Always, join);
        let no_end = match &conditional.if_false {
            Some(branch) => self.subexpression(branch, no),
            None => no,
        };
        self.link(no_end, Condition::Always, join);
        join
    }

    /// Emit a call with a placeholder target, patched by `resolve_calls`.
    fn call(&mut self, from: StateId, target: CallTarget) -> StateId {
        let ret = self.new_state();
        let transition = self.states[from].len();
        self.link(
            from,
            Condition::Call {
                group: 0,
                entry: 0,
                exit: 0,
            },
            ret,
        );
        self.pending_calls.push(PendingCall {
            state: from,
            transition,
            target,
        });
        ret
    }

    fn resolve_calls(&mut self) {
        for call in std::mem::take(&mut self.pending_calls) {
            let group = match &call.target {
                CallTarget::Numbered(index) => Some(*index),
                CallTarget::Named(name) => self.registry.indices(name).first().copied(),
            };
            let resolved = group.and_then(|g| self.groups.get(&g).map(|&(entry, exit)| (g, entry, exit)));
            let condition = match resolved {
                Some((group, entry, exit)) => Condition::Call { group, entry, exit },
                None => {
                    self.report(DiagnosticKind::UnresolvedSubroutine(call.target.describe()));
                    Condition::Fail
                }
            };
            self.states[call.state][call.transition].condition = condition;
        }
    }

    fn finish(self, start: StateId, end: StateId, anchored: bool, first_char: Option<char>) -> StateMachine {
        let mut states = Vec::with_capacity(self.states.len());
        let mut transitions = Vec::new();
        for outgoing in self.states {
            let first = transitions.len();
            transitions.extend(outgoing);
            states.push(State {
                transitions: first..transitions.len(),
            });
        }
        StateMachine {
            states,
            transitions,
            start,
            end,
            capture_count: self.capture_count,
            named_captures: Arc::new(self.registry),
            diagnostics: self.diagnostics,
            anchored,
            first_char,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseOptions, parse};
    use crate::stream::CodepointStream;

    fn compile_pattern(pattern: &str) -> StateMachine {
        let (ast, diagnostics) = parse(CodepointStream::new(pattern), ParseOptions::default());
        assert!(diagnostics.is_empty(), "{pattern}: {diagnostics:?}");
        let analysis = LengthAnalysis::analyze(&ast);
        compile(&ast, &analysis)
    }

    fn conditions(machine: &StateMachine) -> Vec<&Condition> {
        machine.transitions.iter().map(|t| &t.condition).collect()
    }

    #[test]
    fn test_flattened_ranges_cover_all_transitions() {
        let m = compile_pattern("(a|b)*c");
        let mut next = 0;
        for state in &m.states {
            assert_eq!(state.transitions.start, next);
            next = state.transitions.end;
        }
        assert_eq!(next, m.transitions.len());
        assert!(m.transitions_of(m.end).is_empty());
        assert!(m.is_executable());
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let a = compile_pattern("(?<x>a+?)(?:b|c{2,3})\\k<x>(?1)");
        let b = compile_pattern("(?<x>a+?)(?:b|c{2,3})\\k<x>(?1)");
        assert_eq!(a.transitions, b.transitions);
        assert_eq!(a.states, b.states);
    }

    #[test]
    fn test_zero_repetition_groups_stay_callable() {
        let m = compile_pattern("(a){0}b(?1)");
        assert!(m.is_executable(), "{:?}", m.diagnostics);
        assert!(
            conditions(&m)
                .iter()
                .any(|c| matches!(c, Condition::Call { group: 1, .. }))
        );
        // The group body is detached: nothing reaches it from the start.
        let begin = m.transitions_of(m.start);
        let after = m.transitions_of(begin[0].target);
        assert_eq!(
            after[0].condition,
            Condition::Literal {
                text: vec!['b'],
                case_insensitive: false,
            }
        );
    }

    #[test]
    fn test_alternation_fans_out_in_order() {
        let m = compile_pattern("ab|cd|ef");
        let begin = m.transitions_of(m.start);
        assert_eq!(begin[0].condition, Condition::CaptureBegin(0));
        let fan = m.transitions_of(begin[0].target);
        assert_eq!(fan.len(), 3);
        let firsts: Vec<_> = fan
            .iter()
            .map(|t| m.transitions_of(t.target)[0].condition.clone())
            .collect();
        let lit = |s: &str| Condition::Literal {
            text: s.chars().collect(),
            case_insensitive: false,
        };
        assert_eq!(firsts, vec![lit("ab"), lit("cd"), lit("ef")]);
    }

    #[test]
    fn test_loop_order_encodes_greediness() {
        let loop_head = |m: &StateMachine| {
            m.states
                .iter()
                .enumerate()
                .map(|(i, _)| m.transitions_of(i))
                .find(|ts| ts.iter().any(|t| t.condition == Condition::PushPosition))
                .map(|ts| ts.iter().map(|t| t.condition.clone()).collect::<Vec<_>>())
        };
        assert_eq!(
            loop_head(&compile_pattern("a*")),
            Some(vec![Condition::PushPosition, Condition::Always])
        );
        assert_eq!(
            loop_head(&compile_pattern("a*?")),
            Some(vec![Condition::Always, Condition::PushPosition])
        );
        let possessive = compile_pattern("a*+");
        assert!(conditions(&possessive).contains(&&Condition::PushAtomic));
        assert!(conditions(&possessive).contains(&&Condition::CheckInfiniteLoop));
    }

    #[test]
    fn test_bounded_repetition_unrolls() {
        let m = compile_pattern("a{2,4}");
        let literals = conditions(&m)
            .into_iter()
            .filter(|c| matches!(c, Condition::Literal { .. }))
            .count();
        assert_eq!(literals, 4);
        assert!(!conditions(&m).contains(&&Condition::PushPosition));
    }

    #[test]
    fn test_registry_and_capture_count() {
        let m = compile_pattern("(a)(?<n>b)(?|(?<d>c)|(?<d>d))(?<n>e)");
        assert_eq!(m.capture_count, 5);
        assert_eq!(m.named_captures.indices("n"), &[2, 4]);
        assert_eq!(m.named_captures.indices("d"), &[3]);
        assert_eq!(m.named_captures.name(4), Some("n"));
        assert_eq!(m.named_captures.name(1), None);
        assert_eq!(m.named_captures.names().len(), 2);
    }

    #[test]
    fn test_subroutines_are_patched_including_forward_references() {
        let m = compile_pattern("(?1)(a)(?R)");
        let calls: Vec<_> = conditions(&m)
            .into_iter()
            .filter_map(|c| match c {
                Condition::Call { group, entry, exit } => Some((*group, *entry, *exit)),
                _ => None,
            })
            .collect();
        assert_eq!(calls.len(), 2);
        let (group, entry, exit) = calls[0];
        assert_eq!(group, 1);
        assert_eq!(m.transitions_of(entry)[0].condition, Condition::CaptureBegin(1));
        assert!(m.transitions.iter().any(|t| t.target == exit && t.condition == Condition::CaptureEnd(1)));
        assert_eq!(calls[1], (0, m.start, m.end));
    }

    #[test]
    fn test_lookbehind_rewinds_per_branch() {
        let m = compile_pattern("(?<=ab|c)d");
        let rewinds: Vec<_> = conditions(&m)
            .into_iter()
            .filter_map(|c| match c {
                Condition::Rewind(n) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(rewinds, vec![2, 1]);
        assert!(m.is_executable());
    }

    #[test]
    fn test_variable_length_lookbehind_is_diagnosed() {
        let (ast, _) = parse(CodepointStream::new("(?<=a+)b"), ParseOptions::default());
        let m = compile(&ast, &LengthAnalysis::analyze(&ast));
        assert_eq!(m.diagnostics[0].kind, DiagnosticKind::VariableLengthLookbehind);
        assert!(!m.is_executable());
    }

    #[test]
    fn test_unresolved_references_degrade_to_fail() {
        let ast = Node::Subexpression(Subexpression::capture(
            vec![
                Node::NumberedSubroutine(5),
                Node::Conditional(Conditional {
                    condition: ast::Condition::NamedCapture("nope".into()),
                    if_true: Subexpression::new(vec![], SubexpressionKind::NonCapturing),
                    if_false: None,
                }),
            ],
            0,
            None,
        ));
        let m = compile(&ast, &LengthAnalysis::analyze(&ast));
        let kinds: Vec<_> = m.diagnostics.iter().map(|d| d.kind.clone()).collect();
        assert!(kinds.contains(&DiagnosticKind::UnresolvedSubroutine("5".into())));
        assert!(kinds.contains(&DiagnosticKind::UnresolvedCondition("nope".into())));
        assert!(conditions(&m).contains(&&Condition::Fail));
    }

    #[test]
    fn test_prefix_hints() {
        let m = compile_pattern("^abc");
        assert!(m.anchored);
        assert_eq!(m.first_char, None);
        let m = compile_pattern("abc");
        assert!(!m.anchored);
        assert_eq!(m.first_char, Some('a'));
        let m = compile_pattern("(?i)abc");
        assert_eq!(m.first_char, None);
    }

    #[test]
    fn test_fail_verb_and_define() {
        let m = compile_pattern("a(*FAIL)");
        assert!(conditions(&m).contains(&&Condition::Fail));
        let m = compile_pattern("(?(DEFINE)(?<num>\\d+))(?&num)");
        assert!(m.is_executable());
        assert!(conditions(&m).iter().any(|c| matches!(c, Condition::Call { group: 1, .. })));
    }
}
