/// Matcher: runs a compiled state machine against a codepoint stream.
///
/// Backtracking is an explicit loop over a frame stack, never native
/// recursion. Every side effect of a taken transition is appended to a single
/// undo trail; each frame remembers how long the trail was when it was pushed,
/// so popping a frame and unwinding the trail to that mark restores exactly
/// the matcher state of that choice point.

use std::ops::Range;
use std::sync::Arc;

use crate::ast::SimpleAssertion;
use crate::compiler::{Condition, NamedCaptureRegistry, StateId, StateMachine, Transition};
use crate::stream::{CodepointStream, Position};
use crate::unicode;

/// A captured span of the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    start: Position,
    end: Position,
}

impl Capture {
    /// Start, in codepoints.
    pub fn start(&self) -> usize {
        self.start.codepoint
    }

    /// End (exclusive), in codepoints.
    pub fn end(&self) -> usize {
        self.end.codepoint
    }

    /// Length in codepoints.
    pub fn len(&self) -> usize {
        self.end.codepoint.saturating_sub(self.start.codepoint)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_range(&self) -> Range<usize> {
        self.start.byte..self.end.byte.max(self.start.byte)
    }

    /// The captured text, given the subject the match ran against.
    pub fn as_str<'t>(&self, subject: &'t str) -> &'t str {
        subject.get(self.byte_range()).unwrap_or_default()
    }

    pub fn as_bytes<'t>(&self, subject: &'t [u8]) -> &'t [u8] {
        subject.get(self.byte_range()).unwrap_or_default()
    }
}

/// Result of a successful match.
#[derive(Debug, Clone)]
pub struct MatchResult {
    captures: Vec<Option<Capture>>,
    match_start_override: Option<Position>,
    names: Arc<NamedCaptureRegistry>,
    /// Where the attempt began, regardless of `\K`.
    attempt_start: Position,
}

impl MatchResult {
    /// Capture `index`; 0 is the whole match, starting at any `\K`.
    pub fn get(&self, index: usize) -> Option<Capture> {
        let capture = self.captures.get(index).copied().flatten()?;
        match self.match_start_override {
            Some(start) if index == 0 && start <= capture.end => Some(Capture { start, ..capture }),
            _ => Some(capture),
        }
    }

    /// The first set group among those called `name`.
    pub fn name(&self, name: &str) -> Option<Capture> {
        self.names
            .indices(name)
            .iter()
            .find_map(|&index| self.get(index))
    }

    /// Number of capture slots, group 0 included.
    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }

    /// Where `\K` moved the match start to, if it was used.
    pub fn match_start_override(&self) -> Option<usize> {
        self.match_start_override.map(|p| p.codepoint)
    }

    /// Start of the whole match, in codepoints.
    pub fn start(&self) -> usize {
        self.get(0).map_or(self.attempt_start.codepoint, |c| c.start())
    }

    /// End of the whole match, in codepoints.
    pub fn end(&self) -> usize {
        self.end_position().codepoint
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<Capture>> + '_ {
        (0..self.captures.len()).map(|index| self.get(index))
    }

    fn end_position(&self) -> Position {
        self.captures
            .first()
            .copied()
            .flatten()
            .map_or(self.attempt_start, |c| c.end)
    }
}

/// Match starting exactly at the stream's position.
pub fn try_match(
    stream: CodepointStream<'_>,
    machine: &StateMachine,
    max_iterations: usize,
) -> Option<MatchResult> {
    if !runnable(machine) {
        return None;
    }
    let mut matcher = Matcher::new(machine, stream, max_iterations);
    matcher.attempt(stream, stream.position())
}

/// Find the leftmost match at or after the stream's position.
pub fn find_next(
    stream: CodepointStream<'_>,
    machine: &StateMachine,
    max_iterations: usize,
) -> Option<MatchResult> {
    if !runnable(machine) {
        return None;
    }
    let mut matcher = Matcher::new(machine, stream, max_iterations);
    matcher.search(stream)
}

/// Report every non-overlapping match from the stream's position onwards.
/// Each start position gets the full iteration budget.
pub fn find_all(
    stream: CodepointStream<'_>,
    machine: &StateMachine,
    max_iterations: usize,
    mut on_match: impl FnMut(MatchResult),
) {
    if !runnable(machine) {
        return;
    }
    let mut matcher = Matcher::new(machine, stream, max_iterations);
    let mut at = stream;
    while let Some(result) = matcher.search(at) {
        let end = result.end_position();
        let zero_width = end <= result.attempt_start;
        at = at.at(end.max(result.attempt_start));
        on_match(result);
        if zero_width && at.take().is_none() {
            break;
        }
    }
}

fn runnable(machine: &StateMachine) -> bool {
    if machine.is_executable() {
        return true;
    }
    log::warn!(
        "refusing to run a pattern with {} compile diagnostics",
        machine.diagnostics.len()
    );
    false
}

/// A choice point: the next transition of `state` to try, and where to resume.
#[derive(Debug, Clone, Copy)]
struct Frame<'s> {
    state: StateId,
    next: usize,
    stream: CodepointStream<'s>,
    trail: usize,
}

#[derive(Debug, Clone, Copy)]
struct OpenCapture {
    index: usize,
    start: Position,
}

#[derive(Debug, Clone)]
struct CallFrame {
    group: usize,
    exit: StateId,
    return_state: StateId,
    position: usize,
    saved_captures: Vec<Option<Capture>>,
}

/// How to reverse one side effect.
#[derive(Debug, Clone)]
enum Undo<'s> {
    Capture { index: usize, previous: Option<Capture> },
    OpenedCapture,
    ClosedCapture { at: usize, open: OpenCapture },
    PushedAtomic,
    PoppedAtomic(usize),
    PushedCheckpoint,
    PoppedCheckpoint(CodepointStream<'s>),
    PushedPosition,
    PoppedPosition(usize),
    PushedCall,
    PoppedCall(CallFrame),
    MatchStart(Option<Position>),
}

struct Matcher<'m, 's> {
    machine: &'m StateMachine,
    max_iterations: usize,
    /// Steps taken by the current attempt.
    iterations: usize,
    search_start: Position,
    stream: CodepointStream<'s>,
    frames: Vec<Frame<'s>>,
    trail: Vec<Undo<'s>>,
    captures: Vec<Option<Capture>>,
    opened: Vec<OpenCapture>,
    /// Frame-stack depth at each active atomic group.
    atomics: Vec<usize>,
    checkpoints: Vec<CodepointStream<'s>>,
    positions: Vec<usize>,
    calls: Vec<CallFrame>,
    match_start: Option<Position>,
}

impl<'m, 's> Matcher<'m, 's> {
    fn new(machine: &'m StateMachine, stream: CodepointStream<'s>, max_iterations: usize) -> Self {
        Matcher {
            machine,
            max_iterations,
            iterations: 0,
            search_start: stream.position(),
            stream,
            frames: Vec::new(),
            trail: Vec::new(),
            captures: vec![None; machine.capture_count.max(1)],
            opened: Vec::new(),
            atomics: Vec::new(),
            checkpoints: Vec::new(),
            positions: Vec::new(),
            calls: Vec::new(),
            match_start: None,
        }
    }

    /// Scan start positions from `at` for the leftmost match.
    fn search(&mut self, mut at: CodepointStream<'s>) -> Option<MatchResult> {
        let search_start = at.position();
        loop {
            let viable = match self.machine.first_char {
                Some(c) => at.peek() == Some(c),
                None => true,
            };
            if viable {
                if let Some(result) = self.attempt(at, search_start) {
                    return Some(result);
                }
            }
            if self.machine.anchored || at.take().is_none() {
                return None;
            }
        }
    }

    fn attempt(&mut self, at: CodepointStream<'s>, search_start: Position) -> Option<MatchResult> {
        log::trace!("match attempt at codepoint {}", at.codepoint_position());
        self.reset(at, search_start);
        if !self.run() {
            return None;
        }
        let start = at.position();
        self.captures[0] = Some(Capture {
            start,
            end: self.stream.position(),
        });
        Some(MatchResult {
            captures: self.captures.clone(),
            match_start_override: self.match_start,
            names: Arc::clone(&self.machine.named_captures),
            attempt_start: start,
        })
    }

    fn reset(&mut self, at: CodepointStream<'s>, search_start: Position) {
        self.stream = at;
        self.search_start = search_start;
        self.iterations = 0;
        self.frames.clear();
        self.trail.clear();
        self.captures.iter_mut().for_each(|c| *c = None);
        self.opened.clear();
        self.atomics.clear();
        self.checkpoints.clear();
        self.positions.clear();
        self.calls.clear();
        self.match_start = None;
    }

    fn run(&mut self) -> bool {
        let machine = self.machine;
        let mut state = self.arrive(machine.start);
        let mut next = 0;
        loop {
            if state == machine.end && self.calls.is_empty() {
                return true;
            }
            let transitions = machine.transitions_of(state);
            let Some(transition) = transitions.get(next) else {
                // Exhausted: resume the most recent choice point.
                let Some(frame) = self.frames.pop() else {
                    return false;
                };
                self.undo_to(frame.trail);
                self.stream = frame.stream;
                state = frame.state;
                next = frame.next;
                continue;
            };

            self.iterations += 1;
            if self.iterations > self.max_iterations {
                log::debug!(
                    "giving up after {} iterations at codepoint {}",
                    self.max_iterations,
                    self.stream.codepoint_position()
                );
                return false;
            }

            let depth = self.frames.len();
            let mark = self.trail.len();
            let saved = self.stream;
            match self.step(transition, depth) {
                Some(target) => {
                    if next + 1 < transitions.len() {
                        self.frames.push(Frame {
                            state,
                            next: next + 1,
                            stream: saved,
                            trail: mark,
                        });
                    }
                    state = self.arrive(target);
                    next = 0;
                }
                None => {
                    self.undo_to(mark);
                    self.stream = saved;
                    next += 1;
                }
            }
        }
    }

    /// Entering a called group's exit state returns from the call.
    fn arrive(&mut self, mut state: StateId) -> StateId {
        while self.calls.last().is_some_and(|call| call.exit == state) {
            let Some(call) = self.calls.pop() else {
                break;
            };
            state = call.return_state;
            self.restore_captures(&call.saved_captures);
            self.trail.push(Undo::PoppedCall(call));
        }
        state
    }

    fn restore_captures(&mut self, saved: &[Option<Capture>]) {
        for (index, &previous) in saved.iter().enumerate() {
            if self.captures[index] != previous {
                self.set_capture(index, previous);
            }
        }
    }

    fn set_capture(&mut self, index: usize, value: Option<Capture>) {
        let previous = std::mem::replace(&mut self.captures[index], value);
        self.trail.push(Undo::Capture { index, previous });
    }

    fn undo_to(&mut self, mark: usize) {
        while self.trail.len() > mark {
            let Some(entry) = self.trail.pop() else {
                break;
            };
            match entry {
                Undo::Capture { index, previous } => self.captures[index] = previous,
                Undo::OpenedCapture => {
                    self.opened.pop();
                }
                Undo::ClosedCapture { at, open } => self.opened.insert(at, open),
                Undo::PushedAtomic => {
                    self.atomics.pop();
                }
                Undo::PoppedAtomic(depth) => self.atomics.push(depth),
                Undo::PushedCheckpoint => {
                    self.checkpoints.pop();
                }
                Undo::PoppedCheckpoint(stream) => self.checkpoints.push(stream),
                Undo::PushedPosition => {
                    self.positions.pop();
                }
                Undo::PoppedPosition(position) => self.positions.push(position),
                Undo::PushedCall => {
                    self.calls.pop();
                }
                Undo::PoppedCall(call) => self.calls.push(call),
                Undo::MatchStart(previous) => self.match_start = previous,
            }
        }
    }

    /// Try one transition. On success, apply its side effects and return the
    /// state to move to. `depth` is the frame-stack height before any frame
    /// for the current state is pushed.
    fn step(&mut self, transition: &Transition, depth: usize) -> Option<StateId> {
        let target = transition.target;
        match &transition.condition {
            Condition::Always => {}
            Condition::Fail => return None,
            Condition::Literal {
                text,
                case_insensitive,
            } => {
                for &expected in text {
                    let got = self.stream.take()?;
                    if !codepoints_match(got, expected, *case_insensitive) {
                        return None;
                    }
                }
            }
            Condition::Class(class) => {
                self.stream.take().filter(|&c| class.matches(c))?;
            }
            Condition::Assertion(assertion) => {
                if !self.check_assertion(*assertion) {
                    return None;
                }
            }
            Condition::ClassBoundary { class, boundary } => {
                let before = self.stream.peek_prev().is_some_and(|c| class.matches(c));
                let after = self.stream.peek().is_some_and(|c| class.matches(c));
                if (before != after) != *boundary {
                    return None;
                }
            }
            Condition::CaptureBegin(index) => {
                self.opened.push(OpenCapture {
                    index: *index,
                    start: self.stream.position(),
                });
                self.trail.push(Undo::OpenedCapture);
            }
            Condition::CaptureEnd(index) => {
                let at = self.opened.iter().rposition(|o| o.index == *index)?;
                let open = self.opened.remove(at);
                self.trail.push(Undo::ClosedCapture { at, open });
                let end = self.stream.position();
                self.set_capture(*index, Some(Capture { start: open.start, end }));
            }
            Condition::NumberedBackreference {
                index,
                case_insensitive,
            } => {
                let capture = self.captures.get(*index).copied().flatten()?;
                if !self.match_backreference(capture, *case_insensitive) {
                    return None;
                }
            }
            Condition::NamedBackreference {
                indices,
                case_insensitive,
            } => {
                let capture = indices
                    .iter()
                    .find_map(|&i| self.captures.get(i).copied().flatten())?;
                if !self.match_backreference(capture, *case_insensitive) {
                    return None;
                }
            }
            Condition::Call { group, entry, exit } => {
                let position = self.stream.codepoint_position();
                // Re-entering a group without consuming anything would never end.
                if self
                    .calls
                    .iter()
                    .any(|call| call.group == *group && call.position == position)
                {
                    return None;
                }
                self.calls.push(CallFrame {
                    group: *group,
                    exit: *exit,
                    return_state: target,
                    position,
                    saved_captures: self.captures.clone(),
                });
                self.trail.push(Undo::PushedCall);
                return Some(*entry);
            }
            Condition::ResetMatchStart => {
                let previous = self.match_start.replace(self.stream.position());
                self.trail.push(Undo::MatchStart(previous));
            }
            Condition::PushAtomic => {
                self.atomics.push(depth);
                self.trail.push(Undo::PushedAtomic);
            }
            Condition::PopAtomic => {
                let depth = self.atomics.pop()?;
                self.trail.push(Undo::PoppedAtomic(depth));
                self.frames.truncate(depth);
            }
            Condition::PushCheckpoint => {
                self.checkpoints.push(self.stream);
                self.trail.push(Undo::PushedCheckpoint);
            }
            Condition::RestoreCheckpoint => {
                let checkpoint = self.checkpoints.pop()?;
                self.trail.push(Undo::PoppedCheckpoint(checkpoint));
                self.stream = checkpoint;
            }
            Condition::PushPosition => {
                self.positions.push(self.stream.codepoint_position());
                self.trail.push(Undo::PushedPosition);
            }
            Condition::CheckInfiniteLoop => {
                let position = self.positions.pop()?;
                self.trail.push(Undo::PoppedPosition(position));
                if self.stream.codepoint_position() <= position {
                    return None;
                }
            }
            Condition::Rewind(n) => {
                for _ in 0..*n {
                    self.stream.take_prev()?;
                }
            }
            Condition::CaptureSet(index) => {
                self.captures.get(*index).copied().flatten()?;
            }
            Condition::NamedCaptureSet(indices) => {
                if !indices
                    .iter()
                    .any(|&i| self.captures.get(i).is_some_and(Option::is_some))
                {
                    return None;
                }
            }
            Condition::InRecursion(group) => {
                let inside = match group {
                    None => !self.calls.is_empty(),
                    Some(g) => self.calls.last().is_some_and(|call| call.group == *g),
                };
                if !inside {
                    return None;
                }
            }
        }
        Some(target)
    }

    fn check_assertion(&self, assertion: SimpleAssertion) -> bool {
        let s = &self.stream;
        match assertion {
            SimpleAssertion::SubjectStart => s.is_at_start(),
            SimpleAssertion::SubjectEnd => s.is_at_end(),
            SimpleAssertion::SubjectEndOrFinalNewline => s.is_at_end() || s.is_before_final_newline(),
            SimpleAssertion::LineStart => s.is_at_line_start(),
            SimpleAssertion::LineEnd => s.is_at_line_end(),
            SimpleAssertion::SearchStart => s.position() == self.search_start,
        }
    }

    /// Compare the captured text against upcoming input, codepoint by codepoint.
    fn match_backreference(&mut self, capture: Capture, case_insensitive: bool) -> bool {
        let mut captured = self.stream.at(capture.start);
        for _ in 0..capture.len() {
            let (Some(expected), Some(got)) = (captured.take(), self.stream.take()) else {
                return false;
            };
            if !codepoints_match(got, expected, case_insensitive) {
                return false;
            }
        }
        true
    }
}

fn codepoints_match(got: char, expected: char, case_insensitive: bool) -> bool {
    got == expected || (case_insensitive && unicode::chars_equal_ignoring_case(got, expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::LengthAnalysis;
    use crate::compiler::compile;
    use crate::parser::{ParseOptions, parse};

    const BUDGET: usize = 1_000_000;

    fn machine(pattern: &str) -> StateMachine {
        let (ast, diagnostics) = parse(CodepointStream::new(pattern), ParseOptions::default());
        assert!(diagnostics.is_empty(), "{pattern}: {diagnostics:?}");
        compile(&ast, &LengthAnalysis::analyze(&ast))
    }

    fn find(pattern: &str, subject: &str) -> Option<(usize, usize)> {
        find_next(CodepointStream::new(subject), &machine(pattern), BUDGET).map(|m| (m.start(), m.end()))
    }

    fn group<'t>(pattern: &str, subject: &'t str, index: usize) -> Option<&'t str> {
        let m = find_next(CodepointStream::new(subject), &machine(pattern), BUDGET)?;
        m.get(index).map(|c| c.as_str(subject))
    }

    #[test]
    fn test_greedy_and_lazy_star() {
        assert_eq!(find("a*", "aaa"), Some((0, 3)));
        assert_eq!(find("a*?", "aaa"), Some((0, 0)));
        assert_eq!(find("a+?", "aaa"), Some((0, 1)));
        assert_eq!(find("a{2,3}", "aaaa"), Some((0, 3)));
        assert_eq!(find("a{2,3}?", "aaaa"), Some((0, 2)));
    }

    #[test]
    fn test_try_match_is_anchored_at_stream_position() {
        let m = machine("b");
        assert!(try_match(CodepointStream::new("ab"), &m, BUDGET).is_none());
        let mut s = CodepointStream::new("ab");
        s.take();
        let result = try_match(s, &m, BUDGET).map(|r| (r.start(), r.end()));
        assert_eq!(result, Some((1, 2)));
    }

    #[test]
    fn test_alternation_priority() {
        assert_eq!(group("(a|ab)(c|bcd)", "abcd", 0), Some("abcd"));
        assert_eq!(group("(a|ab)(c|bcd)", "abcd", 1), Some("a"));
    }

    #[test]
    fn test_backreferences() {
        assert_eq!(group("(a+)\\1", "aa", 1), Some("a"));
        assert_eq!(find("(a+)\\1", "ab"), None);
        assert_eq!(find("(?i)(a)\\1", "aA"), Some((0, 2)));
        assert_eq!(find("(a)?\\1", "b"), None);
        assert_eq!(group("(?<q>['\"]).*?\\k<q>", "say 'hi' now", 0), Some("'hi'"));
    }

    #[test]
    fn test_atomic_and_possessive() {
        assert_eq!(find("a++a", "aaa"), None);
        assert_eq!(find("(?>a|ab)c", "abc"), None);
        assert_eq!(find("(?:a|ab)c", "abc"), Some((0, 3)));
        assert_eq!(find("\\d++x", "123x"), Some((0, 4)));
    }

    #[test]
    fn test_lookaround() {
        assert_eq!(find("(?<=foo)bar", "foobar"), Some((3, 6)));
        assert_eq!(find("(?<!a)b", "abcb"), Some((3, 4)));
        assert_eq!(find("a(?!b)", "ab ac"), Some((3, 4)));
        assert_eq!(find("a(?=c)", "ab ac"), Some((3, 4)));
        assert_eq!(find("(?<=a|bc)d", "bcd"), Some((2, 3)));
        assert_eq!(group("(?=(\\w+))\\w", "abc", 1), Some("abc"));
    }

    #[test]
    fn test_duplicate_group_names_resolve_to_matched_alternative() {
        let subject = "b";
        let m = find_next(CodepointStream::new(subject), &machine("(?|(?<x>a)|(?<x>b))"), BUDGET);
        let m = m.map(|m| m.name("x").map(|c| c.as_str(subject)));
        assert_eq!(m, Some(Some("b")));
    }

    #[test]
    fn test_zero_width_loop_terminates() {
        assert_eq!(find("(a?)*", "b"), Some((0, 0)));
        assert_eq!(find("(?:a*)*b", "aab"), Some((0, 3)));
        assert_eq!(find("(?:|a)+?b", "ab"), Some((0, 2)));
    }

    #[test]
    fn test_recursion() {
        let pattern = "\\((?:[^()]|(?R))*\\)";
        assert_eq!(group(pattern, "x(a(b)c)y", 0), Some("(a(b)c)"));
        assert_eq!(find("^(a|b(?1)c)$", "bbacc"), Some((0, 5)));
        assert_eq!(find("^(a|b(?1)c)$", "bbac"), None);
    }

    #[test]
    fn test_captures_revert_after_subroutine_return() {
        assert_eq!(group("(a|b)(?1)", "ab", 1), Some("a"));
    }

    #[test]
    fn test_left_recursion_terminates() {
        assert_eq!(find("^(a|(?1)b)$", "abb"), None);
        assert_eq!(find("^(a|(?1)b)$", "ab"), Some((0, 2)));
    }

    #[test]
    fn test_conditionals() {
        let m = machine("^(a)?(?(1)b|c)$");
        let run = |s: &str| find_next(CodepointStream::new(s), &m, BUDGET).is_some();
        assert!(run("ab"));
        assert!(run("c"));
        assert!(!run("ac"));
        assert!(!run("b"));
        assert_eq!(find("^(?(?=a)ab|cd)$", "cd"), Some((0, 2)));
        assert_eq!(find("^(?(?!a)cd|ab)$", "ab"), Some((0, 2)));
        assert_eq!(find("(?(DEFINE)(?<d>\\d\\d))x(?&d)", "x42"), Some((0, 3)));
        assert_eq!(find("^(?<n>a)?(?(<n>)b|c)", "ab"), Some((0, 2)));
        assert_eq!(find("^(\\((?:[^()]|(?1))*(?(R1)\\)|\\)))$", "((x))"), Some((0, 5)));
    }

    #[test]
    fn test_match_start_override() {
        let subject = "foobar";
        let m = find_next(CodepointStream::new(subject), &machine("foo\\Kbar"), BUDGET);
        let m = m.map(|m| (m.start(), m.end(), m.match_start_override()));
        assert_eq!(m, Some((3, 6, Some(3))));
    }

    #[test]
    fn test_assertions() {
        assert_eq!(find("\\bfoo\\b", "a foo b"), Some((2, 5)));
        assert_eq!(find("\\Bo", "foo"), Some((1, 2)));
        assert_eq!(find("a$", "a\n"), Some((0, 1)));
        assert_eq!(find("a\\z", "a\n"), None);
        assert_eq!(find("(?m)^b", "a\nb"), Some((2, 3)));
        assert_eq!(find("\\Aa", "ba"), None);
    }

    #[test]
    fn test_iteration_cap_reports_no_match() {
        let m = machine("^(?:a|b)*c");
        let subject = "ab".repeat(100) + "c";
        assert!(find_next(CodepointStream::new(&subject), &m, 10).is_none());
        assert!(find_next(CodepointStream::new(&subject), &m, BUDGET).is_some());
        // Later start positions are not starved by failed earlier ones.
        let m = machine("(?:a|b)*c");
        let found = find_next(CodepointStream::new(&subject), &m, 40).unwrap();
        assert!(found.start() > 0);
        assert_eq!(found.end(), 201);
        let hard = machine("(a+)+b");
        assert!(find_next(CodepointStream::new(&"a".repeat(30)), &hard, 50_000).is_none());
    }

    #[test]
    fn test_find_all_advances_past_empty_matches() {
        let m = machine("\\d*");
        let mut spans = Vec::new();
        find_all(CodepointStream::new("a1b22"), &m, BUDGET, |r| spans.push((r.start(), r.end())));
        assert_eq!(spans, vec![(0, 0), (1, 2), (2, 2), (3, 5), (5, 5)]);
    }

    #[test]
    fn test_search_start_assertion() {
        let m = machine("\\Ga");
        let mut spans = Vec::new();
        find_all(CodepointStream::new("aaba"), &m, BUDGET, |r| spans.push(r.start()));
        assert_eq!(spans, vec![0, 1]);
    }

    #[test]
    fn test_machine_with_diagnostics_is_refused() {
        let (ast, _) = parse(CodepointStream::new("(?<=a+)b"), ParseOptions::default());
        let m = compile(&ast, &LengthAnalysis::analyze(&ast));
        assert!(find_next(CodepointStream::new("aab"), &m, BUDGET).is_none());
        let mut called = false;
        find_all(CodepointStream::new("aab"), &m, BUDGET, |_| called = true);
        assert!(!called);
    }

    #[test]
    fn test_byte_ranges_on_multibyte_subject() {
        let subject = "héllo wörld";
        let m = find_next(CodepointStream::new(subject), &machine("w\\w+"), BUDGET);
        let m = m.and_then(|m| m.get(0));
        assert_eq!(m.map(|c| (c.start(), c.len(), c.byte_range())), Some((6, 5, 7..13)));
        assert_eq!(m.map(|c| c.as_str(subject)), Some("wörld"));
    }
}
