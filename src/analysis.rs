/// Length analysis: how many codepoints a subtree can consume.
///
/// The compiler uses this to size lookbehind rewinds. Subroutine calls and
/// backreferences take the width of the group they name, so group widths are
/// computed first, with recursive references treated as unbounded.

use rustc_hash::FxHashMap;

use crate::ast::{Condition, Node, Subexpression};

/// Codepoint width bounds of a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Width {
    pub min: usize,
    /// `None` when the subtree can consume arbitrarily many codepoints.
    pub max: Option<usize>,
}

impl Width {
    pub const ZERO: Width = Width::exact(0);
    pub const UNKNOWN: Width = Width { min: 0, max: None };

    pub const fn exact(n: usize) -> Width {
        Width { min: n, max: Some(n) }
    }

    /// The width when it cannot vary.
    pub fn fixed(self) -> Option<usize> {
        match self.max {
            Some(max) if max == self.min => Some(max),
            _ => None,
        }
    }

    /// Width of `self` followed by `next`.
    fn then(self, next: Width) -> Width {
        Width {
            min: self.min.saturating_add(next.min),
            max: match (self.max, next.max) {
                (Some(a), Some(b)) => a.checked_add(b),
                _ => None,
            },
        }
    }

    /// Width of a choice between `self` and `other`.
    fn or(self, other: Width) -> Width {
        Width {
            min: self.min.min(other.min),
            max: match (self.max, other.max) {
                (Some(a), Some(b)) => Some(a.max(b)),
                _ => None,
            },
        }
    }

    fn repeat(self, min: usize, max: Option<usize>) -> Width {
        let upper = match (self.max, max) {
            (_, Some(0)) | (Some(0), _) => Some(0),
            (Some(a), Some(b)) => a.checked_mul(b),
            _ => None,
        };
        Width {
            min: self.min.saturating_mul(min),
            max: upper,
        }
    }
}

/// Resolves the width of a referenced group while measuring.
trait GroupWidths {
    fn numbered(&mut self, index: usize) -> Width;
    fn named(&mut self, name: &str) -> Width;
}

fn measure(node: &Node, groups: &mut impl GroupWidths) -> Width {
    match node {
        Node::Error
        | Node::Feature(_)
        | Node::MatchStartOverride
        | Node::SimpleAssertion(_)
        | Node::ClassBoundary { .. }
        | Node::ComplexAssertion(_) => Width::ZERO,
        Node::Literal { text, .. } => Width::exact(text.len()),
        Node::CharacterClass(_) => Width::exact(1),
        Node::NumberedBackreference { index, .. } | Node::NumberedSubroutine(index) => {
            groups.numbered(*index)
        }
        Node::NamedBackreference { name, .. } | Node::NamedSubroutine(name) => groups.named(name),
        Node::Subexpression(sub) => measure_sequence(&sub.nodes, groups),
        Node::Alternative(branches) => branches
            .iter()
            .map(|b| measure_sequence(&b.nodes, groups))
            .reduce(Width::or)
            .unwrap_or(Width::ZERO),
        Node::Repetition(rep) => measure(&rep.body, groups).repeat(rep.min, rep.max),
        Node::Conditional(cond) => match cond.condition {
            Condition::Define => Width::ZERO,
            _ => {
                let yes = measure_sequence(&cond.if_true.nodes, groups);
                let no = match &cond.if_false {
                    Some(sub) => measure_sequence(&sub.nodes, groups),
                    None => Width::ZERO,
                };
                yes.or(no)
            }
        },
    }
}

fn measure_sequence(nodes: &[Node], groups: &mut impl GroupWidths) -> Width {
    nodes
        .iter()
        .fold(Width::ZERO, |acc, node| acc.then(measure(node, groups)))
}

/// First pass: measures each group on demand, guarding against recursion.
struct Measurer<'a> {
    groups: FxHashMap<usize, &'a Subexpression>,
    names: FxHashMap<&'a str, Vec<usize>>,
    widths: FxHashMap<usize, Width>,
    visiting: Vec<usize>,
}

impl GroupWidths for Measurer<'_> {
    fn numbered(&mut self, index: usize) -> Width {
        if let Some(width) = self.widths.get(&index) {
            return *width;
        }
        if self.visiting.contains(&index) {
            return Width::UNKNOWN;
        }
        let Some(group) = self.groups.get(&index).copied() else {
            return Width::UNKNOWN;
        };
        self.visiting.push(index);
        let width = measure_sequence(&group.nodes, self);
        self.visiting.pop();
        if self.visiting.is_empty() {
            self.widths.insert(index, width);
        }
        width
    }

    fn named(&mut self, name: &str) -> Width {
        let indices = self.names.get(name).cloned().unwrap_or_default();
        named_width(&indices, |i| self.numbered(i))
    }
}

fn named_width(indices: &[usize], mut numbered: impl FnMut(usize) -> Width) -> Width {
    indices
        .iter()
        .map(|&i| numbered(i))
        .reduce(Width::or)
        .unwrap_or(Width::UNKNOWN)
}

/// Second pass: every group width is known.
struct Measured<'a> {
    widths: &'a FxHashMap<usize, Width>,
    names: &'a FxHashMap<String, Vec<usize>>,
}

impl GroupWidths for Measured<'_> {
    fn numbered(&mut self, index: usize) -> Width {
        self.widths.get(&index).copied().unwrap_or(Width::UNKNOWN)
    }

    fn named(&mut self, name: &str) -> Width {
        let widths = self.widths;
        match self.names.get(name) {
            Some(indices) => named_width(indices, |i| widths.get(&i).copied().unwrap_or(Width::UNKNOWN)),
            None => Width::UNKNOWN,
        }
    }
}

/// Group widths for a whole pattern.
#[derive(Debug, Clone, Default)]
pub struct LengthAnalysis {
    widths: FxHashMap<usize, Width>,
    names: FxHashMap<String, Vec<usize>>,
}

impl LengthAnalysis {
    /// `root` is the parser's output, normally capture group 0.
    pub fn analyze(root: &Node) -> LengthAnalysis {
        let mut measurer = Measurer {
            groups: FxHashMap::default(),
            names: FxHashMap::default(),
            widths: FxHashMap::default(),
            visiting: Vec::new(),
        };
        root.for_each_group(&mut |group| {
            if let Some(index) = group.capture_index {
                measurer.groups.entry(index).or_insert(group);
                if let Some(name) = &group.capture_name {
                    let indices = measurer.names.entry(name.as_str()).or_default();
                    if !indices.contains(&index) {
                        indices.push(index);
                    }
                }
            }
        });
        let mut indices: Vec<usize> = measurer.groups.keys().copied().collect();
        indices.sort_unstable();
        for index in indices {
            measurer.numbered(index);
        }
        LengthAnalysis {
            names: measurer
                .names
                .iter()
                .map(|(name, indices)| (name.to_string(), indices.clone()))
                .collect(),
            widths: measurer.widths,
        }
    }

    pub fn group_width(&self, index: usize) -> Option<Width> {
        self.widths.get(&index).copied()
    }

    pub fn width(&self, node: &Node) -> Width {
        measure(
            node,
            &mut Measured {
                widths: &self.widths,
                names: &self.names,
            },
        )
    }

    pub fn sequence_width(&self, nodes: &[Node]) -> Width {
        measure_sequence(
            nodes,
            &mut Measured {
                widths: &self.widths,
                names: &self.names,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseOptions, parse};
    use crate::stream::CodepointStream;

    fn analyze(pattern: &str) -> (Node, LengthAnalysis) {
        let (ast, diagnostics) = parse(CodepointStream::new(pattern), ParseOptions::default());
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        let analysis = LengthAnalysis::analyze(&ast);
        (ast, analysis)
    }

    #[test]
    fn test_fixed_widths() {
        let (ast, a) = analyze("ab[cd]\\d{3}");
        assert_eq!(a.width(&ast).fixed(), Some(6));
        let (ast, a) = analyze("(?:ab|cd)x?");
        assert_eq!(a.width(&ast), Width { min: 2, max: Some(3) });
    }

    #[test]
    fn test_unbounded() {
        let (ast, a) = analyze("a+b");
        assert_eq!(a.width(&ast), Width { min: 2, max: None });
        assert_eq!(a.width(&ast).fixed(), None);
    }

    #[test]
    fn test_group_widths_feed_references() {
        let (ast, a) = analyze("(abc)(?1)\\1(?<n>x)(?&n)");
        assert_eq!(a.group_width(1), Some(Width::exact(3)));
        assert_eq!(a.group_width(2), Some(Width::exact(1)));
        assert_eq!(a.width(&ast).fixed(), Some(3 + 3 + 3 + 1 + 1));
    }

    #[test]
    fn test_recursion_is_unbounded() {
        let (_, a) = analyze("(a(?1)?b)");
        assert_eq!(a.group_width(1).and_then(Width::fixed), None);
        let (ast, a) = analyze("a(?R)?");
        assert_eq!(a.width(&ast).max, None);
    }

    #[test]
    fn test_zero_repeat() {
        assert_eq!(Width::exact(3).repeat(0, Some(0)), Width::ZERO);
        assert_eq!(Width::UNKNOWN.repeat(2, Some(0)), Width::ZERO);
        assert_eq!(Width::exact(2).repeat(1, Some(3)), Width { min: 2, max: Some(6) });
    }
}
