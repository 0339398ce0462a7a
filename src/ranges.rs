/// Codepoint ranges and character classes.

use crate::unicode;

/// Largest valid Unicode scalar value.
pub const MAX_CODEPOINT: u32 = 0x10FFFF;

/// A closed range of codepoints `[first, last]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CodepointRange {
    pub first: u32,
    pub last: u32,
}

impl CodepointRange {
    pub fn new(first: u32, last: u32) -> Self {
        CodepointRange { first, last }
    }

    pub fn single(cp: u32) -> Self {
        CodepointRange { first: cp, last: cp }
    }
}

/// A set of codepoints stored as ranges.
///
/// Ranges can be pushed in any order. After `sort_and_compact` they are sorted,
/// non-overlapping and non-adjacent, which is what `contains` and
/// `complement` rely on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodepointRangeList {
    ranges: Vec<CodepointRange>,
}

impl CodepointRangeList {
    pub fn new() -> Self {
        CodepointRangeList { ranges: Vec::new() }
    }

    /// Build a compacted list from arbitrary ranges.
    pub fn from_ranges(ranges: impl IntoIterator<Item = CodepointRange>) -> Self {
        let mut list = CodepointRangeList {
            ranges: ranges.into_iter().collect(),
        };
        list.sort_and_compact();
        list
    }

    pub fn from_chars(chars: &[char]) -> Self {
        Self::from_ranges(chars.iter().map(|&c| CodepointRange::single(c as u32)))
    }

    pub fn push(&mut self, c: char) {
        self.ranges.push(CodepointRange::single(c as u32));
    }

    pub fn push_range(&mut self, first: u32, last: u32) {
        if first <= last {
            self.ranges.push(CodepointRange::new(first, last));
        }
    }

    pub fn extend(&mut self, other: &CodepointRangeList) {
        self.ranges.extend_from_slice(&other.ranges);
    }

    pub fn ranges(&self) -> &[CodepointRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Sort by lower bound and merge overlapping or adjacent ranges.
    pub fn sort_and_compact(&mut self) {
        if self.ranges.len() < 2 {
            return;
        }
        self.ranges.sort_unstable();
        let mut merged: Vec<CodepointRange> = Vec::with_capacity(self.ranges.len());
        for range in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(prev) if range.first <= prev.last.saturating_add(1) => {
                    prev.last = prev.last.max(range.last);
                }
                _ => merged.push(range),
            }
        }
        self.ranges = merged;
    }

    /// Binary search for `c`. Requires a compacted list.
    pub fn contains(&self, c: char) -> bool {
        let cp = c as u32;
        let idx = self.ranges.partition_point(|r| r.last < cp);
        match self.ranges.get(idx) {
            Some(r) => cp >= r.first,
            None => false,
        }
    }

    /// The gaps between ranges over `[0, MAX_CODEPOINT]`. Requires a compacted list.
    pub fn complement(&self) -> CodepointRangeList {
        let mut gaps = Vec::with_capacity(self.ranges.len() + 1);
        let mut next = 0u32;
        for range in &self.ranges {
            if range.first > next {
                gaps.push(CodepointRange::new(next, range.first - 1));
            }
            next = range.last.saturating_add(1);
        }
        if next <= MAX_CODEPOINT {
            gaps.push(CodepointRange::new(next, MAX_CODEPOINT));
        }
        CodepointRangeList { ranges: gaps }
    }
}

/// A character class: a range list plus negation and case-folding flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterClass {
    pub ranges: CodepointRangeList,
    pub negate: bool,
    pub case_insensitive: bool,
}

impl CharacterClass {
    pub fn new(ranges: CodepointRangeList, negate: bool, case_insensitive: bool) -> Self {
        CharacterClass {
            ranges,
            negate,
            case_insensitive,
        }
    }

    /// Matches every codepoint.
    pub fn any() -> Self {
        CharacterClass::new(CodepointRangeList::new(), true, false)
    }

    pub fn matches(&self, c: char) -> bool {
        let mut hit = self.ranges.contains(c);
        if !hit && self.case_insensitive {
            hit = unicode::case_variants(c)
                .iter()
                .any(|&v| self.ranges.contains(v));
        }
        hit != self.negate
    }

    /// The ranges this class accepts with negation applied (case folding is not
    /// materialized).
    pub fn get_effective_ranges(&self) -> CodepointRangeList {
        if self.negate {
            self.ranges.complement()
        } else {
            self.ranges.clone()
        }
    }
}
