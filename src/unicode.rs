/// Unicode lookups used by the parser and the matcher: case folding and the
/// codepoint sets behind shorthand, property and POSIX classes.
///
/// Case data comes from the standard library's Unicode tables. Range sets are
/// built by scanning the codepoint space once and cached for the life of the
/// process.

use std::sync::OnceLock;

use smallvec::SmallVec;

use crate::ranges::{CodepointRange, CodepointRangeList, MAX_CODEPOINT};

/// Named codepoint sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnicodeClass {
    /// `\d`
    Digit,
    /// `\w`
    Word,
    /// `\s`
    Space,
    /// `\h`
    HorizontalSpace,
    /// `\v`, also the members of `\R`
    VerticalSpace,
    Alphabetic,
    Uppercase,
    Lowercase,
    Control,
    Any,
}

/// Fold `c` to a single canonical codepoint, or return it unchanged when the
/// mapping is not one-to-one.
pub fn simple_fold(c: char) -> char {
    let upper = single(c.to_uppercase()).unwrap_or(c);
    single(upper.to_lowercase()).unwrap_or(upper)
}

/// Every single-codepoint case form of `c`, including `c` itself.
pub fn case_variants(c: char) -> SmallVec<[char; 4]> {
    let mut variants: SmallVec<[char; 4]> = SmallVec::new();
    variants.push(c);
    let folded = simple_fold(c);
    let candidates = [
        single(c.to_lowercase()),
        single(c.to_uppercase()),
        Some(folded),
        single(folded.to_uppercase()),
    ];
    for v in candidates.into_iter().flatten() {
        if !variants.contains(&v) {
            variants.push(v);
        }
    }
    variants
}

pub fn chars_equal_ignoring_case(a: char, b: char) -> bool {
    a == b || simple_fold(a) == simple_fold(b)
}

fn single(mut it: impl Iterator<Item = char>) -> Option<char> {
    let first = it.next()?;
    match it.next() {
        None => Some(first),
        Some(_) => None,
    }
}

/// The cached range set for `class`.
pub fn class_ranges(class: UnicodeClass) -> &'static CodepointRangeList {
    static DIGIT: OnceLock<CodepointRangeList> = OnceLock::new();
    static WORD: OnceLock<CodepointRangeList> = OnceLock::new();
    static SPACE: OnceLock<CodepointRangeList> = OnceLock::new();
    static HSPACE: OnceLock<CodepointRangeList> = OnceLock::new();
    static VSPACE: OnceLock<CodepointRangeList> = OnceLock::new();
    static ALPHA: OnceLock<CodepointRangeList> = OnceLock::new();
    static UPPER: OnceLock<CodepointRangeList> = OnceLock::new();
    static LOWER: OnceLock<CodepointRangeList> = OnceLock::new();
    static CONTROL: OnceLock<CodepointRangeList> = OnceLock::new();
    static ANY: OnceLock<CodepointRangeList> = OnceLock::new();

    match class {
        UnicodeClass::Digit => DIGIT.get_or_init(|| scan(char::is_numeric)),
        UnicodeClass::Word => WORD.get_or_init(|| scan(|c| c.is_alphanumeric() || c == '_')),
        UnicodeClass::Space => SPACE.get_or_init(|| scan(char::is_whitespace)),
        UnicodeClass::HorizontalSpace => HSPACE.get_or_init(|| {
            scan(|c| {
                matches!(
                    c,
                    '\t' | ' '
                        | '\u{A0}'
                        | '\u{1680}'
                        | '\u{180E}'
                        | '\u{2000}'..='\u{200A}'
                        | '\u{202F}'
                        | '\u{205F}'
                        | '\u{3000}'
                )
            })
        }),
        UnicodeClass::VerticalSpace => VSPACE.get_or_init(|| {
            scan(|c| matches!(c, '\n'..='\r' | '\u{85}' | '\u{2028}' | '\u{2029}'))
        }),
        UnicodeClass::Alphabetic => ALPHA.get_or_init(|| scan(char::is_alphabetic)),
        UnicodeClass::Uppercase => UPPER.get_or_init(|| scan(char::is_uppercase)),
        UnicodeClass::Lowercase => LOWER.get_or_init(|| scan(char::is_lowercase)),
        UnicodeClass::Control => CONTROL.get_or_init(|| scan(char::is_control)),
        UnicodeClass::Any => {
            ANY.get_or_init(|| CodepointRangeList::from_ranges([CodepointRange::new(0, MAX_CODEPOINT)]))
        }
    }
}

/// Resolve a `\p{..}` property name.
pub fn property_class(name: &str) -> Option<UnicodeClass> {
    let class = match name {
        "Any" => UnicodeClass::Any,
        "L" | "Letter" | "Alpha" | "Alphabetic" => UnicodeClass::Alphabetic,
        "Lu" | "Uppercase_Letter" | "Upper" | "Uppercase" => UnicodeClass::Uppercase,
        "Ll" | "Lowercase_Letter" | "Lower" | "Lowercase" => UnicodeClass::Lowercase,
        "N" | "Number" | "Nd" | "Digit" | "Numeric" => UnicodeClass::Digit,
        "Z" | "Separator" | "Space" | "White_Space" | "Whitespace" => UnicodeClass::Space,
        "Cc" | "Control" => UnicodeClass::Control,
        _ => return None,
    };
    Some(class)
}

/// Resolve a POSIX `[:name:]` class. POSIX classes keep their ASCII meaning.
pub fn posix_class(name: &str) -> Option<CodepointRangeList> {
    let pred: fn(char) -> bool = match name {
        "alpha" => |c| c.is_ascii_alphabetic(),
        "digit" => |c| c.is_ascii_digit(),
        "alnum" => |c| c.is_ascii_alphanumeric(),
        "upper" => |c| c.is_ascii_uppercase(),
        "lower" => |c| c.is_ascii_lowercase(),
        "space" => |c| matches!(c, ' ' | '\t'..='\r'),
        "blank" => |c| c == ' ' || c == '\t',
        "punct" => |c| c.is_ascii_punctuation(),
        "cntrl" => |c| c.is_ascii_control(),
        "xdigit" => |c| c.is_ascii_hexdigit(),
        "print" => |c| (' '..='~').contains(&c),
        "graph" => |c| c.is_ascii_graphic(),
        "word" => |c| c.is_ascii_alphanumeric() || c == '_',
        "ascii" => |c| c.is_ascii(),
        _ => return None,
    };
    Some(scan_range(0, 0x7F, pred))
}

fn scan(pred: impl Fn(char) -> bool) -> CodepointRangeList {
    scan_range(0, MAX_CODEPOINT, pred)
}

fn scan_range(first: u32, last: u32, pred: impl Fn(char) -> bool) -> CodepointRangeList {
    let mut list = CodepointRangeList::new();
    let mut open: Option<u32> = None;
    for cp in first..=last {
        let hit = char::from_u32(cp).is_some_and(&pred);
        match (hit, open) {
            (true, None) => open = Some(cp),
            (false, Some(start)) => {
                list.push_range(start, cp - 1);
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        list.push_range(start, last);
    }
    list.sort_and_compact();
    list
}
