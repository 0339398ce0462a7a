use backtracking_regex::ranges::{CharacterClass, CodepointRange, CodepointRangeList};
use backtracking_regex::{
    CodepointStream, Error, LengthAnalysis, ParseOptions, Regex, compile, find_all, find_next, parse, try_match,
};

fn span(pattern: &str, subject: &str) -> Option<(usize, usize)> {
    Regex::new(pattern).unwrap().find(subject).map(|m| (m.start(), m.end()))
}

fn group<'t>(pattern: &str, subject: &'t str, index: usize) -> Option<&'t str> {
    let m = Regex::new(pattern).unwrap().find(subject)?;
    m.get(index).map(|c| c.as_str(subject))
}

#[test]
fn find_all_is_non_overlapping_and_strictly_increasing() {
    let cases = [
        ("a*", "baaacaa"),
        ("\\d*", "a1b22c"),
        ("(?=a)|b+", "abbab"),
        ("x??", "xxx"),
        ("\\b", "ab cd"),
        ("(?<=a)", "aaa"),
        ("é|", "aéé"),
    ];
    for (pattern, subject) in cases {
        let re = Regex::new(pattern).unwrap();
        let matches = re.find_all(subject);
        assert!(!matches.is_empty(), "{pattern}");
        let mut previous: Option<(usize, usize)> = None;
        for m in &matches {
            assert!(m.start() <= m.end());
            if let Some((start, end)) = previous {
                assert!(m.start() > start, "{pattern}: search positions must increase");
                assert!(m.start() >= end, "{pattern}: matches overlap");
            }
            previous = Some((m.start(), m.end()));
        }
    }
}

#[test]
fn find_all_visits_every_empty_position_once() {
    let starts: Vec<_> = Regex::new("").unwrap().find_all("abc").iter().map(|m| m.start()).collect();
    assert_eq!(starts, vec![0, 1, 2, 3]);
}

#[test]
fn compilation_is_deterministic() {
    let patterns = ["(a|b)*c", "(?<n>x)(?&n)+", "(?<=ab|c)d(?!e)", "^(?(1)a|b)(c)?$"];
    let subjects = ["", "abc", "xxx", "cd", "abd", "b", "bc", "ac"];
    for pattern in patterns {
        let (ast, _) = parse(CodepointStream::new(pattern), ParseOptions::default());
        let analysis = LengthAnalysis::analyze(&ast);
        let first = compile(&ast, &analysis);
        let second = compile(&ast, &analysis);
        assert_eq!(first.transitions, second.transitions);
        for subject in subjects {
            let a = find_next(CodepointStream::new(subject), &first, 100_000).map(|m| (m.start(), m.end()));
            let b = find_next(CodepointStream::new(subject), &second, 100_000).map(|m| (m.start(), m.end()));
            assert_eq!(a, b, "{pattern} on {subject:?}");
        }
    }
}

#[test]
fn sort_and_compact_is_idempotent() {
    let mut list = CodepointRangeList::from_ranges([
        CodepointRange::new(10, 20),
        CodepointRange::new(0, 3),
        CodepointRange::new(21, 25),
        CodepointRange::new(2, 5),
        CodepointRange::new(100, 100),
    ]);
    list.sort_and_compact();
    let once = list.clone();
    list.sort_and_compact();
    assert_eq!(list, once);
    assert_eq!(
        once.ranges(),
        &[
            CodepointRange::new(0, 5),
            CodepointRange::new(10, 25),
            CodepointRange::new(100, 100)
        ]
    );
}

#[test]
fn class_and_its_negation_partition_codepoints() {
    let ranges = CodepointRangeList::from_ranges([
        CodepointRange::new('a' as u32, 'f' as u32),
        CodepointRange::new(0x400, 0x4FF),
        CodepointRange::new(0x10FFF0, 0x10FFFF),
    ]);
    let class = CharacterClass::new(ranges.clone(), false, false);
    let negated = CharacterClass::new(ranges, true, false);
    let probes = (0u32..0x600).chain(0xD7F0..0xE010).chain(0x10FF00..=0x10FFFF);
    for c in probes.filter_map(char::from_u32) {
        assert!(class.matches(c) != negated.matches(c), "{c:?}");
    }
}

#[test]
fn greedy_and_lazy_star() {
    assert_eq!(span("a*", "aaa"), Some((0, 3)));
    assert_eq!(span("a*?", "aaa"), Some((0, 0)));
}

#[test]
fn backreference_repeats_captured_text() {
    assert_eq!(group("(a+)\\1", "aa", 1), Some("a"));
    assert_eq!(span("(a+)\\1", "aa"), Some((0, 2)));
    assert_eq!(span("^(a+)\\1$", "ab"), None);
}

#[test]
fn possessive_never_gives_back() {
    assert_eq!(span("a++a", "aaa"), None);
    assert_eq!(span("a+a", "aaa"), Some((0, 3)));
}

#[test]
fn lookbehind_rewinds_fixed_width() {
    assert_eq!(span("(?<=foo)bar", "foobar"), Some((3, 6)));
    assert_eq!(span("(?<=foo)bar", "fobar"), None);
}

#[test]
fn duplicate_named_groups_report_matched_alternative() {
    let subject = "b";
    let m = Regex::new("(?|(?<x>a)|(?<x>b))").unwrap().find(subject).unwrap();
    assert_eq!(m.name("x").map(|c| c.as_str(subject)), Some("b"));
    assert_eq!(m.len(), 2);
}

#[test]
fn zero_width_repetition_terminates() {
    assert_eq!(span("(a?)*", "b"), Some((0, 0)));
    assert_eq!(span("(?:(?=a)|\\b)*x", "x"), Some((0, 1)));
}

#[test]
fn conditionals_and_recursion() {
    let balanced = Regex::new("^(\\((?:[^()]++|(?1))*\\))$").unwrap();
    assert!(balanced.is_match("(a(b)(c(d)))"));
    assert!(!balanced.is_match("(a(b)"));

    let quoted = Regex::new("^(<)?\\w+(?(1)>)$").unwrap();
    assert!(quoted.is_match("<tag>"));
    assert!(quoted.is_match("tag"));
    assert!(!quoted.is_match("<tag"));

    let palindrome = Regex::new("^((.)(?1)\\2|.?)$").unwrap();
    assert!(palindrome.is_match("racecar"));
    assert!(palindrome.is_match("abba"));
    assert!(!palindrome.is_match("abca"));
}

#[test]
fn negative_lookaround() {
    assert_eq!(span("\\d+(?!px)\\b", "10px 20 em"), Some((5, 7)));
    assert_eq!(span("(?<!\\$)\\b\\d+", "$5 7"), Some((3, 4)));
}

#[test]
fn match_start_override() {
    let subject = "price: 42";
    let m = Regex::new("price: \\K\\d+").unwrap().find(subject).unwrap();
    assert_eq!(m.get(0).map(|c| c.as_str(subject)), Some("42"));
    assert_eq!(m.match_start_override(), Some(7));
}

#[test]
fn iteration_cap_degrades_to_no_match() {
    let subject = format!("{}b", "a".repeat(40));
    let re = Regex::builder().max_iterations(20_000).build("^(a|a)*c").unwrap();
    assert!(!re.is_match(subject.as_str()));
    let re = Regex::builder().max_iterations(20_000).build("^(a|a)*b$").unwrap();
    assert!(re.is_match(subject.as_str()));
}

#[test]
fn low_level_api() {
    let (ast, diagnostics) = parse(CodepointStream::new("b(c)"), ParseOptions::default());
    assert!(diagnostics.is_empty());
    let machine = compile(&ast, &LengthAnalysis::analyze(&ast));

    let mut stream = CodepointStream::new("abc");
    assert!(try_match(stream, &machine, 1000).is_none());
    stream.take();
    let m = try_match(stream, &machine, 1000).unwrap();
    assert_eq!((m.start(), m.end()), (1, 3));
    assert_eq!(m.get(1).map(|c| (c.start(), c.len())), Some((2, 1)));

    let mut ends = Vec::new();
    find_all(CodepointStream::new("bcbcb"), &machine, 1000, |m| ends.push(m.end()));
    assert_eq!(ends, vec![2, 4]);
}

#[test]
fn invalid_patterns_report_positions() {
    match Regex::new("ab)c{2,1}") {
        Err(Error::Parse(diagnostics)) => {
            let positions: Vec<_> = diagnostics.iter().map(|d| d.position).collect();
            assert_eq!(positions, vec![Some(2), Some(4)]);
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn unicode_subjects_and_case_folding() {
    assert_eq!(span("(?i)straße", "STRAßE"), Some((0, 6)));
    assert_eq!(span("(?i)[k]", "\u{212A}"), Some((0, 1)));
    assert_eq!(span("\\w+", "¡héllo!"), Some((1, 6)));
    assert_eq!(span("\\p{Lu}+", "abcDEFg"), Some((3, 6)));
}

#[test]
fn iteration_budget_is_per_start_position() {
    let subject = format!("{}1", "a".repeat(1_200_000));
    let m = Regex::new("\\d").unwrap().find(subject.as_str()).unwrap();
    assert_eq!(m.start(), 1_200_000);

    let subject = "ab ".repeat(400_000);
    assert_eq!(Regex::new("\\w+").unwrap().find_all(subject.as_str()).len(), 400_000);
}

#[test]
fn zero_repetition_group_defines_a_subroutine() {
    assert_eq!(span("(a){0}b(?1)", "cba"), Some((1, 3)));
    assert_eq!(span("(a){0}b(?1)", "ab"), None);
    let subject = "x=12";
    let m = Regex::new("(?<num>\\d+){0}x=(?&num)").unwrap().find(subject).unwrap();
    assert_eq!((m.start(), m.end()), (0, 4));
    assert!(m.name("num").is_none());
}
