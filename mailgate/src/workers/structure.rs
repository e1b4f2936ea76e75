// mailgate/src/workers/structure.rs
//
// Structural / statistical features of a local part.
//
// Generated addresses tend to show one or more of:
//   - long consonant runs with no vowels ("xkqwrtz")
//   - high character-level entropy with few repeated bigrams
//   - keyboard walks ("qwerty", "asdf", "12345")
//   - many letter↔digit boundaries ("a1b2c3")
//
// Everything here is a ratio, a count, or an entropy in bits, bounded by the
// feature schema downstream.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};

const VOWELS: &[char] = &['a', 'e', 'i', 'o', 'u', 'y'];
const SEPARATORS: &[char] = &['.', '_', '-'];

/// Rows and diagonals of QWERTY/AZERTY plus digit walks, forwards and back.
const KEYBOARD_WALKS: &[&str] = &[
    "qwerty", "wertyu", "ertyui", "rtyuio", "tyuiop", "asdfgh", "sdfghj", "dfghjk",
    "fghjkl", "zxcvbn", "xcvbnm", "azerty", "qwertz", "qazwsx", "wsxedc", "1qaz2wsx",
    "ytrewq", "hgfdsa", "nbvcxz", "poiuyt", "lkjhgf", "mnbvcx", "qwer", "asdf",
    "zxcv", "1234", "2345", "3456", "4567", "5678", "6789", "7890", "0987", "9876",
    "8765", "7654", "6543", "5432", "4321",
];

fn walk_matcher() -> Option<&'static AhoCorasick> {
    static MATCHER: OnceLock<Option<AhoCorasick>> = OnceLock::new();
    MATCHER
        .get_or_init(|| {
            AhoCorasickBuilder::new()
                .match_kind(MatchKind::LeftmostLongest)
                .build(KEYBOARD_WALKS)
                .ok()
        })
        .as_ref()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuralFeatures {
    pub length: usize,
    pub digit_ratio: f64,
    pub letter_ratio: f64,
    pub special_ratio: f64,
    pub unique_char_ratio: f64,
    pub vowel_ratio: f64,
    /// Share of letters sitting in consonant runs of length ≥ 3.
    pub vowel_gap_ratio: f64,
    pub max_digit_run: usize,
    pub max_consonant_run: usize,
    pub segment_count: usize,
    pub avg_segment_length: f64,
    /// letter↔digit transitions plus separator characters.
    pub segment_boundaries: usize,
    pub shannon_entropy: f64,
    pub bigram_entropy: f64,
    pub repeated_char_ratio: f64,
    /// Characters covered by keyboard-walk matches, over total length.
    pub keyboard_walk_ratio: f64,
}

fn is_vowel(c: char) -> bool {
    VOWELS.contains(&c)
}

fn is_consonant(c: char) -> bool {
    c.is_ascii_alphabetic() && !is_vowel(c)
}

pub fn analyze(local: &str) -> StructuralFeatures {
    let chars: Vec<char> = local.chars().collect();
    let n = chars.len();
    if n <= 1 {
        return StructuralFeatures { length: n, ..Default::default() };
    }
    let nf = n as f64;

    let digits = chars.iter().filter(|c| c.is_ascii_digit()).count();
    let letters = chars.iter().filter(|c| c.is_ascii_alphabetic()).count();
    let specials = n - digits - letters;
    let vowels = chars.iter().filter(|c| is_vowel(**c)).count();
    let unique = chars.iter().collect::<HashSet<_>>().len();

    // Runs
    let max_digit_run = max_run(&chars, |c| c.is_ascii_digit());
    let max_consonant_run = max_run(&chars, is_consonant);
    let gap_letters = runs(&chars, is_consonant)
        .into_iter()
        .filter(|&len| len >= 3)
        .sum::<usize>();

    // Segments
    let segments: Vec<&str> = local.split(SEPARATORS).filter(|s| !s.is_empty()).collect();
    let avg_segment_length = if segments.is_empty() {
        0.0
    } else {
        segments.iter().map(|s| s.chars().count()).sum::<usize>() as f64 / segments.len() as f64
    };
    let separator_count = chars.iter().filter(|c| SEPARATORS.contains(c)).count();
    let class_switches = chars
        .windows(2)
        .filter(|w| {
            (w[0].is_ascii_alphabetic() && w[1].is_ascii_digit())
                || (w[0].is_ascii_digit() && w[1].is_ascii_alphabetic())
        })
        .count();

    let repeats = chars.windows(2).filter(|w| w[0] == w[1]).count();

    let walk_chars = walk_matcher()
        .map(|m| m.find_iter(local).map(|mat| mat.end() - mat.start()).sum::<usize>())
        .unwrap_or(0);

    StructuralFeatures {
        length: n,
        digit_ratio: digits as f64 / nf,
        letter_ratio: letters as f64 / nf,
        special_ratio: specials as f64 / nf,
        unique_char_ratio: unique as f64 / nf,
        vowel_ratio: if letters == 0 { 0.0 } else { vowels as f64 / letters as f64 },
        vowel_gap_ratio: if letters == 0 { 0.0 } else { gap_letters as f64 / letters as f64 },
        max_digit_run,
        max_consonant_run,
        segment_count: segments.len(),
        avg_segment_length,
        segment_boundaries: class_switches + separator_count,
        shannon_entropy: shannon_entropy(&chars),
        bigram_entropy: bigram_entropy(&chars),
        repeated_char_ratio: repeats as f64 / (nf - 1.0),
        keyboard_walk_ratio: (walk_chars as f64 / nf).min(1.0),
    }
}

fn runs(chars: &[char], pred: impl Fn(char) -> bool) -> Vec<usize> {
    let mut out = Vec::new();
    let mut cur = 0usize;
    for &c in chars {
        if pred(c) {
            cur += 1;
        } else if cur > 0 {
            out.push(cur);
            cur = 0;
        }
    }
    if cur > 0 {
        out.push(cur);
    }
    out
}

fn max_run(chars: &[char], pred: impl Fn(char) -> bool) -> usize {
    runs(chars, pred).into_iter().max().unwrap_or(0)
}

/// Shannon entropy of the character distribution, in bits.
pub fn shannon_entropy(chars: &[char]) -> f64 {
    if chars.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<char, usize> = HashMap::new();
    for &c in chars {
        *counts.entry(c).or_default() += 1;
    }
    entropy_of(counts.values().copied(), chars.len())
}

/// Shannon entropy of the bigram distribution, in bits.
pub fn bigram_entropy(chars: &[char]) -> f64 {
    if chars.len() < 2 {
        return 0.0;
    }
    let mut counts: HashMap<(char, char), usize> = HashMap::new();
    for w in chars.windows(2) {
        *counts.entry((w[0], w[1])).or_default() += 1;
    }
    entropy_of(counts.values().copied(), chars.len() - 1)
}

fn entropy_of(counts: impl Iterator<Item = usize>, total: usize) -> f64 {
    let total = total as f64;
    let mut h = 0.0f64;
    for c in counts {
        if c == 0 {
            continue;
        }
        let p = c as f64 / total;
        h -= p * p.log2();
    }
    h.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_input_is_neutral() {
        assert_eq!(analyze(""), StructuralFeatures::default());
        let one = analyze("a");
        assert_eq!(one.length, 1);
        assert_eq!(one.shannon_entropy, 0.0);
        assert_eq!(one.digit_ratio, 0.0);
    }

    #[test]
    fn ratios_and_runs() {
        let f = analyze("john.smith42");
        assert_eq!(f.length, 12);
        assert!((f.digit_ratio - 2.0 / 12.0).abs() < 1e-9);
        assert!((f.special_ratio - 1.0 / 12.0).abs() < 1e-9);
        assert_eq!(f.max_digit_run, 2);
        assert_eq!(f.segment_count, 2);
        // "h" -> "4" switch + one separator
        assert_eq!(f.segment_boundaries, 2);
        assert_eq!(f.max_consonant_run, 2); // "th"
    }

    #[test]
    fn consonant_clusters_raise_vowel_gap() {
        let natural = analyze("katherine");
        let mashed = analyze("xkqzrtwpl");
        assert_eq!(natural.vowel_gap_ratio, 0.0);
        assert!((mashed.vowel_gap_ratio - 1.0).abs() < 1e-9);
        assert_eq!(mashed.max_consonant_run, 9);
    }

    #[test]
    fn keyboard_walks_are_detected() {
        assert!(analyze("qwerty123").keyboard_walk_ratio > 0.5);
        assert_eq!(analyze("margaret").keyboard_walk_ratio, 0.0);
    }

    #[test]
    fn entropy_is_zero_for_repeated_char() {
        let chars: Vec<char> = "aaaa".chars().collect();
        assert_eq!(shannon_entropy(&chars), 0.0);
        assert_eq!(bigram_entropy(&chars), 0.0);
        assert!((analyze("aaaa").repeated_char_ratio - 1.0).abs() < 1e-9);
    }

    #[test]
    fn entropy_of_uniform_four_symbols_is_two_bits() {
        let chars: Vec<char> = "abcd".chars().collect();
        assert!((shannon_entropy(&chars) - 2.0).abs() < 1e-9);
    }
}
