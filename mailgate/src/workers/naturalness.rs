// mailgate/src/workers/naturalness.rs
//
// Linguistic naturalness: how much a local part reads like human language.
//
// The letters-only segments of the local part are cut into bigrams and
// trigrams; each n-gram is looked up in a reference table of frequent English
// and given-name n-grams. The hit-rates are blended into a naturalness score,
// and confidence grows with sample length: three letters say very little,
// eight or more are enough to trust the estimate.

use std::collections::HashSet;
use std::sync::OnceLock;

/// Letters at which confidence saturates.
const FULL_CONFIDENCE_LETTERS: f64 = 8.0;

const BIGRAM_WEIGHT: f64 = 0.6;
const TRIGRAM_WEIGHT: f64 = 0.4;

const COMMON_BIGRAMS: &[&str] = &[
    "th", "he", "in", "er", "an", "re", "on", "at", "en", "nd", "ti", "es", "or", "te",
    "of", "ed", "is", "it", "al", "ar", "st", "to", "nt", "ng", "se", "ha", "as", "ou",
    "io", "le", "ve", "co", "me", "de", "hi", "ri", "ro", "ic", "ne", "ea", "ra", "ce",
    "li", "ch", "ll", "be", "ma", "si", "om", "ur", "ca", "el", "ta", "la", "ns", "ge",
    "ly", "ei", "os", "no", "pe", "do", "su", "pa", "ec", "ac", "ot", "di", "ol", "tr",
    "sh", "ke", "ck", "ie", "mi", "ai", "ia", "na", "ni", "ja", "jo", "ss", "ow", "em",
    "am", "ad", "il", "ay", "ey", "ki", "ka", "ho", "mo", "wa", "lo", "da", "sa", "ry",
    "us", "un", "et", "ia", "ab", "ee", "oo", "ag", "ig", "ut", "ir", "ew", "ev", "av",
    "ob", "ru", "ga", "go", "ba", "bo", "bi", "vi", "ci", "fa", "fe", "fi", "fo", "ph",
    "wi", "we", "wo", "ya", "yo", "za", "ze", "zo", "ex", "id", "od", "ud", "ex", "ck",
];

const COMMON_TRIGRAMS: &[&str] = &[
    "the", "and", "ing", "ion", "tio", "ent", "ati", "for", "her", "ter", "hat", "tha",
    "ere", "ate", "his", "con", "res", "ver", "all", "ons", "nce", "men", "ith", "ted",
    "ers", "pro", "thi", "wit", "are", "ess", "not", "ive", "was", "ect", "rea", "com",
    "eve", "per", "int", "est", "sta", "cti", "ica", "ist", "ear", "ain", "one", "our",
    "iti", "rat", "ell", "ant", "son", "man", "ber", "der", "ana", "ari", "eli", "ill",
    "ick", "sen", "ina", "mar", "ert", "ric", "iel", "ael", "san", "han", "ton", "hel",
    "lin", "ley", "ian", "ris", "ren", "len", "ken", "ane", "ene", "ine", "ona", "lla",
    "ott", "ett", "ard", "son", "ela", "ale", "rie", "ola", "ose", "ore", "ame", "ath",
    "she", "sha", "joh", "ohn", "mic", "cha", "dav", "avi", "vid", "sar", "ara", "lau",
    "aur", "ura", "ben", "emi", "mil", "ily", "jes", "oli", "liv", "via", "tom", "kat",
    "rob", "obe", "nic", "ole", "mas", "hom", "ami", "and", "ann", "nna", "ler", "lor",
];

fn table(words: &'static [&'static str]) -> HashSet<&'static str> {
    words.iter().copied().collect()
}

fn bigrams() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| table(COMMON_BIGRAMS))
}

fn trigrams() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| table(COMMON_TRIGRAMS))
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Naturalness {
    pub bigram_hit_rate: f64,
    pub trigram_hit_rate: f64,
    /// Blended hit-rate in [0,1]; 1 = reads like a name or word.
    pub score: f64,
    /// How much to trust `score`, in [0,1].
    pub confidence: f64,
    /// `(1 - score) * confidence`.
    pub gibberish_risk: f64,
}

pub fn analyze(local: &str) -> Naturalness {
    let segments: Vec<String> = local
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase())
        .collect();

    let letters: usize = segments.iter().map(|s| s.len()).sum();
    if letters < 2 {
        return Naturalness::default();
    }

    let (bi_hits, bi_total) = hit_rate(&segments, 2, bigrams());
    let (tri_hits, tri_total) = hit_rate(&segments, 3, trigrams());

    let bigram_hit_rate = ratio(bi_hits, bi_total);
    let trigram_hit_rate = ratio(tri_hits, tri_total);
    let score = if tri_total == 0 {
        bigram_hit_rate
    } else {
        BIGRAM_WEIGHT * bigram_hit_rate + TRIGRAM_WEIGHT * trigram_hit_rate
    };
    let confidence = (letters as f64 / FULL_CONFIDENCE_LETTERS).min(1.0);

    Naturalness {
        bigram_hit_rate,
        trigram_hit_rate,
        score,
        confidence,
        gibberish_risk: ((1.0 - score) * confidence).clamp(0.0, 1.0),
    }
}

fn hit_rate(segments: &[String], n: usize, table: &HashSet<&'static str>) -> (usize, usize) {
    let mut hits = 0;
    let mut total = 0;
    for seg in segments {
        // Segments are ASCII letters only, so byte slicing is char slicing.
        if seg.len() < n {
            continue;
        }
        for i in 0..=(seg.len() - n) {
            total += 1;
            if table.contains(&seg[i..i + n]) {
                hits += 1;
            }
        }
    }
    (hits, total)
}

fn ratio(hits: usize, total: usize) -> f64 {
    if total == 0 { 0.0 } else { hits as f64 / total as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_read_naturally() {
        let n = analyze("katherine.anderson");
        assert!(n.score > 0.6, "score={}", n.score);
        assert_eq!(n.confidence, 1.0);
        assert!(n.gibberish_risk < 0.4);
    }

    #[test]
    fn mashed_keys_are_gibberish() {
        let n = analyze("xqzjvkwpfg");
        assert!(n.score < 0.15, "score={}", n.score);
        assert!(n.gibberish_risk > 0.8);
    }

    #[test]
    fn short_samples_have_low_confidence() {
        let n = analyze("xq");
        assert!((n.confidence - 0.25).abs() < 1e-9);
        assert!(n.gibberish_risk <= 0.25);
    }

    #[test]
    fn degenerate_input_is_neutral() {
        assert_eq!(analyze(""), Naturalness::default());
        assert_eq!(analyze("a"), Naturalness::default());
        assert_eq!(analyze("12345"), Naturalness::default());
    }

    #[test]
    fn digits_split_segments() {
        // "an" + "na": both common bigrams, no cross-digit bigram "n1".
        let n = analyze("an1na");
        assert_eq!(n.bigram_hit_rate, 1.0);
    }
}
