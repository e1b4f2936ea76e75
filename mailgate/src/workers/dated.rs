// mailgate/src/workers/dated.rs
//
// Dated pattern detection: year-like numbers inside the local part.
//
// A year is not suspicious in itself: "maria1987" is how millions of real
// people pick an address. What matters is *which* year relative to the
// request date:
//
//   future      year > reference            0.90  (timestamps, junk)
//   recent      reference-1 ..= reference   0.85  (batch minted this year)
//   too_young   2 ..= 16 years ago          0.60  (not a plausible adult)
//   birth_year  17 ..= 100 years ago        0.15  (ordinary human choice)
//   ancient     > 100 years ago             0.40
//
// Candidates: maximal digit runs of exactly 4 digits in 1800..=2099, and
// 8-digit runs that parse as YYYYMMDD or DDMMYYYY / MMDDYYYY.
// The reference year comes from the request timestamp, not the wall clock.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum YearClass {
    Future,
    Recent,
    TooYoung,
    BirthYear,
    Ancient,
}

impl YearClass {
    pub fn confidence(self) -> f64 {
        match self {
            Self::Future => 0.90,
            Self::Recent => 0.85,
            Self::TooYoung => 0.60,
            Self::BirthYear => 0.15,
            Self::Ancient => 0.40,
        }
    }
}

pub fn classify_year(year: i32, reference_year: i32) -> YearClass {
    let age = reference_year - year;
    if age < 0 {
        YearClass::Future
    } else if age <= 1 {
        YearClass::Recent
    } else if age <= 16 {
        YearClass::TooYoung
    } else if age <= 100 {
        YearClass::BirthYear
    } else {
        YearClass::Ancient
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatedPattern {
    /// Year behind the highest-confidence match.
    pub year: Option<i32>,
    pub class: Option<YearClass>,
    pub year_count: usize,
    pub confidence: f64,
}

pub fn analyze(local: &str, reference_year: i32) -> DatedPattern {
    if local.chars().count() <= 1 {
        return DatedPattern::default();
    }

    let years: Vec<i32> = digit_runs(local).into_iter().filter_map(year_in_run).collect();

    let mut out = DatedPattern { year_count: years.len(), ..Default::default() };
    for year in years {
        let class = classify_year(year, reference_year);
        if out.class.is_none() || class.confidence() > out.confidence {
            out.year = Some(year);
            out.class = Some(class);
            out.confidence = class.confidence();
        }
    }
    out
}

fn digit_runs(s: &str) -> Vec<&str> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in s.char_indices() {
        match (c.is_ascii_digit(), start) {
            (true, None) => start = Some(i),
            (false, Some(st)) => {
                runs.push(&s[st..i]);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(st) = start {
        runs.push(&s[st..]);
    }
    runs
}

fn year_like(s: &str) -> Option<i32> {
    let y: i32 = s.parse().ok()?;
    (1800..=2099).contains(&y).then_some(y)
}

fn valid_month_day(month: &str, day: &str) -> bool {
    matches!((month.parse::<u32>(), day.parse::<u32>()),
             (Ok(m), Ok(d)) if (1..=12).contains(&m) && (1..=31).contains(&d))
}

fn year_in_run(run: &str) -> Option<i32> {
    match run.len() {
        4 => year_like(run),
        8 => {
            // YYYYMMDD
            if let Some(y) = year_like(&run[..4]) {
                if valid_month_day(&run[4..6], &run[6..]) {
                    return Some(y);
                }
            }
            // DDMMYYYY or MMDDYYYY
            let y = year_like(&run[4..])?;
            let (a, b) = (&run[..2], &run[2..4]);
            (valid_month_day(b, a) || valid_month_day(a, b)).then_some(y)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn birth_years_are_low_risk() {
        let d = analyze("name1990", 2025);
        assert_eq!(d.year, Some(1990));
        assert_eq!(d.class, Some(YearClass::BirthYear));
        assert!(d.confidence < 0.3);
    }

    #[test]
    fn current_year_is_high_risk() {
        for reference in [2025, 2026] {
            let d = analyze("name2025", reference);
            assert_eq!(d.class, Some(YearClass::Recent));
            assert!(d.confidence > 0.8);
        }
    }

    #[test]
    fn classification_bands() {
        assert_eq!(classify_year(2030, 2025), YearClass::Future);
        assert_eq!(classify_year(2024, 2025), YearClass::Recent);
        assert_eq!(classify_year(2015, 2025), YearClass::TooYoung);
        assert_eq!(classify_year(2008, 2025), YearClass::BirthYear);
        assert_eq!(classify_year(1925, 2025), YearClass::BirthYear);
        assert_eq!(classify_year(1899, 2025), YearClass::Ancient);
    }

    #[test]
    fn eight_digit_dates() {
        assert_eq!(analyze("jo19870412", 2025).year, Some(1987));
        assert_eq!(analyze("jo12041987", 2025).year, Some(1987));
        assert_eq!(analyze("jo20251301", 2025).year, None); // month 13, and "1301" not a year
    }

    #[test]
    fn highest_confidence_year_wins() {
        let d = analyze("a1985b2025", 2025);
        assert_eq!(d.year_count, 2);
        assert_eq!(d.year, Some(2025));
    }

    #[test]
    fn non_year_runs_are_ignored() {
        assert_eq!(analyze("user12345", 2025), DatedPattern::default());
        assert_eq!(analyze("agent7777", 2025), DatedPattern::default());
        assert_eq!(analyze("", 2025), DatedPattern::default());
    }
}
