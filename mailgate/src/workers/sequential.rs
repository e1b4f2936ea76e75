// mailgate/src/workers/sequential.rs
//
// Sequential pattern detection: "<base><trailing number>".
//
// Bulk signup scripts mint addresses by incrementing a counter on a fixed
// stem (user1, user2, … user123). A single trailing number is weak evidence
// on its own; it becomes strong when the run is long, zero-padded
// (user007), monotonic (123, 987), a repeated digit (111), or sits on a
// generic stem (user, test, info). Four-digit runs that look like a year are
// discounted here because the dated analyzer scores them.

const GENERIC_STEMS: &[&str] = &[
    "user", "test", "info", "admin", "account", "mail", "email", "temp", "demo",
    "sample", "guest", "name", "abc", "qwerty", "signup", "member", "customer",
    "client", "new", "my", "acc", "bot", "noreply", "support", "hello",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequentialPattern {
    pub base: String,
    pub digits: String,
    pub has_leading_zeros: bool,
    pub is_monotonic: bool,
    pub confidence: f64,
}

impl SequentialPattern {
    pub fn trailing_digit_count(&self) -> usize {
        self.digits.len()
    }
}

pub fn analyze(local: &str) -> SequentialPattern {
    if local.chars().count() <= 1 {
        return SequentialPattern::default();
    }

    let digits: String = {
        let rev: String = local.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
        rev.chars().rev().collect()
    };
    if digits.is_empty() {
        return SequentialPattern::default();
    }

    let base = local[..local.len() - digits.len()]
        .trim_end_matches(|c: char| c == '.' || c == '_' || c == '-')
        .to_string();
    let d: Vec<u8> = digits.bytes().map(|b| b - b'0').collect();

    let mut confidence: f64 = match d.len() {
        1 => 0.15,
        2 => 0.30,
        3 => 0.45,
        4 => 0.50,
        _ => 0.60,
    };

    let is_monotonic = d.len() >= 3
        && (d.windows(2).all(|w| w[1] == w[0] + 1) || d.windows(2).all(|w| w[0] == w[1] + 1));
    let repeated = d.len() >= 3 && d.iter().all(|&x| x == d[0]);
    let has_leading_zeros = d.len() >= 2 && d[0] == 0;

    if is_monotonic {
        confidence += 0.20;
    }
    if repeated {
        confidence += 0.15;
    }
    if has_leading_zeros {
        confidence += 0.15;
    }

    let stem = base.trim_matches(|c: char| !c.is_ascii_alphabetic());
    if GENERIC_STEMS.contains(&stem) {
        confidence += 0.10;
    } else if !stem.is_empty() && stem.len() <= 2 {
        confidence += 0.05;
    }

    if looks_like_year(&d) {
        confidence -= 0.25;
    }

    SequentialPattern {
        base,
        digits,
        has_leading_zeros,
        is_monotonic,
        confidence: confidence.clamp(0.0, 1.0),
    }
}

fn looks_like_year(d: &[u8]) -> bool {
    if d.len() != 4 {
        return false;
    }
    let year = d.iter().fold(0u32, |acc, &x| acc * 10 + x as u32);
    (1900..=2099).contains(&year)
}
