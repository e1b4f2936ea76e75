// mailgate/src/email.rs
//
// Address parsing + provider normalization.
//
// Normalization rules:
//   - whole address lower-cased and trimmed
//   - "+tag" sub-addressing stripped for every provider
//   - dots removed for providers that ignore them (gmail / googlemail)
//   - googlemail.com folded into gmail.com
//
// The analyzers only ever see `normalized_local`.

use crate::error::InputError;

const MAX_LOCAL: usize = 64;
const MAX_ADDRESS: usize = 254;

const DOTLESS_PROVIDERS: &[&str] = &["gmail.com", "googlemail.com"];

/// Characters accepted in a local part (RFC 5322 atext plus '.').
const LOCAL_SPECIALS: &str = ".!#$%&'*+/=?^_`{|}~-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEmail {
    /// Lower-cased, trimmed input.
    pub address: String,
    /// Local part as submitted (lower-cased).
    pub local_part: String,
    /// Local part after provider normalization.
    pub normalized_local: String,
    pub domain: String,
    pub tld: String,
    pub plus_tag: Option<String>,
}

impl ParsedEmail {
    /// Canonical address used for deduplication.
    pub fn canonical(&self) -> String {
        format!("{}@{}", self.normalized_local, self.domain)
    }

    /// Number of labels below the registrable domain (`a.b.example.com` → 2).
    pub fn subdomain_depth(&self) -> usize {
        self.domain.split('.').count().saturating_sub(2)
    }
}

pub fn parse(raw: &str) -> Result<ParsedEmail, InputError> {
    let address = raw.trim().to_lowercase();
    if address.is_empty() {
        return Err(InputError::Empty);
    }
    if address.chars().count() > MAX_ADDRESS {
        return Err(InputError::TooLong { max: MAX_ADDRESS });
    }

    let (local, domain) = address.rsplit_once('@').ok_or(InputError::MissingAt)?;
    if local.is_empty() {
        return Err(InputError::EmptyLocalPart);
    }
    if domain.is_empty() {
        return Err(InputError::EmptyDomain);
    }
    if local.chars().count() > MAX_LOCAL {
        return Err(InputError::LocalPartTooLong { max: MAX_LOCAL });
    }
    if let Some(ch) = local
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || LOCAL_SPECIALS.contains(*c)))
    {
        return Err(InputError::InvalidLocalChar { ch });
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return Err(InputError::InvalidLocalChar { ch: '.' });
    }

    validate_domain(domain)?;

    let domain = if domain == "googlemail.com" { "gmail.com".to_string() } else { domain.to_string() };
    let tld = domain.rsplit('.').next().unwrap_or_default().to_string();

    let (base, plus_tag) = match local.split_once('+') {
        Some((b, tag)) => (b, Some(tag.to_string())),
        None => (local, None),
    };
    if base.is_empty() {
        return Err(InputError::EmptyLocalPart);
    }

    let normalized_local = if DOTLESS_PROVIDERS.contains(&domain.as_str()) {
        base.replace('.', "")
    } else {
        base.to_string()
    };
    if normalized_local.is_empty() {
        return Err(InputError::EmptyLocalPart);
    }

    Ok(ParsedEmail {
        local_part: local.to_string(),
        normalized_local,
        domain,
        tld,
        plus_tag,
        address,
    })
}

fn validate_domain(domain: &str) -> Result<(), InputError> {
    let invalid = || InputError::InvalidDomain(domain.to_string());
    if domain.len() > 253 || !domain.contains('.') {
        return Err(invalid());
    }
    for label in domain.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(invalid());
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid());
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(invalid());
        }
    }
    // TLD must contain a letter.
    let tld = domain.rsplit('.').next().unwrap_or_default();
    if !tld.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gmail_dots_and_plus_tags_are_normalized() {
        let p = parse("  Person.Surname+News@GoogleMail.com ").unwrap();
        assert_eq!(p.domain, "gmail.com");
        assert_eq!(p.local_part, "person.surname+news");
        assert_eq!(p.normalized_local, "personsurname");
        assert_eq!(p.plus_tag.as_deref(), Some("news"));
        assert_eq!(p.canonical(), "personsurname@gmail.com");
    }

    #[test]
    fn other_providers_keep_dots() {
        let p = parse("first.last@example.org").unwrap();
        assert_eq!(p.normalized_local, "first.last");
        assert_eq!(p.tld, "org");
        assert_eq!(p.subdomain_depth(), 0);
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert_eq!(parse(""), Err(InputError::Empty));
        assert_eq!(parse("no-at-sign"), Err(InputError::MissingAt));
        assert_eq!(parse("@example.com"), Err(InputError::EmptyLocalPart));
        assert_eq!(parse("+tag@example.com"), Err(InputError::EmptyLocalPart));
        assert_eq!(parse("user@"), Err(InputError::EmptyDomain));
        assert!(matches!(parse("user@localhost"), Err(InputError::InvalidDomain(_))));
        assert!(matches!(parse("user@-bad.com"), Err(InputError::InvalidDomain(_))));
        assert!(matches!(parse("user@example.123"), Err(InputError::InvalidDomain(_))));
        assert!(matches!(parse("us er@example.com"), Err(InputError::InvalidLocalChar { .. })));
        assert!(matches!(parse("a..b@example.com"), Err(InputError::InvalidLocalChar { .. })));
    }

    #[test]
    fn gmail_local_of_only_dots_is_rejected() {
        // ".@gmail.com" fails the leading-dot rule before normalization.
        assert!(parse(".@gmail.com").is_err());
    }

    #[test]
    fn length_limits() {
        let long_local = "a".repeat(65);
        assert_eq!(
            parse(&format!("{}@example.com", long_local)),
            Err(InputError::LocalPartTooLong { max: 64 })
        );
        let long_domain = format!("{}.com", "d".repeat(250));
        assert_eq!(
            parse(&format!("user@{}", long_domain)),
            Err(InputError::TooLong { max: 254 })
        );
    }

    #[test]
    fn subdomain_depth_counts_extra_labels() {
        let p = parse("x@mail.eu.example.com").unwrap();
        assert_eq!(p.subdomain_depth(), 2);
    }
}
