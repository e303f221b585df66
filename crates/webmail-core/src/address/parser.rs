//! Free-form recipient text parsing.

use serde::{Deserialize, Serialize};

/// Characters that separate recipients in a free-form field.
const SEPARATORS: [char; 3] = [',', ';', '\n'];

/// Error returned when a string is not a valid email address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid email address: {0}")]
pub struct InvalidAddress(pub String);

/// A syntactically valid email address.
///
/// Can only be constructed through validation, so holding one is proof that
/// the address passed [`is_valid_email`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Validates and wraps an address. Surrounding whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress` if the address does not match the grammar.
    pub fn new(address: impl AsRef<str>) -> Result<Self, InvalidAddress> {
        let address = address.as_ref().trim();
        if is_valid_email(address) {
            Ok(Self(address.to_string()))
        } else {
            Err(InvalidAddress(address.to_string()))
        }
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the domain part.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.rsplit_once('@').map_or("", |(_, domain)| domain)
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = InvalidAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EmailAddress> for String {
    fn from(address: EmailAddress) -> Self {
        address.0
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An address with the display name it was typed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name, quotes removed.
    pub name: Option<String>,
    /// Validated address.
    pub address: EmailAddress,
}

/// Parses a free-form recipient field into validated addresses.
///
/// Segments are separated by `,`, `;` or newlines. A segment written as
/// `Display Name <address>` contributes only the bracketed address. Invalid
/// segments are dropped; the remaining addresses keep their input order and
/// duplicates are preserved.
#[must_use]
pub fn parse_multiple_emails(input: &str) -> Vec<String> {
    segments(input)
        .map(|segment| split_display_name(segment).1)
        .filter(|address| is_valid_email(address))
        .map(str::to_string)
        .collect()
}

/// Like [`parse_multiple_emails`] but keeps display names.
#[must_use]
pub fn parse_mailboxes(input: &str) -> Vec<Mailbox> {
    segments(input)
        .filter_map(|segment| {
            let (name, address) = split_display_name(segment);
            let address = EmailAddress::new(address).ok()?;
            Some(Mailbox {
                name: name.map(str::to_string),
                address,
            })
        })
        .collect()
}

fn segments(input: &str) -> impl Iterator<Item = &str> {
    input
        .split(SEPARATORS)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
}

/// Splits `"Name" <addr>` into its name and address halves.
fn split_display_name(segment: &str) -> (Option<&str>, &str) {
    let Some(open) = segment.strip_suffix('>').and_then(|s| s.rfind('<')) else {
        return (None, segment);
    };

    let address = segment[open + 1..segment.len() - 1].trim();
    let name = segment[..open].trim().trim_matches('"').trim();
    ((!name.is_empty()).then_some(name), address)
}

/// Checks an address against the accepted email grammar.
///
/// The local part is either a quoted string or dot-separated atoms. The
/// domain is either a bracketed IPv4 literal or at least two dot-separated
/// labels, the last of which is two or more letters.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };

    is_valid_local_part(local) && is_valid_domain(domain)
}

fn is_valid_local_part(local: &str) -> bool {
    if local.len() >= 3 && local.starts_with('"') && local.ends_with('"') {
        return !local.contains('\n');
    }

    !local.is_empty()
        && local
            .split('.')
            .all(|atom| !atom.is_empty() && atom.chars().all(is_atom_char))
}

fn is_atom_char(c: char) -> bool {
    !c.is_whitespace()
        && !matches!(
            c,
            '<' | '>' | '(' | ')' | '[' | ']' | '\\' | '.' | ',' | ';' | ':' | '@' | '"'
        )
}

fn is_valid_domain(domain: &str) -> bool {
    if let Some(literal) = domain.strip_prefix('[').and_then(|d| d.strip_suffix(']')) {
        let octets: Vec<&str> = literal.split('.').collect();
        return octets.len() == 4
            && octets
                .iter()
                .all(|o| (1..=3).contains(&o.len()) && o.bytes().all(|b| b.is_ascii_digit()));
    }

    let labels: Vec<&str> = domain.split('.').collect();
    let Some((tld, rest)) = labels.split_last() else {
        return false;
    };

    !rest.is_empty()
        && rest.iter().all(|label| {
            !label.is_empty()
                && label
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
        && tld.len() >= 2
        && tld.bytes().all(|b| b.is_ascii_alphabetic())
}
