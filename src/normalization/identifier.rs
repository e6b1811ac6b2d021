use uuid::Uuid;

/// Reserved key standing in for "unknown user" / "unknown brand" references.
pub const SENTINEL_ID: Uuid = Uuid::nil();

/// What to do with a candidate that is not a canonical identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnInvalid {
    /// Mint a fresh random identifier (insert path).
    Generate,
    /// Report the candidate as invalid (audit path).
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identifier {
    /// The candidate parsed; the value is canonicalised.
    Valid(Uuid),
    /// The candidate was absent or malformed and a new key was minted.
    Generated(Uuid),
    /// The candidate was absent or malformed and the caller asked not to repair it.
    Invalid,
}

impl Identifier {
    pub fn key(self) -> Option<Uuid> {
        match self {
            Identifier::Valid(id) | Identifier::Generated(id) => Some(id),
            Identifier::Invalid => None,
        }
    }
}

/// Parse a candidate into a canonical UUID. Hyphenated, simple, braced and urn
/// spellings are accepted in any case; the result renders lowercase hyphenated.
pub fn parse_canonical(candidate: &str) -> Option<Uuid> {
    Uuid::try_parse(candidate.trim()).ok()
}

pub fn validate_identifier(candidate: Option<&str>, on_invalid: OnInvalid) -> Identifier {
    match candidate.and_then(parse_canonical) {
        Some(id) => Identifier::Valid(id),
        None => match on_invalid {
            OnInvalid::Generate => Identifier::Generated(Uuid::new_v4()),
            OnInvalid::Reject => Identifier::Invalid,
        },
    }
}
