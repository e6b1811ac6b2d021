use std::collections::HashSet;
use std::fmt::Display;

use tracing::warn;
use uuid::Uuid;

use super::identifier::parse_canonical;
use super::records::Table;

/// Resolve a foreign-key candidate against a key-set snapshot.
///
/// Returns the canonical key when it is present in `valid_keys`, otherwise
/// `None` and the caller substitutes its sentinel.
pub fn lookup_foreign_key(candidate: Option<&str>, valid_keys: &HashSet<Uuid>) -> Option<Uuid> {
    candidate
        .and_then(parse_canonical)
        .filter(|id| valid_keys.contains(id))
}

/// Resolve a candidate, substituting `sentinel` (with a warning naming the
/// owning record) when the reference is absent, malformed or unknown.
pub fn resolve_foreign_key(
    owner: &dyn Display,
    candidate: Option<&str>,
    valid_keys: &HashSet<Uuid>,
    sentinel: Uuid,
) -> Uuid {
    resolve_or_substitute(owner, None, candidate, valid_keys, sentinel).0
}

/// Returns the key and whether the sentinel was substituted.
fn resolve_or_substitute(
    owner: &dyn Display,
    referenced: Option<Table>,
    candidate: Option<&str>,
    valid_keys: &HashSet<Uuid>,
    sentinel: Uuid,
) -> (Uuid, bool) {
    if let Some(id) = lookup_foreign_key(candidate, valid_keys) {
        return (id, false);
    }
    warn!(
        owner = %owner,
        table = referenced.map(Table::name),
        reference = candidate.unwrap_or("<absent>"),
        %sentinel,
        "unresolved reference; assigning sentinel"
    );
    (sentinel, true)
}

/// A key-set snapshot for one referenced table plus a tally of substitutions.
///
/// The snapshot is taken once per run; references inserted by someone else
/// afterwards are not visible.
#[derive(Debug)]
pub struct ReferenceResolver<'a> {
    referenced: Table,
    valid_keys: &'a HashSet<Uuid>,
    sentinel: Uuid,
    unresolved: usize,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(referenced: Table, valid_keys: &'a HashSet<Uuid>, sentinel: Uuid) -> Self {
        Self {
            referenced,
            valid_keys,
            sentinel,
            unresolved: 0,
        }
    }

    pub fn resolve(&mut self, owner: &dyn Display, candidate: Option<&str>) -> Uuid {
        let (id, substituted) = resolve_or_substitute(
            owner,
            Some(self.referenced),
            candidate,
            self.valid_keys,
            self.sentinel,
        );
        if substituted {
            self.unresolved += 1;
        }
        id
    }

    pub fn unresolved(&self) -> usize {
        self.unresolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::identifier::SENTINEL_ID;

    #[test]
    fn known_keys_pass_through_canonicalised() {
        let id = Uuid::new_v4();
        let keys: HashSet<Uuid> = [id].into_iter().collect();
        let upper = id.to_string().to_ascii_uppercase();
        let mut resolver = ReferenceResolver::new(Table::Brands, &keys, SENTINEL_ID);
        assert_eq!(resolver.resolve(&"receipt-1", Some(&upper)), id);
        assert_eq!(
            resolve_foreign_key(&"receipt-2", Some("nope"), &keys, SENTINEL_ID),
            SENTINEL_ID
        );
        assert_eq!(resolver.unresolved(), 0);
    }

    #[test]
    fn unknown_malformed_and_absent_become_sentinel() {
        let keys: HashSet<Uuid> = [Uuid::new_v4()].into_iter().collect();
        let mut resolver = ReferenceResolver::new(Table::Users, &keys, SENTINEL_ID);
        let stranger = Uuid::new_v4().to_string();
        assert_eq!(resolver.resolve(&"r1", Some(&stranger)), SENTINEL_ID);
        assert_eq!(resolver.resolve(&"r2", Some("not-a-uuid")), SENTINEL_ID);
        assert_eq!(resolver.resolve(&"r3", None), SENTINEL_ID);
        assert_eq!(resolver.unresolved(), 3);
    }

    #[test]
    fn sentinel_in_snapshot_is_not_counted_as_unresolved() {
        let keys: HashSet<Uuid> = [SENTINEL_ID].into_iter().collect();
        let mut resolver = ReferenceResolver::new(Table::Brands, &keys, SENTINEL_ID);
        let nil = SENTINEL_ID.to_string();
        assert_eq!(resolver.resolve(&"item", Some(&nil)), SENTINEL_ID);
        assert_eq!(resolver.unresolved(), 0);
    }
}
