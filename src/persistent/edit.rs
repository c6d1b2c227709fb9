//! Generation tags for transient batches.
//!
//! Every transient owns a fresh [`EditToken`]. Nodes created while that
//! transient is live carry its token and may be mutated in place by it;
//! nodes carrying any other token are copied before they are touched.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Identifies the batch that allocated a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct EditToken(u64);

impl EditToken {
    /// Token carried by nodes created through persistent operations.
    pub(crate) const PERSISTENT: Self = Self(0);

    /// Allocates a token that no other batch has ever held.
    pub(crate) fn fresh() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub(crate) const fn is_persistent(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if a node stamped with `stamp` belongs to this batch.
    #[inline]
    pub(crate) const fn owns(self, stamp: Self) -> bool {
        !self.is_persistent() && self.0 == stamp.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_fresh_tokens_are_distinct() {
        let first = EditToken::fresh();
        let second = EditToken::fresh();
        assert_ne!(first, second);
        assert!(!first.is_persistent());
    }

    #[rstest]
    fn test_owns_only_own_stamp() {
        let token = EditToken::fresh();
        assert!(token.owns(token));
        assert!(!token.owns(EditToken::fresh()));
        assert!(!token.owns(EditToken::PERSISTENT));
        assert!(!EditToken::PERSISTENT.owns(EditToken::PERSISTENT));
    }
}
