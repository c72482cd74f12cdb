//! Opaque node addresses.
//!
//! An [`Address`] identifies a node in the aggregation tree (a dispatcher or
//! a leaf worker). Addresses are totally ordered so they can be used as
//! `BTreeMap`/`HashMap` keys and compared deterministically in tests; the
//! ordering carries no topological meaning. [`Address::NULL`] is the
//! distinguished value meaning "no such neighbour" (e.g. the root dispatcher
//! has no father).

use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque, totally-ordered node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(u64);

impl Address {
    /// The distinguished "no such neighbour" address.
    pub const NULL: Address = Address(0);

    /// Wrap a raw numeric id as an [`Address`]. `0` is reserved for
    /// [`Address::NULL`]; passing it here is legal but produces a null
    /// address, matching `Address::new(0) == Address::NULL`.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Address(id)
    }

    /// Whether this address is the distinguished null value.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// The raw numeric id backing this address.
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "<null>")
        } else {
            write!(f, "node:{}", self.0)
        }
    }
}

impl From<u64> for Address {
    fn from(id: u64) -> Self {
        Address::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_address_is_distinguished() {
        assert!(Address::NULL.is_null());
        assert!(!Address::new(1).is_null());
    }

    #[test]
    fn total_order() {
        let mut addrs = vec![Address::new(3), Address::new(1), Address::new(2)];
        addrs.sort();
        assert_eq!(
            addrs,
            vec![Address::new(1), Address::new(2), Address::new(3)]
        );
    }

    #[test]
    fn display_formats_null_distinctly() {
        assert_eq!(Address::NULL.to_string(), "<null>");
        assert_eq!(Address::new(7).to_string(), "node:7");
    }
}
