//! Provenance tag algebra
//!
//! Every time a message traverses a port, the connection mints a
//! [`ParentId`] and appends it to the message's parents sequence. A tag has
//! the wire form `uuid:index:len`: the uuid is fresh per connection per
//! send, `index` is the message's position within the list the connection's
//! transformer produced, and `len` is that list's length (1 for an
//! untransformed send).
//!
//! Because provenance lives on the message rather than in graph state,
//! aggregators can tell when a sibling group is complete without any
//! coordination with the sender: siblings share a uuid, their indices cover
//! `0..len`, and the group key is everything before the final tag.
//!
//! # Example
//!
//! ```rust
//! use agentpipe_core::parent_id::{ParentId, longest_common_prefix, sibling_group};
//!
//! let pid: ParentId = "f47ac10b-58cc-4372-a567-0e02b2c3d479:1:3".parse().unwrap();
//! assert_eq!(pid.index(), 1);
//! assert_eq!(pid.total(), 3);
//! assert!(!pid.is_last_sibling());
//!
//! let a = vec![ParentId::mint(0, 1), ParentId::mint(0, 2)];
//! let b = vec![a[0].clone(), ParentId::mint(1, 2)];
//! assert_eq!(longest_common_prefix([a.as_slice(), b.as_slice()]), &a[..1]);
//! assert_eq!(sibling_group(&a), &a[..1]);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

/// An ordered provenance sequence, one tag per port traversal, oldest first
pub type Parents = Vec<ParentId>;

/// Errors raised when interpreting provenance tags
///
/// Malformed tags encountered during aggregation are fatal: a pipeline
/// whose provenance cannot be parsed cannot regroup its messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParentIdError {
    /// The tag does not have the `uuid:index:len` shape
    #[error("malformed parent id '{0}': expected 'uuid:index:len'")]
    Malformed(String),

    /// The tag parses but violates `0 <= index < len`, `len >= 1`
    #[error("parent id '{0}' violates index bounds (0 <= index < len, len >= 1)")]
    Bounds(String),
}

/// A single provenance tag: `uuid:index:len`
///
/// Invariants `0 <= index < len` and `len >= 1` hold for every value of
/// this type; both constructors and the parser enforce them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParentId {
    uuid: Uuid,
    index: u32,
    total: u32,
}

impl ParentId {
    /// Mint a tag with a fresh uuid
    ///
    /// # Panics
    ///
    /// Panics if `index >= total` or `total == 0`; minting out-of-range
    /// siblings is a programming error, not a runtime condition.
    pub fn mint(index: u32, total: u32) -> Self {
        Self::in_batch(Uuid::new_v4(), index, total)
    }

    /// Build a tag inside an existing send batch
    ///
    /// All siblings of one send on one connection share the batch uuid.
    ///
    /// # Panics
    ///
    /// Panics if `index >= total` or `total == 0`.
    pub fn in_batch(uuid: Uuid, index: u32, total: u32) -> Self {
        assert!(total >= 1, "sibling batch length must be at least 1");
        assert!(index < total, "sibling index {index} out of range 0..{total}");
        Self { uuid, index, total }
    }

    /// The send batch uuid
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Zero-based position within the send batch
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Total number of siblings in the send batch
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Whether this tag is the final sibling of its batch
    pub fn is_last_sibling(&self) -> bool {
        self.index == self.total - 1
    }

    /// Whether two tags belong to the same send batch
    pub fn is_sibling_of(&self, other: &ParentId) -> bool {
        self.uuid == other.uuid && self.total == other.total
    }
}

impl fmt::Display for ParentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.uuid, self.index, self.total)
    }
}

impl FromStr for ParentId {
    type Err = ParentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The uuid segment contains no ':', so split from the right.
        let malformed = || ParentIdError::Malformed(s.to_string());

        let (rest, total) = s.rsplit_once(':').ok_or_else(malformed)?;
        let (uuid, index) = rest.rsplit_once(':').ok_or_else(malformed)?;

        let uuid = Uuid::parse_str(uuid).map_err(|_| malformed())?;
        let index: u32 = index.parse().map_err(|_| malformed())?;
        let total: u32 = total.parse().map_err(|_| malformed())?;

        if total == 0 || index >= total {
            return Err(ParentIdError::Bounds(s.to_string()));
        }
        Ok(Self { uuid, index, total })
    }
}

impl Serialize for ParentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ParentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The longest sequence that is a prefix of every input sequence
///
/// Returns an empty sequence when the inputs share no common ancestor or
/// when the iterator is empty.
pub fn longest_common_prefix<'a, I>(seqs: I) -> Vec<ParentId>
where
    I: IntoIterator<Item = &'a [ParentId]>,
{
    let mut iter = seqs.into_iter();
    let Some(first) = iter.next() else {
        return Vec::new();
    };

    let mut prefix_len = first.len();
    for seq in iter {
        let shared = first
            .iter()
            .take(prefix_len)
            .zip(seq.iter())
            .take_while(|(a, b)| a == b)
            .count();
        prefix_len = prefix_len.min(shared);
        if prefix_len == 0 {
            break;
        }
    }
    first[..prefix_len].to_vec()
}

/// The first `depth` tags of a parents sequence, used as an aggregation key
pub fn group_key(parents: &[ParentId], depth: usize) -> Vec<ParentId> {
    parents[..depth.min(parents.len())].to_vec()
}

/// Everything before the final per-send tag
///
/// This is the bucket key aggregators group by: siblings of one split share
/// it exactly. Empty input yields an empty group.
pub fn sibling_group(parents: &[ParentId]) -> &[ParentId] {
    match parents.len() {
        0 => parents,
        n => &parents[..n - 1],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_and_accessors() {
        let pid = ParentId::mint(2, 5);
        assert_eq!(pid.index(), 2);
        assert_eq!(pid.total(), 5);
        assert!(!pid.is_last_sibling());
        assert!(ParentId::mint(4, 5).is_last_sibling());
        assert!(ParentId::mint(0, 1).is_last_sibling());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_mint_index_out_of_range() {
        let _ = ParentId::mint(3, 3);
    }

    #[test]
    fn test_wire_round_trip() {
        let pid = ParentId::mint(1, 4);
        let parsed: ParentId = pid.to_string().parse().unwrap();
        assert_eq!(parsed, pid);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "",
            "no-colons",
            "f47ac10b-58cc-4372-a567-0e02b2c3d479:1",
            "not-a-uuid:0:1",
            "f47ac10b-58cc-4372-a567-0e02b2c3d479:x:1",
            "f47ac10b-58cc-4372-a567-0e02b2c3d479:0:y",
            "f47ac10b-58cc-4372-a567-0e02b2c3d479:-1:2",
        ] {
            assert!(
                matches!(bad.parse::<ParentId>(), Err(ParentIdError::Malformed(_))),
                "expected malformed: {bad:?}"
            );
        }
    }

    #[test]
    fn test_parse_rejects_bounds() {
        let uuid = Uuid::new_v4();
        assert!(matches!(
            format!("{uuid}:3:3").parse::<ParentId>(),
            Err(ParentIdError::Bounds(_))
        ));
        assert!(matches!(
            format!("{uuid}:0:0").parse::<ParentId>(),
            Err(ParentIdError::Bounds(_))
        ));
    }

    #[test]
    fn test_serde_as_wire_string() {
        let pid = ParentId::mint(0, 2);
        let json = serde_json::to_string(&pid).unwrap();
        assert_eq!(json, format!("\"{pid}\""));
        let back: ParentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pid);
    }

    #[test]
    fn test_longest_common_prefix() {
        let a = ParentId::mint(0, 1);
        let b = ParentId::mint(0, 2);
        let c = ParentId::mint(1, 2);

        let s1 = vec![a.clone(), b.clone()];
        let s2 = vec![a.clone(), c.clone()];
        assert_eq!(longest_common_prefix([s1.as_slice(), s2.as_slice()]), vec![a.clone()]);

        // Identical sequences share everything.
        assert_eq!(
            longest_common_prefix([s1.as_slice(), s1.as_slice()]),
            s1.clone()
        );

        // Disjoint sequences share nothing.
        let s3 = vec![c.clone()];
        assert!(longest_common_prefix([s1.as_slice(), s3.as_slice()]).is_empty());

        // Empty input.
        assert!(longest_common_prefix(std::iter::empty::<&[ParentId]>()).is_empty());
    }

    #[test]
    fn test_group_key_and_sibling_group() {
        let parents = vec![ParentId::mint(0, 1), ParentId::mint(0, 3), ParentId::mint(2, 3)];
        assert_eq!(group_key(&parents, 2), parents[..2].to_vec());
        assert_eq!(group_key(&parents, 10), parents);
        assert_eq!(sibling_group(&parents), &parents[..2]);
        assert!(sibling_group(&[]).is_empty());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn minted_tags_respect_bounds(total in 1u32..64, seed in 0u32..64) {
                let index = seed % total;
                let pid = ParentId::mint(index, total);
                prop_assert!(pid.index() < pid.total());
                prop_assert!(pid.total() >= 1);
            }

            #[test]
            fn wire_form_round_trips(total in 1u32..64, seed in 0u32..64) {
                let pid = ParentId::mint(seed % total, total);
                let back: ParentId = pid.to_string().parse().unwrap();
                prop_assert_eq!(back, pid);
            }

            #[test]
            fn lcp_is_prefix_of_all(len_a in 0usize..6, len_b in 0usize..6, shared in 0usize..6) {
                let common: Vec<ParentId> = (0..shared).map(|_| ParentId::mint(0, 1)).collect();
                let mut a = common.clone();
                a.extend((0..len_a).map(|_| ParentId::mint(0, 1)));
                let mut b = common.clone();
                b.extend((0..len_b).map(|_| ParentId::mint(0, 1)));

                let lcp = longest_common_prefix([a.as_slice(), b.as_slice()]);
                prop_assert!(lcp.len() >= shared);
                prop_assert_eq!(&a[..lcp.len()], lcp.as_slice());
                prop_assert_eq!(&b[..lcp.len()], lcp.as_slice());
            }
        }
    }
}
