use std::{
    fmt::Display,
    sync::atomic::{
        AtomicU64,
        Ordering,
    },
};

use serde::{
    Deserialize,
    Serialize,
    de::{
        Unexpected,
        Visitor,
    },
};
use thiserror::Error;

/// An integer ID, used for identification of resources and requests.
///
/// WAMP restricts IDs to `[1, 2^53]` so that they are exactly representable in IEEE-754 doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Id(u64);

impl Id {
    /// The minimum allowable value of an ID.
    pub const MIN: Id = Id(1);

    /// The maximum allowable value of an ID.
    pub const MAX: Id = Id(1 << 53);

    /// The raw integer value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for Id {
    fn default() -> Self {
        Id::MIN
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Error for an ID being out of range.
#[derive(Debug, Error)]
#[error("{value} is out of range for IDs")]
pub struct IdOutOfRange {
    value: u64,
}

impl IdOutOfRange {
    fn new(value: u64) -> Self {
        Self { value }
    }
}

impl TryFrom<u64> for Id {
    type Error = IdOutOfRange;
    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value < Self::MIN.0 || value > Self::MAX.0 {
            Err(IdOutOfRange::new(value))
        } else {
            Ok(Id(value))
        }
    }
}

struct IdVisitor;

impl<'de> Visitor<'de> for IdVisitor {
    type Value = Id;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            "an unsigned integer in the range [{}, {}]",
            Id::MIN,
            Id::MAX
        )
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Id::try_from(v).map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        u64::try_from(v)
            .ok()
            .and_then(|v| Id::try_from(v).ok())
            .ok_or_else(|| E::invalid_value(Unexpected::Signed(v), &self))
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_u64(IdVisitor)
    }
}

/// An ID allocator.
pub trait IdAllocator: Send + Sync {
    /// Generates a new ID.
    fn generate_id(&self) -> Id;
}

/// An ID allocator that generates IDs sequentially, starting at [`Id::MIN`].
///
/// The sequence wraps back to [`Id::MIN`] after [`Id::MAX`]. With 2^53 values available, a live ID
/// is never handed out twice in practice.
#[derive(Debug)]
pub struct SequentialIdAllocator {
    next: AtomicU64,
}

impl Default for SequentialIdAllocator {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(Id::MIN.0),
        }
    }
}

impl IdAllocator for SequentialIdAllocator {
    fn generate_id(&self) -> Id {
        let mut current = self.next.load(Ordering::Relaxed);
        loop {
            let next = if current >= Id::MAX.0 {
                Id::MIN.0
            } else {
                current + 1
            };
            match self.next.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Id(current),
                Err(actual) => current = actual,
            }
        }
    }
}

/// The scope an ID is unique within, for IDs owned by a realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdScope {
    Subscription,
    Registration,
    Publication,
    Invocation,
}

/// A generator of realm-scoped IDs.
///
/// Every scope has its own sequence, so a subscription and a registration may share the same
/// numeric ID.
#[derive(Debug, Default)]
pub struct ScopedIdGenerator {
    subscriptions: SequentialIdAllocator,
    registrations: SequentialIdAllocator,
    publications: SequentialIdAllocator,
    invocations: SequentialIdAllocator,
}

impl ScopedIdGenerator {
    /// Generates the next ID for the scope.
    pub fn next_id(&self, scope: IdScope) -> Id {
        match scope {
            IdScope::Subscription => self.subscriptions.generate_id(),
            IdScope::Registration => self.registrations.generate_id(),
            IdScope::Publication => self.publications.generate_id(),
            IdScope::Invocation => self.invocations.generate_id(),
        }
    }
}

#[cfg(test)]
mod id_test {
    use crate::core::id::{
        Id,
        IdAllocator,
        IdScope,
        ScopedIdGenerator,
        SequentialIdAllocator,
    };

    #[test]
    fn fails_deserialization_out_of_range() {
        assert_matches::assert_matches!(serde_json::from_str::<Id>(r#"0"#), Err(err) => {
            assert!(err.to_string().contains("expected an unsigned integer in the range"));
        });
        assert_matches::assert_matches!(serde_json::from_str::<Id>(r#"9007199254740993"#), Err(err) => {
            assert!(err.to_string().contains("expected an unsigned integer in the range"));
        });
        assert_matches::assert_matches!(serde_json::from_str::<Id>(r#"-4"#), Err(_));
    }

    #[test]
    fn deserializes_id_in_range() {
        assert_matches::assert_matches!(serde_json::from_str::<Id>(r#"9007199254740992"#), Ok(id) => {
            assert_eq!(id, Id::MAX);
        });
    }

    #[test]
    fn sequential_allocator_counts_up_from_one() {
        let allocator = SequentialIdAllocator::default();
        let ids = (0..4)
            .map(|_| allocator.generate_id().value())
            .collect::<Vec<_>>();
        pretty_assertions::assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn sequential_allocator_wraps_to_minimum() {
        let allocator = SequentialIdAllocator::default();
        allocator
            .next
            .store(Id::MAX.value(), std::sync::atomic::Ordering::Relaxed);
        assert_eq!(allocator.generate_id(), Id::MAX);
        assert_eq!(allocator.generate_id(), Id::MIN);
    }

    #[test]
    fn scopes_are_independent() {
        let generator = ScopedIdGenerator::default();
        assert_eq!(generator.next_id(IdScope::Subscription).value(), 1);
        assert_eq!(generator.next_id(IdScope::Subscription).value(), 2);
        assert_eq!(generator.next_id(IdScope::Registration).value(), 1);
        assert_eq!(generator.next_id(IdScope::Publication).value(), 1);
        assert_eq!(generator.next_id(IdScope::Invocation).value(), 1);
        assert_eq!(generator.next_id(IdScope::Registration).value(), 2);
    }
}
