/// Type alias for hash maps used across the library.
pub type HashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;

/// Type alias for hash sets used across the library.
pub type HashSet<V> = std::collections::HashSet<V, ahash::RandomState>;

/// Type alias for insertion-ordered maps, used where iteration order is observable by peers.
pub type IndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

/// Type alias for insertion-ordered sets.
pub type IndexSet<V> = indexmap::IndexSet<V, ahash::RandomState>;
