//! Fast hash map and hash set type aliases.
//!
//! Configuration maps (directories, processors, actions) and rule key sets are
//! small and keyed by strings that come from a trusted local file, so the Fx
//! hash from `rustc-hash` is used instead of SipHash.
//!
//! ```
//! use ag_core::{FxHashMap, FxHashSet};
//!
//! let mut map: FxHashMap<String, i32> = FxHashMap::default();
//! map.insert("cam1".to_owned(), 1);
//!
//! let keys: FxHashSet<&str> = ["cat", "dog"].into_iter().collect();
//! assert!(keys.contains("cat"));
//! ```

/// A [`HashMap`](std::collections::HashMap) using the Fx hash algorithm.
pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// A [`HashSet`](std::collections::HashSet) using the Fx hash algorithm.
pub type FxHashSet<V> = rustc_hash::FxHashSet<V>;
