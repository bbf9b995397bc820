pub mod hash {
    use std::hash::{Hash, Hasher};

    use fnv::FnvHasher;

    /// Pass-through hasher for keys that already are 64-bit hashes.
    #[derive(Default)]
    pub struct SimpleU64Hasher(u64);
    pub type SimpleU64BuildHasher = std::hash::BuildHasherDefault<SimpleU64Hasher>;

    impl Hasher for SimpleU64Hasher {
        #[inline]
        fn finish(&self) -> u64 {
            self.0
        }

        #[inline]
        fn write(&mut self, _bytes: &[u8]) {
            panic!("SimpleU64Hasher should only be used with u64")
        }

        #[inline]
        fn write_u64(&mut self, i: u64) {
            self.0 = i;
        }

        #[inline]
        fn write_i64(&mut self, i: i64) {
            self.0 = i as u64;
        }
    }

    pub type U64HashMap<V> = std::collections::HashMap<u64, V, SimpleU64BuildHasher>;

    /// 64-bit FNV content hash of `value`.
    ///
    /// Cache identity is decided by this value alone: two descriptions with
    /// the same content hash are treated as the same object.
    #[inline]
    pub fn content_hash<T: Hash + ?Sized>(value: &T) -> u64 {
        let mut hasher = FnvHasher::default();
        value.hash(&mut hasher);
        hasher.finish()
    }

    /// Running hash over an ordered sequence, seeded with a previous value.
    pub struct RunningHash(FnvHasher);

    impl RunningHash {
        #[inline]
        pub fn new() -> Self {
            Self(FnvHasher::default())
        }

        #[inline]
        pub fn with_seed(seed: u64) -> Self {
            Self(FnvHasher::with_key(seed))
        }

        #[inline]
        pub fn add<T: Hash + ?Sized>(&mut self, value: &T) -> &mut Self {
            value.hash(&mut self.0);
            self
        }

        #[inline]
        pub fn finish(&self) -> u64 {
            self.0.finish()
        }
    }

    impl Default for RunningHash {
        #[inline]
        fn default() -> Self {
            Self::new()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_content_hash_is_stable() {
            assert_eq!(content_hash(&(1u32, 2u32)), content_hash(&(1u32, 2u32)));
            assert_ne!(content_hash(&(1u32, 2u32)), content_hash(&(2u32, 1u32)));
        }

        #[test]
        fn test_running_hash_order_matters() {
            let a = RunningHash::new().add(&1u64).add(&2u64).finish();
            let b = RunningHash::new().add(&2u64).add(&1u64).finish();
            assert_ne!(a, b);
            let seeded = RunningHash::with_seed(a).add(&3u64).finish();
            assert_eq!(seeded, RunningHash::with_seed(a).add(&3u64).finish());
        }

        #[test]
        fn test_u64_hash_map_passes_keys_through() {
            let mut map = U64HashMap::default();
            map.insert(content_hash("x"), 1);
            assert_eq!(Some(&1), map.get(&content_hash("x")));
        }
    }
}
