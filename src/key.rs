//! Cache key construction.
//!
//! Every key is `<environment-prefix><namespace><identifier>`. String keys
//! carry no identifier suffix.

/// Builds prefixed keys for one deployment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheKeyBuilder {
    prefix: String,
}

impl CacheKeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        CacheKeyBuilder {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `"<prefix><key>"`, used by the string cache.
    pub fn string_key(&self, key: &str) -> String {
        let mut out = String::with_capacity(self.prefix.len() + key.len());
        out.push_str(&self.prefix);
        out.push_str(key);
        out
    }

    /// `"<prefix><namespace>"`, the local-cache instance name for a namespace.
    pub fn namespace_key(&self, namespace: &str) -> String {
        self.string_key(namespace)
    }

    /// `"<prefix><namespace><id>"`, addressing one entity instance.
    ///
    /// # Example
    ///
    /// ```
    /// use tiercache::key::CacheKeyBuilder;
    ///
    /// let keys = CacheKeyBuilder::new("prod:");
    /// assert_eq!(keys.composite_key("user_like_", 42), "prod:user_like_42");
    /// ```
    pub fn composite_key(&self, namespace: &str, id: u32) -> String {
        format!("{}{}{}", self.prefix, namespace, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_string_key() {
        let keys = CacheKeyBuilder::new("dev:");
        assert_eq!(keys.string_key("user_like_42"), "dev:user_like_42");
        assert_eq!(keys.namespace_key("video_"), "dev:video_");
    }

    #[test]
    fn test_empty_prefix() {
        let keys = CacheKeyBuilder::default();
        assert_eq!(keys.composite_key("comment_", 7), "comment_7");
    }

    proptest! {
        #[test]
        fn composite_key_starts_with_namespace_key(ns in "[a-z_]{1,12}", id in any::<u32>()) {
            let keys = CacheKeyBuilder::new("t1:");
            let composite = keys.composite_key(&ns, id);
            prop_assert!(composite.starts_with(&keys.namespace_key(&ns)));
            prop_assert!(composite.ends_with(&id.to_string()));
        }

        #[test]
        fn different_prefixes_never_collide(id in any::<u32>()) {
            let a = CacheKeyBuilder::new("tenant_a:");
            let b = CacheKeyBuilder::new("tenant_b:");
            prop_assert_ne!(a.composite_key("video_", id), b.composite_key("video_", id));
        }
    }
}
