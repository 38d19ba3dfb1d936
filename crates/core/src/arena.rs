//! Resource arena: owned byte buffers addressed by opaque `blob:` URLs.
//!
//! Every imported book and every extracted page list owns one arena. URLs
//! handed out by an arena stay resolvable until they are revoked one by one or
//! the whole arena is released. Releasing is always an explicit call; a URL
//! kept by a consumer after release simply stops resolving.

use std::collections::HashMap;

/// Scheme prefix of every URL allocated by an arena.
pub const URL_PREFIX: &str = "blob:folio/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub media_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct ResourceArena {
    resources: HashMap<String, Resource>,
}

impl ResourceArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `data` and return the URL that addresses it.
    pub fn allocate(&mut self, media_type: impl Into<String>, data: Vec<u8>) -> String {
        let url = format!("{}{}", URL_PREFIX, uuid::Uuid::new_v4().as_simple());
        self.resources.insert(
            url.clone(),
            Resource {
                media_type: media_type.into(),
                data,
            },
        );
        url
    }

    pub fn get(&self, url: &str) -> Option<&Resource> {
        self.resources.get(url)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.resources.contains_key(url)
    }

    /// Release a single URL. Returns false if it was unknown or already revoked.
    pub fn revoke(&mut self, url: &str) -> bool {
        self.resources.remove(url).is_some()
    }

    /// Release every URL. Returns how many were released.
    pub fn release_all(&mut self) -> usize {
        let count = self.resources.len();
        self.resources.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_resolve() {
        let mut arena = ResourceArena::new();
        let url = arena.allocate("text/html", b"<p>hi</p>".to_vec());
        assert!(url.starts_with(URL_PREFIX));
        let res = arena.get(&url).unwrap();
        assert_eq!(res.media_type, "text/html");
        assert_eq!(res.data, b"<p>hi</p>");
    }

    #[test]
    fn urls_are_unique() {
        let mut arena = ResourceArena::new();
        let a = arena.allocate("image/png", vec![1]);
        let b = arena.allocate("image/png", vec![1]);
        assert_ne!(a, b);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn revoke_and_release() {
        let mut arena = ResourceArena::new();
        let a = arena.allocate("image/png", vec![1]);
        let b = arena.allocate("image/png", vec![2]);
        assert!(arena.revoke(&a));
        assert!(!arena.revoke(&a));
        assert!(arena.get(&a).is_none());
        assert!(arena.contains(&b));
        assert_eq!(arena.release_all(), 1);
        assert!(arena.is_empty());
        assert!(arena.get(&b).is_none());
    }
}
