//! Construction-time settings for collections and pools.

use std::time::Duration;

/// Whether a collection owns (destroys) its elements or merely references them.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
pub enum Adoption {
    /// Elements are owned and dropped with the node that holds them.
    #[default]
    Adopt,
    /// Elements are borrowed; the collection never frees them.
    NoAdopt,
}

impl Adoption {
    pub fn owns(self) -> bool {
        matches!(self, Adoption::Adopt)
    }
}

/// Settings shared by lists and hash tables.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CollectionConfig {
    pub name: String,
    pub adoption: Adoption,
    /// Upper bound on lock waits; `None` blocks until acquired.
    pub lock_timeout: Option<Duration>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            name: "collection".to_string(),
            adoption: Adoption::Adopt,
            lock_timeout: None,
        }
    }
}

impl CollectionConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn adoption(mut self, adoption: Adoption) -> Self {
        self.adoption = adoption;
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }
}

/// Settings for [`ObjectPool`](crate::ObjectPool).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolConfig {
    pub name: String,
    /// Bound on `free + used` elements.
    pub max_size: usize,
    /// When no free element is large enough, grow the largest free one
    /// instead of allocating a new element.
    pub grow_on_miss: bool,
    pub lock_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "pool".to_string(),
            max_size: 16,
            grow_on_miss: false,
            lock_timeout: None,
        }
    }
}

impl PoolConfig {
    pub fn named(name: impl Into<String>, max_size: usize) -> Self {
        Self {
            name: name.into(),
            max_size,
            ..Self::default()
        }
    }

    pub fn grow_on_miss(mut self, grow: bool) -> Self {
        self.grow_on_miss = grow;
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }
}
