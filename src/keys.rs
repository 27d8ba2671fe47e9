//! Key generation for blocks and children.
//!
//! Keys identify nodes for their whole lifetime and are never reused after a
//! node is removed.

use uuid::Uuid;

/// Produces a fresh, never-before-used key on each call.
pub trait KeyGenerator {
    fn next_key(&mut self) -> String;
}

impl<F> KeyGenerator for F
where
    F: FnMut() -> String,
{
    fn next_key(&mut self) -> String {
        self()
    }
}

/// Random 12 hex digit keys backed by UUID v4.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomKeys;

impl KeyGenerator for RandomKeys {
    fn next_key(&mut self) -> String {
        let mut key = Uuid::new_v4().simple().to_string();
        key.truncate(12);
        key
    }
}

/// Deterministic keys (`k0`, `k1`, ...), for tests and fixtures.
#[derive(Debug, Clone)]
pub struct SequentialKeys {
    prefix: String,
    next: u64,
}

impl SequentialKeys {
    pub fn new() -> Self {
        Self::with_prefix("k")
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            next: 0,
        }
    }
}

impl Default for SequentialKeys {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyGenerator for SequentialKeys {
    fn next_key(&mut self) -> String {
        let key = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        key
    }
}
