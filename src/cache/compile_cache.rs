// Holds results only. Anything that moves a ref or adds an annotation
// must call `invalidate`; the facade does this on every such mutation.

use std::collections::HashMap;

use crate::cache::CacheKey;
use crate::compile::CompileResult;

#[derive(Debug, Default)]
pub struct CompileCache {
    entries: HashMap<CacheKey, CompileResult>,
    hits: u64,
    misses: u64,
}

impl CompileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<&CompileResult> {
        match self.entries.get(key) {
            Some(result) => {
                self.hits += 1;
                Some(result)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: CacheKey, result: CompileResult) {
        self.entries.insert(key, result);
    }

    pub fn invalidate(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!(entries = self.entries.len(), "compile cache invalidated");
        }
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (hits, misses) since construction.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
