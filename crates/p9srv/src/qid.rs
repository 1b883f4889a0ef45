//! Per-server QID allocation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out unique, monotonically increasing QID paths.
///
/// Scoped to a single `Tree`/`Server` instance rather than shared
/// process-wide, so that multiple servers can run in one process with
/// independent QID spaces.
#[derive(Debug, Default)]
pub struct QidGenerator {
    next: AtomicU64,
}

impl QidGenerator {
    /// A fresh generator starting at path 1 (path 0 is reserved for the
    /// tree root).
    pub fn new() -> Arc<QidGenerator> {
        Arc::new(QidGenerator {
            next: AtomicU64::new(1),
        })
    }

    /// Allocate the next unique path.
    pub fn next_path(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_unique_and_increasing() {
        let gen = QidGenerator::new();
        let a = gen.next_path();
        let b = gen.next_path();
        let c = gen.next_path();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn two_generators_have_independent_spaces() {
        let g1 = QidGenerator::new();
        let g2 = QidGenerator::new();
        assert_eq!(g1.next_path(), g2.next_path());
    }
}
