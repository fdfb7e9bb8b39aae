//! In-memory batch source.

use std::collections::VecDeque;

use async_trait::async_trait;

use super::BatchSource;
use crate::batch::CollectedBatch;
use crate::Result;

/// Batches queued up front, handed out in order.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    batches: VecDeque<CollectedBatch>,
}

impl MemorySource {
    pub fn new(batches: impl IntoIterator<Item = CollectedBatch>) -> Self {
        Self { batches: batches.into_iter().collect() }
    }

    pub fn push(&mut self, batch: CollectedBatch) {
        self.batches.push_back(batch);
    }

    pub fn remaining(&self) -> usize {
        self.batches.len()
    }
}

#[async_trait]
impl BatchSource for MemorySource {
    async fn next_batch(&mut self) -> Result<Option<CollectedBatch>> {
        Ok(self.batches.pop_front())
    }

    fn describe(&self) -> String {
        format!("memory ({} queued)", self.batches.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drains_in_order() {
        let mut source = MemorySource::new([CollectedBatch::new("a"), CollectedBatch::new("b")]);
        source.push(CollectedBatch::new("c"));
        let mut seen = Vec::new();
        while let Some(batch) = source.next_batch().await.unwrap() {
            seen.push(batch.source);
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(source.remaining(), 0);
    }
}
