//! Claim candidates ordered by claimable reward (max-heap)

use priority_queue::PriorityQueue;
use stake_model::{FixedPointAmount, PositionRow};
use std::cmp::Reverse;
use std::collections::HashMap;

/// A position worth claiming
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimCandidate {
    pub position_index: u32,
    pub plan_name: String,
    pub claimable: FixedPointAmount,
}

impl From<&PositionRow> for ClaimCandidate {
    fn from(row: &PositionRow) -> Self {
        Self {
            position_index: row.position_index,
            plan_name: row.plan_name.clone(),
            claimable: row.claimable,
        }
    }
}

/// Largest claimable first; equal amounts go lowest position index first
pub struct ClaimQueue {
    queue: PriorityQueue<u32, (FixedPointAmount, Reverse<u32>)>,
    map: HashMap<u32, ClaimCandidate>,
}

impl ClaimQueue {
    pub fn new() -> Self {
        Self {
            queue: PriorityQueue::new(),
            map: HashMap::new(),
        }
    }

    /// Build from one cycle's position rows
    pub fn from_rows(rows: &[PositionRow]) -> Self {
        let mut queue = Self::new();
        for row in rows {
            queue.push(ClaimCandidate::from(row));
        }
        queue
    }

    /// Push or replace a candidate
    pub fn push(&mut self, candidate: ClaimCandidate) {
        let index = candidate.position_index;
        self.queue.push(index, (candidate.claimable, Reverse(index)));
        self.map.insert(index, candidate);
    }

    pub fn pop(&mut self) -> Option<ClaimCandidate> {
        let (index, _priority) = self.queue.pop()?;
        self.map.remove(&index)
    }

    pub fn peek(&self) -> Option<&ClaimCandidate> {
        let (index, _priority) = self.queue.peek()?;
        self.map.get(index)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Candidates with claimable >= threshold, largest first
    pub fn claimable_above(&self, threshold: &FixedPointAmount) -> Vec<ClaimCandidate> {
        let mut out: Vec<ClaimCandidate> = self
            .map
            .values()
            .filter(|c| c.claimable >= *threshold)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.claimable
                .cmp(&a.claimable)
                .then(a.position_index.cmp(&b.position_index))
        });
        out
    }

    /// Pop up to `max` candidates, stopping at the first one below `threshold`
    pub fn take_batch(
        &mut self,
        max: usize,
        threshold: &FixedPointAmount,
    ) -> Vec<ClaimCandidate> {
        let mut batch = Vec::new();
        while batch.len() < max {
            match self.peek() {
                Some(top) if top.claimable >= *threshold => {}
                _ => break,
            }
            if let Some(candidate) = self.pop() {
                batch.push(candidate);
            }
        }
        batch
    }

    /// Pop the largest candidates until their claimable sum reaches `amount`
    ///
    /// Returns the batch and its sum. The sum falls short only when the queue
    /// runs dry first.
    pub fn take_covering(
        &mut self,
        amount: &FixedPointAmount,
    ) -> stake_model::Result<(Vec<ClaimCandidate>, FixedPointAmount)> {
        let mut batch = Vec::new();
        let mut covered = FixedPointAmount::ZERO;
        while covered < *amount {
            match self.pop() {
                Some(candidate) if !candidate.claimable.is_zero() => {
                    covered = covered.checked_add(&candidate.claimable)?;
                    batch.push(candidate);
                }
                _ => break,
            }
        }
        Ok((batch, covered))
    }
}

impl Default for ClaimQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(index: u32, tokens: u64) -> ClaimCandidate {
        ClaimCandidate {
            position_index: index,
            plan_name: "Starter".to_string(),
            claimable: FixedPointAmount::from_tokens(tokens),
        }
    }

    #[test]
    fn test_queue_push_pop() {
        let mut queue = ClaimQueue::new();
        queue.push(candidate(0, 5));
        queue.push(candidate(1, 40));
        queue.push(candidate(2, 12));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop().unwrap().position_index, 1);
        assert_eq!(queue.pop().unwrap().position_index, 2);
        assert_eq!(queue.pop().unwrap().position_index, 0);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_queue_peek_and_ties() {
        let mut queue = ClaimQueue::new();
        queue.push(candidate(3, 10));
        queue.push(candidate(1, 10));

        assert_eq!(queue.peek().unwrap().position_index, 1);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_queue_replace() {
        let mut queue = ClaimQueue::new();
        queue.push(candidate(0, 5));
        queue.push(candidate(1, 8));
        queue.push(candidate(0, 50));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.peek().unwrap().claimable, FixedPointAmount::from_tokens(50));

        queue.push(candidate(0, 2));
        assert_eq!(queue.peek().unwrap().position_index, 1);
    }

    #[test]
    fn test_claimable_above() {
        let mut queue = ClaimQueue::new();
        queue.push(candidate(0, 1));
        queue.push(candidate(1, 3));
        queue.push(candidate(2, 2));

        let above = queue.claimable_above(&FixedPointAmount::from_tokens(2));
        let order: Vec<u32> = above.iter().map(|c| c.position_index).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn test_take_batch() {
        let mut queue = ClaimQueue::new();
        for (i, t) in [9u64, 1, 7, 3, 5].iter().enumerate() {
            queue.push(candidate(i as u32, *t));
        }

        let batch = queue.take_batch(2, &FixedPointAmount::from_tokens(2));
        let order: Vec<u32> = batch.iter().map(|c| c.position_index).collect();
        assert_eq!(order, vec![0, 2]);

        let rest = queue.take_batch(10, &FixedPointAmount::from_tokens(2));
        assert_eq!(rest.len(), 2);
        // Only the 1-token position is left
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_take_covering() {
        let mut queue = ClaimQueue::new();
        for (i, t) in [4u64, 9, 0, 6].iter().enumerate() {
            queue.push(candidate(i as u32, *t));
        }

        let (batch, covered) = queue.take_covering(&FixedPointAmount::from_tokens(12)).unwrap();
        let order: Vec<u32> = batch.iter().map(|c| c.position_index).collect();
        assert_eq!(order, vec![1, 3]);
        assert_eq!(covered, FixedPointAmount::from_tokens(15));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_take_covering_runs_dry() {
        let mut queue = ClaimQueue::new();
        queue.push(candidate(0, 3));
        queue.push(candidate(1, 0));

        let (batch, covered) = queue.take_covering(&FixedPointAmount::from_tokens(5)).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(covered, FixedPointAmount::from_tokens(3));
    }
}
