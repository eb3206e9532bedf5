//! Bounded history of recently broadcast messages

use std::collections::VecDeque;

use crate::message::MessageRecord;

/// FIFO message cache replayed to newly joined clients
#[derive(Debug)]
pub struct MessageCache {
    records: VecDeque<MessageRecord>,
    capacity: usize,
}

impl MessageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record, evicting the oldest one if over capacity
    pub fn append(&mut self, record: MessageRecord) {
        self.records.push_back(record);
        if self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    /// Cached records, oldest first
    pub fn snapshot(&self) -> Vec<MessageRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageId, Nickname};

    fn record(id: u64) -> MessageRecord {
        MessageRecord {
            id: MessageId(id),
            from: Nickname::new_unchecked("alice"),
            body: format!("message {id}"),
            timestamp: id,
        }
    }

    #[test]
    fn test_keeps_last_records_in_order() {
        let mut cache = MessageCache::new(3);
        for id in 1..=5 {
            cache.append(record(id));
        }

        let ids: Vec<u64> = cache.snapshot().iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_under_capacity() {
        let mut cache = MessageCache::new(10);
        cache.append(record(1));
        cache.append(record(2));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.snapshot()[0].body, "message 1");
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut cache = MessageCache::new(0);
        cache.append(record(1));
        assert!(cache.is_empty());
        assert!(cache.snapshot().is_empty());
    }
}
