use super::structs::{SampleRecord, MAX_SAMPLES};

/// Fixed capacity ring of samples waiting for an acknowledgement.
///
/// Pushing onto a full queue drops the oldest sample. Acknowledged samples are
/// removed from anywhere in the ring, later samples shift down to close the gap.
pub struct OutboundQueue {
    slots: [SampleRecord; MAX_SAMPLES],
    head: usize,
    len: usize,
}

impl OutboundQueue {
    pub const CAPACITY: usize = MAX_SAMPLES;

    pub fn new() -> Self {
        return OutboundQueue {
            slots: [SampleRecord::default(); MAX_SAMPLES],
            head: 0,
            len: 0,
        };
    }

    fn slot(&self, index: usize) -> usize {
        return (self.head + index) % MAX_SAMPLES;
    }

    pub fn len(&self) -> usize {
        return self.len;
    }

    pub fn is_empty(&self) -> bool {
        return self.len == 0;
    }

    /// Returns the sample that was evicted to make room, if any.
    pub fn push(&mut self, record: SampleRecord) -> Option<SampleRecord> {
        let mut evicted = None;

        if self.len == MAX_SAMPLES {
            evicted = Some(self.slots[self.head]);
            self.head = self.slot(1);
            self.len -= 1;
        }

        let tail = self.slot(self.len);
        self.slots[tail] = record;
        self.len += 1;

        return evicted;
    }

    /// Remove the oldest sample with this timestamp.
    pub fn remove_first(&mut self, timestamp: u32) -> bool {
        let index = match self.iter().position(|record| record.timestamp == timestamp) {
            Some(index) => index,
            None => return false,
        };

        for i in index..self.len - 1 {
            let (to, from) = (self.slot(i), self.slot(i + 1));
            self.slots[to] = self.slots[from];
        }
        self.len -= 1;

        return true;
    }

    /// Samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &SampleRecord> + '_ {
        return (0..self.len).map(move |i| &self.slots[self.slot(i)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp: u32) -> SampleRecord {
        return SampleRecord { timestamp, ..SampleRecord::default() };
    }

    fn timestamps(queue: &OutboundQueue) -> Vec<u32> {
        return queue.iter().map(|r| r.timestamp).collect();
    }

    #[test]
    fn test_push_evicts_oldest() {
        let mut queue = OutboundQueue::new();
        for t in 1..=40 {
            assert_eq!(queue.push(sample(t)), None);
        }
        assert_eq!(queue.len(), 40);

        assert_eq!(queue.push(sample(41)).map(|r| r.timestamp), Some(1));
        assert_eq!(timestamps(&queue), (2..=41).collect::<Vec<u32>>());
    }

    #[test]
    fn test_remove_acknowledged() {
        let mut queue = OutboundQueue::new();
        for t in [10, 20, 30] {
            queue.push(sample(t));
        }

        assert!(queue.remove_first(20));
        assert!(!queue.remove_first(20));
        assert_eq!(timestamps(&queue), vec![10, 30]);
    }

    #[test]
    fn test_remove_first_duplicate_only() {
        let mut queue = OutboundQueue::new();
        let mut first = sample(5);
        first.rtt = 1;
        queue.push(first);
        queue.push(sample(5));

        assert!(queue.remove_first(5));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.iter().next().map(|r| r.rtt), Some(0));
    }

    #[test]
    fn test_remove_across_wrap() {
        let mut queue = OutboundQueue::new();
        for t in 1..=45 {
            queue.push(sample(t));
        }

        assert!(queue.remove_first(6));
        assert!(queue.remove_first(45));
        assert!(queue.remove_first(40));
        assert_eq!(queue.len(), 37);

        let mut expected: Vec<u32> = (7..=44).filter(|t| *t != 40).collect();
        assert_eq!(timestamps(&queue), expected);

        queue.push(sample(46));
        expected.push(46);
        assert_eq!(timestamps(&queue), expected);
    }
}
