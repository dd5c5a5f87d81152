//! Fixed-size batching of accepted records

use crate::validator::CandidateRecord;

/// An ordered group of accepted records, the unit of dispatch and of
/// storage transactionality
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Arrival order, starting from 1
    pub number: u64,
    pub records: Vec<CandidateRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Buffers accepted records and cuts them into batches of `batch_size`.
///
/// Every batch except possibly the last one from [`Batcher::finish`] holds
/// exactly `batch_size` records.
#[derive(Debug)]
pub struct Batcher {
    batch_size: usize,
    buffer: Vec<CandidateRecord>,
    next_number: u64,
}

impl Batcher {
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            next_number: 1,
        }
    }

    /// Buffer `record`; returns the completed batch once the buffer is full
    pub fn add(&mut self, record: CandidateRecord) -> Option<Batch> {
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            let full = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
            return Some(self.seal(full));
        }
        None
    }

    /// Flush the final partial batch, if any records are left
    pub fn finish(mut self) -> Option<Batch> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(self.seal(rest))
    }

    /// Batches handed out so far
    pub fn batches_emitted(&self) -> u64 {
        self.next_number - 1
    }

    fn seal(&mut self, records: Vec<CandidateRecord>) -> Batch {
        let number = self.next_number;
        self.next_number += 1;
        Batch { number, records }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use sales_common::parse_sale_timestamp;

    fn record(id: i64) -> CandidateRecord {
        CandidateRecord {
            line: id as u64 + 1,
            id,
            game_no: 1,
            game_name: "Game".to_string(),
            game_code: "G1".to_string(),
            game_type: 1,
            cost_price: BigDecimal::from(10),
            tax: BigDecimal::from(9),
            sale_price: BigDecimal::from(11),
            date_of_sale: parse_sale_timestamp("2025-04-01 00:00:00").unwrap(),
        }
    }

    fn run(rows: i64, batch_size: usize) -> Vec<Batch> {
        let mut batcher = Batcher::new(batch_size);
        let mut batches: Vec<Batch> = (1..=rows).filter_map(|id| batcher.add(record(id))).collect();
        batches.extend(batcher.finish());
        batches
    }

    #[test]
    fn test_exact_multiple_gives_full_batches() {
        let batches = run(1000, 1000);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1000);
    }

    #[test]
    fn test_remainder_goes_to_final_batch() {
        let batches = run(1001, 1000);
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![1000, 1]);
        assert_eq!(batches[1].records[0].id, 1001);
    }

    #[test]
    fn test_no_records_no_batches() {
        assert!(run(0, 1000).is_empty());
    }

    #[test]
    fn test_numbers_and_order_preserved() {
        let batches = run(7, 3);
        let numbers: Vec<u64> = batches.iter().map(|b| b.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        let ids: Vec<i64> = batches
            .iter()
            .flat_map(|b| b.records.iter().map(|r| r.id))
            .collect();
        assert_eq!(ids, (1..=7).collect::<Vec<_>>());
    }

    #[test]
    fn test_batches_emitted_counts_full_batches() {
        let mut batcher = Batcher::new(2);
        assert!(batcher.add(record(1)).is_none());
        assert!(batcher.add(record(2)).is_some());
        assert!(batcher.add(record(3)).is_none());
        assert_eq!(batcher.batches_emitted(), 1);
        assert_eq!(batcher.finish().unwrap().number, 2);
    }
}
