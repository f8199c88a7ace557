use std::cmp::Reverse;

use crate::io::SequenceRecord;
use crate::{restore_sample_id, ID_DELIMITER};

/// A record placed in length order, carrying its canonical id
/// `{sample}_{rank}_lt_{length}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedRecord {
    pub record: SequenceRecord,
    /// 1-based; rank 1 is the longest record.
    pub rank: usize,
    pub canonical_id: String,
}

impl RankedRecord {
    pub fn sequence(&self) -> &[u8] {
        self.record.sequence()
    }

    pub fn length(&self) -> usize {
        self.record.length()
    }
}

/// Build the canonical id for `record` at `rank`.
///
/// The sample part is the token before the first delimiter of the record's
/// own id, so records concatenated from several samples keep their origin.
pub fn canonical_id(record: &SequenceRecord, rank: usize) -> String {
    let sample = record.id().split(ID_DELIMITER).next().unwrap_or_default();
    format!(
        "{}_{}_lt_{}",
        restore_sample_id(sample),
        rank,
        record.length()
    )
}

/// Sort records longest first and assign ranks. Records of equal length
/// keep their file order.
pub fn rank_records(mut records: Vec<SequenceRecord>) -> Vec<RankedRecord> {
    records.sort_by_key(|r| Reverse(r.length()));

    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let rank = i + 1;
            let canonical_id = canonical_id(&record, rank);
            RankedRecord {
                record,
                rank,
                canonical_id,
            }
        })
        .collect()
}
