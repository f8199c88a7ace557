use crate::ranking::RankedRecord;

/// Length of the sequence prefix used to probe for self-overlap.
pub const DEFAULT_ANCHOR_LENGTH: usize = 20;

/// Header line of the statistics table.
pub const STATISTICS_HEADER: &str = "seqid\tnb_hit\tSlen\toverlap\tk";

/// Outcome of the self-overlap test on one sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlap {
    Linear {
        occurrences: usize,
    },
    /// The sequence wraps around: `seq[..trimmed_length]` is the contig
    /// without its repeated end, which is `overlap_length` long.
    Circular {
        occurrences: usize,
        trimmed_length: usize,
        overlap_length: usize,
    },
}

/// Start positions of the non-overlapping, left-to-right occurrences of
/// `anchor` in `seq`.
pub fn find_anchor_occurrences(seq: &[u8], anchor: &[u8]) -> Vec<usize> {
    let n = anchor.len();
    let mut positions = Vec::new();
    if n == 0 {
        return positions;
    }

    let mut i = 0;
    while i + n <= seq.len() {
        if &seq[i..i + n] == anchor {
            positions.push(i);
            i += n;
        } else {
            i += 1;
        }
    }
    positions
}

/// Test whether `seq` ends by repeating its own beginning.
///
/// The anchor is the first `anchor_length` bases (or the whole sequence when
/// shorter). Everything before the last anchor occurrence is the head and the
/// rest is the tail; the sequence is circular when at least two anchors were
/// found and the head starts with the tail.
pub fn detect_overlap(seq: &[u8], anchor_length: usize) -> Overlap {
    let n = anchor_length.min(seq.len());
    let positions = find_anchor_occurrences(seq, &seq[..n]);
    let occurrences = positions.len();

    let last = match positions.last() {
        Some(&last) if occurrences >= 2 => last,
        _ => return Overlap::Linear { occurrences },
    };

    let (head, tail) = seq.split_at(last);
    if head.starts_with(tail) {
        Overlap::Circular {
            occurrences,
            trimmed_length: head.len(),
            overlap_length: tail.len(),
        }
    } else {
        Overlap::Linear { occurrences }
    }
}

/// A contig confirmed as a circular-assembly artifact, with the repeated
/// end removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircularRecord {
    pub canonical_id: String,
    pub trimmed_sequence: Vec<u8>,
    pub overlap_length: usize,
    pub anchor_length: usize,
    pub occurrence_count: usize,
}

impl CircularRecord {
    /// FASTA header: `{canonical_id}_cir_{overlap_length}`.
    pub fn header(&self) -> String {
        format!("{}_cir_{}", self.canonical_id, self.overlap_length)
    }
}

/// One line of the statistics table.
///
/// `retained_length` is the length of the sequence kept for the record:
/// the trimmed length for circular contigs, the full length otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticsRow {
    pub id: String,
    pub occurrence_count: usize,
    pub retained_length: usize,
    pub overlap_length: usize,
    pub anchor_length: usize,
}

impl StatisticsRow {
    pub fn to_tsv(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}",
            self.id,
            self.occurrence_count,
            self.retained_length,
            self.overlap_length,
            self.anchor_length
        )
    }
}

/// Classify one ranked record: always a statistics row, plus a circular
/// record when the overlap is confirmed.
pub fn classify(
    ranked: &RankedRecord,
    anchor_length: usize,
) -> (StatisticsRow, Option<CircularRecord>) {
    let seq = ranked.sequence();
    let overlap = detect_overlap(seq, anchor_length);

    match overlap {
        Overlap::Circular {
            occurrences,
            trimmed_length,
            overlap_length,
        } => {
            let row = StatisticsRow {
                id: ranked.canonical_id.clone(),
                occurrence_count: occurrences,
                retained_length: trimmed_length,
                overlap_length,
                anchor_length,
            };
            let circ = CircularRecord {
                canonical_id: ranked.canonical_id.clone(),
                trimmed_sequence: seq[..trimmed_length].to_vec(),
                overlap_length,
                anchor_length,
                occurrence_count: occurrences,
            };
            (row, Some(circ))
        }
        Overlap::Linear { occurrences } => {
            let row = StatisticsRow {
                id: ranked.canonical_id.clone(),
                occurrence_count: occurrences,
                retained_length: seq.len(),
                overlap_length: 0,
                anchor_length,
            };
            (row, None)
        }
    }
}
