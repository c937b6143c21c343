use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SNAPSHOT_BOUNDARY: Regex =
        Regex::new(r"(?m)^\[\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:\.\d+)?\] POST /")
            .expect("snapshot boundary pattern");
}

/// One complete server snapshot: everything from a boundary request line
/// (inclusive) to the next boundary (exclusive).
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub raw: String,
}

impl Snapshot {
    pub fn new(raw: String) -> Self {
        Self { raw }
    }
}

/// Splits an append-only text stream into snapshots. The tail after the last
/// boundary is carried between calls, so feeding the same stream in arbitrary
/// chunks yields the same snapshot sequence as feeding it whole.
#[derive(Debug, Default)]
pub struct SnapshotExtractor {
    carry: String,
}

impl SnapshotExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every snapshot completed by it. Text that
    /// precedes the first boundary ever seen is emitted as its own snapshot
    /// once that boundary arrives.
    pub fn extend(&mut self, chunk: &str) -> Vec<Snapshot> {
        self.carry.push_str(chunk);

        let boundary_starts: Vec<usize> = SNAPSHOT_BOUNDARY
            .find_iter(&self.carry)
            .map(|found| found.start())
            .collect();

        let Some(&last_start) = boundary_starts.last() else {
            return Vec::new();
        };

        let mut snapshots = Vec::new();
        let mut segment_start = 0;
        for &boundary_start in &boundary_starts {
            if boundary_start > segment_start {
                let segment = &self.carry[segment_start..boundary_start];
                if !segment.trim().is_empty() {
                    snapshots.push(Snapshot::new(segment.to_string()));
                }
            }
            segment_start = boundary_start;
        }

        self.carry = self.carry.split_off(last_start);
        snapshots
    }

    /// Drains the carry into a final snapshot, e.g. at a file boundary or on
    /// shutdown.
    pub fn flush(&mut self) -> Option<Snapshot> {
        let remaining = std::mem::take(&mut self.carry);
        if remaining.trim().is_empty() {
            None
        } else {
            Some(Snapshot::new(remaining))
        }
    }

    /// Bytes currently held back waiting for the next boundary. Callers watch
    /// this to warn when a stream never produces a boundary.
    pub fn carry_len(&self) -> usize {
        self.carry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::{Snapshot, SnapshotExtractor};

    const STREAM: &str = "\
[2025-08-31 10:00:01] POST /totalmessage\n\
GameID: \"42\"\n\
TotalPlayerList:\n\
{ uId: 1, teamId: 1 }\n\
[2025-08-31 10:00:02] POST /totalmessage\n\
TotalPlayerList:\n\
{ uId: 1, teamId: 1, killNum: 1 }\n\
[2025-08-31 10:00:03] POST /setteaminfo\n\
TeamInfoList:\n\
{ teamId: 1, teamName: 'Alpha' }\n";

    fn collect_all(extractor: &mut SnapshotExtractor, chunks: &[&str]) -> Vec<Snapshot> {
        let mut snapshots = Vec::new();
        for chunk in chunks {
            snapshots.extend(extractor.extend(chunk));
        }
        if let Some(last) = extractor.flush() {
            snapshots.push(last);
        }
        snapshots
    }

    #[test]
    fn splits_at_boundary_lines() {
        let mut extractor = SnapshotExtractor::new();
        let snapshots = collect_all(&mut extractor, &[STREAM]);

        assert_eq!(snapshots.len(), 3);
        assert!(snapshots[0].raw.contains("GameID"));
        assert!(snapshots[1].raw.contains("killNum: 1"));
        assert!(snapshots[2].raw.starts_with("[2025-08-31 10:00:03]"));
    }

    #[test]
    fn arbitrary_chunking_yields_the_same_snapshots() {
        let mut whole = SnapshotExtractor::new();
        let expected = collect_all(&mut whole, &[STREAM]);

        // Byte-at-a-time is the worst case; boundary lines arrive split.
        let pieces: Vec<String> = STREAM.chars().map(|character| character.to_string()).collect();
        let piece_refs: Vec<&str> = pieces.iter().map(String::as_str).collect();
        let mut fragmented = SnapshotExtractor::new();
        let actual = collect_all(&mut fragmented, &piece_refs);

        assert_eq!(actual, expected, "Chunking must not change the snapshot sequence");
    }

    #[test]
    fn text_before_the_first_boundary_becomes_its_own_snapshot() {
        let mut extractor = SnapshotExtractor::new();
        let snapshots =
            extractor.extend("prelude noise\n[2025-08-31 10:00:01] POST /totalmessage\nbody\n");

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].raw, "prelude noise\n");
        assert!(extractor.carry_len() > 0);
    }

    #[test]
    fn no_boundary_means_no_snapshots_until_flush() {
        let mut extractor = SnapshotExtractor::new();
        assert!(extractor.extend("free text without any request line\n").is_empty());

        let flushed = extractor.flush().expect("carry should flush");
        assert!(flushed.raw.contains("free text"));
        assert_eq!(extractor.carry_len(), 0);
    }

    #[test]
    fn flush_of_whitespace_carry_is_none() {
        let mut extractor = SnapshotExtractor::new();
        extractor.extend("\n  \n");
        assert_eq!(extractor.flush(), None);
    }

    #[test]
    fn boundary_with_fractional_seconds_is_recognized() {
        let mut extractor = SnapshotExtractor::new();
        extractor.extend("[2025-08-31 10:00:01.250] POST /totalmessage\nfirst\n");
        let snapshots = extractor.extend("[2025-08-31 10:00:02] POST /totalmessage\n");
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].raw.contains("first"));
    }

    #[test]
    fn timestamp_lines_that_are_not_requests_do_not_split() {
        let mut extractor = SnapshotExtractor::new();
        extractor.extend("[2025-08-31 10:00:01] POST /totalmessage\n");
        let snapshots =
            extractor.extend("[2025-08-31 10:00:02] GET /health\n[2025-08-31 10:00:03] POST /x\n");
        assert_eq!(snapshots.len(), 1);
        assert!(
            snapshots[0].raw.contains("GET /health"),
            "Non-POST timestamp lines belong to the surrounding snapshot"
        );
    }
}
