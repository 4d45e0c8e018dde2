/// Maps a per-channel sample index to a byte offset in the container.
///
/// For FLAC the offset is relative to the first frame; for Ogg it is absolute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SeekPoint {
    pub sample_index: u64,
    pub byte_offset: u64,
}

impl SeekPoint {
    pub const START: SeekPoint = SeekPoint {
        sample_index: 0,
        byte_offset: 0,
    };

    pub fn new(sample_index: u64, byte_offset: u64) -> Self {
        SeekPoint {
            sample_index,
            byte_offset,
        }
    }
}

/// Finds the last seek point whose sample index does not exceed `target`.
///
/// `points` must be sorted by sample index. Among equal indices the later point wins. If the
/// table is empty, or every point lies past the target, the first point (or [`SeekPoint::START`]
/// for an empty table) is returned.
pub fn find_seek_point(points: &[SeekPoint], target: u64) -> SeekPoint {
    if points.is_empty() {
        return SeekPoint::START;
    }

    let mut low = 0;
    let mut high = points.len() - 1;

    while high > low {
        let mid = (low + high + 1) / 2;
        if points[mid].sample_index > target {
            high = mid - 1;
        } else {
            low = mid;
        }
    }

    points[low]
}
