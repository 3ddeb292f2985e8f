//! Part planning for multipart uploads
//!
//! Picks a part size from the object size so that small objects go up as a
//! single part and large objects stay well inside the backend's part limits.

use crate::config::UploadSettings;
use crate::session::PartPlan;

pub const MIB: u64 = 1024 * 1024;

/// S3 refuses any non-final part smaller than this.
pub const S3_MIN_PART_SIZE: u64 = 5 * MIB;

/// S3 refuses any part larger than this.
pub const S3_MAX_PART_SIZE: u64 = 5 * 1024 * MIB;

/// S3 caps a multipart upload at this many parts.
pub const S3_MAX_PARTS: u64 = 10_000;

/// Largest object the part cap and part size limit allow together.
pub const MAX_PLANNABLE_SIZE: u64 = S3_MAX_PARTS * S3_MAX_PART_SIZE;

/// Computes part size and count from the total object size.
#[derive(Debug, Clone, Copy)]
pub struct PartPlanner {
    min_part_size: u64,
    medium_part_size: u64,
    large_part_size: u64,
    large_file_threshold: u64,
}

impl Default for PartPlanner {
    fn default() -> Self {
        Self {
            min_part_size: S3_MIN_PART_SIZE,
            medium_part_size: 50 * MIB,
            large_part_size: 100 * MIB,
            large_file_threshold: 500 * MIB,
        }
    }
}

impl PartPlanner {
    pub fn new(settings: &UploadSettings) -> Self {
        Self {
            min_part_size: settings.min_part_size,
            medium_part_size: settings.medium_part_size,
            large_part_size: settings.large_part_size,
            large_file_threshold: settings.large_file_threshold,
        }
    }

    pub fn min_part_size(&self) -> u64 {
        self.min_part_size
    }

    /// Plan the parts for an object of `total_size` bytes.
    ///
    /// `total_size` must be non-zero; callers validate this. A zero size is
    /// planned as a single minimum-size part.
    pub fn plan(&self, total_size: u64) -> PartPlan {
        debug_assert!(total_size > 0, "part planning requires a non-empty object");

        let mut part_size = if total_size >= self.large_file_threshold {
            self.large_part_size
        } else if total_size > self.medium_part_size {
            self.medium_part_size
        } else {
            total_size.max(self.min_part_size)
        };

        // Grow the part size (whole MiB) until the count fits the backend cap.
        if total_size.div_ceil(part_size) > S3_MAX_PARTS {
            part_size = total_size.div_ceil(S3_MAX_PARTS).div_ceil(MIB) * MIB;
        }

        let part_count = total_size.div_ceil(part_size).max(1);

        PartPlan {
            part_size,
            part_count: part_count as u32,
        }
    }
}
