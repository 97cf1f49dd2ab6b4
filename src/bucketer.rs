//! Deterministic bucketing.
use std::io::Cursor;

use crate::datafile::TrafficSplit;

/// Total number of buckets. Traffic-allocation endpoints are expressed in the
/// same scale, so an endpoint of 5000 covers 50% of traffic.
pub const MAX_TRAFFIC_VALUE: u32 = 10_000;

/// Hash seed shared by all SDK implementations. Changing it reshuffles every
/// user of every experiment.
const BUCKETING_SEED: u32 = 1;

/// Maps a bucketing id and a parent entity id to a bucket value.
///
/// Implementations must be pure: identical inputs always produce the identical
/// value, with no I/O and no random state.
pub trait Bucketer {
    /// Return a bucket value in `[0, MAX_TRAFFIC_VALUE)`.
    fn bucket_value(&self, bucketing_id: &str, parent_id: &str) -> u32;
}

/// The default (and only) bucketer, hashing with murmur3 x86 32-bit.
pub struct MurmurBucketer;

impl Bucketer for MurmurBucketer {
    fn bucket_value(&self, bucketing_id: &str, parent_id: &str) -> u32 {
        let key = format!("{bucketing_id}{parent_id}");
        let hash = murmur3::murmur3_32(&mut Cursor::new(key.as_bytes()), BUCKETING_SEED)
            .expect("reading from an in-memory buffer cannot fail");
        hash % MAX_TRAFFIC_VALUE
    }
}

/// Resolve a traffic allocation for the given bucketing id.
///
/// Endpoints are cumulative: the first entry whose `end_of_range` is strictly
/// greater than the bucket value wins. Returns `None` when the value falls
/// beyond the last endpoint, i.e. the allocation covers less than 100% of
/// traffic.
pub fn bucket<'a>(
    bucketer: &impl Bucketer,
    bucketing_id: &str,
    parent_id: &str,
    traffic_allocation: &'a [TrafficSplit],
) -> Option<&'a str> {
    let value = bucketer.bucket_value(bucketing_id, parent_id);

    log::trace!(target: "stratum",
        bucketing_id,
        parent_id,
        bucket_value = value;
        "computed bucket value");

    traffic_allocation
        .iter()
        .find(|split| value < split.end_of_range)
        .map(|split| split.entity_id.as_str())
}
