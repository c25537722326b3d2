//! Capacity partitioning across availability zones.

/// Number of units zone `zone_index` receives when `total` units are
/// spread across `zone_count` zones.
///
/// The remainder goes to the first `total % zone_count` zones in index
/// order, so zone 0 fills up before zone 1. Summing over all indices
/// always yields `total`, and no two zones differ by more than one.
pub fn partition(total: u32, zone_count: u32, zone_index: u32) -> u32 {
    let base = total / zone_count;
    if zone_index < total % zone_count {
        base + 1
    } else {
        base
    }
}
