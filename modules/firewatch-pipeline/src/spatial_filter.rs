//! Novelty filtering for incoming detections.
//!
//! Pure functions that decide whether a detection is a new fire, given the
//! cached events and the rest of the incoming batch. Two predicates:
//!
//! 1. Novel: no cached event lies within `dedup_radius_m`.
//! 2. Corroborated (only when the policy sets `proximity_radius_m`): at least
//!    one *other* detection in the same batch lies within that radius.
//!
//! Pairwise haversine, O(batch × cache).

use firewatch_common::{haversine_m, Detection, FilterPolicy, GeoPoint};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Result of evaluating one detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// New fire, persist it.
    Novel,
    /// A cached event is closer than the dedup radius.
    Duplicate,
    /// Nothing else in the batch is within the proximity radius.
    Isolated,
}

/// Counters produced by a batch filter run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FilterStats {
    pub candidates: u32,
    pub novel: u32,
    pub duplicates: u32,
    pub isolated: u32,
}

// ---------------------------------------------------------------------------
// Pure decision functions
// ---------------------------------------------------------------------------

/// True when no existing point is closer than `dedup_radius_m`.
/// A point exactly at the radius counts as novel.
pub fn is_novel(candidate: GeoPoint, existing: &[GeoPoint], dedup_radius_m: f64) -> bool {
    !existing
        .iter()
        .any(|p| haversine_m(candidate, *p) < dedup_radius_m)
}

/// True when some other batch member (by position) is closer than
/// `proximity_radius_m`. Identical coordinates at different positions count.
pub fn has_neighbor(index: usize, batch: &[GeoPoint], proximity_radius_m: f64) -> bool {
    let Some(&candidate) = batch.get(index) else {
        return false;
    };
    batch
        .iter()
        .enumerate()
        .any(|(i, p)| i != index && haversine_m(candidate, *p) < proximity_radius_m)
}

/// Classify the batch member at `index`. Duplicates are reported before
/// isolation.
pub fn evaluate(
    index: usize,
    batch: &[GeoPoint],
    existing: &[GeoPoint],
    policy: &FilterPolicy,
) -> Verdict {
    let Some(&candidate) = batch.get(index) else {
        return Verdict::Isolated;
    };

    if !is_novel(candidate, existing, policy.dedup_radius_m) {
        return Verdict::Duplicate;
    }

    match policy.proximity_radius_m {
        Some(radius) if !has_neighbor(index, batch, radius) => Verdict::Isolated,
        _ => Verdict::Novel,
    }
}

// ---------------------------------------------------------------------------
// Batch orchestrator
// ---------------------------------------------------------------------------

/// Filter a batch of detections against the cached points. Returns the novel
/// detections in input order with stats.
pub fn filter_batch(
    batch: Vec<Detection>,
    existing: &[GeoPoint],
    policy: &FilterPolicy,
) -> (Vec<Detection>, FilterStats) {
    let points: Vec<GeoPoint> = batch.iter().map(Detection::point).collect();
    let mut stats = FilterStats {
        candidates: batch.len() as u32,
        ..Default::default()
    };
    let mut novel = Vec::with_capacity(batch.len());

    for (index, detection) in batch.into_iter().enumerate() {
        match evaluate(index, &points, existing, policy) {
            Verdict::Novel => {
                stats.novel += 1;
                novel.push(detection);
            }
            Verdict::Duplicate => stats.duplicates += 1,
            Verdict::Isolated => stats.isolated += 1,
        }
    }

    (novel, stats)
}

// ===========================================================================
// Unit tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{detection, offset_north};

    const ATHENS: GeoPoint = GeoPoint::new(37.9838, 23.7275);
    const PATRAS: GeoPoint = GeoPoint::new(38.2466, 21.7346);

    #[test]
    fn novel_at_or_beyond_dedup_radius() {
        let cached = [ATHENS];
        assert!(is_novel(offset_north(ATHENS, 100.5), &cached, 100.0));
        assert!(is_novel(offset_north(ATHENS, 150.0), &cached, 100.0));
    }

    #[test]
    fn duplicate_inside_dedup_radius() {
        let cached = [ATHENS];
        assert!(!is_novel(offset_north(ATHENS, 99.5), &cached, 100.0));
        assert!(!is_novel(ATHENS, &cached, 100.0));
    }

    #[test]
    fn empty_cache_is_always_novel() {
        assert!(is_novel(ATHENS, &[], 100.0));
    }

    #[test]
    fn neighbor_excludes_self() {
        let batch = [ATHENS];
        assert!(!has_neighbor(0, &batch, 10_000.0));
    }

    #[test]
    fn identical_points_corroborate_each_other() {
        let batch = [ATHENS, ATHENS];
        assert!(has_neighbor(0, &batch, 10_000.0));
        assert!(has_neighbor(1, &batch, 10_000.0));
    }

    #[test]
    fn distant_batch_members_do_not_corroborate() {
        // Athens to Patras is ~180km
        let batch = [ATHENS, PATRAS];
        assert!(!has_neighbor(0, &batch, 10_000.0));
    }

    #[test]
    fn duplicate_reported_before_isolation() {
        let batch = [ATHENS];
        let verdict = evaluate(0, &batch, &[ATHENS], &FilterPolicy::corroborated());
        assert_eq!(verdict, Verdict::Duplicate);
    }

    #[test]
    fn isolated_detection_rejected_under_corroborated_policy() {
        let batch = [ATHENS];
        assert_eq!(
            evaluate(0, &batch, &[], &FilterPolicy::corroborated()),
            Verdict::Isolated
        );
    }

    #[test]
    fn isolated_detection_accepted_under_dedup_only_policy() {
        let batch = [ATHENS];
        assert_eq!(
            evaluate(0, &batch, &[], &FilterPolicy::dedup_only()),
            Verdict::Novel
        );
    }

    #[test]
    fn dedup_only_uses_wider_radius() {
        let batch = [offset_north(ATHENS, 500.0)];
        assert_eq!(
            evaluate(0, &batch, &[ATHENS], &FilterPolicy::dedup_only()),
            Verdict::Duplicate
        );
        assert_eq!(
            evaluate(0, &[offset_north(ATHENS, 500.0), ATHENS], &[], &FilterPolicy::corroborated()),
            Verdict::Novel
        );
    }

    #[test]
    fn pair_fifty_meters_apart_both_pass() {
        let a = ATHENS;
        let b = offset_north(ATHENS, 50.0);
        let batch = vec![
            detection(a.lat, a.lng, "2024-08-11"),
            detection(b.lat, b.lng, "2024-08-11"),
        ];

        let (kept, stats) = filter_batch(batch, &[], &FilterPolicy::corroborated());
        assert_eq!(kept.len(), 2);
        assert_eq!(stats.novel, 2);
        assert_eq!(stats.isolated, 0);
    }

    #[test]
    fn duplicate_still_corroborates_its_neighbor() {
        // The first detection repeats a cached fire; the second is new but
        // only 2km away, so the first still counts as its neighbor.
        let cached = [ATHENS];
        let near = offset_north(ATHENS, 2_000.0);
        let batch = vec![
            detection(ATHENS.lat, ATHENS.lng, "2024-08-11"),
            detection(near.lat, near.lng, "2024-08-11"),
        ];

        let (kept, stats) = filter_batch(batch, &cached, &FilterPolicy::corroborated());
        assert_eq!(kept.len(), 1);
        assert!((kept[0].latitude - near.lat).abs() < 1e-12);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.novel, 1);
    }

    #[test]
    fn mixed_batch_filters_correctly() {
        let cached = [PATRAS];
        let athens_2 = offset_north(ATHENS, 3_000.0);
        let batch = vec![
            // Novel: corroborated by athens_2
            detection(ATHENS.lat, ATHENS.lng, "2024-08-11"),
            // Novel: corroborated by ATHENS
            detection(athens_2.lat, athens_2.lng, "2024-08-11"),
            // Duplicate of cached Patras fire
            detection(PATRAS.lat, PATRAS.lng, "2024-08-11"),
            // Isolated: Crete, nothing nearby
            detection(35.3387, 25.1442, "2024-08-11"),
        ];

        let (kept, stats) = filter_batch(batch, &cached, &FilterPolicy::corroborated());
        assert_eq!(kept.len(), 2);
        assert_eq!(
            stats,
            FilterStats {
                candidates: 4,
                novel: 2,
                duplicates: 1,
                isolated: 1,
            }
        );
    }

    #[test]
    fn empty_batch() {
        let (kept, stats) = filter_batch(Vec::new(), &[ATHENS], &FilterPolicy::corroborated());
        assert!(kept.is_empty());
        assert_eq!(stats, FilterStats::default());
    }
}
