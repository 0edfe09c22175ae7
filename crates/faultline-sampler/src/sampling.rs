//! Pure sampling algorithms: dedup, stratified sampling, apportionment.

use std::collections::HashSet;

use faultline_entities::exceptions;
use rand::Rng;

/// Dedup fingerprint over the fields that make two occurrences "the same"
/// for corpus purposes. Absent fields collapse to empty strings.
pub fn fingerprint(exception: &exceptions::Model) -> String {
    [
        exception.name.as_str(),
        exception.message.as_str(),
        exception.url.as_deref().unwrap_or(""),
        exception.method.map(|m| m.as_str()).unwrap_or(""),
        exception.status.as_deref().unwrap_or(""),
        &exception
            .status_code
            .map(|c| c.to_string())
            .unwrap_or_default(),
    ]
    .join("|")
}

/// Drop duplicate occurrences, keeping the first per fingerprint.
///
/// Pools arrive newest-first, so "first" means the newest occurrence wins.
/// Order is preserved and the operation is idempotent.
pub fn dedupe(pool: Vec<exceptions::Model>) -> Vec<exceptions::Model> {
    let mut seen = HashSet::new();
    pool.into_iter()
        .filter(|exception| seen.insert(fingerprint(exception)))
        .collect()
}

/// Stratified sample of at most `limit` items from a newest-first pool.
///
/// Keeps `ceil(limit * 0.5)` newest and `floor(limit * 0.2)` oldest items
/// outright; the rest is drawn uniformly without replacement from the
/// middle. Pools at or under the limit pass through unchanged.
pub fn stratified_sample<T, R: Rng>(mut pool: Vec<T>, limit: usize, rng: &mut R) -> Vec<T> {
    if pool.len() <= limit {
        return pool;
    }

    let newest_count = (limit as f64 * 0.5).ceil() as usize;
    let oldest_count = (limit as f64 * 0.2).floor() as usize;
    let remaining = limit - newest_count - oldest_count;

    let oldest: Vec<T> = pool.split_off(pool.len() - oldest_count);
    let mut middle: Vec<T> = pool.split_off(newest_count);
    let newest = pool;

    // Draw without replacement: pick an index, remove it, repeat
    let draw_count = remaining.min(middle.len());
    let mut drawn = Vec::with_capacity(draw_count);
    for _ in 0..draw_count {
        let index = rng.gen_range(0..middle.len());
        drawn.push(middle.remove(index));
    }

    let mut result = newest;
    result.extend(drawn);
    result.extend(oldest);
    result.truncate(limit);
    result
}

/// Largest-remainder apportionment of `budget` units across issue counts.
///
/// When the counts already fit the budget they are returned unchanged.
/// Otherwise each issue gets `max(1, floor(count/total * budget))`, and
/// rounding drift is corrected one unit at a time by fractional remainder:
/// additions go to the largest remainders first, removals take from the
/// smallest, with no issue ever going below 1 or above its own count.
pub fn apportion(counts: &[usize], budget: usize) -> Vec<usize> {
    let total: usize = counts.iter().sum();
    if total <= budget || counts.is_empty() {
        return counts.to_vec();
    }

    let mut allotments: Vec<usize> = Vec::with_capacity(counts.len());
    let mut remainders: Vec<f64> = Vec::with_capacity(counts.len());
    for &count in counts {
        let exact = count as f64 / total as f64 * budget as f64;
        let floored = exact.floor();
        allotments.push((floored as usize).max(1));
        remainders.push(exact - floored);
    }

    let mut by_remainder: Vec<usize> = (0..counts.len()).collect();
    by_remainder.sort_by(|&a, &b| {
        remainders[b]
            .partial_cmp(&remainders[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    loop {
        let sum: usize = allotments.iter().sum();
        if sum == budget {
            break;
        }

        let mut changed = false;
        if sum < budget {
            // Hand extra units to the largest remainders first
            for &i in &by_remainder {
                if allotments[i] < counts[i] {
                    allotments[i] += 1;
                    changed = true;
                    break;
                }
            }
        } else {
            // Claw back from the smallest remainders first
            for &i in by_remainder.iter().rev() {
                if allotments[i] > 1 {
                    allotments[i] -= 1;
                    changed = true;
                    break;
                }
            }
        }

        // Every issue is pinned at its floor or ceiling; nothing more to do
        if !changed {
            break;
        }
    }

    allotments
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use faultline_entities::types::Environment;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn test_exception(id: i64, name: &str, message: &str, url: Option<&str>) -> exceptions::Model {
        exceptions::Model {
            id,
            project_id: 1,
            issue_id: Some(1),
            environment: Environment::Production,
            platform: None,
            name: name.to_string(),
            message: message.to_string(),
            details: None,
            stack_trace: None,
            frames: None,
            url: url.map(str::to_string),
            method: None,
            status: None,
            status_code: None,
            client_ip: None,
            response_body: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_dedupe_keeps_newest_occurrence() {
        let pool = vec![
            test_exception(3, "TypeError", "boom", Some("/a")),
            test_exception(2, "TypeError", "boom", Some("/a")),
            test_exception(1, "TypeError", "boom", Some("/b")),
        ];

        let deduped = dedupe(pool);
        let ids: Vec<i64> = deduped.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn test_dedupe_is_idempotent() {
        let pool = vec![
            test_exception(4, "A", "x", None),
            test_exception(3, "A", "x", None),
            test_exception(2, "B", "y", None),
            test_exception(1, "B", "z", None),
        ];

        let once = dedupe(pool.clone());
        let twice = dedupe(once.clone());
        assert_eq!(once.len(), twice.len());
        assert!(once.len() <= pool.len());
        let once_ids: Vec<i64> = once.iter().map(|e| e.id).collect();
        let twice_ids: Vec<i64> = twice.iter().map(|e| e.id).collect();
        assert_eq!(once_ids, twice_ids);
    }

    #[test]
    fn test_stratified_sample_small_pool_is_unchanged() {
        let mut rng = StdRng::seed_from_u64(7);
        let pool: Vec<u32> = (0..8).collect();
        assert_eq!(stratified_sample(pool.clone(), 10, &mut rng), pool);
    }

    #[test]
    fn test_stratified_sample_keeps_newest_and_oldest_strata() {
        let mut rng = StdRng::seed_from_u64(7);
        let pool: Vec<u32> = (0..100).collect();
        let limit = 10;

        let sample = stratified_sample(pool, limit, &mut rng);
        assert_eq!(sample.len(), limit);

        // First ceil(10 * 0.5) = 5 are exactly the newest five
        assert_eq!(&sample[..5], &[0, 1, 2, 3, 4]);
        // Last floor(10 * 0.2) = 2 are exactly the oldest two
        assert_eq!(&sample[8..], &[98, 99]);
        // The drawn middle comes from the middle range
        for &item in &sample[5..8] {
            assert!((5..98).contains(&item));
        }
    }

    #[test]
    fn test_stratified_sample_is_deterministic_per_seed() {
        let pool: Vec<u32> = (0..50).collect();

        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        assert_eq!(
            stratified_sample(pool.clone(), 10, &mut rng_a),
            stratified_sample(pool, 10, &mut rng_b)
        );
    }

    #[test]
    fn test_stratified_sample_has_no_duplicates() {
        let mut rng = StdRng::seed_from_u64(3);
        let pool: Vec<u32> = (0..30).collect();
        let sample = stratified_sample(pool, 20, &mut rng);

        let mut unique: Vec<u32> = sample.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), sample.len());
    }

    #[test]
    fn test_apportion_under_budget_is_unchanged() {
        // Three issues at 5 samples each against a budget of 100
        assert_eq!(apportion(&[5, 5, 5], 100), vec![5, 5, 5]);
    }

    #[test]
    fn test_apportion_sums_to_budget_exactly() {
        let cases: [(&[usize], usize); 4] = [
            (&[50, 30, 20], 10),
            (&[1, 1, 98], 10),
            (&[7, 7, 7, 7], 9),
            (&[100, 1, 1, 1], 50),
        ];
        for (counts, budget) in cases {
            let allotments = apportion(counts, budget);
            assert_eq!(
                allotments.iter().sum::<usize>(),
                budget,
                "counts {:?} budget {}",
                counts,
                budget
            );
            for (allotment, &count) in allotments.iter().zip(counts) {
                assert!(*allotment >= 1);
                assert!(*allotment <= count.max(1));
            }
        }
    }

    #[test]
    fn test_apportion_overshoot_takes_from_smallest_remainders() {
        // Floors with the minimum of 1 sum to 11, one over budget. The
        // clawed-back unit comes from the smallest remainder that can still
        // give one up (0.804, the 49), not from the largest (0.902, the 50).
        assert_eq!(apportion(&[50, 49, 1, 1, 1], 10), vec![4, 3, 1, 1, 1]);
    }

    #[test]
    fn test_apportion_is_proportional() {
        let allotments = apportion(&[80, 10, 10], 10);
        assert_eq!(allotments.iter().sum::<usize>(), 10);
        assert!(allotments[0] > allotments[1]);
        assert!(allotments[1] >= 1);
        assert!(allotments[2] >= 1);
    }
}
