//! Seeded stratified train/test split.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Split row indices so every class keeps its proportion in both parts.
///
/// Each class contributes `round(count * test_size)` rows to the test part,
/// adjusted so that a class with at least two rows appears in both parts
/// whenever `test_size > 0`.
/// Returns `(train, test)`, each sorted ascending.
pub fn stratified_split(labels: &[u32], test_size: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let n_classes = labels.iter().max().map_or(0, |&m| m as usize + 1);
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (row, &label) in labels.iter().enumerate() {
        by_class[label as usize].push(row);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for mut rows in by_class {
        let count = rows.len();
        if count == 0 {
            continue;
        }
        rows.shuffle(&mut rng);

        let n_test = if test_size <= 0.0 {
            0
        } else if count >= 2 {
            ((count as f64 * test_size).round() as usize).clamp(1, count - 1)
        } else {
            ((count as f64 * test_size).round() as usize).min(count)
        };
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}
