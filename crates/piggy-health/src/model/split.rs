use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Train and test row indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Stratified shuffle split. The test share is `ceil(test_size * n)`, allocated to classes in
/// proportion to their size (largest remainders first), and the train side is never empty.
pub fn stratified_split(labels: &[usize], test_size: f64, seed: u64) -> Partition {
    let n = labels.len();
    let mut n_test = (test_size * n as f64).ceil() as usize;
    if n_test >= n {
        n_test = n.saturating_sub(1);
    }

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (index, label) in labels.iter().enumerate() {
        by_class.entry(*label).or_default().push(index);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    for members in by_class.values_mut() {
        members.shuffle(&mut rng);
    }

    let mut quotas: Vec<(usize, usize, f64)> = by_class
        .iter()
        .map(|(class, members)| {
            let exact = n_test as f64 * members.len() as f64 / n.max(1) as f64;
            (*class, exact.floor() as usize, exact - exact.floor())
        })
        .collect();
    let assigned: usize = quotas.iter().map(|(_, quota, _)| quota).sum();
    let mut order: Vec<usize> = (0..quotas.len()).collect();
    order.sort_by(|a, b| quotas[*b].2.total_cmp(&quotas[*a].2).then(a.cmp(b)));
    for position in order.into_iter().cycle().take(n_test.saturating_sub(assigned)) {
        quotas[position].1 += 1;
    }

    let mut partition = Partition {
        train: Vec::with_capacity(n - n_test),
        test: Vec::with_capacity(n_test),
    };
    for (class, quota, _) in quotas {
        let members = &by_class[&class];
        let quota = quota.min(members.len());
        partition.test.extend_from_slice(&members[..quota]);
        partition.train.extend_from_slice(&members[quota..]);
    }
    partition.train.sort_unstable();
    partition.test.sort_unstable();
    partition
}

/// Assigns every row to one of `k` folds, dealing each class round-robin after a shuffle.
pub fn stratified_folds(labels: &[usize], k: usize, seed: u64) -> Vec<Vec<usize>> {
    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (index, label) in labels.iter().enumerate() {
        by_class.entry(*label).or_default().push(index);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut folds = vec![Vec::new(); k.max(1)];
    let mut next = 0;
    for members in by_class.values_mut() {
        members.shuffle(&mut rng);
        for index in members.iter() {
            let slot = next % folds.len();
            folds[slot].push(*index);
            next += 1;
        }
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    folds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_preserves_class_proportions() {
        let labels: Vec<usize> = (0..100).map(|i| if i < 80 { 0 } else { 1 }).collect();
        let partition = stratified_split(&labels, 0.2, 42);

        assert_eq!(partition.test.len(), 20);
        assert_eq!(partition.train.len(), 80);
        let minority = partition.test.iter().filter(|&&i| labels[i] == 1).count();
        assert_eq!(minority, 4);
    }

    #[test]
    fn split_is_deterministic_for_a_seed() {
        let labels: Vec<usize> = (0..50).map(|i| i % 3).collect();
        assert_eq!(
            stratified_split(&labels, 0.3, 42),
            stratified_split(&labels, 0.3, 42)
        );
    }

    #[test]
    fn tiny_inputs_keep_a_training_row() {
        let partition = stratified_split(&[0, 1], 0.9, 1);
        assert_eq!(partition.train.len(), 1);
        assert_eq!(partition.test.len(), 1);
    }

    #[test]
    fn folds_cover_every_row_once() {
        let labels: Vec<usize> = (0..31).map(|i| i % 4).collect();
        let folds = stratified_folds(&labels, 3, 42);
        let mut all: Vec<usize> = folds.concat();
        all.sort_unstable();
        assert_eq!(all, (0..31).collect::<Vec<_>>());
        assert!(folds.iter().all(|fold| fold.len() >= 10));
    }
}
