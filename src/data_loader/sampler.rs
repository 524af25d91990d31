//! src/data_loader/sampler.rs
//! Logical-to-storage index mapping for the data manager.
//!
//! An `AccessorArray` holds a flat permutation of store positions and an
//! optional batch size. When batched, the permutation is read in consecutive
//! groups; only the final group may be shorter. Shuffling permutes the flat
//! order, so every position appears exactly once in either view.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::data_loader::dataset::DataError;

/// A random permutation of `0..len`.
///
/// The generator is local to the call; with `seed` the order is reproducible.
pub fn permutation(len: usize, seed: Option<u64>) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..len).collect();
    shuffle_in_place(&mut indices, seed);
    indices
}

/// Fisher–Yates over `values` with a ChaCha20 generator.
pub fn shuffle_in_place<T>(values: &mut [T], seed: Option<u64>) {
    let seed = seed.unwrap_or_else(rand::random::<u64>);
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    for i in (1..values.len()).rev() {
        let j = rng.random_range(0..=i);
        values.swap(i, j);
    }
}

/// Store positions addressed by one logical index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved<'a> {
    Single(usize),
    Group(&'a [usize]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessorArray {
    order: Vec<usize>,
    batch_size: Option<usize>,
}

impl AccessorArray {
    /// Identity order over `len` positions, unbatched.
    pub fn new(len: usize) -> Self {
        Self {
            order: (0..len).collect(),
            batch_size: None,
        }
    }

    pub fn shuffle(&mut self, seed: Option<u64>) {
        shuffle_in_place(&mut self.order, seed);
        tracing::debug!(
            "Shuffled {} positions (seed {:?}, batch size {:?})",
            self.order.len(),
            seed,
            self.batch_size
        );
    }

    /// `None` or `0` unbatches; `1` is ignored; larger sizes regroup the
    /// current order.
    pub fn set_batch(&mut self, size: Option<usize>) {
        match size {
            None | Some(0) => self.batch_size = None,
            Some(1) => {}
            Some(n) => self.batch_size = Some(n),
        }
    }

    pub fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    pub fn is_batched(&self) -> bool {
        self.batch_size.is_some()
    }

    /// Number of samples when unbatched, of groups when batched.
    pub fn len(&self) -> usize {
        match self.batch_size {
            Some(n) => self.order.len().div_ceil(n),
            None => self.order.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The flat order, regardless of batching.
    pub fn positions(&self) -> &[usize] {
        &self.order
    }

    pub fn resolve(&self, index: usize) -> Result<Resolved<'_>, DataError> {
        let len = self.len();
        if index >= len {
            return Err(DataError::IndexOutOfRange { index, len });
        }
        Ok(match self.batch_size {
            Some(n) => {
                let start = index * n;
                let end = (start + n).min(self.order.len());
                Resolved::Group(&self.order[start..end])
            }
            None => Resolved::Single(self.order[index]),
        })
    }

    /// Groups in order; one single-element group per sample when unbatched.
    pub fn groups(&self) -> impl Iterator<Item = &[usize]> {
        self.order.chunks(self.batch_size.unwrap_or(1).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_shuffle_is_deterministic() {
        let mut a = AccessorArray::new(20);
        let mut b = AccessorArray::new(20);
        a.shuffle(Some(42));
        b.shuffle(Some(42));
        assert_eq!(a, b);
        assert_ne!(a.positions(), (0..20).collect::<Vec<_>>().as_slice());
    }

    #[test]
    fn batching_partitions_positions() {
        let mut acc = AccessorArray::new(10);
        acc.shuffle(Some(7));
        acc.set_batch(Some(3));
        assert_eq!(acc.len(), 4);

        let mut seen: Vec<usize> = acc.groups().flatten().copied().collect();
        assert_eq!(acc.groups().last().map(<[usize]>::len), Some(1));
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());

        assert_eq!(acc.resolve(3).unwrap(), Resolved::Group(&acc.positions()[9..10]));
    }

    #[test]
    fn unbatching_restores_length_and_order() {
        let mut acc = AccessorArray::new(7);
        acc.shuffle(Some(1));
        let flat = acc.positions().to_vec();
        acc.set_batch(Some(2));
        acc.set_batch(Some(0));
        assert_eq!(acc.len(), 7);
        assert_eq!(acc.positions(), flat.as_slice());
        assert!(!acc.is_batched());
    }

    #[test]
    fn batch_of_one_is_ignored() {
        let mut acc = AccessorArray::new(5);
        acc.set_batch(Some(1));
        assert!(!acc.is_batched());

        acc.set_batch(Some(2));
        acc.set_batch(Some(1));
        assert_eq!(acc.batch_size(), Some(2));
    }

    #[test]
    fn out_of_range_is_reported() {
        let mut acc = AccessorArray::new(4);
        assert!(matches!(
            acc.resolve(4),
            Err(DataError::IndexOutOfRange { index: 4, len: 4 })
        ));
        acc.set_batch(Some(3));
        assert!(acc.resolve(1).is_ok());
        assert!(acc.resolve(2).is_err());
    }

    #[test]
    fn permutation_draws_every_position_at_each_slot() {
        // each value should land in each slot about equally often
        let mut hits = [[0usize; 3]; 3];
        for seed in 0..600 {
            for (slot, &value) in permutation(3, Some(seed)).iter().enumerate() {
                hits[slot][value] += 1;
            }
        }
        for row in hits {
            assert!(row.iter().all(|&n| (120..=280).contains(&n)), "skewed counts {row:?}");
        }
    }

    #[test]
    fn shuffle_while_batched_keeps_group_size() {
        let mut acc = AccessorArray::new(9);
        acc.set_batch(Some(4));
        acc.shuffle(Some(3));
        assert_eq!(acc.batch_size(), Some(4));
        let sizes: Vec<_> = acc.groups().map(<[usize]>::len).collect();
        assert_eq!(sizes, vec![4, 4, 1]);
    }
}
