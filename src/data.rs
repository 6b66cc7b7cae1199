//! Training Data
//!
//! Turns the bundled corpus into batches of next-token prediction examples.
//!
//! ## Sliding Windows
//!
//! ```text
//! tokens:  [t0 t1 t2 t3 t4 t5 t6 t7 t8 ...]   max_length = stride = 4
//!
//! window 0: input [t0 t1 t2 t3]  target [t1 t2 t3 t4]
//! window 1: input [t4 t5 t6 t7]  target [t5 t6 t7 t8]
//! ```
//!
//! A window starts at every multiple of `stride` strictly below
//! `len - max_length`, so a window's target never runs past the end of the
//! token stream.
//!
//! ## Batching
//!
//! The training loader reshuffles the window order every epoch from the
//! trainer's seeded generator and drops a trailing partial batch. The
//! validation loader keeps corpus order and keeps every window.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// The short story every training run uses
pub const CORPUS: &str = include_str!("../data/the-lighthouse-keeper.txt");

/// `(inputs, targets)`, each `[batch_size][seq_len]`
pub type Batch = (Vec<Vec<usize>>, Vec<Vec<usize>>);

/// Split text at `floor(train_ratio * chars)` characters
///
/// Counts characters rather than bytes so the cut never lands inside a
/// multi-byte character.
pub fn split_text(text: &str, train_ratio: f64) -> (&str, &str) {
    let n_chars = text.chars().count();
    let split_chars = (train_ratio * n_chars as f64) as usize;
    let split_byte = text
        .char_indices()
        .nth(split_chars)
        .map_or(text.len(), |(byte, _)| byte);
    text.split_at(split_byte)
}

/// Input/target windows over a token stream
pub struct GptDataset {
    inputs: Vec<Vec<usize>>,
    targets: Vec<Vec<usize>>,
}

impl GptDataset {
    /// # Panics
    ///
    /// Panics if `max_length` or `stride` is zero.
    pub fn new(token_ids: &[usize], max_length: usize, stride: usize) -> Self {
        assert!(max_length > 0 && stride > 0, "max_length and stride must be > 0");
        let mut inputs = Vec::new();
        let mut targets = Vec::new();

        for start in (0..token_ids.len().saturating_sub(max_length)).step_by(stride) {
            inputs.push(token_ids[start..start + max_length].to_vec());
            targets.push(token_ids[start + 1..start + max_length + 1].to_vec());
        }

        Self { inputs, targets }
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn get(&self, index: usize) -> (&[usize], &[usize]) {
        (&self.inputs[index], &self.targets[index])
    }
}

/// Groups dataset windows into batches
pub struct DataLoader {
    dataset: GptDataset,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
}

impl DataLoader {
    pub fn new(dataset: GptDataset, batch_size: usize, shuffle: bool, drop_last: bool) -> Self {
        assert!(batch_size > 0, "batch_size must be > 0");
        Self {
            dataset,
            batch_size,
            shuffle,
            drop_last,
        }
    }

    pub fn dataset(&self) -> &GptDataset {
        &self.dataset
    }

    pub fn num_batches(&self) -> usize {
        let n = self.dataset.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    /// Materialise one epoch of batches
    ///
    /// A shuffling loader permutes the windows with `rng`; given `None` it
    /// yields them in corpus order.
    pub fn batches(&self, rng: Option<&mut StdRng>) -> Vec<Batch> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if let (true, Some(rng)) = (self.shuffle, rng) {
            order.shuffle(rng);
        }

        order
            .chunks(self.batch_size)
            .filter(|chunk| !self.drop_last || chunk.len() == self.batch_size)
            .map(|chunk| self.collect_batch(chunk))
            .collect()
    }

    /// The first `n` batches in corpus order, without building the rest
    pub fn first_batches(&self, n: usize) -> Vec<Batch> {
        let n = n.min(self.num_batches());
        (0..n)
            .map(|b| {
                let start = b * self.batch_size;
                let end = (start + self.batch_size).min(self.dataset.len());
                let indices: Vec<usize> = (start..end).collect();
                self.collect_batch(&indices)
            })
            .collect()
    }

    fn collect_batch(&self, indices: &[usize]) -> Batch {
        indices
            .iter()
            .map(|&i| {
                let (input, target) = self.dataset.get(i);
                (input.to_vec(), target.to_vec())
            })
            .unzip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_windows_and_targets() {
        let tokens: Vec<usize> = (0..10).collect();
        let ds = GptDataset::new(&tokens, 4, 4);
        // Starts at 0 and 4; 8 is not below 10 - 4
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(1), (&[4, 5, 6, 7][..], &[5, 6, 7, 8][..]));

        assert!(GptDataset::new(&tokens[..4], 4, 4).is_empty());
    }

    #[test]
    fn test_split_on_characters() {
        let (train, val) = split_text("abcdéfghij", 0.5);
        assert_eq!(train, "abcdé");
        assert_eq!(val, "fghij");

        let (train, val) = split_text("abc", 1.0);
        assert_eq!((train, val), ("abc", ""));
    }

    #[test]
    fn test_drop_last_and_num_batches() {
        let tokens: Vec<usize> = (0..23).collect();
        let ds = || GptDataset::new(&tokens, 2, 2); // 11 windows

        let train = DataLoader::new(ds(), 3, true, true);
        assert_eq!(train.num_batches(), 3);
        let mut rng = StdRng::seed_from_u64(0);
        let batches = train.batches(Some(&mut rng));
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|(x, y)| x.len() == 3 && y.len() == 3));

        let val = DataLoader::new(ds(), 3, false, false);
        assert_eq!(val.num_batches(), 4);
        let batches = val.batches(None);
        assert_eq!(batches.len(), 4);
        assert_eq!(batches[3].0, vec![vec![18, 19], vec![20, 21]]);
        assert_eq!(batches[3].1, vec![vec![19, 20], vec![21, 22]]);
    }

    #[test]
    fn test_first_batches_match_unshuffled_prefix() {
        let tokens: Vec<usize> = (0..23).collect();
        let ds = || GptDataset::new(&tokens, 2, 2); // 11 windows

        let val = DataLoader::new(ds(), 3, false, false);
        let all = val.batches(None);
        assert_eq!(val.first_batches(2), all[..2].to_vec());
        // Asking past the end keeps the trailing partial batch
        assert_eq!(val.first_batches(10), all);

        let train = DataLoader::new(ds(), 3, true, true);
        assert_eq!(train.first_batches(10), train.batches(None));
        assert!(train.first_batches(0).is_empty());
    }

    #[test]
    fn test_shuffle_is_seeded() {
        let tokens: Vec<usize> = (0..100).collect();
        let loader = DataLoader::new(GptDataset::new(&tokens, 3, 3), 4, true, true);
        let a = loader.batches(Some(&mut StdRng::seed_from_u64(7)));
        let b = loader.batches(Some(&mut StdRng::seed_from_u64(7)));
        assert_eq!(a, b);
        assert_ne!(a, loader.batches(None));
    }

    #[test]
    fn test_bundled_corpus_split() {
        let (train, val) = split_text(CORPUS, 0.9);
        assert_eq!(train.len() + val.len(), CORPUS.len());
        assert!(!val.is_empty());
    }
}
