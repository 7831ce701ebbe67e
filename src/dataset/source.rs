//! Sequential batch streams.
//!
//! A [`BatchSource`] hands out the index order of one pass and materializes
//! batches for slices of that order. Sources that shuffle draw a fresh
//! permutation from their own seeded RNG on every pass, so each epoch visits
//! every sample exactly once in a new order.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::dataset::burn_dataset::CropItem;
use crate::dataset::loader::Sample;
use crate::utils::error::{CropError, Result};

/// A record that can name itself in a report
pub trait SampleRecord {
    fn identifier(&self) -> String;
}

impl SampleRecord for CropItem {
    fn identifier(&self) -> String {
        self.image_id.clone()
    }
}

/// A batch that knows the identifiers of its samples, in order
pub trait SampleBatch {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn identifiers(&self) -> Vec<String>;
}

impl<T: SampleRecord> SampleBatch for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn identifiers(&self) -> Vec<String> {
        self.iter().map(SampleRecord::identifier).collect()
    }
}

/// Finite, re-iterable stream of batches
pub trait BatchSource {
    type Batch;

    fn num_samples(&self) -> usize;

    fn batch_size(&self) -> usize;

    fn num_batches(&self) -> usize {
        self.num_samples().div_ceil(self.batch_size().max(1))
    }

    /// Sample order of the next pass; a permutation of `0..num_samples()`
    fn next_order(&mut self) -> Vec<usize>;

    fn load_batch(&self, indices: &[usize]) -> Result<Self::Batch>;
}

/// Iterate one full pass of `source`, batch by batch
pub fn iter_batches<S: BatchSource>(source: &mut S) -> impl Iterator<Item = Result<S::Batch>> + '_ {
    let order = source.next_order();
    let batch_size = source.batch_size().max(1);
    let source: &S = &*source;

    (0..order.len())
        .step_by(batch_size)
        .map(move |start| {
            let end = (start + batch_size).min(order.len());
            source.load_batch(&order[start..end])
        })
}

/// Seeded permutation generator; `None` keeps the natural order
#[derive(Debug, Clone)]
struct Shuffler {
    rng: Option<ChaCha8Rng>,
}

impl Shuffler {
    fn new(seed: Option<u64>) -> Self {
        Self {
            rng: seed.map(ChaCha8Rng::seed_from_u64),
        }
    }

    fn order(&mut self, len: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..len).collect();
        if let Some(rng) = self.rng.as_mut() {
            indices.shuffle(rng);
        }
        indices
    }
}

fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(CropError::Config("batch size must be positive".to_string()));
    }
    Ok(())
}

/// Images on disk, decoded lazily one batch at a time
#[derive(Debug, Clone)]
pub struct ImageFolderSource {
    samples: Vec<Sample>,
    batch_size: usize,
    image_size: usize,
    shuffler: Shuffler,
}

impl ImageFolderSource {
    /// `shuffle_seed = None` yields samples in their stored order
    pub fn new(
        samples: Vec<Sample>,
        batch_size: usize,
        image_size: usize,
        shuffle_seed: Option<u64>,
    ) -> Result<Self> {
        check_batch_size(batch_size)?;
        Ok(Self {
            samples,
            batch_size,
            image_size,
            shuffler: Shuffler::new(shuffle_seed),
        })
    }
}

impl BatchSource for ImageFolderSource {
    type Batch = Vec<CropItem>;

    fn num_samples(&self) -> usize {
        self.samples.len()
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn next_order(&mut self) -> Vec<usize> {
        self.shuffler.order(self.samples.len())
    }

    fn load_batch(&self, indices: &[usize]) -> Result<Self::Batch> {
        indices
            .par_iter()
            .map(|&i| {
                let sample = self.samples.get(i).ok_or_else(|| {
                    CropError::Dataset(format!("Sample index {} out of range", i))
                })?;
                CropItem::from_sample(sample, self.image_size)
            })
            .collect()
    }
}

/// Items already held in memory
#[derive(Debug, Clone)]
pub struct MemorySource<T> {
    items: Vec<T>,
    batch_size: usize,
    shuffler: Shuffler,
}

impl<T: Clone> MemorySource<T> {
    pub fn new(items: Vec<T>, batch_size: usize, shuffle_seed: Option<u64>) -> Result<Self> {
        check_batch_size(batch_size)?;
        Ok(Self {
            items,
            batch_size,
            shuffler: Shuffler::new(shuffle_seed),
        })
    }
}

impl<T: Clone> BatchSource for MemorySource<T> {
    type Batch = Vec<T>;

    fn num_samples(&self) -> usize {
        self.items.len()
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn next_order(&mut self) -> Vec<usize> {
        self.shuffler.order(self.items.len())
    }

    fn load_batch(&self, indices: &[usize]) -> Result<Self::Batch> {
        indices
            .iter()
            .map(|&i| {
                self.items
                    .get(i)
                    .cloned()
                    .ok_or_else(|| CropError::Dataset(format!("Sample index {} out of range", i)))
            })
            .collect()
    }
}
