//! Skip-gram with negative sampling (SGNS) over walk corpora.
//!
//! Walks are "sentences" and node ids are "words": nodes that co-occur inside a
//! context window get pulled together, random nodes drawn from the unigram^0.75
//! distribution get pushed apart.
//!
//! ```text
//! L = log σ(u_ctx · v_center) + Σ_neg log σ(-u_neg · v_center)
//! ```
//!
//! References:
//! - Mikolov et al. (2013). "Distributed Representations of Words and Phrases."
//! - Levy & Goldberg (2014). "Neural Word Embedding as Implicit Matrix Factorization."

use crate::error::{Error, Result};
use ndarray::Array2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use tracing::debug;

const MIN_TABLE: usize = 1_024;
const MAX_TABLE: usize = 10_000_000;
const TABLE_PER_TOKEN: usize = 64;

/// Skip-gram model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkipGramConfig {
    /// Embedding dimension.
    pub embedding_dim: usize,
    /// Maximum context window (each side). The effective window is drawn per position.
    pub window_size: usize,
    /// Negative samples per positive pair.
    pub negative_samples: usize,
    /// Initial learning rate.
    pub learning_rate: f32,
    /// Floor for the linearly decayed learning rate.
    pub min_learning_rate: f32,
    /// Passes over the walk corpus.
    pub epochs: usize,
    pub seed: u64,
}

impl Default for SkipGramConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 32,
            window_size: 10,
            negative_samples: 5,
            learning_rate: 0.025,
            min_learning_rate: 0.0001,
            epochs: 10,
            seed: 42,
        }
    }
}

/// Skip-gram model.
///
/// `input` rows are the embeddings we keep; `output` rows are the context
/// vectors and are discarded after training.
pub struct SkipGram {
    input: Vec<f32>,
    output: Vec<f32>,
    vocab_size: usize,
    config: SkipGramConfig,
    neg_table: Vec<u32>,
    current_lr: f32,
    words_processed: usize,
    total_words: usize,
    rng: ChaCha8Rng,
}

impl SkipGram {
    /// Input vectors start uniform in `[-0.5/dim, 0.5/dim]`, output vectors at zero.
    pub fn new(vocab_size: usize, config: SkipGramConfig) -> Result<Self> {
        let dim = config.embedding_dim;
        if dim == 0 {
            return Err(Error::InvalidConfig("embedding_dim must be > 0".into()));
        }
        if config.window_size == 0 {
            return Err(Error::InvalidConfig("window_size must be > 0".into()));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let bound = 0.5 / dim as f32;
        let dist = Uniform::new(-bound, bound)
            .map_err(|e| Error::InvalidConfig(format!("initializer bounds: {e}")))?;
        let input: Vec<f32> = (0..vocab_size * dim).map(|_| dist.sample(&mut rng)).collect();

        Ok(Self {
            input,
            output: vec![0.0; vocab_size * dim],
            vocab_size,
            current_lr: config.learning_rate,
            config,
            neg_table: (0..vocab_size as u32).collect(),
            words_processed: 0,
            total_words: 0,
            rng,
        })
    }

    /// Build the negative sampling table from token frequencies (unigram^0.75).
    ///
    /// Tokens with zero frequency are never drawn, unless every frequency is zero,
    /// in which case sampling is uniform.
    pub fn build_neg_table(&mut self, frequencies: &[u64]) {
        debug_assert_eq!(frequencies.len(), self.vocab_size);
        let powered: Vec<f64> = frequencies.iter().map(|&f| (f as f64).powf(0.75)).collect();
        let total: f64 = powered.iter().sum();
        if !(total > 0.0) {
            self.neg_table = (0..self.vocab_size as u32).collect();
            return;
        }

        let size = (self.vocab_size * TABLE_PER_TOKEN).clamp(MIN_TABLE, MAX_TABLE);
        let mut table = Vec::with_capacity(size);
        let mut cumulative = 0.0;
        let mut last_drawable = 0u32;
        for (token, &w) in powered.iter().enumerate() {
            if w <= 0.0 {
                continue;
            }
            cumulative += w / total;
            let upto = ((cumulative * size as f64).round() as usize).min(size);
            table.resize(upto.max(table.len()), token as u32);
            last_drawable = token as u32;
        }
        table.resize(size, last_drawable);
        self.neg_table = table;
    }

    /// Set the corpus size (tokens per pass times passes) for learning-rate decay.
    pub fn set_total_words(&mut self, total: usize) {
        self.total_words = total;
    }

    /// Full training run: frequencies, negative table, then `epochs` passes.
    ///
    /// Returns the mean per-pair loss of the final pass.
    pub fn train(&mut self, walks: &[Vec<usize>]) -> Result<f32> {
        let mut freq = vec![0u64; self.vocab_size];
        let mut corpus = 0usize;
        for walk in walks {
            for &token in walk {
                if token >= self.vocab_size {
                    return Err(Error::NodeOutOfRange { index: token, len: self.vocab_size });
                }
                freq[token] += 1;
            }
            corpus += walk.len();
        }
        self.build_neg_table(&freq);
        self.set_total_words(corpus * self.config.epochs);
        self.words_processed = 0;

        let mut last_loss = 0.0;
        for epoch in 0..self.config.epochs {
            let mut loss = 0.0f64;
            let mut pairs = 0usize;
            for walk in walks {
                let (l, p) = self.train_walk(walk);
                loss += l;
                pairs += p;
            }
            last_loss = if pairs > 0 { (loss / pairs as f64) as f32 } else { 0.0 };
            debug!(epoch, loss = last_loss, lr = self.current_lr, "skip-gram epoch");
        }
        Ok(last_loss)
    }

    /// Train on a single walk. Returns `(summed loss, positive pairs)`.
    ///
    /// Token ids must be `< vocab_size`.
    pub fn train_walk(&mut self, walk: &[usize]) -> (f64, usize) {
        let window = self.config.window_size;
        let mut loss = 0.0f64;
        let mut pairs = 0usize;
        let mut grad = vec![0.0f32; self.config.embedding_dim];

        for (pos, &center) in walk.iter().enumerate() {
            let reach = self.rng.random_range(1..=window);
            let start = pos.saturating_sub(reach);
            let end = (pos + reach + 1).min(walk.len());

            for (ctx_pos, &context) in walk.iter().enumerate().take(end).skip(start) {
                if ctx_pos == pos {
                    continue;
                }
                loss += self.train_pair(center, context, &mut grad) as f64;
                pairs += 1;
            }

            self.words_processed += 1;
            self.update_lr();
        }
        (loss, pairs)
    }

    // One positive (center, context) update plus its negatives.
    fn train_pair(&mut self, center: usize, context: usize, grad: &mut [f32]) -> f32 {
        let dim = self.config.embedding_dim;
        let lr = self.current_lr;
        let c_off = center * dim;
        grad.fill(0.0);

        let mut loss = 0.0f32;
        for k in 0..=self.config.negative_samples {
            let (target, label) = if k == 0 {
                (context, 1.0f32)
            } else {
                let t = self.neg_table[self.rng.random_range(0..self.neg_table.len())] as usize;
                if t == context {
                    continue;
                }
                (t, 0.0f32)
            };
            let t_off = target * dim;

            let mut dot = 0.0f32;
            for i in 0..dim {
                dot += self.input[c_off + i] * self.output[t_off + i];
            }
            let s = sigmoid(dot);
            loss -= if label > 0.0 { s.max(1e-7).ln() } else { (1.0 - s).max(1e-7).ln() };

            let g = (label - s) * lr;
            for i in 0..dim {
                grad[i] += g * self.output[t_off + i];
                self.output[t_off + i] += g * self.input[c_off + i];
            }
        }

        for i in 0..dim {
            self.input[c_off + i] += grad[i];
        }
        loss
    }

    fn update_lr(&mut self) {
        if self.total_words == 0 {
            return;
        }
        let progress = self.words_processed as f32 / self.total_words as f32;
        self.current_lr = (self.config.learning_rate
            - (self.config.learning_rate - self.config.min_learning_rate) * progress)
            .max(self.config.min_learning_rate);
    }

    pub fn learning_rate(&self) -> f32 {
        self.current_lr
    }

    /// Embedding row for a token.
    pub fn embedding(&self, token: usize) -> Result<&[f32]> {
        if token >= self.vocab_size {
            return Err(Error::NodeOutOfRange { index: token, len: self.vocab_size });
        }
        let dim = self.config.embedding_dim;
        Ok(&self.input[token * dim..(token + 1) * dim])
    }

    /// All embeddings as a `(vocab_size, embedding_dim)` matrix.
    pub fn embeddings(&self) -> Array2<f32> {
        Array2::from_shape_vec((self.vocab_size, self.config.embedding_dim), self.input.clone())
            .unwrap_or_else(|_| Array2::zeros((self.vocab_size, self.config.embedding_dim)))
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn embedding_dim(&self) -> usize {
        self.config.embedding_dim
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x.clamp(-20.0, 20.0)).exp())
}
