// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Text to fixed-size vector extraction.
//!
//! An [`Encoder`] turns text into per-token hidden states; [`extract`] runs
//! every [`TextUnit`] through it and mean-pools the states into one vector
//! per unit, in input order.

pub mod bert;

pub use bert::BertEncoder;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::text::TextUnit;

pub const POOLING_STRATEGY: &str = "mean";

/// Token ids of one sequence with its type ids and attention mask.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TokenBatch {
    pub ids: Vec<u32>,
    pub type_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
}

impl TokenBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Row-major `[tokens, hidden_dim]` matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct HiddenStates {
    data: Vec<f32>,
    tokens: usize,
    hidden_dim: usize,
}

impl HiddenStates {
    pub fn new(data: Vec<f32>, tokens: usize, hidden_dim: usize) -> Result<Self> {
        if data.len() != tokens * hidden_dim {
            anyhow::bail!(
                "hidden state buffer has {} values, expected {} x {}",
                data.len(),
                tokens,
                hidden_dim
            );
        }
        Ok(Self {
            data,
            tokens,
            hidden_dim,
        })
    }

    pub fn tokens(&self) -> usize {
        self.tokens
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    pub fn row(&self, token: usize) -> &[f32] {
        let start = token * self.hidden_dim;
        &self.data[start..start + self.hidden_dim]
    }
}

/// A loaded text encoder.
pub trait Encoder {
    fn model_id(&self) -> &str;

    /// Width of the hidden states and therefore of every pooled vector.
    fn dim(&self) -> usize;

    /// The truncation length [`Encoder::tokenize`] actually applies for a
    /// requested `max_length`.
    fn effective_max_length(&self, requested: usize) -> usize {
        requested
    }

    /// Tokenize with truncation to `max_length` tokens, special tokens
    /// included. Even an empty text yields at least one token.
    fn tokenize(&self, text: &str, max_length: usize) -> Result<TokenBatch>;

    /// Inference-only forward pass.
    fn forward(&self, batch: &TokenBatch) -> Result<HiddenStates>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
    pub record_id: Option<String>,
    pub values: Vec<f32>,
}

impl EmbeddingVector {
    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

/// Arithmetic mean over the token axis, counting only tokens whose mask is
/// set. An empty mask counts every token.
pub fn mean_pool(states: &HiddenStates, attention_mask: &[u32]) -> Result<Vec<f32>> {
    if !attention_mask.is_empty() && attention_mask.len() != states.tokens() {
        anyhow::bail!(
            "attention mask covers {} tokens, hidden states have {}",
            attention_mask.len(),
            states.tokens()
        );
    }

    let mut sum = vec![0f32; states.hidden_dim()];
    let mut counted = 0usize;
    for token in 0..states.tokens() {
        if attention_mask.get(token).is_some_and(|&m| m == 0) {
            continue;
        }
        for (acc, value) in sum.iter_mut().zip(states.row(token)) {
            *acc += value;
        }
        counted += 1;
    }

    if counted == 0 {
        anyhow::bail!("no tokens to pool");
    }

    let n = counted as f32;
    Ok(sum.into_iter().map(|v| v / n).collect())
}

fn embed_one<E: Encoder + ?Sized>(encoder: &E, text: &str, max_length: usize) -> Result<Vec<f32>> {
    let batch = encoder.tokenize(text, max_length)?;
    if batch.is_empty() {
        anyhow::bail!("tokenizer produced no tokens");
    }
    let states = encoder.forward(&batch)?;
    if states.tokens() != batch.len() {
        anyhow::bail!(
            "encoder returned {} token states for {} tokens",
            states.tokens(),
            batch.len()
        );
    }
    mean_pool(&states, &batch.attention_mask)
}

/// Embed every unit in order. The first failing unit aborts the whole
/// extraction so callers never see a set misaligned with its records.
pub fn extract<E: Encoder + ?Sized>(
    encoder: &E,
    units: &[TextUnit],
    max_length: usize,
) -> PipelineResult<Vec<EmbeddingVector>> {
    let dim = encoder.dim();
    let progress = ProgressBar::new(units.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    let mut vectors = Vec::with_capacity(units.len());
    for (index, unit) in units.iter().enumerate() {
        let values = embed_one(encoder, &unit.text, max_length)
            .and_then(|values| {
                if values.len() != dim {
                    anyhow::bail!("vector has {} values, model dimension is {}", values.len(), dim);
                }
                Ok(values)
            })
            .map_err(|source| {
                progress.abandon();
                PipelineError::Encoding {
                    index,
                    record_id: unit.record_id.clone(),
                    source,
                }
            })?;

        debug!(index, chars = unit.text.len(), dim, "Embedded record");
        vectors.push(EmbeddingVector {
            record_id: unit.record_id.clone(),
            values,
        });
        progress.inc(1);
    }
    progress.finish();

    Ok(vectors)
}
