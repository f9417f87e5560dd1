// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! The persisted JSON record of one run.

use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::embedding::{EmbeddingVector, POOLING_STRATEGY};
use crate::error::{PipelineError, PipelineResult};
use crate::models::RawRecord;

const EMBEDDED_SUFFIX: &str = "_with_embeddings";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleEntry {
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_utc: Option<String>,
    #[serde(default)]
    pub tickers: Vec<String>,
    pub author: Option<String>,
    pub article_url: Option<String>,
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl From<&RawRecord> for ArticleEntry {
    fn from(record: &RawRecord) -> Self {
        Self {
            title: record.title.clone(),
            description: record.description.clone(),
            published_utc: record.published_at.clone(),
            tickers: record.tickers.clone(),
            author: record.author.clone(),
            article_url: record.url.clone(),
            id: record.id.clone(),
            embedding: None,
        }
    }
}

impl From<&ArticleEntry> for RawRecord {
    fn from(entry: &ArticleEntry) -> Self {
        Self {
            id: entry.id.clone(),
            title: entry.title.clone(),
            description: entry.description.clone(),
            published_at: entry.published_utc.clone(),
            tickers: entry.tickers.clone(),
            author: entry.author.clone(),
            url: entry.article_url.clone(),
        }
    }
}

/// How the embeddings in a manifest were produced. Changing the pooling
/// strategy changes the meaning of every vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingInfo {
    pub model: String,
    pub pooling_strategy: String,
    pub max_length: usize,
    pub dim: usize,
}

impl EmbeddingInfo {
    pub fn mean_pooled(model: &str, max_length: usize, dim: usize) -> Self {
        Self {
            model: model.to_string(),
            pooling_strategy: POOLING_STRATEGY.to_string(),
            max_length,
            dim,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub ticker: String,
    pub fetched_at: DateTime<Utc>,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<EmbeddingInfo>,
    pub articles: Vec<ArticleEntry>,
}

impl RunManifest {
    pub fn new(ticker: &str, requested: usize, records: &[RawRecord]) -> Self {
        let articles: Vec<ArticleEntry> = records.iter().map(ArticleEntry::from).collect();
        Self {
            ticker: ticker.to_string(),
            fetched_at: Utc::now(),
            count: articles.len(),
            requested: Some(requested),
            embedding: None,
            articles,
        }
    }

    pub fn records(&self) -> Vec<RawRecord> {
        self.articles.iter().map(RawRecord::from).collect()
    }

    pub fn is_embedded(&self) -> bool {
        self.embedding.is_some()
    }

    /// A new manifest with `vectors[i]` attached to `articles[i]`. Refuses
    /// vector sets that don't line up one to one with the articles or that
    /// mix dimensions.
    pub fn with_embeddings(
        &self,
        vectors: Vec<EmbeddingVector>,
        info: EmbeddingInfo,
    ) -> PipelineResult<RunManifest> {
        if vectors.len() != self.articles.len() {
            return Err(PipelineError::Misaligned(format!(
                "{} embeddings for {} articles",
                vectors.len(),
                self.articles.len()
            )));
        }

        let mut articles = self.articles.clone();
        for (index, (article, vector)) in articles.iter_mut().zip(vectors).enumerate() {
            if vector.record_id != article.id {
                return Err(PipelineError::Misaligned(format!(
                    "embedding #{} belongs to record {:?}, article is {:?}",
                    index, vector.record_id, article.id
                )));
            }
            if vector.dim() != info.dim {
                return Err(PipelineError::Misaligned(format!(
                    "embedding #{} has dimension {}, expected {}",
                    index,
                    vector.dim(),
                    info.dim
                )));
            }
            article.embedding = Some(vector.values);
        }

        Ok(RunManifest {
            ticker: self.ticker.clone(),
            fetched_at: self.fetched_at,
            count: articles.len(),
            requested: self.requested,
            embedding: Some(info),
            articles,
        })
    }
}

pub fn manifest_path(data_dir: &Path, ticker: &str) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    data_dir.join(format!("news_{}_{}.json", ticker, timestamp))
}

/// `news_AAPL_x.json` -> `news_AAPL_x_with_embeddings.json`. An already
/// embedded manifest maps to itself.
pub fn embedded_path(raw_path: &Path) -> PathBuf {
    let stem = raw_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "news".to_string());
    let stem = stem.strip_suffix(EMBEDDED_SUFFIX).unwrap_or(&stem);
    raw_path.with_file_name(format!("{}{}.json", stem, EMBEDDED_SUFFIX))
}

fn persistence_error(path: &Path, source: anyhow::Error) -> PipelineError {
    PipelineError::Persistence {
        path: path.display().to_string(),
        source,
    }
}

/// Write `manifest` as pretty JSON. The file appears complete or not at all.
pub fn save(manifest: &RunManifest, path: &Path) -> PipelineResult<()> {
    let write = || -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create data directory")?;
        }
        let json = serde_json::to_string_pretty(manifest)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).context("Failed to write manifest")?;
        fs::rename(&tmp, path).context("Failed to move manifest into place")?;
        Ok(())
    };
    write().map_err(|e| persistence_error(path, e))
}

pub fn load(path: &Path) -> PipelineResult<RunManifest> {
    let read = || -> anyhow::Result<RunManifest> {
        let json = fs::read_to_string(path)?;
        let manifest: RunManifest = serde_json::from_str(&json)?;
        Ok(manifest)
    };
    read().map_err(|e| persistence_error(path, e))
}

/// Most recent manifest without embeddings in `data_dir`, by file name.
pub fn latest_raw_manifest(data_dir: &Path) -> PipelineResult<PathBuf> {
    let pattern = data_dir.join("news_*.json");
    let pattern = pattern.to_string_lossy();

    let mut candidates: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| persistence_error(data_dir, e.into()))?
        .filter_map(|entry| entry.ok())
        .filter(|path| {
            path.file_stem()
                .map(|s| !s.to_string_lossy().ends_with(EMBEDDED_SUFFIX))
                .unwrap_or(false)
        })
        .collect();
    candidates.sort();

    candidates.pop().ok_or_else(|| {
        persistence_error(
            data_dir,
            anyhow::anyhow!("no news_*.json manifest found; run `news` first"),
        )
    })
}
