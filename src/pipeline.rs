// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use std::path::{Path, PathBuf};
use tracing::info;

use crate::api::NewsSource;
use crate::embedding::{self, Encoder};
use crate::error::PipelineResult;
use crate::ingest::{self, DateRange, Ingestion};
use crate::manifest::{self, EmbeddingInfo, RunManifest};
use crate::text;

/// A saved manifest and where it went.
#[derive(Debug)]
pub struct Saved {
    pub manifest: RunManifest,
    pub path: PathBuf,
}

/// Fetch news for `ticker` and persist the raw manifest. Nothing is written
/// when ingestion fails.
pub async fn fetch_and_save<S>(
    source: &S,
    ticker: &str,
    limit: usize,
    range: DateRange,
    data_dir: &Path,
) -> PipelineResult<(Ingestion, Saved)>
where
    S: NewsSource + ?Sized,
{
    let ingestion = ingest::fetch_records(source, ticker, limit, range).await?;

    let manifest = RunManifest::new(ticker, ingestion.requested, &ingestion.records);
    let path = manifest::manifest_path(data_dir, ticker);
    manifest::save(&manifest, &path)?;
    info!(path = %path.display(), count = manifest.count, "Saved news manifest");

    Ok((ingestion, Saved { manifest, path }))
}

/// Assemble text for every article and attach one embedding each, producing
/// a new manifest. `raw` is left untouched.
pub fn embed_manifest<E>(
    encoder: &E,
    raw: &RunManifest,
    max_length: usize,
) -> PipelineResult<RunManifest>
where
    E: Encoder + ?Sized,
{
    let units = text::assemble_all(&raw.records());
    let vectors = embedding::extract(encoder, &units, max_length)?;
    let info = EmbeddingInfo::mean_pooled(
        encoder.model_id(),
        encoder.effective_max_length(max_length),
        encoder.dim(),
    );
    raw.with_embeddings(vectors, info)
}

/// Embed the manifest saved at `raw_path` and write the result next to it.
pub fn embed_and_save<E>(
    encoder: &E,
    raw: &RunManifest,
    raw_path: &Path,
    max_length: usize,
) -> PipelineResult<Saved>
where
    E: Encoder + ?Sized,
{
    let manifest = embed_manifest(encoder, raw, max_length)?;
    let path = manifest::embedded_path(raw_path);
    manifest::save(&manifest, &path)?;
    info!(path = %path.display(), "Saved embeddings");

    Ok(Saved { manifest, path })
}
