// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! BERT encoder backed by candle, with weights and tokenizer pulled from the
//! Hugging Face Hub.

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::api::sync::{Api, ApiRepo};
use hf_hub::{Repo, RepoType};
use std::path::{Path, PathBuf};
use tokenizers::models::wordpiece::WordPiece;
use tokenizers::normalizers::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::processors::bert::BertProcessing;
use tokenizers::{
    DecoderWrapper, Model, ModelWrapper, NormalizerWrapper, PostProcessorWrapper,
    PreTokenizerWrapper, Tokenizer, TokenizerBuilder, TruncationParams,
};
use tracing::{debug, info};

use super::{Encoder, HiddenStates, TokenBatch};
use crate::error::{PipelineError, PipelineResult};

pub struct BertEncoder {
    model_id: String,
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    hidden_size: usize,
    max_positions: usize,
}

impl BertEncoder {
    /// Download (or reuse from the local hub cache) and load `model_id`.
    /// Blocks; call it once per run.
    pub fn load(model_id: &str, revision: &str) -> PipelineResult<Self> {
        Self::try_load(model_id, revision).map_err(|source| PipelineError::ModelLoad {
            model_id: model_id.to_string(),
            source,
        })
    }

    fn try_load(model_id: &str, revision: &str) -> Result<Self> {
        info!(model_id, revision, "Loading encoder");
        let api = Api::new().context("Failed to create Hugging Face Hub client")?;
        let repo = api.repo(Repo::with_revision(
            model_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));

        let config_path = repo.get("config.json").context("Failed to fetch config.json")?;
        let config_str = std::fs::read_to_string(&config_path)?;
        let config: Config =
            serde_json::from_str(&config_str).context("Failed to parse model config")?;
        let meta: ConfigMeta = serde_json::from_str(&config_str)?;

        let tokenizer = load_tokenizer(&repo)?;
        let device = Device::Cpu;
        let model = load_weights(&repo, &config, &device)?;

        info!(model_id, hidden_size = meta.hidden_size, "Encoder loaded");
        Ok(Self {
            model_id: model_id.to_string(),
            model,
            tokenizer,
            device,
            hidden_size: meta.hidden_size,
            max_positions: meta.max_position_embeddings,
        })
    }
}

/// Sizes read straight from config.json.
#[derive(serde::Deserialize)]
struct ConfigMeta {
    hidden_size: usize,
    max_position_embeddings: usize,
}

fn load_tokenizer(repo: &ApiRepo) -> Result<Tokenizer> {
    match repo.get("tokenizer.json") {
        Ok(path) => Tokenizer::from_file(&path).map_err(anyhow::Error::msg),
        Err(e) => {
            debug!("No tokenizer.json ({}), building WordPiece from vocab.txt", e);
            let vocab = repo
                .get("vocab.txt")
                .context("Model has neither tokenizer.json nor vocab.txt")?;
            wordpiece_tokenizer(&vocab)
        }
    }
}

/// Uncased BERT tokenizer built from a WordPiece vocabulary.
fn wordpiece_tokenizer(vocab: &Path) -> Result<Tokenizer> {
    let wordpiece = WordPiece::from_file(&vocab.to_string_lossy())
        .unk_token("[UNK]".to_string())
        .build()
        .map_err(anyhow::Error::msg)?;

    let special = |token: &str| {
        wordpiece
            .token_to_id(token)
            .with_context(|| format!("{} missing from vocabulary", token))
    };
    let sep = special("[SEP]")?;
    let cls = special("[CLS]")?;

    let tokenizer = TokenizerBuilder::<
        ModelWrapper,
        NormalizerWrapper,
        PreTokenizerWrapper,
        PostProcessorWrapper,
        DecoderWrapper,
    >::new()
    .with_model(wordpiece.into())
    .with_normalizer(Some(BertNormalizer::default().into()))
    .with_pre_tokenizer(Some(BertPreTokenizer.into()))
    .with_post_processor(Some(
        BertProcessing::new(("[SEP]".to_string(), sep), ("[CLS]".to_string(), cls)).into(),
    ))
    .with_decoder(None)
    .build()
    .map_err(anyhow::Error::msg)?;

    Ok(Tokenizer::from(tokenizer))
}

fn load_weights(repo: &ApiRepo, config: &Config, device: &Device) -> Result<BertModel> {
    let vb = match repo.get("model.safetensors") {
        // SAFETY: the file is a fresh hub download that nothing else writes.
        Ok(path) => unsafe { VarBuilder::from_mmaped_safetensors(&[path], DTYPE, device)? },
        Err(e) => {
            debug!("No model.safetensors ({}), falling back to pytorch_model.bin", e);
            let path: PathBuf = repo
                .get("pytorch_model.bin")
                .context("Model has neither model.safetensors nor pytorch_model.bin")?;
            VarBuilder::from_pth(&path, DTYPE, device)?
        }
    };

    BertModel::load(vb, config).context("Failed to build BERT model from weights")
}

impl Encoder for BertEncoder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dim(&self) -> usize {
        self.hidden_size
    }

    fn effective_max_length(&self, requested: usize) -> usize {
        // [CLS] and [SEP] always fit
        requested.clamp(2, self.max_positions)
    }

    fn tokenize(&self, text: &str, max_length: usize) -> Result<TokenBatch> {
        let mut tokenizer = self.tokenizer.clone();
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: self.effective_max_length(max_length),
                ..Default::default()
            }))
            .map_err(anyhow::Error::msg)?;
        tokenizer.with_padding(None);

        let encoding = tokenizer.encode(text, true).map_err(anyhow::Error::msg)?;
        Ok(TokenBatch {
            ids: encoding.get_ids().to_vec(),
            type_ids: encoding.get_type_ids().to_vec(),
            attention_mask: encoding.get_attention_mask().to_vec(),
        })
    }

    fn forward(&self, batch: &TokenBatch) -> Result<HiddenStates> {
        let ids = Tensor::new(batch.ids.as_slice(), &self.device)?.unsqueeze(0)?;
        let type_ids = Tensor::new(batch.type_ids.as_slice(), &self.device)?.unsqueeze(0)?;
        let mask = Tensor::new(batch.attention_mask.as_slice(), &self.device)?.unsqueeze(0)?;

        // [1, tokens, hidden]
        let hidden = self.model.forward(&ids, &type_ids, Some(&mask))?;
        let hidden = hidden.squeeze(0)?.to_dtype(DType::F32)?;
        let (tokens, hidden_dim) = hidden.dims2()?;
        let data = hidden.flatten_all()?.to_vec1::<f32>()?;

        HiddenStates::new(data, tokens, hidden_dim)
    }
}
