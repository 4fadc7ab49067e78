//! Tokenizer loading and autoregressive decoding for BLIP-style models

use ndarray::{Array2, Array4};
use ort::{session::Session, value::Value};
use std::path::Path;
use task_dataset_core::onnx_utils::create_optimized_session;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::CaptionError;

/// Text generator with tokenizer and ONNX session
pub struct TextGenerator {
    tokenizer: Tokenizer,
    session: Session,
    bos_token_id: u32,
    eos_token_id: u32,
}

impl TextGenerator {
    /// Load tokenizer and ONNX session
    pub fn new(
        tokenizer_path: impl AsRef<Path>,
        model_path: impl AsRef<Path>,
        intra_threads: usize,
    ) -> Result<Self, CaptionError> {
        let tokenizer_path = tokenizer_path.as_ref();
        let model_path = model_path.as_ref();

        info!("Loading tokenizer from {:?}", tokenizer_path);
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| CaptionError::InvalidConfig(format!("Failed to load tokenizer: {}", e)))?;

        let session = create_optimized_session(model_path, intra_threads)
            .map_err(|e| CaptionError::ModelLoad(e.to_string()))?;

        // BLIP's text decoder starts from [DEC]; plain BERT vocabularies only have [CLS]
        let bos_token_id = tokenizer
            .token_to_id("[DEC]")
            .or_else(|| tokenizer.token_to_id("[CLS]"))
            .unwrap_or(101);
        let eos_token_id = tokenizer.token_to_id("[SEP]").unwrap_or(102);

        debug!("Special tokens: BOS={}, EOS={}", bos_token_id, eos_token_id);

        Ok(Self {
            tokenizer,
            session,
            bos_token_id,
            eos_token_id,
        })
    }

    /// Generate a caption with greedy decoding
    ///
    /// # Arguments
    /// * `pixel_values` - Image tensor [1, 3, H, W]
    /// * `max_length` - Maximum caption length in tokens
    pub fn generate_greedy(
        &mut self,
        pixel_values: &Array4<f32>,
        max_length: usize,
    ) -> Result<String, CaptionError> {
        let mut input_ids = vec![i64::from(self.bos_token_id)];

        for step in 0..max_length {
            let seq_len = input_ids.len();
            let input_ids_array = Array2::from_shape_vec((1, seq_len), input_ids.clone())
                .map_err(|e| CaptionError::InvalidOutput(format!("Failed to create input_ids array: {}", e)))?;
            let attention_mask_array = Array2::<i64>::ones((1, seq_len));

            let pixel_values_tensor = Value::from_array(pixel_values.clone())
                .map_err(|e| CaptionError::InvalidOutput(format!("Failed to create pixel_values tensor: {}", e)))?;
            let input_ids_tensor = Value::from_array(input_ids_array)
                .map_err(|e| CaptionError::InvalidOutput(format!("Failed to create input_ids tensor: {}", e)))?;
            let attention_mask_tensor = Value::from_array(attention_mask_array)
                .map_err(|e| CaptionError::InvalidOutput(format!("Failed to create attention_mask tensor: {}", e)))?;

            let outputs = self
                .session
                .run(ort::inputs![
                    "pixel_values" => pixel_values_tensor,
                    "input_ids" => input_ids_tensor,
                    "attention_mask" => attention_mask_tensor,
                ])
                .map_err(CaptionError::OrtError)?;

            // logits: [batch_size, seq_len, vocab_size]
            let (logits_shape, logits_data) = outputs["logits"]
                .try_extract_tensor::<f32>()
                .map_err(|e| CaptionError::InvalidOutput(format!("Failed to extract logits: {}", e)))?;

            if logits_shape.len() != 3 {
                return Err(CaptionError::InvalidOutput(format!(
                    "Invalid logits shape: {:?}",
                    logits_shape
                )));
            }

            let vocab_size = logits_shape[2] as usize;
            let offset = (seq_len - 1) * vocab_size;
            let last_logits = logits_data.get(offset..offset + vocab_size).ok_or_else(|| {
                CaptionError::InvalidOutput(format!(
                    "Logits too short for sequence length {}",
                    seq_len
                ))
            })?;

            let next_token_id = argmax(last_logits)
                .ok_or_else(|| CaptionError::InvalidOutput("No valid token found".to_string()))?
                as i64;

            if next_token_id == i64::from(self.eos_token_id) {
                debug!("EOS after {} steps", step);
                break;
            }

            input_ids.push(next_token_id);
        }

        let token_ids: Vec<u32> = input_ids.iter().skip(1).map(|&id| id as u32).collect();

        let caption = self
            .tokenizer
            .decode(&token_ids, true)
            .map_err(|e| CaptionError::InvalidOutput(format!("Failed to decode tokens: {}", e)))?;

        debug!("Generated caption: '{}'", caption);
        Ok(caption.trim().to_string())
    }
}

/// Index of the largest value; NaNs never win
fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(idx, _)| idx)
}
