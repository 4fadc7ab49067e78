//! Frame captioning with a BLIP vision-language model via ONNX Runtime
//!
//! The model is expected as a single ONNX graph taking `pixel_values`,
//! `input_ids` and `attention_mask` and returning `logits`, next to the
//! model's `tokenizer.json`:
//!
//! ```text
//! models/caption-generation/
//! ├── blip.onnx
//! └── tokenizer.json
//! ```
//!
//! # Example
//! ```no_run
//! use task_dataset_caption::{CaptionConfig, CaptionGenerator};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut generator = CaptionGenerator::new(
//!     "models/caption-generation/blip.onnx",
//!     "models/caption-generation/tokenizer.json",
//!     CaptionConfig::default(),
//!     4,
//! )?;
//!
//! let img = image::open("frame_000001.jpg")?.to_rgb8();
//! println!("Caption: {}", generator.generate_caption(&img)?.text);
//! # Ok(())
//! # }
//! ```

mod factory;
mod generation;

pub use factory::{OnnxCaptionerFactory, MODEL_FILE, TOKENIZER_FILE};
pub use generation::TextGenerator;

use image::RgbImage;
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use std::path::Path;
use task_dataset_common::ProcessingError;
use task_dataset_core::{CaptionSettings, Captioner};
use thiserror::Error;
use tracing::{debug, info};

/// CLIP normalization statistics used by BLIP's image processor
const BLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const BLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_6, 0.275_777_1];

/// Configuration for caption generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionConfig {
    /// Input image size (384 for BLIP)
    pub input_size: u32,
    /// Maximum caption length in tokens
    pub max_length: usize,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        CaptionSettings::default().into()
    }
}

impl From<CaptionSettings> for CaptionConfig {
    fn from(settings: CaptionSettings) -> Self {
        Self {
            input_size: settings.input_size,
            max_length: settings.max_length,
        }
    }
}

/// Caption generation result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionResult {
    /// Generated caption text
    pub text: String,
}

/// Errors that can occur during caption generation
#[derive(Error, Debug)]
pub enum CaptionError {
    #[error("ONNX Runtime error: {0}")]
    OrtError(#[from] ort::Error),

    #[error("Failed to load caption model: {0}")]
    ModelLoad(String),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("Invalid model output: {0}")]
    InvalidOutput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<CaptionError> for ProcessingError {
    fn from(err: CaptionError) -> Self {
        ProcessingError::CaptionFailure(err.to_string())
    }
}

/// Caption generator using a BLIP vision-language model
pub struct CaptionGenerator {
    generator: TextGenerator,
    config: CaptionConfig,
    /// Preprocessed tensor of the current frame
    pixel_values: Option<Array4<f32>>,
}

impl CaptionGenerator {
    /// Load model and tokenizer
    ///
    /// `intra_threads` bounds ONNX Runtime's per-session thread pool.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        tokenizer_path: P,
        config: CaptionConfig,
        intra_threads: usize,
    ) -> Result<Self, CaptionError> {
        if config.input_size == 0 || config.max_length == 0 {
            return Err(CaptionError::InvalidConfig(format!(
                "input_size and max_length must be positive, got {} and {}",
                config.input_size, config.max_length
            )));
        }

        let model_path = model_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();

        info!(
            "Loading caption generation model from {:?} with tokenizer {:?}",
            model_path, tokenizer_path
        );

        let generator = TextGenerator::new(tokenizer_path, model_path, intra_threads)?;

        debug!(
            "Caption model loaded (input size: {}, max length: {})",
            config.input_size, config.max_length
        );

        Ok(Self {
            generator,
            config,
            pixel_values: None,
        })
    }

    /// Generate a caption for one image
    pub fn generate_caption(&mut self, image: &RgbImage) -> Result<CaptionResult, CaptionError> {
        self.preprocess_image(image)?;
        let pixel_values = self
            .pixel_values
            .as_ref()
            .ok_or_else(|| CaptionError::ImageError("Preprocessing produced no tensor".to_string()))?;

        let text = self
            .generator
            .generate_greedy(pixel_values, self.config.max_length)?;

        if text.is_empty() {
            return Err(CaptionError::InvalidOutput("Model produced an empty caption".to_string()));
        }
        Ok(CaptionResult { text })
    }

    /// Resize to the model's input size and normalize into a [1, 3, S, S] tensor
    fn preprocess_image(&mut self, image: &RgbImage) -> Result<(), CaptionError> {
        let size = self.config.input_size;
        if image.width() == 0 || image.height() == 0 {
            return Err(CaptionError::ImageError("Empty image".to_string()));
        }

        let resized;
        let source = if image.dimensions() == (size, size) {
            image
        } else {
            resized = image::imageops::resize(
                image,
                size,
                size,
                image::imageops::FilterType::CatmullRom,
            );
            &resized
        };

        let side = size as usize;
        let tensor = self
            .pixel_values
            .get_or_insert_with(|| Array4::zeros((1, 3, side, side)));

        for (x, y, pixel) in source.enumerate_pixels() {
            for c in 0..3 {
                let value = f32::from(pixel[c]) / 255.0;
                tensor[[0, c, y as usize, x as usize]] = (value - BLIP_MEAN[c]) / BLIP_STD[c];
            }
        }

        Ok(())
    }
}

impl Captioner for CaptionGenerator {
    fn caption(&mut self, image: &RgbImage) -> task_dataset_common::Result<String> {
        Ok(self.generate_caption(image)?.text)
    }

    fn release_transient(&mut self) {
        self.pixel_values = None;
    }
}
