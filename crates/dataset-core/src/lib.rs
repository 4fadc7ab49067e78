//! Dataset construction: pairing, caption fan-out, assembly and persistence
//!
//! [`DatasetBuilder`] drives the whole pipeline; the individual stages are
//! usable on their own.

pub mod assembler;
pub mod config;
pub mod executor;
pub mod image_io;
pub mod onnx_utils;
pub mod pairing;
pub mod pipeline;
pub mod rename;

pub use assembler::{assemble, persist, Dataset, VideoCaptions};
pub use config::{CaptionSettings, PipelineConfig, WORKERS_ENV};
pub use executor::{CaptionPool, Captioner, CaptionerFactory, FrameCaption, PoolConfig};
pub use pairing::{pair, PairingReport};
pub use pipeline::{existing_decomposition, DatasetBuilder, RunSummary};
pub use rename::{clean_caption_for_filename, rename_dataset, rename_frames, RenameReport};
