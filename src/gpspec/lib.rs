pub mod align;
pub mod args;
pub mod config;
pub mod delay;
pub mod error;
pub mod input;
pub mod noise;
pub mod observation;
pub mod peak;
pub mod pipeline;
pub mod rfi;
pub mod search;
pub mod spectrum;
pub mod stats;

pub use config::PipelineConfig;
pub use error::{GpError, Result};
pub use observation::{FrequencyBand, Observation, Polarization};
pub use spectrum::{Cutout, DynamicSpectrum, PulseSpectrum};
