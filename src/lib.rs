//! Behavior Art - Generative particle scenes driven by behavior-tracking data.
//!
//! A behavior record (completion history, streaks, timestamps) is encoded into
//! a symbolic DNA sequence with a few scalar features. The DNA is mapped to
//! simulation and shading parameters, which drive a particle simulator and a
//! multi-pass GPU renderer with a precomputed noise field.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Behavior records and engine configuration
//! - `compute`: DNA encoding, parameter synthesis, noise, particles, GPU passes
//!
//! # Example
//!
//! ```rust,no_run
//! use behavior_art::{
//!     compute::{DnaEncoder, ParameterSynthesizer, ParticleSimulator, SimulatorSettings},
//!     schema::{BehaviorCategory, BehaviorRecord},
//! };
//! use chrono::Utc;
//!
//! let mut record = BehaviorRecord::new("evening-walk", BehaviorCategory::Health, Utc::now());
//! record.completion_rate = 0.75;
//! record.history = vec![true, true, false, true];
//!
//! let dna = DnaEncoder::encode(&record);
//! let (sim, shade) = ParameterSynthesizer::synthesize(&dna);
//!
//! let mut simulator = ParticleSimulator::new(SimulatorSettings::default());
//! simulator.reseed(&sim, &shade, &dna.sequence);
//! simulator.step(1.0 / 60.0, 1.0 / 60.0, &dna.sequence, &shade);
//!
//! println!("{} live particles", simulator.active_count());
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::{ArtSnapshot, Dna, DnaEncoder, ParameterSynthesizer, ParticleSimulator};
pub use schema::{BehaviorCategory, BehaviorRecord, EngineConfig};
