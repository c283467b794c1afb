//! Compute module - encoding, synthesis, simulation and rendering.

mod dna;
mod noise;
mod particles;
mod rng;
mod snapshot;
mod synth;

pub mod gpu;

pub use dna::*;
pub use noise::*;
pub use particles::*;
pub use rng::*;
pub use snapshot::*;
pub use synth::*;
