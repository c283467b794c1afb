//! Parameter synthesis - maps DNA to simulation and shading parameters.
//!
//! Pure and deterministic: the same [`Dna`] always yields bit-identical parameters.

use num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use super::dna::{Dna, Nucleotide};

/// Number of wave amplitudes and gradient stops.
pub const WAVE_COUNT: usize = 8;
pub const GRADIENT_STOPS: usize = 8;

const STANDARD_GRAVITY: f64 = 9.81;

/// Parameters driving the particle simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    /// Requested particle count; callers cap this to pool capacity.
    pub particle_count: usize,
    /// Initial velocity scale.
    pub energy: f32,
    /// Base hue in degrees. Only exported through the summary; the renderer
    /// gets the hue from the shading gradient.
    pub color_hue: f32,
    /// Spiral radius in scene units.
    pub spread: f32,
    /// Vertical acceleration (negative is down).
    pub gravity: f32,
    /// Only exported through the summary; the particle step forces with
    /// the shading distortion factor.
    pub turbulence: f32,
    /// Seconds a particle lives before respawning.
    pub lifespan: f32,
}

/// Parameters consumed by the render passes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadingParameters {
    pub wave_amplitudes: [f32; WAVE_COUNT],
    /// RGBA stops, alpha always 1.
    pub color_gradient: [[f32; 4]; GRADIENT_STOPS],
    pub distortion_factor: f32,
    /// Escape-time iteration cap for the fractal pass.
    pub fractal_iterations: u32,
    pub time_scale: f32,
}

/// DNA to parameter mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterSynthesizer;

impl ParameterSynthesizer {
    /// Derive both parameter sets from one DNA value.
    pub fn synthesize(dna: &Dna) -> (SimulationParameters, ShadingParameters) {
        (Self::simulation(dna), Self::shading(dna))
    }

    pub fn simulation(dna: &Dna) -> SimulationParameters {
        let evolution = dna.evolution_factor;
        let chaos = dna.chaos_index;
        let c = &dna.characteristics;

        let adenine = dna.count(Nucleotide::A) as f64;
        let thymine = dna.count(Nucleotide::T) as f64;
        let particle_count = (adenine * evolution.max(0.1) * 1000.0).floor().max(1.0) as usize;

        SimulationParameters {
            particle_count,
            energy: (thymine * chaos.max(0.1)) as f32,
            color_hue: (c[5] * 360.0) as f32,
            spread: (dna.fractal_dimension * 100.0).max(1.0) as f32,
            gravity: (c[2] * -STANDARD_GRAVITY) as f32,
            turbulence: (chaos * 10.0).max(0.0) as f32,
            lifespan: (evolution * 5.0).max(0.1) as f32,
        }
    }

    pub fn shading(dna: &Dna) -> ShadingParameters {
        let c = &dna.characteristics;
        let saturation = (0.7 + 0.3 * c[2]).clamp(0.0, 1.0);
        let value = (0.8 + 0.2 * c[0]).clamp(0.0, 1.0);

        let mut color_gradient = [[0.0f32; 4]; GRADIENT_STOPS];
        for (i, stop) in color_gradient.iter_mut().enumerate() {
            let hue = (i as f64 / GRADIENT_STOPS as f64 + c[5]).rem_euclid(1.0);
            let [r, g, b] = hsv_to_rgb(hue, saturation, value);
            *stop = [r as f32, g as f32, b as f32, 1.0];
        }

        ShadingParameters {
            wave_amplitudes: wave_amplitudes(&dna.weights()),
            color_gradient,
            distortion_factor: dna.chaos_index as f32,
            fractal_iterations: (dna.fractal_dimension * 10.0).round().max(0.0) as u32,
            time_scale: dna.evolution_factor as f32,
        }
    }
}

/// First eight DFT magnitudes of the weight sequence, normalized by its length.
///
/// Input shorter than eight is zero-padded. Each magnitude is bounded by the
/// largest symbol weight.
pub fn wave_amplitudes(weights: &[f64]) -> [f32; WAVE_COUNT] {
    let len = weights.len().max(WAVE_COUNT);
    let mut buffer: Vec<Complex<f64>> = weights.iter().map(|&w| Complex::new(w, 0.0)).collect();
    buffer.resize(len, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(len);
    fft.process(&mut buffer);

    let scale = 1.0 / len as f64;
    let mut amplitudes = [0.0f32; WAVE_COUNT];
    for (amp, bin) in amplitudes.iter_mut().zip(buffer.iter()) {
        *amp = (bin.norm() * scale) as f32;
    }
    amplitudes
}

/// HSV (all components in [0, 1]) to RGB.
pub fn hsv_to_rgb(h: f64, s: f64, v: f64) -> [f64; 3] {
    let h6 = h.rem_euclid(1.0) * 6.0;
    let sector = h6.floor();
    let f = h6 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    match sector as u32 % 6 {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}
