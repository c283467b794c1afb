//! Uniform block shared by every shader stage.

use crate::compute::synth::{GRADIENT_STOPS, WAVE_COUNT};
use crate::compute::ArtSnapshot;

/// Per-frame uniforms. Mirrors `FrameUniforms` in the WGSL sources; keep the
/// two in the same field order.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub resolution: [f32; 2],
    pub time: f32,
    pub delta_time: f32,
    pub chaos: f32,
    pub evolution: f32,
    pub distortion: f32,
    pub time_scale: f32,
    pub fractal_iterations: u32,
    pub feedback_decay: f32,
    pub particle_count: u32,
    pub _pad: u32,
    /// Eight wave amplitudes packed as two vec4s.
    pub waves: [[f32; 4]; 2],
    pub palette: [[f32; 4]; GRADIENT_STOPS],
}

const _: () = assert!(std::mem::size_of::<FrameUniforms>() == 208);
const _: () = assert!(WAVE_COUNT == 8);

impl FrameUniforms {
    pub fn new(
        resolution: (u32, u32),
        time: f32,
        delta_time: f32,
        snapshot: &ArtSnapshot,
        particle_count: usize,
        feedback_decay: f32,
    ) -> Self {
        let shading = &snapshot.shading;
        let mut waves = [[0.0f32; 4]; 2];
        for (i, &amp) in shading.wave_amplitudes.iter().enumerate() {
            waves[i / 4][i % 4] = amp;
        }

        Self {
            resolution: [resolution.0 as f32, resolution.1 as f32],
            time,
            delta_time,
            chaos: snapshot.dna.chaos_index as f32,
            evolution: snapshot.dna.evolution_factor as f32,
            distortion: shading.distortion_factor,
            time_scale: shading.time_scale,
            fractal_iterations: shading.fractal_iterations,
            feedback_decay,
            particle_count: particle_count as u32,
            _pad: 0,
            waves,
            palette: shading.color_gradient,
        }
    }
}
