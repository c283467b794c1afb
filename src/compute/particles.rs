//! Fixed-capacity particle pool and its per-frame update.
//!
//! The pool is allocated once at construction. Reseeding only rewrites the first
//! `active_count` slots and a particle that runs out of life is respawned in the
//! same slot, so nothing is allocated or freed while rendering.

use std::f32::consts::TAU;

use rand::prelude::*;
use rayon::prelude::*;

use super::dna::Nucleotide;
use super::rng::fnv1a_64;
use super::synth::{ShadingParameters, SimulationParameters};
use crate::schema::EngineConfig;

/// Number of particle archetypes; slot `i` gets archetype `i % ARCHETYPES`.
pub const ARCHETYPES: u32 = 6;

/// Attractor terms closer than this are skipped.
pub const MIN_ATTRACTOR_DISTANCE: f32 = 1e-3;

/// Single particle, laid out for direct upload to the GPU.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Particle {
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub color: [f32; 4],
    pub size: f32,
    /// Remaining life, 1.0 when (re)spawned.
    pub life: f32,
    pub archetype: u32,
    pub _pad: u32,
}

/// Fixed point pulling particles with inverse-square falloff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attractor {
    pub position: [f32; 2],
    pub weight: f32,
}

/// Tunables for the simulator, usually taken from [`EngineConfig`].
#[derive(Debug, Clone, Copy)]
pub struct SimulatorSettings {
    pub capacity: usize,
    pub attractor_radius: f32,
    pub attractor_strength: f32,
    pub max_attractors: usize,
    pub base_radius_scale: f32,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for SimulatorSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            capacity: config.particle_capacity,
            attractor_radius: config.attractor_radius,
            attractor_strength: config.attractor_strength,
            max_attractors: config.max_attractors,
            base_radius_scale: config.base_radius_scale,
        }
    }
}

/// Owner of the particle pool.
pub struct ParticleSimulator {
    settings: SimulatorSettings,
    particles: Vec<Particle>,
    active: usize,
    base_radius: f32,
    gravity: f32,
    lifespan: f32,
    /// Palette copy used for respawns.
    gradient: [[f32; 4]; 8],
}

impl ParticleSimulator {
    /// Allocate a pool of `settings.capacity` slots, all inactive.
    pub fn new(settings: SimulatorSettings) -> Self {
        Self {
            particles: vec![Particle::default(); settings.capacity],
            settings,
            active: 0,
            base_radius: 0.0,
            gravity: 0.0,
            lifespan: 1.0,
            gradient: [[1.0; 4]; 8],
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.particles.len()
    }

    /// Number of live slots; never exceeds [`capacity`](Self::capacity).
    #[inline]
    pub fn active_count(&self) -> usize {
        self.active
    }

    /// The live slots.
    #[inline]
    pub fn particles(&self) -> &[Particle] {
        &self.particles[..self.active]
    }

    #[inline]
    pub fn settings(&self) -> &SimulatorSettings {
        &self.settings
    }

    /// Lay out `min(particle_count, capacity)` particles on a spiral.
    ///
    /// Velocities are drawn from a generator seeded by the sequence hash, so the
    /// same parameters and sequence always produce the same pool.
    pub fn reseed(
        &mut self,
        sim: &SimulationParameters,
        shade: &ShadingParameters,
        sequence: &[Nucleotide],
    ) {
        self.active = sim.particle_count.min(self.capacity());
        self.base_radius = sim.spread * self.settings.base_radius_scale;
        self.gravity = sim.gravity;
        self.lifespan = sim.lifespan.max(f32::EPSILON);
        self.gradient = shade.color_gradient;

        let mut rng = StdRng::seed_from_u64(sequence_seed(sequence));
        let active = self.active;
        let base_radius = self.base_radius;
        let gradient = self.gradient;
        let energy = sim.energy;

        for (i, particle) in self.particles[..active].iter_mut().enumerate() {
            let weight = symbol_weight(sequence, i);
            let velocity = [
                rng.gen_range(-1.0f32..=1.0) * energy,
                rng.gen_range(-1.0f32..=1.0) * energy,
            ];
            *particle = spawn(i, active, base_radius, weight, velocity, &gradient);
        }

        log::debug!(
            "Reseeded {} particles (capacity {}, radius {:.1})",
            active,
            self.capacity(),
            base_radius
        );
    }

    /// Advance every live particle by `dt` seconds.
    ///
    /// Each particle only reads its own state plus shared read-only data, so the
    /// update runs in parallel across slots.
    pub fn step(
        &mut self,
        dt: f32,
        elapsed: f32,
        sequence: &[Nucleotide],
        shade: &ShadingParameters,
    ) {
        let attractors = attractors(
            sequence,
            self.settings.max_attractors,
            self.settings.attractor_radius,
        );
        let chaos = shade.distortion_factor;
        let strength = self.settings.attractor_strength;
        let gravity = self.gravity;
        let decay = dt / self.lifespan;
        let active = self.active;
        let base_radius = self.base_radius;
        let gradient = self.gradient;

        self.particles[..active]
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, p)| {
                p.velocity[0] += (p.position[1] * 0.01 + elapsed).sin() * chaos;
                p.velocity[1] += (p.position[0] * 0.01 + elapsed).cos() * chaos;

                let pull = attractor_force(p.position, &attractors, strength);
                p.velocity[0] += pull[0];
                p.velocity[1] += pull[1] + gravity * dt;

                p.position[0] += p.velocity[0] * dt;
                p.position[1] += p.velocity[1] * dt;

                p.life -= decay;
                if p.life <= 0.0 {
                    let weight = symbol_weight(sequence, i);
                    *p = spawn(i, active, base_radius, weight, [0.0, 0.0], &gradient);
                }
            });
    }
}

/// Up to `max` attractors evenly spaced on a circle, weighted by the leading symbols.
pub fn attractors(sequence: &[Nucleotide], max: usize, radius: f32) -> Vec<Attractor> {
    let n = sequence.len().min(max);
    sequence
        .iter()
        .take(n)
        .enumerate()
        .map(|(k, symbol)| {
            let angle = k as f32 * TAU / n as f32;
            Attractor {
                position: [angle.cos() * radius, angle.sin() * radius],
                weight: symbol.weight() as f32,
            }
        })
        .collect()
}

/// Summed inverse-square pull on a particle at `position`.
///
/// Terms closer than [`MIN_ATTRACTOR_DISTANCE`] are skipped, so coincident
/// attractors never produce an infinite or NaN force.
pub fn attractor_force(position: [f32; 2], attractors: &[Attractor], strength: f32) -> [f32; 2] {
    let mut force = [0.0f32; 2];
    for attractor in attractors {
        let dx = attractor.position[0] - position[0];
        let dy = attractor.position[1] - position[1];
        let dist_sq = dx * dx + dy * dy;
        let dist = dist_sq.sqrt();
        if !(dist >= MIN_ATTRACTOR_DISTANCE) {
            continue;
        }
        let magnitude = strength * attractor.weight / dist_sq;
        force[0] += magnitude * dx / dist;
        force[1] += magnitude * dy / dist;
    }
    force
}

/// Home position of slot `i` of `count` on the reseed spiral.
pub fn spiral_position(i: usize, count: usize, base_radius: f32, weight: f32) -> [f32; 2] {
    let count = count.max(1) as f32;
    let angle = i as f32 * TAU / count;
    let radius = (i as f32 / count) * base_radius * weight;
    [angle.cos() * radius, angle.sin() * radius]
}

#[inline]
fn symbol_weight(sequence: &[Nucleotide], i: usize) -> f32 {
    if sequence.is_empty() {
        1.0
    } else {
        sequence[i % sequence.len()].weight() as f32
    }
}

fn spawn(
    i: usize,
    count: usize,
    base_radius: f32,
    weight: f32,
    velocity: [f32; 2],
    gradient: &[[f32; 4]; 8],
) -> Particle {
    let stop = (weight * 10.0).floor() as usize % gradient.len();
    Particle {
        position: spiral_position(i, count, base_radius, weight),
        velocity,
        color: gradient[stop],
        size: weight * 2.0,
        life: 1.0,
        archetype: (i % ARCHETYPES as usize) as u32,
        _pad: 0,
    }
}

fn sequence_seed(sequence: &[Nucleotide]) -> u64 {
    let bytes: Vec<u8> = sequence.iter().map(|n| n.symbol() as u8).collect();
    fnv1a_64(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(capacity: usize) -> SimulatorSettings {
        SimulatorSettings {
            capacity,
            ..Default::default()
        }
    }

    fn params(count: usize) -> (SimulationParameters, ShadingParameters) {
        let sim = SimulationParameters {
            particle_count: count,
            energy: 2.0,
            color_hue: 0.0,
            spread: 150.0,
            gravity: -1.0,
            turbulence: 5.0,
            lifespan: 4.0,
        };
        let mut gradient = [[0.0f32; 4]; 8];
        for (i, stop) in gradient.iter_mut().enumerate() {
            *stop = [i as f32 / 8.0, 0.5, 0.5, 1.0];
        }
        let shade = ShadingParameters {
            wave_amplitudes: [0.1; 8],
            color_gradient: gradient,
            distortion_factor: 0.5,
            fractal_iterations: 15,
            time_scale: 1.0,
        };
        (sim, shade)
    }

    fn sequence() -> Vec<Nucleotide> {
        vec![Nucleotide::A, Nucleotide::G, Nucleotide::X, Nucleotide::T, Nucleotide::C]
    }

    #[test]
    fn test_active_count_capped_by_capacity() {
        let mut sim = ParticleSimulator::new(settings(100));
        let (p, s) = params(1_000_000);
        sim.reseed(&p, &s, &sequence());
        assert_eq!(sim.active_count(), 100);
        assert_eq!(sim.capacity(), 100);

        let (p, s) = params(40);
        sim.reseed(&p, &s, &sequence());
        assert_eq!(sim.active_count(), 40);
        assert_eq!(sim.capacity(), 100);
    }

    #[test]
    fn test_archetypes_cycle() {
        let mut sim = ParticleSimulator::new(settings(64));
        let (p, s) = params(50);
        sim.reseed(&p, &s, &sequence());
        for (i, particle) in sim.particles().iter().enumerate() {
            assert_eq!(particle.archetype, (i % 6) as u32);
        }
    }

    #[test]
    fn test_reseed_layout() {
        let mut sim = ParticleSimulator::new(settings(32));
        let (p, s) = params(10);
        let seq = sequence();
        sim.reseed(&p, &s, &seq);

        let first = sim.particles()[0];
        assert_eq!(first.position, [0.0, 0.0]);
        assert_eq!(first.life, 1.0);

        for (i, particle) in sim.particles().iter().enumerate() {
            let w = seq[i % seq.len()].weight() as f32;
            assert!((particle.size - 2.0 * w).abs() < 1e-6);
            let stop = (w * 10.0).floor() as usize % 8;
            assert_eq!(particle.color, s.color_gradient[stop]);
            let expected = spiral_position(i, 10, 150.0, w);
            assert_eq!(particle.position, expected);
            assert!(particle.velocity.iter().all(|v| v.abs() <= 2.0));
        }
    }

    #[test]
    fn test_reseed_reproducible() {
        let (p, s) = params(20);
        let mut a = ParticleSimulator::new(settings(20));
        let mut b = ParticleSimulator::new(settings(20));
        a.reseed(&p, &s, &sequence());
        b.reseed(&p, &s, &sequence());
        assert_eq!(a.particles(), b.particles());
    }

    #[test]
    fn test_coincident_attractors_are_finite() {
        let attractors = [
            Attractor {
                position: [5.0, 5.0],
                weight: 1.6,
            },
            Attractor {
                position: [5.0, 5.0],
                weight: 1.4,
            },
        ];
        let force = attractor_force([5.0, 5.0], &attractors, 1000.0);
        assert!(force.iter().all(|f| f.is_finite()));
        assert_eq!(force, [0.0, 0.0]);
    }

    #[test]
    fn test_attractor_pulls_toward_point() {
        let attractors = [Attractor {
            position: [10.0, 0.0],
            weight: 1.0,
        }];
        let force = attractor_force([0.0, 0.0], &attractors, 100.0);
        assert!((force[0] - 1.0).abs() < 1e-6);
        assert!(force[1].abs() < 1e-6);
    }

    #[test]
    fn test_attractors_on_circle() {
        let seq = vec![Nucleotide::A; 25];
        let points = attractors(&seq, 10, 300.0);
        assert_eq!(points.len(), 10);
        for a in &points {
            let r = (a.position[0].powi(2) + a.position[1].powi(2)).sqrt();
            assert!((r - 300.0).abs() < 1e-3);
        }
        assert_eq!(attractors(&seq[..3], 10, 300.0).len(), 3);
    }

    #[test]
    fn test_step_stays_finite_and_respawns() {
        let mut sim = ParticleSimulator::new(settings(200));
        let (p, s) = params(200);
        let seq = sequence();
        sim.reseed(&p, &s, &seq);

        let dt = 1.0 / 60.0;
        for frame in 0..600 {
            sim.step(dt, frame as f32 * dt, &seq, &s);
        }
        for particle in sim.particles() {
            assert!(particle.position.iter().all(|v| v.is_finite()));
            assert!(particle.velocity.iter().all(|v| v.is_finite()));
            assert!(particle.life > 0.0 && particle.life <= 1.0);
        }
        assert_eq!(sim.active_count(), 200);
    }

    #[test]
    fn test_step_applies_forcing() {
        let mut sim = ParticleSimulator::new(settings(8));
        let (p, s) = params(8);
        let seq = sequence();
        sim.reseed(&p, &s, &seq);
        let before: Vec<Particle> = sim.particles().to_vec();

        sim.step(0.01, 0.0, &seq, &s);
        let moved = sim
            .particles()
            .iter()
            .zip(before.iter())
            .any(|(a, b)| a.position != b.position);
        assert!(moved);
    }

    #[test]
    fn test_step_matches_forcing_formula() {
        let mut sim = ParticleSimulator::new(SimulatorSettings {
            capacity: 16,
            max_attractors: 0,
            ..Default::default()
        });
        let (mut p, s) = params(16);
        p.gravity = 0.0;
        p.lifespan = 100.0;
        let seq = sequence();
        sim.reseed(&p, &s, &seq);
        let before: Vec<Particle> = sim.particles().to_vec();

        let (dt, t) = (0.02f32, 1.3f32);
        sim.step(dt, t, &seq, &s);

        let chaos = s.distortion_factor;
        for (after, prev) in sim.particles().iter().zip(before.iter()) {
            let vx = prev.velocity[0] + (prev.position[1] * 0.01 + t).sin() * chaos;
            let vy = prev.velocity[1] + (prev.position[0] * 0.01 + t).cos() * chaos;
            assert!((after.velocity[0] - vx).abs() < 1e-5);
            assert!((after.velocity[1] - vy).abs() < 1e-5);
            assert!((after.position[0] - (prev.position[0] + vx * dt)).abs() < 1e-4);
            assert!((after.position[1] - (prev.position[1] + vy * dt)).abs() < 1e-4);
            assert!((after.life - (prev.life - dt / 100.0)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_particle_layout() {
        assert_eq!(std::mem::size_of::<Particle>(), 48);
    }
}
