//! Multi-octave 2D gradient noise used as a static distortion texture.
//!
//! Values are a pure function of a hash of integer lattice coordinates, so the
//! same (resolution, octaves, seed) always produces the same field. The lattice
//! wraps at every octave, making the field tileable.

use rayon::prelude::*;

/// Lattice cells across the texture at the first octave.
pub const BASE_FREQUENCY: u32 = 4;

const GRADIENTS: [(f32, f32); 8] = [
    (1.0, 0.0),
    (-1.0, 0.0),
    (0.0, 1.0),
    (0.0, -1.0),
    (std::f32::consts::FRAC_1_SQRT_2, std::f32::consts::FRAC_1_SQRT_2),
    (-std::f32::consts::FRAC_1_SQRT_2, std::f32::consts::FRAC_1_SQRT_2),
    (std::f32::consts::FRAC_1_SQRT_2, -std::f32::consts::FRAC_1_SQRT_2),
    (-std::f32::consts::FRAC_1_SQRT_2, -std::f32::consts::FRAC_1_SQRT_2),
];

/// Precomputed square noise texture, row-major, values in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseField {
    resolution: usize,
    octaves: u32,
    seed: u32,
    data: Vec<f32>,
}

impl NoiseField {
    /// Generate a `resolution x resolution` field summing `octaves` octaves.
    pub fn generate(resolution: usize, octaves: u32, seed: u32) -> Self {
        let mut data = vec![0.0f32; resolution * resolution];
        if resolution > 0 {
            data.par_chunks_mut(resolution)
                .enumerate()
                .for_each(|(y, row)| {
                    for (x, value) in row.iter_mut().enumerate() {
                        let u = x as f32 / resolution as f32;
                        let v = y as f32 / resolution as f32;
                        *value = fbm(u, v, octaves, seed);
                    }
                });
        }
        normalize(&mut data);

        Self {
            resolution,
            octaves,
            seed,
            data,
        }
    }

    #[inline]
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    #[inline]
    pub fn octaves(&self) -> u32 {
        self.octaves
    }

    #[inline]
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Row-major texel values.
    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Texel at (x, y), wrapping out-of-range coordinates.
    #[inline]
    pub fn get(&self, x: i64, y: i64) -> f32 {
        let r = self.resolution as i64;
        let xi = x.rem_euclid(r) as usize;
        let yi = y.rem_euclid(r) as usize;
        self.data[yi * self.resolution + xi]
    }
}

/// Sum of octaves at normalized coordinates (u, v) in [0, 1).
pub fn fbm(u: f32, v: f32, octaves: u32, seed: u32) -> f32 {
    let mut amplitude = 1.0f32;
    let mut period = BASE_FREQUENCY;
    let mut total = 0.0f32;
    for octave in 0..octaves {
        let f = period as f32;
        total += amplitude * gradient_noise(u * f, v * f, period, seed.wrapping_add(octave));
        amplitude *= 0.5;
        period = period.saturating_mul(2);
    }
    total
}

/// Single-octave gradient noise at lattice-space (x, y), wrapping at `period`.
pub fn gradient_noise(x: f32, y: f32, period: u32, seed: u32) -> f32 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let p = period.max(1) as i64;
    let ix0 = (x0 as i64).rem_euclid(p);
    let iy0 = (y0 as i64).rem_euclid(p);
    let ix1 = (ix0 + 1).rem_euclid(p);
    let iy1 = (iy0 + 1).rem_euclid(p);

    let corner = |ix: i64, iy: i64, dx: f32, dy: f32| -> f32 {
        let (gx, gy) = GRADIENTS[(lattice_hash(ix as u32, iy as u32, seed) & 7) as usize];
        gx * dx + gy * dy
    };

    let n00 = corner(ix0, iy0, fx, fy);
    let n10 = corner(ix1, iy0, fx - 1.0, fy);
    let n01 = corner(ix0, iy1, fx, fy - 1.0);
    let n11 = corner(ix1, iy1, fx - 1.0, fy - 1.0);

    let sx = fade(fx);
    let sy = fade(fy);
    let nx0 = lerp(n00, n10, sx);
    let nx1 = lerp(n01, n11, sx);
    lerp(nx0, nx1, sy)
}

/// Integer avalanche hash of a lattice coordinate.
#[inline]
pub fn lattice_hash(x: u32, y: u32, seed: u32) -> u32 {
    let mut h = x.wrapping_mul(0x27d4_eb2d)
        ^ y.wrapping_mul(0x1656_67b1)
        ^ seed.wrapping_mul(0x9e37_79b9);
    h ^= h >> 15;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// Quintic smoothstep 6t^5 - 15t^4 + 10t^3.
#[inline]
fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Rescale values to [0, 1]; a flat field becomes 0.5.
fn normalize(data: &mut [f32]) {
    let (min, max) = data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if !(range > 0.0) {
        data.fill(0.5);
        return;
    }
    let inv = 1.0 / range;
    for v in data.iter_mut() {
        *v = (*v - min) * inv;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_deterministic() {
        let a = NoiseField::generate(64, 6, 7);
        let b = NoiseField::generate(64, 6, 7);
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn test_noise_seed_changes_field() {
        let a = NoiseField::generate(32, 3, 1);
        let b = NoiseField::generate(32, 3, 2);
        assert_ne!(a.data(), b.data());
    }

    #[test]
    fn test_noise_range() {
        let field = NoiseField::generate(64, 6, 0);
        assert_eq!(field.data().len(), 64 * 64);
        let min = field.data().iter().copied().fold(f32::INFINITY, f32::min);
        let max = field.data().iter().copied().fold(f32::NEG_INFINITY, f32::max);
        assert!((min - 0.0).abs() < 1e-6);
        assert!((max - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_noise_zero_at_lattice_points() {
        // Gradient noise vanishes at integer lattice coordinates.
        for ix in 0..4 {
            for iy in 0..4 {
                assert_eq!(gradient_noise(ix as f32, iy as f32, 4, 9), 0.0);
            }
        }
    }

    #[test]
    fn test_noise_wraps() {
        let a = gradient_noise(0.3, 0.6, 4, 3);
        let b = gradient_noise(4.3, 0.6, 4, 3);
        assert!((a - b).abs() < 1e-5);

        let field = NoiseField::generate(16, 2, 0);
        assert_eq!(field.get(-1, 0), field.get(15, 0));
        assert_eq!(field.get(0, 16), field.get(0, 0));
    }

    #[test]
    fn test_octaves_add_detail() {
        let coarse = NoiseField::generate(64, 1, 5);
        let fine = NoiseField::generate(64, 6, 5);
        let roughness = |f: &NoiseField| -> f32 {
            f.data().windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f32>()
        };
        assert!(roughness(&fine) > roughness(&coarse));
    }
}
