//! # Gradient Noise
//!
//! Seeded Perlin noise used by the terrain generator.
//!
//! Same seed, same values, on every platform: the permutation table is
//! shuffled by a fixed splitmix64 stream, and sampling uses only `f64`
//! arithmetic with no platform intrinsics.

/// Seed for deterministic generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Seed(u64);

impl Seed {
    /// Wraps a raw seed.
    #[inline]
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Raw value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Independent sub-seed for one purpose (heightmap, caves, ...).
    #[inline]
    #[must_use]
    pub const fn derive(self, purpose: u64) -> Self {
        Self(splitmix64(self.0 ^ purpose.wrapping_mul(0x9E37_79B9_7F4A_7C15)))
    }
}

#[inline]
const fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Perlin noise in one and two dimensions.
///
/// Output is roughly in `[-1, 1]`.
pub struct PerlinNoise {
    perm: [u8; 512],
}

impl PerlinNoise {
    /// Builds the permutation table for `seed`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(seed: Seed) -> Self {
        let mut table = [0u8; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = i as u8;
        }
        let mut state = seed.value();
        for i in (1..256).rev() {
            state = splitmix64(state);
            let j = (state % (i as u64 + 1)) as usize;
            table.swap(i, j);
        }

        let mut perm = [0u8; 512];
        perm[..256].copy_from_slice(&table);
        perm[256..].copy_from_slice(&table);
        Self { perm }
    }

    #[inline]
    #[allow(clippy::cast_sign_loss)]
    fn hash(&self, i: i64) -> usize {
        self.perm[(i & 255) as usize] as usize
    }

    /// 1D noise.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn sample1(&self, x: f64) -> f64 {
        let x0 = x.floor();
        let i = x0 as i64;
        let t = x - x0;
        let g0 = grad1(self.hash(i), t);
        let g1 = grad1(self.hash(i + 1), t - 1.0);
        // Max of the 1D gradient sum is 0.5 at t = 0.5 with unit gradients.
        2.0 * lerp(fade(t), g0, g1)
    }

    /// 2D noise.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn sample2(&self, x: f64, y: f64) -> f64 {
        let x0 = x.floor();
        let y0 = y.floor();
        let (i, j) = (x0 as i64, y0 as i64);
        let (fx, fy) = (x - x0, y - y0);

        let row0 = self.hash(j) as i64;
        let row1 = self.hash(j + 1) as i64;
        let aa = self.hash(i + row0);
        let ab = self.hash(i + row1);
        let ba = self.hash(i + 1 + row0);
        let bb = self.hash(i + 1 + row1);

        let u = fade(fx);
        let v = fade(fy);
        let bottom = lerp(u, grad2(aa, fx, fy), grad2(ba, fx - 1.0, fy));
        let top = lerp(u, grad2(ab, fx, fy - 1.0), grad2(bb, fx - 1.0, fy - 1.0));
        lerp(v, bottom, top)
    }

    /// Fractal sum of 1D octaves, normalised to `[-1, 1]`.
    #[must_use]
    pub fn fbm1(&self, x: f64, octaves: u32, persistence: f64) -> f64 {
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = 1.0;
        let mut norm = 0.0;
        for _ in 0..octaves {
            total += self.sample1(x * frequency) * amplitude;
            norm += amplitude;
            amplitude *= persistence;
            frequency *= 2.0;
        }
        if norm > 0.0 {
            total / norm
        } else {
            0.0
        }
    }

    /// Fractal sum of 2D octaves, normalised to `[-1, 1]`.
    #[must_use]
    pub fn fbm2(&self, x: f64, y: f64, octaves: u32, persistence: f64) -> f64 {
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = 1.0;
        let mut norm = 0.0;
        for _ in 0..octaves {
            total += self.sample2(x * frequency, y * frequency) * amplitude;
            norm += amplitude;
            amplitude *= persistence;
            frequency *= 2.0;
        }
        if norm > 0.0 {
            total / norm
        } else {
            0.0
        }
    }
}

#[inline]
fn fade(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

#[inline]
fn lerp(t: f64, a: f64, b: f64) -> f64 {
    a + t * (b - a)
}

#[inline]
fn grad1(hash: usize, d: f64) -> f64 {
    if hash & 1 == 0 {
        d
    } else {
        -d
    }
}

#[inline]
fn grad2(hash: usize, x: f64, y: f64) -> f64 {
    match hash & 7 {
        0 => x + y,
        1 => -x + y,
        2 => x - y,
        3 => -x - y,
        4 => x,
        5 => -x,
        6 => y,
        _ => -y,
    }
}
