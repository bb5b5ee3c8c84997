use noise::{NoiseFn, Perlin};

/// Deterministic positional hash in [0, 1).
///
/// Worker and main thread must agree bit-for-bit on every sample, so this
/// is integer-only: coordinates and salt are spread by coprime odd
/// constants, folded with the seed, then finished with three mix-shift
/// rounds before masking to 31 bits.
pub fn position_random(seed: u64, x: i64, z: i64, salt: u64) -> f64 {
    const KX: u64 = 0x9E37_79B9_7F4A_7C15;
    const KZ: u64 = 0xC2B2_AE3D_27D4_EB4F;
    const KS: u64 = 0x1656_67B1_9E37_79F9;

    let mut h = (x as u64)
        .wrapping_mul(KX)
        .wrapping_add((z as u64).wrapping_mul(KZ))
        .wrapping_add(salt.wrapping_mul(KS))
        ^ seed;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85EB_CA6B);
    h ^= h >> 13;
    h = h.wrapping_mul(0xC2B2_AE35);
    h ^= h >> 16;
    (h & 0x7FFF_FFFF) as f64 / 2_147_483_648.0
}

/// Seedable coherent noise with additive-octave fractal sampling.
///
/// Two independent Perlin sources back the 2D and 3D samplers so terrain
/// and cave fields do not correlate.
pub struct TerrainNoise {
    source_2d: Perlin,
    source_3d: Perlin,
}

impl TerrainNoise {
    pub fn new(seed: u32) -> Self {
        Self {
            source_2d: Perlin::new(seed),
            source_3d: Perlin::new(seed.wrapping_add(0x9E37)),
        }
    }

    /// Raw 2D sample in [-1, 1].
    #[inline]
    pub fn noise_2d(&self, x: f64, y: f64) -> f64 {
        self.source_2d.get([x, y])
    }

    /// Raw 3D sample in [-1, 1].
    #[inline]
    pub fn noise_3d(&self, x: f64, y: f64, z: f64) -> f64 {
        self.source_3d.get([x, y, z])
    }

    /// Octave-summed 2D sample, normalized back to [-1, 1].
    pub fn fractal_2d(
        &self,
        x: f64,
        y: f64,
        octaves: u32,
        persistence: f64,
        base_frequency: f64,
    ) -> f64 {
        let mut amplitude = 1.0;
        let mut frequency = base_frequency;
        let mut sum = 0.0;
        let mut max = 0.0;
        for _ in 0..octaves.max(1) {
            sum += self.noise_2d(x * frequency, y * frequency) * amplitude;
            max += amplitude;
            amplitude *= persistence;
            frequency *= 2.0;
        }
        sum / max
    }

    /// Octave-summed 3D sample, normalized back to [-1, 1].
    pub fn fractal_3d(
        &self,
        x: f64,
        y: f64,
        z: f64,
        octaves: u32,
        persistence: f64,
        base_frequency: f64,
    ) -> f64 {
        let mut amplitude = 1.0;
        let mut frequency = base_frequency;
        let mut sum = 0.0;
        let mut max = 0.0;
        for _ in 0..octaves.max(1) {
            sum += self.noise_3d(x * frequency, y * frequency, z * frequency) * amplitude;
            max += amplitude;
            amplitude *= persistence;
            frequency *= 2.0;
        }
        sum / max
    }
}
