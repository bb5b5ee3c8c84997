use crate::constants::{CHUNK_SIZE_X, CHUNK_SIZE_Z};
use crate::world::core::BlockId;
use crate::world::generation::biome::CaveSettings;
use crate::world::generation::noise::TerrainNoise;
use crate::world::generation::terrain::HeightField;
use crate::world::generation::worker::SubChunkView;

/// Decorrelates the second tunnel noise from the first.
const TUNNEL_OFFSET: f64 = 1000.0;

/// Y-axis frequency multiplier; stretches tunnel and chamber noise
/// vertically so carved spaces flatten out horizontally.
const VERTICAL_SQUASH: f64 = 3.0;

/// Octaves of the cheese chamber fractal.
const CHEESE_OCTAVES: u32 = 2;

/// Density bonus near a cave layer center: Gaussian falloff from the
/// nearest layer, repeating every `layer_spacing` blocks.
fn layer_bonus(settings: &CaveSettings, y: i64) -> f64 {
    if settings.layer_spacing <= 0.0 || settings.layer_strength <= 0.0 {
        return 0.0;
    }
    let offset = (y as f64 - settings.layer_peak_y).rem_euclid(settings.layer_spacing);
    let distance = offset.min(settings.layer_spacing - offset);
    let sigma = settings.layer_spacing / 6.0;
    settings.layer_strength * (-(distance * distance) / (2.0 * sigma * sigma)).exp()
}

/// Carve spaghetti tunnels and cheese chambers into the terrain.
///
/// Tunnels: two 3D noise fields; a cell is carved where the sum of their
/// squares (minus the layer bonus) falls below the threshold, which traces
/// the intersection of the two fields' zero surfaces. Chambers: a sparse
/// fractal field carved above its own threshold.
pub fn carve_caves(
    view: &mut SubChunkView<'_>,
    heights: &HeightField,
    noise: &TerrainNoise,
    settings: &CaveSettings,
    chunk_min_x: i64,
    chunk_min_z: i64,
) {
    let f = settings.frequency;
    for z in 0..CHUNK_SIZE_Z {
        for x in 0..CHUNK_SIZE_X {
            let surface = heights.get(x as i64, z as i64);
            let low = view.min_y().max(settings.min_y);
            let high = view
                .max_y()
                .min(settings.max_y)
                .min(surface + 5);
            if low > high {
                continue;
            }
            let wx = (chunk_min_x + x as i64) as f64;
            let wz = (chunk_min_z + z as i64) as f64;
            for y in low..=high {
                if view.get(x, y, z).is_air() {
                    continue;
                }
                let fy = y as f64 * f * VERTICAL_SQUASH;
                let n1 = noise.noise_3d(wx * f, fy, wz * f);
                let n2 = noise.noise_3d(wx * f + TUNNEL_OFFSET, fy + TUNNEL_OFFSET, wz * f + TUNNEL_OFFSET);
                let density = n1 * n1 + n2 * n2 - layer_bonus(settings, y);
                if density < settings.threshold {
                    view.set(x, y, z, BlockId::AIR);
                    continue;
                }
                if settings.cheese_enabled {
                    let cf = settings.cheese_frequency;
                    let cheese = noise.fractal_3d(
                        wx,
                        y as f64 * VERTICAL_SQUASH,
                        wz,
                        CHEESE_OCTAVES,
                        0.5,
                        cf,
                    );
                    if cheese > settings.cheese_threshold {
                        view.set(x, y, z, BlockId::AIR);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SUB_CHUNK_VOLUME;
    use crate::world::generation::biome::BiomeConfig;
    use crate::world::generation::terrain::{compute_heights, fill_terrain};
    use crate::world::generation::biome::BiomeBlendData;

    #[test]
    fn layer_bonus_peaks_at_layer_centers() {
        let settings = CaveSettings {
            layer_peak_y: 40.0,
            layer_spacing: 48.0,
            layer_strength: 0.02,
            ..CaveSettings::default()
        };
        let at_peak = layer_bonus(&settings, 40);
        let between = layer_bonus(&settings, 40 + 24);
        assert!(at_peak > between);
        assert!((at_peak - 0.02).abs() < 1e-9);
        // Layers repeat.
        assert!((layer_bonus(&settings, 88) - at_peak).abs() < 1e-9);
    }

    #[test]
    fn carving_only_removes_blocks() {
        let noise = TerrainNoise::new(3);
        let blend = BiomeBlendData {
            primary: BiomeConfig::plains(),
            neighbors: Default::default(),
            local_x: 8,
            local_z: 8,
        };
        let heights = compute_heights(&noise, &blend, 64, 0, 0);
        let mut blocks = vec![0u16; SUB_CHUNK_VOLUME];
        let mut view = SubChunkView::new(&mut blocks, 0);
        fill_terrain(&mut view, &heights, &blend);
        let before: usize = view.solid_count();
        let settings = CaveSettings::default();
        carve_caves(&mut view, &heights, &noise, &settings, 0, 0);
        assert!(view.solid_count() <= before);
    }
}
