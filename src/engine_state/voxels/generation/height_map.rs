//! # Height Map Module
//!
//! Per-column terrain sampling: ground level, moisture and biome. The terrain
//! generator asks a [`HeightMapSource`] once per column of every chunk it paints.

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

use crate::core::WorldRand;

use super::biome::{Biome, BiomeId, BiomeZone};

/// Sampled information about a terrain column.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HeightMapInfo {
    /// World Y of the topmost ground voxel.
    pub ground_level: f32,
    /// Moisture in `[0, 1]`.
    pub moisture: f32,
    /// Biome of the column, `None` when no zone matched and there is no default.
    pub biome: Option<BiomeId>,
}

/// Source of terrain column information.
pub trait HeightMapSource: Send + Sync {
    /// Samples the column at world `x`, `z`.
    fn column(&self, x: i32, z: i32) -> HeightMapInfo;

    /// Highest ground level this source can produce.
    fn max_height(&self) -> f32;

    /// Lowest ground level this source can produce.
    fn min_height(&self) -> f32;
}

/// Noise parameters for [`NoiseHeightMap`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightMapSettings {
    /// Lowest ground level.
    pub min_height: f32,
    /// Highest ground level.
    pub max_height: f32,
    /// Elevation noise frequency.
    pub elevation_frequency: f64,
    /// Elevation noise octaves.
    pub elevation_octaves: usize,
    /// Moisture noise frequency.
    pub moisture_frequency: f64,
}

impl Default for HeightMapSettings {
    fn default() -> Self {
        HeightMapSettings {
            min_height: 8.0,
            max_height: 72.0,
            elevation_frequency: 0.006,
            elevation_octaves: 5,
            moisture_frequency: 0.003,
        }
    }
}

/// Picks the first biome whose zones contain the column, else the default.
pub fn select_biome(
    zones: &[(BiomeId, Vec<BiomeZone>)],
    default_biome: Option<BiomeId>,
    altitude: f32,
    moisture: f32,
) -> Option<BiomeId> {
    zones
        .iter()
        .find(|(_, zones)| zones.iter().any(|z| z.contains(altitude, moisture)))
        .map(|(id, _)| *id)
        .or(default_biome)
}

/// fBm Perlin terrain with a separate moisture field.
pub struct NoiseHeightMap {
    elevation: Fbm<Perlin>,
    moisture: Fbm<Perlin>,
    settings: HeightMapSettings,
    zones: Vec<(BiomeId, Vec<BiomeZone>)>,
    default_biome: Option<BiomeId>,
}

/// Salt separating the moisture seed from the elevation seed.
const MOISTURE_SALT: u64 = 0x6d6f_6973_7475_7265;

impl NoiseHeightMap {
    /// Creates a noise height map.
    ///
    /// # Arguments
    /// * `world_rand` - World random source, its seed drives both noise fields
    /// * `settings` - Height range and noise parameters
    /// * `biomes` - Resolved biomes, for zone selection
    /// * `default_biome` - Biome used when no zone matches
    pub fn new(
        world_rand: WorldRand,
        settings: HeightMapSettings,
        biomes: &[Biome],
        default_biome: Option<BiomeId>,
    ) -> Self {
        let elevation_seed = world_rand.seed() as u32;
        let moisture_seed = world_rand.derive(MOISTURE_SALT).seed() as u32;

        let elevation = Fbm::<Perlin>::new(elevation_seed)
            .set_octaves(settings.elevation_octaves.clamp(1, 10))
            .set_frequency(settings.elevation_frequency)
            .set_persistence(0.5);
        let moisture = Fbm::<Perlin>::new(moisture_seed)
            .set_octaves(3)
            .set_frequency(settings.moisture_frequency);

        NoiseHeightMap {
            elevation,
            moisture,
            settings,
            zones: biomes
                .iter()
                .enumerate()
                .map(|(id, biome)| (id, biome.zones.clone()))
                .collect(),
            default_biome,
        }
    }
}

impl HeightMapSource for NoiseHeightMap {
    fn column(&self, x: i32, z: i32) -> HeightMapInfo {
        let point = [x as f64, z as f64];
        let e = (self.elevation.get(point) * 0.5 + 0.5).clamp(0.0, 1.0) as f32;
        let moisture = (self.moisture.get(point) * 0.5 + 0.5).clamp(0.0, 1.0) as f32;
        let ground_level =
            (self.settings.min_height + e * (self.settings.max_height - self.settings.min_height))
                .floor();

        HeightMapInfo {
            ground_level,
            moisture,
            biome: select_biome(&self.zones, self.default_biome, ground_level, moisture),
        }
    }

    fn max_height(&self) -> f32 {
        self.settings.max_height
    }

    fn min_height(&self) -> f32 {
        self.settings.min_height
    }
}

/// Constant ground level with a single biome.
#[derive(Clone, Debug)]
pub struct FlatHeightMap {
    /// Ground level of every column.
    pub ground_level: f32,
    /// Moisture of every column.
    pub moisture: f32,
    /// Biome of every column.
    pub biome: Option<BiomeId>,
}

impl FlatHeightMap {
    /// Creates a flat height map.
    pub fn new(ground_level: f32, biome: Option<BiomeId>) -> Self {
        FlatHeightMap {
            ground_level: ground_level.floor(),
            moisture: 0.5,
            biome,
        }
    }
}

impl HeightMapSource for FlatHeightMap {
    fn column(&self, _x: i32, _z: i32) -> HeightMapInfo {
        HeightMapInfo {
            ground_level: self.ground_level,
            moisture: self.moisture,
            biome: self.biome,
        }
    }

    fn max_height(&self) -> f32 {
        self.ground_level
    }

    fn min_height(&self) -> f32 {
        self.ground_level
    }
}
