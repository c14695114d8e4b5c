//! # Configuration
//!
//! Engine tuning (`EngineConfig`) and world content (`WorldDefinition`), both read
//! from JSON once at startup. Every field has a default, so a configuration file
//! only needs to list what it changes.

use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::core::{Result, WorldRand};
use crate::engine_state::voxels::generation::biome::{
    BiomeDefinition, BiomeOre, BiomeTreeEntry, BiomeUndergroundEntry, BiomeVoxelEntry, BiomeZone,
};
use crate::engine_state::voxels::generation::terrain_generator::{
    CaveSettings, TerrainGeneratorSettings,
};
use crate::engine_state::voxels::voxel::voxel_definition::VoxelDefinition;

/// Runtime tuning of the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of resident chunks.
    pub pool_capacity: usize,
    /// Sun light lost per step below the surface.
    pub sun_attenuation: u8,
    /// Torch light lost per step.
    pub torch_attenuation: u8,
    /// Chunk generation requests started per tick.
    pub max_chunks_per_tick: usize,
    /// Time budget of a tick in milliseconds.
    pub max_tick_millis: u64,
    /// Paint chunks on a worker thread.
    pub multithread_generation: bool,
    /// Tasks handed to the worker at once.
    pub channel_capacity: usize,
    /// Attempts before a failing chunk is given up.
    pub max_generation_attempts: u32,
    /// Radius, in chunks, of the area kept generated around the point of interest.
    pub visible_distance: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            pool_capacity: 4096,
            sun_attenuation: 2,
            torch_attenuation: 1,
            max_chunks_per_tick: 8,
            max_tick_millis: 16,
            multithread_generation: true,
            channel_capacity: 4,
            max_generation_attempts: 3,
            visible_distance: 4,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

/// World seed, either a number or a text hashed into one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorldSeed {
    /// Numeric seed.
    Number(u64),
    /// Textual seed.
    Text(String),
}

impl Default for WorldSeed {
    fn default() -> Self {
        WorldSeed::Number(0)
    }
}

impl WorldSeed {
    /// The random source of this seed.
    pub fn world_rand(&self) -> WorldRand {
        match self {
            WorldSeed::Number(seed) => WorldRand::new(*seed),
            WorldSeed::Text(text) => WorldRand::from_text(text),
        }
    }
}

/// Content of a world: seed, voxel types, biomes and generator settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldDefinition {
    /// World seed.
    pub seed: WorldSeed,
    /// Voxel types, the first one is the fallback for unknown names.
    pub voxels: Vec<VoxelDefinition>,
    /// Biomes, in selection order.
    pub biomes: Vec<BiomeDefinition>,
    /// Biome used where no zone matches, the first biome if unset.
    pub default_biome: Option<String>,
    /// Terrain generator settings.
    pub generator: TerrainGeneratorSettings,
}

impl WorldDefinition {
    /// Parses a world definition from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a world definition file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let definition = Self::from_json(&fs::read_to_string(path)?)?;
        info!(
            "Loaded world definition: {} voxels, {} biomes",
            definition.voxels.len(),
            definition.biomes.len()
        );
        Ok(definition)
    }
}

fn entry(voxel: &str, probability: f32) -> BiomeVoxelEntry {
    BiomeVoxelEntry {
        voxel: voxel.to_string(),
        probability,
    }
}

impl Default for WorldDefinition {
    /// A small built-in world: grassland and desert over stone, with water,
    /// caves and coal.
    fn default() -> Self {
        let voxels = vec![
            VoxelDefinition::solid("Stone", [125, 125, 125, 255]),
            VoxelDefinition::solid("Grass", [86, 152, 58, 255]),
            VoxelDefinition::solid("Dirt", [121, 85, 58, 255]),
            VoxelDefinition::solid("Sand", [219, 203, 140, 255]),
            VoxelDefinition::solid("Gravel", [136, 126, 126, 255]),
            VoxelDefinition::solid("Bedrock", [40, 40, 40, 255]),
            VoxelDefinition::solid("CoalOre", [52, 52, 52, 255]),
            VoxelDefinition {
                is_water: true,
                ..VoxelDefinition::translucent("Water", 2, [48, 92, 200, 160])
            },
            VoxelDefinition::translucent("TallGrass", 0, [96, 170, 64, 255]),
            VoxelDefinition::translucent("Mushroom", 0, [190, 60, 50, 255]),
            VoxelDefinition {
                light_intensity: 14,
                ..VoxelDefinition::translucent("Torch", 0, [255, 210, 120, 255])
            },
        ];

        let coal = BiomeOre {
            voxel: "CoalOre".to_string(),
            depth_min: 5,
            depth_max: 60,
            vein_min_size: 3,
            vein_max_size: 8,
            veins_count_min: 1,
            veins_count_max: 4,
            ..Default::default()
        };

        let grassland = BiomeDefinition {
            name: "Grassland".to_string(),
            zones: vec![BiomeZone {
                moisture_min: 0.35,
                ..Default::default()
            }],
            voxel_top: "Grass".to_string(),
            voxel_dirt: "Dirt".to_string(),
            voxel_shore: Some("Sand".to_string()),
            voxel_lake_bed: Some("Gravel".to_string()),
            voxel_dirt_additional: vec![BiomeUndergroundEntry {
                voxel: "Stone".to_string(),
                probability: 0.9,
                altitude_min: 0,
                altitude_max: 40,
            }],
            vegetation_density: 0.15,
            vegetation: vec![entry("TallGrass", 1.0)],
            tree_density: 0.01,
            trees: vec![BiomeTreeEntry {
                tree: "Oak".to_string(),
                probability: 1.0,
            }],
            underground_vegetation_density: 0.05,
            underground_vegetation: vec![entry("Mushroom", 1.0)],
            ores: vec![coal.clone()],
            ..Default::default()
        };

        let desert = BiomeDefinition {
            name: "Desert".to_string(),
            zones: vec![BiomeZone {
                moisture_max: 0.35,
                ..Default::default()
            }],
            voxel_top: "Sand".to_string(),
            voxel_dirt: "Sand".to_string(),
            voxel_top_additional: vec![entry("Gravel", 0.05)],
            voxel_dirt_additional: vec![BiomeUndergroundEntry {
                voxel: "Stone".to_string(),
                probability: 1.0,
                altitude_min: 0,
                altitude_max: 36,
            }],
            ores: vec![coal],
            ..Default::default()
        };

        WorldDefinition {
            seed: WorldSeed::default(),
            voxels,
            biomes: vec![grassland, desert],
            default_biome: Some("Grassland".to_string()),
            generator: TerrainGeneratorSettings {
                caves: CaveSettings {
                    enabled: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }
}

/// Everything read at startup.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Engine tuning.
    pub engine: EngineConfig,
    /// World content.
    pub world: WorldDefinition,
}

impl Settings {
    /// Reads a settings file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::VoxelError;

    #[test]
    fn test_partial_engine_config_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{ "pool_capacity": 64, "multithread_generation": false }"#).unwrap();
        assert_eq!(config.pool_capacity, 64);
        assert!(!config.multithread_generation);
        assert_eq!(config.sun_attenuation, 2);
        assert_eq!(config.max_generation_attempts, 3);
    }

    #[test]
    fn test_syntax_errors_surface_as_config_errors() {
        assert!(matches!(
            EngineConfig::from_json("{ pool_capacity: }"),
            Err(VoxelError::Config(_))
        ));
    }

    #[test]
    fn test_seed_accepts_numbers_and_text() {
        let numeric = WorldDefinition::from_json(r#"{ "seed": 42 }"#).unwrap();
        assert_eq!(numeric.seed, WorldSeed::Number(42));
        assert_eq!(numeric.seed.world_rand(), WorldRand::new(42));

        let text = WorldDefinition::from_json(r#"{ "seed": "hello" }"#).unwrap();
        assert_eq!(text.seed.world_rand(), WorldRand::from_text("hello"));
    }

    #[test]
    fn test_world_definition_from_json() {
        let json = r#"{
            "seed": 7,
            "voxels": [
                { "name": "Stone" },
                { "name": "Glass", "opacity": 1, "color": [200, 220, 255, 90] }
            ],
            "biomes": [
                { "name": "Rocks", "voxel_top": "Stone", "voxel_dirt": "Stone",
                  "voxel_top_additional": [ { "voxel": "Glass", "probability": 0.1 } ] }
            ],
            "generator": { "flat_ground_level": 12.0, "water_level": null }
        }"#;
        let definition = WorldDefinition::from_json(json).unwrap();
        assert_eq!(definition.voxels.len(), 2);
        assert_eq!(definition.voxels[0].opacity, 15);
        assert_eq!(definition.voxels[1].opacity, 1);
        assert_eq!(definition.biomes[0].voxel_top_additional.len(), 1);
        assert_eq!(definition.generator.flat_ground_level, Some(12.0));
        assert_eq!(definition.generator.water_level, None);
        assert_eq!(definition.generator.bedrock_voxel, "Bedrock");
    }

    #[test]
    fn test_settings_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings::default();
        fs::write(&path, serde_json::to_string_pretty(&settings).unwrap()).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.engine.pool_capacity, settings.engine.pool_capacity);
        assert_eq!(loaded.world.voxels.len(), settings.world.voxels.len());
        assert_eq!(loaded.world.biomes.len(), 2);
        assert!(matches!(
            Settings::load(dir.path().join("missing.json")),
            Err(VoxelError::Io(_))
        ));
    }
}
