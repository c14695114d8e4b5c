//! # Biome Module
//!
//! Biome definitions as written in the world definition, and their resolved
//! runtime form. Resolution turns voxel names into type indices and pre-expands the
//! probability lists into fixed lookup tables:
//!
//! * a 100 slot surface table,
//! * a 1000 x 100 underground table indexed by altitude `-500..500`.
//!
//! Each additional voxel fills `probability * 100` consecutive slots (accumulated
//! probability is clamped to 1) and the remaining slots keep the main voxel, so a
//! position-hashed slot pick reproduces the configured distribution.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::engine_state::voxels::voxel::voxel_definition::VoxelRegistry;
use crate::engine_state::voxels::voxel::VoxelTypeIndex;

/// Number of slots in a probability table.
pub const TABLE_SLOTS: usize = 100;
/// Lowest altitude covered by the underground table.
pub const UNDERGROUND_MIN_ALTITUDE: i32 = -500;
/// Number of altitude bins in the underground table.
pub const UNDERGROUND_ALTITUDES: usize = 1000;

/// Index of a biome in the generator's biome list.
pub type BiomeId = usize;

/// Altitude and moisture window in which a biome appears.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BiomeZone {
    /// Lowest ground level, inclusive.
    pub altitude_min: f32,
    /// Highest ground level, inclusive.
    pub altitude_max: f32,
    /// Lowest moisture, inclusive.
    pub moisture_min: f32,
    /// Highest moisture, inclusive.
    pub moisture_max: f32,
}

impl Default for BiomeZone {
    fn default() -> Self {
        BiomeZone {
            altitude_min: f32::MIN,
            altitude_max: f32::MAX,
            moisture_min: 0.0,
            moisture_max: 1.0,
        }
    }
}

impl BiomeZone {
    /// Returns `true` when a column falls inside the zone.
    pub fn contains(&self, altitude: f32, moisture: f32) -> bool {
        (self.altitude_min..=self.altitude_max).contains(&altitude)
            && (self.moisture_min..=self.moisture_max).contains(&moisture)
    }
}

/// A voxel with a probability.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BiomeVoxelEntry {
    /// Voxel name.
    pub voxel: String,
    /// Probability, 0..=1.
    pub probability: f32,
}

/// An underground voxel restricted to an altitude band.
///
/// An altitude bound of `0` means unbounded on that side.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BiomeUndergroundEntry {
    /// Voxel name.
    pub voxel: String,
    /// Probability, 0..=1.
    pub probability: f32,
    /// Lowest altitude, `0` for none.
    #[serde(default)]
    pub altitude_min: i32,
    /// Highest altitude, `0` for none.
    #[serde(default)]
    pub altitude_max: i32,
}

/// A tree model with a probability.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BiomeTreeEntry {
    /// Tree model name, handed to the tree builder.
    pub tree: String,
    /// Probability, 0..=1.
    pub probability: f32,
}

/// An ore that spawns in veins.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BiomeOre {
    /// Ore voxel name.
    pub voxel: String,
    /// Lower bound of the per-chunk sample that enables the ore.
    pub probability_min: f32,
    /// Upper bound of the per-chunk sample that enables the ore.
    pub probability_max: f32,
    /// Minimum depth below the column surface.
    pub depth_min: i32,
    /// Maximum depth below the column surface.
    pub depth_max: i32,
    /// Minimum steps of a vein.
    pub vein_min_size: u32,
    /// Maximum steps of a vein.
    pub vein_max_size: u32,
    /// Minimum veins per chunk.
    pub veins_count_min: u32,
    /// Maximum veins per chunk.
    pub veins_count_max: u32,
}

impl Default for BiomeOre {
    fn default() -> Self {
        BiomeOre {
            voxel: String::new(),
            probability_min: 0.0,
            probability_max: 1.0,
            depth_min: 5,
            depth_max: 60,
            vein_min_size: 2,
            vein_max_size: 6,
            veins_count_min: 1,
            veins_count_max: 2,
        }
    }
}

/// A biome as written in the world definition.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BiomeDefinition {
    /// Biome name.
    pub name: String,
    /// Zones in which the biome appears.
    pub zones: Vec<BiomeZone>,
    /// Main surface voxel.
    pub voxel_top: String,
    /// Main underground voxel.
    pub voxel_dirt: String,
    /// Surface voxel at the water line, defaults to the top voxel.
    pub voxel_shore: Option<String>,
    /// Voxel under water, defaults to the dirt voxel.
    pub voxel_lake_bed: Option<String>,
    /// Additional surface voxels.
    pub voxel_top_additional: Vec<BiomeVoxelEntry>,
    /// Additional underground voxels.
    pub voxel_dirt_additional: Vec<BiomeUndergroundEntry>,
    /// Chance per surface column of low vegetation.
    pub vegetation_density: f32,
    /// Low vegetation.
    pub vegetation: Vec<BiomeVoxelEntry>,
    /// Chance per surface column of a tree.
    pub tree_density: f32,
    /// Tree models.
    pub trees: Vec<BiomeTreeEntry>,
    /// Chance per lake bed column of underwater vegetation.
    pub underwater_vegetation_density: f32,
    /// Underwater vegetation.
    pub underwater_vegetation: Vec<BiomeVoxelEntry>,
    /// Chance per cave floor voxel of vegetation.
    pub underground_vegetation_density: f32,
    /// Cave floor vegetation.
    pub underground_vegetation: Vec<BiomeVoxelEntry>,
    /// Chance per cave ceiling voxel of hanging vegetation.
    pub ceiling_vegetation_density: f32,
    /// Cave ceiling vegetation.
    pub ceiling_vegetation: Vec<BiomeVoxelEntry>,
    /// Ores.
    pub ores: Vec<BiomeOre>,
}

/// A resolved ore.
#[derive(Clone, Debug)]
pub struct Ore {
    /// Ore voxel.
    pub voxel: VoxelTypeIndex,
    /// Per-chunk sample window.
    pub probability: (f32, f32),
    /// Depth window below the column surface.
    pub depth: (i32, i32),
    /// Vein size window.
    pub vein_size: (u32, u32),
    /// Veins per chunk window.
    pub veins_count: (u32, u32),
}

/// A weighted pick list, searched by cumulative probability.
#[derive(Clone, Debug, Default)]
pub struct WeightedList<T> {
    entries: Vec<(T, f32)>,
    total: f32,
}

impl<T: Clone> WeightedList<T> {
    fn new(entries: Vec<(T, f32)>) -> Self {
        let entries: Vec<_> = entries.into_iter().filter(|(_, p)| *p > 0.0).collect();
        let total = entries.iter().map(|(_, p)| p).sum();
        WeightedList { entries, total }
    }

    /// Returns `true` when there is nothing to pick.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Picks an entry for a random value in `[0, 1)`.
    ///
    /// The value is scaled by the total weight, so lists that do not sum to one
    /// still always yield an entry.
    pub fn pick(&self, value: f32) -> Option<T> {
        let target = value * self.total;
        let mut accumulated = 0.0;
        for (item, probability) in &self.entries {
            accumulated += probability;
            if target < accumulated {
                return Some(item.clone());
            }
        }
        self.entries.last().map(|(item, _)| item.clone())
    }
}

/// A biome with resolved voxels and expanded tables.
#[derive(Clone, Debug)]
pub struct Biome {
    /// Biome name.
    pub name: String,
    /// Zones in which the biome appears.
    pub zones: Vec<BiomeZone>,
    /// Main surface voxel.
    pub voxel_top: VoxelTypeIndex,
    /// Main underground voxel.
    pub voxel_dirt: VoxelTypeIndex,
    /// Surface voxel at the water line.
    pub voxel_shore: VoxelTypeIndex,
    /// Voxel under water.
    pub voxel_lake_bed: VoxelTypeIndex,
    top_table: [VoxelTypeIndex; TABLE_SLOTS],
    dirt_table: Vec<[VoxelTypeIndex; TABLE_SLOTS]>,
    /// Low vegetation chance.
    pub vegetation_density: f32,
    /// Low vegetation.
    pub vegetation: WeightedList<VoxelTypeIndex>,
    /// Tree chance.
    pub tree_density: f32,
    /// Tree models.
    pub trees: WeightedList<String>,
    /// Underwater vegetation chance.
    pub underwater_vegetation_density: f32,
    /// Underwater vegetation.
    pub underwater_vegetation: WeightedList<VoxelTypeIndex>,
    /// Cave floor vegetation chance.
    pub underground_vegetation_density: f32,
    /// Cave floor vegetation.
    pub underground_vegetation: WeightedList<VoxelTypeIndex>,
    /// Cave ceiling vegetation chance.
    pub ceiling_vegetation_density: f32,
    /// Cave ceiling vegetation.
    pub ceiling_vegetation: WeightedList<VoxelTypeIndex>,
    /// Ores.
    pub ores: Vec<Ore>,
}

/// Expands a probability list into a slot table.
///
/// Slots `[previous, (accumulated * 100) as usize)` take each entry in turn;
/// whatever is left keeps `main`.
pub fn distribute(main: VoxelTypeIndex, entries: &[(VoxelTypeIndex, f32)]) -> [VoxelTypeIndex; TABLE_SLOTS] {
    let mut table = [main; TABLE_SLOTS];
    let mut accumulated = 0.0f32;
    let mut position = 0usize;
    for (voxel, probability) in entries {
        accumulated = (accumulated + probability.max(0.0)).min(1.0);
        // Small bias so 0.35 + 0.25 lands on slot 60 despite f32 rounding.
        let end = ((accumulated * TABLE_SLOTS as f32 + 1e-3) as usize).min(TABLE_SLOTS);
        while position < end {
            table[position] = *voxel;
            position += 1;
        }
    }
    table
}

/// Slot of a random value in `[0, 1)`.
#[inline]
pub fn table_slot(value: f32) -> usize {
    ((value * TABLE_SLOTS as f32) as usize).min(TABLE_SLOTS - 1)
}

impl Biome {
    /// Resolves a biome definition against the voxel registry.
    ///
    /// Unknown voxel names fall back to the registry default with a warning.
    pub fn resolve(definition: &BiomeDefinition, registry: &VoxelRegistry) -> Self {
        let resolve_list = |entries: &[BiomeVoxelEntry]| -> Vec<(VoxelTypeIndex, f32)> {
            entries
                .iter()
                .map(|e| (registry.resolve_name(&e.voxel), e.probability))
                .collect()
        };

        let voxel_top = registry.resolve_name(&definition.voxel_top);
        let voxel_dirt = registry.resolve_name(&definition.voxel_dirt);
        let voxel_shore = registry.resolve_optional(definition.voxel_shore.as_deref(), voxel_top);
        let voxel_lake_bed =
            registry.resolve_optional(definition.voxel_lake_bed.as_deref(), voxel_dirt);

        let top_sum: f32 = definition.voxel_top_additional.iter().map(|e| e.probability).sum();
        if top_sum > 1.0 {
            warn!(
                "Biome '{}': additional top voxels sum to {:.2}, clamping",
                definition.name, top_sum
            );
        }
        let top_table = distribute(voxel_top, &resolve_list(&definition.voxel_top_additional));

        let underground: Vec<(VoxelTypeIndex, f32, i32, i32)> = definition
            .voxel_dirt_additional
            .iter()
            .map(|e| {
                (
                    registry.resolve_name(&e.voxel),
                    e.probability,
                    e.altitude_min,
                    e.altitude_max,
                )
            })
            .collect();
        let dirt_table = (0..UNDERGROUND_ALTITUDES)
            .map(|bin| {
                let altitude = UNDERGROUND_MIN_ALTITUDE + bin as i32;
                let entries: Vec<_> = underground
                    .iter()
                    .filter(|(_, _, min, max)| {
                        (*min == 0 || altitude >= *min) && (*max == 0 || altitude <= *max)
                    })
                    .map(|(voxel, probability, _, _)| (*voxel, *probability))
                    .collect();
                distribute(voxel_dirt, &entries)
            })
            .collect();

        let ores = definition
            .ores
            .iter()
            .map(|ore| Ore {
                voxel: registry.resolve_name(&ore.voxel),
                probability: (ore.probability_min, ore.probability_max),
                depth: (
                    ore.depth_min.min(ore.depth_max),
                    ore.depth_min.max(ore.depth_max),
                ),
                vein_size: (
                    ore.vein_min_size.min(ore.vein_max_size),
                    ore.vein_min_size.max(ore.vein_max_size),
                ),
                veins_count: (
                    ore.veins_count_min.min(ore.veins_count_max),
                    ore.veins_count_min.max(ore.veins_count_max),
                ),
            })
            .collect();

        Biome {
            name: definition.name.clone(),
            zones: definition.zones.clone(),
            voxel_top,
            voxel_dirt,
            voxel_shore,
            voxel_lake_bed,
            top_table,
            dirt_table,
            vegetation_density: definition.vegetation_density,
            vegetation: WeightedList::new(resolve_list(&definition.vegetation)),
            tree_density: definition.tree_density,
            trees: WeightedList::new(
                definition
                    .trees
                    .iter()
                    .map(|t| (t.tree.clone(), t.probability))
                    .collect(),
            ),
            underwater_vegetation_density: definition.underwater_vegetation_density,
            underwater_vegetation: WeightedList::new(resolve_list(&definition.underwater_vegetation)),
            underground_vegetation_density: definition.underground_vegetation_density,
            underground_vegetation: WeightedList::new(resolve_list(
                &definition.underground_vegetation,
            )),
            ceiling_vegetation_density: definition.ceiling_vegetation_density,
            ceiling_vegetation: WeightedList::new(resolve_list(&definition.ceiling_vegetation)),
            ores,
        }
    }

    /// Returns `true` when a column falls inside one of the biome's zones.
    pub fn matches(&self, altitude: f32, moisture: f32) -> bool {
        self.zones.iter().any(|zone| zone.contains(altitude, moisture))
    }

    /// Surface voxel for a random value in `[0, 1)`.
    #[inline]
    pub fn top_voxel(&self, value: f32) -> VoxelTypeIndex {
        self.top_table[table_slot(value)]
    }

    /// Underground voxel at an altitude for a random value in `[0, 1)`.
    #[inline]
    pub fn dirt_voxel(&self, altitude: i32, value: f32) -> VoxelTypeIndex {
        let bin = (altitude - UNDERGROUND_MIN_ALTITUDE).clamp(0, UNDERGROUND_ALTITUDES as i32 - 1);
        self.dirt_table[bin as usize][table_slot(value)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WorldRand;
    use crate::engine_state::voxels::voxel::voxel_definition::VoxelDefinition;
    use cgmath::Point3;

    fn registry() -> VoxelRegistry {
        VoxelRegistry::new(vec![
            VoxelDefinition::solid("Grass", [0, 200, 0, 255]),
            VoxelDefinition::solid("Dirt", [120, 80, 40, 255]),
            VoxelDefinition::solid("Stone", [128, 128, 128, 255]),
            VoxelDefinition::solid("Gravel", [100, 100, 100, 255]),
            VoxelDefinition::solid("Sand", [220, 200, 120, 255]),
        ])
    }

    fn definition() -> BiomeDefinition {
        BiomeDefinition {
            name: "Plains".into(),
            voxel_top: "Grass".into(),
            voxel_dirt: "Dirt".into(),
            voxel_top_additional: vec![
                BiomeVoxelEntry { voxel: "Sand".into(), probability: 0.35 },
                BiomeVoxelEntry { voxel: "Gravel".into(), probability: 0.25 },
            ],
            voxel_dirt_additional: vec![
                BiomeUndergroundEntry {
                    voxel: "Stone".into(),
                    probability: 1.0,
                    altitude_min: 0,
                    altitude_max: 20,
                },
                BiomeUndergroundEntry {
                    voxel: "Gravel".into(),
                    probability: 0.5,
                    altitude_min: 40,
                    altitude_max: 0,
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_distribute_fills_remainder_with_main() {
        let table = distribute(2, &[(3, 0.3), (4, 0.2)]);
        assert_eq!(table.iter().filter(|v| **v == 3).count(), 30);
        assert_eq!(table.iter().filter(|v| **v == 4).count(), 20);
        assert_eq!(table.iter().filter(|v| **v == 2).count(), 50);
    }

    #[test]
    fn test_distribute_clamps_accumulated_probability() {
        let table = distribute(2, &[(3, 0.8), (4, 0.8)]);
        assert_eq!(table.iter().filter(|v| **v == 3).count(), 80);
        assert_eq!(table.iter().filter(|v| **v == 4).count(), 20);
        assert!(!table.contains(&2));
    }

    #[test]
    fn test_main_voxel_share_matches_remainder() {
        let registry = registry();
        let biome = Biome::resolve(&definition(), &registry);
        let rand = WorldRand::new(99);
        let grass = registry.index_of("Grass").unwrap();

        let samples = 100_000;
        let mut main = 0;
        for i in 0..samples {
            let p = Point3::new(i % 317, i / 317, 11);
            if biome.top_voxel(rand.value_at(p)) == grass {
                main += 1;
            }
        }
        let share = main as f64 / samples as f64;
        assert!((share - 0.40).abs() < 0.01, "main voxel share {}", share);
    }

    #[test]
    fn test_underground_altitude_bands() {
        let registry = registry();
        let biome = Biome::resolve(&definition(), &registry);
        let stone = registry.index_of("Stone").unwrap();
        let dirt = registry.index_of("Dirt").unwrap();
        let gravel = registry.index_of("Gravel").unwrap();

        // Below 20 (including far below the table) everything is stone.
        assert_eq!(biome.dirt_voxel(-800, 0.99), stone);
        assert_eq!(biome.dirt_voxel(20, 0.5), stone);
        // Between the bands only the main voxel remains.
        assert_eq!(biome.dirt_voxel(30, 0.1), dirt);
        // From 40 up, half gravel.
        assert_eq!(biome.dirt_voxel(45, 0.1), gravel);
        assert_eq!(biome.dirt_voxel(2_000, 0.9), dirt);
    }

    #[test]
    fn test_optional_voxels_default_sensibly() {
        let registry = registry();
        let biome = Biome::resolve(&definition(), &registry);
        assert_eq!(biome.voxel_shore, biome.voxel_top);
        assert_eq!(biome.voxel_lake_bed, biome.voxel_dirt);
    }

    #[test]
    fn test_weighted_pick_scales_to_total() {
        let list = WeightedList::new(vec![(7u16, 0.1), (8u16, 0.1), (9u16, 0.0)]);
        assert_eq!(list.pick(0.0), Some(7));
        assert_eq!(list.pick(0.49), Some(7));
        assert_eq!(list.pick(0.51), Some(8));
        assert_eq!(list.pick(0.999), Some(8));
        assert_eq!(WeightedList::<u16>::new(vec![]).pick(0.5), None);
    }

    #[test]
    fn test_zone_matching() {
        let zone = BiomeZone {
            altitude_min: 10.0,
            altitude_max: 50.0,
            moisture_min: 0.2,
            moisture_max: 0.6,
        };
        assert!(zone.contains(10.0, 0.6));
        assert!(!zone.contains(9.9, 0.4));
        assert!(!zone.contains(20.0, 0.7));
    }
}
