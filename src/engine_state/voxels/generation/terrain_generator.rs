//! # Terrain Generator
//!
//! Paints chunk content column by column from the height map, the biome tables
//! and position-hashed random values. The output is a pure function of the chunk
//! coordinate, the world seed and the (immutable) generator tables, so the painter
//! can run on the generation worker and chunks can be regenerated at will.
//!
//! ## Column walk
//!
//! From the column surface (ground or water, whichever is higher) down to the
//! bedrock row or the chunk floor:
//! 1. water above the ground,
//! 2. at ground level the lake bed (under water), the shore voxel (at the water
//!    line) or a surface table pick, plus a chance of a tree or low vegetation,
//! 3. underground voxels picked by altitude and position,
//! 4. the bedrock voxel on the bedrock row.
//!
//! Cave holes carved before the walk stay empty and attract floor and ceiling
//! vegetation requests. An ore pass runs once the columns are done.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cgmath::Point3;
use log::{trace, warn};
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

use crate::core::WorldRand;
use crate::engine_state::voxels::chunk::{local_index_of, Chunk, CHUNK_DIMENSION};
use crate::engine_state::voxels::voxel::voxel_definition::VoxelRegistry;
use crate::engine_state::voxels::voxel::{Voxel, VoxelTypeIndex};

use super::biome::{Biome, BiomeDefinition, BiomeId};
use super::height_map::{FlatHeightMap, HeightMapInfo, HeightMapSettings, HeightMapSource, NoiseHeightMap};
use super::ore;
use super::PlacementSink;

const VEGETATION_SALT: u64 = 0x7665_6765;
const PICK_SALT: u64 = 0x7069_636b;
const CAVE_SALT: u64 = 0x6361_7665;

/// Cave carving parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CaveSettings {
    /// Whether caves are carved.
    pub enabled: bool,
    /// 3D noise frequency.
    pub frequency: f64,
    /// Noise value above which a voxel is carved.
    pub threshold: f64,
    /// Caves stay at least this many voxels below the ground level.
    pub min_depth: i32,
}

impl Default for CaveSettings {
    fn default() -> Self {
        CaveSettings {
            enabled: false,
            frequency: 0.05,
            threshold: 0.45,
            min_depth: 4,
        }
    }
}

/// Generator settings of the world definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainGeneratorSettings {
    /// Noise height map parameters.
    pub height_map: HeightMapSettings,
    /// Replace the noise height map by flat ground at this level.
    pub flat_ground_level: Option<f32>,
    /// World Y of the water surface, `None` for a dry world.
    pub water_level: Option<i32>,
    /// Water voxel name.
    pub water_voxel: String,
    /// World Y of the bedrock row. Nothing is generated below it.
    pub bedrock_level: i32,
    /// Bedrock voxel name.
    pub bedrock_voxel: String,
    /// Cave carving.
    pub caves: CaveSettings,
}

impl Default for TerrainGeneratorSettings {
    fn default() -> Self {
        TerrainGeneratorSettings {
            height_map: HeightMapSettings::default(),
            flat_ground_level: None,
            water_level: Some(24),
            water_voxel: "Water".to_string(),
            bedrock_level: 0,
            bedrock_voxel: "Bedrock".to_string(),
            caves: CaveSettings::default(),
        }
    }
}

/// Scratch state of a single paint call.
///
/// Holds the column samples of the chunk and the set of biomes that appeared in
/// it, which drives the ore pass.
pub struct PaintContext {
    columns: Vec<HeightMapInfo>,
    touched: Vec<BiomeId>,
    touched_mask: Vec<bool>,
}

impl PaintContext {
    fn new(biome_count: usize) -> Self {
        let n = CHUNK_DIMENSION as usize;
        PaintContext {
            columns: Vec::with_capacity(n * n),
            touched: Vec::new(),
            touched_mask: vec![false; biome_count],
        }
    }

    /// A context whose columns all share one sample.
    #[cfg(test)]
    pub(crate) fn uniform(column: HeightMapInfo, biome_count: usize) -> Self {
        let n = CHUNK_DIMENSION as usize;
        let mut context = PaintContext::new(biome_count);
        context.columns = vec![column; n * n];
        if let Some(biome) = column.biome {
            context.touch(biome);
        }
        context
    }

    /// Sample of the column at local `x`, `z`.
    #[inline]
    pub fn column(&self, x: i32, z: i32) -> &HeightMapInfo {
        &self.columns[(z * CHUNK_DIMENSION + x) as usize]
    }

    fn touch(&mut self, biome: BiomeId) {
        if !self.touched_mask[biome] {
            self.touched_mask[biome] = true;
            self.touched.push(biome);
        }
    }

    /// Biomes that painted at least one column, in first-seen order.
    pub fn touched_biomes(&self) -> &[BiomeId] {
        &self.touched
    }
}

struct CaveCarver {
    noise: Fbm<Perlin>,
    threshold: f64,
    min_depth: i32,
}

/// Deterministic chunk painter.
pub struct TerrainGenerator {
    registry: Arc<VoxelRegistry>,
    biomes: Vec<Biome>,
    default_biome: Option<BiomeId>,
    height_map: Box<dyn HeightMapSource>,
    world_rand: WorldRand,
    vegetation_rand: WorldRand,
    pick_rand: WorldRand,
    water_level: Option<i32>,
    water_voxel: VoxelTypeIndex,
    bedrock_level: i32,
    bedrock_voxel: VoxelTypeIndex,
    caves: Option<CaveCarver>,
}

impl TerrainGenerator {
    /// Builds a generator from the world definition parts.
    ///
    /// # Arguments
    /// * `registry` - Voxel registry shared with the world
    /// * `biome_definitions` - Biomes in selection order
    /// * `default_biome` - Name of the fallback biome, the first biome if `None`
    /// * `settings` - Generator settings
    /// * `world_rand` - World random source
    pub fn new(
        registry: Arc<VoxelRegistry>,
        biome_definitions: &[BiomeDefinition],
        default_biome: Option<&str>,
        settings: &TerrainGeneratorSettings,
        world_rand: WorldRand,
    ) -> Self {
        let biomes: Vec<Biome> = biome_definitions
            .iter()
            .map(|definition| Biome::resolve(definition, &registry))
            .collect();

        let default_biome = match default_biome {
            Some(name) => {
                let found = biomes.iter().position(|b| b.name == name);
                if found.is_none() {
                    warn!("Default biome '{}' is not defined", name);
                }
                found.or(if biomes.is_empty() { None } else { Some(0) })
            }
            None if biomes.is_empty() => None,
            None => Some(0),
        };
        if biomes.is_empty() {
            warn!("World defines no biomes, terrain will be empty");
        }

        let height_map: Box<dyn HeightMapSource> = match settings.flat_ground_level {
            Some(level) => Box::new(FlatHeightMap::new(level, default_biome)),
            None => Box::new(NoiseHeightMap::new(
                world_rand,
                settings.height_map.clone(),
                &biomes,
                default_biome,
            )),
        };

        let caves = settings.caves.enabled.then(|| CaveCarver {
            noise: Fbm::<Perlin>::new(world_rand.derive(CAVE_SALT).seed() as u32)
                .set_octaves(2)
                .set_frequency(settings.caves.frequency),
            threshold: settings.caves.threshold,
            min_depth: settings.caves.min_depth.max(1),
        });

        let mut generator = TerrainGenerator {
            water_voxel: registry.resolve_name(&settings.water_voxel),
            bedrock_voxel: registry.resolve_name(&settings.bedrock_voxel),
            registry,
            biomes,
            default_biome,
            height_map,
            world_rand,
            vegetation_rand: world_rand.derive(VEGETATION_SALT),
            pick_rand: world_rand.derive(PICK_SALT),
            water_level: settings.water_level,
            bedrock_level: settings.bedrock_level,
            caves,
        };
        generator.keep_bedrock_below_ground();
        generator
    }

    /// Replaces the height map source.
    pub fn with_height_map(mut self, height_map: Box<dyn HeightMapSource>) -> Self {
        self.height_map = height_map;
        self.keep_bedrock_below_ground();
        self
    }

    /// Lowers the bedrock row under the lowest ground level of the height map.
    fn keep_bedrock_below_ground(&mut self) {
        let lowest_ground = self.height_map.min_height().floor() as i32;
        if self.bedrock_level >= lowest_ground {
            warn!(
                "Bedrock level {} reaches the lowest ground level {}, lowering it to {}",
                self.bedrock_level,
                lowest_ground,
                lowest_ground - 1
            );
            self.bedrock_level = lowest_ground - 1;
        }
    }

    /// World Y of the bedrock row.
    pub fn bedrock_level(&self) -> i32 {
        self.bedrock_level
    }

    /// The voxel registry the generator paints with.
    pub fn registry(&self) -> &Arc<VoxelRegistry> {
        &self.registry
    }

    /// Resolved biomes.
    pub fn biomes(&self) -> &[Biome] {
        &self.biomes
    }

    /// World random source.
    pub fn world_rand(&self) -> WorldRand {
        self.world_rand
    }

    /// Highest world Y that can hold generated content.
    pub fn max_surface(&self) -> f32 {
        let water = self.water_level.map(|w| w as f32).unwrap_or(f32::MIN);
        self.height_map.max_height().max(water)
    }

    fn biome_for(&self, sampled: Option<BiomeId>) -> Option<BiomeId> {
        sampled
            .filter(|id| *id < self.biomes.len())
            .or(self.default_biome)
    }

    /// Paints a chunk.
    ///
    /// # Arguments
    /// * `chunk` - The chunk to fill, expected empty
    /// * `sink` - Receiver of vegetation and tree requests
    ///
    /// # Returns
    /// `true` if any voxel was painted.
    pub fn paint_chunk(&self, chunk: &mut Chunk, sink: &mut dyn PlacementSink) -> bool {
        self.paint(chunk, sink, None).unwrap_or(false)
    }

    /// Paints a chunk, giving up as soon as `abort` is raised.
    ///
    /// # Returns
    /// `None` if aborted, otherwise whether any voxel was painted.
    pub fn paint_chunk_until(
        &self,
        chunk: &mut Chunk,
        sink: &mut dyn PlacementSink,
        abort: &AtomicBool,
    ) -> Option<bool> {
        self.paint(chunk, sink, Some(abort))
    }

    fn paint(
        &self,
        chunk: &mut Chunk,
        sink: &mut dyn PlacementSink,
        abort: Option<&AtomicBool>,
    ) -> Option<bool> {
        let aborted = || abort.map(|a| a.load(Ordering::Relaxed)).unwrap_or(false);
        let n = CHUNK_DIMENSION;
        let anchor = chunk.anchor();
        let bottom = anchor.y;
        let top = bottom + n - 1;

        if bottom as f32 > self.max_surface() {
            chunk.is_above_surface = true;
            return Some(false);
        }
        if top < self.bedrock_level {
            chunk.is_above_surface = false;
            return Some(false);
        }

        let mut context = PaintContext::new(self.biomes.len());
        for z in 0..n {
            for x in 0..n {
                context
                    .columns
                    .push(self.height_map.column(anchor.x + x, anchor.z + z));
            }
        }

        if let Some(caves) = &self.caves {
            self.carve_caves(chunk, &context, caves);
        }

        let mut has_content = false;
        for z in 0..n {
            if aborted() {
                return None;
            }
            for x in 0..n {
                has_content |= self.paint_column(chunk, sink, &mut context, x, z);
            }
        }

        if has_content {
            let converted = ore::spawn_ores(
                chunk,
                &context,
                &self.biomes,
                &self.registry,
                self.world_rand,
                abort,
            )?;
            if converted > 0 {
                trace!("Chunk {:?}: {} ore voxels", chunk.coord, converted);
            }
        }

        Some(has_content)
    }

    fn carve_caves(&self, chunk: &mut Chunk, context: &PaintContext, caves: &CaveCarver) {
        let n = CHUNK_DIMENSION;
        let anchor = chunk.anchor();
        for z in 0..n {
            for x in 0..n {
                let ground = context.column(x, z).ground_level as i32;
                for y in 0..n {
                    let world_y = anchor.y + y;
                    if world_y > ground - caves.min_depth || world_y <= self.bedrock_level {
                        continue;
                    }
                    let sample = caves.noise.get([
                        (anchor.x + x) as f64,
                        world_y as f64,
                        (anchor.z + z) as f64,
                    ]);
                    if sample > caves.threshold {
                        chunk.voxels[local_index_of(x, y, z)] = Voxel::HOLE;
                    }
                }
            }
        }
    }

    /// Paints one column. Returns `true` if anything was painted.
    fn paint_column(
        &self,
        chunk: &mut Chunk,
        sink: &mut dyn PlacementSink,
        context: &mut PaintContext,
        x: i32,
        z: i32,
    ) -> bool {
        let n = CHUNK_DIMENSION;
        let anchor = chunk.anchor();
        let bottom = anchor.y;
        let top = bottom + n - 1;
        let info = *context.column(x, z);

        let ground = info.ground_level as i32;
        let water_top = match self.water_level {
            Some(level) if level > ground => level,
            _ => ground,
        };
        let underwater = water_top > ground;

        if water_top < bottom {
            chunk.is_above_surface = true;
            return false;
        }
        // The surface lies in this chunk: sunlight reaches it through open air.
        if (bottom..=top).contains(&ground) || (bottom..=top).contains(&water_top) {
            chunk.is_above_surface = true;
        }

        let Some(biome_id) = self.biome_for(info.biome) else {
            return false;
        };
        context.touch(biome_id);
        let biome = &self.biomes[biome_id];

        let world_x = anchor.x + x;
        let world_z = anchor.z + z;
        let lowest = bottom.max(self.bedrock_level);
        let mut painted = false;
        let mut carved = Vec::new();

        for y in (lowest..=water_top.min(top)).rev() {
            let index = local_index_of(x, y - bottom, z);
            let position = Point3::new(world_x, y, world_z);
            let is_hole = chunk.voxels[index].is_hole();

            let voxel = if y > ground {
                self.water_voxel
            } else if is_hole {
                if underwater {
                    self.water_voxel
                } else {
                    chunk.voxels[index] = Voxel::EMPTY;
                    carved.push(y);
                    continue;
                }
            } else if y == ground {
                if underwater {
                    self.underwater_vegetation(chunk, sink, biome, position, top);
                    biome.voxel_lake_bed
                } else if Some(ground) == self.water_level {
                    biome.voxel_shore
                } else {
                    self.surface_vegetation(chunk, sink, biome, position, top);
                    biome.top_voxel(self.world_rand.value_at(position))
                }
            } else if y == self.bedrock_level {
                self.bedrock_voxel
            } else {
                biome.dirt_voxel(y, self.world_rand.value_at(position))
            };

            chunk.voxels[index] = self.registry.make_voxel(voxel);
            painted = true;
        }

        for y in carved {
            self.cave_vegetation(chunk, sink, biome, Point3::new(world_x, y, world_z));
        }

        painted
    }

    fn surface_vegetation(
        &self,
        chunk: &mut Chunk,
        sink: &mut dyn PlacementSink,
        biome: &Biome,
        ground: Point3<i32>,
        chunk_top: i32,
    ) {
        let chance = self.vegetation_rand.value_at(ground);
        let pick = self.pick_rand.value_at(ground);
        let above = Point3::new(ground.x, ground.y + 1, ground.z);

        if chance < biome.tree_density {
            if let Some(tree) = biome.trees.pick(pick) {
                sink.request_tree(chunk.anchor(), above, &tree);
            }
        } else if chance < biome.tree_density + biome.vegetation_density {
            if let Some(voxel) = biome.vegetation.pick(pick) {
                self.place_or_request(chunk, sink, above, voxel, chunk_top);
            }
        }
    }

    fn underwater_vegetation(
        &self,
        chunk: &mut Chunk,
        sink: &mut dyn PlacementSink,
        biome: &Biome,
        bed: Point3<i32>,
        chunk_top: i32,
    ) {
        if biome.underwater_vegetation.is_empty() {
            return;
        }
        if self.vegetation_rand.value_at(bed) < biome.underwater_vegetation_density {
            if let Some(voxel) = biome.underwater_vegetation.pick(self.pick_rand.value_at(bed)) {
                let above = Point3::new(bed.x, bed.y + 1, bed.z);
                self.place_or_request(chunk, sink, above, voxel, chunk_top);
            }
        }
    }

    fn cave_vegetation(
        &self,
        chunk: &Chunk,
        sink: &mut dyn PlacementSink,
        biome: &Biome,
        cell: Point3<i32>,
    ) {
        let local_y = cell.y - chunk.anchor().y;
        let x = cell.x - chunk.anchor().x;
        let z = cell.z - chunk.anchor().z;
        let opaque_at = |y: i32| {
            (0..CHUNK_DIMENSION).contains(&y) && chunk.voxels[local_index_of(x, y, z)].is_opaque()
        };
        let chance = self.vegetation_rand.value_at(cell);
        let pick = self.pick_rand.value_at(cell);

        if opaque_at(local_y - 1) && chance < biome.underground_vegetation_density {
            if let Some(voxel) = biome.underground_vegetation.pick(pick) {
                sink.request_vegetation(cell, voxel);
            }
        } else if opaque_at(local_y + 1) && chance < biome.ceiling_vegetation_density {
            if let Some(voxel) = biome.ceiling_vegetation.pick(pick) {
                sink.request_vegetation(cell, voxel);
            }
        }
    }

    fn place_or_request(
        &self,
        chunk: &mut Chunk,
        sink: &mut dyn PlacementSink,
        position: Point3<i32>,
        voxel: VoxelTypeIndex,
        chunk_top: i32,
    ) {
        if position.y <= chunk_top {
            let anchor = chunk.anchor();
            let index = local_index_of(position.x - anchor.x, position.y - anchor.y, position.z - anchor.z);
            chunk.voxels[index] = self.registry.make_voxel(voxel);
        } else {
            sink.request_vegetation(position, voxel);
        }
    }
}
