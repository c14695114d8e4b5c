//! # Ore Veins
//!
//! Random walks through a freshly painted chunk that turn solid voxels into ore.
//! Every decision is keyed on world positions, so a chunk always grows the same
//! veins regardless of when or where it is painted.

use std::sync::atomic::{AtomicBool, Ordering};

use bitvec::prelude::BitVec;
use cgmath::{Point3, Vector3};

use crate::core::WorldRand;
use crate::engine_state::voxels::chunk::{local_index_of, Chunk, CHUNK_DIMENSION, CHUNK_SIZE};
use crate::engine_state::voxels::voxel::voxel_definition::VoxelRegistry;
use crate::engine_state::voxels::voxel::FULL_OPACITY;

use super::biome::{Biome, Ore};
use super::terrain_generator::PaintContext;

const VEIN_SALT: u64 = 0x7665_696e;

/// Walk directions: down, then the four horizontal directions.
const DIRECTIONS: [Vector3<i32>; 5] = [
    Vector3::new(0, -1, 0),
    Vector3::new(1, 0, 0),
    Vector3::new(0, 0, -1),
    Vector3::new(-1, 0, 0),
    Vector3::new(0, 0, 1),
];

/// Spawns ore veins for every biome that painted a column of the chunk.
///
/// Each biome contributes at most one ore kind per chunk: the first of its ores
/// whose probability window holds the chunk's sample.
///
/// # Arguments
/// * `chunk` - The painted chunk
/// * `context` - Column samples of the paint pass
/// * `biomes` - Resolved biomes
/// * `registry` - Voxel registry, for the ore voxels
/// * `world_rand` - World random source
/// * `abort` - Checked between veins
///
/// # Returns
/// The number of voxels turned into ore, or `None` if aborted.
pub fn spawn_ores(
    chunk: &mut Chunk,
    context: &PaintContext,
    biomes: &[Biome],
    registry: &VoxelRegistry,
    world_rand: WorldRand,
    abort: Option<&AtomicBool>,
) -> Option<usize> {
    let vein_rand = world_rand.derive(VEIN_SALT);
    let anchor = chunk.anchor();
    let chunk_sample = vein_rand.value_at(chunk.coord);
    let mut rng = vein_rand.rng_at(anchor);
    let mut visited = BitVec::repeat(false, CHUNK_SIZE as usize);
    let mut converted = 0;

    for biome in context.touched_biomes() {
        let Some((ore_index, ore)) = biomes[*biome]
            .ores
            .iter()
            .enumerate()
            .find(|(_, ore)| (ore.probability.0..=ore.probability.1).contains(&chunk_sample))
        else {
            continue;
        };
        let salt = (*biome * 8 + ore_index) as i32;

        let veins = rng.u32(ore.veins_count.0..=ore.veins_count.1);
        for vein in 0..veins {
            if abort.map(|a| a.load(Ordering::Relaxed)).unwrap_or(false) {
                return None;
            }
            let steps = rng.u32(ore.vein_size.0..=ore.vein_size.1);
            let start = vein_rand.vector_at(
                Point3::new(anchor.x + vein as i32, anchor.y, anchor.z + salt),
                CHUNK_DIMENSION as u32,
            );
            let start = Point3::new(start.x as i32, start.y as i32, start.z as i32);
            visited.fill(false);
            converted += walk_vein(chunk, context, registry, vein_rand, ore, start, steps, &mut visited);
        }
    }

    Some(converted)
}

/// Walks one vein from a local start position.
#[allow(clippy::too_many_arguments)]
fn walk_vein(
    chunk: &mut Chunk,
    context: &PaintContext,
    registry: &VoxelRegistry,
    vein_rand: WorldRand,
    ore: &Ore,
    start: Point3<i32>,
    steps: u32,
    visited: &mut BitVec,
) -> usize {
    let anchor = chunk.anchor();
    let inside = |p: Point3<i32>| {
        let range = 0..CHUNK_DIMENSION;
        range.contains(&p.x) && range.contains(&p.y) && range.contains(&p.z)
    };
    let ore_voxel = registry.make_voxel(ore.voxel);

    let mut position = start;
    let mut converted = 0;
    for _ in 0..steps {
        let ground = context.column(position.x, position.z).ground_level as i32;
        let depth = ground - (anchor.y + position.y);
        if depth < ore.depth.0 || depth > ore.depth.1 {
            break;
        }

        let index = local_index_of(position.x, position.y, position.z);
        visited.set(index, true);
        let voxel = &mut chunk.voxels[index];
        if voxel.has_content() && voxel.opacity >= FULL_OPACITY && voxel.type_index != ore.voxel {
            *voxel = ore_voxel;
            converted += 1;
        }

        let world = Point3::new(anchor.x + position.x, anchor.y + position.y, anchor.z + position.z);
        let preferred = ((vein_rand.value_at(world) * DIRECTIONS.len() as f32) as usize)
            .min(DIRECTIONS.len() - 1);
        // Preferred direction first, then the others in turn.
        let next = (0..DIRECTIONS.len())
            .map(|i| position + DIRECTIONS[(preferred + i) % DIRECTIONS.len()])
            .find(|p| inside(*p) && !visited[local_index_of(p.x, p.y, p.z)]);
        match next {
            Some(next) => position = next,
            None => break,
        }
    }
    converted
}
