//! # Lighting Module
//!
//! Incremental flood-fill of sun and torch light across chunk borders.
//!
//! ## Model
//!
//! Every voxel stores a combined `light` value and the torch part of it
//! (`torch_light`). The propagator keeps a flat FIFO of voxels whose light must
//! spread. Spreading a voxel pushes `light - decrement - neighbour.opacity` into
//! each face neighbour that is darker, then enqueues that neighbour.
//!
//! * Downward sun light inside an above-surface chunk loses nothing, so open sky
//!   columns stay at full light. Every other direction loses the sun attenuation.
//! * Torch light always loses the torch attenuation and never takes the open-sky
//!   shortcut.
//!
//! ## Darkening
//!
//! Light only ever increases during a pass. Removing a voxel uses a reverse cast:
//! the cell is seeded at maximum light, its content cleared, and then lowered to
//! what its remaining neighbours can supply before it is spread. Placing an opaque
//! voxel zeroes its own light but leaves brighter neighbours untouched until a
//! chunk rebuild.
//!
//! Non-emitting placements never enter the queue at all. A translucent voxel
//! placed by an edit or by the vegetation pass keeps the light of the cell it
//! fills, lowered by its own opacity, and the cells behind it keep theirs until
//! the next rebuild of the chunk's lightmap.

use log::trace;

use super::chunk::{local_index_of, ChunkHandle, CHUNK_DIMENSION};
use super::chunk_pool::ChunkPool;
use super::voxel::voxel_side::VoxelSide;
use super::voxel::MAX_LIGHT;

/// Queue entry: a voxel whose light must spread.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LightmapAddNode {
    /// Chunk of the voxel.
    pub chunk: ChunkHandle,
    /// Local index of the voxel.
    pub voxel_index: usize,
}

/// The four horizontal faces plus the top, spread after the bottom face.
const LATERAL_AND_UP: [VoxelSide; 5] = [
    VoxelSide::LEFT,
    VoxelSide::RIGHT,
    VoxelSide::BACK,
    VoxelSide::FORWARD,
    VoxelSide::TOP,
];

/// Work queue driven light propagation.
pub struct LightPropagator {
    queue: Vec<LightmapAddNode>,
    sun_attenuation: u8,
    torch_attenuation: u8,
}

impl LightPropagator {
    /// Creates a propagator.
    ///
    /// # Arguments
    /// * `sun_attenuation` - Light lost per step by sun light (at least 1)
    /// * `torch_attenuation` - Light lost per step by torch light (at least 1)
    pub fn new(sun_attenuation: u8, torch_attenuation: u8) -> Self {
        LightPropagator {
            queue: Vec::new(),
            sun_attenuation: sun_attenuation.clamp(1, MAX_LIGHT),
            torch_attenuation: torch_attenuation.clamp(1, MAX_LIGHT),
        }
    }

    /// Sun attenuation per step.
    pub fn sun_attenuation(&self) -> u8 {
        self.sun_attenuation
    }

    /// Torch attenuation per step.
    pub fn torch_attenuation(&self) -> u8 {
        self.torch_attenuation
    }

    /// Number of voxels waiting to spread.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Queues a voxel for spreading.
    pub fn enqueue(&mut self, chunk: ChunkHandle, voxel_index: usize) {
        self.queue.push(LightmapAddNode { chunk, voxel_index });
    }

    /// Drains the queue.
    ///
    /// The queue is walked by index, so nodes appended while spreading are
    /// processed in the same pass. It is cleared once the walk reaches its end.
    ///
    /// # Returns
    /// The number of nodes processed.
    pub fn run(&mut self, pool: &mut ChunkPool) -> usize {
        let mut cursor = 0;
        while cursor < self.queue.len() {
            let node = self.queue[cursor];
            cursor += 1;
            if pool.is_resident(node.chunk) {
                self.spread_step(pool, node);
            }
        }
        self.queue.clear();
        if cursor > 0 {
            trace!("Light pass processed {} nodes", cursor);
        }
        cursor
    }

    /// Spreads the light of a single voxel into its six neighbours.
    pub fn spread_step(&mut self, pool: &mut ChunkPool, node: LightmapAddNode) {
        let chunk = pool.chunk(node.chunk);
        let voxel = chunk.voxels[node.voxel_index];
        let light = voxel.light;
        let torch = voxel.torch_light;
        if light == 0 && torch == 0 {
            return;
        }

        let down_decrement = if chunk.is_above_surface {
            0
        } else {
            self.sun_attenuation
        };
        self.spread_to(pool, node, VoxelSide::BOTTOM, light, torch, down_decrement);

        if light <= self.sun_attenuation && torch <= self.torch_attenuation {
            return;
        }

        for side in LATERAL_AND_UP {
            self.spread_to(pool, node, side, light, torch, self.sun_attenuation);
        }
    }

    fn spread_to(
        &mut self,
        pool: &mut ChunkPool,
        node: LightmapAddNode,
        side: VoxelSide,
        light: u8,
        torch: u8,
        sun_decrement: u8,
    ) {
        let Some((handle, index)) = pool.voxel_across(node.chunk, node.voxel_index, side) else {
            return;
        };

        let neighbour = &mut pool.chunk_mut(handle).voxels[index];
        let opacity = neighbour.opacity;
        let mut changed = false;

        let sun_candidate = light.saturating_sub(sun_decrement).saturating_sub(opacity);
        if sun_candidate > neighbour.light {
            neighbour.light = sun_candidate;
            changed = true;
        }

        let torch_candidate = torch
            .saturating_sub(self.torch_attenuation)
            .saturating_sub(opacity);
        if torch_candidate > neighbour.torch_light {
            neighbour.torch_light = torch_candidate;
            if neighbour.light < torch_candidate {
                neighbour.light = torch_candidate;
            }
            changed = true;
        }

        if changed {
            pool.request_refresh(handle);
            pool.request_border_refresh(handle, index);
            self.enqueue(handle, index);
        }
    }

    /// Lowers a voxel to the light its face neighbours can supply.
    ///
    /// Light coming from above keeps full strength when the neighbour above lies in
    /// an above-surface chunk. The top layer of an above-surface chunk with no
    /// resident chunk above it is open sky.
    pub fn pull_from_neighbours(&self, pool: &mut ChunkPool, handle: ChunkHandle, index: usize) {
        let opacity = pool.chunk(handle).voxels[index].opacity;
        let mut light = 0u8;
        let mut torch = 0u8;

        for side in VoxelSide::all() {
            match pool.voxel_across(handle, index, side) {
                Some((neighbour_handle, neighbour_index)) => {
                    let neighbour_chunk = pool.chunk(neighbour_handle);
                    let neighbour = neighbour_chunk.voxels[neighbour_index];
                    let decrement = if side == VoxelSide::TOP && neighbour_chunk.is_above_surface {
                        0
                    } else {
                        self.sun_attenuation
                    };
                    light = light.max(neighbour.light.saturating_sub(decrement));
                    torch = torch.max(neighbour.torch_light.saturating_sub(self.torch_attenuation));
                }
                None if side == VoxelSide::TOP => {
                    let chunk = pool.chunk(handle);
                    if chunk.is_above_surface && chunk.neighbour(VoxelSide::TOP).is_none() {
                        light = MAX_LIGHT;
                    }
                }
                None => {}
            }
        }

        let voxel = &mut pool.chunk_mut(handle).voxels[index];
        voxel.torch_light = torch.saturating_sub(opacity);
        voxel.light = light.saturating_sub(opacity).max(voxel.torch_light);
    }

    /// Reverse cast for a removed voxel.
    ///
    /// The cell is seeded at maximum light, its content cleared, lowered to what
    /// its neighbours supply, then spread and drained.
    pub fn reverse_cast(&mut self, pool: &mut ChunkPool, handle: ChunkHandle, index: usize) {
        {
            let voxel = &mut pool.chunk_mut(handle).voxels[index];
            voxel.light = MAX_LIGHT;
            voxel.torch_light = MAX_LIGHT;
            voxel.clear_content();
        }
        self.pull_from_neighbours(pool, handle, index);
        pool.request_refresh(handle);
        pool.request_border_refresh(handle, index);
        self.enqueue(handle, index);
        self.run(pool);
    }

    /// Seeds a torch emitter and drains the queue.
    pub fn seed_torch(&mut self, pool: &mut ChunkPool, handle: ChunkHandle, index: usize, intensity: u8) {
        let voxel = &mut pool.chunk_mut(handle).voxels[index];
        voxel.torch_light = voxel.torch_light.max(intensity.min(MAX_LIGHT));
        voxel.light = voxel.light.max(voxel.torch_light);
        self.enqueue(handle, index);
        self.run(pool);
    }

    /// Recomputes the light of a whole chunk after it became resident.
    ///
    /// Stored light is discarded. Open sky is seeded on the top layer when the chunk
    /// is above surface and has no resident chunk above it. Border voxels of the
    /// resident neighbours are queued so their light flows in, and the chunk's
    /// light sources are re-seeded.
    pub fn rebuild_chunk_lightmap(&mut self, pool: &mut ChunkPool, handle: ChunkHandle) {
        let n = CHUNK_DIMENSION;
        {
            let chunk = pool.chunk_mut(handle);
            for voxel in chunk.voxels.iter_mut() {
                voxel.light = 0;
                voxel.torch_light = 0;
            }

            if chunk.is_above_surface && chunk.neighbour(VoxelSide::TOP).is_none() {
                for z in 0..n {
                    for x in 0..n {
                        let index = local_index_of(x, n - 1, z);
                        let voxel = &mut chunk.voxels[index];
                        voxel.light = MAX_LIGHT.saturating_sub(voxel.opacity);
                        if voxel.light > 0 {
                            self.queue.push(LightmapAddNode {
                                chunk: handle,
                                voxel_index: index,
                            });
                        }
                    }
                }
            }

            for source in chunk.light_sources.clone() {
                let voxel = &mut chunk.voxels[source.voxel_index];
                voxel.torch_light = source.intensity;
                voxel.light = voxel.light.max(source.intensity);
                self.queue.push(LightmapAddNode {
                    chunk: handle,
                    voxel_index: source.voxel_index,
                });
            }
        }

        let neighbours = pool.chunk(handle).neighbours;
        for side in VoxelSide::all() {
            let Some(neighbour) = neighbours[side as usize] else {
                continue;
            };
            // Face of the neighbour that touches this chunk.
            for a in 0..n {
                for b in 0..n {
                    let index = match side {
                        VoxelSide::LEFT => local_index_of(n - 1, a, b),
                        VoxelSide::RIGHT => local_index_of(0, a, b),
                        VoxelSide::BOTTOM => local_index_of(a, n - 1, b),
                        VoxelSide::TOP => local_index_of(a, 0, b),
                        VoxelSide::BACK => local_index_of(a, b, n - 1),
                        VoxelSide::FORWARD => local_index_of(a, b, 0),
                    };
                    let voxel = pool.chunk(neighbour).voxels[index];
                    if voxel.light > 0 || voxel.torch_light > 0 {
                        self.enqueue(neighbour, index);
                    }
                }
            }
        }

        pool.request_refresh(handle);
        self.run(pool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::chunk::{ChunkCoord, CHUNK_SIZE};
    use crate::engine_state::voxels::voxel::Voxel;
    use cgmath::Point3;

    fn stone() -> Voxel {
        Voxel::new(2, 15, [128, 128, 128, 255])
    }

    /// Air chunk at (0,1,0) above an opaque chunk at (0,0,0) with a two voxel shaft.
    fn flat_ground(sun_attenuation: u8) -> (ChunkPool, LightPropagator, ChunkHandle, ChunkHandle) {
        let mut pool = ChunkPool::new(8);
        let mut lighting = LightPropagator::new(sun_attenuation, 1);

        let (ground, _) = pool.acquire(Point3::new(0, 0, 0)).unwrap();
        pool.chunk_mut(ground).voxels.fill(stone());
        pool.chunk_mut(ground).voxels[local_index_of(4, 15, 4)] = Voxel::EMPTY;
        pool.chunk_mut(ground).voxels[local_index_of(4, 14, 4)] = Voxel::EMPTY;
        lighting.rebuild_chunk_lightmap(&mut pool, ground);

        let (sky, _) = pool.acquire(Point3::new(0, 1, 0)).unwrap();
        pool.chunk_mut(sky).is_above_surface = true;
        lighting.rebuild_chunk_lightmap(&mut pool, sky);

        (pool, lighting, ground, sky)
    }

    #[test]
    fn test_open_sky_converges_to_full_light() {
        let (pool, _, _, sky) = flat_ground(3);
        assert!(pool.chunk(sky).voxels.iter().all(|v| v.light == MAX_LIGHT));
    }

    #[test]
    fn test_shaft_attenuates_below_surface() {
        let (pool, _, ground, _) = flat_ground(3);
        let voxels = &pool.chunk(ground).voxels;
        assert_eq!(voxels[local_index_of(4, 15, 4)].light, 15);
        assert_eq!(voxels[local_index_of(4, 14, 4)].light, 12);
        assert_eq!(voxels[local_index_of(4, 13, 4)].light, 0);
        assert_eq!(voxels[local_index_of(5, 15, 4)].light, 0);
    }

    #[test]
    fn test_light_is_stable_after_draining() {
        let (mut pool, mut lighting, ground, sky) = flat_ground(2);
        let before: Vec<_> = [ground, sky]
            .iter()
            .flat_map(|h| pool.chunk(*h).voxels.iter().map(|v| v.light))
            .collect();

        for handle in [ground, sky] {
            for index in 0..CHUNK_SIZE as usize {
                lighting.enqueue(handle, index);
            }
        }
        lighting.run(&mut pool);

        let after: Vec<_> = [ground, sky]
            .iter()
            .flat_map(|h| pool.chunk(*h).voxels.iter().map(|v| v.light))
            .collect();
        assert_eq!(before, after);
        assert_eq!(lighting.pending(), 0);
    }

    #[test]
    fn test_light_never_decreases_across_a_step() {
        let (pool, lighting, ground, sky) = flat_ground(2);
        // Every lit voxel is at least as bright as each neighbour minus attenuation.
        for handle in [ground, sky] {
            for index in 0..CHUNK_SIZE as usize {
                let voxel = pool.chunk(handle).voxels[index];
                for side in VoxelSide::all() {
                    let Some((nh, ni)) = pool.voxel_across(handle, index, side) else {
                        continue;
                    };
                    let source_chunk = pool.chunk(nh);
                    let source = source_chunk.voxels[ni];
                    let decrement = if side == VoxelSide::TOP && source_chunk.is_above_surface {
                        0
                    } else {
                        lighting.sun_attenuation()
                    };
                    let expected = source
                        .light
                        .saturating_sub(decrement)
                        .saturating_sub(voxel.opacity);
                    assert!(voxel.light >= expected, "voxel {} in {:?}", index, handle);
                }
            }
        }
    }

    #[test]
    fn test_missing_neighbours_are_skipped() {
        let mut pool = ChunkPool::new(2);
        let mut lighting = LightPropagator::new(2, 1);
        let (handle, _) = pool.acquire(ChunkCoord::new(3, 3, 3)).unwrap();
        let corner = local_index_of(0, 0, 0);
        pool.chunk_mut(handle).voxels[corner].light = 10;
        lighting.enqueue(handle, corner);
        lighting.run(&mut pool);
        assert_eq!(pool.chunk(handle).voxels[local_index_of(1, 0, 0)].light, 8);
    }

    #[test]
    fn test_torch_light_spreads_with_torch_attenuation() {
        let mut pool = ChunkPool::new(2);
        let mut lighting = LightPropagator::new(3, 1);
        let (handle, _) = pool.acquire(ChunkCoord::new(0, 0, 0)).unwrap();
        let center = local_index_of(8, 8, 8);
        pool.chunk_mut(handle).add_light_source(center, 12);
        lighting.rebuild_chunk_lightmap(&mut pool, handle);

        let voxels = &pool.chunk(handle).voxels;
        assert_eq!(voxels[center].light, 12);
        assert_eq!(voxels[local_index_of(9, 8, 8)].torch_light, 11);
        assert_eq!(voxels[local_index_of(12, 8, 8)].torch_light, 8);
        assert_eq!(voxels[local_index_of(12, 8, 8)].light, 8);
        assert_eq!(voxels[local_index_of(8, 2, 8)].light, 6);
    }

    #[test]
    fn test_reverse_cast_recomputes_from_neighbours() {
        let (mut pool, mut lighting, ground, _) = flat_ground(3);
        let below_shaft = local_index_of(4, 13, 4);
        lighting.reverse_cast(&mut pool, ground, below_shaft);
        let voxels = &pool.chunk(ground).voxels;
        assert!(voxels[below_shaft].is_empty());
        assert_eq!(voxels[below_shaft].light, 9);
        assert_eq!(voxels[below_shaft].torch_light, 0);
    }
}
