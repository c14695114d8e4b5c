//! # World Module
//!
//! This module provides the `World` struct, the single owner of every resident
//! chunk, the light propagator and the pending placement requests. It serves as
//! the central coordinator for chunk access, voxel edits and the hand-off to the
//! renderer.
//!
//! ## Architecture
//!
//! Chunks live in a [`ChunkPool`] and are addressed by [`ChunkHandle`]. Every edit
//! goes through the world so that lighting, dirty flags and the render queue stay
//! consistent:
//!
//! - placing a voxel runs its placement resolver, registers torch emitters and
//!   fills water voxels,
//! - destroying a voxel reverse casts light into the hole,
//! - every edit marks the chunk modified and dirty, and border edits also mark
//!   the adjacent chunk dirty.
//!
//! ## Generation hand-off
//!
//! Terrain is painted into detached chunks (usually on the generation worker)
//! and installed here. Installing copies the voxels into the resident chunk,
//! keeps the placement requests for later, and rebuilds the chunk's lightmap.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use cgmath::{Point3, Vector3};
use log::{debug, warn};

use crate::core::{Result, VoxelError, WorldRand};
use crate::engine_state::voxels::chunk::{
    chunk_coord_of, local_index_of, local_position_in_chunk, Chunk, ChunkCoord, ChunkHandle,
};
use crate::engine_state::voxels::chunk_pool::ChunkPool;
use crate::engine_state::voxels::generation::{PlacementRequests, TreeRequest, VegetationRequest};
use crate::engine_state::voxels::lighting::LightPropagator;
use crate::engine_state::voxels::voxel::connected::{
    neighbourhood_slot, ResolveContext, Resolution, NEIGHBOURHOOD_SIZE,
};
use crate::engine_state::voxels::voxel::voxel_definition::VoxelRegistry;
use crate::engine_state::voxels::voxel::{Voxel, VoxelTypeIndex, HOLE_TYPE};

/// Represents the resident part of a voxel world.
///
/// The world is stored as a sparse 3D grid of chunks, where each chunk is a 16x16x16
/// collection of voxels. Chunks are created on demand and recycled by the pool.
pub struct World {
    pub(super) pool: ChunkPool,
    pub(super) lighting: LightPropagator,
    pub(super) registry: Arc<VoxelRegistry>,
    world_rand: WorldRand,
    vegetation_requests: HashMap<ChunkCoord, Vec<VegetationRequest>>,
    tree_requests: Vec<TreeRequest>,
    pending_generation: HashSet<ChunkCoord>,
}

impl World {
    /// Creates a new, empty world.
    ///
    /// # Arguments
    /// * `registry` - Voxel types of the world
    /// * `world_rand` - World random source, used by placement resolvers
    /// * `pool_capacity` - Maximum number of resident chunks
    /// * `sun_attenuation` - Sun light lost per step
    /// * `torch_attenuation` - Torch light lost per step
    pub fn new(
        registry: Arc<VoxelRegistry>,
        world_rand: WorldRand,
        pool_capacity: usize,
        sun_attenuation: u8,
        torch_attenuation: u8,
    ) -> Self {
        World {
            pool: ChunkPool::new(pool_capacity),
            lighting: LightPropagator::new(sun_attenuation, torch_attenuation),
            registry,
            world_rand,
            vegetation_requests: HashMap::new(),
            tree_requests: Vec::new(),
            pending_generation: HashSet::new(),
        }
    }

    /// Voxel types of the world.
    pub fn registry(&self) -> &Arc<VoxelRegistry> {
        &self.registry
    }

    /// World random source.
    pub fn world_rand(&self) -> WorldRand {
        self.world_rand
    }

    /// The chunk pool, read only.
    pub fn pool(&self) -> &ChunkPool {
        &self.pool
    }

    /// Returns the chunk containing a world position, creating it if needed.
    ///
    /// # Errors
    /// `VoxelError::PoolExhausted` when no chunk can be recycled.
    pub fn get_or_create_chunk(&mut self, world_pos: Point3<i32>) -> Result<ChunkHandle> {
        self.pool
            .acquire(chunk_coord_of(world_pos))
            .map(|(handle, _)| handle)
    }

    /// Returns the resident chunk containing a world position.
    pub fn try_get_chunk(&self, world_pos: Point3<i32>) -> Option<ChunkHandle> {
        self.pool.handle_of(chunk_coord_of(world_pos))
    }

    /// Immutable access to a resident chunk.
    pub fn chunk(&self, handle: ChunkHandle) -> &Chunk {
        self.pool.chunk(handle)
    }

    /// Resolves the voxel at `offset` from a voxel, crossing chunk borders.
    pub fn neighbour_voxel(
        &self,
        handle: ChunkHandle,
        index: usize,
        offset: Vector3<i32>,
    ) -> Option<(ChunkHandle, usize)> {
        self.pool.neighbour_voxel(handle, index, offset)
    }

    /// Chunk and local index of a world position, if its chunk is resident.
    pub fn voxel_index_at(&self, world_pos: Point3<i32>) -> Option<(ChunkHandle, usize)> {
        let handle = self.try_get_chunk(world_pos)?;
        let local = local_position_in_chunk(world_pos);
        Some((handle, local_index_of(local.x, local.y, local.z)))
    }

    /// Voxel at a world position, if its chunk is resident.
    pub fn voxel_at(&self, world_pos: Point3<i32>) -> Option<&Voxel> {
        self.voxel_index_at(world_pos)
            .map(|(handle, index)| &self.pool.chunk(handle).voxels[index])
    }

    /// Voxel at a world position. Positions in non-resident chunks read as empty.
    pub fn voxel_get(&self, world_pos: Point3<i32>) -> Voxel {
        self.voxel_at(world_pos).copied().unwrap_or(Voxel::EMPTY)
    }

    /// World position of a voxel.
    pub fn world_position_of(&self, handle: ChunkHandle, index: usize) -> Point3<i32> {
        self.pool.chunk(handle).world_position_of(index)
    }

    /// Checks the neighbour links of every resident chunk.
    pub fn validate_links(&self) -> Result<()> {
        self.pool.validate_links()
    }

    fn resolve_context(
        &self,
        handle: ChunkHandle,
        index: usize,
        position: Point3<i32>,
        type_index: VoxelTypeIndex,
        rotation: u8,
    ) -> ResolveContext {
        let mut neighbourhood = [None; NEIGHBOURHOOD_SIZE];
        for dy in -1..=1 {
            for dz in -1..=1 {
                for dx in -1..=1 {
                    neighbourhood[neighbourhood_slot(dx, dy, dz)] = self
                        .pool
                        .neighbour_voxel(handle, index, Vector3::new(dx, dy, dz))
                        .map(|(h, i)| self.pool.chunk(h).voxels[i].type_index);
                }
            }
        }
        ResolveContext {
            position,
            type_index,
            rotation,
            neighbourhood,
            world_rand: self.world_rand,
        }
    }

    /// Places a voxel.
    ///
    /// The type's placement resolver, if any, may replace or cancel the placement.
    /// Emitting types register a light source, water types are placed full.
    /// Placing the empty type destroys the voxel instead.
    ///
    /// Only emitters feed the light propagator. Any other voxel keeps the light of
    /// the voxel it replaces, lowered by its opacity, and its neighbours are not
    /// darkened until the chunk's lightmap is rebuilt.
    ///
    /// # Arguments
    /// * `world_pos` - Where to place
    /// * `type_index` - Requested voxel type
    /// * `color` - Tint, the type's default color if `None`
    /// * `rotation` - Texture rotation, ignored by types that do not allow it
    ///
    /// # Returns
    /// `true` if a voxel was placed, `false` if the resolver cancelled it.
    ///
    /// # Errors
    /// `VoxelError::UnknownVoxelDefinition` for unregistered types and
    /// `VoxelError::PoolExhausted` if the chunk cannot be created.
    pub fn voxel_place(
        &mut self,
        world_pos: Point3<i32>,
        type_index: VoxelTypeIndex,
        color: Option<[u8; 4]>,
        rotation: u8,
    ) -> Result<bool> {
        if type_index <= HOLE_TYPE {
            return Ok(self.voxel_destroy(world_pos));
        }

        let handle = self.get_or_create_chunk(world_pos)?;
        let local = local_position_in_chunk(world_pos);
        let index = local_index_of(local.x, local.y, local.z);

        let mut type_index = type_index;
        if let Some(resolver) = self.registry.resolver(type_index) {
            let context = self.resolve_context(handle, index, world_pos, type_index, rotation);
            match resolver.resolve(&context) {
                Resolution::Keep => {}
                Resolution::Cancel => {
                    debug!("Placement at {:?} cancelled by its resolver", world_pos);
                    return Ok(false);
                }
                Resolution::Replace(replacement) => type_index = replacement,
            }
        }

        let Some(definition) = self.registry.get(type_index) else {
            warn!("Cannot place unknown voxel type {} at {:?}", type_index, world_pos);
            return Err(VoxelError::UnknownVoxelDefinition(format!("#{}", type_index)));
        };
        let light_intensity = definition.light_intensity;
        let allows_rotation = definition.allows_texture_rotation;

        let mut voxel = self.registry.make_voxel(type_index);
        if let Some(color) = color {
            voxel.color = color;
        }
        if allows_rotation {
            voxel.set_rotation(rotation);
        }

        let chunk = self.pool.chunk_mut(handle);
        let previous = chunk.voxels[index];
        voxel.torch_light = previous.torch_light.saturating_sub(voxel.opacity);
        voxel.light = previous
            .light
            .saturating_sub(voxel.opacity)
            .max(voxel.torch_light);
        chunk.voxels[index] = voxel;
        chunk.remove_light_source(index);
        chunk.modified = true;

        self.pool.touch(handle);
        self.pool.request_refresh(handle);
        self.pool.request_border_refresh(handle, index);

        if light_intensity > 0 {
            self.pool
                .chunk_mut(handle)
                .add_light_source(index, light_intensity);
            self.lighting
                .seed_torch(&mut self.pool, handle, index, light_intensity);
        }

        Ok(true)
    }

    /// Removes the voxel at a world position and relights the hole.
    ///
    /// # Returns
    /// `true` if something was removed. Positions in non-resident chunks and empty
    /// voxels are left alone.
    pub fn voxel_destroy(&mut self, world_pos: Point3<i32>) -> bool {
        let Some((handle, index)) = self.voxel_index_at(world_pos) else {
            return false;
        };
        let chunk = self.pool.chunk_mut(handle);
        let voxel = chunk.voxels[index];
        if !voxel.has_content() && voxel.water_level == 0 {
            return false;
        }
        chunk.remove_light_source(index);
        chunk.modified = true;
        self.pool.touch(handle);
        self.lighting.reverse_cast(&mut self.pool, handle, index);
        true
    }

    /// Returns `true` when the chunk changed since the renderer last took it.
    pub fn is_dirty(&self, handle: ChunkHandle) -> bool {
        self.pool.chunk(handle).is_dirty
    }

    /// Voxels of a chunk, for the renderer.
    pub fn voxels(&self, handle: ChunkHandle) -> &[Voxel] {
        &self.pool.chunk(handle).voxels
    }

    /// Clears the dirty flag once the renderer has consumed a chunk.
    pub fn mark_clean(&mut self, handle: ChunkHandle) {
        self.pool.chunk_mut(handle).is_dirty = false;
    }

    /// Hands the chunks waiting for a mesh update over to the renderer.
    pub fn take_render_queue(&mut self) -> Vec<ChunkHandle> {
        self.pool.take_render_queue()
    }

    /// Keeps placement requests until their target chunks are resident.
    pub fn queue_placements(&mut self, requests: PlacementRequests) {
        for request in requests.vegetation {
            self.vegetation_requests
                .entry(chunk_coord_of(request.position))
                .or_default()
                .push(request);
        }
        self.tree_requests.extend(requests.trees);
    }

    /// Number of vegetation requests waiting for their chunk.
    pub fn pending_vegetation(&self) -> usize {
        self.vegetation_requests.values().map(Vec::len).sum()
    }

    /// Drops the vegetation requests of chunks farther than `radius` chunks from
    /// `center` on any axis.
    ///
    /// # Returns
    /// The number of requests dropped.
    pub fn discard_vegetation_outside(&mut self, center: ChunkCoord, radius: i32) -> usize {
        let mut dropped = 0;
        self.vegetation_requests.retain(|coord, requests| {
            let inside = (coord.x - center.x).abs() <= radius
                && (coord.y - center.y).abs() <= radius
                && (coord.z - center.z).abs() <= radius;
            if !inside {
                dropped += requests.len();
            }
            inside
        });
        if dropped > 0 {
            debug!("Dropped {} vegetation requests outside the area around {:?}", dropped, center);
        }
        dropped
    }

    /// Places the vegetation requests whose target chunk is resident and populated.
    ///
    /// Requests whose target voxel is occupied are dropped. The rest stay queued.
    /// Like other non-emitting placements, vegetation takes the light of the voxel
    /// it fills, lowered by its opacity, without running the propagator.
    ///
    /// # Returns
    /// The number of voxels placed.
    pub fn process_vegetation_requests(&mut self) -> usize {
        let ready: Vec<(ChunkCoord, ChunkHandle)> = self
            .vegetation_requests
            .keys()
            .filter_map(|coord| {
                let handle = self.pool.handle_of(*coord)?;
                self.pool.chunk(handle).is_populated.then_some((*coord, handle))
            })
            .collect();
        let mut placed = 0;

        for (coord, handle) in ready {
            let Some(requests) = self.vegetation_requests.remove(&coord) else {
                continue;
            };
            for request in requests {
                let local = local_position_in_chunk(request.position);
                let index = local_index_of(local.x, local.y, local.z);
                let mut voxel = self.registry.make_voxel(request.voxel);
                let target = &mut self.pool.chunk_mut(handle).voxels[index];
                if !target.is_empty() {
                    continue;
                }
                voxel.torch_light = target.torch_light.saturating_sub(voxel.opacity);
                voxel.light = target.light.saturating_sub(voxel.opacity).max(voxel.torch_light);
                *target = voxel;

                self.pool.request_refresh(handle);
                self.pool.request_border_refresh(handle, index);
                placed += 1;
            }
        }

        if placed > 0 {
            debug!("Placed {} vegetation voxels", placed);
        }
        placed
    }

    /// Takes the tree requests collected so far.
    pub fn drain_tree_requests(&mut self) -> Vec<TreeRequest> {
        std::mem::take(&mut self.tree_requests)
    }

    /// Returns `true` when the chunk at `coord` still has to be generated.
    pub fn needs_generation(&self, coord: ChunkCoord) -> bool {
        if self.pending_generation.contains(&coord) {
            return false;
        }
        match self.pool.handle_of(coord) {
            Some(handle) => {
                let chunk = self.pool.chunk(handle);
                !chunk.is_populated && !chunk.modified
            }
            None => true,
        }
    }

    /// Records that a generation task for `coord` is in flight.
    ///
    /// # Returns
    /// `false` if one already was.
    pub fn mark_generation_pending(&mut self, coord: ChunkCoord) -> bool {
        self.pending_generation.insert(coord)
    }

    /// Forgets the in-flight generation task for `coord`.
    pub fn clear_generation_pending(&mut self, coord: ChunkCoord) {
        self.pending_generation.remove(&coord);
    }

    /// Number of generation tasks in flight.
    pub fn pending_generation_count(&self) -> usize {
        self.pending_generation.len()
    }

    /// Installs a chunk painted by the terrain generator.
    ///
    /// Chunks that were edited or populated in the meantime keep their content and
    /// the requests are discarded.
    ///
    /// # Returns
    /// The handle of the installed chunk, or `None` if it was skipped.
    ///
    /// # Errors
    /// `VoxelError::PoolExhausted` if the chunk cannot be made resident.
    pub fn install_generated(
        &mut self,
        generated: Chunk,
        requests: PlacementRequests,
    ) -> Result<Option<ChunkHandle>> {
        self.pending_generation.remove(&generated.coord);
        let (handle, _) = self.pool.acquire(generated.coord)?;

        let chunk = self.pool.chunk_mut(handle);
        if chunk.modified || chunk.is_populated {
            debug!("Chunk {:?} changed during generation, keeping it", generated.coord);
            return Ok(None);
        }
        chunk.voxels.copy_from_slice(&generated.voxels);
        chunk.is_above_surface = generated.is_above_surface;
        chunk.is_populated = true;
        chunk.light_sources.clear();

        self.register_emitters(handle);
        self.queue_placements(requests);
        self.lighting.rebuild_chunk_lightmap(&mut self.pool, handle);
        Ok(Some(handle))
    }

    /// Registers a light source for every emitting voxel of a chunk.
    pub(super) fn register_emitters(&mut self, handle: ChunkHandle) {
        let registry = Arc::clone(&self.registry);
        let chunk = self.pool.chunk_mut(handle);
        for index in 0..chunk.voxels.len() {
            let intensity = registry
                .get(chunk.voxels[index].type_index)
                .map(|d| d.light_intensity)
                .unwrap_or(0);
            if intensity > 0 {
                chunk.add_light_source(index, intensity);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::engine_state::voxels::voxel::connected::{
        ConnectedRuleConfig, NeighbourCondition, NeighbourMatch, RuleAction,
    };
    use crate::engine_state::voxels::voxel::voxel_definition::VoxelDefinition;
    use crate::engine_state::voxels::voxel::MAX_WATER_LEVEL;

    pub(crate) fn test_world() -> World {
        let registry = VoxelRegistry::new(vec![
            VoxelDefinition::solid("Stone", [128, 128, 128, 255]),
            VoxelDefinition {
                is_water: true,
                ..VoxelDefinition::translucent("Water", 2, [40, 80, 200, 160])
            },
            VoxelDefinition {
                light_intensity: 12,
                ..VoxelDefinition::translucent("Torch", 0, [255, 200, 80, 255])
            },
            VoxelDefinition {
                allows_texture_rotation: true,
                ..VoxelDefinition::solid("Log", [110, 70, 30, 255])
            },
            VoxelDefinition::solid("FenceJoined", [150, 110, 60, 255]),
            VoxelDefinition {
                connected: vec![ConnectedRuleConfig {
                    conditions: vec![NeighbourCondition {
                        offset: [1, 0, 0],
                        matches: NeighbourMatch::Equals,
                        voxel: Some("Fence".into()),
                    }],
                    action: RuleAction::Replace,
                    replacements: vec!["FenceJoined".into()],
                }],
                ..VoxelDefinition::solid("Fence", [150, 110, 60, 255])
            },
            VoxelDefinition::translucent("Flower", 0, [200, 50, 50, 255]),
        ]);
        World::new(Arc::new(registry), WorldRand::new(3), 16, 2, 1)
    }

    fn index(world: &World, name: &str) -> VoxelTypeIndex {
        world.registry().index_of(name).unwrap()
    }

    #[test]
    fn test_place_and_destroy_round_trip() {
        let mut world = test_world();
        let stone = index(&world, "Stone");
        let p = Point3::new(3, 4, 5);

        assert!(world.voxel_place(p, stone, None, 0).unwrap());
        let placed = world.voxel_get(p);
        assert_eq!(placed.type_index, stone);
        assert_eq!(placed.opacity, 15);
        let handle = world.try_get_chunk(p).unwrap();
        assert!(world.chunk(handle).modified);
        assert!(world.is_dirty(handle));

        assert!(world.voxel_destroy(p));
        let removed = world.voxel_get(p);
        assert!(removed.is_empty());
        assert_eq!(removed.opacity, 0);
        assert!(!world.voxel_destroy(p));

        assert!(world.voxel_place(p, stone, None, 0).unwrap());
        assert_eq!(world.voxel_get(p).type_index, placed.type_index);
        assert_eq!(world.voxel_get(p).opacity, placed.opacity);
    }

    #[test]
    fn test_border_edit_marks_neighbour_dirty() {
        let mut world = test_world();
        let stone = index(&world, "Stone");
        let left = world.get_or_create_chunk(Point3::new(-1, 0, 0)).unwrap();
        let origin = world.get_or_create_chunk(Point3::new(0, 0, 0)).unwrap();
        world.take_render_queue();
        world.mark_clean(left);
        world.mark_clean(origin);

        world.voxel_place(Point3::new(0, 5, 5), stone, None, 0).unwrap();
        let queue = world.take_render_queue();
        assert!(queue.contains(&origin));
        assert!(queue.contains(&left));
        assert!(world.is_dirty(left));

        world.mark_clean(left);
        world.voxel_place(Point3::new(8, 5, 5), stone, None, 0).unwrap();
        assert!(!world.is_dirty(left));
    }

    #[test]
    fn test_water_placement_is_full() {
        let mut world = test_world();
        let water = index(&world, "Water");
        world.voxel_place(Point3::new(1, 1, 1), water, None, 0).unwrap();
        assert_eq!(world.voxel_get(Point3::new(1, 1, 1)).water_level, MAX_WATER_LEVEL);
    }

    #[test]
    fn test_emitting_voxel_registers_light_source() {
        let mut world = test_world();
        let torch = index(&world, "Torch");
        let p = Point3::new(8, 8, 8);
        world.voxel_place(p, torch, None, 0).unwrap();

        let (handle, voxel_index) = world.voxel_index_at(p).unwrap();
        assert_eq!(world.chunk(handle).light_sources.len(), 1);
        assert_eq!(world.chunk(handle).light_sources[0].voxel_index, voxel_index);
        assert_eq!(world.voxel_get(p).torch_light, 12);
        assert_eq!(world.voxel_get(Point3::new(9, 8, 8)).torch_light, 11);
        assert_eq!(world.voxel_get(Point3::new(8, 8, 11)).light, 9);

        assert!(world.voxel_destroy(p));
        assert!(world.chunk(handle).light_sources.is_empty());
    }

    #[test]
    fn test_color_and_rotation_overrides() {
        let mut world = test_world();
        let log = index(&world, "Log");
        let stone = index(&world, "Stone");
        world.voxel_place(Point3::new(0, 0, 0), log, Some([1, 2, 3, 4]), 2).unwrap();
        world.voxel_place(Point3::new(1, 0, 0), stone, None, 2).unwrap();

        let placed_log = world.voxel_get(Point3::new(0, 0, 0));
        assert_eq!(placed_log.color, [1, 2, 3, 4]);
        assert_eq!(placed_log.rotation(), 2);
        assert_eq!(world.voxel_get(Point3::new(1, 0, 0)).rotation(), 0);
    }

    #[test]
    fn test_resolver_replaces_placement() {
        let mut world = test_world();
        let fence = index(&world, "Fence");
        let joined = index(&world, "FenceJoined");

        world.voxel_place(Point3::new(5, 0, 0), fence, None, 0).unwrap();
        assert_eq!(world.voxel_get(Point3::new(5, 0, 0)).type_index, fence);
        world.voxel_place(Point3::new(4, 0, 0), fence, None, 0).unwrap();
        assert_eq!(world.voxel_get(Point3::new(4, 0, 0)).type_index, joined);
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        let mut world = test_world();
        let result = world.voxel_place(Point3::new(0, 0, 0), 999, None, 0);
        assert!(matches!(result, Err(VoxelError::UnknownVoxelDefinition(_))));
    }

    #[test]
    fn test_vegetation_waits_for_populated_chunk() {
        let mut world = test_world();
        let flower = index(&world, "Flower");
        let stone = index(&world, "Stone");
        let mut requests = PlacementRequests::default();
        requests.vegetation.push(VegetationRequest {
            position: Point3::new(2, 20, 2),
            voxel: flower,
        });
        requests.vegetation.push(VegetationRequest {
            position: Point3::new(3, 20, 3),
            voxel: flower,
        });
        requests.trees.push(TreeRequest {
            chunk_anchor: Point3::new(0, 0, 0),
            position: Point3::new(2, 16, 2),
            tree: "Oak".into(),
        });
        world.queue_placements(requests);

        assert_eq!(world.process_vegetation_requests(), 0);
        assert_eq!(world.pending_vegetation(), 2);

        let mut generated = Chunk::new(Point3::new(0, 1, 0));
        generated.voxels[local_index_of(3, 4, 3)] = world.registry().make_voxel(stone);
        world
            .install_generated(generated, PlacementRequests::default())
            .unwrap()
            .unwrap();

        assert_eq!(world.process_vegetation_requests(), 1);
        assert_eq!(world.pending_vegetation(), 0);
        assert_eq!(world.voxel_get(Point3::new(2, 20, 2)).type_index, flower);
        assert_eq!(world.voxel_get(Point3::new(3, 20, 3)).type_index, stone);

        let trees = world.drain_tree_requests();
        assert_eq!(trees.len(), 1);
        assert!(world.drain_tree_requests().is_empty());
    }

    #[test]
    fn test_vegetation_outside_the_area_is_dropped() {
        let mut world = test_world();
        let flower = index(&world, "Flower");
        let mut requests = PlacementRequests::default();
        for x in [2, 40, -70] {
            requests.vegetation.push(VegetationRequest {
                position: Point3::new(x, 20, 2),
                voxel: flower,
            });
        }
        world.queue_placements(requests);
        assert_eq!(world.pending_vegetation(), 3);

        assert_eq!(world.discard_vegetation_outside(Point3::new(0, 1, 0), 2), 1);
        assert_eq!(world.pending_vegetation(), 2);
        assert_eq!(world.discard_vegetation_outside(Point3::new(0, 1, 0), 1), 1);
        assert_eq!(world.pending_vegetation(), 1);
        assert_eq!(world.discard_vegetation_outside(Point3::new(0, 1, 0), 1), 0);

        world
            .install_generated(Chunk::new(Point3::new(0, 1, 0)), PlacementRequests::default())
            .unwrap()
            .unwrap();
        assert_eq!(world.process_vegetation_requests(), 1);
        assert_eq!(world.pending_vegetation(), 0);
    }

    #[test]
    fn test_placed_vegetation_keeps_the_light_it_replaces() {
        let mut world = test_world();
        let flower = index(&world, "Flower");
        let water = index(&world, "Water");
        let mut generated = Chunk::new(Point3::new(0, 1, 0));
        generated.is_above_surface = true;
        let handle = world
            .install_generated(generated, PlacementRequests::default())
            .unwrap()
            .unwrap();
        assert_eq!(world.voxel_get(Point3::new(2, 20, 2)).light, 15);

        let mut requests = PlacementRequests::default();
        requests.vegetation.push(VegetationRequest {
            position: Point3::new(2, 20, 2),
            voxel: flower,
        });
        world.queue_placements(requests);
        assert_eq!(world.process_vegetation_requests(), 1);
        assert_eq!(world.voxel_get(Point3::new(2, 20, 2)).light, 15);

        world.voxel_place(Point3::new(5, 20, 5), water, None, 0).unwrap();
        assert_eq!(world.voxel_get(Point3::new(5, 20, 5)).light, 13);
        assert_eq!(world.voxel_get(Point3::new(5, 19, 5)).light, 15);
        assert!(world.chunk(handle).is_populated);
    }

    #[test]
    fn test_install_skips_edited_chunks() {
        let mut world = test_world();
        let stone = index(&world, "Stone");
        let coord = Point3::new(0, 0, 0);
        assert!(world.needs_generation(coord));
        assert!(world.mark_generation_pending(coord));
        assert!(!world.mark_generation_pending(coord));
        assert!(!world.needs_generation(coord));

        world.voxel_place(Point3::new(1, 1, 1), stone, None, 0).unwrap();
        let solid = Chunk::filled(coord, world.registry().make_voxel(stone));
        let installed = world
            .install_generated(solid, PlacementRequests::default())
            .unwrap();
        assert!(installed.is_none());
        assert_eq!(world.pending_generation_count(), 0);
        assert!(world.voxel_get(Point3::new(2, 2, 2)).is_empty());
        assert!(!world.needs_generation(coord));
    }

    #[test]
    fn test_generated_emitters_become_light_sources() {
        let mut world = test_world();
        let torch = index(&world, "Torch");
        let mut generated = Chunk::new(Point3::new(0, 0, 0));
        generated.voxels[local_index_of(4, 4, 4)] = world.registry().make_voxel(torch);
        let handle = world
            .install_generated(generated, PlacementRequests::default())
            .unwrap()
            .unwrap();
        assert_eq!(world.chunk(handle).light_sources.len(), 1);
        assert_eq!(world.voxel_get(Point3::new(4, 4, 4)).light, 12);
        assert!(world.chunk(handle).is_populated);
        assert!(!world.chunk(handle).modified);
    }
}
