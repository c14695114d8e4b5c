//! # Chunk Pool
//!
//! Owns every resident chunk. Chunks live in a slot arena and are referenced by
//! [`ChunkHandle`] (the slot index). The pool maps chunk coordinates to handles,
//! keeps neighbour handles symmetric, tracks recency with an LRU list and recycles
//! the least recently used chunk once the capacity is reached.
//!
//! The pool also owns the render queue, so evicting a chunk can never leave a stale
//! handle behind for the renderer.
//!
//! The pool performs no synchronization: it belongs to the controlling thread.

use std::collections::{HashMap, VecDeque};

use cgmath::{Point3, Vector3};
use log::{debug, error};
use lru::LruCache;

use crate::core::{Result, VoxelError};

use super::chunk::{
    border_sides_of, local_index_of, local_position_of, Chunk, ChunkCoord, ChunkHandle,
    CHUNK_DIMENSION,
};
use super::voxel::voxel_side::VoxelSide;

/// Slot arena of chunks with LRU recycling.
pub struct ChunkPool {
    slots: Vec<Chunk>,
    occupied: Vec<bool>,
    coord_to_handle: HashMap<ChunkCoord, ChunkHandle>,
    recently_used: LruCache<ChunkHandle, ()>,
    available_slots: VecDeque<usize>,
    render_queue: Vec<ChunkHandle>,
    capacity: usize,
}

impl ChunkPool {
    /// Creates an empty pool that holds at most `capacity` chunks.
    ///
    /// Slots are allocated lazily, the first time they are needed.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        ChunkPool {
            slots: Vec::new(),
            occupied: Vec::new(),
            coord_to_handle: HashMap::new(),
            recently_used: LruCache::unbounded(),
            available_slots: VecDeque::new(),
            render_queue: Vec::new(),
            capacity,
        }
    }

    /// Maximum number of resident chunks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident chunks.
    pub fn len(&self) -> usize {
        self.coord_to_handle.len()
    }

    /// Returns `true` when no chunk is resident.
    pub fn is_empty(&self) -> bool {
        self.coord_to_handle.is_empty()
    }

    /// Immutable access to a resident chunk.
    ///
    /// # Panics
    /// Panics if the handle was never handed out by this pool.
    #[inline]
    pub fn chunk(&self, handle: ChunkHandle) -> &Chunk {
        &self.slots[handle.0]
    }

    /// Mutable access to a resident chunk.
    #[inline]
    pub fn chunk_mut(&mut self, handle: ChunkHandle) -> &mut Chunk {
        &mut self.slots[handle.0]
    }

    /// Returns `true` when the handle refers to an occupied slot.
    pub fn is_resident(&self, handle: ChunkHandle) -> bool {
        self.occupied.get(handle.0).copied().unwrap_or(false)
    }

    /// Non-allocating lookup by chunk coordinate. Does not touch recency.
    pub fn handle_of(&self, coord: ChunkCoord) -> Option<ChunkHandle> {
        self.coord_to_handle.get(&coord).copied()
    }

    /// All resident handles, in no particular order.
    pub fn handles(&self) -> impl Iterator<Item = ChunkHandle> + '_ {
        self.coord_to_handle.values().copied()
    }

    /// Marks a chunk as recently used.
    pub fn touch(&mut self, handle: ChunkHandle) {
        self.recently_used.promote(&handle);
    }

    /// Returns the chunk at `coord`, creating it if needed.
    ///
    /// A new chunk is empty and unpopulated. It is placed in a free slot, a newly
    /// allocated slot, or the slot of the least recently used chunk that holds no
    /// unsaved edits, and is linked with every resident face-adjacent chunk.
    ///
    /// # Returns
    /// The handle and `true` if the chunk was created by this call.
    ///
    /// # Errors
    /// `VoxelError::PoolExhausted` when every slot holds a modified chunk.
    pub fn acquire(&mut self, coord: ChunkCoord) -> Result<(ChunkHandle, bool)> {
        if let Some(handle) = self.handle_of(coord) {
            self.touch(handle);
            return Ok((handle, false));
        }

        let slot = match self.available_slots.pop_front() {
            Some(slot) => slot,
            None if self.slots.len() < self.capacity => {
                self.slots.push(Chunk::new(coord));
                self.occupied.push(false);
                self.slots.len() - 1
            }
            None => match self.evict_least_recent() {
                Some(slot) => slot,
                None => {
                    error!(
                        "Chunk pool exhausted ({} slots), refusing chunk {:?}",
                        self.capacity, coord
                    );
                    return Err(VoxelError::PoolExhausted {
                        capacity: self.capacity,
                    });
                }
            },
        };

        let handle = ChunkHandle(slot);
        self.slots[slot].reset(coord);
        self.occupied[slot] = true;
        self.coord_to_handle.insert(coord, handle);
        self.recently_used.push(handle, ());
        self.link(handle);
        Ok((handle, true))
    }

    /// Removes a chunk from the pool, even if it is modified.
    ///
    /// Returns `false` when no chunk is resident at `coord`.
    pub fn release(&mut self, coord: ChunkCoord) -> bool {
        match self.handle_of(coord) {
            Some(handle) => {
                self.free(handle);
                self.available_slots.push_back(handle.0);
                true
            }
            None => false,
        }
    }

    fn evict_least_recent(&mut self) -> Option<usize> {
        // `iter()` runs from most to least recently used.
        let victim = self
            .recently_used
            .iter()
            .rev()
            .map(|(handle, _)| *handle)
            .find(|handle| !self.slots[handle.0].modified)?;

        debug!(
            "Evicting chunk {:?} from slot {}",
            self.slots[victim.0].coord, victim.0
        );
        self.free(victim);
        Some(victim.0)
    }

    fn free(&mut self, handle: ChunkHandle) {
        self.unlink(handle);
        self.recently_used.pop(&handle);
        let coord = self.slots[handle.0].coord;
        self.coord_to_handle.remove(&coord);
        self.occupied[handle.0] = false;
        if self.slots[handle.0].in_queue {
            self.render_queue.retain(|queued| *queued != handle);
        }
        self.slots[handle.0].in_queue = false;
        self.slots[handle.0].is_dirty = false;
    }

    fn link(&mut self, handle: ChunkHandle) {
        for side in VoxelSide::all() {
            let neighbour_coord = self.slots[handle.0].neighbour_coord(side);
            if let Some(neighbour) = self.handle_of(neighbour_coord) {
                self.slots[handle.0].neighbours[side as usize] = Some(neighbour);
                self.slots[neighbour.0].neighbours[side.opposite() as usize] = Some(handle);
            }
        }
    }

    fn unlink(&mut self, handle: ChunkHandle) {
        for side in VoxelSide::all() {
            if let Some(neighbour) = self.slots[handle.0].neighbours[side as usize].take() {
                let back = &mut self.slots[neighbour.0].neighbours[side.opposite() as usize];
                if *back == Some(handle) {
                    *back = None;
                }
            }
        }
    }

    /// Checks that neighbour handles are symmetric and point at the adjacent coordinates.
    ///
    /// # Errors
    /// `VoxelError::BrokenNeighbourLink` describing the first violation found.
    pub fn validate_links(&self) -> Result<()> {
        for (coord, handle) in &self.coord_to_handle {
            let chunk = &self.slots[handle.0];
            for side in VoxelSide::all() {
                let expected = self.handle_of(chunk.neighbour_coord(side));
                let actual = chunk.neighbours[side as usize];
                if actual != expected {
                    return Err(VoxelError::BrokenNeighbourLink {
                        from: *coord,
                        to: actual.map(|h| self.slots[h.0].coord),
                        side: side.name(),
                    });
                }
                if let Some(neighbour) = actual {
                    let back = self.slots[neighbour.0].neighbours[side.opposite() as usize];
                    if !self.is_resident(neighbour) || back != Some(*handle) {
                        return Err(VoxelError::BrokenNeighbourLink {
                            from: *coord,
                            to: Some(self.slots[neighbour.0].coord),
                            side: side.name(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolves the voxel at `offset` from a voxel, crossing chunk borders.
    ///
    /// # Returns
    /// The owning chunk and local index, or `None` if a chunk on the way is not
    /// resident.
    pub fn neighbour_voxel(
        &self,
        handle: ChunkHandle,
        index: usize,
        offset: Vector3<i32>,
    ) -> Option<(ChunkHandle, usize)> {
        let mut p = local_position_of(index) + offset;
        let mut current = handle;

        for (axis, negative, positive) in [
            (0, VoxelSide::LEFT, VoxelSide::RIGHT),
            (1, VoxelSide::BOTTOM, VoxelSide::TOP),
            (2, VoxelSide::BACK, VoxelSide::FORWARD),
        ] {
            while p[axis] < 0 {
                current = self.slots[current.0].neighbours[negative as usize]?;
                p[axis] += CHUNK_DIMENSION;
            }
            while p[axis] >= CHUNK_DIMENSION {
                current = self.slots[current.0].neighbours[positive as usize]?;
                p[axis] -= CHUNK_DIMENSION;
            }
        }

        Some((current, local_index_of(p.x, p.y, p.z)))
    }

    /// Resolves the voxel on the other side of a face.
    #[inline]
    pub fn voxel_across(
        &self,
        handle: ChunkHandle,
        index: usize,
        side: VoxelSide,
    ) -> Option<(ChunkHandle, usize)> {
        self.neighbour_voxel(handle, index, side.offset())
    }

    /// Flags a chunk dirty and queues it for the renderer once.
    pub fn request_refresh(&mut self, handle: ChunkHandle) {
        let chunk = &mut self.slots[handle.0];
        chunk.is_dirty = true;
        if !chunk.in_queue {
            chunk.in_queue = true;
            self.render_queue.push(handle);
        }
    }

    /// Refreshes the chunks sharing a face with a border voxel.
    pub fn request_border_refresh(&mut self, handle: ChunkHandle, index: usize) {
        for side in border_sides_of(index) {
            if let Some(neighbour) = self.slots[handle.0].neighbours[side as usize] {
                self.request_refresh(neighbour);
            }
        }
    }

    /// Hands the queued chunks over to the renderer.
    pub fn take_render_queue(&mut self) -> Vec<ChunkHandle> {
        let queue = std::mem::take(&mut self.render_queue);
        for handle in &queue {
            self.slots[handle.0].in_queue = false;
        }
        queue
    }

    /// Number of chunks waiting for the renderer.
    pub fn render_queue_len(&self) -> usize {
        self.render_queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(x: i32, y: i32, z: i32) -> ChunkCoord {
        Point3::new(x, y, z)
    }

    #[test]
    fn test_acquire_links_both_sides() {
        let mut pool = ChunkPool::new(8);
        let (a, created) = pool.acquire(coord(0, 0, 0)).unwrap();
        assert!(created);
        let (b, _) = pool.acquire(coord(1, 0, 0)).unwrap();
        let (c, _) = pool.acquire(coord(0, 1, 0)).unwrap();

        assert_eq!(pool.chunk(a).neighbour(VoxelSide::RIGHT), Some(b));
        assert_eq!(pool.chunk(b).neighbour(VoxelSide::LEFT), Some(a));
        assert_eq!(pool.chunk(a).neighbour(VoxelSide::TOP), Some(c));
        assert_eq!(pool.chunk(c).neighbour(VoxelSide::BOTTOM), Some(a));
        assert_eq!(pool.chunk(b).neighbour(VoxelSide::TOP), None);
        pool.validate_links().unwrap();

        let (again, created) = pool.acquire(coord(0, 0, 0)).unwrap();
        assert_eq!(again, a);
        assert!(!created);
    }

    #[test]
    fn test_broken_link_is_detected() {
        let mut pool = ChunkPool::new(4);
        let (a, _) = pool.acquire(coord(0, 0, 0)).unwrap();
        let (b, _) = pool.acquire(coord(0, 0, 1)).unwrap();
        pool.chunk_mut(b).neighbours[VoxelSide::BACK as usize] = None;
        assert!(matches!(
            pool.validate_links(),
            Err(VoxelError::BrokenNeighbourLink { .. })
        ));
        pool.chunk_mut(b).neighbours[VoxelSide::BACK as usize] = Some(a);
        pool.validate_links().unwrap();
    }

    #[test]
    fn test_lru_eviction_unlinks_neighbours() {
        let mut pool = ChunkPool::new(2);
        let (a, _) = pool.acquire(coord(0, 0, 0)).unwrap();
        let (b, _) = pool.acquire(coord(1, 0, 0)).unwrap();
        pool.request_refresh(a);
        pool.touch(b);

        // `a` is least recently used and gets recycled for the new chunk.
        let (c, created) = pool.acquire(coord(5, 0, 0)).unwrap();
        assert!(created);
        assert_eq!(c, a);
        assert_eq!(pool.handle_of(coord(0, 0, 0)), None);
        assert_eq!(pool.chunk(b).neighbour(VoxelSide::LEFT), None);
        assert_eq!(pool.render_queue_len(), 0);
        pool.validate_links().unwrap();
    }

    #[test]
    fn test_modified_chunks_are_never_evicted() {
        let mut pool = ChunkPool::new(2);
        let (a, _) = pool.acquire(coord(0, 0, 0)).unwrap();
        let (b, _) = pool.acquire(coord(0, 0, 1)).unwrap();
        pool.chunk_mut(a).modified = true;

        let (c, _) = pool.acquire(coord(9, 9, 9)).unwrap();
        assert_eq!(c, b);
        pool.chunk_mut(c).modified = true;

        assert!(matches!(
            pool.acquire(coord(3, 3, 3)),
            Err(VoxelError::PoolExhausted { capacity: 2 })
        ));
        assert_eq!(pool.chunk(a).coord, coord(0, 0, 0));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_neighbour_voxel_crosses_borders() {
        let mut pool = ChunkPool::new(8);
        let (a, _) = pool.acquire(coord(0, 0, 0)).unwrap();
        let (left, _) = pool.acquire(coord(-1, 0, 0)).unwrap();

        let edge = local_index_of(0, 3, 4);
        assert_eq!(
            pool.voxel_across(a, edge, VoxelSide::LEFT),
            Some((left, local_index_of(15, 3, 4)))
        );
        assert_eq!(pool.voxel_across(a, edge, VoxelSide::BOTTOM), Some((a, local_index_of(0, 2, 4))));
        assert_eq!(pool.voxel_across(a, local_index_of(0, 0, 0), VoxelSide::BOTTOM), None);
        assert_eq!(
            pool.neighbour_voxel(a, edge, Vector3::new(-17, 0, 0)),
            None
        );
    }

    #[test]
    fn test_render_queue_is_deduplicated() {
        let mut pool = ChunkPool::new(4);
        let (a, _) = pool.acquire(coord(0, 0, 0)).unwrap();
        let (b, _) = pool.acquire(coord(0, 0, 1)).unwrap();
        pool.request_refresh(a);
        pool.request_refresh(a);
        pool.request_border_refresh(a, local_index_of(3, 3, 15));
        assert_eq!(pool.take_render_queue(), vec![a, b]);
        assert!(!pool.chunk(a).in_queue);
        assert!(pool.chunk(a).is_dirty);
        assert!(pool.take_render_queue().is_empty());
    }

    #[test]
    fn test_release_frees_slot() {
        let mut pool = ChunkPool::new(1);
        let (a, _) = pool.acquire(coord(0, 0, 0)).unwrap();
        pool.chunk_mut(a).modified = true;
        assert!(pool.release(coord(0, 0, 0)));
        assert!(!pool.release(coord(0, 0, 0)));
        let (b, _) = pool.acquire(coord(2, 0, 0)).unwrap();
        assert_eq!(a, b);
        assert!(!pool.chunk(b).modified);
    }
}
