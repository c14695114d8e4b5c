//! # World Random Module
//!
//! Deterministic, position-keyed random values. Terrain painting never draws
//! from a global generator: every decision (surface voxel choice, vegetation,
//! vein direction) hashes the world position together with the world seed so
//! that the same position always produces the same value, on any thread and in
//! any chunk order.

use cgmath::Point3;

/// Golden-ratio increment used by the splitmix finalizer.
const SPLITMIX_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// Number of mantissa bits used when converting a hash to `[0, 1)`.
const UNIT_BITS: u32 = 24;

/// A seeded source of position-hashed random values.
///
/// `WorldRand` is `Copy` and holds nothing but the seed, which makes it safe to
/// share with the generation worker without synchronization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorldRand {
    seed: u64,
}

impl WorldRand {
    /// Creates a random source for the given world seed.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Creates a random source from a textual seed (FNV-1a hash of the string).
    pub fn from_text(seed: &str) -> Self {
        Self::new(Self::seed_from_text(seed))
    }

    /// Hashes a textual seed into an integer seed.
    pub fn seed_from_text(seed: &str) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in seed.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }

    /// The seed this source was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns a copy of this source whose values are independent of the original.
    ///
    /// Used to give each sampling concern (elevation, moisture, caves) its own
    /// stream while still deriving everything from one world seed.
    pub fn derive(&self, salt: u64) -> Self {
        Self::new(mix(self.seed ^ salt.wrapping_mul(SPLITMIX_GAMMA)))
    }

    /// Raw 64-bit hash of a world position.
    pub fn hash_at(&self, position: Point3<i32>) -> u64 {
        let mut h = mix(self.seed.wrapping_add(SPLITMIX_GAMMA));
        h = mix(h ^ position.x as u32 as u64);
        h = mix(h ^ ((position.y as u32 as u64) << 21));
        mix(h ^ ((position.z as u32 as u64) << 42))
    }

    /// Random value in `[0, 1)` for the given world position.
    pub fn value_at(&self, position: Point3<i32>) -> f32 {
        unit(self.hash_at(position))
    }

    /// Random integer in `[min, max)` for the given world position.
    ///
    /// Returns `min` when the range is empty.
    pub fn range_at(&self, min: i32, max: i32, position: Point3<i32>) -> i32 {
        if max <= min {
            return min;
        }
        let span = (max - min) as u64;
        min + (self.hash_at(position) % span) as i32
    }

    /// Random local coordinates, each in `[0, size)`, for the given position.
    pub fn vector_at(&self, position: Point3<i32>, size: u32) -> Point3<u32> {
        let size = size.max(1) as u64;
        let h = self.hash_at(position);
        let a = mix(h ^ 0x01);
        let b = mix(h ^ 0x02);
        Point3::new((h % size) as u32, (a % size) as u32, (b % size) as u32)
    }

    /// A sequential generator seeded from the given position.
    ///
    /// The sequence is still a pure function of seed and position, so callers
    /// that draw a fixed number of values stay deterministic.
    pub fn rng_at(&self, position: Point3<i32>) -> fastrand::Rng {
        fastrand::Rng::with_seed(self.hash_at(position))
    }
}

/// splitmix64 finalizer.
#[inline]
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[inline]
fn unit(hash: u64) -> f32 {
    (hash >> (64 - UNIT_BITS)) as f32 / (1u64 << UNIT_BITS) as f32
}
