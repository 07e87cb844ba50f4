//! Fixed, versioned, little-endian wire types for redistribution paths.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::{align_of, size_of};

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Decode a whole buffer as records of `T`; the length must divide evenly.
pub fn decode_records<T: Pod>(bytes: &[u8]) -> Result<Vec<T>, String> {
    if bytes.len() % size_of::<T>() != 0 {
        return Err(format!(
            "{} bytes is not a whole number of {}-byte records",
            bytes.len(),
            size_of::<T>()
        ));
    }
    // copy out: the receive buffer carries no alignment guarantee
    let mut out = vec![T::zeroed(); bytes.len() / size_of::<T>()];
    cast_slice_mut(&mut out).copy_from_slice(bytes);
    Ok(out)
}

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Header kind for a bincode mesh body.
pub const KIND_MESH_BINARY: u16 = 1;
/// Header kind for a JSON mesh body (zero-cell fallback).
pub const KIND_MESH_ASCII: u16 = 2;

/// All multi-byte integers in these structs are **little-endian** on the wire.
/// We store them pre-LE with `.to_le()` and decode with `.from_le()`.

// ===== Common records ======================================================

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16,  // = WIRE_VERSION.to_le()
    pub kind_le: u16,     // KIND_MESH_*
    pub reserved_le: u32, // future use; keep zero
}

impl WireHdr {
    pub const SIZE: usize = 8;

    pub fn new(kind: u16) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            reserved_le: 0,
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32,
}
impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u32).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

/// Byte length of a following payload.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireLen {
    pub n_le: u64,
}
impl WireLen {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u64).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u64::from_le(self.n_le) as usize
    }
}

// ===== All-to-all size exchange ============================================

/// What one rank contributes to another: cells, points and serialized bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WireSizes {
    pub cells_le: u64,
    pub points_le: u64,
    pub bytes_le: u64,
}
impl WireSizes {
    pub fn new(cells: usize, points: usize, bytes: usize) -> Self {
        Self {
            cells_le: (cells as u64).to_le(),
            points_le: (points as u64).to_le(),
            bytes_le: (bytes as u64).to_le(),
        }
    }
    pub fn cells(&self) -> usize {
        u64::from_le(self.cells_le) as usize
    }
    pub fn points(&self) -> usize {
        u64::from_le(self.points_le) as usize
    }
    pub fn bytes(&self) -> usize {
        u64::from_le(self.bytes_le) as usize
    }
}

// ===== Fan-in =============================================================

/// Point and cell count announced before a fan-in payload.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WireMeshCounts {
    pub points_le: u64,
    pub cells_le: u64,
}
impl WireMeshCounts {
    pub fn new(points: usize, cells: usize) -> Self {
        Self {
            points_le: (points as u64).to_le(),
            cells_le: (cells as u64).to_le(),
        }
    }
    pub fn points(&self) -> usize {
        u64::from_le(self.points_le) as usize
    }
    pub fn cells(&self) -> usize {
        u64::from_le(self.cells_le) as usize
    }
}

// ===== Partition oracle ===================================================

/// Per-cell summary shared by the k-d oracle: centroid and bounding box,
/// each `f64` carried as its little-endian bit pattern.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCellRecord {
    pub centroid_le: [u64; 3],
    pub min_le: [u64; 3],
    pub max_le: [u64; 3],
}
impl WireCellRecord {
    pub fn new(centroid: [f64; 3], min: [f64; 3], max: [f64; 3]) -> Self {
        let enc = |v: [f64; 3]| v.map(|x| x.to_bits().to_le());
        Self {
            centroid_le: enc(centroid),
            min_le: enc(min),
            max_le: enc(max),
        }
    }
    fn dec(v: [u64; 3]) -> [f64; 3] {
        v.map(|x| f64::from_bits(u64::from_le(x)))
    }
    pub fn centroid(&self) -> [f64; 3] {
        Self::dec(self.centroid_le)
    }
    pub fn min(&self) -> [f64; 3] {
        Self::dec(self.min_le)
    }
    pub fn max(&self) -> [f64; 3] {
        Self::dec(self.max_le)
    }
}

// ===== Compile-time sanity checks =========================================

const_assert_eq!(size_of::<WireHdr>(), WireHdr::SIZE);
const_assert_eq!(size_of::<WireCount>(), 4);
const_assert_eq!(size_of::<WireLen>(), 8);
const_assert_eq!(size_of::<WireSizes>(), 24);
const_assert_eq!(size_of::<WireMeshCounts>(), 16);
const_assert_eq!(size_of::<WireCellRecord>(), 72);
const_assert_eq!(align_of::<WireSizes>(), 8);
