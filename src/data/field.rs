//! Typed field arrays attached to mesh points or cells.
//!
//! A [`FieldArray`] is a named, fixed-width tuple array whose scalar type is
//! one of the [`ScalarType`] tags. [`FieldData`] keeps arrays in insertion
//! order; that order is part of the dataset's identity and is preserved by
//! extraction, serialization and merging.

use crate::mesh_error::MeshError;
use num_traits::{NumCast, ToPrimitive};
use serde::{Deserialize, Serialize};

/// Scalar type tag for field arrays.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    F64,
    F32,
    I32,
    I64,
    U32,
    U64,
}

impl ScalarType {
    /// Returns a stable string label for the scalar type.
    pub fn as_str(self) -> &'static str {
        match self {
            ScalarType::F64 => "f64",
            ScalarType::F32 => "f32",
            ScalarType::I32 => "i32",
            ScalarType::I64 => "i64",
            ScalarType::U32 => "u32",
            ScalarType::U64 => "u64",
        }
    }

    /// Integer types may serve as global point ids.
    pub fn is_integral(self) -> bool {
        !matches!(self, ScalarType::F64 | ScalarType::F32)
    }
}

/// Flat value storage, `components` values per tuple.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValues {
    F64(Vec<f64>),
    F32(Vec<f32>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U32(Vec<u32>),
    U64(Vec<u64>),
}

/// Apply an expression to the inner vector and rewrap it in the same variant.
macro_rules! map_values {
    ($value:expr, $v:ident => $body:expr) => {
        match $value {
            FieldValues::F64($v) => FieldValues::F64($body),
            FieldValues::F32($v) => FieldValues::F32($body),
            FieldValues::I32($v) => FieldValues::I32($body),
            FieldValues::I64($v) => FieldValues::I64($body),
            FieldValues::U32($v) => FieldValues::U32($body),
            FieldValues::U64($v) => FieldValues::U64($body),
        }
    };
}

/// Run an expression over the inner vector, whatever its scalar type.
macro_rules! with_values {
    ($value:expr, $v:ident => $body:expr) => {
        match $value {
            FieldValues::F64($v) => $body,
            FieldValues::F32($v) => $body,
            FieldValues::I32($v) => $body,
            FieldValues::I64($v) => $body,
            FieldValues::U32($v) => $body,
            FieldValues::U64($v) => $body,
        }
    };
}

/// Pair a destination with a source of the same scalar type.
macro_rules! zip_values {
    ($dst:expr, $src:expr, ($d:ident, $s:ident) => $body:expr) => {
        match ($dst, $src) {
            (FieldValues::F64($d), FieldValues::F64($s)) => Ok($body),
            (FieldValues::F32($d), FieldValues::F32($s)) => Ok($body),
            (FieldValues::I32($d), FieldValues::I32($s)) => Ok($body),
            (FieldValues::I64($d), FieldValues::I64($s)) => Ok($body),
            (FieldValues::U32($d), FieldValues::U32($s)) => Ok($body),
            (FieldValues::U64($d), FieldValues::U64($s)) => Ok($body),
            (d, s) => Err((d.scalar_type(), s.scalar_type())),
        }
    };
}

type TypePair = (ScalarType, ScalarType);

impl FieldValues {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            FieldValues::F64(_) => ScalarType::F64,
            FieldValues::F32(_) => ScalarType::F32,
            FieldValues::I32(_) => ScalarType::I32,
            FieldValues::I64(_) => ScalarType::I64,
            FieldValues::U32(_) => ScalarType::U32,
            FieldValues::U64(_) => ScalarType::U64,
        }
    }

    /// Total number of scalar values (not tuples).
    pub fn len(&self) -> usize {
        with_values!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Same scalar type, no values.
    pub fn empty_like(&self) -> Self {
        map_values!(self, _v => Vec::new())
    }

    pub fn reserve(&mut self, additional: usize) {
        with_values!(self, v => v.reserve(additional))
    }

    pub fn shrink_to_fit(&mut self) {
        with_values!(self, v => v.shrink_to_fit())
    }

    /// Select tuples by index, in the order given.
    pub fn gather(&self, tuples: &[usize], components: usize) -> Self {
        map_values!(self, v => {
            let mut out = Vec::with_capacity(tuples.len() * components);
            for &t in tuples {
                out.extend_from_slice(&v[t * components..(t + 1) * components]);
            }
            out
        })
    }

    fn push_tuple_from(
        &mut self,
        src: &FieldValues,
        tuple: usize,
        components: usize,
    ) -> Result<(), TypePair> {
        zip_values!(self, src, (d, s) => {
            d.extend_from_slice(&s[tuple * components..(tuple + 1) * components])
        })
    }

    fn extend_from(&mut self, src: &FieldValues) -> Result<(), TypePair> {
        zip_values!(self, src, (d, s) => d.extend_from_slice(s))
    }

    fn push_weighted_from(
        &mut self,
        src: &FieldValues,
        weights: &[(usize, f64)],
        components: usize,
    ) -> Result<(), TypePair> {
        let integral = self.scalar_type().is_integral();
        zip_values!(self, src, (d, s) => push_interpolated(d, s, weights, components, integral))
    }

    /// Value of a single-component integer array as a point key.
    ///
    /// The reserved marker of every integer type (`-1`, or all ones when
    /// unsigned) maps to [`UNASSIGNED_ID`].
    pub fn key_at(&self, index: usize) -> Option<u64> {
        match self {
            FieldValues::I32(v) => v.get(index).map(|&x| x as i64 as u64),
            FieldValues::I64(v) => v.get(index).map(|&x| x as u64),
            FieldValues::U32(v) => v
                .get(index)
                .map(|&x| if x == u32::MAX { UNASSIGNED_ID } else { x as u64 }),
            FieldValues::U64(v) => v.get(index).copied(),
            FieldValues::F64(_) | FieldValues::F32(_) => None,
        }
    }

    /// Overwrite the last tuple with the unassigned marker. No-op for
    /// floating point data.
    fn unassign_last(&mut self, components: usize) {
        fn tail<T>(v: &mut [T], components: usize) -> &mut [T] {
            let start = v.len().saturating_sub(components);
            &mut v[start..]
        }
        match self {
            FieldValues::I32(v) => tail(v.as_mut_slice(), components).fill(-1),
            FieldValues::I64(v) => tail(v.as_mut_slice(), components).fill(-1),
            FieldValues::U32(v) => tail(v.as_mut_slice(), components).fill(u32::MAX),
            FieldValues::U64(v) => tail(v.as_mut_slice(), components).fill(u64::MAX),
            FieldValues::F64(_) | FieldValues::F32(_) => {}
        }
    }
}

/// Point key of a global id that was never assigned, e.g. on a point
/// created by clipping. Such points are merged by position instead.
pub const UNASSIGNED_ID: u64 = u64::MAX;

/// Append one tuple blended from `weights`: a weighted sum for floating point
/// data, the value of the heaviest source for integers.
fn push_interpolated<T>(
    dst: &mut Vec<T>,
    src: &[T],
    weights: &[(usize, f64)],
    components: usize,
    integral: bool,
) where
    T: Copy + ToPrimitive + NumCast,
{
    let Some(&(heaviest, _)) = weights
        .iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
    else {
        return;
    };
    for k in 0..components {
        let nearest = src[heaviest * components + k];
        if integral {
            dst.push(nearest);
            continue;
        }
        let blended: f64 = weights
            .iter()
            .map(|&(t, w)| src[t * components + k].to_f64().unwrap_or(0.0) * w)
            .sum();
        dst.push(NumCast::from(blended).unwrap_or(nearest));
    }
}

/// Name, width and scalar type of a field array.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub components: usize,
    pub scalar: ScalarType,
}

/// A named array of fixed-width tuples.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldArray {
    name: String,
    components: usize,
    values: FieldValues,
}

impl FieldArray {
    /// Wrap `values` as `components`-wide tuples.
    pub fn new(
        name: impl Into<String>,
        components: usize,
        values: FieldValues,
    ) -> Result<Self, MeshError> {
        let name = name.into();
        if components == 0 {
            return Err(MeshError::InvalidMesh(format!(
                "field array `{name}` must have at least one component"
            )));
        }
        if values.len() % components != 0 {
            return Err(MeshError::InvalidMesh(format!(
                "field array `{name}` has {} values, not a multiple of {components}",
                values.len()
            )));
        }
        Ok(Self {
            name,
            components,
            values,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn components(&self) -> usize {
        self.components
    }

    #[inline]
    pub fn values(&self) -> &FieldValues {
        &self.values
    }

    #[inline]
    pub fn num_tuples(&self) -> usize {
        self.values.len() / self.components
    }

    #[inline]
    pub fn scalar_type(&self) -> ScalarType {
        self.values.scalar_type()
    }

    pub fn schema(&self) -> FieldSchema {
        FieldSchema {
            name: self.name.clone(),
            components: self.components,
            scalar: self.scalar_type(),
        }
    }

    /// Same name and layout, no tuples.
    pub fn empty_like(&self) -> Self {
        Self {
            name: self.name.clone(),
            components: self.components,
            values: self.values.empty_like(),
        }
    }

    /// Global id stored at `tuple`, if this array can act as a point key.
    pub fn global_id(&self, tuple: usize) -> Option<u64> {
        if self.components != 1 {
            return None;
        }
        self.values.key_at(tuple)
    }

    fn mismatch(&self, (dst, src): TypePair) -> MeshError {
        MeshError::SchemaMismatch {
            name: self.name.clone(),
            reason: format!("scalar type {} vs {}", dst.as_str(), src.as_str()),
        }
    }
}

/// Ordered collection of field arrays over one entity kind (points or cells).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldData {
    arrays: Vec<FieldArray>,
}

impl FieldData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an array; names must be unique.
    pub fn add(&mut self, array: FieldArray) -> Result<(), MeshError> {
        if self.get(array.name()).is_some() {
            return Err(MeshError::InvalidMesh(format!(
                "duplicate field array `{}`",
                array.name()
            )));
        }
        self.arrays.push(array);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FieldArray> {
        self.arrays.iter().find(|a| a.name == name)
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldArray> {
        self.arrays.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.arrays.iter().map(|a| a.name())
    }

    pub fn schema(&self) -> Vec<FieldSchema> {
        self.arrays.iter().map(FieldArray::schema).collect()
    }

    pub fn empty_like(&self) -> Self {
        Self {
            arrays: self.arrays.iter().map(FieldArray::empty_like).collect(),
        }
    }

    /// Reserve room for `tuples` more tuples in every array.
    pub fn reserve(&mut self, tuples: usize) {
        for a in &mut self.arrays {
            a.values.reserve(tuples * a.components);
        }
    }

    pub fn shrink_to_fit(&mut self) {
        for a in &mut self.arrays {
            a.values.shrink_to_fit();
        }
    }

    /// Restrict every array to `tuples`, preserving array order.
    pub fn gather(&self, tuples: &[usize]) -> Self {
        Self {
            arrays: self
                .arrays
                .iter()
                .map(|a| FieldArray {
                    name: a.name.clone(),
                    components: a.components,
                    values: a.values.gather(tuples, a.components),
                })
                .collect(),
        }
    }

    /// Every array must hold exactly `expected` tuples.
    pub fn validate(&self, expected: usize, entity: &str) -> Result<(), MeshError> {
        for a in &self.arrays {
            if a.num_tuples() != expected {
                return Err(MeshError::InvalidMesh(format!(
                    "{entity} array `{}` has {} tuples, expected {expected}",
                    a.name,
                    a.num_tuples()
                )));
            }
        }
        Ok(())
    }

    /// Map each of our arrays to the index of the same-named array in `src`.
    ///
    /// Both sides must carry the same set of names with identical component
    /// counts and scalar types; order may differ.
    pub fn match_schema(&self, src: &FieldData) -> Result<Vec<usize>, MeshError> {
        if self.arrays.len() != src.arrays.len() {
            let extra = src
                .names()
                .find(|n| self.get(n).is_none())
                .or_else(|| self.names().find(|n| src.get(n).is_none()))
                .unwrap_or_default()
                .to_string();
            return Err(MeshError::SchemaMismatch {
                name: extra,
                reason: format!(
                    "expected {} arrays, got {}",
                    self.arrays.len(),
                    src.arrays.len()
                ),
            });
        }
        self.arrays
            .iter()
            .map(|dst| {
                let idx = src
                    .arrays
                    .iter()
                    .position(|s| s.name == dst.name)
                    .ok_or_else(|| MeshError::SchemaMismatch {
                        name: dst.name.clone(),
                        reason: "missing from merged dataset".into(),
                    })?;
                let s = &src.arrays[idx];
                if s.components != dst.components {
                    return Err(MeshError::SchemaMismatch {
                        name: dst.name.clone(),
                        reason: format!(
                            "{} components vs {}",
                            dst.components, s.components
                        ),
                    });
                }
                if s.scalar_type() != dst.scalar_type() {
                    return Err(dst.mismatch((dst.scalar_type(), s.scalar_type())));
                }
                Ok(idx)
            })
            .collect()
    }

    /// Identity mapping for data sharing our schema.
    pub fn identity_map(&self) -> Vec<usize> {
        (0..self.arrays.len()).collect()
    }

    /// Append tuple `tuple` of every mapped source array.
    pub fn push_tuple_mapped(
        &mut self,
        src: &FieldData,
        map: &[usize],
        tuple: usize,
    ) -> Result<(), MeshError> {
        for (dst, &si) in self.arrays.iter_mut().zip(map) {
            let s = &src.arrays[si];
            let components = dst.components;
            let r = dst.values.push_tuple_from(&s.values, tuple, components);
            r.map_err(|pair| dst.mismatch(pair))?;
        }
        Ok(())
    }

    /// Append all tuples of every mapped source array.
    pub fn extend_mapped(&mut self, src: &FieldData, map: &[usize]) -> Result<(), MeshError> {
        for (dst, &si) in self.arrays.iter_mut().zip(map) {
            let r = dst.values.extend_from(&src.arrays[si].values);
            r.map_err(|pair| dst.mismatch(pair))?;
        }
        Ok(())
    }

    /// Mark the last tuple of array `name` as carrying no global id.
    pub fn unassign_last(&mut self, name: &str) {
        if let Some(a) = self.arrays.iter_mut().find(|a| a.name == name) {
            let components = a.components;
            a.values.unassign_last(components);
        }
    }

    /// Append one tuple interpolated from weighted source tuples.
    pub fn push_weighted_mapped(
        &mut self,
        src: &FieldData,
        map: &[usize],
        weights: &[(usize, f64)],
    ) -> Result<(), MeshError> {
        for (dst, &si) in self.arrays.iter_mut().zip(map) {
            let components = dst.components;
            let r = dst
                .values
                .push_weighted_from(&src.arrays[si].values, weights, components);
            r.map_err(|pair| dst.mismatch(pair))?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a FieldData {
    type Item = &'a FieldArray;
    type IntoIter = std::slice::Iter<'a, FieldArray>;

    fn into_iter(self) -> Self::IntoIter {
        self.arrays.iter()
    }
}
