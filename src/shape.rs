//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use arrayvec::ArrayVec;
use bit_set::BitSet;

use crate::error::{DuplicateAxisError, ErrPack, PlanError, TooManyDimensionsError};
use crate::util::cold_path;

pub mod dim_index;

pub use dim_index::{AxisOutOfRangeError, DimIndex};

//--------------------------------------------------------------------------------------------------

/// Kernels address every tensor through `MAX_RANK` axes.
/// Shapes with fewer dimensions are padded with size-1 axes on the left.
pub const MAX_RANK: usize = 8;

pub type DimVec = ArrayVec<usize, MAX_RANK>;

/// Row-major shape with at most `MAX_RANK` dimensions.
///
/// Strides are not stored. They are derived from the sizes whenever needed,
/// so a `Shape` always describes a contiguous tensor.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
	dims: DimVec,
}

impl Shape {
	pub fn new(dims: &[usize]) -> Result<Self, TooManyDimensionsError> {
		let Ok(dims) = DimVec::try_from(dims) else {
			cold_path();
			return Err(TooManyDimensionsError);
		};
		Ok(Self { dims })
	}

	/// Shape with no dimensions. It has exactly one element.
	pub fn scalar() -> Self {
		Self { dims: DimVec::new() }
	}

	pub fn ndim(&self) -> usize {
		self.dims.len()
	}

	pub fn dims(&self) -> &[usize] {
		&self.dims
	}

	/// `axis` has to be canonical, i.e. in the range `0..ndim`.
	pub fn dim(&self, axis: usize) -> usize {
		self.dims[axis]
	}

	pub fn elems(&self) -> usize {
		self.dims.iter().product()
	}

	pub fn has_zero_dims(&self) -> bool {
		self.dims.contains(&0)
	}

	pub fn is_single_element(&self) -> bool {
		self.elems() == 1
	}

	pub fn axis<I: DimIndex>(&self, index: I) -> Result<usize, AxisOutOfRangeError> {
		index.resolve_index(self.ndim())
	}

	/// Row-major stride of a canonical axis.
	pub fn stride(&self, axis: usize) -> usize {
		self.dims[axis + 1..].iter().product()
	}

	pub fn strides(&self) -> DimVec {
		let mut strides = DimVec::new();
		let mut stride = 1;
		for &dim in self.dims.iter().rev() {
			strides.push(stride);
			stride *= dim;
		}
		strides.reverse();
		strides
	}

	/// Sizes left-padded with 1 to `MAX_RANK` entries.
	pub fn padded_dims(&self) -> [usize; MAX_RANK] {
		let mut padded = [1; MAX_RANK];
		let pad = MAX_RANK - self.ndim();
		padded[pad..].copy_from_slice(&self.dims);
		padded
	}

	/// Row-major strides of `padded_dims()`.
	pub fn padded_strides(&self) -> [usize; MAX_RANK] {
		let dims = self.padded_dims();
		let mut strides = [0; MAX_RANK];
		let mut stride = 1;
		for i in (0..MAX_RANK).rev() {
			strides[i] = stride;
			stride *= dims[i];
		}
		strides
	}

	/// Returns a new shape with one canonical axis resized.
	pub fn with_dim(&self, axis: usize, size: usize) -> Self {
		let mut dims = self.dims.clone();
		dims[axis] = size;
		Self { dims }
	}

	/// Output shape of a reduction over `axes`.
	///
	/// Reduced axes become 1 when `keepdim` is set and disappear otherwise.
	/// An empty axis list reduces the whole tensor.
	pub fn reduce<I: DimIndex>(&self, axes: &[I], keepdim: bool) -> crate::Result<Self> {
		let reduced = self.resolve_axes(axes)?;
		let all = reduced.is_empty();
		let mut dims = DimVec::new();
		for (axis, &dim) in self.dims.iter().enumerate() {
			if all || reduced.contains(&axis) {
				if keepdim {
					dims.push(1);
				}
			} else {
				dims.push(dim);
			}
		}
		Ok(Self { dims })
	}

	/// Resolves possibly negative axis indexes to canonical ones, keeping their order.
	pub fn resolve_axes<I: DimIndex>(&self, axes: &[I]) -> crate::Result<DimVec> {
		let mut seen = BitSet::with_capacity(self.ndim());
		let mut result = DimVec::new();
		for &index in axes {
			let axis = self.axis(index)?;
			if !seen.insert(axis) {
				cold_path();
				return Err(DuplicateAxisError.into());
			}
			result.push(axis);
		}
		Ok(result)
	}

	/// NumPy-style broadcasting of any number of shapes.
	///
	/// Dimensions are aligned at the trailing edge. Each output dimension is the common
	/// size of the operands at that position, where size 1 stretches to match.
	pub fn broadcast(shapes: &[&Self]) -> crate::Result<Self> {
		let ndim = shapes.iter().map(|s| s.ndim()).max().unwrap_or(0);
		let mut rev_dims = DimVec::new();
		for index_from_end in 1..=ndim {
			let mut size = 1;
			for shape in shapes {
				let dim = shape.ndim().checked_sub(index_from_end).map_or(1, |i| shape.dims[i]);
				if dim == 1 || dim == size {
					continue;
				}
				if size != 1 {
					return Err(err_shape_mismatch(shapes));
				}
				size = dim;
			}
			rev_dims.push(size);
		}
		rev_dims.reverse();
		Ok(Self { dims: rev_dims })
	}
}

#[cold]
#[inline(never)]
fn err_shape_mismatch(shapes: &[&Shape]) -> ErrPack<PlanError> {
	let shapes_str = shapes.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
	ErrPack::with_message(
		PlanError::ShapeMismatch,
		format!("Cannot broadcast shapes together: {shapes_str}"),
	)
}

impl std::fmt::Display for Shape {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "[")?;
		for (i, dim) in self.dims.iter().enumerate() {
			if i > 0 {
				write!(f, ", ")?;
			}
			write!(f, "{dim}")?;
		}
		write!(f, "]")
	}
}

impl std::fmt::Debug for Shape {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "Shape{self}")
	}
}

impl<const N: usize> From<[usize; N]> for Shape {
	/// # Panics
	/// If `N > MAX_RANK`. Array literals are a compile-time choice of the caller.
	fn from(dims: [usize; N]) -> Self {
		const { assert!(N <= MAX_RANK) };
		let mut result = DimVec::new();
		result.extend(dims);
		Self { dims: result }
	}
}

//--------------------------------------------------------------------------------------------------


//--------------------------------------------------------------------------------------------------
