//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use smallvec::SmallVec;

use crate::shape::{MAX_RANK, Shape};

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Weights {
	/// Weight of the running accumulator (the `X` input).
	pub alpha: f64,

	/// Weight of the newly folded operand (the `Y` input).
	pub beta: f64,
}

/// Parameters of a general-strided elementwise call.
///
/// All arrays are padded to `MAX_RANK` axes. The kernel walks axes
/// `rank + 1 .. MAX_RANK`, decomposes each linear output index over `shape_o` and
/// projects the coordinates on `strides_x` and `strides_y`. An axis where
/// `shape_x` (or `shape_y`) is 1 does not advance that input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StridedParams {
	pub shape_o: [usize; MAX_RANK],
	pub strides_o: [usize; MAX_RANK],
	pub shape_x: [usize; MAX_RANK],
	pub strides_x: [usize; MAX_RANK],
	pub shape_y: [usize; MAX_RANK],
	pub strides_y: [usize; MAX_RANK],

	/// Index of the last padding axis, `MAX_RANK - 1 - ndim(O)`.
	/// It is -1 when the output uses all `MAX_RANK` axes.
	pub rank: isize,
}

impl StridedParams {
	pub fn new(o: &Shape, x: &Shape, y: &Shape) -> Self {
		Self {
			shape_o: o.padded_dims(),
			strides_o: o.padded_strides(),
			shape_x: x.padded_dims(),
			strides_x: x.padded_strides(),
			shape_y: y.padded_dims(),
			strides_y: y.padded_strides(),
			rank: MAX_RANK as isize - 1 - o.ndim() as isize,
		}
	}

	/// First axis the kernel has to iterate over.
	#[allow(clippy::cast_sign_loss)]
	pub fn first_axis(&self) -> usize {
		(self.rank + 1) as usize
	}
}

/// A reduction launch sees its input as `[outer, reduce_length, inner_length]`
/// and collapses the middle axis.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReduceParams {
	pub inner_length: usize,
	pub reduce_length: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamLayout {
	/// Scalar and same-shape variants need nothing but the element count.
	Flat,
	Strided(Box<StridedParams>),
	Reduce(ReduceParams),
}

#[derive(Debug, Clone, PartialEq)]
pub struct KernelParams {
	/// Number of output elements the launch produces.
	pub elems: usize,
	pub layout: ParamLayout,
	pub weights: Option<Weights>,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ParamValue<'a> {
	Count(usize),
	Rank(isize),
	Dims(&'a [usize; MAX_RANK]),
	Scalar(f64),
}

impl KernelParams {
	/// The parameters under the names kernels bind them by.
	pub fn bindings(&self) -> SmallVec<[(&'static str, ParamValue<'_>); 10]> {
		let mut result = SmallVec::new();
		result.push(("count", ParamValue::Count(self.elems)));
		match &self.layout {
			ParamLayout::Flat => {},
			ParamLayout::Strided(s) => {
				result.push(("shapeO", ParamValue::Dims(&s.shape_o)));
				result.push(("stridesO", ParamValue::Dims(&s.strides_o)));
				result.push(("shapeX", ParamValue::Dims(&s.shape_x)));
				result.push(("stridesX", ParamValue::Dims(&s.strides_x)));
				result.push(("shapeY", ParamValue::Dims(&s.shape_y)));
				result.push(("stridesY", ParamValue::Dims(&s.strides_y)));
				result.push(("rank", ParamValue::Rank(s.rank)));
			},
			ParamLayout::Reduce(r) => {
				result.push(("innerLength", ParamValue::Count(r.inner_length)));
				result.push(("reduceLength", ParamValue::Count(r.reduce_length)));
			},
		}
		if let Some(w) = self.weights {
			result.push(("alpha", ParamValue::Scalar(w.alpha)));
			result.push(("beta", ParamValue::Scalar(w.beta)));
		}
		result
	}
}

//--------------------------------------------------------------------------------------------------


//--------------------------------------------------------------------------------------------------
