//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::rc::Rc;

use smallvec::SmallVec;
use thin_vec::ThinVec;

use crate::dtype::DType;
use crate::kernel::{KernelData, KernelParams};
use crate::shape::Shape;

pub mod binary;
pub mod reduce;
pub mod variadic;

pub use binary::BinaryDispatchPlanner;
pub use reduce::AxisFusionReducer;
pub use variadic::VariadicFoldPlanner;

//--------------------------------------------------------------------------------------------------

/// Which fast paths the binary planner may take.
///
/// Turning a fast path off never changes results, only the kernel variant.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DispatchPolicy {
	/// Use `Scalar*` kernels when `Y` is a single element and `X` has the output shape.
	pub scalar_fast_path: bool,

	/// Use `Broadcast*` kernels when `X`, `Y` and the output have the same shape.
	pub same_shape_fast_path: bool,
}

impl DispatchPolicy {
	/// Every launch goes through the general-strided variant.
	pub const fn general_only() -> Self {
		Self {
			scalar_fast_path: false,
			same_shape_fast_path: false,
		}
	}
}

impl Default for DispatchPolicy {
	fn default() -> Self {
		Self {
			scalar_fast_path: true,
			same_shape_fast_path: true,
		}
	}
}

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BufferRole {
	/// Operand `i` as passed by the caller. For a reduction, `Input(0)` is the source.
	Input(usize),

	/// Temporary `i` of the plan, shaped as `DispatchPlan::temps[i]`.
	Scratch(usize),

	/// The caller-visible result.
	Output,
}

pub struct Step {
	pub kernel: Rc<KernelData>,
	pub inputs: SmallVec<[BufferRole; 2]>,
	pub output: BufferRole,
	pub params: KernelParams,
}

impl std::fmt::Debug for Step {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "{}({:?}) -> {:?}", self.kernel.name, self.inputs.as_slice(), self.output)
	}
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PlanResult {
	/// The result is the `Output` buffer.
	Output,

	/// No kernel runs, the result is operand `i` itself.
	PassThrough(usize),
}

/// Ordered kernel launches producing one operation's result.
///
/// Steps are listed in data-dependency order. A step only reads buffers that are
/// either inputs or were written by an earlier step.
#[derive(Debug)]
pub struct DispatchPlan {
	pub dtype: DType,
	pub input_count: usize,
	pub output_shape: Shape,
	pub temps: ThinVec<Shape>,
	pub steps: SmallVec<[Step; 2]>,
	pub result: PlanResult,
}

impl DispatchPlan {
	/// A plan that produces `output_shape` without launching anything.
	/// Used when the output has no elements.
	pub fn empty(dtype: DType, input_count: usize, output_shape: Shape) -> Self {
		Self {
			dtype,
			input_count,
			output_shape,
			temps: ThinVec::new(),
			steps: SmallVec::new(),
			result: PlanResult::Output,
		}
	}

	pub fn launches(&self) -> usize {
		self.steps.len()
	}

	/// Index of the last step that touches scratch buffer `i`.
	pub fn last_use_of_scratch(&self, i: usize) -> Option<usize> {
		let role = BufferRole::Scratch(i);
		self.steps.iter().rposition(|step| step.output == role || step.inputs.contains(&role))
	}
}

//--------------------------------------------------------------------------------------------------
