//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use log::debug;
use smallvec::smallvec;

use crate::Result;
use crate::dtype::DType;
use crate::kernel::{
	BinaryVariant, KernelName, KernelParams, KernelRegistry, ParamLayout, StridedParams, Weights,
};
use crate::op::BinaryOp;
use crate::plan::{BufferRole, DispatchPlan, DispatchPolicy, Step};
use crate::shape::Shape;

//--------------------------------------------------------------------------------------------------

/// One operand of a step: its shape and where its buffer comes from.
#[derive(Debug, Copy, Clone)]
pub struct Operand<'a> {
	pub shape: &'a Shape,
	pub role: BufferRole,
}

impl<'a> Operand<'a> {
	pub fn new(shape: &'a Shape, role: BufferRole) -> Self {
		Self { shape, role }
	}
}

//--------------------------------------------------------------------------------------------------

pub struct BinaryDispatchPlanner<'a> {
	registry: &'a KernelRegistry,
	policy: DispatchPolicy,
}

impl<'a> BinaryDispatchPlanner<'a> {
	pub fn new(registry: &'a KernelRegistry, policy: DispatchPolicy) -> Self {
		Self { registry, policy }
	}

	/// Picks the cheapest variant that can compute `o = op(x, y)`.
	pub fn select_variant(&self, x: &Shape, y: &Shape, o: &Shape) -> BinaryVariant {
		if x == o {
			if self.policy.scalar_fast_path && y.is_single_element() {
				return BinaryVariant::Scalar;
			}
			if self.policy.same_shape_fast_path && y == o {
				return BinaryVariant::Broadcast;
			}
		}
		BinaryVariant::Elementwise
	}

	pub fn params(
		variant: BinaryVariant,
		x: &Shape,
		y: &Shape,
		o: &Shape,
		weights: Option<Weights>,
	) -> KernelParams {
		let layout = match variant {
			BinaryVariant::Scalar | BinaryVariant::Broadcast => ParamLayout::Flat,
			BinaryVariant::Elementwise => ParamLayout::Strided(Box::new(StridedParams::new(o, x, y))),
		};
		KernelParams { elems: o.elems(), layout, weights }
	}

	/// Builds the launch computing `o = op(x, y)`.
	///
	/// Fails with `KernelNotFound` if the registry has no kernel for the chosen variant.
	pub fn step(
		&self,
		op: BinaryOp,
		dtype: DType,
		x: Operand,
		y: Operand,
		o: Operand,
		weights: Option<Weights>,
	) -> Result<Step> {
		debug_assert!(op.is_weighted() == weights.is_some());
		let variant = self.select_variant(x.shape, y.shape, o.shape);
		let kernel = self.registry.find(&KernelName::binary(variant, op, dtype))?;
		Ok(Step {
			kernel,
			inputs: smallvec![x.role, y.role],
			output: o.role,
			params: Self::params(variant, x.shape, y.shape, o.shape, weights),
		})
	}

	/// Plans `op(x, y)` with the output shape given by broadcasting.
	pub fn plan(&self, op: BinaryOp, dtype: DType, x: &Shape, y: &Shape) -> Result<DispatchPlan> {
		let o = Shape::broadcast(&[x, y])?;
		let mut plan = DispatchPlan::empty(dtype, 2, o);
		if plan.output_shape.has_zero_dims() {
			debug!("{op:?}: output {} is empty, nothing to dispatch", plan.output_shape);
			return Ok(plan);
		}
		// a two-operand mean is a fold of two
		let weights = op.is_weighted().then_some(Weights { alpha: 0.5, beta: 0.5 });
		let step = self.step(
			op,
			dtype,
			Operand::new(x, BufferRole::Input(0)),
			Operand::new(y, BufferRole::Input(1)),
			Operand::new(&plan.output_shape, BufferRole::Output),
			weights,
		)?;
		debug!("{op:?}: {x} x {y} -> {} via {}", plan.output_shape, step.kernel.name);
		plan.steps.push(step);
		Ok(plan)
	}
}

//--------------------------------------------------------------------------------------------------


//--------------------------------------------------------------------------------------------------
