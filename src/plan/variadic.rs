//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use log::debug;
use thin_vec::thin_vec;

use crate::Result;
use crate::dtype::DType;
use crate::error::{ErrPack, PlanError};
use crate::kernel::KernelRegistry;
use crate::op::FoldOp;
use crate::plan::binary::{BinaryDispatchPlanner, Operand};
use crate::plan::{BufferRole, DispatchPlan, DispatchPolicy, PlanResult};
use crate::shape::Shape;
use crate::util::cold_path;

//--------------------------------------------------------------------------------------------------

/// Folds any number of operands with one binary operator.
///
/// Intermediate results ping-pong between the output buffer and a single scratch
/// buffer shaped like the output. The direction of the first fold is chosen so that
/// the last fold always writes the output.
pub struct VariadicFoldPlanner<'a> {
	binary: BinaryDispatchPlanner<'a>,
}

impl<'a> VariadicFoldPlanner<'a> {
	pub fn new(registry: &'a KernelRegistry, policy: DispatchPolicy) -> Self {
		Self { binary: BinaryDispatchPlanner::new(registry, policy) }
	}

	/// Destination of fold number `fold` when folding `operands` operands.
	///
	/// Counting back from the last fold, which writes `Output`, destinations alternate.
	pub fn destination(fold: usize, operands: usize) -> BufferRole {
		let folds_after = operands - 2 - fold;
		if folds_after % 2 == 0 { BufferRole::Output } else { BufferRole::Scratch(0) }
	}

	pub fn plan(&self, op: FoldOp, dtype: DType, operands: &[&Shape]) -> Result<DispatchPlan> {
		let n = operands.len();
		if n == 0 {
			cold_path();
			return Err(ErrPack::with_message(
				PlanError::EmptyOperandList,
				format!("{op:?} needs at least one operand"),
			));
		}

		let o = Shape::broadcast(operands)?;
		let mut plan = DispatchPlan::empty(dtype, n, o);
		if plan.output_shape.has_zero_dims() {
			debug!("{op:?}: output {} is empty, nothing to dispatch", plan.output_shape);
			return Ok(plan);
		}
		if n == 1 {
			plan.result = PlanResult::PassThrough(0);
			return Ok(plan);
		}
		if n > 2 {
			plan.temps = thin_vec![plan.output_shape.clone()];
		}

		let o = &plan.output_shape;
		let mut cur_x = Operand::new(operands[0], BufferRole::Input(0));
		for (fold, &y) in operands[1..].iter().enumerate() {
			let cur_o = Operand::new(o, Self::destination(fold, n));
			let step = self.binary.step(
				op.binary_op(),
				dtype,
				cur_x,
				Operand::new(y, BufferRole::Input(fold + 1)),
				cur_o,
				op.weights(fold, n),
			)?;
			plan.steps.push(step);
			cur_x = cur_o;
		}
		debug_assert!(cur_x.role == BufferRole::Output);

		debug!(
			"{op:?}: {n} operands -> {}, {} launches, {} scratch",
			plan.output_shape,
			plan.launches(),
			plan.temps.len()
		);
		Ok(plan)
	}
}

//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::device::Device;
	use crate::device::cpu::CPUDevice;
	use crate::kernel::ParamLayout;

	#[test]
	fn last_fold_writes_output() -> Result<()> {
		let dev = CPUDevice::new();
		let planner = VariadicFoldPlanner::new(dev.kernels(), DispatchPolicy::default());
		let s = Shape::from([2, 2]);
		for n in 2..=7 {
			let operands = vec![&s; n];
			let plan = planner.plan(FoldOp::Max, DType::Float, &operands)?;
			assert_eq!(plan.launches(), n - 1);
			assert_eq!(plan.temps.len(), usize::from(n > 2));
			let last = plan.steps.last().map(|step| step.output);
			assert_eq!(last, Some(BufferRole::Output));

			// every fold reads what the previous one wrote and writes the other buffer
			for pair in plan.steps.windows(2) {
				assert_eq!(pair[1].inputs[0], pair[0].output);
				assert_ne!(pair[1].output, pair[0].output);
			}
			for (i, step) in plan.steps.iter().enumerate() {
				assert_eq!(step.inputs[1], BufferRole::Input(i + 1));
				assert!(!step.inputs.contains(&step.output));
			}
		}
		Ok(())
	}

	#[test]
	fn first_destination_depends_on_parity() {
		assert_eq!(VariadicFoldPlanner::destination(0, 2), BufferRole::Output);
		assert_eq!(VariadicFoldPlanner::destination(0, 3), BufferRole::Scratch(0));
		assert_eq!(VariadicFoldPlanner::destination(1, 3), BufferRole::Output);
		assert_eq!(VariadicFoldPlanner::destination(0, 4), BufferRole::Output);
		assert_eq!(VariadicFoldPlanner::destination(1, 4), BufferRole::Scratch(0));
		assert_eq!(VariadicFoldPlanner::destination(2, 4), BufferRole::Output);
	}

	#[test]
	fn mean_binds_weights() -> Result<()> {
		let dev = CPUDevice::new();
		let planner = VariadicFoldPlanner::new(dev.kernels(), DispatchPolicy::default());
		let a = Shape::from([3]);
		let b = Shape::from([2, 3]);
		let plan = planner.plan(FoldOp::Mean, DType::Float, &[&a, &b, &b, &a])?;
		assert_eq!(plan.output_shape, b);
		let names: Vec<_> = plan.steps.iter().map(|s| s.kernel.name.as_str()).collect();
		// the first fold has to broadcast `a`, later ones combine full-size tensors
		// except for the last, where `a` is broadcast again
		assert_eq!(names, ["ElementwiseMeanFloat", "BroadcastMeanFloat", "ElementwiseMeanFloat"]);
		let weights: Vec<_> = plan.steps.iter().filter_map(|s| s.params.weights).collect();
		assert_eq!(weights.len(), 3);
		assert_eq!((weights[0].alpha, weights[0].beta), (0.25, 0.25));
		assert_eq!((weights[1].alpha, weights[1].beta), (1.0, 0.25));
		assert_eq!((weights[2].alpha, weights[2].beta), (1.0, 0.25));
		assert!(matches!(plan.steps[1].params.layout, ParamLayout::Flat));
		Ok(())
	}

	#[test]
	fn degenerate_and_trivial_cases() -> Result<()> {
		let dev = CPUDevice::new();
		let planner = VariadicFoldPlanner::new(dev.kernels(), DispatchPolicy::default());
		let s = Shape::from([4]);
		let plan = planner.plan(FoldOp::Sum, DType::Float, &[&s])?;
		assert_eq!(plan.result, PlanResult::PassThrough(0));
		assert_eq!(plan.launches(), 0);

		let empty = Shape::from([0, 4]);
		let plan = planner.plan(FoldOp::Sum, DType::Float, &[&s, &empty, &s])?;
		assert_eq!(plan.output_shape, empty);
		assert_eq!(plan.launches(), 0);
		assert!(plan.temps.is_empty());

		let err = planner.plan(FoldOp::Min, DType::Float, &[]).unwrap_err();
		assert_eq!(err.code, PlanError::EmptyOperandList);

		let err = planner.plan(FoldOp::Mean, DType::Int, &[&s, &s]).unwrap_err();
		assert_eq!(err.code, PlanError::KernelNotFound);
		Ok(())
	}
}

//--------------------------------------------------------------------------------------------------
