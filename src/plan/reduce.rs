//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use log::{debug, warn};
use smallvec::{SmallVec, smallvec};

use crate::Result;
use crate::dtype::DType;
use crate::error::{ErrPack, PlanError};
use crate::kernel::{KernelName, KernelParams, KernelRegistry, ParamLayout, ReduceParams};
use crate::op::ReduceOp;
use crate::plan::{BufferRole, DispatchPlan, Step};
use crate::shape::{DimIndex, Shape};
use crate::util::cold_path;

//--------------------------------------------------------------------------------------------------

/// A run of adjacent axes collapsed by one kernel launch.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Window {
	params: ReduceParams,

	/// Shape of the tensor the launch reads.
	source: Shape,

	/// `source` with the window's axes set to 1. This is what the launch writes.
	reduced: Shape,
}

impl Window {
	fn start(source: Shape, axis: usize) -> Self {
		let params = ReduceParams {
			inner_length: source.stride(axis),
			reduce_length: source.dim(axis),
		};
		let reduced = source.with_dim(axis, 1);
		Self { params, source, reduced }
	}

	/// Extends the window by the axis right after its last axis.
	fn fuse(&mut self, axis: usize) {
		let dim = self.source.dim(axis);
		self.params.inner_length /= dim;
		self.params.reduce_length *= dim;
		self.reduced = self.reduced.with_dim(axis, 1);
	}
}

//--------------------------------------------------------------------------------------------------

/// Plans a reduction over a list of axes.
///
/// Axes that follow each other in the list and are adjacent in the source
/// (`axis == prev + 1`) are contiguous in memory, so one launch collapses them all.
/// Wherever that breaks, the launch so far writes a temporary tensor, and the next
/// window is computed against the temporary.
pub struct AxisFusionReducer<'a> {
	registry: &'a KernelRegistry,
}

impl<'a> AxisFusionReducer<'a> {
	pub fn new(registry: &'a KernelRegistry) -> Self {
		Self { registry }
	}

	pub fn plan<I: DimIndex>(
		&self,
		op: ReduceOp,
		dtype: DType,
		source: &Shape,
		axes: &[I],
		keepdim: bool,
	) -> Result<DispatchPlan> {
		let axes = source.resolve_axes(axes)?;
		let output_shape = source.reduce(axes.as_slice(), keepdim)?;

		if axes.is_empty() {
			if source.has_zero_dims() {
				cold_path();
				return Err(err_degenerate_axis(source, None));
			}
		} else if let Some(&axis) = axes.iter().find(|&&axis| source.dim(axis) == 0) {
			cold_path();
			return Err(err_degenerate_axis(source, Some(axis)));
		}

		let mut plan = DispatchPlan::empty(dtype, 1, output_shape);
		if plan.output_shape.has_zero_dims() {
			debug!("{op:?}: output {} is empty, nothing to dispatch", plan.output_shape);
			return Ok(plan);
		}
		if !axes.is_sorted() {
			warn!("{op:?}: axes {:?} are not ascending, fusion only merges them in list order", axes);
		}

		let windows: SmallVec<[Window; 4]> = if axes.is_empty() {
			let all = Window {
				params: ReduceParams { inner_length: 1, reduce_length: source.elems() },
				source: source.clone(),
				reduced: Shape::scalar(),
			};
			smallvec![all]
		} else {
			Self::windows(source, &axes)
		};

		let descriptor = op.descriptor();
		let count = windows.len();
		if count > 1 && op.is_two_pass() {
			debug!(
				"{op:?}: fusion breaks into {count} launches, {:?} first then {:?}",
				descriptor.first, descriptor.middle
			);
		}
		for (i, window) in windows.into_iter().enumerate() {
			let is_first = i == 0;
			let is_last = i + 1 == count;
			let kernel = descriptor.stage(is_first, is_last);
			let kernel = self.registry.find(&KernelName::reduce(kernel, dtype))?;

			let input = if is_first { BufferRole::Input(0) } else { BufferRole::Scratch(i - 1) };
			let output = if is_last {
				BufferRole::Output
			} else {
				plan.temps.push(window.reduced.clone());
				BufferRole::Scratch(i)
			};
			plan.steps.push(Step {
				kernel,
				inputs: smallvec![input],
				output,
				params: KernelParams {
					elems: window.reduced.elems(),
					layout: ParamLayout::Reduce(window.params),
					weights: None,
				},
			});
		}

		debug!(
			"{op:?}: {source} over {:?} -> {}, {} launches, {} temporaries",
			axes.as_slice(),
			plan.output_shape,
			plan.launches(),
			plan.temps.len()
		);
		Ok(plan)
	}

	fn windows(source: &Shape, axes: &[usize]) -> SmallVec<[Window; 4]> {
		let mut result = SmallVec::new();
		let Some((&first, rest)) = axes.split_first() else {
			return result;
		};
		let mut window = Window::start(source.clone(), first);
		let mut prev_axis = first;
		for &axis in rest {
			if axis == prev_axis + 1 {
				window.fuse(axis);
			} else {
				let next_source = window.reduced.clone();
				result.push(window);
				window = Window::start(next_source, axis);
			}
			prev_axis = axis;
		}
		result.push(window);
		result
	}
}

#[cold]
#[inline(never)]
fn err_degenerate_axis(source: &Shape, axis: Option<usize>) -> ErrPack<PlanError> {
	let message = match axis {
		Some(axis) => format!("Cannot reduce axis {axis} of {source}, it has size 0"),
		None => format!("Cannot reduce all elements of {source}, there are none"),
	};
	ErrPack::with_message(PlanError::DegenerateAxis, message)
}

//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::device::Device;
	use crate::device::cpu::CPUDevice;

	fn reduce_params(step: &Step) -> ReduceParams {
		match step.params.layout {
			ParamLayout::Reduce(params) => params,
			_ => panic!("expected reduce params"),
		}
	}

	#[test]
	fn contiguous_axes_fuse_into_one_launch() -> Result<()> {
		let dev = CPUDevice::new();
		let reducer = AxisFusionReducer::new(dev.kernels());
		let source = Shape::from([2, 3, 4, 5, 6]);

		let plan = reducer.plan(ReduceOp::Sum, DType::Float, &source, &[1_usize, 2, 3], false)?;
		assert_eq!(plan.launches(), 1);
		assert!(plan.temps.is_empty());
		assert_eq!(plan.output_shape, Shape::from([2, 6]));
		let params = reduce_params(&plan.steps[0]);
		assert_eq!(params, ReduceParams { inner_length: 6, reduce_length: 60 });
		assert_eq!(plan.steps[0].params.elems, 12);
		Ok(())
	}

	#[test]
	fn broken_contiguity_inserts_temporary() -> Result<()> {
		let dev = CPUDevice::new();
		let reducer = AxisFusionReducer::new(dev.kernels());
		let source = Shape::from([2, 3, 4, 5, 6]);

		let plan = reducer.plan(ReduceOp::Sum, DType::Float, &source, &[0_usize, 1, 4], true)?;
		assert_eq!(plan.launches(), 2);
		assert_eq!(plan.temps.as_slice(), &[Shape::from([1, 1, 4, 5, 6])]);
		assert_eq!(plan.output_shape, Shape::from([1, 1, 4, 5, 1]));

		let first = &plan.steps[0];
		assert_eq!(first.inputs.as_slice(), &[BufferRole::Input(0)]);
		assert_eq!(first.output, BufferRole::Scratch(0));
		assert_eq!(reduce_params(first), ReduceParams { inner_length: 120, reduce_length: 6 });
		assert_eq!(first.params.elems, 120);

		let second = &plan.steps[1];
		assert_eq!(second.inputs.as_slice(), &[BufferRole::Scratch(0)]);
		assert_eq!(second.output, BufferRole::Output);
		assert_eq!(reduce_params(second), ReduceParams { inner_length: 1, reduce_length: 6 });
		assert_eq!(second.params.elems, 20);
		Ok(())
	}

	#[test]
	fn every_break_costs_one_launch() -> Result<()> {
		let dev = CPUDevice::new();
		let reducer = AxisFusionReducer::new(dev.kernels());
		let source = Shape::from([2, 3, 4, 5, 6]);

		let plan = reducer.plan(ReduceOp::Max, DType::Float, &source, &[0_usize, 2, 4], false)?;
		assert_eq!(plan.launches(), 3);
		assert_eq!(
			plan.temps.as_slice(),
			&[Shape::from([1, 3, 4, 5, 6]), Shape::from([1, 3, 1, 5, 6])]
		);
		assert_eq!(plan.output_shape, Shape::from([3, 5]));

		// list order decides, [1, 0] is not fused even though the axes are adjacent
		let plan = reducer.plan(ReduceOp::Max, DType::Float, &source, &[1_usize, 0], false)?;
		assert_eq!(plan.launches(), 2);
		Ok(())
	}

	#[test]
	fn empty_axis_list_reduces_everything() -> Result<()> {
		let dev = CPUDevice::new();
		let reducer = AxisFusionReducer::new(dev.kernels());
		let source = Shape::from([2, 3]);

		let plan = reducer.plan::<usize>(ReduceOp::Sum, DType::Float, &source, &[], true)?;
		assert_eq!(plan.launches(), 1);
		assert_eq!(plan.output_shape, Shape::from([1, 1]));
		assert_eq!(reduce_params(&plan.steps[0]), ReduceParams { inner_length: 1, reduce_length: 6 });
		assert_eq!(plan.steps[0].params.elems, 1);

		let plan = reducer.plan::<usize>(ReduceOp::Sum, DType::Float, &source, &[], false)?;
		assert_eq!(plan.output_shape, Shape::scalar());
		Ok(())
	}

	#[test]
	fn two_pass_operators_switch_kernels_after_first_window() -> Result<()> {
		let dev = CPUDevice::new();
		let reducer = AxisFusionReducer::new(dev.kernels());
		let source = Shape::from([2, 3, 4]);
		let names = |op, axes: &[usize]| -> Result<Vec<String>> {
			let plan = reducer.plan(op, DType::Float, &source, axes, false)?;
			Ok(plan.steps.iter().map(|s| s.kernel.name.to_string()).collect())
		};

		assert_eq!(names(ReduceOp::L2, &[0, 1])?, ["ReduceL2Float"]);
		assert_eq!(names(ReduceOp::L2, &[0, 2])?, ["ReduceSumSquareFloat", "ReduceSumSqrtFloat"]);
		assert_eq!(
			names(ReduceOp::L2, &[2, 0, 1])?,
			["ReduceSumSquareFloat", "ReduceSumSqrtFloat"]
		);
		assert_eq!(names(ReduceOp::L1, &[0, 2])?, ["ReduceL1Float", "ReduceSumFloat"]);
		assert_eq!(
			names(ReduceOp::SumSquare, &[2, 1, 0])?,
			["ReduceSumSquareFloat", "ReduceSumFloat", "ReduceSumFloat"]
		);
		assert_eq!(names(ReduceOp::LogSum, &[0, 2])?, ["ReduceSumFloat", "ReduceLogSumFloat"]);
		assert_eq!(names(ReduceOp::Mean, &[0, 2])?, ["ReduceMeanFloat", "ReduceMeanFloat"]);
		Ok(())
	}

	#[test]
	fn validation_happens_before_planning() {
		let dev = CPUDevice::new();
		let reducer = AxisFusionReducer::new(dev.kernels());
		let source = Shape::from([2, 0, 4]);

		let err = reducer.plan(ReduceOp::Sum, DType::Float, &source, &[1_usize], true).unwrap_err();
		assert_eq!(err.code, PlanError::DegenerateAxis);
		let err = reducer.plan::<usize>(ReduceOp::Sum, DType::Float, &source, &[], true).unwrap_err();
		assert_eq!(err.code, PlanError::DegenerateAxis);
		let err = reducer.plan(ReduceOp::Sum, DType::Float, &source, &[5_usize], true).unwrap_err();
		assert_eq!(err.code, PlanError::AxisOutOfRange);
		let err =
			reducer.plan(ReduceOp::Sum, DType::Float, &source, &[-1_isize, 2], true).unwrap_err();
		assert_eq!(err.code, PlanError::DuplicateAxis);

		// the empty axis is not reduced, so the output is simply empty
		let plan = reducer.plan(ReduceOp::Sum, DType::Float, &source, &[2_usize], false);
		assert!(plan.is_ok_and(|p| p.launches() == 0 && p.output_shape == Shape::from([2, 0])));

		let err = reducer
			.plan(ReduceOp::L2, DType::Int, &Shape::from([3]), &[0_usize], false)
			.unwrap_err();
		assert_eq!(err.code, PlanError::KernelNotFound);
	}
}

//--------------------------------------------------------------------------------------------------
