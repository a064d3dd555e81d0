//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::rc::Rc;

use log::trace;
use smallvec::SmallVec;

use crate::Result;
use crate::dtype::DType;
use crate::error::{ErrPack, PlanError};
use crate::kernel::{KernelData, KernelParams, KernelRegistry};
use crate::plan::{BufferRole, DispatchPlan, DispatchPolicy, PlanResult};
use crate::shape::Shape;
use crate::tensor::{Residency, Tensor};
use crate::util::cold_path;

pub mod cpu;

//--------------------------------------------------------------------------------------------------

/// A compute device as seen by the planners.
///
/// Launches go into one in-order stream. A launch may read anything written by
/// an earlier launch on the same device without further synchronization.
pub trait Device {
	fn name(&self) -> &str;

	fn policy(&self) -> DispatchPolicy;

	fn kernels(&self) -> &KernelRegistry;

	/// Allocates a tensor. `shape` must not have zero-size dimensions.
	fn new_tensor(&self, shape: &Shape, dtype: DType, residency: Residency) -> Result<Tensor>;

	/// A caller-visible result. Degenerate shapes get a tensor without a buffer.
	fn new_output_tensor(&self, shape: &Shape, dtype: DType) -> Result<Tensor> {
		if shape.has_zero_dims() {
			return Ok(Tensor::new_degenerate(shape.clone(), dtype));
		}
		self.new_tensor(shape, dtype, Residency::Persistent)
	}

	/// Scratch memory for one plan. Degenerate shapes get a tensor without a buffer.
	fn new_temp_tensor(&self, shape: &Shape, dtype: DType) -> Result<Tensor> {
		if shape.has_zero_dims() {
			return Ok(Tensor::new_degenerate(shape.clone(), dtype));
		}
		self.new_tensor(shape, dtype, Residency::Temp)
	}

	/// Queues one kernel launch.
	///
	/// The stream keeps `o` and `inputs` alive until the launch has run, so the
	/// caller may drop its handles right after this returns.
	fn enqueue(
		&self,
		kernel: &Rc<KernelData>,
		o: &Tensor,
		inputs: &[&Tensor],
		params: &KernelParams,
	) -> Result<()>;

	/// Waits until every queued launch has run. Reports the first launch that failed.
	fn synchronize(&self) -> Result<()>;
}

//--------------------------------------------------------------------------------------------------

#[cold]
#[inline(never)]
fn err_invalid_binding(message: String) -> ErrPack<PlanError> {
	ErrPack::with_message(PlanError::InvalidBinding, message)
}

fn check_inputs(plan: &DispatchPlan, inputs: &[&Tensor]) -> Result<()> {
	if inputs.len() != plan.input_count {
		cold_path();
		return Err(err_invalid_binding(format!(
			"plan expects {} inputs, got {}",
			plan.input_count,
			inputs.len()
		)));
	}
	for (i, input) in inputs.iter().enumerate() {
		if input.dtype() != plan.dtype {
			cold_path();
			return Err(ErrPack::with_message(
				PlanError::DTypeMismatch,
				format!("input {i} is {}, plan is {}", input.dtype(), plan.dtype),
			));
		}
	}
	Ok(())
}

/// Runs a plan on `device`.
///
/// Temporaries are allocated right before the step that first writes them and
/// released after the step that last touches them.
pub fn execute(device: &dyn Device, plan: &DispatchPlan, inputs: &[&Tensor]) -> Result<Tensor> {
	check_inputs(plan, inputs)?;

	if let PlanResult::PassThrough(i) = plan.result {
		return inputs
			.get(i)
			.map(|&t| t.clone())
			.ok_or_else(|| err_invalid_binding(format!("pass-through of missing input {i}")));
	}
	let output = device.new_output_tensor(&plan.output_shape, plan.dtype)?;
	if output.is_degenerate() {
		return Ok(output);
	}

	let last_use: SmallVec<[Option<usize>; 2]> =
		(0..plan.temps.len()).map(|i| plan.last_use_of_scratch(i)).collect();
	let mut scratch: SmallVec<[Option<Tensor>; 2]> = SmallVec::new();
	scratch.resize(plan.temps.len(), None);

	for (i, step) in plan.steps.iter().enumerate() {
		if let BufferRole::Scratch(s) = step.output {
			let Some(slot) = scratch.get_mut(s) else {
				cold_path();
				return Err(err_invalid_binding(format!("step {i} writes unknown scratch {s}")));
			};
			if slot.is_none() {
				*slot = Some(device.new_temp_tensor(&plan.temps[s], plan.dtype)?);
			}
		}

		// The borrows of `scratch` must end before the release loop below.
		{
			let resolve = |role: BufferRole| -> Result<&Tensor> {
				let tensor = match role {
					BufferRole::Input(j) => inputs.get(j).copied(),
					BufferRole::Scratch(s) => scratch.get(s).and_then(Option::as_ref),
					BufferRole::Output => Some(&output),
				};
				tensor.ok_or_else(|| err_invalid_binding(format!("step {i} uses unbound {role:?}")))
			};
			let o = resolve(step.output)?;
			let step_inputs = step
				.inputs
				.iter()
				.map(|&role| resolve(role))
				.collect::<Result<SmallVec<[_; 2]>>>()?;

			trace!("{}: {step:?} {:?}", device.name(), step.params.layout);
			device.enqueue(&step.kernel, o, &step_inputs, &step.params)?;
		}

		for (s, &last) in last_use.iter().enumerate() {
			if last == Some(i) {
				scratch[s] = None;
			}
		}
	}

	device.synchronize()?;
	Ok(output)
}

//--------------------------------------------------------------------------------------------------
