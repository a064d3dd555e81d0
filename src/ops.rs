//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use smallvec::SmallVec;

use crate::Result;
use crate::device::{self, Device};
use crate::dtype::DType;
use crate::error::{ErrPack, PlanError};
use crate::op::{BinaryOp, FoldOp, ReduceOp};
use crate::plan::{AxisFusionReducer, BinaryDispatchPlanner, VariadicFoldPlanner};
use crate::shape::{DimIndex, Shape};
use crate::tensor::Tensor;
use crate::util::cold_path;


//--------------------------------------------------------------------------------------------------

fn common_dtype(tensors: &[&Tensor]) -> Result<Option<DType>> {
	let Some((first, rest)) = tensors.split_first() else {
		return Ok(None);
	};
	let dtype = first.dtype();
	if let Some(other) = rest.iter().find(|t| t.dtype() != dtype) {
		cold_path();
		return Err(ErrPack::with_message(
			PlanError::DTypeMismatch,
			format!("cannot combine {dtype} and {} tensors", other.dtype()),
		));
	}
	Ok(Some(dtype))
}

/// `op(a, b)` with NumPy broadcasting.
pub fn binary(device: &dyn Device, op: BinaryOp, a: &Tensor, b: &Tensor) -> Result<Tensor> {
	let dtype = common_dtype(&[a, b])?.unwrap_or(a.dtype());
	let planner = BinaryDispatchPlanner::new(device.kernels(), device.policy());
	let plan = planner.plan(op, dtype, a.shape(), b.shape())?;
	device::execute(device, &plan, &[a, b])
}

/// Folds `operands` left to right. The result has the broadcast shape of all operands.
pub fn fold(device: &dyn Device, op: FoldOp, operands: &[&Tensor]) -> Result<Tensor> {
	let Some(dtype) = common_dtype(operands)? else {
		cold_path();
		return Err(ErrPack::with_message(
			PlanError::EmptyOperandList,
			format!("{op:?} needs at least one operand"),
		));
	};
	let shapes: SmallVec<[&Shape; 8]> = operands.iter().map(|t| t.shape()).collect();
	let planner = VariadicFoldPlanner::new(device.kernels(), device.policy());
	let plan = planner.plan(op, dtype, &shapes)?;
	device::execute(device, &plan, operands)
}

/// Reduces `x` over `axes`. An empty axis list reduces every element.
pub fn reduce<I: DimIndex>(
	device: &dyn Device,
	op: ReduceOp,
	x: &Tensor,
	axes: &[I],
	keepdim: bool,
) -> Result<Tensor> {
	let reducer = AxisFusionReducer::new(device.kernels());
	let plan = reducer.plan(op, x.dtype(), x.shape(), axes, keepdim)?;
	device::execute(device, &plan, &[x])
}

//--------------------------------------------------------------------------------------------------
