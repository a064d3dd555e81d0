//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use crate::Result;
use crate::dtype::DType;
use crate::op::{BinaryOp, ReduceKernel};
use crate::tensor::Tensor;

pub mod params;
pub mod registry;

pub use params::{KernelParams, ParamLayout, ReduceParams, StridedParams, Weights};
pub use registry::{KernelData, KernelRegistry};

//--------------------------------------------------------------------------------------------------

/// The three ways an elementwise binary operator can be launched.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BinaryVariant {
	/// `Y` is a single element kept in a register, `X` and `O` are streamed.
	Scalar,

	/// `X`, `Y` and `O` all have the same shape and are walked in lockstep.
	Broadcast,

	/// General case. Every output index is decomposed and projected on the input strides.
	Elementwise,
}

impl BinaryVariant {
	pub const ALL: [Self; 3] = [Self::Scalar, Self::Broadcast, Self::Elementwise];

	pub const fn prefix(self) -> &'static str {
		match self {
			Self::Scalar => "Scalar",
			Self::Broadcast => "Broadcast",
			Self::Elementwise => "Elementwise",
		}
	}
}

//--------------------------------------------------------------------------------------------------

/// Kernel catalog name.
///
/// Binary kernels are named `{Scalar|Broadcast|Elementwise}<Op><Type>`,
/// reductions `Reduce<Op><Type>`. The kernel catalog registers kernels under
/// exactly these names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelName(String);

impl KernelName {
	pub fn binary(variant: BinaryVariant, op: BinaryOp, dtype: DType) -> Self {
		Self(format!("{}{}{}", variant.prefix(), op.kernel_stem(), dtype.kernel_suffix()))
	}

	pub fn reduce(kernel: ReduceKernel, dtype: DType) -> Self {
		Self(format!("Reduce{}{}", kernel.kernel_stem(), dtype.kernel_suffix()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl std::fmt::Display for KernelName {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

//--------------------------------------------------------------------------------------------------

/// An executable kernel.
///
/// `inputs` are given in the order of the step that launches the kernel:
/// `[X, Y]` for binary kernels and `[X]` for reductions.
pub trait Kernel {
	fn run(&self, o: &Tensor, inputs: &[&Tensor], params: &KernelParams) -> Result<()>;
}

//--------------------------------------------------------------------------------------------------


//--------------------------------------------------------------------------------------------------
