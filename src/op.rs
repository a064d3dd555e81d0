//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use crate::kernel::params::Weights;
use crate::util::LossyInto;

//--------------------------------------------------------------------------------------------------

/// Elementwise two-operand operators.
///
/// Every operator is available in the `Scalar`, `Broadcast` and `Elementwise`
/// kernel variants, the name stem is the same for all three.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BinaryOp {
	Add,
	Sub,
	Mul,
	Div,
	Min,
	Max,
	Pow,

	/// `alpha * x + beta * y`. Used to fold a mean.
	Mean,
}

impl BinaryOp {
	pub const ALL: [Self; 8] = [
		Self::Add,
		Self::Sub,
		Self::Mul,
		Self::Div,
		Self::Min,
		Self::Max,
		Self::Pow,
		Self::Mean,
	];

	pub const fn kernel_stem(self) -> &'static str {
		match self {
			Self::Add => "Add",
			Self::Sub => "Sub",
			Self::Mul => "Mul",
			Self::Div => "Div",
			Self::Min => "Min",
			Self::Max => "Max",
			Self::Pow => "Pow",
			Self::Mean => "Mean",
		}
	}

	/// Weighted operators need `alpha` and `beta` bound on every call.
	pub const fn is_weighted(self) -> bool {
		matches!(self, Self::Mean)
	}
}

//--------------------------------------------------------------------------------------------------

/// Operators accepted by the variadic fold.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FoldOp {
	Min,
	Max,
	Sum,
	Mean,
}

impl FoldOp {
	pub const fn binary_op(self) -> BinaryOp {
		match self {
			Self::Min => BinaryOp::Min,
			Self::Max => BinaryOp::Max,
			Self::Sum => BinaryOp::Add,
			Self::Mean => BinaryOp::Mean,
		}
	}

	/// Weights for fold number `fold` (counted from 0) out of `operands - 1` folds.
	///
	/// The first fold scales both the first and the second operand by `1/N`,
	/// later folds keep the accumulator as is and add the next operand scaled by `1/N`.
	pub fn weights(self, fold: usize, operands: usize) -> Option<Weights> {
		if !self.binary_op().is_weighted() {
			return None;
		}
		let n: f64 = operands.lossy_into();
		let inv_n = 1.0 / n;
		let alpha = if fold == 0 { inv_n } else { 1.0 };
		Some(Weights { alpha, beta: inv_n })
	}
}

//--------------------------------------------------------------------------------------------------

/// Reduction operators as seen by the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ReduceOp {
	Min,
	Max,
	Sum,
	Mean,
	Prod,
	LogSum,
	LogSumExp,
	SumSquare,
	L1,
	L2,
}

/// Reduction kernels as named in the kernel catalog.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ReduceKernel {
	Min,
	Max,
	Sum,
	Mean,
	Prod,
	LogSum,
	LogSumExp,
	SumSquare,
	L1,
	L2,

	/// `sqrt(sum(x))`. Finishes an L2 norm whose squares were summed by earlier launches.
	SumSqrt,
}

impl ReduceKernel {
	pub const ALL: [Self; 11] = [
		Self::Min,
		Self::Max,
		Self::Sum,
		Self::Mean,
		Self::Prod,
		Self::LogSum,
		Self::LogSumExp,
		Self::SumSquare,
		Self::L1,
		Self::L2,
		Self::SumSqrt,
	];

	pub const fn kernel_stem(self) -> &'static str {
		match self {
			Self::Min => "Min",
			Self::Max => "Max",
			Self::Sum => "Sum",
			Self::Mean => "Mean",
			Self::Prod => "Prod",
			Self::LogSum => "LogSum",
			Self::LogSumExp => "LogSumExp",
			Self::SumSquare => "SumSquare",
			Self::L1 => "L1",
			Self::L2 => "L2",
			Self::SumSqrt => "SumSqrt",
		}
	}
}

/// Which kernel each launch of a multi-launch reduction uses.
///
/// A reduction that fuses into one window uses `only`. Otherwise the first window
/// uses `first`, the last one `last`, and any window in between `middle`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReduceDescriptor {
	pub only: ReduceKernel,
	pub first: ReduceKernel,
	pub middle: ReduceKernel,
	pub last: ReduceKernel,
}

impl ReduceDescriptor {
	const fn single_pass(kernel: ReduceKernel) -> Self {
		Self { only: kernel, first: kernel, middle: kernel, last: kernel }
	}

	pub const fn stage(&self, is_first: bool, is_last: bool) -> ReduceKernel {
		match (is_first, is_last) {
			(true, true) => self.only,
			(true, false) => self.first,
			(false, false) => self.middle,
			(false, true) => self.last,
		}
	}
}

impl ReduceOp {
	pub const ALL: [Self; 10] = [
		Self::Min,
		Self::Max,
		Self::Sum,
		Self::Mean,
		Self::Prod,
		Self::LogSum,
		Self::LogSumExp,
		Self::SumSquare,
		Self::L1,
		Self::L2,
	];

	#[rustfmt::skip]
	pub const fn descriptor(self) -> ReduceDescriptor {
		use ReduceKernel as K;
		match self {
			Self::Min => ReduceDescriptor::single_pass(K::Min),
			Self::Max => ReduceDescriptor::single_pass(K::Max),
			Self::Sum => ReduceDescriptor::single_pass(K::Sum),
			Self::Prod => ReduceDescriptor::single_pass(K::Prod),
			Self::LogSumExp => ReduceDescriptor::single_pass(K::LogSumExp),

			// every window has the same element count, so a mean of means is the mean
			Self::Mean => ReduceDescriptor::single_pass(K::Mean),

			Self::LogSum =>    ReduceDescriptor { only: K::LogSum,    first: K::Sum,       middle: K::Sum, last: K::LogSum },
			Self::SumSquare => ReduceDescriptor { only: K::SumSquare, first: K::SumSquare, middle: K::Sum, last: K::Sum },
			Self::L1 =>        ReduceDescriptor { only: K::L1,        first: K::L1,        middle: K::Sum, last: K::Sum },
			Self::L2 =>        ReduceDescriptor { only: K::L2,        first: K::SumSquare, middle: K::Sum, last: K::SumSqrt },
		}
	}

	/// Two-pass operators transform elements in their first launch only.
	pub const fn is_two_pass(self) -> bool {
		matches!(self, Self::SumSquare | Self::L1 | Self::L2)
	}
}

//--------------------------------------------------------------------------------------------------


//--------------------------------------------------------------------------------------------------
