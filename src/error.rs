//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::borrow::Cow;
use std::convert::Infallible;

use crate::shape::dim_index::AxisOutOfRangeError;

//--------------------------------------------------------------------------------------------------

#[derive(Debug)]
pub struct ErrExtra {
	pub message: Cow<'static, str>,
	pub nested: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct ErrPack<Code: Copy + std::fmt::Debug> {
	pub code: Code,
	pub extra: Option<Box<ErrExtra>>,
}

impl<Code: Copy + std::fmt::Debug> ErrPack<Code> {
	#[cold]
	#[inline(never)]
	pub fn new(code: Code) -> Self {
		Self { code, extra: None }
	}

	#[cold]
	#[inline(never)]
	pub fn with_message(code: Code, message: impl Into<Cow<'static, str>>) -> Self {
		Self {
			code,
			extra: Some(Box::new(ErrExtra { message: message.into(), nested: None })),
		}
	}

	pub fn message(&self) -> &str {
		self.extra.as_ref().map_or("", |extra| extra.message.as_ref())
	}
}

#[cold]
#[inline(never)]
#[allow(clippy::panic)]
fn panic_infallible_to_err_conversion<Code: Copy + std::fmt::Debug>() -> ErrPack<Code> {
	panic!("Infallible should never be converted to ErrPack");
}

impl<Code: Copy + std::fmt::Debug> From<Infallible> for ErrPack<Code> {
	fn from(_: Infallible) -> Self {
		panic_infallible_to_err_conversion()
	}
}

impl<Code: Copy + std::fmt::Debug> std::error::Error for ErrPack<Code> {
}

impl<Code: Copy + std::fmt::Debug> std::fmt::Display for ErrPack<Code> {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		let code = self.code;
		write!(f, "(ErrPack: code={code:?}")?;
		if let Some(ref extra) = self.extra {
			let msg = extra.message.as_ref();
			if !msg.is_empty() {
				write!(f, ", message={msg}")?;
			}
			if let Some(nested) = &extra.nested {
				write!(f, ", nested={nested:?}")?;
			}
		}
		write!(f, ")")
	}
}

//--------------------------------------------------------------------------------------------------

/// Every failure in this crate is a deterministic function of the inputs,
/// so none of these codes is ever retried.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PlanError {
	/// Operand shapes cannot be broadcast together.
	ShapeMismatch,

	/// An axis index does not resolve within the source rank.
	AxisOutOfRange,

	/// A reduction axis has size 0.
	DegenerateAxis,

	/// The same axis was listed twice in one reduction.
	DuplicateAxis,

	/// The kernel registry has no kernel under the requested name.
	KernelNotFound,

	TooManyDimensions,
	DTypeMismatch,
	EmptyOperandList,

	/// A step referenced a buffer role or parameter bundle the kernel cannot use.
	InvalidBinding,

	DevBufAllocFailed,
}

pub type Result<T> = std::result::Result<T, ErrPack<PlanError>>;

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct TooManyDimensionsError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct DuplicateAxisError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct DevBufAllocFailedError;

impl From<TooManyDimensionsError> for ErrPack<PlanError> {
	fn from(_: TooManyDimensionsError) -> Self {
		Self::new(PlanError::TooManyDimensions)
	}
}

impl From<AxisOutOfRangeError> for ErrPack<PlanError> {
	fn from(_: AxisOutOfRangeError) -> Self {
		Self::new(PlanError::AxisOutOfRange)
	}
}

impl From<DuplicateAxisError> for ErrPack<PlanError> {
	fn from(_: DuplicateAxisError) -> Self {
		Self::new(PlanError::DuplicateAxis)
	}
}

impl From<DevBufAllocFailedError> for ErrPack<PlanError> {
	fn from(_: DevBufAllocFailedError) -> Self {
		Self::new(PlanError::DevBufAllocFailed)
	}
}

//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_includes_code_and_message() {
		let err = ErrPack::with_message(PlanError::KernelNotFound, "ReduceL2Int");
		let text = err.to_string();
		assert_eq!(text, "(ErrPack: code=KernelNotFound, message=ReduceL2Int)");
		assert_eq!(err.message(), "ReduceL2Int");

		let err: ErrPack<PlanError> = DuplicateAxisError.into();
		assert_eq!(err.to_string(), "(ErrPack: code=DuplicateAxis)");
		assert_eq!(err.message(), "");
	}
}

//--------------------------------------------------------------------------------------------------
