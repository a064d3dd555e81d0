//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use crate::util::cold_path;

//------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct AxisOutOfRangeError;

impl std::error::Error for AxisOutOfRangeError {}

impl std::fmt::Display for AxisOutOfRangeError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "Axis index out of range.")
	}
}

//--------------------------------------------------------------------------------------------------

pub trait DimIndex: Copy {
	/// Allowed indexes are:
	///     0 ..< ndim
	///     -ndim ..= -1
	fn resolve_index(self, ndim: usize) -> Result<usize, AxisOutOfRangeError>;
}

impl DimIndex for usize {
	fn resolve_index(self, ndim: usize) -> Result<usize, AxisOutOfRangeError> {
		if self < ndim {
			Ok(self)
		} else {
			cold_path();
			Err(AxisOutOfRangeError)
		}
	}
}

impl DimIndex for isize {
	fn resolve_index(self, ndim: usize) -> Result<usize, AxisOutOfRangeError> {
		#[allow(clippy::cast_sign_loss)]
		let dim = if self >= 0 { self as usize } else { ndim.wrapping_add(self as usize) };
		if dim < ndim {
			Ok(dim)
		} else {
			cold_path();
			Err(AxisOutOfRangeError)
		}
	}
}

impl DimIndex for i32 {
	fn resolve_index(self, ndim: usize) -> Result<usize, AxisOutOfRangeError> {
		(self as isize).resolve_index(ndim)
	}
}

//--------------------------------------------------------------------------------------------------


//--------------------------------------------------------------------------------------------------
