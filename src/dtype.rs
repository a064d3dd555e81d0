//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use crate::util::cold_path;

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DType {
	Float,
	Int,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct UnknownDTypeError;

impl DType {
	/// Suffix used in kernel names, e.g. the `Float` in `ReduceSumFloat`.
	pub const fn kernel_suffix(self) -> &'static str {
		match self {
			Self::Float => "Float",
			Self::Int => "Int",
		}
	}

	pub const fn is_float(self) -> bool {
		matches!(self, Self::Float)
	}
}

impl std::str::FromStr for DType {
	type Err = UnknownDTypeError;

	fn from_str(s: &str) -> Result<Self, UnknownDTypeError> {
		match s {
			"float" | "f32" => Ok(Self::Float),
			"int" | "i32" => Ok(Self::Int),
			_ => {
				cold_path();
				Err(UnknownDTypeError)
			},
		}
	}
}

impl std::fmt::Display for DType {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		f.write_str(self.kernel_suffix())
	}
}

//--------------------------------------------------------------------------------------------------


//--------------------------------------------------------------------------------------------------
