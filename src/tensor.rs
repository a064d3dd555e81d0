//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::any::Any;
use std::rc::Rc;

use crate::dtype::DType;
use crate::shape::Shape;

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Residency {
	/// Caller-visible result.
	Persistent,

	/// Scratch memory owned by one dispatch plan.
	Temp,
}

/// Device memory backing a tensor.
///
/// The core never looks inside a buffer. Only the device that allocated it
/// downcasts it through `as_any()`.
pub trait DeviceBuffer: Any {
	fn elems(&self) -> usize;
	fn dtype(&self) -> DType;
	fn residency(&self) -> Residency;
	fn as_any(&self) -> &dyn Any;
}

//--------------------------------------------------------------------------------------------------

/// A contiguous row-major tensor.
///
/// A tensor whose shape has a zero-size dimension has no buffer at all.
#[derive(Clone)]
pub struct Tensor {
	shape: Shape,
	dtype: DType,
	buffer: Option<Rc<dyn DeviceBuffer>>,
}

impl Tensor {
	pub fn new(shape: Shape, dtype: DType, buffer: Rc<dyn DeviceBuffer>) -> Self {
		debug_assert!(buffer.elems() == shape.elems());
		debug_assert!(buffer.dtype() == dtype);
		Self { shape, dtype, buffer: Some(buffer) }
	}

	pub fn new_degenerate(shape: Shape, dtype: DType) -> Self {
		debug_assert!(shape.has_zero_dims());
		Self { shape, dtype, buffer: None }
	}

	pub fn shape(&self) -> &Shape {
		&self.shape
	}

	pub fn dtype(&self) -> DType {
		self.dtype
	}

	pub fn ndim(&self) -> usize {
		self.shape.ndim()
	}

	pub fn elems(&self) -> usize {
		self.shape.elems()
	}

	pub fn is_degenerate(&self) -> bool {
		self.buffer.is_none()
	}

	pub fn buffer(&self) -> Option<&dyn DeviceBuffer> {
		self.buffer.as_deref()
	}

	pub fn residency(&self) -> Option<Residency> {
		self.buffer.as_ref().map(|b| b.residency())
	}

	/// Returns `true` if both tensors are backed by the same device buffer.
	pub fn shares_buffer(&self, other: &Self) -> bool {
		match (&self.buffer, &other.buffer) {
			(Some(a), Some(b)) => Rc::ptr_eq(a, b),
			_ => false,
		}
	}
}

impl std::fmt::Debug for Tensor {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "Tensor({}, {:?}", self.shape, self.dtype)?;
		match self.residency() {
			Some(Residency::Persistent) => {},
			Some(Residency::Temp) => write!(f, ", temp")?,
			None => write!(f, ", degenerate")?,
		}
		write!(f, ")")
	}
}

//--------------------------------------------------------------------------------------------------
