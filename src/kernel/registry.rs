//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{ErrPack, PlanError};
use crate::kernel::{Kernel, KernelName};
use crate::util::cold_path;

//--------------------------------------------------------------------------------------------------

pub struct KernelData {
	pub id: usize,
	pub name: KernelName,
	pub kernel: Box<dyn Kernel>,
}

impl std::fmt::Debug for KernelData {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "KernelData({}, {})", self.id, self.name)
	}
}

/// Maps kernel names to kernels.
///
/// Lookup is by the literal name only. The registry knows nothing about
/// operators or dispatch variants.
#[derive(Default)]
pub struct KernelRegistry {
	kernels: Vec<Rc<KernelData>>,
	map: HashMap<KernelName, Rc<KernelData>>,
}

impl KernelRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a kernel. If the name is already taken, the existing kernel is
	/// returned and `build_kernel` is not called.
	pub fn add_kernel(
		&mut self,
		name: KernelName,
		build_kernel: impl FnOnce() -> Box<dyn Kernel>,
	) -> Rc<KernelData> {
		if let Some(entry) = self.map.get(&name) {
			cold_path();
			return entry.clone();
		}
		let id = self.kernels.len();
		let kernel = Rc::new(KernelData { id, name: name.clone(), kernel: build_kernel() });
		self.kernels.push(kernel.clone());
		self.map.insert(name, kernel.clone());
		kernel
	}

	pub fn find(&self, name: &KernelName) -> Result<Rc<KernelData>, ErrPack<PlanError>> {
		if let Some(kernel) = self.map.get(name) {
			Ok(kernel.clone())
		} else {
			cold_path();
			Err(ErrPack::with_message(PlanError::KernelNotFound, name.to_string()))
		}
	}

	pub fn len(&self) -> usize {
		self.kernels.len()
	}

	pub fn is_empty(&self) -> bool {
		self.kernels.is_empty()
	}
}

//--------------------------------------------------------------------------------------------------


//--------------------------------------------------------------------------------------------------
