//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::VecDeque;
use std::rc::Rc;

use log::debug;
use ndarray::{ArrayD, IxDyn};
use smallvec::SmallVec;

use crate::Result;
use crate::device::Device;
use crate::dtype::DType;
use crate::error::{DevBufAllocFailedError, ErrPack, PlanError};
use crate::kernel::{KernelData, KernelParams, KernelRegistry};
use crate::plan::DispatchPolicy;
use crate::shape::Shape;
use crate::tensor::{DeviceBuffer, Residency, Tensor};
use crate::util::cold_path;

pub mod kernels;

//--------------------------------------------------------------------------------------------------

/// Host memory buffer. Both dtypes are stored as `f64`, integers hold whole values.
#[derive(Debug)]
pub struct CPUBuffer {
	data: RefCell<Box<[f64]>>,
	elems: usize,
	dtype: DType,
	residency: Residency,
}

impl CPUBuffer {
	fn new(elems: usize, dtype: DType, residency: Residency) -> Result<Self> {
		let mut data = Vec::new();
		if data.try_reserve_exact(elems).is_err() {
			cold_path();
			return Err(DevBufAllocFailedError.into());
		}
		data.resize(elems, 0.0);
		Ok(Self {
			data: RefCell::new(data.into_boxed_slice()),
			elems,
			dtype,
			residency,
		})
	}

	/// The CPU buffer behind `tensor`.
	///
	/// Fails with `InvalidBinding` if the tensor is degenerate or not in host memory.
	/// All `CPUDevice`s share host memory, so a buffer from any of them is accepted.
	pub fn of(tensor: &Tensor) -> Result<&Self> {
		let buffer = tensor.buffer().and_then(|b| b.as_any().downcast_ref::<Self>());
		buffer.ok_or_else(|| {
			cold_path();
			ErrPack::with_message(
				PlanError::InvalidBinding,
				format!("{tensor:?} is not backed by CPU memory"),
			)
		})
	}

	pub fn read(&self) -> Result<Ref<'_, [f64]>> {
		let Ok(data) = self.data.try_borrow() else {
			cold_path();
			return Err(err_aliased());
		};
		Ok(Ref::map(data, |d| &**d))
	}

	pub fn write(&self) -> Result<RefMut<'_, [f64]>> {
		let Ok(data) = self.data.try_borrow_mut() else {
			cold_path();
			return Err(err_aliased());
		};
		Ok(RefMut::map(data, |d| &mut **d))
	}
}

#[cold]
#[inline(never)]
fn err_aliased() -> ErrPack<PlanError> {
	ErrPack::with_message(PlanError::InvalidBinding, "a launch writes a buffer it also reads")
}

impl DeviceBuffer for CPUBuffer {
	fn elems(&self) -> usize {
		self.elems
	}

	fn dtype(&self) -> DType {
		self.dtype
	}

	fn residency(&self) -> Residency {
		self.residency
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct CPUStats {
	pub launches: usize,
	pub output_allocs: usize,
	pub temp_allocs: usize,
}

struct Command {
	kernel: Rc<KernelData>,
	o: Tensor,
	inputs: SmallVec<[Tensor; 2]>,
	params: KernelParams,
}

/// Reference device. Kernels run on the host when the stream is synchronized.
pub struct CPUDevice {
	name: String,
	policy: DispatchPolicy,
	kernels: KernelRegistry,
	stream: RefCell<VecDeque<Command>>,
	stats: Cell<CPUStats>,
}

impl CPUDevice {
	pub fn new() -> Self {
		Self::with_policy(DispatchPolicy::default())
	}

	pub fn with_policy(policy: DispatchPolicy) -> Self {
		let mut kernels = KernelRegistry::new();
		kernels::register_cpu_kernels(&mut kernels);
		debug_assert!(!kernels.is_empty());
		debug!("CPU: {} kernels registered, {policy:?}", kernels.len());
		Self {
			name: "CPU".to_string(),
			policy,
			kernels,
			stream: RefCell::new(VecDeque::new()),
			stats: Cell::new(CPUStats::default()),
		}
	}

	pub fn stats(&self) -> CPUStats {
		self.stats.get()
	}

	pub fn reset_stats(&self) {
		self.stats.set(CPUStats::default());
	}

	fn update_stats(&self, f: impl FnOnce(&mut CPUStats)) {
		let mut stats = self.stats.get();
		f(&mut stats);
		self.stats.set(stats);
	}

	/// Creates a tensor holding `data` in row-major order.
	///
	/// Integer tensors keep only the whole part of each value.
	pub fn upload(&self, shape: Shape, dtype: DType, data: &[f64]) -> Result<Tensor> {
		if data.len() != shape.elems() {
			cold_path();
			return Err(ErrPack::with_message(
				PlanError::ShapeMismatch,
				format!("{} values do not fill a tensor of shape {shape}", data.len()),
			));
		}
		if shape.has_zero_dims() {
			return Ok(Tensor::new_degenerate(shape, dtype));
		}
		let buffer = CPUBuffer::new(data.len(), dtype, Residency::Persistent)?;
		{
			let mut dst = buffer.write()?;
			for (d, &s) in dst.iter_mut().zip(data) {
				*d = if dtype.is_float() { s } else { s.trunc() };
			}
		}
		Ok(Tensor::new(shape, dtype, Rc::new(buffer)))
	}

	/// Copies a tensor into an `ndarray` array of the same shape.
	pub fn download(&self, tensor: &Tensor) -> Result<ArrayD<f64>> {
		let dims = IxDyn(tensor.shape().dims());
		if tensor.is_degenerate() {
			return Ok(ArrayD::zeros(dims));
		}
		self.synchronize()?;
		let data = CPUBuffer::of(tensor)?.read()?.to_vec();
		ArrayD::from_shape_vec(dims, data).map_err(|e| ErrPack {
			code: PlanError::InvalidBinding,
			extra: Some(Box::new(crate::ErrExtra {
				message: format!("cannot view {tensor:?} as an array").into(),
				nested: Some(Box::new(e)),
			})),
		})
	}

	fn run(command: &Command) -> Result<()> {
		let inputs: SmallVec<[&Tensor; 2]> = command.inputs.iter().collect();
		command.kernel.kernel.run(&command.o, &inputs, &command.params)
	}
}

impl Default for CPUDevice {
	fn default() -> Self {
		Self::new()
	}
}

impl Device for CPUDevice {
	fn name(&self) -> &str {
		&self.name
	}

	fn policy(&self) -> DispatchPolicy {
		self.policy
	}

	fn kernels(&self) -> &KernelRegistry {
		&self.kernels
	}

	fn new_tensor(&self, shape: &Shape, dtype: DType, residency: Residency) -> Result<Tensor> {
		debug_assert!(!shape.has_zero_dims());
		let buffer = CPUBuffer::new(shape.elems(), dtype, residency)?;
		self.update_stats(|s| match residency {
			Residency::Persistent => s.output_allocs += 1,
			Residency::Temp => s.temp_allocs += 1,
		});
		Ok(Tensor::new(shape.clone(), dtype, Rc::new(buffer)))
	}

	fn enqueue(
		&self,
		kernel: &Rc<KernelData>,
		o: &Tensor,
		inputs: &[&Tensor],
		params: &KernelParams,
	) -> Result<()> {
		let command = Command {
			kernel: kernel.clone(),
			o: o.clone(),
			inputs: inputs.iter().map(|&t| t.clone()).collect(),
			params: params.clone(),
		};
		self.stream.borrow_mut().push_back(command);
		self.update_stats(|s| s.launches += 1);
		Ok(())
	}

	fn synchronize(&self) -> Result<()> {
		loop {
			// the stream is not borrowed while a kernel runs
			let Some(command) = self.stream.borrow_mut().pop_front() else {
				return Ok(());
			};
			if let Err(e) = Self::run(&command) {
				cold_path();
				self.stream.borrow_mut().clear();
				return Err(e);
			}
		}
	}
}

//--------------------------------------------------------------------------------------------------


//--------------------------------------------------------------------------------------------------
