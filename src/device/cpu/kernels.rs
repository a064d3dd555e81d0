//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use crate::Result;
use crate::device::cpu::CPUBuffer;
use crate::dtype::DType;
use crate::error::{ErrPack, PlanError};
use crate::kernel::{
	BinaryVariant, Kernel, KernelName, KernelParams, KernelRegistry, ParamLayout, StridedParams,
	Weights,
};
use crate::op::{BinaryOp, ReduceKernel};
use crate::shape::MAX_RANK;
use crate::tensor::Tensor;
use crate::util::{LossyInto, cold_path};

//--------------------------------------------------------------------------------------------------

#[cold]
#[inline(never)]
fn err_binding(kernel: &KernelName, what: &str) -> ErrPack<PlanError> {
	ErrPack::with_message(PlanError::InvalidBinding, format!("{kernel}: {what}"))
}

//--------------------------------------------------------------------------------------------------

pub struct BinaryKernel {
	name: KernelName,
	op: BinaryOp,
	variant: BinaryVariant,
}

impl BinaryKernel {
	fn apply(&self, a: f64, b: f64, w: Weights) -> f64 {
		match self.op {
			BinaryOp::Add => a + b,
			BinaryOp::Sub => a - b,
			BinaryOp::Mul => a * b,
			BinaryOp::Div => a / b,
			BinaryOp::Min => a.min(b),
			BinaryOp::Max => a.max(b),
			BinaryOp::Pow => a.powf(b),
			BinaryOp::Mean => w.alpha * a + w.beta * b,
		}
	}

	/// Every input axis is either 1 or matches the output, and buffer sizes match the shapes.
	fn check_strided(p: &StridedParams, x_len: usize, y_len: usize) -> bool {
		let fits = |shape: &[usize; MAX_RANK]| {
			(0..MAX_RANK).all(|a| shape[a] == 1 || shape[a] == p.shape_o[a])
		};
		fits(&p.shape_x)
			&& fits(&p.shape_y)
			&& p.shape_x.iter().product::<usize>() == x_len
			&& p.shape_y.iter().product::<usize>() == y_len
	}
}

impl Kernel for BinaryKernel {
	fn run(&self, o: &Tensor, inputs: &[&Tensor], params: &KernelParams) -> Result<()> {
		let &[x, y] = inputs else {
			cold_path();
			return Err(err_binding(&self.name, "expected two inputs"));
		};
		let w = match (self.op.is_weighted(), params.weights) {
			(true, None) => {
				cold_path();
				return Err(err_binding(&self.name, "alpha and beta are not bound"));
			},
			(_, w) => w.unwrap_or(Weights { alpha: 1.0, beta: 1.0 }),
		};

		let mut out = CPUBuffer::of(o)?.write()?;
		let x = CPUBuffer::of(x)?.read()?;
		let y = CPUBuffer::of(y)?.read()?;
		let n = params.elems;
		if out.len() != n {
			cold_path();
			return Err(err_binding(&self.name, "count does not match the output"));
		}

		match (self.variant, &params.layout) {
			(BinaryVariant::Scalar, ParamLayout::Flat) if x.len() == n && y.len() == 1 => {
				let b = y[0];
				for (o, &a) in out.iter_mut().zip(x.iter()) {
					*o = self.apply(a, b, w);
				}
			},
			(BinaryVariant::Broadcast, ParamLayout::Flat) if x.len() == n && y.len() == n => {
				for ((o, &a), &b) in out.iter_mut().zip(x.iter()).zip(y.iter()) {
					*o = self.apply(a, b, w);
				}
			},
			(BinaryVariant::Elementwise, ParamLayout::Strided(p))
				if Self::check_strided(p, x.len(), y.len()) =>
			{
				let first_axis = p.first_axis();
				for (i, o) in out.iter_mut().enumerate() {
					let mut rem = i;
					let mut ix = 0;
					let mut iy = 0;
					for axis in first_axis..MAX_RANK {
						let coord = rem / p.strides_o[axis];
						rem %= p.strides_o[axis];
						if p.shape_x[axis] != 1 {
							ix += coord * p.strides_x[axis];
						}
						if p.shape_y[axis] != 1 {
							iy += coord * p.strides_y[axis];
						}
					}
					*o = self.apply(x[ix], y[iy], w);
				}
			},
			_ => {
				cold_path();
				return Err(err_binding(&self.name, "parameters do not fit the variant"));
			},
		}
		Ok(())
	}
}

//--------------------------------------------------------------------------------------------------

pub struct ReduceKernelImpl {
	name: KernelName,
	kernel: ReduceKernel,
}

impl ReduceKernelImpl {
	fn eval(&self, values: impl Iterator<Item = f64> + Clone, count: usize) -> f64 {
		match self.kernel {
			ReduceKernel::Min => values.fold(f64::INFINITY, f64::min),
			ReduceKernel::Max => values.fold(f64::NEG_INFINITY, f64::max),
			ReduceKernel::Sum => values.sum(),
			ReduceKernel::Mean => {
				let n: f64 = count.lossy_into();
				values.sum::<f64>() / n
			},
			ReduceKernel::Prod => values.product(),
			ReduceKernel::LogSum => values.sum::<f64>().ln(),
			ReduceKernel::LogSumExp => {
				let max = values.clone().fold(f64::NEG_INFINITY, f64::max);
				if max.is_infinite() {
					return max;
				}
				max + values.map(|v| (v - max).exp()).sum::<f64>().ln()
			},
			ReduceKernel::SumSquare => values.map(|v| v * v).sum(),
			ReduceKernel::L1 => values.map(f64::abs).sum(),
			ReduceKernel::L2 => values.map(|v| v * v).sum::<f64>().sqrt(),
			ReduceKernel::SumSqrt => values.sum::<f64>().sqrt(),
		}
	}
}

impl Kernel for ReduceKernelImpl {
	fn run(&self, o: &Tensor, inputs: &[&Tensor], params: &KernelParams) -> Result<()> {
		let &[x] = inputs else {
			cold_path();
			return Err(err_binding(&self.name, "expected one input"));
		};
		let ParamLayout::Reduce(r) = params.layout else {
			cold_path();
			return Err(err_binding(&self.name, "innerLength and reduceLength are not bound"));
		};
		let inner = r.inner_length;
		let reduce = r.reduce_length;

		let mut out = CPUBuffer::of(o)?.write()?;
		let x = CPUBuffer::of(x)?.read()?;
		if inner == 0
			|| reduce == 0
			|| out.len() != params.elems
			|| params.elems % inner != 0
			|| x.len() != params.elems * reduce
		{
			cold_path();
			return Err(err_binding(&self.name, "lengths do not match the buffers"));
		}

		// the input is viewed as [outer, reduce, inner], the output as [outer, inner]
		for (i, o) in out.iter_mut().enumerate() {
			let outer = i / inner;
			let base = outer * inner * reduce + i % inner;
			let values = (0..reduce).map(|k| x[base + k * inner]);
			*o = self.eval(values, reduce);
		}
		Ok(())
	}
}

//--------------------------------------------------------------------------------------------------

fn supports_binary(op: BinaryOp, dtype: DType) -> bool {
	dtype.is_float()
		|| matches!(op, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Min | BinaryOp::Max)
}

fn supports_reduce(kernel: ReduceKernel, dtype: DType) -> bool {
	dtype.is_float()
		|| matches!(
			kernel,
			ReduceKernel::Min | ReduceKernel::Max | ReduceKernel::Sum | ReduceKernel::Prod
		)
}

/// Registers every kernel the CPU device implements.
///
/// Integer tensors only get operators whose results are whole numbers.
pub fn register_cpu_kernels(registry: &mut KernelRegistry) {
	for dtype in [DType::Float, DType::Int] {
		for op in BinaryOp::ALL {
			if !supports_binary(op, dtype) {
				continue;
			}
			for variant in BinaryVariant::ALL {
				let name = KernelName::binary(variant, op, dtype);
				let kernel_name = name.clone();
				registry.add_kernel(name, || {
					Box::new(BinaryKernel { name: kernel_name, op, variant })
				});
			}
		}
		for kernel in ReduceKernel::ALL {
			if !supports_reduce(kernel, dtype) {
				continue;
			}
			let name = KernelName::reduce(kernel, dtype);
			let kernel_name = name.clone();
			registry.add_kernel(name, || Box::new(ReduceKernelImpl { name: kernel_name, kernel }));
		}
	}
}

//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::device::Device;
	use crate::device::cpu::CPUDevice;
	use crate::kernel::ReduceParams;
	use crate::shape::Shape;
	use crate::tensor::Residency;
	use assert_approx_eq::assert_approx_eq;

	fn launch(
		dev: &CPUDevice,
		name: &KernelName,
		o: &Tensor,
		inputs: &[&Tensor],
		params: &KernelParams,
	) -> Result<Vec<f64>> {
		let kernel = dev.kernels().find(name)?;
		kernel.kernel.run(o, inputs, params)?;
		Ok(dev.download(o)?.iter().copied().collect())
	}

	#[test]
	fn elementwise_projects_broadcast_axes() -> Result<()> {
		let dev = CPUDevice::new();
		let xs = Shape::from([2, 1]);
		let ys = Shape::from([3]);
		let os = Shape::from([2, 3]);
		let x = dev.upload(xs.clone(), DType::Float, &[10.0, 20.0])?;
		let y = dev.upload(ys.clone(), DType::Float, &[1.0, 2.0, 3.0])?;
		let o = dev.new_tensor(&os, DType::Float, Residency::Persistent)?;
		let params = KernelParams {
			elems: 6,
			layout: ParamLayout::Strided(Box::new(StridedParams::new(&os, &xs, &ys))),
			weights: None,
		};
		let name = KernelName::binary(BinaryVariant::Elementwise, BinaryOp::Sub, DType::Float);
		let result = launch(&dev, &name, &o, &[&x, &y], &params)?;
		assert_eq!(result, [9.0, 8.0, 7.0, 19.0, 18.0, 17.0]);

		// flat parameters are rejected by the strided variant
		let flat = KernelParams { elems: 6, layout: ParamLayout::Flat, weights: None };
		let err = launch(&dev, &name, &o, &[&x, &y], &flat).unwrap_err();
		assert_eq!(err.code, PlanError::InvalidBinding);
		Ok(())
	}

	#[test]
	fn mean_needs_weights() -> Result<()> {
		let dev = CPUDevice::new();
		let s = Shape::from([2]);
		let x = dev.upload(s.clone(), DType::Float, &[2.0, 4.0])?;
		let y = dev.upload(s.clone(), DType::Float, &[6.0, 8.0])?;
		let o = dev.new_tensor(&s, DType::Float, Residency::Persistent)?;
		let name = KernelName::binary(BinaryVariant::Broadcast, BinaryOp::Mean, DType::Float);
		let mut params = KernelParams { elems: 2, layout: ParamLayout::Flat, weights: None };
		let err = launch(&dev, &name, &o, &[&x, &y], &params).unwrap_err();
		assert_eq!(err.code, PlanError::InvalidBinding);

		params.weights = Some(Weights { alpha: 0.5, beta: 0.5 });
		assert_eq!(launch(&dev, &name, &o, &[&x, &y], &params)?, [4.0, 6.0]);
		Ok(())
	}

	#[test]
	fn reduce_collapses_middle_axis() -> Result<()> {
		let dev = CPUDevice::new();
		// [outer = 2, reduce = 3, inner = 2]
		let data: Vec<f64> = (1..=12).map(f64::from).collect();
		let x = dev.upload(Shape::from([2, 3, 2]), DType::Float, &data)?;
		let o = dev.new_tensor(&Shape::from([2, 1, 2]), DType::Float, Residency::Persistent)?;
		let params = KernelParams {
			elems: 4,
			layout: ParamLayout::Reduce(ReduceParams { inner_length: 2, reduce_length: 3 }),
			weights: None,
		};
		let name = |k| KernelName::reduce(k, DType::Float);

		let sum = launch(&dev, &name(ReduceKernel::Sum), &o, &[&x], &params)?;
		assert_eq!(sum, [9.0, 12.0, 27.0, 30.0]);
		let max = launch(&dev, &name(ReduceKernel::Max), &o, &[&x], &params)?;
		assert_eq!(max, [5.0, 6.0, 11.0, 12.0]);
		let mean = launch(&dev, &name(ReduceKernel::Mean), &o, &[&x], &params)?;
		assert_eq!(mean, [3.0, 4.0, 9.0, 10.0]);

		let lse = launch(&dev, &name(ReduceKernel::LogSumExp), &o, &[&x], &params)?;
		let expected = (1.0_f64.exp() + 3.0_f64.exp() + 5.0_f64.exp()).ln();
		assert_approx_eq!(lse[0], expected, 1e-12);

		let l2 = launch(&dev, &name(ReduceKernel::L2), &o, &[&x], &params)?;
		assert_approx_eq!(l2[1], (4.0_f64 + 16.0 + 36.0).sqrt(), 1e-12);
		Ok(())
	}

	#[test]
	fn integer_catalog_is_exact_subset() {
		let dev = CPUDevice::new();
		let has = |name: KernelName| dev.kernels().find(&name).is_ok();
		for variant in BinaryVariant::ALL {
			assert!(has(KernelName::binary(variant, BinaryOp::Mul, DType::Int)));
			assert!(!has(KernelName::binary(variant, BinaryOp::Div, DType::Int)));
			assert!(!has(KernelName::binary(variant, BinaryOp::Mean, DType::Int)));
			for op in BinaryOp::ALL {
				assert!(has(KernelName::binary(variant, op, DType::Float)));
			}
		}
		assert!(has(KernelName::reduce(ReduceKernel::Prod, DType::Int)));
		assert!(!has(KernelName::reduce(ReduceKernel::Mean, DType::Int)));
		for kernel in ReduceKernel::ALL {
			assert!(has(KernelName::reduce(kernel, DType::Float)));
		}
	}
}

//--------------------------------------------------------------------------------------------------
