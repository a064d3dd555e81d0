//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

/// Marks the enclosing branch as unlikely.
#[cold]
#[inline(always)]
pub(crate) fn cold_path() {}

pub trait LossyInto<T> {
	fn lossy_into(self) -> T;
}

impl LossyInto<f64> for usize {
	fn lossy_into(self) -> f64 {
		self as f64
	}
}

/// Installs a stderr logger for the `log` facade.
///
/// `verbosity` follows `stderrlog`: 0 = errors only, 1 = warnings, 2 = info,
/// 3 = debug, 4 and above = trace. Calling it a second time is harmless,
/// the first logger stays installed.
pub fn init_logging(verbosity: usize) {
	let _ = stderrlog::new()
		.module(env!("CARGO_CRATE_NAME"))
		.verbosity(verbosity)
		.timestamp(stderrlog::Timestamp::Off)
		.init();
}
