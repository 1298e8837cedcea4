/*
 * Copyright 2024 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! Error codes reported across the virtual-memory subsystem boundary.

use core::fmt;

/// An error code returned by a virtual-memory operation, mirroring the POSIX errno this
/// subsystem's faults are ultimately translated into at the syscall boundary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Errno {
	/// An address was outside any mapped region, or a permission check failed.
	EFault,
	/// An argument was structurally invalid (unknown fault type, a break request that
	/// would collide with the stack, ...).
	EInval,
	/// A physical frame or metadata allocation could not be satisfied.
	ENoMem,
}

impl fmt::Display for Errno {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::EFault => "EFAULT",
			Self::EInval => "EINVAL",
			Self::ENoMem => "ENOMEM",
		};
		f.write_str(s)
	}
}

impl core::error::Error for Errno {}

/// Shorthand for the result type returned by virtual-memory operations.
pub type VmResult<T> = Result<T, Errno>;
