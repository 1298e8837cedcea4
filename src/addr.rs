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

//! Physical and virtual address newtypes.
//!
//! Kept distinct so a frame index, a physical address and a virtual address
//! can never be confused at a call site.

use crate::consts::PAGE_SIZE;
use core::fmt;
use core::ops::{Add, Deref, DerefMut, Sub};

/// An address on physical memory.
#[repr(transparent)]
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PhysAddr(pub usize);

/// An address on virtual memory.
#[repr(transparent)]
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VirtAddr(pub usize);

macro_rules! addr_impl {
	($name:ident) => {
		impl $name {
			/// Tells whether the address is page-aligned.
			pub fn is_page_aligned(self) -> bool {
				self.0 % PAGE_SIZE == 0
			}

			/// Rounds down to the previous page boundary.
			pub fn page_align_down(self) -> Self {
				Self(self.0 & !(PAGE_SIZE - 1))
			}

			/// Rounds up to the next page boundary.
			pub fn page_align_up(self) -> Self {
				Self(self.0.next_multiple_of(PAGE_SIZE))
			}

			/// Returns the page index, i.e. `self / PAGE_SIZE`.
			pub fn page_index(self) -> usize {
				self.0 / PAGE_SIZE
			}
		}

		impl Deref for $name {
			type Target = usize;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}

		impl DerefMut for $name {
			fn deref_mut(&mut self) -> &mut Self::Target {
				&mut self.0
			}
		}

		impl Add<usize> for $name {
			type Output = Self;

			fn add(self, off: usize) -> Self::Output {
				Self(self.0.wrapping_add(off))
			}
		}

		impl Sub<usize> for $name {
			type Output = Self;

			fn sub(self, off: usize) -> Self::Output {
				Self(self.0.wrapping_sub(off))
			}
		}

		impl fmt::Debug for $name {
			fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(fmt, concat!(stringify!($name), "({:#010x})"), self.0)
			}
		}
	};
}

addr_impl!(PhysAddr);
addr_impl!(VirtAddr);
