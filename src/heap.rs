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

//! Program break management.
//!
//! New pages above the break are never pre-faulted (except the heap region's very first
//! page, faulted in by [`crate::address_space::AddressSpace::complete_load`]); the first
//! access after growth demand-faults through the normal [`crate::fault::vm_fault`] path.
//! Shrinking does not reclaim the frames backing the released range — a known limitation
//! shared with the source design, acceptable given this crate's "no swap-out/page-eviction"
//! non-goal: a later grow back over the same range re-exposes the old contents until the
//! next write overwrites them.

use crate::addr::VirtAddr;
use crate::address_space::AddressSpace;
use crate::consts::{PAGE_SIZE, USER_STACKPAGES, USERSTACK};
use crate::errno::{Errno, VmResult};
use crate::platform::Platform;

/// Grows or shrinks the heap by `increment` bytes (negative to shrink), returning the break
/// value from *before* the change.
///
/// `increment == 0` is a pure query and always succeeds. Fails with [`Errno::EInval`] if no
/// heap region exists yet, if the new break would fall below the heap region's base, or if it
/// would collide with the reserved user-stack range.
pub fn sbrk<P: Platform>(as_: &mut AddressSpace<P>, increment: isize) -> VmResult<VirtAddr> {
	let old_end = as_.regions().heap_end();
	if increment == 0 {
		return Ok(old_end);
	}
	let heap_base = as_.regions().heap_vbase().ok_or(Errno::EInval)?;
	let new_end = if increment >= 0 {
		old_end + increment as usize
	} else {
		old_end - increment.unsigned_abs()
	};
	if new_end < heap_base {
		return Err(Errno::EInval);
	}
	let stack_guard = VirtAddr(USERSTACK - USER_STACKPAGES * PAGE_SIZE);
	if new_end.page_align_up() >= stack_guard {
		return Err(Errno::EInval);
	}

	as_.regions.set_heap_end(new_end);
	as_.regions.sync_heap_region();
	Ok(old_end)
}
