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

//! The address space: one process's page directory and region list, and the lifecycle
//! operations a process's creation, fork and exit hook into.

use crate::addr::VirtAddr;
use crate::consts::{USER_STACKPAGES, USERSTACK};
use crate::errno::{Errno, VmResult};
use crate::frame::FrameTable;
use crate::page_table::PageDirectory;
use crate::region::{self, RegionList};
use crate::tlb::Tlb;
use alloc::sync::Arc;
use core::marker::PhantomData;

use crate::platform::Platform;

/// One process's virtual-memory context.
pub struct AddressSpace<P: Platform> {
	pub(crate) directory: PageDirectory<P>,
	pub(crate) regions: RegionList,
	_platform: PhantomData<P>,
}

impl<P: Platform> AddressSpace<P> {
	/// Creates an empty address space with no regions mapped.
	pub fn create() -> Self {
		Self {
			directory: PageDirectory::new(),
			regions: RegionList::new(),
			_platform: PhantomData,
		}
	}

	/// Creates a copy-on-write duplicate of `self`: the region list is deep-copied and
	/// every mapped page is shared with `self` until the first write to either side splits
	/// it (see [`crate::fault::vm_fault`]).
	pub fn fork(&self) -> Self {
		let mut directory = PageDirectory::new();
		directory.fork_from(&self.directory);
		Self {
			directory,
			regions: self.regions.fork(),
			_platform: PhantomData,
		}
	}

	/// Tears down the address space. Every frame this was the last referent of is returned
	/// to its frame table automatically as the directory's `Arc<FrameHandle>`s drop.
	pub fn destroy(&mut self) {
		self.directory.destroy();
	}

	/// Activates this address space on the current CPU: flushes the whole TLB so no stale
	/// translation from a previous address space survives the switch.
	pub fn activate(&self, tlb: &Tlb<P>) {
		tlb.flush_all();
	}

	/// Deactivates this address space. Symmetric with [`Self::activate`]: a full flush
	/// either way is simplest and matches the source design, which performs the same flush
	/// on both sides of a context switch even though the after-activate flush alone would
	/// suffice.
	pub fn deactivate(&self, tlb: &Tlb<P>) {
		tlb.flush_all();
	}

	/// Defines a new region of `size` bytes at `vaddr` with the given permissions.
	pub fn define_region(&mut self, vaddr: VirtAddr, size: usize, perms: u8) {
		self.regions.define(vaddr, size, perms);
	}

	/// Temporarily forces write permission on every read-only region so the loader can
	/// populate segment contents.
	pub fn prepare_load(&mut self) {
		self.regions.prepare_load();
	}

	/// Restores permissions saved by [`Self::prepare_load`], appends the heap region, and
	/// pre-faults its first page so the break is always backed by a mapped frame.
	pub fn complete_load(&mut self, frames: &Arc<FrameTable<P>>) -> VmResult<()> {
		self.regions.complete_load();
		let heap_base = self.regions.heap_vbase().ok_or(Errno::ENoMem)?;
		self.directory.walk(heap_base.page_index(), true, frames)?;
		Ok(())
	}

	/// Defines the fixed-location user stack and returns the initial stack pointer.
	pub fn define_stack(&mut self) -> VirtAddr {
		self.regions
			.define_stack(VirtAddr(USERSTACK), USER_STACKPAGES);
		VirtAddr(USERSTACK)
	}

	/// The region list, for the fault handler's permission checks.
	pub fn regions(&self) -> &RegionList {
		&self.regions
	}
}

impl<P: Platform> Default for AddressSpace<P> {
	fn default() -> Self {
		Self::create()
	}
}
