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

//! The region list: the ordered, non-overlapping set of `[vbase, vbase+npages*PAGE_SIZE)`
//! ranges that make up one address space's mapped virtual memory, each tagged with its
//! permissions.
//!
//! Regions are appended in load order (segments from the executable, then the heap, then
//! the stack) and never reordered, matching the source design; lookups are a linear scan,
//! which is adequate at the handful of regions a teaching workload maps.

use crate::addr::VirtAddr;
use crate::consts::PAGE_SIZE;
use alloc::vec::Vec;

/// Read permission.
pub const R: u8 = 0b001;
/// Write permission.
pub const W: u8 = 0b010;
/// Execute permission.
pub const X: u8 = 0b100;

/// A single mapped virtual-address range and its permissions.
#[derive(Clone, Debug)]
pub struct Region {
	/// Page-aligned start of the range.
	pub vbase: VirtAddr,
	/// Length of the range in pages.
	pub npages: usize,
	/// Bitwise OR of [`R`], [`W`], [`X`].
	pub perms: u8,
}

impl Region {
	/// The first address past the end of this region.
	pub fn end(&self) -> VirtAddr {
		self.vbase + self.npages * PAGE_SIZE
	}

	/// Whether `addr` falls within `[vbase, end)`.
	pub fn contains(&self, addr: VirtAddr) -> bool {
		addr >= self.vbase && addr < self.end()
	}
}

/// A saved, temporarily-widened permission set, restored by [`RegionList::complete_load`].
struct SavedPerms {
	index: usize,
	perms: u8,
}

/// The ordered region list of one address space.
pub struct RegionList {
	regions: Vec<Region>,
	saved: Vec<SavedPerms>,
	/// Index into `regions` of the heap region, once [`Self::complete_load`] has run.
	heap_index: Option<usize>,
	/// Current program break; always `>= heap region's vbase`.
	heap_end: VirtAddr,
}

impl RegionList {
	/// Creates an empty region list.
	pub fn new() -> Self {
		Self {
			regions: Vec::new(),
			saved: Vec::new(),
			heap_index: None,
			heap_end: VirtAddr(0),
		}
	}

	/// Appends a new region, aligning `vaddr` down and `size` up to whole pages.
	pub fn define(&mut self, vaddr: VirtAddr, size: usize, perms: u8) {
		let base = vaddr.page_align_down();
		let extra = *vaddr - *base;
		let npages = (size + extra).div_ceil(PAGE_SIZE);
		self.regions.push(Region {
			vbase: base,
			npages,
			perms,
		});
	}

	/// Finds the region containing `addr`, if any.
	pub fn retrieve(&self, addr: VirtAddr) -> Option<&Region> {
		self.regions.iter().find(|r| r.contains(addr))
	}

	/// Finds the region containing `addr` along with its index, so the caller can tell
	/// whether it is the heap region without relying on pointer identity.
	pub fn retrieve_indexed(&self, addr: VirtAddr) -> Option<(usize, &Region)> {
		self.regions.iter().enumerate().find(|(_, r)| r.contains(addr))
	}

	/// Mutable counterpart of [`Self::retrieve`].
	pub fn retrieve_mut(&mut self, addr: VirtAddr) -> Option<&mut Region> {
		self.regions.iter_mut().find(|r| r.contains(addr))
	}

	/// Index of the heap region, if [`Self::complete_load`] has run.
	pub fn heap_index(&self) -> Option<usize> {
		self.heap_index
	}

	/// The current program break.
	pub fn heap_end(&self) -> VirtAddr {
		self.heap_end
	}

	/// The heap region's base address, once [`Self::complete_load`] has run.
	pub fn heap_vbase(&self) -> Option<VirtAddr> {
		self.heap_index.map(|i| self.regions[i].vbase)
	}

	/// Sets the current program break. Only [`crate::heap::sbrk`] should call this.
	pub fn set_heap_end(&mut self, end: VirtAddr) {
		self.heap_end = end;
	}

	/// Saves every read-only region's permissions and forces [`W`] on, so the loader can
	/// write the segment's initial contents. Paired with [`Self::complete_load`].
	pub fn prepare_load(&mut self) {
		self.saved.clear();
		for (i, region) in self.regions.iter_mut().enumerate() {
			if region.perms & W == 0 {
				self.saved.push(SavedPerms {
					index: i,
					perms: region.perms,
				});
				region.perms |= W;
			}
		}
	}

	/// Restores the permissions saved by [`Self::prepare_load`], then appends the heap
	/// region directly above the last currently-defined region.
	pub fn complete_load(&mut self) {
		for saved in self.saved.drain(..) {
			self.regions[saved.index].perms = saved.perms;
		}
		let heap_base = self
			.regions
			.last()
			.map(|r| r.end())
			.unwrap_or(VirtAddr(0).page_align_up());
		self.regions.push(Region {
			vbase: heap_base,
			npages: 1,
			perms: R | W,
		});
		self.heap_index = Some(self.regions.len() - 1);
		self.heap_end = heap_base;
	}

	/// Defines the fixed-size user stack region ending at `top`.
	pub fn define_stack(&mut self, top: VirtAddr, npages: usize) {
		let vbase = top - npages * PAGE_SIZE;
		self.regions.push(Region {
			vbase,
			npages,
			perms: R | W | X,
		});
	}

	/// Deep-copies this list, used by [`crate::address_space::AddressSpace::fork`].
	pub fn fork(&self) -> Self {
		Self {
			regions: self.regions.clone(),
			saved: Vec::new(),
			heap_index: self.heap_index,
			heap_end: self.heap_end,
		}
	}

	/// Updates the heap region's page count to match `self.heap_end`.
	pub fn sync_heap_region(&mut self) {
		if let Some(i) = self.heap_index {
			let region = &mut self.regions[i];
			region.npages = ((*self.heap_end - *region.vbase) / PAGE_SIZE) + 1;
		}
	}
}

impl Default for RegionList {
	fn default() -> Self {
		Self::new()
	}
}
