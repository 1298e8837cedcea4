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

//! The per-address-space, two-level, demand-paged page table.
//!
//! A [`PageDirectory`] has one slot per first-level index (bits 31..22 of a virtual
//! address); each slot holds a list of [`PageEntry`] sorted ascending by second-level index
//! (bits 21..12), created lazily on first fault. A page entry's backing frame is held behind
//! an [`Arc`], so that copy-on-write sharing after [`PageDirectory::fork_from`] is a matter
//! of cloning the handle rather than juggling a separate refcount cell and lock, the way the
//! source design does.

use crate::addr::PhysAddr;
use crate::consts::{PAGE_TABLE_ONE_SIZE, PAGE_TABLE_TWO_SIZE};
use crate::errno::{Errno, VmResult};
use crate::frame::FrameTable;
use crate::platform::Platform;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// The shared backing frame of a page entry.
///
/// `Arc::strong_count(&self.frame) - 1` is the number of *other* page entries (in this or
/// another address space) sharing the frame — the same quantity the source design tracks
/// with an explicit `ref_count` cell. Holds the frame table it was allocated from so the
/// frame is returned automatically when the last `Arc` referencing it is dropped.
struct FrameHandle<P: Platform> {
	frame: PhysAddr,
	table: Arc<FrameTable<P>>,
}

impl<P: Platform> Drop for FrameHandle<P> {
	fn drop(&mut self) {
		self.table.free_frame(self.frame);
	}
}

/// A single mapped virtual page within one first-level slot's list.
pub struct PageEntry<P: Platform> {
	/// Second-level index (0..[`PAGE_TABLE_TWO_SIZE`]) this entry occupies.
	index: u16,
	frame: Arc<FrameHandle<P>>,
}

impl<P: Platform> PageEntry<P> {
	/// The physical frame currently backing this page.
	pub fn frame(&self) -> PhysAddr {
		self.frame.frame
	}

	/// Whether this entry is the sole reference to its frame, i.e. writable in place
	/// without a copy-on-write split.
	pub fn is_exclusive(&self) -> bool {
		Arc::strong_count(&self.frame) == 1
	}
}

/// One first-level slot: entries sorted ascending by second-level index.
type Slot<P> = Vec<PageEntry<P>>;

/// A per-address-space page directory.
pub struct PageDirectory<P: Platform> {
	slots: Vec<Option<Slot<P>>>,
}

impl<P: Platform> PageDirectory<P> {
	/// Creates an empty page directory with every first-level slot unpopulated.
	pub fn new() -> Self {
		let mut slots = Vec::with_capacity(PAGE_TABLE_ONE_SIZE);
		slots.resize_with(PAGE_TABLE_ONE_SIZE, || None);
		Self {
			slots,
		}
	}

	/// Splits a virtual page number into its first- and second-level indices.
	fn split(vpn: usize) -> (usize, usize) {
		let l1 = (vpn / PAGE_TABLE_TWO_SIZE) % PAGE_TABLE_ONE_SIZE;
		let l2 = vpn % PAGE_TABLE_TWO_SIZE;
		(l1, l2)
	}

	/// Looks up the entry for `vpn`, optionally creating it (and its backing frame) on a
	/// miss.
	///
	/// Returns `Ok(None)` only when `create` is `false` and no entry exists. A `create`
	/// request that cannot allocate a frame reports [`Errno::ENoMem`].
	pub fn walk(
		&mut self,
		vpn: usize,
		create: bool,
		frames: &Arc<FrameTable<P>>,
	) -> VmResult<Option<&mut PageEntry<P>>> {
		let (l1, l2) = Self::split(vpn);
		let l2 = l2 as u16;
		let slot = &mut self.slots[l1];
		if slot.is_none() {
			if !create {
				return Ok(None);
			}
			*slot = Some(Vec::new());
		}
		let list = slot.as_mut().unwrap();
		let pos = list.binary_search_by_key(&l2, |e| e.index);
		match pos {
			Ok(i) => Ok(Some(&mut list[i])),
			Err(i) if create => {
				let frame = frames.get_frame()?;
				let entry = PageEntry {
					index: l2,
					frame: Arc::new(FrameHandle {
						frame,
						table: frames.clone(),
					}),
				};
				list.insert(i, entry);
				Ok(Some(&mut list[i]))
			}
			Err(_) => Ok(None),
		}
	}

	/// Retargets `vpn`'s entry to `new_frame`, detaching it from whatever it previously
	/// shared. Used by the fault handler's copy-on-write split: the caller has already
	/// copied the old frame's contents into `new_frame`.
	///
	/// Does nothing if `vpn` has no entry yet.
	pub fn replace_frame(&mut self, vpn: usize, new_frame: PhysAddr, frames: &Arc<FrameTable<P>>) {
		if let Ok(Some(entry)) = self.walk(vpn, false, frames) {
			entry.frame = Arc::new(FrameHandle {
				frame: new_frame,
				table: frames.clone(),
			});
		}
	}

	/// Populates `self` as a copy-on-write duplicate of `other`: every populated entry is
	/// retargeted to share `other`'s frame via a cloned `Arc`, bumping the shared strong
	/// count so a later write fault on either side splits it (see
	/// [`crate::fault::vm_fault`]).
	pub fn fork_from(&mut self, other: &Self) {
		for (l1, slot) in other.slots.iter().enumerate() {
			let Some(list) = slot else {
				continue;
			};
			let mut new_list = Vec::with_capacity(list.len());
			for entry in list {
				new_list.push(PageEntry {
					index: entry.index,
					frame: entry.frame.clone(),
				});
			}
			self.slots[l1] = Some(new_list);
		}
	}

	/// Releases every mapped frame, returning each to its owning frame table once its last
	/// reference (across this and any sibling address space created by [`Self::fork_from`])
	/// is dropped — see [`FrameHandle`]'s `Drop` impl.
	pub fn destroy(&mut self) {
		for slot in self.slots.iter_mut() {
			slot.take();
		}
	}
}

impl<P: Platform> Default for PageDirectory<P> {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::consts::PAGE_SIZE;
	use crate::test_support::FakePlatform;

	fn frames() -> Arc<FrameTable<FakePlatform>> {
		FakePlatform::install_ram(16 * PAGE_SIZE);
		let t = Arc::new(FrameTable::new());
		t.bootstrap();
		t
	}

	#[test]
	fn walk_without_create_misses() {
		let mut dir: PageDirectory<FakePlatform> = PageDirectory::new();
		let frames = frames();
		assert!(dir.walk(5, false, &frames).unwrap().is_none());
	}

	#[test]
	fn walk_with_create_is_idempotent() {
		let mut dir: PageDirectory<FakePlatform> = PageDirectory::new();
		let frames = frames();
		let f1 = dir.walk(5, true, &frames).unwrap().unwrap().frame();
		let f2 = dir.walk(5, true, &frames).unwrap().unwrap().frame();
		assert_eq!(f1, f2);
	}

	#[test]
	fn fork_shares_frame_until_split() {
		let mut parent: PageDirectory<FakePlatform> = PageDirectory::new();
		let frames = frames();
		let frame = dir_walk_new(&mut parent, 3, &frames);
		assert!(parent.walk(3, false, &frames).unwrap().unwrap().is_exclusive());

		let mut child: PageDirectory<FakePlatform> = PageDirectory::new();
		child.fork_from(&parent);

		let parent_entry = parent.walk(3, false, &frames).unwrap().unwrap();
		assert!(!parent_entry.is_exclusive());
		assert_eq!(parent_entry.frame(), frame);
		let child_entry = child.walk(3, false, &frames).unwrap().unwrap();
		assert_eq!(child_entry.frame(), frame);
		assert!(!child_entry.is_exclusive());
	}

	#[test]
	fn destroy_frees_exclusive_frames() {
		let mut dir: PageDirectory<FakePlatform> = PageDirectory::new();
		let frames = frames();
		dir_walk_new(&mut dir, 1, &frames);
		dir.destroy();
		// every frame should be back on the free list
		let mut seen = 0;
		while frames.get_frame().is_ok() {
			seen += 1;
		}
		assert_eq!(seen, 16);
	}

	#[test]
	fn destroy_keeps_shared_frame_alive_for_sibling() {
		let mut parent: PageDirectory<FakePlatform> = PageDirectory::new();
		let frames = frames();
		dir_walk_new(&mut parent, 2, &frames);
		let mut child: PageDirectory<FakePlatform> = PageDirectory::new();
		child.fork_from(&parent);
		parent.destroy();
		// still referenced by `child`, so total free count must be 15, not 16
		let mut seen = 0;
		while frames.get_frame().is_ok() {
			seen += 1;
		}
		assert_eq!(seen, 15);
		child.destroy();
	}

	fn dir_walk_new(
		dir: &mut PageDirectory<FakePlatform>,
		vpn: usize,
		frames: &Arc<FrameTable<FakePlatform>>,
	) -> PhysAddr {
		dir.walk(vpn, true, frames).unwrap().unwrap().frame()
	}
}
