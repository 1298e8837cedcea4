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

//! The frame table owns every physical page of RAM handed to the kernel at boot and serves
//! single-page allocations to the rest of the virtual-memory subsystem.
//!
//! Free frames are threaded into a singly-linked list whose nodes are written directly into
//! the free frames themselves, so the free list costs no memory beyond the RAM it already
//! tracks. A single lock covers the whole list.
//!
//! A kernel holds exactly one [`FrameTable`] behind an `Arc`, shared by every address space;
//! [`crate::page_table::PageDirectory`] clones that `Arc` into each frame it hands out so a
//! page entry's backing frame is returned here automatically when its last reference drops.

use crate::addr::PhysAddr;
use crate::consts::PAGE_SIZE;
use crate::errno::{Errno, VmResult};
use crate::platform::Platform;
use crate::sync::IntSpin;
use core::marker::PhantomData;
use core::ptr;

/// A free-list node, written into the first bytes of a free frame.
#[repr(C)]
struct FreeNode {
	next: Option<PhysAddr>,
}

struct Inner {
	/// First frame managed by the table; frame index 0 corresponds to this address.
	base: PhysAddr,
	/// One past the last managed frame.
	end: PhysAddr,
	/// Head of the free list, or `None` if exhausted.
	free_head: Option<PhysAddr>,
	/// Whether [`FrameTable::bootstrap`] has run. Before that, allocation falls back to a
	/// linear bump allocator over the not-yet-threaded region.
	bootstrapped: bool,
	/// Bump pointer used only before bootstrap.
	boot_next: PhysAddr,
}

/// The process-wide physical frame allocator.
pub struct FrameTable<P: Platform> {
	inner: IntSpin<Inner>,
	_platform: PhantomData<P>,
}

impl<P: Platform> FrameTable<P> {
	/// Creates an empty, not-yet-bootstrapped frame table.
	pub const fn new() -> Self {
		Self {
			inner: IntSpin::new(Inner {
				base: PhysAddr(0),
				end: PhysAddr(0),
				free_head: None,
				bootstrapped: false,
				boot_next: PhysAddr(0),
			}),
			_platform: PhantomData,
		}
	}

	/// Initializes the table from the platform's reported RAM range and threads every frame
	/// above the current boot bump pointer onto the free list.
	///
	/// Must be called exactly once, before any caller relies on [`Self::get_frame`] serving
	/// requests from the threaded free list rather than the boot stealer.
	pub fn bootstrap(&self) {
		let (low, high) = P::ram_range();
		self.inner.with::<P, _>(|inner| {
			let base = low.page_align_up();
			inner.base = base;
			inner.end = high.page_align_down();
			if !inner.bootstrapped {
				inner.boot_next = base;
			}
			let mut head = None;
			let mut frame = inner.boot_next.page_align_up();
			while frame < inner.end {
				let node = FreeNode {
					next: head,
				};
				unsafe {
					write_node::<P>(frame, &node);
				}
				head = Some(frame);
				frame = frame + PAGE_SIZE;
			}
			inner.free_head = head;
			inner.bootstrapped = true;
			log::debug!(
				"frame table bootstrapped: {:?}..{:?}, stolen up to {:?}",
				inner.base,
				inner.end,
				inner.boot_next
			);
		});
	}

	/// Allocates and zero-fills a single physical frame.
	///
	/// Before [`Self::bootstrap`] has run, this steals memory linearly from the reported RAM
	/// range instead of consulting the free list. After bootstrap, returns
	/// [`Errno::ENoMem`] once the free list is exhausted.
	pub fn get_frame(&self) -> VmResult<PhysAddr> {
		let frame = self.inner.with::<P, _>(|inner| {
			if !inner.bootstrapped {
				return Self::steal_locked(inner);
			}
			let frame = inner.free_head?;
			let node = unsafe { read_node::<P>(frame) };
			inner.free_head = node.next;
			Some(frame)
		});
		let Some(frame) = frame else {
			log::warn!("frame table exhausted");
			return Err(Errno::ENoMem);
		};
		zero_fill::<P>(frame);
		Ok(frame)
	}

	/// Allocates `n` contiguous frames. Post-bootstrap, only `n == 1` is supported, matching
	/// the source allocator's `getppages`; larger requests fail with [`Errno::ENoMem`]
	/// rather than attempting to hunt for contiguous runs in the free list.
	pub fn get_frames(&self, n: usize) -> VmResult<PhysAddr> {
		if n == 0 {
			return Err(Errno::EInval);
		}
		if n == 1 {
			return self.get_frame();
		}
		let frame = self.inner.with::<P, _>(|inner| {
			if inner.bootstrapped {
				return None;
			}
			Self::steal_n_locked(inner, n)
		});
		let frame = frame.ok_or(Errno::ENoMem)?;
		for i in 0..n {
			zero_fill::<P>(frame + i * PAGE_SIZE);
		}
		Ok(frame)
	}

	/// Returns `vaddr`'s backing frame to the free list.
	///
	/// Silently ignores addresses outside the managed range, matching the source
	/// allocator's bounds check, which validates the index range but not that the frame was
	/// actually allocated.
	pub fn free_frame(&self, paddr: PhysAddr) {
		self.inner.with::<P, _>(|inner| {
			if paddr < inner.base || paddr >= inner.end || !paddr.is_page_aligned() {
				return;
			}
			let node = FreeNode {
				next: inner.free_head,
			};
			unsafe {
				write_node::<P>(paddr, &node);
			}
			inner.free_head = Some(paddr);
		});
	}

	/// Allocates `n` contiguous frames and returns them as a kernel-virtual address, for
	/// callers outside the VM subsystem (e.g. a kernel heap) that never deal in physical
	/// addresses directly. Thin wrapper over [`Self::get_frames`].
	pub fn alloc_kpages(&self, n: usize) -> VmResult<crate::addr::VirtAddr> {
		self.get_frames(n).map(P::physical_to_kernel)
	}

	/// Returns a kernel-virtual address previously obtained from [`Self::alloc_kpages`].
	/// Thin wrapper over [`Self::free_frame`].
	pub fn free_kpages(&self, kvaddr: crate::addr::VirtAddr) {
		self.free_frame(P::kernel_to_physical(kvaddr));
	}

	/// Allocates `n` contiguous physical frames without zero-filling or translating the
	/// result, for kernel callers that manage their own mapping. Alias for
	/// [`Self::get_frames`] kept under the source design's name.
	pub fn getppages(&self, n: usize) -> VmResult<PhysAddr> {
		self.get_frames(n)
	}

	fn steal_locked(inner: &mut Inner) -> Option<PhysAddr> {
		Self::steal_n_locked(inner, 1)
	}

	fn steal_n_locked(inner: &mut Inner, n: usize) -> Option<PhysAddr> {
		let frame = inner.boot_next.page_align_up();
		let next = frame + n * PAGE_SIZE;
		if next > inner.end {
			return None;
		}
		inner.boot_next = next;
		Some(frame)
	}
}

impl<P: Platform> Default for FrameTable<P> {
	fn default() -> Self {
		Self::new()
	}
}

unsafe fn write_node<P: Platform>(paddr: PhysAddr, node: &FreeNode) {
	let kvaddr = P::physical_to_kernel(paddr);
	let ptr = kvaddr.0 as *mut FreeNode;
	unsafe {
		ptr::write(ptr, FreeNode {
			next: node.next,
		});
	}
}

unsafe fn read_node<P: Platform>(paddr: PhysAddr) -> FreeNode {
	let kvaddr = P::physical_to_kernel(paddr);
	let ptr = kvaddr.0 as *const FreeNode;
	unsafe { ptr::read(ptr) }
}

fn zero_fill<P: Platform>(paddr: PhysAddr) {
	let kvaddr = P::physical_to_kernel(paddr);
	unsafe {
		ptr::write_bytes(kvaddr.0 as *mut u8, 0, PAGE_SIZE);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::FakePlatform;

	#[test]
	fn bootstrap_threads_whole_range() {
		let table: FrameTable<FakePlatform> = FrameTable::new();
		FakePlatform::install_ram(64 * PAGE_SIZE);
		table.bootstrap();
		let mut seen = 0;
		while table.get_frame().is_ok() {
			seen += 1;
		}
		assert_eq!(seen, 64);
	}

	#[test]
	fn free_then_realloc_reuses_frame() {
		let table: FrameTable<FakePlatform> = FrameTable::new();
		FakePlatform::install_ram(4 * PAGE_SIZE);
		table.bootstrap();
		let a = table.get_frame().unwrap();
		table.free_frame(a);
		let b = table.get_frame().unwrap();
		assert_eq!(a, b);
	}

	#[test]
	fn exhaustion_reports_enomem_and_recovers() {
		let table: FrameTable<FakePlatform> = FrameTable::new();
		FakePlatform::install_ram(2 * PAGE_SIZE);
		table.bootstrap();
		let a = table.get_frame().unwrap();
		let _b = table.get_frame().unwrap();
		assert_eq!(table.get_frame(), Err(Errno::ENoMem));
		table.free_frame(a);
		assert!(table.get_frame().is_ok());
	}

	#[test]
	fn multi_page_fails_post_bootstrap() {
		let table: FrameTable<FakePlatform> = FrameTable::new();
		FakePlatform::install_ram(8 * PAGE_SIZE);
		table.bootstrap();
		assert_eq!(table.get_frames(2), Err(Errno::ENoMem));
	}

	#[test]
	fn allocated_frames_are_zeroed() {
		let table: FrameTable<FakePlatform> = FrameTable::new();
		FakePlatform::install_ram(4 * PAGE_SIZE);
		table.bootstrap();
		let frame = table.get_frame().unwrap();
		let kvaddr = FakePlatform::physical_to_kernel(frame);
		let bytes = unsafe { core::slice::from_raw_parts(kvaddr.0 as *const u8, PAGE_SIZE) };
		assert!(bytes.iter().all(|&b| b == 0));
	}

	#[test]
	fn out_of_range_free_is_ignored() {
		let table: FrameTable<FakePlatform> = FrameTable::new();
		FakePlatform::install_ram(2 * PAGE_SIZE);
		table.bootstrap();
		let before = table.get_frame().unwrap();
		table.free_frame(before);
		table.free_frame(PhysAddr(usize::MAX - PAGE_SIZE));
		// still exactly 2 frames reachable, not 3
		let mut seen = 0;
		while table.get_frame().is_ok() {
			seen += 1;
		}
		assert_eq!(seen, 2);
	}
}
