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

//! The TLB-miss and protection-fault entry point.
//!
//! [`vm_fault`] is structured as the four-stage pipeline recommended for this rewrite:
//! Validate the faulting address against the region list and the requested access, Walk (and
//! lazily create) the page-table entry backing it, split it out of copy-on-write sharing if
//! the fault is a write to a shared page, then Emit a TLB entry. Each stage returns early
//! with a [`VmResult`] rather than branching on an integer status code.

use crate::addr::{PhysAddr, VirtAddr};
use crate::address_space::AddressSpace;
use crate::consts::PAGE_SIZE;
use crate::errno::{Errno, VmResult};
use crate::frame::FrameTable;
use crate::platform::Platform;
use crate::region::{self, Region};
use crate::tlb::Tlb;
use alloc::sync::Arc;

/// The kind of access that triggered a TLB exception.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FaultType {
	/// A load from `faultaddress` missed the TLB.
	Read,
	/// A store to `faultaddress` missed the TLB.
	Write,
	/// A store hit a valid TLB entry marked read-only (TLB-Modify exception). Always fatal,
	/// regardless of the region's actual permissions.
	Readonly,
}

impl TryFrom<u32> for FaultType {
	type Error = Errno;

	/// `code` is the trap layer's raw fault-type code.
	fn try_from(code: u32) -> VmResult<Self> {
		match code {
			0 => Ok(Self::Read),
			1 => Ok(Self::Write),
			2 => Ok(Self::Readonly),
			_ => Err(Errno::EInval),
		}
	}
}

/// Handles a TLB-miss or TLB-modify exception for `faultaddress` in `as_`.
///
/// On success, a translation for the containing page has been written into the TLB and the
/// faulting instruction may be retried. On failure, the caller (the trap handler, out of
/// scope here) is expected to deliver a fatal signal to the faulting process.
pub fn vm_fault<P: Platform>(
	fault_type: FaultType,
	faultaddress: VirtAddr,
	as_: &mut AddressSpace<P>,
	frames: &Arc<FrameTable<P>>,
	tlb: &Tlb<P>,
) -> VmResult<()> {
	let page = faultaddress.page_align_down();
	#[cfg(feature = "vm-trace")]
	log::trace!("vm_fault: {:?} at {:?} (page {:?})", fault_type, faultaddress, page);

	// --- Validate ---
	let region = validate(fault_type, page, as_)?;
	if fault_type == FaultType::Readonly {
		// A stray write to a valid read-only TLB entry. COW splits shared frames before
		// this point is ever reached, so getting here is a program error, not a normal
		// permission violation.
		return Err(Errno::EFault);
	}
	let required = match fault_type {
		FaultType::Read => region::R,
		FaultType::Write => region::W,
		FaultType::Readonly => unreachable!(),
	};
	if region.perms & required == 0 {
		return Err(Errno::EFault);
	}
	let dirty = region.perms & region::W != 0;

	// --- Walk ---
	let vpn = page.page_index();
	let (mut paddr, is_exclusive) = {
		let entry = as_
			.directory
			.walk(vpn, true, frames)?
			.ok_or(Errno::ENoMem)?;
		(entry.frame(), entry.is_exclusive())
	};

	// --- Cow? ---
	if fault_type == FaultType::Write && !is_exclusive {
		paddr = cow_split(as_, vpn, frames)?;
	}

	// --- Emit ---
	#[cfg(feature = "vm-trace")]
	log::trace!("vm_fault: resolved {:?} -> {:?}, dirty={}", page, paddr, dirty);
	tlb.refill(page, paddr, dirty);
	Ok(())
}

fn validate<'a, P: Platform>(
	_fault_type: FaultType,
	page: VirtAddr,
	as_: &'a AddressSpace<P>,
) -> VmResult<&'a Region> {
	let (index, region) = as_.regions().retrieve_indexed(page).ok_or(Errno::EFault)?;
	let is_heap = as_.regions().heap_index() == Some(index);
	if is_heap && page >= as_.regions().heap_end() {
		// Past the break: the region reserves whole pages ahead of it, but only the
		// range below the break is actually backed.
		return Err(Errno::EFault);
	}
	Ok(region)
}

/// Splits a shared page out from under a write fault: allocates a fresh frame, copies the
/// old contents into it, and retargets the faulting entry to it. The old entry's sharers
/// (including the one we just detached from) keep their reduced `Arc` strong count.
fn cow_split<P: Platform>(
	as_: &mut AddressSpace<P>,
	vpn: usize,
	frames: &Arc<FrameTable<P>>,
) -> VmResult<PhysAddr> {
	let old_paddr = as_
		.directory
		.walk(vpn, false, frames)?
		.ok_or(Errno::EFault)?
		.frame();
	let new_paddr = frames.get_frame()?;
	unsafe {
		copy_page::<P>(old_paddr, new_paddr);
	}
	as_.directory.replace_frame(vpn, new_paddr, frames);
	Ok(new_paddr)
}

unsafe fn copy_page<P: Platform>(src: PhysAddr, dst: PhysAddr) {
	let src = P::physical_to_kernel(src).0 as *const u8;
	let dst = P::physical_to_kernel(dst).0 as *mut u8;
	unsafe {
		core::ptr::copy_nonoverlapping(src, dst, PAGE_SIZE);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::FakePlatform;

	fn setup() -> (
		AddressSpace<FakePlatform>,
		Arc<FrameTable<FakePlatform>>,
		Tlb<FakePlatform>,
	) {
		FakePlatform::install_ram(32 * PAGE_SIZE);
		let frames = Arc::new(FrameTable::new());
		frames.bootstrap();
		let mut as_ = AddressSpace::create();
		as_.define_region(VirtAddr(0x400000), 2 * PAGE_SIZE, region::R | region::W);
		(as_, frames, Tlb::new())
	}

	#[test]
	fn plain_demand_fault_materializes_and_refills() {
		let (mut as_, frames, tlb) = setup();
		vm_fault(FaultType::Write, VirtAddr(0x400abc), &mut as_, &frames, &tlb).unwrap();
		assert_eq!(tlb.clock_hand(), 1);
		// second fault at same page is idempotent
		vm_fault(FaultType::Read, VirtAddr(0x400abc), &mut as_, &frames, &tlb).unwrap();
	}

	#[test]
	fn readonly_fault_is_always_efault() {
		let (mut as_, frames, tlb) = setup();
		assert_eq!(
			vm_fault(FaultType::Readonly, VirtAddr(0x400000), &mut as_, &frames, &tlb),
			Err(Errno::EFault)
		);
	}

	#[test]
	fn fault_type_from_raw_rejects_unknown_codes() {
		assert_eq!(FaultType::try_from(0), Ok(FaultType::Read));
		assert_eq!(FaultType::try_from(1), Ok(FaultType::Write));
		assert_eq!(FaultType::try_from(2), Ok(FaultType::Readonly));
		assert_eq!(FaultType::try_from(3), Err(Errno::EInval));
	}

	#[test]
	fn fault_outside_any_region_is_efault() {
		let (mut as_, frames, tlb) = setup();
		assert_eq!(
			vm_fault(FaultType::Read, VirtAddr(0x900000), &mut as_, &frames, &tlb),
			Err(Errno::EFault)
		);
	}

	#[test]
	fn write_to_readonly_region_is_efault() {
		let (mut as_, frames, tlb) = setup();
		as_.define_region(VirtAddr(0x500000), PAGE_SIZE, region::R);
		assert_eq!(
			vm_fault(FaultType::Write, VirtAddr(0x500000), &mut as_, &frames, &tlb),
			Err(Errno::EFault)
		);
	}

	#[test]
	fn cow_split_isolates_parent_and_child_writes() {
		let (mut parent, frames, tlb) = setup();
		vm_fault(FaultType::Write, VirtAddr(0x400000), &mut parent, &frames, &tlb).unwrap();
		let parent_frame = parent
			.directory
			.walk(0x400000 / PAGE_SIZE, false, &frames)
			.unwrap()
			.unwrap()
			.frame();
		unsafe {
			let ptr = FakePlatform::physical_to_kernel(parent_frame).0 as *mut u32;
			*ptr = 0xdead_beef;
		}

		let mut child = parent.fork();
		vm_fault(FaultType::Write, VirtAddr(0x400000), &mut parent, &frames, &tlb).unwrap();
		unsafe {
			let entry = parent
				.directory
				.walk(0x400000 / PAGE_SIZE, false, &frames)
				.unwrap()
				.unwrap();
			let ptr = FakePlatform::physical_to_kernel(entry.frame()).0 as *mut u32;
			*ptr = 0x1111_1111;
		}

		let child_frame = child
			.directory
			.walk(0x400000 / PAGE_SIZE, false, &frames)
			.unwrap()
			.unwrap()
			.frame();
		let child_value = unsafe { *(FakePlatform::physical_to_kernel(child_frame).0 as *const u32) };
		assert_eq!(child_value, 0xdead_beef);

		let parent_entry = parent
			.directory
			.walk(0x400000 / PAGE_SIZE, false, &frames)
			.unwrap()
			.unwrap();
		let parent_value =
			unsafe { *(FakePlatform::physical_to_kernel(parent_entry.frame()).0 as *const u32) };
		assert_eq!(parent_value, 0x1111_1111);
		assert!(parent_entry.is_exclusive());

		child.destroy();
		parent.destroy();
	}

	#[test]
	fn out_of_memory_on_walk_is_reported() {
		FakePlatform::install_ram(PAGE_SIZE);
		let frames = Arc::new(FrameTable::new());
		frames.bootstrap();
		let mut as_: AddressSpace<FakePlatform> = AddressSpace::create();
		as_.define_region(VirtAddr(0x400000), 2 * PAGE_SIZE, region::R | region::W);
		let tlb = Tlb::new();
		vm_fault(FaultType::Write, VirtAddr(0x400000), &mut as_, &frames, &tlb).unwrap();
		assert_eq!(
			vm_fault(FaultType::Write, VirtAddr(0x401000), &mut as_, &frames, &tlb),
			Err(Errno::ENoMem)
		);
	}
}
