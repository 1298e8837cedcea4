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

//! The hardware facade this crate is generic over.
//!
//! Everything outside this crate's own reasoning — the physical RAM range handed to it at
//! boot, the mapping between kernel-virtual and physical addresses, the TLB device, and
//! interrupt masking — is accessed exclusively through [`Platform`]. Every public type in
//! this crate that touches hardware is parameterized by a `P: Platform`, so the whole
//! subsystem can be exercised against a software model in tests (see
//! [`crate::test_support::FakePlatform`]) without ever linking in architecture code.

use crate::addr::{PhysAddr, VirtAddr};

/// One hardware TLB slot's contents, as written or read by [`Platform::tlb_write`] /
/// [`Platform::tlb_read`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TlbEntry {
	/// The virtual page number this entry translates, or `None` if the slot is invalid.
	pub entry_hi: Option<VirtAddr>,
	/// The physical frame this entry translates to.
	pub entry_lo: PhysAddr,
	/// Whether writes to the mapped page are permitted.
	pub dirty: bool,
}

/// The architecture- and board-specific operations the virtual-memory subsystem needs from
/// the rest of the kernel.
///
/// Implementations are zero-sized marker types; every method is a free function dispatched
/// through the `P: Platform` type parameter carried by [`crate::frame::FrameTable`],
/// [`crate::address_space::AddressSpace`] and [`crate::fault`], rather than through a vtable,
/// mirroring the way the teacher kernel calls straight into `crate::arch::x86` free
/// functions instead of going through a trait object.
pub trait Platform: Sized + 'static {
	/// Returns the `[low, high)` physical address range available for the frame table to
	/// manage, as reported by the boot loader.
	fn ram_range() -> (PhysAddr, PhysAddr);

	/// Translates a physical address to the kernel's virtual alias of it, used to zero-fill
	/// and copy frame contents without mapping them into user space.
	fn physical_to_kernel(addr: PhysAddr) -> VirtAddr;

	/// The inverse of [`Self::physical_to_kernel`].
	fn kernel_to_physical(addr: VirtAddr) -> PhysAddr;

	/// Reads the hardware TLB slot `index`.
	///
	/// # Panics
	///
	/// May panic if `index >= NUM_TLB`.
	fn tlb_read(index: usize) -> TlbEntry;

	/// Writes `entry` into hardware TLB slot `index`, or invalidates the slot if
	/// `entry.entry_hi` is `None`.
	///
	/// # Panics
	///
	/// May panic if `index >= NUM_TLB`.
	fn tlb_write(index: usize, entry: TlbEntry);

	/// Returns whether interrupts are currently enabled on the calling CPU.
	fn is_interrupt_enabled() -> bool;

	/// Disables interrupts on the calling CPU.
	fn interrupts_disable();

	/// Enables interrupts on the calling CPU.
	fn interrupts_enable();
}
