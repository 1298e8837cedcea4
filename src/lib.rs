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

//! Software-managed virtual memory for a teaching kernel.
//!
//! This crate owns everything between a TLB-miss exception and a resolved translation: the
//! physical [`frame`] allocator, the per-process [`region`] list and two-level [`page_table`],
//! copy-on-write sharing across [`address_space::AddressSpace::fork`], the [`tlb`] clock-hand
//! replacement policy, [`fault::vm_fault`] itself, and [`heap::sbrk`] for growing or shrinking
//! the break. It does not own page-in-from-disk, swap, memory-mapped files or shared-memory
//! segments — this is demand paging against zero-filled and forked frames only.
//!
//! Everything that reaches actual hardware — RAM layout, the kernel-virtual/physical address
//! mapping, the TLB device, interrupt masking — goes through the [`platform::Platform`] trait,
//! so the whole subsystem builds and runs its test suite on the host via
//! [`test_support::FakePlatform`] without any architecture code.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod addr;
pub mod address_space;
pub mod consts;
pub mod errno;
pub mod fault;
pub mod frame;
pub mod heap;
pub mod page_table;
pub mod platform;
pub mod region;
pub mod sync;
pub mod tlb;

#[cfg(test)]
mod test_support;
