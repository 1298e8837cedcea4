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

//! A software model of the hardware this crate depends on, used only by the test suite.
//!
//! [`FakePlatform`] backs "physical memory" with a plain heap buffer, with physical address 0
//! corresponding to the buffer's first byte. Kernel-virtual addresses are deliberately *not*
//! the same numbers as physical ones — they're the host pointer into that buffer plus the
//! physical offset — so that code which forgets to translate through
//! [`Platform::physical_to_kernel`] before dereferencing fails under test instead of
//! accidentally working. Its TLB is a flat array in a thread-local, and interrupt masking is
//! tracked but never actually blocks anything, since host unit tests are single-threaded per
//! test.

use crate::addr::{PhysAddr, VirtAddr};
use crate::consts::NUM_TLB;
use crate::platform::{Platform, TlbEntry};
use std::cell::RefCell;

struct State {
	ram: Vec<u8>,
	tlb: [TlbEntry; NUM_TLB],
	interrupts_enabled: bool,
}

thread_local! {
	static STATE: RefCell<State> = RefCell::new(State {
		ram: Vec::new(),
		tlb: [TlbEntry::default(); NUM_TLB],
		interrupts_enabled: true,
	});
}

/// A `Platform` implementation backed entirely by host memory, for unit tests.
pub struct FakePlatform;

impl FakePlatform {
	/// (Re)installs `bytes` bytes of simulated RAM, discarding any previous contents, TLB
	/// state and interrupt state. Every test that exercises the frame table or anything
	/// built on it must call this first.
	pub fn install_ram(bytes: usize) {
		STATE.with(|s| {
			let mut s = s.borrow_mut();
			s.ram = vec![0u8; bytes];
			s.tlb = [TlbEntry::default(); NUM_TLB];
			s.interrupts_enabled = true;
		});
	}

	/// Returns the current interrupt-enabled flag, for assertions in tests that care about
	/// fault-handler critical sections being properly bracketed.
	pub fn interrupts_enabled() -> bool {
		STATE.with(|s| s.borrow().interrupts_enabled)
	}
}

impl Platform for FakePlatform {
	fn ram_range() -> (PhysAddr, PhysAddr) {
		let len = STATE.with(|s| s.borrow().ram.len());
		(PhysAddr(0), PhysAddr(len))
	}

	fn physical_to_kernel(addr: PhysAddr) -> VirtAddr {
		let base = STATE.with(|s| s.borrow().ram.as_ptr() as usize);
		VirtAddr(base + addr.0)
	}

	fn kernel_to_physical(addr: VirtAddr) -> PhysAddr {
		let base = STATE.with(|s| s.borrow().ram.as_ptr() as usize);
		PhysAddr(addr.0 - base)
	}

	fn tlb_read(index: usize) -> TlbEntry {
		STATE.with(|s| s.borrow().tlb[index])
	}

	fn tlb_write(index: usize, entry: TlbEntry) {
		STATE.with(|s| s.borrow_mut().tlb[index] = entry);
	}

	fn is_interrupt_enabled() -> bool {
		STATE.with(|s| s.borrow().interrupts_enabled)
	}

	fn interrupts_disable() {
		STATE.with(|s| s.borrow_mut().interrupts_enabled = false);
	}

	fn interrupts_enable() {
		STATE.with(|s| s.borrow_mut().interrupts_enabled = true);
	}
}
