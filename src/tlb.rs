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

//! The software-managed TLB: a thin wrapper around [`Platform::tlb_write`] /
//! [`Platform::tlb_read`] that owns the clock-hand replacement policy.
//!
//! Every refill overwrites the slot the clock hand currently points at, unconditionally —
//! there is no reference-bit sweep. Interrupt masking around the read/write pair is the
//! caller's responsibility ([`crate::fault::vm_fault`] holds the frame table's lock, which
//! already masks interrupts, across this call).

use crate::addr::VirtAddr;
use crate::consts::NUM_TLB;
use crate::platform::{Platform, TlbEntry};
use core::marker::PhantomData;
use core::sync::atomic::{AtomicUsize, Ordering::Relaxed};

/// Owns the clock hand shared by every CPU's view of its own TLB.
///
/// A single [`Tlb`] is expected per kernel instance; `NUM_TLB` is a per-CPU hardware
/// constant, and the clock hand advances independently of which CPU last took a miss,
/// matching the uniprocessor source design this crate targets.
pub struct Tlb<P: Platform> {
	clock_hand: AtomicUsize,
	_platform: PhantomData<P>,
}

impl<P: Platform> Tlb<P> {
	/// Creates a fresh TLB tracker with the clock hand at slot 0.
	pub const fn new() -> Self {
		Self {
			clock_hand: AtomicUsize::new(0),
			_platform: PhantomData,
		}
	}

	/// Invalidates every slot. Called on address-space activate/deactivate.
	pub fn flush_all(&self) {
		for slot in 0..NUM_TLB {
			P::tlb_write(slot, TlbEntry::default());
		}
	}

	/// Writes a translation for `vaddr` into the slot the clock hand currently points at,
	/// then advances the hand, matching a round-robin (not LRU) replacement policy.
	pub fn refill(&self, vaddr: VirtAddr, paddr: crate::addr::PhysAddr, dirty: bool) {
		let slot = self.clock_hand.fetch_update(Relaxed, Relaxed, |h| Some((h + 1) % NUM_TLB));
		let slot = slot.unwrap_or(0);
		P::tlb_write(slot, TlbEntry {
			entry_hi: Some(vaddr.page_align_down()),
			entry_lo: paddr,
			dirty,
		});
	}

	/// The slot the clock hand currently occupies, for tests asserting the replacement
	/// sequence.
	pub fn clock_hand(&self) -> usize {
		self.clock_hand.load(Relaxed)
	}

	/// Invalidates a single remote CPU's TLB entry for a page being unmapped.
	///
	/// Not supported on the uniprocessor target this crate manages memory for: there is no
	/// remote CPU to interrupt. Calling this is a caller bug, not a runtime condition to
	/// recover from, so it panics rather than returning an error.
	pub fn shootdown_one(&self, _target: VirtAddr) -> ! {
		panic!("tlb shootdown of a single entry is not supported in a uniprocessor configuration");
	}
}

impl<P: Platform> Default for Tlb<P> {
	fn default() -> Self {
		Self::new()
	}
}
