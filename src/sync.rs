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

//! Mutually exclusive access primitive based on a spinlock.
//!
//! A [`Spin`] protects its wrapped data from being accessed concurrently, avoiding data
//! races. One particularity with kernel development is that multi-threading is not the only
//! way to get concurrency issues: an interrupt, including the very TLB-miss exception this
//! crate answers, may be triggered at any moment. For this reason, [`IntSpin`] additionally
//! masks interrupts for the duration of the critical section.

use crate::platform::Platform;
use core::{
	cell::UnsafeCell,
	fmt::{self, Formatter},
	hint,
	ops::{Deref, DerefMut},
	sync::atomic::{
		AtomicBool,
		Ordering::{Acquire, Release},
	},
};

#[inline(always)]
fn raw_lock(lock: &AtomicBool) {
	while lock.swap(true, Acquire) {
		hint::spin_loop();
	}
}

/// Unlocks the associated [`Spin`] when dropped.
pub struct SpinGuard<'m, T: ?Sized> {
	spin: &'m Spin<T>,
}

impl<T: ?Sized> Deref for SpinGuard<'_, T> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		unsafe { &*self.spin.data.get() }
	}
}

impl<T: ?Sized> DerefMut for SpinGuard<'_, T> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		unsafe { &mut *self.spin.data.get() }
	}
}

impl<T: ?Sized> !Send for SpinGuard<'_, T> {}

unsafe impl<T: ?Sized + Sync> Sync for SpinGuard<'_, T> {}

impl<T: ?Sized + fmt::Debug> fmt::Debug for SpinGuard<'_, T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self.deref(), f)
	}
}

impl<T: ?Sized> Drop for SpinGuard<'_, T> {
	fn drop(&mut self) {
		self.spin.spin.store(false, Release);
	}
}

/// Wraps a value which may be accessed by only one context at a time.
///
/// Plain spinlock: does not mask interrupts. Used for locks that are never held across a
/// TLB write, such as a single page entry's COW lock.
pub struct Spin<T: ?Sized> {
	spin: AtomicBool,
	data: UnsafeCell<T>,
}

impl<T> Spin<T> {
	/// Creates a new instance wrapping `data`.
	pub const fn new(data: T) -> Self {
		Self {
			spin: AtomicBool::new(false),
			data: UnsafeCell::new(data),
		}
	}

	/// Consumes the lock and returns the inner value.
	pub fn into_inner(self) -> T {
		self.data.into_inner()
	}
}

impl<T: Default> Default for Spin<T> {
	fn default() -> Self {
		Self::new(Default::default())
	}
}

impl<T: ?Sized> Spin<T> {
	/// Acquires the spinlock, spinning until it becomes available.
	pub fn lock(&self) -> SpinGuard<T> {
		raw_lock(&self.spin);
		SpinGuard {
			spin: self,
		}
	}
}

unsafe impl<T> Sync for Spin<T> {}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Spin<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let guard = self.lock();
		fmt::Debug::fmt(&*guard, f)
	}
}

/// A spinlock that additionally masks interrupts on the calling CPU for the duration of the
/// critical section, restoring the prior interrupt state on release.
///
/// Used for state reachable from the TLB-fault path, most importantly the frame table's
/// free-list lock: re-entering the fault handler on the same CPU while that lock is held
/// would deadlock, so interrupts (including the timer tick that could trigger a reschedule
/// into other faulting code) stay masked until the critical section ends.
pub struct IntSpin<T: ?Sized> {
	inner: Spin<T>,
}

impl<T> IntSpin<T> {
	/// Creates a new instance wrapping `data`.
	pub const fn new(data: T) -> Self {
		Self {
			inner: Spin::new(data),
		}
	}
}

impl<T: ?Sized> IntSpin<T> {
	/// Runs `f` with exclusive, interrupt-masked access to the wrapped value.
	pub fn with<P: Platform, R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
		let enabled = P::is_interrupt_enabled();
		P::interrupts_disable();
		let result = {
			let mut guard = self.inner.lock();
			f(&mut guard)
		};
		if enabled {
			P::interrupts_enable();
		}
		result
	}
}
