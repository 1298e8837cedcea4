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

//! Layout constants for the 32-bit, software-TLB target this crate manages memory for.

/// The size in bytes of a single page, and the granularity of every allocation the frame
/// table and page table deal in.
pub const PAGE_SIZE: usize = 4096;

/// Mask isolating the page offset bits of a virtual or physical address.
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// The number of entries in a first-level page directory, and the number of second-level
/// tables addressable by bits 31..22 of a virtual address.
pub const PAGE_TABLE_ONE_SIZE: usize = 1024;

/// The number of second-level slots addressable by bits 21..12 of a virtual address.
pub const PAGE_TABLE_TWO_SIZE: usize = 1024;

/// The fixed top-of-memory virtual address the user stack grows down from.
pub const USERSTACK: usize = 0x8000_0000;

/// The number of pages reserved for the user stack below [`USERSTACK`].
pub const USER_STACKPAGES: usize = 16;

/// The number of entries in the hardware TLB.
pub const NUM_TLB: usize = 64;
