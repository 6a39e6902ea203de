//! # rallocator - A Free-List Heap over a Caller-Supplied Region
//!
//! This crate manages one contiguous, pre-existing block of memory (a static
//! buffer, an `mmap`ed area, a slice of a bigger arena) as a `malloc`/`free`
//! style heap. It never asks the operating system for memory and never grows
//! the region it was given.
//!
//! ## Overview
//!
//! Every byte of the region belongs either to the region header or to exactly
//! one block. Free blocks are chained in an address-ordered, doubly linked list
//! threaded through their own payloads:
//!
//! ```text
//!   Region Layout:
//!
//!   base                                                      base + total_size
//!   ┌──────────────┬───┬──────────┬───┬─────────────────┬───┬──────────┐
//!   │ RegionHeader │ H │ used (A) │ H │    free (F1)    │ H │ used (B) │
//!   │ total_size   │   │          │   │ prev │ next ────┼─▶ None       │
//!   │ strategy     │   │          │   │      │          │   │          │
//!   │ free head ───┼───┼──────────┼──▶│      │          │   │          │
//!   └──────────────┴───┴──────────┴───┴─────────────────┴───┴──────────┘
//!                   ▲                  ▲
//!                   │                  └── links live in the free payload
//!                   └── BlockHeader { size }: payload bytes, header excluded
//! ```
//!
//! Two free blocks are never adjacent: freeing a block merges it with a free
//! neighbour on either side.
//!
//! ## Crate Structure
//!
//! ```text
//!   rallocator
//!   ├── align      - Word alignment (align!, ALIGNMENT)
//!   ├── block      - Block header and free-block overlay (internal)
//!   ├── free_list  - Address-ordered free list (internal)
//!   ├── fit        - FitStrategy: first, best and worst fit
//!   ├── region     - Heap handle, region header, init/reset
//!   ├── allocate   - allocate, reallocate
//!   ├── free       - free with coalescing, size_of
//!   ├── walk       - Block walk, stats, invariant checks
//!   └── error      - HeapError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rallocator::{FitStrategy, Heap};
//!
//! let mut region = vec![0u8; 4096];
//! let mut heap = Heap::new(&mut region).unwrap();
//! heap.set_strategy(FitStrategy::BestFit);
//!
//! let ptr = heap.allocate(100).unwrap();
//! unsafe {
//!     ptr.cast::<u32>().write(42);
//!     assert!(heap.size_of(ptr).unwrap() >= 100);
//!     heap.free(ptr).unwrap();
//! }
//!
//! for block in heap.blocks() {
//!     let state = if block.is_free { "free" } else { "used" };
//!     println!("{:#x} {:>6} {}", block.address, block.size, state);
//! }
//! ```
//!
//! ## How It Works
//!
//! Allocation asks the active [`FitStrategy`] for a free block, then either
//! hands the whole block out or splits it:
//!
//! ```text
//!   Split (remainder large enough to hold a header and two links):
//!
//!   before: │ H │               free, size S                 │
//!   after:  │ H │ used, size n │ H │  free, size S - n - H   │
//!                ▲
//!                └── pointer returned to the caller
//!
//!   Otherwise the caller receives all S bytes.
//! ```
//!
//! Freeing looks up the free blocks just before and after the block and
//! handles the four cases: no free neighbour, left only, right only, both.
//!
//! ## Limitations
//!
//! - **Single-threaded**: `Heap` is `Send`, not `Sync`; wrap it in a lock to
//!   share it
//! - **No live-set**: a stale pointer that still looks like a block header is
//!   not detected
//! - **Word alignment only**: payloads are aligned to `usize`
//!
//! ## Safety
//!
//! `allocate` is safe. Everything that takes a pointer back (`free`,
//! `size_of`, `reallocate`) is `unsafe`: the pointer must come from the same
//! heap and still be live.

pub mod align;
mod allocate;
mod block;
mod error;
mod fit;
mod free;
mod free_list;
mod region;
mod walk;

#[cfg(test)]
mod testing;

pub use align::ALIGNMENT;
pub use block::{BLOCK_HEADER_SIZE, MIN_BLOCK_SIZE};
pub use error::{HeapError, HeapResult};
pub use fit::FitStrategy;
pub use region::{Heap, REGION_HEADER_SIZE};
pub use walk::{BlockInfo, Blocks, HeapStats};
