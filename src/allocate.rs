use core::ptr::{self, NonNull};

use log::{trace, warn};

use crate::{
  align,
  block::{BLOCK_HEADER_SIZE, BlockHeader, FreeBlock, MIN_BLOCK_SIZE, MIN_SPLIT},
  error::{HeapError, HeapResult},
  region::Heap,
};

impl Heap<'_> {
  /// Carves at least `size` bytes out of the free list.
  ///
  /// The granted size is `size` rounded up to the word and to
  /// [`MIN_BLOCK_SIZE`]; it can be larger still when the chosen block is too
  /// small to split. [`Heap::size_of`] reports what was actually granted.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> HeapResult<NonNull<u8>> {
    if size == 0 {
      return Err(HeapError::ZeroSize);
    }
    if size > self.capacity() {
      return Err(self.out_of_memory(size));
    }

    let wanted = align!(size).max(MIN_BLOCK_SIZE);
    let strategy = self.strategy();

    // SAFETY: the free list is only ever modified through `&mut self`.
    let Some(candidate) = (unsafe { strategy.select(self.free_list(), wanted) }) else {
      return Err(self.out_of_memory(size));
    };

    unsafe {
      let available = FreeBlock::size(candidate);
      let block = candidate.cast::<u8>();

      if available - wanted < MIN_SPLIT {
        self.free_list_mut().unlink(candidate);
        trace!(
          "[heap] allocate({}) -> {:p} whole block of {} ({})",
          size,
          block,
          available,
          strategy
        );
      } else {
        let tail = block.add(BLOCK_HEADER_SIZE + wanted);
        let remainder = available - wanted - BLOCK_HEADER_SIZE;
        self.free_list_mut().relocate(candidate, tail, remainder);
        block.cast::<BlockHeader>().write(BlockHeader { size: wanted });
        trace!(
          "[heap] allocate({}) -> {:p} split {} into {} + {} free at {:p} ({})",
          size,
          block,
          available,
          wanted,
          remainder,
          tail,
          strategy
        );
      }

      Ok(BlockHeader::payload(block))
    }
  }

  /// Resizes an allocation, moving it only when it has to grow past the
  /// granted size.
  ///
  /// On failure the original allocation is left untouched.
  ///
  /// # Safety
  ///
  /// `ptr` must have been returned by this heap and not freed since.
  pub unsafe fn reallocate(
    &mut self,
    ptr: NonNull<u8>,
    size: usize,
  ) -> HeapResult<NonNull<u8>> {
    let granted = unsafe { self.size_of(ptr)? };

    if size == 0 {
      return Err(HeapError::ZeroSize);
    }
    if size <= granted {
      trace!("[heap] reallocate({:p}, {}) -> fits in {} bytes", ptr, size, granted);
      return Ok(ptr);
    }

    let moved = self.allocate(size)?;
    unsafe {
      ptr::copy_nonoverlapping(ptr.as_ptr(), moved.as_ptr(), granted);
      self.free(ptr)?;
    }
    trace!("[heap] reallocate({:p}, {}) -> moved to {:p}", ptr, size, moved);

    Ok(moved)
  }

  fn out_of_memory(
    &self,
    requested: usize,
  ) -> HeapError {
    // SAFETY: read-only walk of a well-formed list.
    let largest_free = unsafe {
      self
        .free_list()
        .iter()
        .map(|block| FreeBlock::size(block))
        .max()
        .unwrap_or(0)
    };
    warn!(
      "[heap] allocate({}) -> out of memory, largest free block {} ({})",
      requested,
      largest_free,
      self.strategy()
    );
    HeapError::OutOfMemory {
      requested,
      largest_free,
    }
  }
}
