use core::ptr::NonNull;

use log::{trace, warn};

use crate::{
  ALIGNMENT,
  block::{BLOCK_HEADER_SIZE, BlockHeader, FreeBlock, MIN_BLOCK_SIZE},
  error::{HeapError, HeapResult},
  free_list::Neighbours,
  region::Heap,
};

impl Heap<'_> {
  /// Returns an allocation to the free list, merging it with any free block
  /// that touches it on either side.
  ///
  /// Pointers outside the payload range, misaligned ones and pointers to
  /// blocks that are already free are rejected with
  /// [`HeapError::InvalidPointer`] and leave the heap unchanged.
  ///
  /// # Safety
  ///
  /// `ptr` must have been returned by [`Heap::allocate`] on this heap. The
  /// heap keeps no record of live allocations, so a stale or foreign pointer
  /// that passes the checks above corrupts it.
  pub unsafe fn free(
    &mut self,
    ptr: NonNull<u8>,
  ) -> HeapResult<()> {
    let (block, size) = unsafe { self.block_of(ptr)? };
    let addr = block.as_ptr() as usize;
    let end = addr + BLOCK_HEADER_SIZE + size;

    // SAFETY: the free list is only ever modified through `&mut self`.
    let Some(Neighbours { left, right }) = (unsafe { self.free_list().neighbours(addr) }) else {
      warn!("[heap] free({:p}) -> block is already free", ptr);
      return Err(HeapError::InvalidPointer(ptr.as_ptr() as usize));
    };

    unsafe {
      let touching_left = left.filter(|&l| FreeBlock::end(l) == addr);
      let touching_right = right.filter(|&r| FreeBlock::addr(r) == end);

      match (touching_left, touching_right) {
        (None, None) => {
          let node = FreeBlock::write(block, size, None, None);
          self.free_list_mut().splice(left, node, right);
          trace!("[heap] free({:p}) -> {} bytes, no free neighbour", ptr, size);
        }
        (Some(l), None) => {
          let merged = FreeBlock::size(l) + BLOCK_HEADER_SIZE + size;
          FreeBlock::set_size(l, merged);
          trace!("[heap] free({:p}) -> merged into left block {:p}, now {}", ptr, l, merged);
        }
        (None, Some(r)) => {
          let merged = size + BLOCK_HEADER_SIZE + FreeBlock::size(r);
          self.free_list_mut().relocate(r, block, merged);
          trace!("[heap] free({:p}) -> absorbed right block {:p}, now {}", ptr, r, merged);
        }
        (Some(l), Some(r)) => {
          let merged =
            FreeBlock::size(l) + BLOCK_HEADER_SIZE + size + BLOCK_HEADER_SIZE + FreeBlock::size(r);
          self.free_list_mut().unlink(r);
          FreeBlock::set_size(l, merged);
          trace!("[heap] free({:p}) -> bridged {:p} and {:p}, now {}", ptr, l, r, merged);
        }
      }
    }

    Ok(())
  }

  /// Payload size granted to the allocation at `ptr`.
  ///
  /// # Safety
  ///
  /// `ptr` must have been returned by [`Heap::allocate`] on this heap and not
  /// freed since.
  pub unsafe fn size_of(
    &self,
    ptr: NonNull<u8>,
  ) -> HeapResult<usize> {
    unsafe { self.block_of(ptr).map(|(_, size)| size) }
  }

  /// Recovers the header address and payload size behind `ptr`.
  unsafe fn block_of(
    &self,
    ptr: NonNull<u8>,
  ) -> HeapResult<(NonNull<u8>, usize)> {
    let addr = ptr.as_ptr() as usize;
    let lowest = self.first_block().as_ptr() as usize + BLOCK_HEADER_SIZE;
    let end = self.end_addr();

    if addr < lowest || addr >= end || (addr - self.start_addr()) % ALIGNMENT != 0 {
      warn!("[heap] {:p} is not a payload address of this heap", ptr);
      return Err(HeapError::InvalidPointer(addr));
    }

    let header = unsafe { BlockHeader::of_payload(ptr) };
    let size = unsafe { (*header.as_ptr()).size };

    if size < MIN_BLOCK_SIZE || size % ALIGNMENT != 0 || size > end - addr {
      warn!("[heap] {:p} has an implausible block size {}", ptr, size);
      return Err(HeapError::InvalidPointer(addr));
    }

    Ok((header.cast(), size))
  }
}
