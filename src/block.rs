use core::{mem, ptr::NonNull};

/// Metadata prefixed to every block, free or allocated.
///
/// `size` counts the payload only, never the header itself.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockHeader {
  pub size: usize,
}

/// Reference to a free block (its header address).
pub(crate) type Link = Option<NonNull<FreeBlock>>;

/// The first payload bytes of a free block, reused as list linkage.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct FreeLinks {
  pub prev: Link,
  pub next: Link,
}

/// A block while it sits in the free list.
///
/// The `links` overlay the payload. They are only meaningful while the block
/// is free; once handed out, the same bytes belong to the caller.
#[repr(C)]
#[derive(Debug)]
pub(crate) struct FreeBlock {
  pub header: BlockHeader,
  pub links: FreeLinks,
}

/// Bytes taken by a [`BlockHeader`] in front of every payload.
pub const BLOCK_HEADER_SIZE: usize = mem::size_of::<BlockHeader>();

/// Smallest payload able to carry the free-list links.
pub const MIN_BLOCK_SIZE: usize = mem::size_of::<FreeLinks>();

/// Smallest remainder worth splitting off: a header plus room for the links.
pub(crate) const MIN_SPLIT: usize = BLOCK_HEADER_SIZE + MIN_BLOCK_SIZE;

const _: () = assert!(MIN_BLOCK_SIZE == 2 * mem::size_of::<usize>());
const _: () = assert!(mem::size_of::<FreeBlock>() == BLOCK_HEADER_SIZE + MIN_BLOCK_SIZE);

impl FreeBlock {
  /// Writes a free block at `at` and returns a reference to it.
  ///
  /// # Safety
  ///
  /// `at` must be word aligned and valid for writes of
  /// `BLOCK_HEADER_SIZE + MIN_BLOCK_SIZE` bytes.
  pub unsafe fn write(
    at: NonNull<u8>,
    size: usize,
    prev: Link,
    next: Link,
  ) -> NonNull<FreeBlock> {
    let block = at.cast::<FreeBlock>();
    unsafe {
      block.write(FreeBlock {
        header: BlockHeader { size },
        links: FreeLinks { prev, next },
      });
    }
    block
  }

  pub fn addr(block: NonNull<FreeBlock>) -> usize {
    block.as_ptr() as usize
  }

  /// Address one past the last payload byte.
  ///
  /// # Safety
  ///
  /// `block` must point to a live free block.
  pub unsafe fn end(block: NonNull<FreeBlock>) -> usize {
    unsafe { Self::addr(block) + BLOCK_HEADER_SIZE + (*block.as_ptr()).header.size }
  }

  /// # Safety
  ///
  /// `block` must point to a live free block.
  pub unsafe fn size(block: NonNull<FreeBlock>) -> usize {
    unsafe { (*block.as_ptr()).header.size }
  }

  /// # Safety
  ///
  /// `block` must point to a live free block.
  pub unsafe fn set_size(
    block: NonNull<FreeBlock>,
    size: usize,
  ) {
    unsafe { (*block.as_ptr()).header.size = size }
  }

  /// # Safety
  ///
  /// `block` must point to a live free block.
  pub unsafe fn links(block: NonNull<FreeBlock>) -> FreeLinks {
    unsafe { (*block.as_ptr()).links }
  }
}

impl BlockHeader {
  /// Header of the block whose payload starts at `payload`.
  ///
  /// # Safety
  ///
  /// `payload` must be preceded by `BLOCK_HEADER_SIZE` bytes of the same region.
  pub unsafe fn of_payload(payload: NonNull<u8>) -> NonNull<BlockHeader> {
    unsafe { payload.sub(BLOCK_HEADER_SIZE).cast() }
  }

  /// Payload of the block whose header starts at `header`.
  ///
  /// # Safety
  ///
  /// `header` must point inside a region, in front of its payload.
  pub unsafe fn payload(header: NonNull<u8>) -> NonNull<u8> {
    unsafe { header.add(BLOCK_HEADER_SIZE) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_free_block_overlays_header() {
    let mut words = [0usize; 4];
    let at = NonNull::new(words.as_mut_ptr().cast::<u8>()).unwrap();

    unsafe {
      let block = FreeBlock::write(at, 3 * mem::size_of::<usize>(), None, None);

      assert_eq!(FreeBlock::addr(block), at.as_ptr() as usize);
      assert_eq!(FreeBlock::size(block), 3 * mem::size_of::<usize>());
      assert_eq!(FreeBlock::end(block), at.as_ptr() as usize + 4 * mem::size_of::<usize>());

      let header = BlockHeader::of_payload(BlockHeader::payload(at));
      assert_eq!(header.cast::<u8>(), at);
      assert_eq!((*header.as_ptr()).size, 3 * mem::size_of::<usize>());
    }
  }
}
