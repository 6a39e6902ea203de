use core::{fmt, marker::PhantomData, mem, ptr::NonNull};

use log::{debug, warn};

use crate::{
  ALIGNMENT, align,
  align::align_down,
  block::{BLOCK_HEADER_SIZE, FreeBlock, MIN_SPLIT},
  error::{HeapError, HeapResult},
  fit::FitStrategy,
  free_list::FreeList,
};

/// Bookkeeping stored at the start of a managed region.
#[repr(C)]
pub(crate) struct RegionHeader {
  pub total_size: usize,
  pub strategy: FitStrategy,
  pub free_list: FreeList,
}

/// Bytes reserved in front of the first block for the region header.
pub const REGION_HEADER_SIZE: usize = align!(mem::size_of::<RegionHeader>());

/// A heap carved out of one caller-supplied region.
///
/// Every piece of state, the header included, lives inside the region itself;
/// the handle is just its (word-aligned) start address.
pub struct Heap<'a> {
  base: NonNull<u8>,
  _region: PhantomData<&'a mut [u8]>,
}

// The region is exclusively owned by the handle, so moving it across threads
// is sound. Concurrent use still needs an outer lock.
unsafe impl Send for Heap<'_> {}

impl<'a> Heap<'a> {
  /// Smallest region length `init` accepts (for a word-aligned start).
  pub const MIN_REGION_SIZE: usize = REGION_HEADER_SIZE + MIN_SPLIT;

  /// Builds a heap over a borrowed byte slice.
  pub fn new(region: &'a mut [u8]) -> HeapResult<Self> {
    let len = region.len();
    let start = NonNull::from(region).cast::<u8>();
    // SAFETY: the slice is valid for reads and writes of `len` bytes for 'a.
    unsafe { Self::init(start, len) }
  }

  /// Formats `len` bytes at `start` as an empty heap.
  ///
  /// The start is rounded up and the length down to [`ALIGNMENT`]. Running
  /// `init` over a region that already hosts a heap discards every allocation
  /// it had.
  ///
  /// # Safety
  ///
  /// `start` must be valid for reads and writes of `len` bytes for `'a`, and
  /// nothing else may access those bytes while the heap is alive (payloads
  /// handed out by the heap excepted).
  pub unsafe fn init(
    start: NonNull<u8>,
    len: usize,
  ) -> HeapResult<Self> {
    let offset = start.as_ptr().align_offset(ALIGNMENT);
    let total_size = align_down(len.saturating_sub(offset));

    if total_size < Self::MIN_REGION_SIZE {
      warn!(
        "[heap] init({:p}, {}) -> region too small, {} bytes required",
        start,
        len,
        Self::MIN_REGION_SIZE
      );
      return Err(HeapError::RegionTooSmall {
        size: len,
        required: Self::MIN_REGION_SIZE,
      });
    }

    let mut heap = Self {
      base: unsafe { start.add(offset) },
      _region: PhantomData,
    };
    unsafe { heap.format(total_size) };

    debug!(
      "[heap] init({:p}, {}) -> base={:p} total={} capacity={}",
      start,
      len,
      heap.base,
      total_size,
      heap.capacity()
    );

    Ok(heap)
  }

  /// Drops every allocation and returns to a single free block.
  ///
  /// Pointers handed out before the reset must not be used afterwards.
  pub fn reset(&mut self) {
    let total_size = self.total_size();
    // SAFETY: the region was validated by `init` and is still owned by `self`.
    unsafe { self.format(total_size) };
    debug!("[heap] reset({:p}) -> capacity={}", self.base, self.capacity());
  }

  unsafe fn format(
    &mut self,
    total_size: usize,
  ) {
    unsafe {
      let first = FreeBlock::write(
        self.base.add(REGION_HEADER_SIZE),
        total_size - REGION_HEADER_SIZE - BLOCK_HEADER_SIZE,
        None,
        None,
      );
      self.base.cast::<RegionHeader>().write(RegionHeader {
        total_size,
        strategy: FitStrategy::default(),
        free_list: FreeList::new(Some(first)),
      });
    }
  }
}

impl Heap<'_> {
  fn header(&self) -> &RegionHeader {
    // SAFETY: `init` wrote the header and only `self` touches it.
    unsafe { self.base.cast::<RegionHeader>().as_ref() }
  }

  fn header_mut(&mut self) -> &mut RegionHeader {
    // SAFETY: as in `header`, plus `&mut self` makes the access exclusive.
    unsafe { self.base.cast::<RegionHeader>().as_mut() }
  }

  pub(crate) fn free_list(&self) -> &FreeList {
    &self.header().free_list
  }

  pub(crate) fn free_list_mut(&mut self) -> &mut FreeList {
    &mut self.header_mut().free_list
  }

  /// Strategy used by the next allocation.
  pub fn strategy(&self) -> FitStrategy {
    self.header().strategy
  }

  /// Switches the fit strategy; live allocations are unaffected.
  pub fn set_strategy(
    &mut self,
    strategy: FitStrategy,
  ) {
    debug!("[heap] strategy {} -> {}", self.strategy(), strategy);
    self.header_mut().strategy = strategy;
  }

  /// Managed bytes, region header included.
  pub fn total_size(&self) -> usize {
    self.header().total_size
  }

  /// Payload bytes available to a single allocation in an empty heap.
  pub fn capacity(&self) -> usize {
    self.total_size() - REGION_HEADER_SIZE - BLOCK_HEADER_SIZE
  }

  /// Header address of the first block.
  pub(crate) fn first_block(&self) -> NonNull<u8> {
    // SAFETY: `init` guarantees the region extends past its header.
    unsafe { self.base.add(REGION_HEADER_SIZE) }
  }

  pub(crate) fn start_addr(&self) -> usize {
    self.base.as_ptr() as usize
  }

  pub(crate) fn end_addr(&self) -> usize {
    self.start_addr() + self.total_size()
  }
}

impl fmt::Debug for Heap<'_> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Heap")
      .field("base", &self.base)
      .field("total_size", &self.total_size())
      .field("strategy", &self.strategy())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{block::MIN_BLOCK_SIZE, testing::arena};

  #[test]
  fn test_init_creates_single_free_block() {
    let region = arena(1024);
    let start = region.as_ptr() as usize;
    let heap = Heap::new(region).unwrap();

    assert_eq!(heap.total_size(), 1024);
    assert_eq!(heap.strategy(), FitStrategy::FirstFit);
    assert_eq!(heap.capacity(), 1024 - REGION_HEADER_SIZE - BLOCK_HEADER_SIZE);

    let blocks: Vec<_> = heap.blocks().collect();
    assert_eq!(blocks.len(), 1);
    assert!(blocks[0].is_free);
    assert_eq!(blocks[0].header_address(), start + REGION_HEADER_SIZE);
    assert_eq!(blocks[0].size, heap.capacity());
  }

  #[test]
  fn test_init_rejects_small_region() {
    let region = arena(Heap::MIN_REGION_SIZE - ALIGNMENT);
    let err = Heap::new(region).unwrap_err();

    assert_eq!(
      err,
      HeapError::RegionTooSmall {
        size: Heap::MIN_REGION_SIZE - ALIGNMENT,
        required: Heap::MIN_REGION_SIZE,
      }
    );
  }

  #[test]
  fn test_init_accepts_minimal_region() {
    let heap = Heap::new(arena(Heap::MIN_REGION_SIZE)).unwrap();

    assert_eq!(heap.capacity(), MIN_BLOCK_SIZE);
    assert!(heap.verify().is_ok());
  }

  #[test]
  fn test_init_aligns_unaligned_region() {
    let region = arena(256);
    let heap = Heap::new(&mut region[1..]).unwrap();

    assert_eq!(heap.start_addr() % ALIGNMENT, 0);
    assert_eq!(heap.total_size(), 256 - ALIGNMENT);
    assert!(heap.verify().is_ok());
  }

  #[test]
  fn test_reset_discards_allocations() {
    let mut heap = Heap::new(arena(512)).unwrap();
    heap.set_strategy(FitStrategy::WorstFit);
    heap.allocate(64).unwrap();
    heap.allocate(32).unwrap();

    heap.reset();

    assert_eq!(heap.strategy(), FitStrategy::FirstFit);
    let blocks: Vec<_> = heap.blocks().collect();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].size, heap.capacity());
  }

  #[test]
  fn test_reinit_same_region_is_hard_reset() {
    let region = arena(512);
    let start = NonNull::new(region.as_mut_ptr()).unwrap();

    unsafe {
      let mut first = Heap::init(start, 512).unwrap();
      first.allocate(100).unwrap();
      first.set_strategy(FitStrategy::BestFit);

      let second = Heap::init(start, 512).unwrap();
      assert_eq!(second.strategy(), FitStrategy::FirstFit);
      assert_eq!(second.stats().free_bytes, second.capacity());
    }
  }

  #[test]
  fn test_set_strategy() {
    let mut heap = Heap::new(arena(256)).unwrap();

    for strategy in FitStrategy::ALL {
      heap.set_strategy(strategy);
      assert_eq!(heap.strategy(), strategy);
    }
  }

  #[test]
  fn test_set_strategy_applies_to_next_allocation() {
    let mut heap = Heap::new(arena(1024)).unwrap();
    let large = heap.allocate(12 * ALIGNMENT).unwrap();
    let _gap = heap.allocate(ALIGNMENT).unwrap();
    let small = heap.allocate(6 * ALIGNMENT).unwrap();
    let _gap = heap.allocate(ALIGNMENT).unwrap();
    let rest = heap.stats().largest_free;
    heap.allocate(rest).unwrap();

    unsafe {
      heap.free(large).unwrap();
      heap.free(small).unwrap();
    }

    let expected = [
      (FitStrategy::FirstFit, large),
      (FitStrategy::BestFit, small),
      (FitStrategy::WorstFit, large),
      (FitStrategy::BestFit, small),
    ];
    for (strategy, hole) in expected {
      heap.set_strategy(strategy);
      let ptr = heap.allocate(4 * ALIGNMENT).unwrap();
      assert_eq!(ptr, hole, "{strategy}");
      unsafe { heap.free(ptr).unwrap() };
    }
    assert!(heap.verify().is_ok());
  }
}
