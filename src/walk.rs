use core::{iter::FusedIterator, marker::PhantomData};

use crate::{
  ALIGNMENT,
  block::{BLOCK_HEADER_SIZE, BlockHeader, FreeBlock, Link, MIN_BLOCK_SIZE},
  error::{HeapError, HeapResult},
  free_list::FreeList,
  region::Heap,
};

/// One block as seen by a walk over the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Payload address; for allocated blocks, what `allocate` returned.
  pub address: usize,
  /// Payload size in bytes.
  pub size: usize,
  pub is_free: bool,
}

impl BlockInfo {
  /// Address of the block header in front of the payload.
  pub fn header_address(&self) -> usize {
    self.address - BLOCK_HEADER_SIZE
  }

  /// Address one past the last payload byte, i.e. the next block's header.
  pub fn end(&self) -> usize {
    self.address + self.size
  }
}

/// Usage summary of a heap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub total_size: usize,
  pub free_bytes: usize,
  pub used_bytes: usize,
  pub free_blocks: usize,
  pub allocated_blocks: usize,
  pub largest_free: usize,
}

impl HeapStats {
  /// Bytes spent on the region header and block headers.
  pub fn overhead(&self) -> usize {
    self.total_size - self.free_bytes - self.used_bytes
  }
}

/// Ascending walk over every block of a heap.
///
/// Free blocks are recognised by matching the walk position against the free
/// list, which is advanced in step; everything else is an allocated block.
pub struct Blocks<'h> {
  cursor: *const u8,
  end: usize,
  next_free: Link,
  _list: PhantomData<&'h FreeList>,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    let addr = self.cursor as usize;
    if addr >= self.end {
      return None;
    }

    // SAFETY: `cursor` is a block header inside the region as long as the
    // partition holds; `Heap::blocks` borrows the heap so nothing mutates it.
    let (size, is_free) = unsafe {
      match self.next_free {
        Some(free) if FreeBlock::addr(free) == addr => {
          self.next_free = FreeBlock::links(free).next;
          (FreeBlock::size(free), true)
        }
        _ => ((*self.cursor.cast::<BlockHeader>()).size, false),
      }
    };

    let step = BLOCK_HEADER_SIZE.saturating_add(size).min(self.end - addr);
    self.cursor = self.cursor.wrapping_add(step);

    Some(BlockInfo {
      address: addr + BLOCK_HEADER_SIZE,
      size,
      is_free,
    })
  }
}

impl FusedIterator for Blocks<'_> {}

impl Heap<'_> {
  /// Walks the region from its first block to its end.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      cursor: self.first_block().as_ptr(),
      end: self.end_addr(),
      next_free: self.free_list().head(),
      _list: PhantomData,
    }
  }

  /// Calls `visitor` once per block, in address order.
  pub fn walk<F>(
    &self,
    mut visitor: F,
  ) where
    F: FnMut(&BlockInfo),
  {
    for block in self.blocks() {
      visitor(&block);
    }
  }

  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      total_size: self.total_size(),
      ..HeapStats::default()
    };

    for block in self.blocks() {
      if block.is_free {
        stats.free_bytes += block.size;
        stats.free_blocks += 1;
        stats.largest_free = stats.largest_free.max(block.size);
      } else {
        stats.used_bytes += block.size;
        stats.allocated_blocks += 1;
      }
    }

    stats
  }

  /// Checks the layout invariants, reporting the first one that is broken.
  ///
  /// - blocks tile the region with no gap or overlap;
  /// - no two free blocks are adjacent;
  /// - the free list is address ordered, its back links agree and it holds
  ///   exactly the free blocks the walk finds.
  pub fn verify(&self) -> HeapResult<()> {
    let corrupted = |address, reason| Err(HeapError::Corrupted { address, reason });
    let end = self.end_addr();
    let mut expected = self.first_block().as_ptr() as usize;
    let mut previous_free = false;
    let mut free_seen = 0;

    for block in self.blocks() {
      if block.header_address() != expected {
        return corrupted(expected, "gap or overlap between blocks");
      }
      if block.size < MIN_BLOCK_SIZE || block.size % ALIGNMENT != 0 {
        return corrupted(block.header_address(), "invalid block size");
      }
      if block.end() > end {
        return corrupted(block.header_address(), "block runs past the region end");
      }
      if block.is_free {
        if previous_free {
          return corrupted(block.header_address(), "adjacent free blocks");
        }
        free_seen += 1;
      }
      previous_free = block.is_free;
      expected = block.end();
    }

    if expected != end {
      return corrupted(expected, "blocks stop short of the region end");
    }

    let mut previous: Link = None;
    let mut listed = 0;
    // SAFETY: read-only; the cycle guard below stops on a looping list.
    for node in unsafe { self.free_list().iter() } {
      let addr = FreeBlock::addr(node);
      if unsafe { FreeBlock::links(node).prev } != previous {
        return corrupted(addr, "free list back link mismatch");
      }
      if previous.is_some_and(|p| FreeBlock::addr(p) >= addr) {
        return corrupted(addr, "free list out of address order");
      }
      listed += 1;
      if listed > free_seen {
        return corrupted(addr, "free list holds blocks outside the walk");
      }
      previous = Some(node);
    }

    if listed != free_seen {
      return corrupted(self.start_addr(), "free list misses free blocks");
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use core::ptr::NonNull;

  use super::*;
  use crate::{fit::FitStrategy, region::REGION_HEADER_SIZE, testing::arena};

  #[test]
  fn test_walk_visits_every_block_in_order() {
    let mut heap = Heap::new(arena(1024)).unwrap();
    let a = heap.allocate(64).unwrap();
    let b = heap.allocate(32).unwrap();
    unsafe { heap.free(a).unwrap() };

    let mut seen = Vec::new();
    heap.walk(|block| seen.push(*block));

    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], BlockInfo { address: a.as_ptr() as usize, size: 64, is_free: true });
    assert_eq!(seen[1], BlockInfo { address: b.as_ptr() as usize, size: 32, is_free: false });
    assert!(seen[2].is_free);
    assert_eq!(seen[0].header_address(), heap.start_addr() + REGION_HEADER_SIZE);
    assert_eq!(seen[2].end(), heap.end_addr());
    assert_eq!(heap.blocks().collect::<Vec<_>>(), seen);
  }

  #[test]
  fn test_stats() {
    let mut heap = Heap::new(arena(1024)).unwrap();
    heap.allocate(64).unwrap();
    heap.allocate(128).unwrap();

    let stats = heap.stats();
    assert_eq!(stats.total_size, 1024);
    assert_eq!(stats.used_bytes, 192);
    assert_eq!(stats.allocated_blocks, 2);
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.largest_free, stats.free_bytes);
    assert_eq!(stats.overhead(), REGION_HEADER_SIZE + 3 * BLOCK_HEADER_SIZE);
  }

  #[test]
  fn test_verify_detects_adjacent_free_blocks() {
    let mut heap = Heap::new(arena(1024)).unwrap();
    let _a = heap.allocate(64).unwrap();
    let b = heap.allocate(64).unwrap();
    assert!(heap.verify().is_ok());

    // Hand-build a free block next to the tail without merging.
    unsafe {
      let tail = heap.free_list().head().unwrap();
      let header = BlockHeader::of_payload(b).cast::<u8>();
      let node = FreeBlock::write(header, 64, None, None);
      heap.free_list_mut().splice(None, node, Some(tail));
    }

    assert!(matches!(
      heap.verify(),
      Err(HeapError::Corrupted { reason: "adjacent free blocks", .. })
    ));
  }

  #[test]
  fn test_verify_detects_broken_sizes() {
    let mut heap = Heap::new(arena(1024)).unwrap();
    let a = heap.allocate(64).unwrap();

    unsafe {
      let header = BlockHeader::of_payload(a);
      (*header.as_ptr()).size = 56;
    }

    assert!(matches!(
      heap.verify(),
      Err(HeapError::Corrupted { reason: "invalid block size", .. })
    ));
  }

  mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
      Allocate(usize),
      Free(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
      prop_oneof![
        (1usize..300).prop_map(Op::Allocate),
        any::<usize>().prop_map(Op::Free),
      ]
    }

    fn strategy() -> impl Strategy<Value = FitStrategy> {
      prop_oneof![
        Just(FitStrategy::FirstFit),
        Just(FitStrategy::BestFit),
        Just(FitStrategy::WorstFit),
      ]
    }

    proptest! {
      #[test]
      fn prop_invariants_hold_under_random_ops(
        fit in strategy(),
        ops in prop::collection::vec(op(), 1..120),
      ) {
        let mut heap = Heap::new(arena(4096)).unwrap();
        heap.set_strategy(fit);
        let mut live: Vec<NonNull<u8>> = Vec::new();

        for op in ops {
          match op {
            Op::Allocate(size) => match heap.allocate(size) {
              Ok(ptr) => {
                let granted = unsafe { heap.size_of(ptr).unwrap() };
                prop_assert!(granted >= size);
                live.push(ptr);
              }
              Err(HeapError::OutOfMemory { largest_free, .. }) => {
                prop_assert!(largest_free < size.max(MIN_BLOCK_SIZE));
              }
              Err(err) => prop_assert!(false, "unexpected error: {}", err),
            },
            Op::Free(pick) if !live.is_empty() => {
              let ptr = live.swap_remove(pick % live.len());
              let freed = unsafe { heap.free(ptr) };
              prop_assert_eq!(freed, Ok(()));
            }
            Op::Free(_) => {}
          }

          prop_assert_eq!(heap.verify(), Ok(()));
          let stats = heap.stats();
          prop_assert_eq!(stats.allocated_blocks, live.len());
          prop_assert_eq!(
            stats.overhead(),
            REGION_HEADER_SIZE + (stats.free_blocks + stats.allocated_blocks) * BLOCK_HEADER_SIZE
          );
        }

        for ptr in live {
          let freed = unsafe { heap.free(ptr) };
          prop_assert_eq!(freed, Ok(()));
        }
        let blocks: Vec<_> = heap.blocks().collect();
        prop_assert_eq!(blocks.len(), 1);
        prop_assert!(blocks[0].is_free);
        prop_assert_eq!(blocks[0].size, heap.capacity());
      }

      #[test]
      fn prop_allocate_then_free_round_trips(
        fit in strategy(),
        setup in prop::collection::vec(1usize..200, 0..12),
        holes in prop::collection::vec(any::<bool>(), 12),
        size in 1usize..400,
      ) {
        let mut heap = Heap::new(arena(4096)).unwrap();
        heap.set_strategy(fit);

        let ptrs: Vec<_> = setup.iter().filter_map(|&n| heap.allocate(n).ok()).collect();
        for (ptr, hole) in ptrs.into_iter().zip(holes) {
          if hole {
            unsafe { heap.free(ptr).unwrap() };
          }
        }

        let before: Vec<_> = heap.blocks().collect();
        if let Ok(ptr) = heap.allocate(size) {
          unsafe { heap.free(ptr).unwrap() };
        }
        prop_assert_eq!(heap.blocks().collect::<Vec<_>>(), before);
      }
    }
  }
}
