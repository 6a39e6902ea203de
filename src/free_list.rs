use core::{marker::PhantomData, ptr::NonNull};

use crate::block::{FreeBlock, Link};

/// Address-ordered, doubly linked list of free blocks.
///
/// Only the head lives here (inside the region header); every other link is
/// threaded through the free blocks' own payloads.
#[repr(C)]
#[derive(Debug, Default)]
pub(crate) struct FreeList {
  head: Link,
}

/// Position of an address relative to the free list.
pub(crate) struct Neighbours {
  /// Last free block starting below the address.
  pub left: Link,
  /// First free block starting above the address.
  pub right: Link,
}

impl FreeList {
  pub fn new(head: Link) -> Self {
    Self { head }
  }

  pub fn head(&self) -> Link {
    self.head
  }

  /// Iterates the free blocks in ascending address order.
  ///
  /// # Safety
  ///
  /// The list must be well formed and stay untouched while iterating.
  pub unsafe fn iter(&self) -> Iter<'_> {
    Iter {
      current: self.head,
      _list: PhantomData,
    }
  }

  /// Links `node` between `prev` and `next`, which must be adjacent in the list.
  ///
  /// # Safety
  ///
  /// `node` must be a writable free block lying between `prev` and `next`.
  pub unsafe fn splice(
    &mut self,
    prev: Link,
    node: NonNull<FreeBlock>,
    next: Link,
  ) {
    unsafe {
      (*node.as_ptr()).links.prev = prev;
      (*node.as_ptr()).links.next = next;

      match prev {
        Some(prev) => (*prev.as_ptr()).links.next = Some(node),
        None => self.head = Some(node),
      }
      if let Some(next) = next {
        (*next.as_ptr()).links.prev = Some(node);
      }
    }
  }

  /// Removes `node` from the list, joining its neighbours.
  ///
  /// # Safety
  ///
  /// `node` must be a member of this list.
  pub unsafe fn unlink(
    &mut self,
    node: NonNull<FreeBlock>,
  ) {
    unsafe {
      let links = FreeBlock::links(node);

      match links.prev {
        Some(prev) => (*prev.as_ptr()).links.next = links.next,
        None => self.head = links.next,
      }
      if let Some(next) = links.next {
        (*next.as_ptr()).links.prev = links.prev;
      }
    }
  }

  /// Moves `node` to `to` with a new `size`, keeping its place in the list.
  ///
  /// The caller guarantees `to` does not cross either neighbour, so the
  /// address order survives the move.
  ///
  /// # Safety
  ///
  /// `node` must be a member of this list and `to` must be writable for a full
  /// free block that does not overlap `node`'s header and links.
  pub unsafe fn relocate(
    &mut self,
    node: NonNull<FreeBlock>,
    to: NonNull<u8>,
    size: usize,
  ) -> NonNull<FreeBlock> {
    unsafe {
      let links = FreeBlock::links(node);
      let moved = FreeBlock::write(to, size, links.prev, links.next);
      self.splice(links.prev, moved, links.next);
      moved
    }
  }

  /// Finds the free blocks surrounding `addr`.
  ///
  /// Returns `None` when `addr` is the start of a free block or falls inside
  /// one, which means it cannot be the header of an allocated block.
  ///
  /// # Safety
  ///
  /// The list must be well formed.
  pub unsafe fn neighbours(
    &self,
    addr: usize,
  ) -> Option<Neighbours> {
    unsafe {
      let mut left: Link = None;

      for node in self.iter() {
        let start = FreeBlock::addr(node);
        if start > addr {
          return Some(Neighbours {
            left,
            right: Some(node),
          });
        }
        if start == addr || FreeBlock::end(node) > addr {
          return None;
        }
        left = Some(node);
      }

      Some(Neighbours { left, right: None })
    }
  }
}

/// Ascending walk over a [`FreeList`].
pub(crate) struct Iter<'a> {
  current: Link,
  _list: PhantomData<&'a FreeList>,
}

impl Iterator for Iter<'_> {
  type Item = NonNull<FreeBlock>;

  fn next(&mut self) -> Option<Self::Item> {
    let node = self.current?;
    // SAFETY: `FreeList::iter` requires a well-formed list.
    self.current = unsafe { FreeBlock::links(node).next };
    Some(node)
  }
}
