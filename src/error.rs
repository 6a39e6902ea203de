use thiserror::Error;

/// Result of a heap operation.
pub type HeapResult<T> = Result<T, HeapError>;

/// Heap errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
  #[error("Zero-sized allocation request")]
  ZeroSize,

  #[error("Out of memory: requested {requested} bytes, largest free block {largest_free} bytes")]
  OutOfMemory { requested: usize, largest_free: usize },

  #[error("Region too small: {size} bytes given, at least {required} bytes required")]
  RegionTooSmall { size: usize, required: usize },

  #[error("Invalid heap pointer: 0x{0:x}")]
  InvalidPointer(usize),

  #[error("Heap corruption detected at 0x{address:x}: {reason}")]
  Corrupted { address: usize, reason: &'static str },

  #[error("Unknown fit strategy: {0:?}")]
  UnknownStrategy(String),
}
