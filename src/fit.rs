use core::{fmt, str::FromStr};

use crate::{
  block::{FreeBlock, Link},
  error::HeapError,
  free_list::FreeList,
};

/// Policy choosing which free block serves a request.
///
/// Stored in the region header, so it is `repr(u8)` and always written as a
/// valid discriminant.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FitStrategy {
  /// Lowest-addressed block that is large enough.
  #[default]
  FirstFit,
  /// Smallest block that is large enough; ties go to the lower address.
  BestFit,
  /// Largest block, provided it is large enough; ties go to the lower address.
  WorstFit,
}

impl FitStrategy {
  pub const ALL: [FitStrategy; 3] = [Self::FirstFit, Self::BestFit, Self::WorstFit];

  /// Picks a free block holding at least `size` payload bytes.
  ///
  /// # Safety
  ///
  /// `list` must be well formed.
  pub(crate) unsafe fn select(
    self,
    list: &FreeList,
    size: usize,
  ) -> Link {
    unsafe {
      let mut fitting = list.iter().filter(|&block| FreeBlock::size(block) >= size);

      match self {
        Self::FirstFit => fitting.next(),
        Self::BestFit => {
          let mut best: Link = None;
          for block in fitting {
            let block_size = FreeBlock::size(block);
            if block_size == size {
              return Some(block);
            }
            if best.is_none_or(|b| block_size < FreeBlock::size(b)) {
              best = Some(block);
            }
          }
          best
        }
        Self::WorstFit => {
          let mut worst: Link = None;
          for block in fitting {
            if worst.is_none_or(|w| FreeBlock::size(block) > FreeBlock::size(w)) {
              worst = Some(block);
            }
          }
          worst
        }
      }
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::FirstFit => "first-fit",
      Self::BestFit => "best-fit",
      Self::WorstFit => "worst-fit",
    }
  }
}

impl fmt::Display for FitStrategy {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for FitStrategy {
  type Err = HeapError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let name = s.trim().to_ascii_lowercase().replace('_', "-");
    match name.strip_suffix("-fit").unwrap_or(name.as_str()) {
      "first" => Ok(Self::FirstFit),
      "best" => Ok(Self::BestFit),
      "worst" => Ok(Self::WorstFit),
      _ => Err(HeapError::UnknownStrategy(s.to_string())),
    }
  }
}
