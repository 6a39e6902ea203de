/// Alignment of every block header and payload inside a region.
pub const ALIGNMENT: usize = core::mem::size_of::<usize>();

/// Rounds a byte count up to the machine word ([`ALIGNMENT`]).
///
/// # Examples
///
/// ```rust
/// use rallocator::{ALIGNMENT, align};
///
/// assert_eq!(align!(1), ALIGNMENT);
/// assert_eq!(align!(ALIGNMENT), ALIGNMENT);
/// assert_eq!(align!(2 * ALIGNMENT + 1), 3 * ALIGNMENT);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::ALIGNMENT - 1) & !($crate::ALIGNMENT - 1)
  };
}

/// Rounds a byte count down to the machine word.
pub(crate) const fn align_down(value: usize) -> usize {
  value & !(ALIGNMENT - 1)
}
