use core::{mem, slice};

/// Word-aligned, zeroed test region that lives for the rest of the test run.
pub(crate) fn arena(len: usize) -> &'static mut [u8] {
  let words = vec![0usize; len.div_ceil(mem::size_of::<usize>())].leak();
  // SAFETY: the leaked buffer holds at least `len` initialized bytes.
  unsafe { slice::from_raw_parts_mut(words.as_mut_ptr().cast::<u8>(), len) }
}
