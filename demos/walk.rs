use std::{env, process, ptr::NonNull};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, mmap, munmap};
use rallocator::{BlockInfo, FitStrategy, Heap};

const REGION_SIZE: usize = 4096;

/// Prints one line per block, the way a heap dump would.
fn print_block(block: &BlockInfo) {
  println!(
    "  {:#014x}  {:>6} bytes  {}",
    block.address,
    block.size,
    if block.is_free { "free" } else { "used" }
  );
}

fn dump(
  heap: &Heap<'_>,
  label: &str,
) {
  let stats = heap.stats();
  println!(
    "\n[{}] {} used / {} free in {} block(s), largest free {}",
    label,
    stats.used_bytes,
    stats.free_bytes,
    stats.free_blocks + stats.allocated_blocks,
    stats.largest_free
  );
  heap.walk(print_block);
}

/// Fit strategy from the first argument, then `RALLOC_FIT`, else first-fit.
fn strategy() -> FitStrategy {
  let Some(name) = env::args().nth(1).or_else(|| env::var("RALLOC_FIT").ok()) else {
    return FitStrategy::default();
  };

  match name.parse() {
    Ok(strategy) => strategy,
    Err(err) => {
      eprintln!("{err}");
      process::exit(2);
    }
  }
}

fn main() {
  env_logger::init();

  // The heap never asks the OS for memory; the caller maps a region for it.
  let region = unsafe {
    mmap(
      std::ptr::null_mut(),
      REGION_SIZE,
      PROT_READ | PROT_WRITE,
      MAP_PRIVATE | MAP_ANONYMOUS,
      -1,
      0,
    )
  };
  if region == MAP_FAILED {
    eprintln!("mmap failed: {}", std::io::Error::last_os_error());
    process::exit(1);
  }
  let Some(start) = NonNull::new(region.cast::<u8>()) else {
    process::exit(1);
  };

  let mut heap = match unsafe { Heap::init(start, REGION_SIZE) } {
    Ok(heap) => heap,
    Err(err) => {
      eprintln!("{err}");
      process::exit(1);
    }
  };
  heap.set_strategy(strategy());
  println!("{:?}", heap);
  dump(&heap, "init");

  let result: rallocator::HeapResult<()> = (|| {
    let p1 = heap.allocate(100)?;
    let p2 = heap.allocate(200)?;
    dump(&heap, "allocate 100, 200");

    unsafe { heap.free(p1)? };
    dump(&heap, "free first");

    let p3 = heap.allocate(50)?;
    println!("\nallocate 50 -> {:p} (first block was {:p})", p3, p1);

    unsafe {
      let p3 = heap.reallocate(p3, 400)?;
      dump(&heap, "grow to 400");
      heap.free(p2)?;
      heap.free(p3)?;
    }
    dump(&heap, "free all");

    heap.verify()
  })();

  if let Err(err) = result {
    eprintln!("heap error: {err}");
  }

  unsafe { munmap(region, REGION_SIZE) };
}
