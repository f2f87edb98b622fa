use ffheap::*;

// Run with:
// `cargo run -p std_examples --bin std_global_allocator`

// Notes:
//
// ## Using `spin::Mutex<()>`
// The `spin` crate provides a simple mutex we can use on most platforms.
// We'll use it for the sake of example.
//
// ## Using `MmapSpace`
// Allocations may occur prior to the execution of `main`, so the heap must be able to
// fetch memory on its own. `Heapck` initialises it on the first allocation.

#[global_allocator]
static HEAP: Heapck<spin::Mutex<()>, MmapSpace> = Heap::new(MmapSpace::new()).lock();

fn main() {
    eprint!("Doing some small allocations... ");

    let mut vec = Vec::with_capacity(100);
    vec.extend(0..300usize);
    vec.truncate(100);
    vec.shrink_to_fit();

    eprintln!("Done!");

    eprint!("Growing the heap... ");

    vec.extend(0..100000usize);
    let capacity = HEAP.lock().counters().capacity;
    drop(vec);

    eprintln!("Done! The heap spans {} bytes. Ending...", capacity);
}
