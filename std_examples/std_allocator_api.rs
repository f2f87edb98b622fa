use allocator_api2::vec::Vec;
use ffheap::{Heap, SliceSpace};

// Run with:
// `cargo run -p std_examples --bin std_allocator_api`

fn main() {
    // Establish some memory for the heap. It starts small and doubles into the rest.
    let mut arena = [0u8; 1 << 16];

    // We know the memory is fine for use and outlives the heap (unsafe).
    let heapck = Heap::new(unsafe { SliceSpace::new(arena.as_mut().into()) })
        .lock::<spin::Mutex<()>>();

    // Allocate, grow, shrink
    let mut vec = Vec::with_capacity_in(100, &heapck);
    vec.extend(0..300usize);
    vec.truncate(100);
    vec.shrink_to_fit();

    println!("{}", heapck.lock().info());

    // Grow past the initial region.
    vec.extend(0..5000);
    drop(vec);

    let heap = heapck.into_inner();
    heap.check().unwrap();
    println!("{}", heap.counters());
}
