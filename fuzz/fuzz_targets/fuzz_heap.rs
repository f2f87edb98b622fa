#![no_main]

use std::ptr::NonNull;

use ffheap::*;

use libfuzzer_sys::arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Actions {
    /// Allocate `size` bytes
    Malloc { size: u16 },
    /// Allocate `count` zeroed elements of `size` bytes
    Calloc { count: u8, size: u16 },
    /// Free the ith allocation
    Free { index: u8 },
    /// Free the ith freed pointer again, or a pointer into the ith allocation
    Abuse { index: u8, offset: u8 },
    /// Realloc the ith allocation
    Realloc { index: u8, new_size: u16 },
}
use Actions::*;

const ARENA_SIZE: usize = 1 << 22;

fuzz_target!(|actions: Vec<Actions>| {
    let arena = Box::leak(vec![0u8; ARENA_SIZE].into_boxed_slice());
    let arena_ptr: *mut [u8] = arena;

    let mut heap = Checked::new(Heap::new(unsafe { SliceSpace::new(arena_ptr.into()) }));
    heap.init().unwrap();

    // pointer, size, fill byte
    let mut allocations: Vec<(NonNull<u8>, usize, u8)> = vec![];
    let mut freed: Vec<NonNull<u8>> = vec![];

    for (step, action) in actions.into_iter().enumerate() {
        let fill = step as u8;

        match action {
            Malloc { size } => {
                if let Ok(ptr) = heap.malloc(size as usize) {
                    unsafe { ptr.as_ptr().write_bytes(fill, size as usize) };
                    allocations.push((ptr, size as usize, fill));
                }
            }
            Calloc { count, size } => {
                let bytes = count as usize * size as usize;
                if let Ok(ptr) = heap.calloc(count as usize, size as usize) {
                    let zeroed = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), bytes) };
                    assert!(zeroed.iter().all(|&b| b == 0));

                    unsafe { ptr.as_ptr().write_bytes(fill, bytes) };
                    allocations.push((ptr, bytes, fill));
                }
            }
            Free { index } => {
                if index as usize >= allocations.len() { continue; }

                let (ptr, size, fill) = allocations.swap_remove(index as usize);
                let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), size) };
                assert!(bytes.iter().all(|&b| b == fill));

                heap.free(ptr).unwrap();
                freed.push(ptr);
            }
            Abuse { index, offset } => {
                let offset = offset as usize & !(GRANULE - 1);

                if let Some(&ptr) = freed.get(index as usize) {
                    // may have been handed out again since
                    if allocations.iter().any(|&(live, ..)| live == ptr) { continue; }

                    assert_eq!(heap.free(ptr), Err(HeapError::InvalidPointer));
                } else if let Some(&(ptr, size, _)) = allocations.get(index as usize) {
                    if offset == 0 || offset >= size.max(GRANULE) { continue; }

                    let inner = NonNull::new(ptr.as_ptr().wrapping_add(offset)).unwrap();
                    assert_eq!(heap.free(inner), Err(HeapError::InvalidPointer));
                }
            }
            Realloc { index, new_size } => {
                if index as usize >= allocations.len() { continue; }

                let (ptr, size, fill) = allocations[index as usize];
                match heap.realloc(Some(ptr), new_size as usize) {
                    Ok(Some(moved)) => {
                        let kept = size.min(new_size as usize);
                        let bytes = unsafe { std::slice::from_raw_parts(moved.as_ptr(), kept) };
                        assert!(bytes.iter().all(|&b| b == fill));

                        unsafe { moved.as_ptr().write_bytes(fill, new_size as usize) };
                        allocations[index as usize] = (moved, new_size as usize, fill);
                    }
                    Ok(None) => {
                        allocations.swap_remove(index as usize);
                        freed.push(ptr);
                    }
                    Err(err) => assert_eq!(err, HeapError::ProviderExhausted),
                }
            }
        }
    }

    for (ptr, ..) in allocations {
        heap.free(ptr).unwrap();
    }

    heap.check().unwrap();
    assert_eq!(heap.heap().counters().committed_bytes, HEADER_SIZE);

    drop(heap);
    unsafe { drop(Box::from_raw(arena_ptr)) };
});
