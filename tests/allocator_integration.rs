//! Integration tests for allocator injection
//!
//! Every block a tree owns must come from the session's allocator and go
//! back to it: on destroy, on parse failure and on allocation failure.

use std::alloc::Layout;
use std::cell::Cell;
use std::ptr::NonNull;
use std::thread;

use jparse::{
    Allocator, CountingAllocator, LimitedAllocator, ParseError, Session, SystemAllocator,
};

const SAMPLE: &str = r#"{
    "name": "jparse",
    "version": 1,
    "ratio": 0.25,
    "tags": ["json", "alloc", "ffi", "strict", "tree"],
    "nested": {"a": [1, [2, [3, {"b": null}]]], "a": "dup", "c": true},
    "escaped": "line\nbreak é"
}"#;

// ============================================================================
// Leak Freedom
// ============================================================================

#[test]
fn test_destroy_returns_every_block() {
    let session = Session::new(CountingAllocator::new());
    let docs: Vec<_> = (0..5).map(|_| session.parse(SAMPLE).unwrap()).collect();
    assert_eq!(session.live_trees(), 5);
    assert!(session.allocator().outstanding_blocks() > 0);

    drop(docs);
    let stats = session.stats();
    assert_eq!(stats.live_blocks, 0);
    assert_eq!(stats.live_bytes, 0);
    assert!(stats.total_allocations > 0);

    let counting = session.destroy();
    assert_eq!(counting.outstanding_blocks(), 0);
    assert_eq!(counting.outstanding_bytes(), 0);
}

#[test]
fn test_failed_parses_leak_nothing() {
    let session = Session::new(CountingAllocator::new());
    let broken = [
        r#"{"a": ["x", "y", {"z": "w"}], "b": [1, 2,]}"#,
        r#"["keep", "these", "strings", 01]"#,
        r#"{"k": "v", "k": "w", "k" "#,
        r#"[{"deep": [{"deeper": ["text", tru]}]}]"#,
        r#"["ok"] trailing"#,
        r#"["\ud800"]"#,
    ];
    for input in broken {
        assert!(session.parse(input).is_err(), "{:?} should fail", input);
        assert_eq!(
            session.allocator().outstanding_blocks(),
            0,
            "leak after {:?}",
            input
        );
    }
}

#[test]
fn test_duplicate_key_releases_discarded_value() {
    let session = Session::new(CountingAllocator::new());

    let doc = session.parse(r#"{"a": 1}"#).unwrap();
    let single = session.allocator().outstanding_blocks();
    drop(doc);

    let doc = session
        .parse(r#"{"a": ["some", "discarded", "strings"], "a": 1}"#)
        .unwrap();
    assert_eq!(doc.object_get("a").unwrap().unwrap().as_int(), Ok(1));
    assert_eq!(session.allocator().outstanding_blocks(), single);
}

#[test]
fn test_repeated_key_fits_single_value_budget() {
    let long = |c: char| format!("\"{}\"", c.to_string().repeat(1000));
    let single_peak = {
        let session = Session::new(CountingAllocator::new());
        drop(session.parse(&format!("{{\"a\": {}}}", long('x'))).unwrap());
        session.stats().peak_bytes
    };

    let fields: Vec<String> = ('a'..='j')
        .map(|c| format!("\"a\": {}", long(c)))
        .collect();
    let input = format!("{{{}}}", fields.join(", "));

    let session = Session::new(LimitedAllocator::new(SystemAllocator, 3 * single_peak));
    {
        let doc = session.parse(&input).unwrap();
        assert_eq!(doc.object_len(), Ok(1));
        let kept = doc.object_get("a").unwrap().unwrap().as_str().unwrap();
        assert_eq!(kept, "j".repeat(1000));
    }
    assert_eq!(session.allocator().used_bytes(), 0);
}

#[test]
fn test_destroy_releases_trees_left_live() {
    let session = Session::new(CountingAllocator::new());
    let first = session.parse_raw(SAMPLE.as_bytes()).unwrap();
    session.parse_raw(br#"["never", "destroyed"]"#).unwrap();
    assert_eq!(unsafe { first.as_ref() }.object_len(), Ok(6));
    assert_eq!(session.live_trees(), 2);

    let counting = session.destroy();
    assert_eq!(counting.outstanding_blocks(), 0);
    assert_eq!(counting.outstanding_bytes(), 0);
}

// ============================================================================
// Out of Memory
// ============================================================================

#[test]
fn test_out_of_memory_at_every_budget() {
    let peak = {
        let session = Session::new(CountingAllocator::new());
        drop(session.parse(SAMPLE).unwrap());
        session.stats().peak_bytes
    };
    assert!(peak > 0);

    let mut failures = 0;
    for budget in 0..peak {
        let limited = LimitedAllocator::new(SystemAllocator, budget);
        let session = Session::new(CountingAllocator::wrap(limited));
        match session.parse(SAMPLE) {
            Ok(doc) => drop(doc),
            Err(e) => {
                assert!(e.is_out_of_memory(), "budget {}: {}", budget, e);
                failures += 1;
            }
        }
        let counting = session.destroy();
        assert_eq!(counting.outstanding_blocks(), 0, "budget {}", budget);
        assert_eq!(counting.inner().used_bytes(), 0, "budget {}", budget);
    }
    assert!(failures > 0);

    let roomy = LimitedAllocator::new(SystemAllocator, peak);
    assert!(Session::new(roomy).parse(SAMPLE).is_ok());
}

#[test]
fn test_out_of_memory_error_shape() {
    let session = Session::new(LimitedAllocator::new(SystemAllocator, 0));
    match session.parse(r#""needs a block""#) {
        Err(ParseError::OutOfMemory { requested }) => assert!(requested > 0),
        other => panic!("unexpected {:?}", other.map(|d| d.value_type())),
    }
    // scalars only need the root slot
    assert!(session.parse("1").is_err());
}

// ============================================================================
// Custom Allocators
// ============================================================================

/// Hands out fixed-size slabs and grows within them in place
#[derive(Default)]
struct SlabAllocator {
    resizes: Cell<usize>,
    live: Cell<usize>,
}

const SLAB: usize = 256;

fn slab_layout(layout: Layout) -> Layout {
    Layout::from_size_align(layout.size().max(SLAB), layout.align()).unwrap()
}

impl Allocator for SlabAllocator {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let block = NonNull::new(unsafe { std::alloc::alloc(slab_layout(layout)) })?;
        self.live.set(self.live.get() + 1);
        Some(block)
    }

    unsafe fn resize(&self, _block: NonNull<u8>, layout: Layout, new_size: usize) -> bool {
        if layout.size() <= SLAB && new_size <= SLAB {
            self.resizes.set(self.resizes.get() + 1);
            true
        } else {
            false
        }
    }

    unsafe fn free(&self, block: NonNull<u8>, layout: Layout) {
        std::alloc::dealloc(block.as_ptr(), slab_layout(layout));
        self.live.set(self.live.get() - 1);
    }
}

#[test]
fn test_in_place_resize_is_used() {
    let session = Session::new(SlabAllocator::default());
    let doc = session
        .parse(r#"[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, "a longer string value"]"#)
        .unwrap();
    assert_eq!(doc.array_len(), Ok(11));
    assert!(session.allocator().resizes.get() > 0);

    drop(doc);
    assert_eq!(session.destroy().live.get(), 0);
}

#[test]
fn test_boxed_dyn_allocator() {
    let boxed: Box<dyn Allocator> = Box::new(SystemAllocator);
    let session = Session::new(boxed);
    let doc = session.parse(SAMPLE).unwrap();
    assert_eq!(doc.object_get("version").unwrap().unwrap().as_int(), Ok(1));
}

#[test]
fn test_borrowed_allocator_outlives_session() {
    let counting = CountingAllocator::new();
    {
        let session = Session::new(&counting);
        let doc = session.parse(SAMPLE).unwrap();
        assert!(counting.outstanding_blocks() > 0);
        drop(doc);
    }
    assert_eq!(counting.outstanding_blocks(), 0);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_independent_sessions_on_threads() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            thread::spawn(move || {
                let session = Session::new(CountingAllocator::new());
                for _ in 0..50 {
                    let input = format!(r#"{{"thread": {}, "data": [{}]}}"#, i, SAMPLE);
                    let doc = session.parse(&input).unwrap();
                    assert_eq!(doc.object_get("thread").unwrap().unwrap().as_int(), Ok(i));
                }
                session.destroy().outstanding_blocks()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 0);
    }
}
