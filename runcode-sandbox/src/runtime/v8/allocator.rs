//! ArrayBuffer allocator with a byte budget
//!
//! `heap_limits` only bounds the JavaScript heap. Typed array backing stores
//! come from this allocator instead, and a refused allocation surfaces inside
//! the isolate as `RangeError: Array buffer allocation failed`.

use deno_core::v8;
use std::alloc::{self, Layout};
use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const ALIGN: usize = 16;

/// Bytes of backing store an isolate may hold at once.
#[derive(Debug)]
pub(crate) struct BufferBudget {
    limit: usize,
    used: AtomicUsize,
}

impl BufferBudget {
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            limit,
            used: AtomicUsize::new(0),
        })
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }

    fn reserve(&self, len: usize) -> bool {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                used.checked_add(len).filter(|total| *total <= self.limit)
            })
            .is_ok()
    }

    fn release(&self, len: usize) {
        self.used.fetch_sub(len, Ordering::SeqCst);
    }
}

/// Allocator handed to V8; holds one strong reference to `budget`.
pub(crate) fn budgeted_allocator(budget: &Arc<BufferBudget>) -> v8::UniqueRef<v8::Allocator> {
    // SAFETY: the pointer comes from `Arc::into_raw` and V8 releases it once
    // through `drop_budget`, which is the only place it is turned back into an Arc.
    unsafe { v8::new_rust_allocator(Arc::into_raw(budget.clone()), &VTABLE) }
}

static VTABLE: v8::RustAllocatorVtable<BufferBudget> = v8::RustAllocatorVtable {
    allocate,
    allocate_uninitialized,
    free,
    reallocate,
    drop: drop_budget,
};

// Zero-length buffers still get a real one-byte allocation so `free` stays uniform.
fn layout(len: usize) -> Option<Layout> {
    Layout::from_size_align(len.max(1), ALIGN).ok()
}

unsafe fn allocate_in(budget: &BufferBudget, len: usize, zeroed: bool) -> *mut c_void {
    if !budget.reserve(len) {
        return ptr::null_mut();
    }
    let Some(layout) = layout(len) else {
        budget.release(len);
        return ptr::null_mut();
    };
    let data = if zeroed {
        alloc::alloc_zeroed(layout)
    } else {
        alloc::alloc(layout)
    };
    if data.is_null() {
        budget.release(len);
    }
    data.cast()
}

unsafe extern "C" fn allocate(budget: &BufferBudget, len: usize) -> *mut c_void {
    allocate_in(budget, len, true)
}

unsafe extern "C" fn allocate_uninitialized(budget: &BufferBudget, len: usize) -> *mut c_void {
    allocate_in(budget, len, false)
}

unsafe extern "C" fn free(budget: &BufferBudget, data: *mut c_void, len: usize) {
    if data.is_null() {
        return;
    }
    if let Some(layout) = layout(len) {
        alloc::dealloc(data.cast(), layout);
    }
    budget.release(len);
}

unsafe extern "C" fn reallocate(
    budget: &BufferBudget,
    data: *mut c_void,
    old_len: usize,
    new_len: usize,
) -> *mut c_void {
    let growth = new_len.saturating_sub(old_len);
    if !budget.reserve(growth) {
        return ptr::null_mut();
    }
    let (Some(old_layout), Some(_)) = (layout(old_len), layout(new_len)) else {
        budget.release(growth);
        return ptr::null_mut();
    };
    let moved = alloc::realloc(data.cast(), old_layout, new_len.max(1));
    if moved.is_null() {
        budget.release(growth);
        return ptr::null_mut();
    }
    budget.release(old_len.saturating_sub(new_len));
    moved.cast()
}

unsafe extern "C" fn drop_budget(budget: *const BufferBudget) {
    drop(Arc::from_raw(budget));
}
