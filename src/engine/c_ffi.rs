//! C ABI for jparse
//!
//! Exposes sessions and value trees to C through opaque pointers. The
//! declarations live in `include/jparse.h`.
//!
//! # Example (C)
//!
//! ```c
//! #include <jparse.h>
//!
//! int main() {
//!     void *parser = jp_parser_create(NULL, NULL, NULL, NULL);
//!     void *res = jp_parser_parse(parser, "[1.0, \"hello world\", true]");
//!     if (res == NULL) {
//!         fprintf(stderr, "%s\n", jp_parser_last_error(parser));
//!         return 1;
//!     }
//!
//!     printf("length: %lu\n", jp_json_arr_len(res));
//!     printf("[0]: %f\n", *(double *)jp_json_get_data(jp_json_arr_get(res, 0)));
//!
//!     jp_json_destroy(parser, res);
//!     jp_parser_destroy(parser);
//!     return 0;
//! }
//! ```
//!
//! # Allocator Callbacks
//!
//! `jp_parser_create` takes an opaque context and three callbacks. Every
//! callback receives the context first; alignments are passed as their
//! base-2 logarithm and the return-address argument is always 0:
//!
//! - `alloc(ctx, len, align_log2, ret_addr)` returns a block or NULL
//! - `resize(ctx, ptr, align_log2, new_len, ret_addr)` resizes in place or
//!   returns false
//! - `free(ctx, ptr, align_log2, ret_addr)` releases a block
//!
//! Passing NULL for all three callbacks selects the system allocator. A mix
//! of NULL and non-NULL callbacks is refused and `jp_parser_create` returns
//! NULL.
//!
//! # Thread Safety
//!
//! A parser and its values must stay on one thread at a time. Different
//! parsers may be used from different threads.
//!
//! # Memory Management
//!
//! - Destroy every value with `jp_json_destroy()` on the parser that made it
//! - `jp_parser_destroy()` releases any value still live
//! - Pointers returned by accessors borrow from their value

use std::alloc::Layout;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_uint, c_ulong, c_void};
use std::ptr::{self, NonNull};

use super::alloc::{Allocator, SystemAllocator};
use super::session::Session;
use super::value::Value;

// ============================================================================
// Callback Types
// ============================================================================

/// `alloc(ctx, len, align_log2, ret_addr) -> ptr`
pub type JpAllocFn =
    Option<unsafe extern "C" fn(ctx: *mut c_void, len: c_uint, align: u8, ret_addr: c_uint) -> *mut c_void>;

/// `resize(ctx, ptr, align_log2, new_len, ret_addr) -> bool`
pub type JpResizeFn = Option<
    unsafe extern "C" fn(
        ctx: *mut c_void,
        ptr: *mut c_void,
        align: u8,
        new_len: c_uint,
        ret_addr: c_uint,
    ) -> bool,
>;

/// `free(ctx, ptr, align_log2, ret_addr)`
pub type JpFreeFn =
    Option<unsafe extern "C" fn(ctx: *mut c_void, ptr: *mut c_void, align: u8, ret_addr: c_uint)>;

/// Allocator backed by caller-supplied callbacks
struct CAllocator {
    ctx: *mut c_void,
    alloc: unsafe extern "C" fn(*mut c_void, c_uint, u8, c_uint) -> *mut c_void,
    resize: unsafe extern "C" fn(*mut c_void, *mut c_void, u8, c_uint, c_uint) -> bool,
    free: unsafe extern "C" fn(*mut c_void, *mut c_void, u8, c_uint),
}

#[inline]
fn align_log2(layout: Layout) -> u8 {
    layout.align().trailing_zeros() as u8
}

impl Allocator for CAllocator {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let len = c_uint::try_from(layout.size()).ok()?;
        // SAFETY: the callbacks and context were supplied together by the caller
        let block = unsafe { (self.alloc)(self.ctx, len, align_log2(layout), 0) };
        NonNull::new(block.cast())
    }

    unsafe fn resize(&self, block: NonNull<u8>, layout: Layout, new_size: usize) -> bool {
        let Ok(new_len) = c_uint::try_from(new_size) else {
            return false;
        };
        (self.resize)(self.ctx, block.as_ptr().cast(), align_log2(layout), new_len, 0)
    }

    unsafe fn free(&self, block: NonNull<u8>, layout: Layout) {
        (self.free)(self.ctx, block.as_ptr().cast(), align_log2(layout), 0)
    }
}

/// Allocator chosen at `jp_parser_create`
enum HostAllocator {
    System(SystemAllocator),
    Callbacks(CAllocator),
}

impl Allocator for HostAllocator {
    #[inline]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        match self {
            HostAllocator::System(a) => a.allocate(layout),
            HostAllocator::Callbacks(a) => a.allocate(layout),
        }
    }

    #[inline]
    unsafe fn resize(&self, block: NonNull<u8>, layout: Layout, new_size: usize) -> bool {
        match self {
            HostAllocator::System(a) => a.resize(block, layout, new_size),
            HostAllocator::Callbacks(a) => a.resize(block, layout, new_size),
        }
    }

    #[inline]
    unsafe fn free(&self, block: NonNull<u8>, layout: Layout) {
        match self {
            HostAllocator::System(a) => a.free(block, layout),
            HostAllocator::Callbacks(a) => a.free(block, layout),
        }
    }
}

// ============================================================================
// Opaque Types
// ============================================================================

/// Opaque handle to a parser session
pub struct JpParser {
    session: Session<HostAllocator>,
    last_error: Option<CString>,
}

// Payloads handed out for Bool values
static JP_TRUE: c_int = 1;
static JP_FALSE: c_int = 0;

#[inline]
unsafe fn value_ref<'a>(res: *const c_void) -> Option<&'a Value> {
    res.cast::<Value>().as_ref()
}

// ============================================================================
// Parser Functions
// ============================================================================

/// Create a parser session
///
/// Uses the system allocator when all callbacks are NULL. Returns NULL when
/// only some of them are.
///
/// # Safety
///
/// - The callbacks must honor the contract described in the module docs
/// - `ctx` must stay valid until `jp_parser_destroy`
/// - The returned pointer must be freed with `jp_parser_destroy`
#[no_mangle]
pub unsafe extern "C" fn jp_parser_create(
    ctx: *mut c_void,
    alloc: JpAllocFn,
    resize: JpResizeFn,
    free: JpFreeFn,
) -> *mut c_void {
    let host = match (alloc, resize, free) {
        (Some(alloc), Some(resize), Some(free)) => HostAllocator::Callbacks(CAllocator {
            ctx,
            alloc,
            resize,
            free,
        }),
        (None, None, None) => HostAllocator::System(SystemAllocator),
        _ => return ptr::null_mut(),
    };

    let parser = Box::new(JpParser {
        session: Session::new(host),
        last_error: None,
    });
    Box::into_raw(parser).cast()
}

/// Destroy a parser session
///
/// # Safety
///
/// - `j` must be a pointer returned by `jp_parser_create`, or NULL
/// - Values parsed with it are released too and must not be used afterwards
#[no_mangle]
pub unsafe extern "C" fn jp_parser_destroy(j: *mut c_void) {
    if j.is_null() {
        return;
    }
    let parser = Box::from_raw(j.cast::<JpParser>());
    let _ = parser.session.destroy();
}

/// Parse a NUL-terminated JSON text
///
/// Returns NULL on failure; `jp_parser_last_error` then describes why.
///
/// # Safety
///
/// - `j` must be a pointer returned by `jp_parser_create`
/// - `input` must be a valid NUL-terminated C string
/// - A non-NULL result must be freed with `jp_json_destroy` on the same parser
#[no_mangle]
pub unsafe extern "C" fn jp_parser_parse(j: *mut c_void, input: *const c_char) -> *mut c_void {
    let Some(parser) = j.cast::<JpParser>().as_mut() else {
        return ptr::null_mut();
    };
    if input.is_null() {
        parser.last_error = CString::new("input is NULL").ok();
        return ptr::null_mut();
    }

    match parser.session.parse_raw(CStr::from_ptr(input).to_bytes()) {
        Ok(root) => {
            parser.last_error = None;
            root.as_ptr().cast()
        }
        Err(e) => {
            parser.last_error = CString::new(e.to_string()).ok();
            ptr::null_mut()
        }
    }
}

/// Message for the last failed `jp_parser_parse`, or NULL
///
/// # Safety
///
/// - `j` must be a pointer returned by `jp_parser_create`
/// - The returned string is valid until the next parse on `j`
#[no_mangle]
pub unsafe extern "C" fn jp_parser_last_error(j: *const c_void) -> *const c_char {
    match j.cast::<JpParser>().as_ref() {
        Some(JpParser {
            last_error: Some(msg),
            ..
        }) => msg.as_ptr(),
        _ => ptr::null(),
    }
}

// ============================================================================
// Value Functions
// ============================================================================

/// Type tag of a value (Bool=0 .. Object=6), or -1 for NULL
///
/// # Safety
///
/// - `res` must be a live value or NULL
#[no_mangle]
pub unsafe extern "C" fn jp_json_get_type(res: *const c_void) -> c_int {
    match value_ref(res) {
        Some(value) => value.value_type().as_i32(),
        None => -1,
    }
}

/// Pointer to a scalar payload
///
/// Bool gives `int*`, Int gives `int64_t*`, Float gives `double*` and String
/// gives a NUL-terminated `char*`. Null, Array and Object give NULL.
///
/// # Safety
///
/// - `res` must be a live value or NULL
/// - The payload must not be written through
#[no_mangle]
pub unsafe extern "C" fn jp_json_get_data(res: *const c_void) -> *const c_void {
    let Some(value) = value_ref(res) else {
        return ptr::null();
    };
    match value {
        Value::Bool(true) => (&JP_TRUE as *const c_int).cast(),
        Value::Bool(false) => (&JP_FALSE as *const c_int).cast(),
        Value::Int(n) => (n as *const i64).cast(),
        Value::Float(x) => (x as *const f64).cast(),
        Value::String(s) => s.as_c_ptr().cast(),
        Value::Null | Value::Array(_) | Value::Object(_) => ptr::null(),
    }
}

/// Element `i` of an array, or NULL when out of bounds or not an array
///
/// # Safety
///
/// - `j` must be a live value or NULL
#[no_mangle]
pub unsafe extern "C" fn jp_json_arr_get(j: *const c_void, i: c_uint) -> *const c_void {
    match value_ref(j).and_then(|v| v.array_get(i as usize).ok()) {
        Some(item) => (item as *const Value).cast(),
        None => ptr::null(),
    }
}

/// Length of an array, or 0 when not an array
///
/// # Safety
///
/// - `res` must be a live value or NULL
#[no_mangle]
pub unsafe extern "C" fn jp_json_arr_len(res: *const c_void) -> c_ulong {
    value_ref(res)
        .and_then(|v| v.array_len().ok())
        .map_or(0, |len| len as c_ulong)
}

/// Field `key` of an object, or NULL when absent or not an object
///
/// # Safety
///
/// - `res` must be a live value or NULL
/// - `key` must be a valid NUL-terminated C string
#[no_mangle]
pub unsafe extern "C" fn jp_json_obj_get(res: *const c_void, key: *const c_char) -> *const c_void {
    if key.is_null() {
        return ptr::null();
    }
    let Ok(key) = CStr::from_ptr(key).to_str() else {
        return ptr::null();
    };
    match value_ref(res).and_then(|v| v.object_get(key).ok().flatten()) {
        Some(field) => (field as *const Value).cast(),
        None => ptr::null(),
    }
}

/// Byte length of a string (embedded NULs included), or 0 when not a string
///
/// # Safety
///
/// - `res` must be a live value or NULL
#[no_mangle]
pub unsafe extern "C" fn jp_json_str_len(res: *const c_void) -> c_ulong {
    value_ref(res)
        .and_then(|v| v.as_bytes().ok())
        .map_or(0, |bytes| bytes.len() as c_ulong)
}

/// Print the debug rendering of a value to stdout
///
/// # Safety
///
/// - `res` must be a live value or NULL
#[no_mangle]
pub unsafe extern "C" fn jp_json_debug(res: *const c_void) {
    match value_ref(res) {
        Some(value) => print!("{}", value.render()),
        None => println!("(null)"),
    }
}

/// Destroy a value tree
///
/// # Safety
///
/// - `j` must be the parser that produced `res`
/// - `res` must be a root returned by `jp_parser_parse`, or NULL, and must
///   not be used afterwards
#[no_mangle]
pub unsafe extern "C" fn jp_json_destroy(j: *mut c_void, res: *mut c_void) {
    let (Some(parser), Some(root)) = (j.cast::<JpParser>().as_ref(), NonNull::new(res)) else {
        return;
    };
    parser.session.destroy_raw(root.cast());
}

/// Library version as a NUL-terminated string
#[no_mangle]
pub extern "C" fn jp_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr().cast()
}
