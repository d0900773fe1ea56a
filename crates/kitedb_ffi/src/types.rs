//! C-compatible boundary types.
//!
//! Memory ownership follows the binding convention: input buffers and
//! strings are caller-owned for the duration of the call; result
//! buffers are engine-owned and must be returned through
//! `kitedb_free_buffer`; error messages are engine-allocated and
//! released with `kitedb_free_cstring`.

use std::ffi::c_char;

use kitedb_core::{Error, Result, StorageOpts};

/// Opaque engine handle. Zero is never a valid handle.
pub type KitedbHandle = u64;

/// Opaque transaction handle. Zero is never a valid handle.
pub type KitedbTxHandle = u64;

/// A caller-owned byte buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct KitedbBuffer {
    /// Pointer to the bytes.
    pub data: *const u8,
    /// Length in bytes.
    pub len: u32,
}

/// A caller-owned UTF-8 string (not null-terminated).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct KitedbString {
    /// Pointer to the bytes.
    pub p: *const u8,
    /// Length in bytes.
    pub n: u32,
}

/// An engine-owned result buffer.
///
/// `results_ptr` identifies the container and must be handed back via
/// `kitedb_free_buffer`; `data`/`len` describe the serialized bytes,
/// valid until the container is freed.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct KitedbResbuffer {
    /// Serialized result bytes (address as integer).
    pub data: usize,
    /// Length of the serialized bytes.
    pub len: u32,
    /// Opaque container pointer; zero on error returns.
    pub results_ptr: usize,
}

impl KitedbResbuffer {
    /// An empty buffer.
    pub const fn empty() -> Self {
        Self {
            data: 0,
            len: 0,
            results_ptr: 0,
        }
    }
}

/// A structured error crossing the boundary.
#[repr(C)]
#[derive(Debug)]
pub struct KitedbError {
    /// Error code; zero means success.
    pub code: i32,
    /// Engine-allocated message, null on success. Free with
    /// `kitedb_free_cstring`.
    pub what: *mut c_char,
}

/// Combined return of result-producing operations.
///
/// On non-zero `err_code`, `out.data` aliases an engine-allocated
/// C string with the error message and `out.results_ptr` is zero.
#[repr(C)]
#[derive(Debug)]
pub struct KitedbRet {
    /// Error code; zero means success.
    pub err_code: i32,
    /// Result buffer or aliased error message.
    pub out: KitedbResbuffer,
}

/// Return of `kitedb_start_transaction`.
#[repr(C)]
#[derive(Debug)]
pub struct KitedbTxRet {
    /// Transaction handle; zero on error.
    pub tx_id: KitedbTxHandle,
    /// Error status.
    pub err: KitedbError,
}

/// Namespace open options on the wire.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct KitedbStorageOpts {
    /// Persist through the storage collaborator.
    pub enabled: u8,
    /// Create the namespace when missing.
    pub create_if_missing: u8,
    /// Slave mode: only the replicator may write.
    pub slave_mode: u8,
}

impl From<KitedbStorageOpts> for StorageOpts {
    fn from(opts: KitedbStorageOpts) -> Self {
        StorageOpts {
            enabled: opts.enabled != 0,
            create_if_missing: opts.create_if_missing != 0,
            slave_mode: opts.slave_mode != 0,
        }
    }
}

/// Borrows a caller buffer as a byte slice.
///
/// # Safety
///
/// `buf.data` must point to `buf.len` readable bytes (or be null with
/// a zero length).
pub(crate) unsafe fn buffer_slice<'a>(buf: KitedbBuffer) -> &'a [u8] {
    if buf.data.is_null() || buf.len == 0 {
        return &[];
    }
    std::slice::from_raw_parts(buf.data, buf.len as usize)
}

/// Borrows a caller string as `&str`.
///
/// # Safety
///
/// `s.p` must point to `s.n` readable bytes (or be null with a zero
/// length).
pub(crate) unsafe fn string_view<'a>(s: KitedbString) -> Result<&'a str> {
    if s.p.is_null() || s.n == 0 {
        return Ok("");
    }
    let bytes = std::slice::from_raw_parts(s.p, s.n as usize);
    std::str::from_utf8(bytes).map_err(|_| Error::params("invalid UTF-8 in string argument"))
}

/// Reads a caller-supplied `pt_versions` array.
///
/// # Safety
///
/// `ptr` must point to `count` readable `i32`s (or be null).
pub(crate) unsafe fn pt_versions_slice<'a>(ptr: *const i32, count: i32) -> &'a [i32] {
    if ptr.is_null() || count <= 0 {
        return &[];
    }
    std::slice::from_raw_parts(ptr, count as usize)
}
