//! Result-buffer plumbing and error marshalling.

use std::ffi::{c_char, CString};

use kitedb_core::{Error, ResultFlags};

use crate::pool::ResultsWrapper;
use crate::registry;
use crate::types::{KitedbError, KitedbResbuffer, KitedbRet};

/// Allocates a C string for an error message. The caller frees it
/// with `kitedb_free_cstring`.
fn message_cstring(message: &str) -> *mut c_char {
    if message.is_empty() {
        return std::ptr::null_mut();
    }
    CString::new(message.replace('\0', " "))
        .map(CString::into_raw)
        .unwrap_or(std::ptr::null_mut())
}

/// Converts a core result into a boundary error.
pub(crate) fn error_to_c(result: Result<(), Error>) -> KitedbError {
    match result {
        Ok(()) => KitedbError {
            code: 0,
            what: std::ptr::null_mut(),
        },
        Err(err) => KitedbError {
            code: err.code(),
            what: message_cstring(&err.to_string()),
        },
    }
}

/// Converts a result-producing outcome into a boundary return.
///
/// On failure the message is aliased into the resbuffer data span and
/// no container is attached.
pub(crate) fn ret_to_c(result: Result<KitedbResbuffer, Error>) -> KitedbRet {
    match result {
        Ok(out) => KitedbRet { err_code: 0, out },
        Err(err) => {
            let message = err.to_string();
            let len = message.len() as u32;
            KitedbRet {
                err_code: err.code(),
                out: KitedbResbuffer {
                    data: message_cstring(&message) as usize,
                    len,
                    results_ptr: 0,
                },
            }
        }
    }
}

/// Acquires a result container, mapping pool exhaustion to the
/// admission-control error.
pub(crate) fn acquire_results() -> Result<Box<ResultsWrapper>, Error> {
    registry::pool()
        .acquire()
        .ok_or_else(|| Error::logic("too many parallel queries"))
}

/// Serializes a filled container and hands it out as a resbuffer.
///
/// `with_items` selects JSON rendering; otherwise items travel as
/// ID references, with a payload-types block when `pt_versions` lags
/// the namespace matcher.
pub(crate) fn results_to_buffer(
    mut wrapper: Box<ResultsWrapper>,
    with_items: bool,
    pt_versions: &[i32],
) -> Result<KitedbResbuffer, Error> {
    let mut bits = if with_items {
        ResultFlags::JSON
    } else {
        ResultFlags::PTRS | ResultFlags::WITH_ITEM_ID
    };
    if !pt_versions.is_empty() && !with_items {
        bits |= ResultFlags::WITH_PAYLOAD_TYPES;
    }
    {
        let ResultsWrapper { results, ser } = wrapper.as_mut();
        ser.reset();
        results.serialize(ser, ResultFlags::new(bits), pt_versions)?;
    }
    Ok(hand_out(wrapper))
}

/// Hands a container to the caller without serializing (raw spans
/// already written into `ser`, e.g. `get_meta`).
pub(crate) fn hand_out(wrapper: Box<ResultsWrapper>) -> KitedbResbuffer {
    let data = wrapper.ser.as_slice().as_ptr() as usize;
    let len = wrapper.ser.len() as u32;
    let results_ptr = registry::pool().hand_out(wrapper);
    KitedbResbuffer {
        data,
        len,
        results_ptr,
    }
}

/// Returns a result buffer's container to the pool.
///
/// # Safety
///
/// `buf.results_ptr` must be zero or a pointer previously returned by
/// a result-producing call and not yet freed.
#[no_mangle]
pub unsafe extern "C" fn kitedb_free_buffer(buf: KitedbResbuffer) -> KitedbError {
    match registry::pool().take_back(buf.results_ptr) {
        Some(wrapper) => {
            registry::pool().release(wrapper);
            error_to_c(Ok(()))
        }
        None => error_to_c(Err(Error::logic(
            "result buffer is unknown or was already freed",
        ))),
    }
}

/// Frees several result buffers.
///
/// # Safety
///
/// `bufs` must point to `count` valid resbuffers; each must satisfy
/// the `kitedb_free_buffer` contract.
#[no_mangle]
pub unsafe extern "C" fn kitedb_free_buffers(
    bufs: *const KitedbResbuffer,
    count: i32,
) -> KitedbError {
    if bufs.is_null() || count < 0 {
        return error_to_c(Err(Error::params("null buffer array")));
    }
    let mut outcome = error_to_c(Ok(()));
    for i in 0..count as usize {
        let err = kitedb_free_buffer(*bufs.add(i));
        if err.code != 0 {
            kitedb_free_cstring(outcome.what);
            outcome = err;
        } else {
            kitedb_free_cstring(err.what);
        }
    }
    outcome
}

/// Frees an engine-allocated C string (error messages).
///
/// # Safety
///
/// `s` must be null or a pointer produced by this library.
#[no_mangle]
pub unsafe extern "C" fn kitedb_free_cstring(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
