//! Query entry points.

use kitedb_codec::Decoder;
use kitedb_core::{Query, LOG_ERROR};
use tracing::error;

use crate::buffer::{acquire_results, results_to_buffer, ret_to_c};
use crate::logger::{log_to_writer, LOG_LEVEL_ERROR};
use crate::registry;
use crate::types::{
    buffer_slice, pt_versions_slice, string_view, KitedbBuffer, KitedbHandle, KitedbRet,
    KitedbString,
};

/// Executes an SQL select and returns a result buffer.
///
/// With a non-zero `with_items` the items are rendered as JSON;
/// otherwise they travel as ID references, with a payload-types block
/// for callers whose `pt_versions` lag the namespace.
///
/// # Safety
///
/// `query` must satisfy the [`KitedbString`] contract; `pt_versions`
/// must point to `pt_versions_count` readable `i32`s or be null.
#[no_mangle]
pub unsafe extern "C" fn kitedb_select(
    rx: KitedbHandle,
    query: KitedbString,
    with_items: i32,
    pt_versions: *const i32,
    pt_versions_count: i32,
) -> KitedbRet {
    ret_to_c((|| {
        let engine = registry::engine(rx)?;
        let sql = string_view(query)?;
        let wrapper = acquire_results()?;
        match engine.select_sql(sql) {
            Ok(results) => {
                let mut wrapper = wrapper;
                wrapper.results = results;
                results_to_buffer(
                    wrapper,
                    with_items != 0,
                    pt_versions_slice(pt_versions, pt_versions_count),
                )
            }
            Err(err) => {
                registry::pool().release(wrapper);
                Err(err)
            }
        }
    })())
}

/// Executes an encoded query (with optional joined/merged sub-queries)
/// and returns a result buffer.
///
/// # Safety
///
/// `input` must satisfy the [`KitedbBuffer`] contract; `pt_versions`
/// must point to `pt_versions_count` readable `i32`s or be null.
#[no_mangle]
pub unsafe extern "C" fn kitedb_select_query(
    rx: KitedbHandle,
    input: KitedbBuffer,
    with_items: i32,
    pt_versions: *const i32,
    pt_versions_count: i32,
) -> KitedbRet {
    ret_to_c((|| {
        let engine = registry::engine(rx)?;
        let mut dec = Decoder::new(buffer_slice(input));
        let query = Query::decode_packed(&mut dec)?;

        let wrapper = acquire_results()?;
        match engine.select(&query) {
            Ok(results) => {
                let mut wrapper = wrapper;
                wrapper.results = results;
                results_to_buffer(
                    wrapper,
                    with_items != 0,
                    pt_versions_slice(pt_versions, pt_versions_count),
                )
            }
            Err(err) => {
                registry::pool().release(wrapper);
                if query.debug_level >= LOG_ERROR {
                    error!(namespace = %query.namespace, "query error: {err}");
                    log_to_writer(LOG_LEVEL_ERROR, &format!("query error: {err}"));
                }
                Err(err)
            }
        }
    })())
}

/// Executes an encoded delete query; the result buffer carries the
/// removed items.
///
/// # Safety
///
/// `input` must satisfy the [`KitedbBuffer`] contract.
#[no_mangle]
pub unsafe extern "C" fn kitedb_delete_query(
    rx: KitedbHandle,
    input: KitedbBuffer,
) -> KitedbRet {
    ret_to_c((|| {
        let engine = registry::engine(rx)?;
        let mut dec = Decoder::new(buffer_slice(input));
        let query = Query::decode_packed(&mut dec)?;

        let wrapper = acquire_results()?;
        match engine.delete_query(&query) {
            Ok(results) => {
                let mut wrapper = wrapper;
                wrapper.results = results;
                results_to_buffer(wrapper, false, &[])
            }
            Err(err) => {
                registry::pool().release(wrapper);
                if query.debug_level >= LOG_ERROR {
                    error!(namespace = %query.namespace, "query error: {err}");
                    log_to_writer(LOG_LEVEL_ERROR, &format!("query error: {err}"));
                }
                Err(err)
            }
        }
    })())
}
