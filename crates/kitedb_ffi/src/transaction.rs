//! Transaction entry points.

use crate::buffer::{acquire_results, error_to_c, ret_to_c, results_to_buffer};
use crate::database::{decode_packed_args, process_packed_item};
use crate::registry;
use crate::types::{
    buffer_slice, string_view, KitedbBuffer, KitedbError, KitedbHandle, KitedbRet, KitedbString,
    KitedbTxHandle, KitedbTxRet,
};

/// Starts a transaction bound to one namespace.
///
/// # Safety
///
/// `ns` must satisfy the [`KitedbString`] contract.
#[no_mangle]
pub unsafe extern "C" fn kitedb_start_transaction(
    rx: KitedbHandle,
    ns: KitedbString,
) -> KitedbTxRet {
    let outcome = (|| {
        let engine = registry::engine(rx)?;
        let tx = engine.new_transaction(string_view(ns)?)?;
        Ok(registry::register_tx(rx, tx))
    })();
    match outcome {
        Ok(tx_id) => KitedbTxRet {
            tx_id,
            err: error_to_c(Ok(())),
        },
        Err(err) => KitedbTxRet {
            tx_id: 0,
            err: error_to_c(Err(err)),
        },
    }
}

/// Records an item-modify step in a transaction without applying it.
///
/// # Safety
///
/// `args` and `data` must satisfy the [`KitedbBuffer`] contract.
#[no_mangle]
pub unsafe extern "C" fn kitedb_modify_item_packed_tx(
    rx: KitedbHandle,
    tx: KitedbTxHandle,
    args: KitedbBuffer,
    data: KitedbBuffer,
) -> KitedbError {
    error_to_c((|| {
        let engine = registry::engine(rx)?;
        let args = decode_packed_args(buffer_slice(args), false)?;
        let data = buffer_slice(data);
        registry::with_tx(tx, |tx| {
            let item = process_packed_item(&engine, tx.namespace(), &args, data)?;
            tx.modify(item, args.mode);
            Ok(())
        })
    })())
}

/// Commits a transaction, emitting every applied item in step order.
/// The handle is freed whether or not the commit succeeds.
#[no_mangle]
pub extern "C" fn kitedb_commit_transaction(rx: KitedbHandle, tx: KitedbTxHandle) -> KitedbRet {
    ret_to_c((|| {
        let engine = registry::engine(rx)?;
        let tx = registry::take_tx(tx)?;
        let ns_name = tx.namespace().to_owned();

        let version_before = engine
            .get_namespace(&ns_name)
            .map(|ns| ns.tags_snapshot().version())
            .unwrap_or(0);
        let results = engine.commit_transaction(tx)?;
        let version_after = engine
            .get_namespace(&ns_name)
            .map(|ns| ns.tags_snapshot().version())
            .unwrap_or(0);

        let mut wrapper = acquire_results()?;
        wrapper.results = results;
        let pt_versions: &[i32] = if version_after > version_before {
            &[-1]
        } else {
            &[]
        };
        results_to_buffer(wrapper, false, pt_versions)
    })())
}

/// Rolls a transaction back, discarding its steps and freeing the
/// handle.
#[no_mangle]
pub extern "C" fn kitedb_rollback_transaction(
    rx: KitedbHandle,
    tx: KitedbTxHandle,
) -> KitedbError {
    error_to_c((|| {
        let engine = registry::engine(rx)?;
        let tx = registry::take_tx(tx)?;
        engine.rollback_transaction(tx)
    })())
}
