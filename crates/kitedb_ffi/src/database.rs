//! Engine lifecycle, namespace, index, meta, and item entry points.

use kitedb_codec::Decoder;
use kitedb_core::{
    Engine, Error, IndexDef, Item, ModifyMode, PayloadFormat, Result, StorageOpts,
};

use crate::buffer::{acquire_results, error_to_c, hand_out, results_to_buffer, ret_to_c};
use crate::registry;
use crate::types::{
    buffer_slice, string_view, KitedbBuffer, KitedbError, KitedbHandle, KitedbRet, KitedbStorageOpts,
    KitedbString,
};

/// Creates an engine and returns its handle.
///
/// Process-wide state (the result pool, the handle registry) is
/// initialized with the first engine.
#[no_mangle]
pub extern "C" fn kitedb_init() -> KitedbHandle {
    registry::register_engine(Engine::new())
}

/// Destroys an engine and releases all of its resources.
#[no_mangle]
pub extern "C" fn kitedb_destroy(rx: KitedbHandle) -> KitedbError {
    error_to_c(registry::unregister_engine(rx))
}

/// Liveness check for an engine handle.
#[no_mangle]
pub extern "C" fn kitedb_ping(rx: KitedbHandle) -> KitedbError {
    error_to_c(registry::engine(rx).map(|_| ()))
}

/// Opens (or creates) a namespace.
///
/// # Safety
///
/// `ns` must satisfy the [`KitedbString`] contract.
#[no_mangle]
pub unsafe extern "C" fn kitedb_open_namespace(
    rx: KitedbHandle,
    ns: KitedbString,
    opts: KitedbStorageOpts,
) -> KitedbError {
    error_to_c((|| {
        let engine = registry::engine(rx)?;
        engine.open_namespace(string_view(ns)?, StorageOpts::from(opts))
    })())
}

/// Closes a namespace, keeping its data.
///
/// # Safety
///
/// `ns` must satisfy the [`KitedbString`] contract.
#[no_mangle]
pub unsafe extern "C" fn kitedb_close_namespace(
    rx: KitedbHandle,
    ns: KitedbString,
) -> KitedbError {
    error_to_c((|| {
        let engine = registry::engine(rx)?;
        engine.close_namespace(string_view(ns)?, false)
    })())
}

/// Drops a namespace and its data.
///
/// # Safety
///
/// `ns` must satisfy the [`KitedbString`] contract.
#[no_mangle]
pub unsafe extern "C" fn kitedb_drop_namespace(rx: KitedbHandle, ns: KitedbString) -> KitedbError {
    error_to_c((|| {
        let engine = registry::engine(rx)?;
        engine.drop_namespace(string_view(ns)?)
    })())
}

/// Adds an index from its JSON definition.
///
/// # Safety
///
/// `ns` and `def_json` must satisfy the [`KitedbString`] contract.
#[no_mangle]
pub unsafe extern "C" fn kitedb_add_index(
    rx: KitedbHandle,
    ns: KitedbString,
    def_json: KitedbString,
) -> KitedbError {
    error_to_c((|| {
        let engine = registry::engine(rx)?;
        let def = IndexDef::from_json(string_view(def_json)?)?;
        engine.add_index(string_view(ns)?, &def)
    })())
}

/// Alters an index from its JSON definition.
///
/// # Safety
///
/// `ns` and `def_json` must satisfy the [`KitedbString`] contract.
#[no_mangle]
pub unsafe extern "C" fn kitedb_update_index(
    rx: KitedbHandle,
    ns: KitedbString,
    def_json: KitedbString,
) -> KitedbError {
    error_to_c((|| {
        let engine = registry::engine(rx)?;
        let def = IndexDef::from_json(string_view(def_json)?)?;
        engine.update_index(string_view(ns)?, &def)
    })())
}

/// Drops an index by name.
///
/// # Safety
///
/// `ns` and `index` must satisfy the [`KitedbString`] contract.
#[no_mangle]
pub unsafe extern "C" fn kitedb_drop_index(
    rx: KitedbHandle,
    ns: KitedbString,
    index: KitedbString,
) -> KitedbError {
    error_to_c((|| {
        let engine = registry::engine(rx)?;
        let def = IndexDef {
            name: string_view(index)?.to_owned(),
            index_type: "hash".to_owned(),
            is_pk: false,
        };
        engine.drop_index(string_view(ns)?, &def)
    })())
}

/// Enables the storage collaborator under the given root path.
///
/// # Safety
///
/// `path` must satisfy the [`KitedbString`] contract.
#[no_mangle]
pub unsafe extern "C" fn kitedb_enable_storage(
    rx: KitedbHandle,
    path: KitedbString,
) -> KitedbError {
    error_to_c((|| {
        let engine = registry::engine(rx)?;
        engine.enable_storage(string_view(path)?)
    })())
}

/// Opens the reserved system namespaces.
#[no_mangle]
pub extern "C" fn kitedb_init_system_namespaces(rx: KitedbHandle) -> KitedbError {
    error_to_c((|| registry::engine(rx)?.init_system_namespaces())())
}

/// Writes a metadata key.
///
/// # Safety
///
/// `ns`, `key`, and `data` must satisfy the [`KitedbString`] contract.
#[no_mangle]
pub unsafe extern "C" fn kitedb_put_meta(
    rx: KitedbHandle,
    ns: KitedbString,
    key: KitedbString,
    data: KitedbString,
) -> KitedbError {
    error_to_c((|| {
        let engine = registry::engine(rx)?;
        engine.put_meta(string_view(ns)?, string_view(key)?, string_view(data)?)
    })())
}

/// Reads a metadata key into a result buffer.
///
/// # Safety
///
/// `ns` and `key` must satisfy the [`KitedbString`] contract.
#[no_mangle]
pub unsafe extern "C" fn kitedb_get_meta(
    rx: KitedbHandle,
    ns: KitedbString,
    key: KitedbString,
) -> KitedbRet {
    ret_to_c((|| {
        let engine = registry::engine(rx)?;
        let value = engine.get_meta(string_view(ns)?, string_view(key)?)?;
        let mut wrapper = acquire_results()?;
        wrapper.ser.reset();
        wrapper.ser.put_raw(value.as_bytes());
        Ok(hand_out(wrapper))
    })())
}

/// Flushes a namespace to the storage collaborator.
///
/// # Safety
///
/// `ns` must satisfy the [`KitedbString`] contract.
#[no_mangle]
pub unsafe extern "C" fn kitedb_commit(rx: KitedbHandle, ns: KitedbString) -> KitedbError {
    error_to_c((|| {
        let engine = registry::engine(rx)?;
        engine.commit(string_view(ns)?)
    })())
}

/// Arguments of a packed item-modify call.
pub(crate) struct PackedItemArgs {
    pub namespace: Option<String>,
    pub format: PayloadFormat,
    pub mode: ModifyMode,
    pub state_token: i32,
    pub precepts: Vec<String>,
}

/// Decodes the argument buffer of `modify_item_packed` (+`_tx`).
///
/// Field order: [namespace,] format, mode, state token, precept count,
/// precepts.
pub(crate) fn decode_packed_args(bytes: &[u8], with_namespace: bool) -> Result<PackedItemArgs> {
    let mut dec = Decoder::new(bytes);
    let namespace = if with_namespace {
        Some(dec.get_vstring()?)
    } else {
        None
    };
    let format = PayloadFormat::from_u64(dec.get_varuint()?)?;
    let mode = ModifyMode::from_u64(dec.get_varuint()?)?;
    let state_token = dec.get_varuint()? as i32;
    let mut precepts = Vec::new();
    let mut count = dec.get_varuint()?;
    while count > 0 {
        precepts.push(dec.get_vstring()?);
        count -= 1;
    }
    Ok(PackedItemArgs {
        namespace,
        format,
        mode,
        state_token,
        precepts,
    })
}

/// Builds an item from decoded arguments and a payload buffer.
pub(crate) fn process_packed_item(
    engine: &Engine,
    ns: &str,
    args: &PackedItemArgs,
    data: &[u8],
) -> Result<Item> {
    let mut item = engine.new_item(ns)?;
    match args.format {
        PayloadFormat::Json => item.from_json(data)?,
        PayloadFormat::CJson => {
            if item.state_token() != args.state_token {
                return Err(Error::StateInvalidated {
                    token: args.state_token,
                    expected: item.state_token(),
                });
            }
            item.from_cjson(data)?;
        }
    }
    item.set_precepts(args.precepts.clone());
    Ok(item)
}

/// Applies one item modification and returns the applied item in a
/// result buffer; a tags-matcher update travels back as a
/// payload-types block.
///
/// # Safety
///
/// `args` and `data` must satisfy the [`KitedbBuffer`] contract.
#[no_mangle]
pub unsafe extern "C" fn kitedb_modify_item_packed(
    rx: KitedbHandle,
    args: KitedbBuffer,
    data: KitedbBuffer,
) -> KitedbRet {
    ret_to_c((|| {
        let engine = registry::engine(rx)?;
        let args = decode_packed_args(buffer_slice(args), true)?;
        let ns = args
            .namespace
            .clone()
            .ok_or_else(|| Error::params("missing namespace in arguments"))?;

        let mut item = process_packed_item(&engine, &ns, &args, buffer_slice(data))?;
        engine.modify(&ns, &mut item, args.mode)?;

        let mut wrapper = acquire_results()?;
        if let Some(namespace) = engine.get_namespace(&ns) {
            wrapper
                .results
                .set_context(&ns, namespace.tags_snapshot());
        }
        wrapper.results.add_item(&item);
        let pt_versions: &[i32] = if item.is_tags_updated() { &[-1] } else { &[] };
        results_to_buffer(wrapper, false, pt_versions)
    })())
}
