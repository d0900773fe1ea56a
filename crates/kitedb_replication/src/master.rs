//! The master-client contract consumed by the replicator.

use std::sync::Arc;

use kitedb_core::{
    Engine, NamespaceDef, Query, QueryResults, Result, ResultFlags, TagsMatcher, UpdateObserver,
};

/// A client session against a master engine.
///
/// This trait abstracts the transport: the production client speaks
/// the network RPC protocol (an external collaborator), while
/// [`InProcessMaster`] serves tests and embedded master/slave pairs
/// from the same process.
pub trait MasterClient: Send + Sync {
    /// Connects the session to the master.
    fn connect(&self, dsn: &str) -> Result<()>;

    /// Enumerates the master's namespaces.
    fn enum_namespaces(&self) -> Result<Vec<NamespaceDef>>;

    /// Runs a query against the master; WAL queries and forced-sync
    /// full selects request `CJSON | WITH_ITEM_ID | WITH_RAW`.
    fn select(&self, query: &Query, flags: ResultFlags) -> Result<QueryResults>;

    /// Enumerates metadata keys of a namespace.
    fn enum_meta(&self, ns_name: &str) -> Result<Vec<String>>;

    /// Reads one metadata key.
    fn get_meta(&self, ns_name: &str, key: &str) -> Result<String>;

    /// Snapshot of the master's tags matcher for a namespace.
    fn tags_matcher(&self, ns_name: &str) -> Result<TagsMatcher>;

    /// Subscribes (or unsubscribes) a WAL update observer. The
    /// observer also receives connection-state callbacks.
    fn subscribe_updates(&self, observer: &Arc<dyn UpdateObserver>, subscribe: bool)
        -> Result<()>;
}

/// A master client over an engine living in the same process.
pub struct InProcessMaster {
    engine: Arc<Engine>,
}

impl InProcessMaster {
    /// Wraps a local engine as a master.
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }
}

impl MasterClient for InProcessMaster {
    fn connect(&self, _dsn: &str) -> Result<()> {
        Ok(())
    }

    fn enum_namespaces(&self) -> Result<Vec<NamespaceDef>> {
        Ok(self.engine.enum_namespaces())
    }

    fn select(&self, query: &Query, flags: ResultFlags) -> Result<QueryResults> {
        self.engine.select_with_flags(query, flags)
    }

    fn enum_meta(&self, ns_name: &str) -> Result<Vec<String>> {
        self.engine.enum_meta(ns_name)
    }

    fn get_meta(&self, ns_name: &str, key: &str) -> Result<String> {
        self.engine.get_meta(ns_name, key)
    }

    fn tags_matcher(&self, ns_name: &str) -> Result<TagsMatcher> {
        Ok(self.engine.new_item(ns_name)?.tags().clone())
    }

    fn subscribe_updates(
        &self,
        observer: &Arc<dyn UpdateObserver>,
        subscribe: bool,
    ) -> Result<()> {
        self.engine.subscribe_updates(observer, subscribe);
        Ok(())
    }
}
