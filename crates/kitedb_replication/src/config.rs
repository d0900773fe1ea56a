//! Configuration for the replication supervisor.

use std::collections::HashSet;

/// Role of an engine in a replication pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplicationRole {
    /// Replication disabled.
    #[default]
    None,
    /// This engine serves a WAL to slaves.
    Master,
    /// This engine follows a master.
    Slave,
}

/// Replication configuration.
#[derive(Debug, Clone, Default)]
pub struct ReplicationConfig {
    /// This engine's role.
    pub role: ReplicationRole,
    /// DSN of the master to follow (slave role only).
    pub master_dsn: String,
    /// Cluster the pair belongs to; a master from another cluster is
    /// refused.
    pub cluster_id: i32,
    /// Connection pool size for the master client.
    pub conn_pool_size: usize,
    /// Worker threads for the master client.
    pub worker_threads: usize,
    /// Namespaces to replicate; empty means all non-system ones.
    pub namespaces: HashSet<String>,
    /// Force a full resync when the data hash diverges.
    pub force_sync_on_wrong_data_hash: bool,
    /// Force a full resync on non-network logic errors.
    pub force_sync_on_logic_error: bool,
}

impl ReplicationConfig {
    /// Creates a slave configuration following `master_dsn`.
    pub fn slave(master_dsn: impl Into<String>) -> Self {
        Self {
            role: ReplicationRole::Slave,
            master_dsn: master_dsn.into(),
            conn_pool_size: 1,
            worker_threads: 1,
            ..Self::default()
        }
    }

    /// Sets the cluster ID.
    #[must_use]
    pub fn with_cluster_id(mut self, cluster_id: i32) -> Self {
        self.cluster_id = cluster_id;
        self
    }

    /// Restricts replication to the given namespaces.
    #[must_use]
    pub fn with_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    /// Enables forced resync on data-hash mismatch.
    #[must_use]
    pub fn with_force_sync_on_wrong_data_hash(mut self, on: bool) -> Self {
        self.force_sync_on_wrong_data_hash = on;
        self
    }

    /// Enables forced resync on logic errors.
    #[must_use]
    pub fn with_force_sync_on_logic_error(mut self, on: bool) -> Self {
        self.force_sync_on_logic_error = on;
        self
    }

    /// True when replication is enabled for `ns_name`: system
    /// namespaces (leading `#`) and names outside a non-empty
    /// namespace set are skipped.
    pub fn sync_enabled(&self, ns_name: &str) -> bool {
        if ns_name.starts_with('#') {
            return false;
        }
        self.namespaces.is_empty() || self.namespaces.contains(ns_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slave_config_defaults() {
        let config = ReplicationConfig::slave("inproc://master");
        assert_eq!(config.role, ReplicationRole::Slave);
        assert_eq!(config.master_dsn, "inproc://master");
        assert!(!config.force_sync_on_wrong_data_hash);
    }

    #[test]
    fn system_namespaces_are_not_synced() {
        let config = ReplicationConfig::slave("x");
        assert!(!config.sync_enabled("#config"));
        assert!(config.sync_enabled("docs"));
    }

    #[test]
    fn namespace_set_filters() {
        let config = ReplicationConfig::slave("x").with_namespaces(["docs"]);
        assert!(config.sync_enabled("docs"));
        assert!(!config.sync_enabled("other"));
    }
}
