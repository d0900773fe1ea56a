//! Master/slave convergence tests over an in-process pair.

use std::sync::Arc;
use std::time::Duration;

use kitedb_core::{Engine, EngineConfig, IndexDef, Item, StorageOpts};
use kitedb_replication::{InProcessMaster, MasterClient, ReplicationConfig, Replicator};
use serde_json::{json, Value};

fn init_logs() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn master_engine(cluster_id: i32) -> Arc<Engine> {
    init_logs();
    Arc::new(Engine::with_config(
        EngineConfig::default().with_cluster_id(cluster_id),
    ))
}

fn setup_ns(engine: &Arc<Engine>, ns: &str) {
    engine
        .open_namespace(ns, StorageOpts::new().enabled().create_if_missing())
        .unwrap();
    engine
        .add_index(
            ns,
            &IndexDef {
                name: "id".into(),
                index_type: "hash".into(),
                is_pk: true,
            },
        )
        .unwrap();
}

fn upsert(engine: &Arc<Engine>, ns: &str, payload: Value) -> Item {
    let mut item = engine.new_item(ns).unwrap();
    item.set_payload(payload);
    engine.upsert(ns, &mut item).unwrap();
    item
}

fn replicator_for(slave: &Arc<Engine>, master: &Arc<Engine>) -> Replicator {
    let master = Arc::clone(master);
    Replicator::new(Arc::clone(slave), move |_config| {
        Ok(Arc::new(InProcessMaster::new(Arc::clone(&master))) as Arc<dyn MasterClient>)
    })
}

fn states_match(master: &Arc<Engine>, slave: &Arc<Engine>, ns: &str) -> bool {
    match (master.get_namespace(ns), slave.get_namespace(ns)) {
        (Some(m), Some(s)) => {
            let (m, s) = (m.repl_state(), s.repl_state());
            m.last_lsn == s.last_lsn && m.data_hash == s.data_hash
        }
        _ => false,
    }
}

fn wait_converged(master: &Arc<Engine>, slave: &Arc<Engine>, ns: &str) -> bool {
    for _ in 0..500 {
        if states_match(master, slave, ns) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

fn wait_terminated(replicator: &Replicator) -> bool {
    for _ in 0..500 {
        if replicator.is_terminated() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn initial_wal_catch_up_converges() {
    let master = master_engine(1);
    setup_ns(&master, "docs");
    for i in 0..20 {
        upsert(&master, "docs", json!({"id": i, "v": format!("v{i}")}));
    }
    master.put_meta("docs", "schema", "v1").unwrap();

    let slave = Arc::new(Engine::new());
    let replicator = replicator_for(&slave, &master);
    replicator.configure(ReplicationConfig::slave("inproc://master").with_cluster_id(1));
    replicator.start().unwrap();

    assert!(wait_converged(&master, &slave, "docs"));
    let slave_ns = slave.get_namespace("docs").unwrap();
    assert_eq!(slave_ns.item_count(), 20);
    assert_eq!(slave_ns.get_meta("schema"), "v1");
    // The slave namespace ends up write-protected.
    assert!(slave_ns.opts().slave_mode);

    replicator.stop();
}

#[test]
fn incremental_catch_up_picks_up_from_last_lsn() {
    let master = master_engine(1);
    setup_ns(&master, "docs");
    for i in 0..10 {
        upsert(&master, "docs", json!({"id": i}));
    }

    let slave = Arc::new(Engine::new());
    let replicator = replicator_for(&slave, &master);
    replicator.configure(ReplicationConfig::slave("inproc://master").with_cluster_id(1));
    replicator.start().unwrap();
    assert!(wait_converged(&master, &slave, "docs"));
    replicator.stop();

    let resume_lsn = slave.get_namespace("docs").unwrap().repl_state().last_lsn;
    assert!(resume_lsn > 0);

    // New writes while the replicator is down.
    for i in 10..20 {
        upsert(&master, "docs", json!({"id": i}));
    }

    replicator.configure(ReplicationConfig::slave("inproc://master").with_cluster_id(1));
    replicator.start().unwrap();
    assert!(wait_converged(&master, &slave, "docs"));
    assert_eq!(slave.get_namespace("docs").unwrap().item_count(), 20);
    replicator.stop();
}

#[test]
fn outdated_wal_triggers_forced_resync() {
    let master = master_engine(1);
    setup_ns(&master, "docs");
    for i in 0..50 {
        upsert(&master, "docs", json!({"id": i}));
    }
    master.put_meta("docs", "origin", "master").unwrap();
    // Drop the WAL prefix: a fresh slave can no longer catch up
    // incrementally.
    let master_ns = master.get_namespace("docs").unwrap();
    master_ns.trim_wal(master_ns.repl_state().last_lsn - 5);

    // The slave starts with local garbage that the forced resync must
    // wipe.
    let slave = Arc::new(Engine::new());
    setup_ns(&slave, "docs");
    upsert(&slave, "docs", json!({"id": 999, "v": "garbage"}));

    let replicator = replicator_for(&slave, &master);
    replicator.configure(ReplicationConfig::slave("inproc://master").with_cluster_id(1));
    replicator.start().unwrap();

    assert!(wait_converged(&master, &slave, "docs"));
    let slave_ns = slave.get_namespace("docs").unwrap();
    assert_eq!(slave_ns.item_count(), 50);
    assert_eq!(slave_ns.get_meta("origin"), "master");
    assert!(slave_ns
        .select_where(&kitedb_core::Query::new("docs").filter(
            "id",
            kitedb_core::CondType::Eq,
            kitedb_core::KeyValue::Int(999),
        ))
        .is_empty());

    replicator.stop();
}

#[test]
fn missing_wal_is_fatal() {
    let master = Arc::new(Engine::with_config(
        EngineConfig::default().with_cluster_id(1).without_wal(),
    ));
    setup_ns(&master, "docs");
    upsert(&master, "docs", json!({"id": 1}));

    let slave = Arc::new(Engine::new());
    let replicator = replicator_for(&slave, &master);
    replicator.configure(ReplicationConfig::slave("inproc://master").with_cluster_id(1));
    replicator.start().unwrap();

    assert!(wait_terminated(&replicator));
    replicator.stop();
}

#[test]
fn cluster_id_mismatch_applies_nothing_and_terminates() {
    let master = master_engine(2);
    setup_ns(&master, "docs");
    for i in 0..5 {
        upsert(&master, "docs", json!({"id": i}));
    }

    let slave = Arc::new(Engine::new());
    let replicator = replicator_for(&slave, &master);
    // Configured for cluster 1, master reports cluster 2.
    replicator.configure(ReplicationConfig::slave("inproc://master").with_cluster_id(1));
    replicator.start().unwrap();

    assert!(wait_terminated(&replicator));
    // No WAL record from the foreign cluster was applied.
    let slave_ns = slave.get_namespace("docs").unwrap();
    assert_eq!(slave_ns.item_count(), 0);
    assert_eq!(slave_ns.repl_state().last_lsn, -1);

    replicator.stop();
}

#[test]
fn live_streaming_keeps_slave_convergent() {
    let master = master_engine(1);
    setup_ns(&master, "docs");

    let slave = Arc::new(Engine::new());
    let replicator = replicator_for(&slave, &master);
    replicator.configure(ReplicationConfig::slave("inproc://master").with_cluster_id(1));
    replicator.start().unwrap();
    assert!(wait_converged(&master, &slave, "docs"));

    // Mutations after catch-up stream straight through.
    upsert(&master, "docs", json!({"id": 1, "v": "a"}));
    upsert(&master, "docs", json!({"id": 2, "v": "b"}));
    let mut del = master.new_item("docs").unwrap();
    del.set_payload(json!({"id": 1}));
    master.delete("docs", &mut del).unwrap();
    master.put_meta("docs", "schema", "v2").unwrap();

    assert!(wait_converged(&master, &slave, "docs"));
    let slave_ns = slave.get_namespace("docs").unwrap();
    assert_eq!(slave_ns.item_count(), 1);
    assert_eq!(slave_ns.get_meta("schema"), "v2");

    replicator.stop();
}

#[test]
fn writes_racing_catch_up_converge() {
    let master = master_engine(1);
    setup_ns(&master, "docs");
    for i in 0..100 {
        upsert(&master, "docs", json!({"id": i}));
    }

    let slave = Arc::new(Engine::new());
    let replicator = replicator_for(&slave, &master);
    replicator.configure(ReplicationConfig::slave("inproc://master").with_cluster_id(1));

    // Keep writing while the initial catch-up runs; racing updates
    // for the syncing namespace are skipped and re-fetched via the
    // raised cursor.
    let writer = {
        let master = Arc::clone(&master);
        std::thread::spawn(move || {
            for i in 100..200 {
                let mut item = master.new_item("docs").unwrap();
                item.set_payload(json!({"id": i}));
                master.upsert("docs", &mut item).unwrap();
            }
        })
    };

    replicator.start().unwrap();
    writer.join().unwrap();

    // A reconnect-style resync closes any window at the end of the
    // racing pass.
    replicator.resync();
    assert!(wait_converged(&master, &slave, "docs"));
    assert_eq!(slave.get_namespace("docs").unwrap().item_count(), 200);

    replicator.stop();
}

#[test]
fn namespace_filter_is_honored() {
    let master = master_engine(1);
    setup_ns(&master, "docs");
    setup_ns(&master, "other");
    upsert(&master, "docs", json!({"id": 1}));
    upsert(&master, "other", json!({"id": 1}));

    let slave = Arc::new(Engine::new());
    let replicator = replicator_for(&slave, &master);
    replicator.configure(
        ReplicationConfig::slave("inproc://master")
            .with_cluster_id(1)
            .with_namespaces(["docs"]),
    );
    replicator.start().unwrap();

    assert!(wait_converged(&master, &slave, "docs"));
    assert!(slave.get_namespace("other").is_none());

    replicator.stop();
}

#[test]
fn delete_query_replicates_through_wal() {
    let master = master_engine(1);
    setup_ns(&master, "docs");
    for i in 0..10 {
        upsert(&master, "docs", json!({"id": i}));
    }

    let slave = Arc::new(Engine::new());
    let replicator = replicator_for(&slave, &master);
    replicator.configure(ReplicationConfig::slave("inproc://master").with_cluster_id(1));
    replicator.start().unwrap();
    assert!(wait_converged(&master, &slave, "docs"));

    let query = kitedb_core::Query::from_sql("DELETE FROM docs WHERE id >= 5").unwrap();
    master.delete_query(&query).unwrap();

    assert!(wait_converged(&master, &slave, "docs"));
    assert_eq!(slave.get_namespace("docs").unwrap().item_count(), 5);

    replicator.stop();
}

#[test]
fn non_slave_role_start_is_a_noop() {
    let master = master_engine(1);
    let slave = Arc::new(Engine::new());
    let replicator = replicator_for(&slave, &master);
    // Default role is None: start succeeds without spawning a worker.
    replicator.start().unwrap();
    assert!(!replicator.is_terminated());
    replicator.stop();
}

#[test]
fn double_start_is_rejected() {
    let master = master_engine(1);
    setup_ns(&master, "docs");
    let slave = Arc::new(Engine::new());
    let replicator = replicator_for(&slave, &master);
    replicator.configure(ReplicationConfig::slave("inproc://master").with_cluster_id(1));
    replicator.start().unwrap();
    let err = replicator.start().unwrap_err();
    assert_eq!(err.code(), 4);
    replicator.stop();
}
