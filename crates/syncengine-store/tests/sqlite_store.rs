// crates/syncengine-store/tests/sqlite_store.rs
// ============================================================================
// Integration tests: the SQLite-backed store.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use syncengine_core::ActionRef;
use syncengine_core::Completion;
use syncengine_core::CompletionId;
use syncengine_core::FlowToken;
use syncengine_core::Invocation;
use syncengine_core::InvocationId;
use syncengine_core::OutputCase;
use syncengine_core::Store;
use syncengine_core::SyncFiring;
use syncengine_core::SyncId;
use syncengine_core::Value;
use syncengine_core::hashing;
use syncengine_store::SqliteStore;
use syncengine_store::StoreConfig;

fn open_store() -> (tempfile::TempDir, SqliteStore) {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(dir.path().join("engine.db"));
    let store = SqliteStore::open(config).unwrap();
    (dir, store)
}

fn invocation(id: &str, flow: &str, action: &str, seq: u64) -> Invocation {
    Invocation {
        id: InvocationId::new(id),
        flow_token: FlowToken::new(flow),
        action_uri: ActionRef::parse(action).unwrap(),
        args: Value::empty_object(),
        seq,
        security_context: Value::Null,
        spec_hash: "spec-1".to_string(),
        engine_version: "0.1.0".to_string(),
        ir_version: "1".to_string(),
    }
}

fn completion(id: &str, invocation_id: &str, output_case: &str, seq: u64) -> Completion {
    Completion {
        id: CompletionId::new(id),
        invocation_id: InvocationId::new(invocation_id),
        output_case: OutputCase::new(output_case),
        result: Value::empty_object(),
        seq,
        security_context: Value::Null,
    }
}

#[test]
fn writing_an_invocation_twice_is_idempotent() {
    let (_dir, store) = open_store();
    let inv = invocation("inv-1", "f1", "Order.create", 1);
    store.write_invocation(&inv).unwrap();
    store.write_invocation(&inv).unwrap();

    let read_back = store.read_invocation(&InvocationId::new("inv-1")).unwrap();
    assert_eq!(read_back, inv);
}

#[test]
fn second_completion_for_same_invocation_is_dropped() {
    let (_dir, store) = open_store();
    let inv = invocation("inv-1", "f1", "Order.create", 1);
    store.write_invocation(&inv).unwrap();

    let first = completion("comp-1", "inv-1", "Success", 2);
    let second = completion("comp-2", "inv-1", "Failure", 3);
    store.write_completion(&first).unwrap();
    store.write_completion(&second).unwrap();

    let read_back = store.read_completion(&CompletionId::new("comp-1")).unwrap();
    assert_eq!(read_back.output_case.as_str(), "Success");
    assert!(store.read_completion(&CompletionId::new("comp-2")).is_err());
}

#[test]
fn atomic_firing_write_is_all_or_nothing_and_idempotent() {
    let (_dir, store) = open_store();
    let inv = invocation("inv-1", "f1", "Order.create", 1);
    store.write_invocation(&inv).unwrap();
    let comp = completion("comp-1", "inv-1", "Success", 2);
    store.write_completion(&comp).unwrap();

    let binding_hash = hashing::domain_hash(hashing::BINDING_DOMAIN, &Value::empty_object()).unwrap();
    let firing = SyncFiring {
        id: 0,
        completion_id: CompletionId::new("comp-1"),
        sync_id: SyncId::new("self"),
        binding_hash: syncengine_core::BindingHash::new(binding_hash),
        seq: 3,
    };
    let produced = invocation("inv-2", "f1", "Order.create", 4);

    let (firing_id, inserted) = store.write_sync_firing_atomic(&firing, &produced).unwrap();
    assert!(inserted);

    let (second_id, second_inserted) = store.write_sync_firing_atomic(&firing, &produced).unwrap();
    assert!(!second_inserted);
    assert_eq!(firing_id, second_id);

    let produced_back = store.read_invocation(&InvocationId::new("inv-2")).unwrap();
    assert_eq!(produced_back, produced);

    let provenance = store.read_provenance(&InvocationId::new("inv-2")).unwrap();
    assert_eq!(provenance.len(), 1);
    assert!(store.find_orphaned_sync_firings().unwrap().is_empty());
}

#[test]
fn read_flow_orders_by_seq_then_id() {
    let (_dir, store) = open_store();
    let a = invocation("inv-b", "f1", "Order.create", 2);
    let b = invocation("inv-a", "f1", "Order.create", 1);
    store.write_invocation(&a).unwrap();
    store.write_invocation(&b).unwrap();

    let (invocations, _completions) = store.read_flow(&FlowToken::new("f1")).unwrap();
    let ids: Vec<&str> = invocations.iter().map(|inv| inv.id.as_str()).collect();
    assert_eq!(ids, vec!["inv-a", "inv-b"]);
}

#[test]
fn pending_invocations_exclude_completed_ones() {
    let (_dir, store) = open_store();
    let pending = invocation("inv-1", "f1", "Order.create", 1);
    let done = invocation("inv-2", "f1", "Order.create", 2);
    store.write_invocation(&pending).unwrap();
    store.write_invocation(&done).unwrap();
    store.write_completion(&completion("comp-1", "inv-2", "Success", 3)).unwrap();

    let pending_rows = store.get_pending_invocations(&FlowToken::new("f1")).unwrap();
    assert_eq!(pending_rows.len(), 1);
    assert_eq!(pending_rows[0].id.as_str(), "inv-1");
}

#[test]
fn last_seq_resumes_above_stored_maximum() {
    let (_dir, store) = open_store();
    store.write_invocation(&invocation("inv-1", "f1", "Order.create", 7)).unwrap();
    store.write_completion(&completion("comp-1", "inv-1", "Success", 9)).unwrap();
    assert_eq!(store.get_last_seq().unwrap(), 9);
}

#[test]
fn state_rows_are_read_back_in_insertion_order() {
    use syncengine_core::StateStore;

    let (_dir, store) = open_store();
    let mut item_a = std::collections::BTreeMap::new();
    item_a.insert("item_id".to_string(), Value::String("A".to_string()));
    item_a.insert("qty".to_string(), Value::Int(10));
    let mut item_b = std::collections::BTreeMap::new();
    item_b.insert("item_id".to_string(), Value::String("B".to_string()));
    item_b.insert("qty".to_string(), Value::Int(5));

    store.write_state_row("CartItem", &FlowToken::new("f1"), Value::Object(item_a)).unwrap();
    store.write_state_row("CartItem", &FlowToken::new("f2"), Value::Object(item_b)).unwrap();

    let rows = store.read_state_rows("CartItem").unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].flow_token, FlowToken::new("f1"));
    assert_eq!(rows[1].flow_token, FlowToken::new("f2"));
    assert_eq!(rows[0].fields.get_field("item_id"), Some(&Value::String("A".to_string())));
}

#[test]
fn unknown_state_table_reads_as_empty() {
    use syncengine_core::StateStore;

    let (_dir, store) = open_store();
    assert!(store.read_state_rows("NoSuchTable").unwrap().is_empty());
}
