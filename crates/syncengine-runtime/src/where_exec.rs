// crates/syncengine-runtime/src/where_exec.rs
// ============================================================================
// Module: Where Executor
// Description: Evaluate a sync rule's optional where-clause fan-out query.
// Purpose: Turn one when-clause binding set into zero or more binding sets,
//          one per matching row of the clause's source table.
// Dependencies: syncengine_core, syncengine_filter
// ============================================================================

//! ## Overview
//! A sync rule with no `where` clause fans out to exactly the when-clause's
//! own binding set. A sync rule with a `where` clause reads every row of
//! `source_table` through [`syncengine_core::StateStore`], narrows it by the
//! rule's [`Scope`] and parsed filter, and for each surviving row produces a
//! binding set that is the where-clause's own bindings merged over the
//! when-clause's (the where stage's bindings win on key collision, since
//! they are the more specific, row-level values).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use syncengine_core::FlowToken;
use syncengine_core::Scope;
use syncengine_core::ScopeMode;
use syncengine_core::StateRow;
use syncengine_core::StateStore;
use syncengine_core::Value;
use syncengine_core::WhereClause;
use syncengine_filter::Filter;
use syncengine_filter::Predicate;
use syncengine_filter::Rhs;

use crate::error::EngineError;

// ============================================================================
// SECTION: Execution
// ============================================================================

/// Evaluates `where_clause` (if any) against `state`, scoped by `scope` and
/// `flow`, seeded with the when-clause's own `when_bindings`.
///
/// Returns one binding map per matching row when a where-clause is present,
/// or the single `when_bindings` map unchanged when it is absent.
///
/// # Errors
///
/// Returns [`EngineError::Filter`] if the clause's filter text fails to
/// parse, [`EngineError::KeyMissing`] if a `Keyed` scope's key is absent from
/// `when_bindings`, [`EngineError::UnboundFilterVariable`] if the filter
/// references a `bound.` variable `when_bindings` never produced, and
/// [`EngineError::Store`] on any backend failure.
pub fn execute_where(
    state: &dyn StateStore,
    where_clause: Option<&WhereClause>,
    scope: &Scope,
    flow: &FlowToken,
    when_bindings: &BTreeMap<String, Value>,
) -> Result<Vec<BTreeMap<String, Value>>, EngineError> {
    let Some(clause) = where_clause else {
        return Ok(vec![when_bindings.clone()]);
    };

    let filter = match &clause.filter {
        Some(text) => syncengine_filter::parse(text)?,
        None => Filter { predicates: Vec::new() },
    };

    let scope_key_value = scope_key_binding(scope, when_bindings)?;
    let rows = state.read_state_rows(&clause.source_table)?;

    let mut results = Vec::new();
    for row in &rows {
        if !row_matches_scope(row, scope, flow, scope_key_value.as_ref()) {
            continue;
        }
        if !row_matches_filter(row, &filter, when_bindings)? {
            continue;
        }
        results.push(merge_bindings(when_bindings, &clause.bindings, row));
    }
    Ok(results)
}

/// Resolves a `Keyed` scope's key from `when_bindings`, if the scope needs
/// one.
fn scope_key_binding<'a>(
    scope: &Scope,
    when_bindings: &'a BTreeMap<String, Value>,
) -> Result<Option<&'a Value>, EngineError> {
    match scope.mode {
        ScopeMode::Keyed => {
            let key = scope.key.as_deref().unwrap_or_default();
            when_bindings
                .get(key)
                .map(Some)
                .ok_or_else(|| EngineError::KeyMissing { scope_key: key.to_string() })
        }
        ScopeMode::Flow | ScopeMode::Global => Ok(None),
    }
}

/// Whether `row` satisfies the rule's scope.
fn row_matches_scope(row: &StateRow, scope: &Scope, flow: &FlowToken, scope_key_value: Option<&Value>) -> bool {
    match scope.mode {
        ScopeMode::Flow => &row.flow_token == flow,
        ScopeMode::Global => true,
        ScopeMode::Keyed => {
            let Some(key) = scope.key.as_deref() else { return false };
            let Some(expected) = scope_key_value else { return false };
            row.fields.get_field(key) == Some(expected)
        }
    }
}

/// Whether `row` satisfies every predicate in the parsed filter.
fn row_matches_filter(
    row: &StateRow,
    filter: &Filter,
    when_bindings: &BTreeMap<String, Value>,
) -> Result<bool, EngineError> {
    for predicate in &filter.predicates {
        let actual = column_value(row, &predicate.column);
        let expected = resolve_rhs(predicate, when_bindings)?;
        if actual.as_ref() != Some(&expected) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Reads a column's value off `row`, special-casing `flow_token` since it is
/// a synthetic column rather than a declared field.
fn column_value(row: &StateRow, column: &str) -> Option<Value> {
    if column == "flow_token" {
        Some(Value::String(row.flow_token.as_str().to_string()))
    } else {
        row.fields.get_field(column).cloned()
    }
}

/// Resolves a predicate's right-hand side to a concrete value.
fn resolve_rhs(predicate: &Predicate, when_bindings: &BTreeMap<String, Value>) -> Result<Value, EngineError> {
    match &predicate.rhs {
        Rhs::Literal(value) => Ok(value.clone()),
        Rhs::BoundRef(name) => when_bindings
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnboundFilterVariable(name.clone())),
    }
}

/// Builds one output binding map: the where-clause's own bindings (read from
/// `row`), merged over `when_bindings` so row-level bindings win on
/// collision.
fn merge_bindings(
    when_bindings: &BTreeMap<String, Value>,
    where_bindings: &BTreeMap<String, String>,
    row: &StateRow,
) -> BTreeMap<String, Value> {
    let mut merged = when_bindings.clone();
    for (var, column) in where_bindings {
        if let Some(value) = column_value(row, column) {
            merged.insert(var.clone(), value);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only panic-based assertions are permitted.")]
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use syncengine_core::StoreError;

    use super::*;

    #[derive(Default)]
    struct FakeStateStore {
        rows: Mutex<Vec<StateRow>>,
    }

    impl StateStore for FakeStateStore {
        fn write_state_row(&self, _table: &str, flow: &FlowToken, fields: Value) -> Result<i64, StoreError> {
            let mut rows = self.rows.lock().unwrap_or_else(|poison| poison.into_inner());
            let id = i64::try_from(rows.len()).unwrap_or(i64::MAX);
            rows.push(StateRow { id, flow_token: flow.clone(), fields });
            Ok(id)
        }

        fn read_state_rows(&self, _table: &str) -> Result<Vec<StateRow>, StoreError> {
            Ok(self.rows.lock().unwrap_or_else(|poison| poison.into_inner()).clone())
        }
    }

    fn cart_item(flow: &str, item_id: &str, qty: i64) -> (FlowToken, Value) {
        let mut fields = BTreeMap::new();
        fields.insert("item_id".to_string(), Value::String(item_id.to_string()));
        fields.insert("qty".to_string(), Value::Int(qty));
        (FlowToken::new(flow), Value::Object(fields))
    }

    fn where_clause(filter: Option<&str>) -> WhereClause {
        WhereClause {
            source_table: "CartItem".to_string(),
            filter: filter.map(str::to_string),
            bindings: BTreeMap::from([
                ("item_id".to_string(), "item_id".to_string()),
                ("qty".to_string(), "qty".to_string()),
            ]),
        }
    }

    #[test]
    fn absent_where_clause_returns_when_bindings_unchanged() {
        let store = FakeStateStore::default();
        let when_bindings = BTreeMap::from([("cart_id".to_string(), Value::String("c1".to_string()))]);
        let result =
            execute_where(&store, None, &Scope::flow_default(), &FlowToken::new("f1"), &when_bindings).unwrap();
        assert_eq!(result, vec![when_bindings]);
    }

    #[test]
    fn flow_scope_only_returns_rows_for_the_current_flow() {
        let store = FakeStateStore::default();
        let (flow1, item1) = cart_item("f1", "A", 10);
        let (flow2, item2) = cart_item("f2", "B", 5);
        store.write_state_row("CartItem", &flow1, item1).unwrap();
        store.write_state_row("CartItem", &flow2, item2).unwrap();

        let clause = where_clause(None);
        let result =
            execute_where(&store, Some(&clause), &Scope::flow_default(), &flow1, &BTreeMap::new()).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].get("item_id"), Some(&Value::String("A".to_string())));
    }

    #[test]
    fn global_scope_returns_rows_across_flows() {
        let store = FakeStateStore::default();
        let (flow1, item1) = cart_item("f1", "A", 10);
        let (flow2, item2) = cart_item("f2", "B", 5);
        store.write_state_row("CartItem", &flow1, item1).unwrap();
        store.write_state_row("CartItem", &flow2, item2).unwrap();

        let clause = where_clause(None);
        let scope = Scope { mode: ScopeMode::Global, key: None };
        let result = execute_where(&store, Some(&clause), &scope, &flow1, &BTreeMap::new()).unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn filter_on_bound_reference_narrows_rows() {
        let store = FakeStateStore::default();
        let (flow, item_a) = cart_item("f1", "A", 10);
        let (_flow, item_b) = cart_item("f1", "B", 5);
        store.write_state_row("CartItem", &flow, item_a).unwrap();
        store.write_state_row("CartItem", &flow, item_b).unwrap();

        let clause = where_clause(Some("item_id == bound.target"));
        let when_bindings = BTreeMap::from([("target".to_string(), Value::String("B".to_string()))]);
        let result =
            execute_where(&store, Some(&clause), &Scope::flow_default(), &flow, &when_bindings).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].get("qty"), Some(&Value::Int(5)));
    }

    #[test]
    fn keyed_scope_requires_the_key_in_when_bindings() {
        let store = FakeStateStore::default();
        let clause = where_clause(None);
        let scope = Scope { mode: ScopeMode::Keyed, key: Some("cart_id".to_string()) };
        let err = execute_where(&store, Some(&clause), &scope, &FlowToken::new("f1"), &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::KeyMissing { .. }));
    }
}
