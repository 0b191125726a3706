use super::SCHEMA_VERSION;
use crate::errors::{GrapheneError, Result};
use serde_json::{json, Map, Value};

/// Schema version recorded in a raw document; documents without one are version 0
pub fn document_version(value: &Value) -> Result<u32> {
    match value.get("schema_version") {
        None => Ok(0),
        Some(v) => v
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| GrapheneError::store(format!("Invalid schema_version: {v}"))),
    }
}

/// Upgrade `value` from version `from` to `SCHEMA_VERSION`, returning the number of steps run
pub fn apply(value: &mut Value, from: u32) -> Result<u32> {
    let mut applied = 0;

    for version in (from + 1)..=SCHEMA_VERSION {
        match version {
            1 => create_tables(value)?,
            2 => order_branches_by_list(value)?,
            other => {
                return Err(GrapheneError::store(format!(
                    "No migration defined for schema version {other}"
                )))
            }
        }
        value["schema_version"] = json!(version);
        applied += 1;
        tracing::debug!("Applied store migration {}", version);
    }

    Ok(applied)
}

fn root(value: &mut Value) -> Result<&mut Map<String, Value>> {
    value
        .as_object_mut()
        .ok_or_else(|| GrapheneError::store("Store document is not a JSON object"))
}

/// v1: the four tables
fn create_tables(value: &mut Value) -> Result<()> {
    let root = root(value)?;
    for table in ["repositories", "stacks", "branches"] {
        root.entry(table).or_insert_with(|| json!({}));
    }
    root.entry("commits").or_insert_with(|| json!([]));
    Ok(())
}

/// v2: replace per-branch `position`/`parent_id` columns with an ordered `branch_ids` list per stack
fn order_branches_by_list(value: &mut Value) -> Result<()> {
    let root = root(value)?;

    let mut branches = match root.remove("branches") {
        Some(Value::Object(map)) => map,
        Some(_) => return Err(GrapheneError::store("'branches' table is not an object")),
        None => Map::new(),
    };

    let stack_ids: Vec<String> = match root.get("stacks") {
        Some(Value::Object(stacks)) => stacks.keys().cloned().collect(),
        Some(_) => return Err(GrapheneError::store("'stacks' table is not an object")),
        None => Vec::new(),
    };

    let mut ordered: Vec<(String, Vec<String>)> = Vec::new();
    for stack_id in &stack_ids {
        let mut members: Vec<(u64, String, String)> = branches
            .iter()
            .filter(|(_, b)| b.get("stack_id").and_then(Value::as_str) == Some(stack_id))
            .map(|(id, b)| {
                let position = b.get("position").and_then(Value::as_u64).unwrap_or(u64::MAX);
                let created = b
                    .get("created_at")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                (position, created, id.clone())
            })
            .collect();
        members.sort();
        ordered.push((
            stack_id.clone(),
            members.into_iter().map(|(_, _, id)| id).collect(),
        ));
    }

    let kept: std::collections::HashSet<String> = ordered
        .iter()
        .flat_map(|(_, ids)| ids.iter().cloned())
        .collect();
    branches.retain(|id, b| {
        let keep = kept.contains(id);
        if !keep {
            let name = b.get("name").and_then(|n| n.as_str()).unwrap_or(id);
            tracing::warn!("Dropping branch {} with no stack during migration", name);
        }
        keep
    });
    for branch in branches.values_mut() {
        if let Some(fields) = branch.as_object_mut() {
            fields.remove("position");
            fields.remove("parent_id");
        }
    }

    if let Some(Value::Object(stacks)) = root.get_mut("stacks") {
        for (stack_id, ids) in ordered {
            if let Some(stack) = stacks.get_mut(&stack_id).and_then(Value::as_object_mut) {
                stack.insert("branch_ids".to_string(), json!(ids));
            }
        }
    }

    if let Some(Value::Array(commits)) = root.get_mut("commits") {
        commits.retain(|c| {
            c.get("branch_id")
                .and_then(Value::as_str)
                .is_some_and(|id| branches.contains_key(id))
        });
    }

    root.insert("branches".to_string(), Value::Object(branches));
    Ok(())
}
