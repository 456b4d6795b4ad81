//! In-memory document store backend.
//!
//! Evaluates the query-operator and pipeline-stage subset the rest of the
//! crate emits, with MongoDB matching semantics (array fields match when any
//! element satisfies a positive operator, negated operators require no
//! element to match). Used by the test suites and for running the core
//! without a database instance.

use std::cmp::Ordering;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DocumentStore, FindOptions, SortKey, StoreError, UpdateReport};

#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<Vec<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_one(&self, mut document: Value) -> Result<String, StoreError> {
        let map = document
            .as_object_mut()
            .ok_or_else(|| StoreError::MalformedDocument("document must be an object".into()))?;
        let id = match map.get("_id").and_then(Value::as_str).map(str::to_string) {
            Some(id) => id,
            None => {
                // v7 ids are time-ordered, so "id descending" means newest first
                let id = Uuid::now_v7().simple().to_string();
                map.insert("_id".to_string(), Value::String(id.clone()));
                id
            }
        };
        self.docs.write().await.push(document);
        Ok(id)
    }

    async fn find(&self, filter: &Value, options: FindOptions) -> Result<Vec<Value>, StoreError> {
        let docs = self.docs.read().await;
        let mut hits = Vec::new();
        for doc in docs.iter() {
            if matches_filter(doc, filter)? {
                hits.push(doc.clone());
            }
        }
        drop(docs);

        if !options.sort.is_empty() {
            hits.sort_by(|a, b| compare_by_keys(a, b, &options.sort));
        }
        let skip = options.skip.unwrap_or(0) as usize;
        let mut hits: Vec<Value> = hits.into_iter().skip(skip).collect();
        if let Some(limit) = options.limit {
            hits.truncate(limit);
        }
        if let Some(fields) = &options.projection {
            hits = hits.iter().map(|d| project_fields(d, fields)).collect();
        }
        Ok(hits)
    }

    async fn find_one(&self, filter: &Value) -> Result<Option<Value>, StoreError> {
        let docs = self.docs.read().await;
        for doc in docs.iter() {
            if matches_filter(doc, filter)? {
                return Ok(Some(doc.clone()));
            }
        }
        Ok(None)
    }

    async fn update_one(
        &self,
        filter: &Value,
        update: &Value,
    ) -> Result<UpdateReport, StoreError> {
        let mut docs = self.docs.write().await;
        for doc in docs.iter_mut() {
            if matches_filter(doc, filter)? {
                let before = doc.clone();
                apply_update(doc, update)?;
                let modified = u64::from(*doc != before);
                return Ok(UpdateReport {
                    matched: 1,
                    modified,
                });
            }
        }
        Ok(UpdateReport::default())
    }

    async fn count(&self, filter: &Value) -> Result<u64, StoreError> {
        let docs = self.docs.read().await;
        let mut n = 0;
        for doc in docs.iter() {
            if matches_filter(doc, filter)? {
                n += 1;
            }
        }
        Ok(n)
    }

    async fn aggregate(&self, pipeline: &[Value]) -> Result<Vec<Value>, StoreError> {
        let input = self.docs.read().await.clone();
        run_pipeline(input, pipeline)
    }
}

// ---- filter evaluation ----

fn matches_filter(doc: &Value, filter: &Value) -> Result<bool, StoreError> {
    let obj = filter
        .as_object()
        .ok_or_else(|| StoreError::MalformedDocument("filter must be an object".into()))?;
    for (key, cond) in obj {
        let hit = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in expect_array(cond, "$and")? {
                    if !matches_filter(doc, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for sub in expect_array(cond, "$or")? {
                    if matches_filter(doc, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            _ => field_matches(doc, key, cond)?,
        };
        if !hit {
            return Ok(false);
        }
    }
    Ok(true)
}

fn field_matches(doc: &Value, path: &str, cond: &Value) -> Result<bool, StoreError> {
    let leaves = path_values(doc, path);
    if let Some(ops) = operator_object(cond) {
        for (op, arg) in ops {
            if !apply_operator(op, arg, &leaves)? {
                return Ok(false);
            }
        }
        Ok(true)
    } else {
        Ok(candidates(&leaves).any(|v| value_eq(v, cond)))
    }
}

/// A condition object whose keys all start with `$` is an operator set;
/// anything else is an implicit equality match (possibly against a nested
/// document literal).
fn operator_object(cond: &Value) -> Option<&Map<String, Value>> {
    let obj = cond.as_object()?;
    if !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')) {
        Some(obj)
    } else {
        None
    }
}

fn apply_operator(op: &str, arg: &Value, leaves: &[&Value]) -> Result<bool, StoreError> {
    match op {
        "$eq" => Ok(candidates(leaves).any(|v| value_eq(v, arg))),
        "$ne" => Ok(!candidates(leaves).any(|v| value_eq(v, arg))),
        "$gt" => Ok(ordered_match(leaves, arg, |o| o == Ordering::Greater)),
        "$gte" => Ok(ordered_match(leaves, arg, |o| o != Ordering::Less)),
        "$lt" => Ok(ordered_match(leaves, arg, |o| o == Ordering::Less)),
        "$lte" => Ok(ordered_match(leaves, arg, |o| o != Ordering::Greater)),
        "$in" => {
            let wanted = expect_array(arg, "$in")?;
            Ok(candidates(leaves).any(|v| wanted.iter().any(|w| value_eq(v, w))))
        }
        "$nin" => {
            let unwanted = expect_array(arg, "$nin")?;
            Ok(!candidates(leaves).any(|v| unwanted.iter().any(|w| value_eq(v, w))))
        }
        "$all" => {
            let wanted = expect_array(arg, "$all")?;
            Ok(wanted
                .iter()
                .all(|w| candidates(leaves).any(|v| value_eq(v, w))))
        }
        "$regex" => {
            let pattern = arg.as_str().ok_or_else(|| {
                StoreError::MalformedDocument("$regex requires a string".into())
            })?;
            let re = Regex::new(pattern)
                .map_err(|e| StoreError::MalformedDocument(format!("bad $regex: {e}")))?;
            Ok(candidates(leaves).any(|v| v.as_str().is_some_and(|s| re.is_match(s))))
        }
        "$exists" => {
            let wanted = arg.as_bool().ok_or_else(|| {
                StoreError::MalformedDocument("$exists requires a boolean".into())
            })?;
            Ok(!leaves.is_empty() == wanted)
        }
        "$elemMatch" => {
            let sub = arg.as_object().ok_or_else(|| {
                StoreError::MalformedDocument("$elemMatch requires an object".into())
            })?;
            for leaf in leaves {
                if let Value::Array(items) = leaf {
                    for item in items {
                        if elem_matches(item, sub)? {
                            return Ok(true);
                        }
                    }
                }
            }
            Ok(false)
        }
        other => Err(StoreError::UnsupportedOperator(other.to_string())),
    }
}

fn elem_matches(item: &Value, sub: &Map<String, Value>) -> Result<bool, StoreError> {
    for (key, cond) in sub {
        if !field_matches(item, key, cond)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn ordered_match(leaves: &[&Value], arg: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    candidates(leaves).any(|v| compare_values(v, arg).is_some_and(&accept))
}

/// Resolve a dotted path, descending through nested arrays the way MongoDB
/// does. Numeric segments index into arrays.
fn path_values<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![doc];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => {
                    if let Some(v) = map.get(segment) {
                        next.push(v);
                    }
                }
                Value::Array(items) => {
                    if let Ok(index) = segment.parse::<usize>() {
                        if let Some(v) = items.get(index) {
                            next.push(v);
                        }
                    } else {
                        for item in items {
                            if let Some(v) = item.as_object().and_then(|m| m.get(segment)) {
                                next.push(v);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
        if current.is_empty() {
            break;
        }
    }
    current
}

/// Leaves plus the elements of array leaves, the value set positive
/// operators match against.
fn candidates<'a>(leaves: &'a [&'a Value]) -> impl Iterator<Item = &'a Value> {
    leaves.iter().copied().flat_map(|v| match v {
        Value::Array(items) => {
            let mut vs: Vec<&Value> = items.iter().collect();
            vs.push(v);
            vs
        }
        _ => vec![v],
    })
}

/// Equality with numeric type erasure: 1 and 1.0 compare equal.
fn value_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
        return Some(x.cmp(y));
    }
    None
}

// ---- sorting ----

fn compare_by_keys(a: &Value, b: &Value, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let av = path_values(a, &key.field).first().copied().unwrap_or(&Value::Null);
        let bv = path_values(b, &key.field).first().copied().unwrap_or(&Value::Null);
        let ord = total_compare(av, bv);
        let ord = if key.ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

fn total_compare(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a
            .as_f64()
            .unwrap_or(f64::NAN)
            .total_cmp(&b.as_f64().unwrap_or(f64::NAN)),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        _ => a.to_string().cmp(&b.to_string()),
    }
}

// ---- projection ----

fn project_fields(doc: &Value, fields: &[String]) -> Value {
    let mut out = Value::Object(Map::new());
    if let Some(id) = doc.get("_id") {
        set_path(&mut out, "_id", id.clone());
    }
    for field in fields {
        if let Some(v) = path_values(doc, field).first() {
            set_path(&mut out, field, (*v).clone());
        }
    }
    out
}

// ---- updates ----

fn apply_update(doc: &mut Value, update: &Value) -> Result<(), StoreError> {
    let ops = update
        .as_object()
        .ok_or_else(|| StoreError::MalformedDocument("update must be an object".into()))?;
    for (op, spec) in ops {
        let spec = spec.as_object().ok_or_else(|| {
            StoreError::MalformedDocument(format!("{op} requires an object"))
        })?;
        match op.as_str() {
            "$set" => {
                for (path, value) in spec {
                    set_path(doc, path, value.clone());
                }
            }
            "$push" => {
                for (path, value) in spec {
                    let items = array_at_path(doc, path)?;
                    items.push(value.clone());
                }
            }
            "$addToSet" => {
                for (path, value) in spec {
                    let items = array_at_path(doc, path)?;
                    if !items.iter().any(|v| value_eq(v, value)) {
                        items.push(value.clone());
                    }
                }
            }
            other => return Err(StoreError::UnsupportedOperator(other.to_string())),
        }
    }
    Ok(())
}

fn set_path(doc: &mut Value, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            if let Value::Object(map) = doc {
                map.insert(path.to_string(), value);
            }
        }
        Some((head, rest)) => {
            if let Value::Object(map) = doc {
                let entry = map
                    .entry(head.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !entry.is_object() {
                    *entry = Value::Object(Map::new());
                }
                set_path(entry, rest, value);
            }
        }
    }
}

fn array_at_path<'a>(doc: &'a mut Value, path: &str) -> Result<&'a mut Vec<Value>, StoreError> {
    match path.split_once('.') {
        None => {
            let map = doc.as_object_mut().ok_or_else(|| {
                StoreError::MalformedDocument(format!("cannot push into {path}"))
            })?;
            let entry = map
                .entry(path.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            entry.as_array_mut().ok_or_else(|| {
                StoreError::MalformedDocument(format!("{path} is not an array"))
            })
        }
        Some((head, rest)) => {
            let map = doc.as_object_mut().ok_or_else(|| {
                StoreError::MalformedDocument(format!("cannot push into {path}"))
            })?;
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            array_at_path(entry, rest)
        }
    }
}

// ---- aggregation ----

fn run_pipeline(input: Vec<Value>, pipeline: &[Value]) -> Result<Vec<Value>, StoreError> {
    let mut docs = input;
    for stage in pipeline {
        let obj = stage
            .as_object()
            .ok_or_else(|| StoreError::MalformedDocument("stage must be an object".into()))?;
        let (name, spec) = obj
            .iter()
            .next()
            .ok_or_else(|| StoreError::MalformedDocument("empty pipeline stage".into()))?;
        docs = match name.as_str() {
            "$match" => {
                let mut kept = Vec::new();
                for doc in docs {
                    if matches_filter(&doc, spec)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$unwind" => stage_unwind(docs, spec)?,
            "$group" => stage_group(docs, spec)?,
            "$count" => {
                let field = spec.as_str().ok_or_else(|| {
                    StoreError::MalformedDocument("$count requires a string".into())
                })?;
                if docs.is_empty() {
                    Vec::new()
                } else {
                    vec![json!({ field: docs.len() })]
                }
            }
            "$facet" => stage_facet(docs, spec)?,
            "$replaceRoot" => stage_replace_root(docs, spec)?,
            other => return Err(StoreError::UnsupportedOperator(other.to_string())),
        };
    }
    Ok(docs)
}

fn stage_unwind(docs: Vec<Value>, spec: &Value) -> Result<Vec<Value>, StoreError> {
    let path = match spec {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("path").and_then(Value::as_str).ok_or_else(|| {
            StoreError::MalformedDocument("$unwind requires a path".into())
        })?,
        _ => return Err(StoreError::MalformedDocument("$unwind requires a path".into())),
    };
    let path = path.trim_start_matches('$');
    let mut out = Vec::new();
    for doc in docs {
        let leaf = path_values(&doc, path).first().copied().cloned();
        let Some(Value::Array(items)) = leaf else {
            continue;
        };
        for item in items {
            let mut unwound = doc.clone();
            set_path(&mut unwound, path, item);
            out.push(unwound);
        }
    }
    Ok(out)
}

fn eval_expr(doc: &Value, expr: &Value) -> Value {
    if let Some(s) = expr.as_str() {
        if let Some(path) = s.strip_prefix('$') {
            return path_values(doc, path).first().copied().cloned().unwrap_or(Value::Null);
        }
    }
    expr.clone()
}

fn stage_group(docs: Vec<Value>, spec: &Value) -> Result<Vec<Value>, StoreError> {
    let spec = spec
        .as_object()
        .ok_or_else(|| StoreError::MalformedDocument("$group requires an object".into()))?;
    let id_expr = spec
        .get("_id")
        .ok_or_else(|| StoreError::MalformedDocument("$group requires _id".into()))?;

    // groups keep first-seen order; keyed by the serialized group id
    let mut groups: Vec<(String, Value, Map<String, Value>)> = Vec::new();
    for doc in &docs {
        let key = eval_expr(doc, id_expr);
        let key_ser = key.to_string();
        let index = match groups.iter().position(|(k, _, _)| *k == key_ser) {
            Some(i) => i,
            None => {
                groups.push((key_ser, key, Map::new()));
                groups.len() - 1
            }
        };
        let accumulators = &mut groups[index].2;
        for (field, acc) in spec.iter().filter(|(k, _)| *k != "_id") {
            let acc = acc.as_object().and_then(|m| m.iter().next()).ok_or_else(|| {
                StoreError::MalformedDocument(format!("bad accumulator for {field}"))
            })?;
            match acc.0.as_str() {
                "$sum" => {
                    let increment = match acc.1 {
                        Value::Number(n) => n.as_f64().unwrap_or(0.0),
                        other => eval_expr(doc, other).as_f64().unwrap_or(0.0),
                    };
                    let current = accumulators
                        .get(field)
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0);
                    accumulators.insert(field.clone(), json!(current + increment));
                }
                "$addToSet" => {
                    let value = eval_expr(doc, acc.1);
                    let entry = accumulators
                        .entry(field.clone())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let Value::Array(items) = entry {
                        if !items.iter().any(|v| value_eq(v, &value)) {
                            items.push(value);
                        }
                    }
                }
                other => return Err(StoreError::UnsupportedOperator(other.to_string())),
            }
        }
    }

    Ok(groups
        .into_iter()
        .map(|(_, key, mut fields)| {
            fields.insert("_id".to_string(), key);
            Value::Object(fields)
        })
        .collect())
}

fn stage_facet(docs: Vec<Value>, spec: &Value) -> Result<Vec<Value>, StoreError> {
    let spec = spec
        .as_object()
        .ok_or_else(|| StoreError::MalformedDocument("$facet requires an object".into()))?;
    let mut out = Map::new();
    for (name, sub) in spec {
        let sub = expect_array(sub, "$facet branch")?;
        let results = run_pipeline(docs.clone(), sub)?;
        out.insert(name.clone(), Value::Array(results));
    }
    // $facet always emits exactly one document, even over an empty input
    Ok(vec![Value::Object(out)])
}

fn stage_replace_root(docs: Vec<Value>, spec: &Value) -> Result<Vec<Value>, StoreError> {
    let new_root = spec
        .as_object()
        .and_then(|m| m.get("newRoot"))
        .ok_or_else(|| StoreError::MalformedDocument("$replaceRoot requires newRoot".into()))?;
    let mut out = Vec::new();
    for doc in docs {
        let root = eval_root(&doc, new_root)?;
        out.push(root);
    }
    Ok(out)
}

fn eval_root(doc: &Value, expr: &Value) -> Result<Value, StoreError> {
    if let Some(ops) = expr.as_object() {
        if let Some(parts) = ops.get("$mergeObjects") {
            let parts = expect_array(parts, "$mergeObjects")?;
            let mut merged = Map::new();
            for part in parts {
                if let Value::Object(map) = eval_expr(doc, part) {
                    merged.extend(map);
                }
            }
            return Ok(Value::Object(merged));
        }
    }
    match eval_expr(doc, expr) {
        Value::Object(map) => Ok(Value::Object(map)),
        other => Err(StoreError::MalformedDocument(format!(
            "newRoot must resolve to an object, got {other}"
        ))),
    }
}

fn expect_array<'a>(value: &'a Value, what: &str) -> Result<&'a Vec<Value>, StoreError> {
    value
        .as_array()
        .ok_or_else(|| StoreError::MalformedDocument(format!("{what} requires an array")))
}
