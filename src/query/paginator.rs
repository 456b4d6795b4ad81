use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use super::cursor::PageCursor;
use super::error::QueryError;
use super::types::{SortDirection, SortSpec};
use crate::error::CoreResult;
use crate::store::{DocumentStore, FindOptions, StoreError};

/// One page of a sorted traversal.
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<Value>,
    /// Resume token for the next page; `None` signals end of traversal.
    pub next_cursor: Option<String>,
    /// Total matching documents, counted without the cursor clause.
    /// Best-effort: may be stale by the time the page is fetched.
    pub number_docs: u64,
    pub page_tot: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub cursor: Option<String>,
    /// Offset applied to the first page only; ignored once a cursor is
    /// present.
    pub skip: Option<u64>,
    pub size: usize,
    /// Field paths to project. The sort field and `_id` are always kept so
    /// the next cursor can be derived from the last item.
    pub projection: Option<Vec<String>>,
}

/// Cursor-based pagination over a [`DocumentStore`].
///
/// Repeatedly chaining `next_cursor` visits every matching document exactly
/// once, in sort order, even as documents are inserted or deleted during the
/// traversal (forward-only consistency, not snapshot isolation).
pub struct Paginator {
    store: Arc<dyn DocumentStore>,
}

impl Paginator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn page(
        &self,
        filter: &Value,
        sort: &SortSpec,
        request: PageRequest,
    ) -> CoreResult<Page> {
        if request.size == 0 {
            return Err(QueryError::InvalidPageSize("page size must be positive".into()).into());
        }

        let (effective, skip) = match &request.cursor {
            Some(token) => {
                let cursor = PageCursor::decode(token)?;
                (combine(filter, &resume_clause(&cursor, sort)), None)
            }
            None => (filter.clone(), request.skip),
        };
        debug!(filter = %effective, "paging projects");

        let mut projection = request.projection;
        if let Some(fields) = &mut projection {
            if sort.field != "_id" && !fields.contains(&sort.field) {
                fields.push(sort.field.clone());
            }
        }

        let items = self
            .store
            .find(
                &effective,
                FindOptions {
                    projection,
                    sort: sort.sort_keys(),
                    skip,
                    limit: Some(request.size),
                },
            )
            .await?;

        let next_cursor = match items.last() {
            Some(last) => Some(cursor_from_item(last, sort)?.encode()),
            None => None,
        };

        let number_docs = self.store.count(filter).await?;
        let page_tot = number_docs.div_ceil(request.size as u64);

        Ok(Page {
            items,
            next_cursor,
            number_docs,
            page_tot,
        })
    }
}

/// Filter continuing a traversal strictly beyond the cursor position.
///
/// The sort field alone is not unique, so the clause is a two-branch
/// disjunction with the id as tie-breaker. Sorting on the id itself needs
/// only the single strict comparison.
fn resume_clause(cursor: &PageCursor, sort: &SortSpec) -> Value {
    let beyond = match sort.direction {
        SortDirection::Asc => "$gt",
        SortDirection::Desc => "$lt",
    };
    let field = sort.field.as_str();
    if field == "_id" {
        json!({ "_id": { beyond: cursor.last_id } })
    } else {
        json!({
            "$or": [
                { field: { beyond: cursor.last_sort_value.clone() } },
                { "$and": [
                    { field: cursor.last_sort_value.clone() },
                    { "_id": { beyond: cursor.last_id } }
                ] }
            ]
        })
    }
}

/// Conjoin the caller filter with the resume clause. The two documents are
/// wrapped under `$and`, never merged: flattening would loosen a caller
/// filter that already carries a top-level disjunction.
fn combine(filter: &Value, resume: &Value) -> Value {
    if filter.as_object().is_some_and(|m| m.is_empty()) {
        resume.clone()
    } else {
        json!({ "$and": [filter.clone(), resume.clone()] })
    }
}

fn cursor_from_item(item: &Value, sort: &SortSpec) -> Result<PageCursor, StoreError> {
    let last_id = item
        .get("_id")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::MalformedDocument("document without string _id".into()))?
        .to_string();
    let last_sort_value = lookup(item, &sort.field).cloned().unwrap_or(Value::Null);
    Ok(PageCursor {
        last_id,
        last_sort_value,
    })
}

/// Dotted-path getter over nested objects.
fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |v, seg| v.get(seg))
}
