use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use iemap_core::query::{PageRequest, Paginator, QueryError, SortSpec};
use iemap_core::store::{DocumentStore, MemoryStore};
use iemap_core::CoreError;
use serde_json::json;

const PAGE: usize = 5;

async fn seeded(n: usize) -> (Arc<MemoryStore>, Vec<String>) {
    let store = Arc::new(MemoryStore::new());
    let mut ids = Vec::new();
    for i in 0..n {
        let id = store
            .insert_one(json!({ "tag": "seeded", "rank": i as u64 }))
            .await
            .unwrap();
        ids.push(id);
    }
    // distractor that must never show up
    store
        .insert_one(json!({ "tag": "other", "rank": 0 }))
        .await
        .unwrap();
    (store, ids)
}

async fn drain(
    paginator: &Paginator,
    filter: &serde_json::Value,
    sort: &SortSpec,
) -> Result<Vec<String>> {
    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = paginator
            .page(
                filter,
                sort,
                PageRequest {
                    cursor: cursor.take(),
                    size: PAGE,
                    ..Default::default()
                },
            )
            .await?;
        for item in &page.items {
            seen.push(item["_id"].as_str().unwrap().to_string());
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => return Ok(seen),
        }
    }
}

#[tokio::test]
async fn traversal_is_complete_and_duplicate_free() -> Result<()> {
    for n in [0, 1, PAGE, PAGE + 1, 3 * PAGE] {
        let (store, ids) = seeded(n).await;
        let paginator = Paginator::new(store);
        let visited = drain(&paginator, &json!({ "tag": "seeded" }), &SortSpec::by_id_desc())
            .await?;

        assert_eq!(visited.len(), n, "expected {n} items");
        let unique: HashSet<&String> = visited.iter().collect();
        assert_eq!(unique.len(), n, "duplicates in traversal of {n}");
        let expected: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique, expected, "wrong item set for {n}");
        // id descending means every step moves strictly down
        for pair in visited.windows(2) {
            assert!(pair[0] > pair[1], "order violated: {pair:?}");
        }
    }
    Ok(())
}

#[tokio::test]
async fn tie_break_visits_equal_sort_values_once() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let mut ids = HashSet::new();
    // three sort-field values shared by four documents each
    for i in 0..12 {
        let id = store
            .insert_one(json!({ "group": (i % 3).to_string() }))
            .await
            .unwrap();
        ids.insert(id);
    }
    let paginator = Paginator::new(store);
    let sort = SortSpec::parse("group asc")?;
    let visited = drain(&paginator, &json!({}), &sort).await?;
    assert_eq!(visited.len(), 12);
    assert_eq!(visited.iter().cloned().collect::<HashSet<_>>(), ids);
    Ok(())
}

#[tokio::test]
async fn inserts_beyond_the_cursor_surface_in_later_pages() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    for i in 0..PAGE {
        store.insert_one(json!({ "rank": i as u64 })).await.unwrap();
    }
    let paginator = Paginator::new(store.clone());
    let sort = SortSpec::parse("rank asc")?;

    let first = paginator
        .page(
            &json!({}),
            &sort,
            PageRequest {
                size: PAGE,
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(first.items.len(), PAGE);

    // lands beyond the cursor, must appear later
    let late = store.insert_one(json!({ "rank": 100 })).await.unwrap();
    // sorts before the cursor, must not reappear
    store.insert_one(json!({ "rank": 0 })).await.unwrap();

    let second = paginator
        .page(
            &json!({}),
            &sort,
            PageRequest {
                cursor: first.next_cursor,
                size: PAGE,
                ..Default::default()
            },
        )
        .await?;
    let ids: Vec<_> = second
        .items
        .iter()
        .map(|i| i["_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec![late]);
    Ok(())
}

#[tokio::test]
async fn counts_are_reported_for_the_base_filter() -> Result<()> {
    let (store, _) = seeded(2 * PAGE + 1).await;
    let paginator = Paginator::new(store);
    let page = paginator
        .page(
            &json!({ "tag": "seeded" }),
            &SortSpec::by_id_desc(),
            PageRequest {
                size: PAGE,
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(page.number_docs, (2 * PAGE + 1) as u64);
    assert_eq!(page.page_tot, 3);
    Ok(())
}

#[tokio::test]
async fn skip_applies_to_the_first_page_only() -> Result<()> {
    let (store, _) = seeded(2 * PAGE).await;
    let paginator = Paginator::new(store);
    let filter = json!({ "tag": "seeded" });
    let sort = SortSpec::parse("rank asc")?;
    let page = paginator
        .page(
            &filter,
            &sort,
            PageRequest {
                skip: Some(3),
                size: PAGE,
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(page.items[0]["rank"], json!(3));
    Ok(())
}

#[tokio::test]
async fn tampered_cursor_is_rejected() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let paginator = Paginator::new(store);
    let err = paginator
        .page(
            &json!({}),
            &SortSpec::by_id_desc(),
            PageRequest {
                cursor: Some("!!not-base64!!".to_string()),
                size: PAGE,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Query(QueryError::InvalidCursor)
    ));
}
