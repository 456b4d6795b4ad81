mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{draft, identity, TestContext};
use iemap_core::stats::StatsEngine;
use iemap_core::store::{DocumentStore, MemoryStore};

fn engine_for(ctx: &TestContext) -> StatsEngine {
    StatsEngine::new(ctx.store.clone() as Arc<dyn DocumentStore>)
}

#[tokio::test]
async fn empty_collection_yields_zeroed_stats() -> Result<()> {
    let store = Arc::new(MemoryStore::new()) as Arc<dyn DocumentStore>;
    let engine = StatsEngine::new(store);

    let global = engine.global_stats().await?;
    assert_eq!(global.total_projects, 0);
    assert_eq!(global.projects_with_files, 0);
    assert!(global.projects_per_affiliation.is_empty());
    assert!(global.projects_per_user.is_empty());
    assert!(global.files_per_affiliation.is_empty());

    let user = engine.user_stats("nobody@enea.it").await?;
    assert_eq!(user.total_projects, 0);
    assert_eq!(user.projects_with_files, 0);
    assert_eq!(user.total_files, 0);

    let materials = engine.formulas_and_elements().await?;
    assert_eq!(materials.n_formulas, 0);
    assert_eq!(materials.n_elements, 0);
    assert!(materials.formulas.is_empty());
    assert!(materials.elements.is_empty());
    Ok(())
}

#[tokio::test]
async fn global_stats_group_by_affiliation_and_user() -> Result<()> {
    let ctx = TestContext::new();
    let ada = identity("ada@enea.it", "enea");
    let bob = identity("bob@cnr.it", "cnr");
    let first = ctx.service.add_project(&ada, draft("salt", "NaCl")).await?;
    ctx.service.add_project(&ada, draft("sugar", "C6H12O6")).await?;
    ctx.service.add_project(&bob, draft("rust", "Fe2O3")).await?;

    ctx.service
        .attach_file(&first, "notes.txt", "text/plain", &b"hello"[..])
        .await?;
    ctx.service
        .attach_file(&first, "table.csv", "text/csv", &b"a,b\n1,2\n"[..])
        .await?;

    let global = engine_for(&ctx).global_stats().await?;
    assert_eq!(global.total_projects, 3);
    assert_eq!(global.projects_with_files, 1);

    let per_affiliation: Vec<(Option<&str>, u64)> = global
        .projects_per_affiliation
        .iter()
        .map(|g| (g.key.as_deref(), g.count))
        .collect();
    assert_eq!(per_affiliation, vec![(Some("cnr"), 1), (Some("enea"), 2)]);

    let per_user: Vec<(Option<&str>, u64)> = global
        .projects_per_user
        .iter()
        .map(|g| (g.key.as_deref(), g.count))
        .collect();
    assert_eq!(
        per_user,
        vec![(Some("ada@enea.it"), 2), (Some("bob@cnr.it"), 1)]
    );

    let files: Vec<(Option<&str>, u64)> = global
        .files_per_affiliation
        .iter()
        .map(|g| (g.key.as_deref(), g.count))
        .collect();
    assert_eq!(files, vec![(Some("enea"), 2)]);
    Ok(())
}

#[tokio::test]
async fn user_stats_scope_to_one_identity() -> Result<()> {
    let ctx = TestContext::new();
    let ada = identity("ada@enea.it", "enea");
    let id = ctx.service.add_project(&ada, draft("salt", "NaCl")).await?;
    ctx.service.add_project(&ada, draft("sugar", "C6H12O6")).await?;
    ctx.service
        .add_project(&identity("bob@cnr.it", "cnr"), draft("rust", "Fe2O3"))
        .await?;
    ctx.service
        .attach_file(&id, "notes.txt", "text/plain", &b"hello"[..])
        .await?;

    let stats = engine_for(&ctx).user_stats("ada@enea.it").await?;
    assert_eq!(stats.total_projects, 2);
    assert_eq!(stats.projects_with_files, 1);
    assert_eq!(stats.total_files, 1);
    Ok(())
}

#[tokio::test]
async fn formulas_and_elements_flatten_and_dedupe() -> Result<()> {
    let ctx = TestContext::new();
    let ada = identity("ada@enea.it", "enea");
    ctx.service.add_project(&ada, draft("sugar", "C6H12O6")).await?;
    // second project sharing the formula must not duplicate it
    ctx.service.add_project(&ada, draft("sugar-bis", "C6H12O6")).await?;
    ctx.service.add_project(&ada, draft("salt", "NaCl")).await?;

    let materials = engine_for(&ctx).formulas_and_elements().await?;
    assert_eq!(materials.formulas, vec!["C6H12O6", "NaCl"]);
    assert_eq!(materials.n_formulas, 2);
    // a flat set, not an array of per-project arrays
    assert_eq!(materials.elements, vec!["C", "Cl", "H", "Na", "O"]);
    assert_eq!(materials.n_elements, 5);
    Ok(())
}
