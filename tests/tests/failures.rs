//! Failure paths: retries, deadlines, cancellation, feature gating, and
//! integrity violations.

mod common;

use anyhow::Result;
use common::*;
use dynaq::planner::FeatureId;
use dynaq::{ExecError, Filter, PlanError, ReadOptions, TableNames};
use dynaq::store::Fault;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn accounts_capabilities() -> dynaq::QueryCapabilities {
    dynaq::schema::accounts(&TableNames::default(), false)
}

#[tokio::test]
async fn throttling_is_retried_behind_the_scenes() -> Result<()> {
    let store = RecordingStore::new();
    seed(&store.inner, &[Account::new("alice", "a@example.com")]).await;
    store.inner.inject_fault(Fault::Throttle).await;
    store.inner.inject_fault(Fault::Transient).await;
    let (client, store) = client(store);

    let page = client.fetch(&accounts_capabilities(), &Filter::eq("userName", "alice"), ReadOptions::default()).await?;
    assert_eq!(user_names(&page.items), vec!["alice"]);
    // two failed attempts plus the success all reached the store
    assert_eq!(store.recorded_queries().len(), 3);
    Ok(())
}

#[tokio::test]
async fn persistent_throttling_surfaces_after_retries_run_out() -> Result<()> {
    let store = RecordingStore::new();
    seed(&store.inner, &[Account::new("alice", "a@example.com")]).await;
    for _ in 0..3 {
        store.inner.inject_fault(Fault::Throttle).await;
    }
    let (client, _) = client(store);

    let err = client
        .fetch(&accounts_capabilities(), &Filter::eq("userName", "alice"), ReadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::Throttled));
    Ok(())
}

#[tokio::test]
async fn slow_stores_hit_the_overall_deadline() -> Result<()> {
    let store = RecordingStore::new();
    seed(&store.inner, &[Account::new("alice", "a@example.com")]).await;
    store.inner.inject_fault(Fault::Delay(Duration::from_millis(250))).await;
    let (client, _) = client(store);

    let options = ReadOptions { timeout: Some(Duration::from_millis(25)), ..Default::default() };
    let err = client.fetch(&accounts_capabilities(), &Filter::eq("userName", "alice"), options).await.unwrap_err();
    assert!(matches!(err, ExecError::DeadlineExceeded));
    Ok(())
}

#[tokio::test]
async fn cancellation_abandons_the_call() -> Result<()> {
    let store = RecordingStore::new();
    seed(&store.inner, &[Account::new("alice", "a@example.com")]).await;
    store.inner.inject_fault(Fault::Delay(Duration::from_millis(500))).await;
    let (client, _) = client(store);

    let token = CancellationToken::new();
    let options = ReadOptions { cancel: Some(token.clone()), ..Default::default() };
    let handle = tokio::spawn({
        let token = token.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        }
    });

    let err = client.fetch(&accounts_capabilities(), &Filter::eq("userName", "alice"), options).await.unwrap_err();
    assert!(matches!(err, ExecError::Cancelled));
    handle.await?;
    Ok(())
}

#[tokio::test]
async fn absent_indexes_fail_fast_as_unsupported() -> Result<()> {
    let store = RecordingStore::new();
    seed(&store.inner, &[Account::new("tester", "t@example.com")]).await;

    // a dedicated feature id keeps the process-wide probe cache honest
    let mut capabilities = accounts_capabilities();
    let gate = FeatureId::new("accounts.userNameInitial-userName-index.gated");
    capabilities.secondary[0].required_feature = Some(gate.clone());
    store.inner.disable_feature(gate.as_str()).await;
    let (client, store) = client(store);

    let err = client.get_all_by(&capabilities, "userName", "test", ReadOptions::default()).await.unwrap_err();
    match err {
        ExecError::Unsupported { operation } => assert_eq!(operation, "getAllBy"),
        other => panic!("expected an unsupported-operation rejection, got {:?}", other),
    }
    assert!(store.recorded_queries().is_empty());
    Ok(())
}

#[tokio::test]
async fn duplicate_primary_keys_violate_integrity() -> Result<()> {
    let store = RecordingStore::new();
    let (client, _) = client(store);
    let capabilities = accounts_capabilities();

    let items = Account::new("janedoe", "jane@example.com").items();
    client.put_new(&capabilities, items[0].clone()).await?;
    let err = client.put_new(&capabilities, items[0].clone()).await.unwrap_err();
    match err {
        ExecError::Integrity { attribute } => assert_eq!(attribute, "pk"),
        other => panic!("expected an integrity violation, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn over_complex_filters_are_rejected_before_the_store() -> Result<()> {
    let (client, store) = client(RecordingStore::new());

    let clause = |i: usize| Filter::eq(format!("a{}", i), 1i64).or(Filter::eq(format!("b{}", i), 1i64));
    let mut filter = clause(0);
    for i in 1..7 {
        filter = filter.and(clause(i));
    }
    let err = client.fetch(&accounts_capabilities(), &filter, ReadOptions::default()).await.unwrap_err();
    assert!(matches!(err, ExecError::Plan(PlanError::ExpressionTooComplex(_))));
    assert!(store.recorded_queries().is_empty());
    Ok(())
}

#[tokio::test]
async fn scans_serve_unindexable_filters_when_enabled() -> Result<()> {
    let store = RecordingStore::new();
    seed(&store.inner, &[
        Account::new("janedoe", "jane@example.com").first_name("Jane"),
        Account::new("bob", "bob@example.com").first_name("Robert"),
    ])
    .await;
    let (client, store) = client(store);

    let capabilities = dynaq::schema::accounts(&TableNames::default(), true);
    let page = client.fetch(&capabilities, &Filter::eq("firstName", "Jane"), ReadOptions::default()).await?;

    assert!(!page.items.is_empty());
    assert!(user_names(&page.items).iter().all(|name| name == "janedoe"));
    assert_eq!(store.recorded_scans().len(), 1);
    assert_eq!(store.recorded_scans()[0].filter_expression, "#firstName = :firstName_1");
    Ok(())
}
