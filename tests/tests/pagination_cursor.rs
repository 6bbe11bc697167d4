//! Pagination, deduplication, and cursor properties: fixed plans produce a
//! deterministic item order, no primary key is yielded twice across a
//! traversal, and the multiset of items is independent of the page size.

mod common;

use anyhow::Result;
use common::*;
use dynaq::{Count, Cursor, Filter, ReadOptions, TableNames};
use scimq::parse_filter;

fn accounts_capabilities() -> dynaq::QueryCapabilities {
    dynaq::schema::accounts(&TableNames::default(), false)
}

fn roster() -> Vec<Account> {
    vec![
        Account::new("alice", "alice@example.com"),
        Account::new("alan", "alan@example.com"),
        Account::new("albert", "albert@example.com"),
        Account::new("alfred", "alfred@example.com"),
        Account::new("alina", "alina@example.com"),
        Account::new("amy", "amy@example.com"),
        Account::new("bob", "bob@example.com"),
    ]
}

async fn paginate(client: &dynaq::Client<RecordingStore>, filter: &Filter, page_size: u32) -> Result<Vec<String>> {
    let capabilities = accounts_capabilities();
    let mut names = Vec::new();
    let mut cursor: Option<Cursor> = None;
    loop {
        let options = ReadOptions { page_size: Some(page_size), cursor: cursor.take(), ..Default::default() };
        let page = client.fetch(&capabilities, filter, options).await?;
        names.extend(user_names(&page.items));
        match page.cursor {
            Some(next) => cursor = Some(next),
            None => return Ok(names),
        }
    }
}

#[tokio::test]
async fn item_order_is_deterministic_for_a_fixed_plan() -> Result<()> {
    let store = RecordingStore::new();
    seed(&store.inner, &roster()).await;
    let (client, _) = client(store);

    let filter = Filter::sw("userName", "al");
    let first = paginate(&client, &filter, 2).await?;
    let second = paginate(&client, &filter, 2).await?;
    assert_eq!(first, second);
    assert_eq!(first, vec!["alan", "albert", "alfred", "alice", "alina"]);
    Ok(())
}

#[tokio::test]
async fn page_size_does_not_change_the_item_multiset() -> Result<()> {
    let store = RecordingStore::new();
    seed(&store.inner, &roster()).await;
    let (client, _) = client(store);

    let filter = Filter::sw("userName", "al");
    let mut by_twos = paginate(&client, &filter, 2).await?;
    let mut by_fives = paginate(&client, &filter, 5).await?;
    let mut all_at_once = paginate(&client, &filter, 100).await?;
    by_twos.sort();
    by_fives.sort();
    all_at_once.sort();
    assert_eq!(by_twos, by_fives);
    assert_eq!(by_twos, all_at_once);
    Ok(())
}

#[tokio::test]
async fn overlapping_sub_queries_deduplicate_by_primary_key() -> Result<()> {
    let store = RecordingStore::new();
    seed(&store.inner, &roster()).await;
    let (client, store) = client(store);

    // "alice" is reachable through the primary key and through the
    // starts-with listing; it must come back once
    let filter = parse_filter(r#"userName sw "al" or userName eq "alice""#)?;
    let page = client.fetch(&accounts_capabilities(), &filter, ReadOptions::default()).await?;

    let mut names = user_names(&page.items);
    names.sort();
    assert_eq!(names, vec!["alan", "albert", "alfred", "alice", "alina"]);
    assert_eq!(store.recorded_queries().len(), 2);
    Ok(())
}

#[tokio::test]
async fn dedup_holds_across_page_boundaries() -> Result<()> {
    let store = RecordingStore::new();
    seed(&store.inner, &roster()).await;
    let (client, _) = client(store);

    let filter = parse_filter(r#"userName sw "al" or userName eq "alice""#)?;
    let names = paginate(&client, &filter, 2).await?;
    let mut sorted = names.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(names.len(), sorted.len(), "a primary key was yielded twice: {:?}", names);
    Ok(())
}

#[tokio::test]
async fn count_over_overlapping_sub_queries_is_distinct() -> Result<()> {
    let store = RecordingStore::new();
    seed(&store.inner, &roster()).await;
    let (client, _) = client(store);

    let filter = parse_filter(r#"userName sw "al" or userName eq "alice""#)?;
    let count = client.count(&accounts_capabilities(), &filter, ReadOptions::default()).await?;
    assert_eq!(count, Count::Exact(5));
    Ok(())
}

#[tokio::test]
async fn cursors_round_trip_through_the_token_form() -> Result<()> {
    let store = RecordingStore::new();
    seed(&store.inner, &roster()).await;
    let (client, _) = client(store);

    let capabilities = accounts_capabilities();
    let filter = Filter::sw("userName", "al");
    let options = ReadOptions { page_size: Some(2), ..Default::default() };
    let page = client.fetch(&capabilities, &filter, options).await?;
    let cursor = page.cursor.expect("more pages remain");

    let token = cursor.to_token()?;
    let restored = Cursor::from_token(&token)?;
    assert_eq!(restored, cursor);

    let options = ReadOptions { page_size: Some(2), cursor: Some(restored), ..Default::default() };
    let next = client.fetch(&capabilities, &filter, options).await?;
    assert_eq!(user_names(&next.items), vec!["alfred", "alice"]);
    Ok(())
}
