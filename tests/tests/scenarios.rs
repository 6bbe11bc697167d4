//! End-to-end scenarios over the accounts table: the filter goes in at the
//! client, the wire requests are asserted exactly, and the items come back
//! from the in-memory store.

mod common;

use anyhow::Result;
use common::*;
use dynaq::store::Select;
use dynaq::{AttributeValue, Count, ExecError, Filter, PlanError, ReadOptions, TableNames};
use scimq::parse_filter;

fn accounts_capabilities() -> dynaq::QueryCapabilities {
    dynaq::schema::accounts(&TableNames::default(), false)
}

#[tokio::test]
async fn and_of_username_and_email_is_one_primary_query() -> Result<()> {
    let store = RecordingStore::new();
    seed(&store.inner, &[Account::new("janedoe", "jane.doe@example.com"), Account::new("other", "o@example.com")]).await;
    let (client, store) = client(store);

    let filter = Filter::eq("userName", "janedoe").and(Filter::eq("email", "jane.doe@example.com"));
    let page = client.fetch(&accounts_capabilities(), &filter, ReadOptions::default()).await?;

    assert_eq!(user_names(&page.items), vec!["janedoe"]);
    assert!(page.cursor.is_none());

    let requests = store.recorded_queries();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.table_name, "accounts");
    assert_eq!(request.index_name, None);
    assert_eq!(request.key_condition_expression, "#pk = :pk_1");
    assert_eq!(request.filter_expression, "#email = :email_1");
    assert_eq!(request.expression_attribute_values.get(":pk_1"), Some(&AttributeValue::s("un#janedoe")));
    assert_eq!(request.expression_attribute_values.get(":email_1"), Some(&AttributeValue::s("jane.doe@example.com")));
    Ok(())
}

#[tokio::test]
async fn or_of_username_and_email_is_two_primary_queries() -> Result<()> {
    let store = RecordingStore::new();
    seed(&store.inner, &[Account::new("janedoe", "jane.doe@example.com")]).await;
    let (client, store) = client(store);

    let filter = parse_filter(r#"userName eq "janedoe" or email eq "jane.doe@example.com""#)?;
    let page = client.fetch(&accounts_capabilities(), &filter, ReadOptions::default()).await?;

    // the write fan-out stores one item per lookup dimension; both come back
    assert_eq!(page.items.len(), 2);
    assert!(user_names(&page.items).iter().all(|name| name == "janedoe"));

    let requests = store.recorded_queries();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        assert_eq!(request.index_name, None);
        assert_eq!(request.key_condition_expression, "#pk = :pk_1");
        assert_eq!(request.filter_expression, "");
    }
    assert_eq!(requests[0].expression_attribute_values.get(":pk_1"), Some(&AttributeValue::s("em#jane.doe@example.com")));
    assert_eq!(requests[1].expression_attribute_values.get(":pk_1"), Some(&AttributeValue::s("un#janedoe")));
    Ok(())
}

#[tokio::test]
async fn get_all_by_starts_with_uses_the_initial_index() -> Result<()> {
    let store = RecordingStore::new();
    seed(&store.inner, &[
        Account::new("tester", "t1@example.com"),
        Account::new("testing", "t2@example.com"),
        Account::new("tom", "t3@example.com"),
    ])
    .await;
    let (client, store) = client(store);

    let page = client.get_all_by(&accounts_capabilities(), "userName", "test", ReadOptions::default()).await?;
    assert_eq!(user_names(&page.items), vec!["tester", "testing"]);

    let requests = store.recorded_queries();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.index_name.as_deref(), Some("userNameInitial-userName-index"));
    assert_eq!(
        request.key_condition_expression,
        "#userNameInitial = :userNameInitial_1 AND begins_with(#userName, :userName_1)"
    );
    assert_eq!(request.expression_attribute_values.get(":userNameInitial_1"), Some(&AttributeValue::s("t")));
    assert_eq!(request.expression_attribute_values.get(":userName_1"), Some(&AttributeValue::s("test")));
    assert_eq!(request.limit, Some(50));
    Ok(())
}

#[tokio::test]
async fn complex_dnf_binds_both_products_with_negated_residuals() -> Result<()> {
    let store = RecordingStore::new();
    seed(&store.inner, &[
        Account::new("alice", "alice@gmail.com"),
        Account::new("expired", "e@example.com").status("expired"),
    ])
    .await;
    let (client, store) = client(store);

    let filter = parse_filter(
        r#"(email eq "alice@gmail.com" or userName eq "alice") and not (status eq "expired" or status eq "revoked")"#,
    )?;
    let page = client.fetch(&accounts_capabilities(), &filter, ReadOptions::default()).await?;

    // alice is reachable both ways; two distinct stored items come back
    assert_eq!(page.items.len(), 2);
    assert!(user_names(&page.items).iter().all(|name| name == "alice"));

    let requests = store.recorded_queries();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        assert_eq!(request.index_name, None);
        assert_eq!(request.filter_expression, "#status <> :status_1 AND #status <> :status_2");
        assert_eq!(request.expression_attribute_values.get(":status_1"), Some(&AttributeValue::s("expired")));
        assert_eq!(request.expression_attribute_values.get(":status_2"), Some(&AttributeValue::s("revoked")));
    }
    Ok(())
}

#[tokio::test]
async fn unindexable_attribute_is_rejected_without_scans() -> Result<()> {
    let (client, store) = client(RecordingStore::new());

    let err = client
        .fetch(&accounts_capabilities(), &Filter::eq("firstName", "Jane"), ReadOptions::default())
        .await
        .unwrap_err();
    match err {
        ExecError::Plan(PlanError::UnindexableTerm { attribute }) => assert_eq!(attribute, "firstName"),
        other => panic!("expected a rejection, got {:?}", other),
    }
    assert!(store.recorded_queries().is_empty());
    Ok(())
}

#[tokio::test]
async fn count_of_starts_with_issues_one_count_query() -> Result<()> {
    let store = RecordingStore::new();
    seed(&store.inner, &[
        Account::new("tester", "t1@example.com"),
        Account::new("testing", "t2@example.com"),
        Account::new("tom", "t3@example.com"),
    ])
    .await;
    let (client, store) = client(store);

    let count = client.count(&accounts_capabilities(), &Filter::sw("userName", "test"), ReadOptions::default()).await?;
    assert_eq!(count, Count::Exact(2));

    let requests = store.recorded_queries();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].select, Select::Count);
    assert_eq!(requests[0].index_name.as_deref(), Some("userNameInitial-userName-index"));
    Ok(())
}
