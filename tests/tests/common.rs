#![allow(dead_code)]

use async_trait::async_trait;
use dynaq::store::{
    DocumentStore, MemoryIndex, MemoryStore, PutRequest, QueryPage, QueryRequest, ScanRequest, StoreError, TableSpec,
};
use dynaq::{AttributeValue, Client, ExecutorConfig, Item};
use std::sync::{Arc, Mutex, Once};

static TRACING: Once = Once::new();

/// Install the fmt subscriber once per test binary, so planner and executor
/// traces show up when a test fails.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).with_test_writer().try_init();
    });
}

pub fn accounts_table() -> TableSpec {
    TableSpec {
        name: "accounts".to_string(),
        key_attributes: vec!["pk".to_string()],
        indexes: vec![MemoryIndex {
            name: "userNameInitial-userName-index".to_string(),
            partition: "userNameInitial".to_string(),
            sort: Some("userName".to_string()),
        }],
    }
}

/// A store double that records every request it forwards to the in-memory
/// store, so tests can assert the exact wire shape.
pub struct RecordingStore {
    pub inner: MemoryStore,
    queries: Mutex<Vec<QueryRequest>>,
    scans: Mutex<Vec<ScanRequest>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        init_tracing();
        let inner = MemoryStore::new();
        inner.create_table(accounts_table());
        RecordingStore { inner, queries: Mutex::new(Vec::new()), scans: Mutex::new(Vec::new()) }
    }

    pub fn recorded_queries(&self) -> Vec<QueryRequest> { self.queries.lock().unwrap().clone() }

    pub fn recorded_scans(&self) -> Vec<ScanRequest> { self.scans.lock().unwrap().clone() }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn query(&self, request: QueryRequest) -> Result<QueryPage, StoreError> {
        self.queries.lock().unwrap().push(request.clone());
        self.inner.query(request).await
    }

    async fn scan(&self, request: ScanRequest) -> Result<QueryPage, StoreError> {
        self.scans.lock().unwrap().push(request.clone());
        self.inner.scan(request).await
    }

    async fn put(&self, request: PutRequest) -> Result<(), StoreError> { self.inner.put(request).await }

    async fn supports_feature(&self, feature: &str) -> Result<bool, StoreError> {
        self.inner.supports_feature(feature).await
    }
}

pub struct Account {
    pub user_name: &'static str,
    pub email: &'static str,
    pub phone: &'static str,
    pub account_id: &'static str,
    pub status: &'static str,
    pub first_name: &'static str,
}

impl Account {
    pub fn new(user_name: &'static str, email: &'static str) -> Self {
        Account { user_name, email, phone: "", account_id: "", status: "active", first_name: "" }
    }

    pub fn status(mut self, status: &'static str) -> Self {
        self.status = status;
        self
    }

    pub fn first_name(mut self, first_name: &'static str) -> Self {
        self.first_name = first_name;
        self
    }

    fn base(&self) -> Item {
        let mut item = Item::new();
        item.insert("userName".to_string(), AttributeValue::s(self.user_name));
        item.insert("email".to_string(), AttributeValue::s(self.email));
        item.insert("status".to_string(), AttributeValue::s(self.status));
        if !self.phone.is_empty() {
            item.insert("phone".to_string(), AttributeValue::s(self.phone));
        }
        if !self.account_id.is_empty() {
            item.insert("accountId".to_string(), AttributeValue::s(self.account_id));
        }
        if !self.first_name.is_empty() {
            item.insert("firstName".to_string(), AttributeValue::s(self.first_name));
        }
        item
    }

    /// The write fan-out of the composite key scheme: one full item per
    /// lookup dimension. Only the `un#` item carries the initial, so the
    /// first-character index holds one entry per account.
    pub fn items(&self) -> Vec<Item> {
        let mut out = Vec::new();

        let mut main = self.base();
        main.insert("pk".to_string(), AttributeValue::s(format!("un#{}", self.user_name)));
        let initial: String = self.user_name.chars().take(1).flat_map(char::to_lowercase).collect();
        main.insert("userNameInitial".to_string(), AttributeValue::s(initial));
        out.push(main);

        let mut by_email = self.base();
        by_email.insert("pk".to_string(), AttributeValue::s(format!("em#{}", self.email)));
        out.push(by_email);

        if !self.phone.is_empty() {
            let mut by_phone = self.base();
            by_phone.insert("pk".to_string(), AttributeValue::s(format!("ph#{}", self.phone)));
            out.push(by_phone);
        }
        if !self.account_id.is_empty() {
            let mut by_id = self.base();
            by_id.insert("pk".to_string(), AttributeValue::s(format!("id#{}", self.account_id)));
            out.push(by_id);
        }
        out
    }
}

pub async fn seed(store: &MemoryStore, accounts: &[Account]) {
    for account in accounts {
        for item in account.items() {
            store
                .put(PutRequest { table_name: "accounts".to_string(), item, ..Default::default() })
                .await
                .expect("seeding the accounts table");
        }
    }
}

pub fn client(store: RecordingStore) -> (Client<RecordingStore>, Arc<RecordingStore>) {
    let store = Arc::new(store);
    (Client::new(store.clone(), ExecutorConfig::default()), store)
}

pub fn user_names(items: &[Item]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| item.get("userName").and_then(|v| v.as_s()).map(str::to_string))
        .collect()
}
