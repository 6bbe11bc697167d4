//! Stock capabilities for the system's tables. One constructor per logical
//! table; physical table names resolve through [`TableNames`] overrides (the
//! global name prefix is applied by the executor, never here).

use crate::catalog::{FeatureId, IndexDescriptor, PartitionBinding, Projection, QueryCapabilities, SortKey};
use std::collections::{BTreeSet, HashMap};

/// Logical table names.
pub mod table {
    pub const ACCOUNTS: &str = "accounts";
    pub const DEVICES: &str = "devices";
    pub const SESSIONS: &str = "sessions";
    pub const TOKENS: &str = "tokens";
    pub const DELEGATIONS: &str = "delegations";
    pub const NONCES: &str = "nonces";
    pub const DYNAMIC_CLIENTS: &str = "dynamic-clients";
    pub const BUCKETS: &str = "buckets";
    pub const LINKS: &str = "links";
}

/// Per-table physical name overrides.
#[derive(Debug, Clone, Default)]
pub struct TableNames {
    overrides: HashMap<String, String>,
}

impl TableNames {
    pub fn new() -> Self { Self::default() }

    pub fn with_override(mut self, logical: impl Into<String>, physical: impl Into<String>) -> Self {
        self.overrides.insert(logical.into(), physical.into());
        self
    }

    pub fn resolve(&self, logical: &str) -> String {
        self.overrides.get(logical).cloned().unwrap_or_else(|| logical.to_string())
    }
}

/// The accounts table collapses four lookup dimensions into one tagged
/// partition key (`un#`, `em#`, `ph#`, `id#`); starts-with listings go
/// through the first-character index instead.
pub fn accounts(names: &TableNames, allow_table_scans: bool) -> QueryCapabilities {
    QueryCapabilities {
        table_name: names.resolve(table::ACCOUNTS),
        primary: IndexDescriptor {
            name: None,
            partition_physical: "pk".to_string(),
            partition: vec![
                PartitionBinding::tagged("userName", "un#"),
                PartitionBinding::tagged("email", "em#"),
                PartitionBinding::tagged("phone", "ph#"),
                PartitionBinding::tagged("accountId", "id#"),
            ],
            sort: None,
            projection: Projection::All,
            required_feature: None,
        },
        secondary: vec![IndexDescriptor {
            name: Some("userNameInitial-userName-index".to_string()),
            partition_physical: "userNameInitial".to_string(),
            partition: vec![PartitionBinding::first_char("userName")],
            sort: Some(SortKey::new("userName")),
            projection: Projection::All,
            required_feature: Some(FeatureId::new("accounts.userNameInitial-userName-index")),
        }],
        primary_key_attributes: vec!["pk".to_string()],
        unfilterable: unfilterable(&["password"]),
        allow_table_scans,
    }
}

pub fn devices(names: &TableNames, allow_table_scans: bool) -> QueryCapabilities {
    QueryCapabilities {
        table_name: names.resolve(table::DEVICES),
        primary: IndexDescriptor {
            name: None,
            partition_physical: "deviceId".to_string(),
            partition: vec![PartitionBinding::verbatim("deviceId")],
            sort: None,
            projection: Projection::All,
            required_feature: None,
        },
        secondary: vec![IndexDescriptor {
            name: Some("accountId-deviceId-index".to_string()),
            partition_physical: "accountId".to_string(),
            partition: vec![PartitionBinding::verbatim("accountId")],
            sort: Some(SortKey::new("deviceId")),
            projection: Projection::All,
            required_feature: None,
        }],
        primary_key_attributes: vec!["deviceId".to_string()],
        unfilterable: BTreeSet::new(),
        allow_table_scans,
    }
}

pub fn sessions(names: &TableNames, allow_table_scans: bool) -> QueryCapabilities {
    single_key(names.resolve(table::SESSIONS), "id", allow_table_scans)
}

pub fn tokens(names: &TableNames, allow_table_scans: bool) -> QueryCapabilities {
    let mut capabilities = single_key(names.resolve(table::TOKENS), "tokenHash", allow_table_scans);
    capabilities.secondary.push(IndexDescriptor {
        name: Some("delegationsId-index".to_string()),
        partition_physical: "delegationsId".to_string(),
        partition: vec![PartitionBinding::verbatim("delegationsId")],
        sort: None,
        projection: Projection::All,
        required_feature: None,
    });
    capabilities
}

pub fn delegations(names: &TableNames, allow_table_scans: bool) -> QueryCapabilities {
    let mut capabilities = single_key(names.resolve(table::DELEGATIONS), "id", allow_table_scans);
    capabilities.secondary.push(IndexDescriptor {
        name: Some("owner-index".to_string()),
        partition_physical: "owner".to_string(),
        partition: vec![PartitionBinding::verbatim("owner")],
        sort: None,
        projection: Projection::All,
        required_feature: None,
    });
    capabilities
}

pub fn nonces(names: &TableNames, allow_table_scans: bool) -> QueryCapabilities {
    single_key(names.resolve(table::NONCES), "token", allow_table_scans)
}

pub fn dynamic_clients(names: &TableNames, allow_table_scans: bool) -> QueryCapabilities {
    let mut capabilities = single_key(names.resolve(table::DYNAMIC_CLIENTS), "clientId", allow_table_scans);
    capabilities.secondary.push(IndexDescriptor {
        name: Some("instanceOfClient-index".to_string()),
        partition_physical: "instanceOfClient".to_string(),
        partition: vec![PartitionBinding::verbatim("instanceOfClient")],
        sort: None,
        projection: Projection::All,
        required_feature: None,
    });
    capabilities
}

pub fn buckets(names: &TableNames, allow_table_scans: bool) -> QueryCapabilities {
    QueryCapabilities {
        table_name: names.resolve(table::BUCKETS),
        primary: IndexDescriptor {
            name: None,
            partition_physical: "subject".to_string(),
            partition: vec![PartitionBinding::verbatim("subject")],
            sort: Some(SortKey::new("purpose")),
            projection: Projection::All,
            required_feature: None,
        },
        secondary: vec![],
        primary_key_attributes: vec!["subject".to_string(), "purpose".to_string()],
        unfilterable: BTreeSet::new(),
        allow_table_scans,
    }
}

pub fn links(names: &TableNames, allow_table_scans: bool) -> QueryCapabilities {
    QueryCapabilities {
        table_name: names.resolve(table::LINKS),
        primary: IndexDescriptor {
            name: None,
            partition_physical: "localAccountId".to_string(),
            partition: vec![PartitionBinding::verbatim("localAccountId")],
            sort: Some(SortKey::new("foreignDomainName")),
            projection: Projection::All,
            required_feature: None,
        },
        secondary: vec![],
        primary_key_attributes: vec!["localAccountId".to_string(), "foreignDomainName".to_string()],
        unfilterable: BTreeSet::new(),
        allow_table_scans,
    }
}

fn single_key(table_name: String, key: &str, allow_table_scans: bool) -> QueryCapabilities {
    QueryCapabilities {
        table_name,
        primary: IndexDescriptor {
            name: None,
            partition_physical: key.to_string(),
            partition: vec![PartitionBinding::verbatim(key)],
            sort: None,
            projection: Projection::All,
            required_feature: None,
        },
        secondary: vec![],
        primary_key_attributes: vec![key.to_string()],
        unfilterable: BTreeSet::new(),
        allow_table_scans,
    }
}

fn unfilterable(attributes: &[&str]) -> BTreeSet<String> {
    attributes.iter().map(|a| a.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_resolve_per_table() {
        let names = TableNames::new().with_override(table::ACCOUNTS, "idsvr-accounts");
        assert_eq!(accounts(&names, false).table_name, "idsvr-accounts");
        assert_eq!(sessions(&names, false).table_name, "sessions");
    }

    #[test]
    fn every_table_exposes_a_primary_key() {
        let names = TableNames::default();
        for capabilities in [
            accounts(&names, false),
            devices(&names, false),
            sessions(&names, false),
            tokens(&names, false),
            delegations(&names, false),
            nonces(&names, false),
            dynamic_clients(&names, false),
            buckets(&names, false),
            links(&names, false),
        ] {
            assert!(capabilities.primary.name.is_none());
            assert!(!capabilities.primary.partition.is_empty());
            assert!(!capabilities.primary_key_attributes.is_empty());
        }
    }

    #[test]
    fn accounts_gates_the_initial_index_behind_a_feature() {
        let capabilities = accounts(&TableNames::default(), false);
        let index = &capabilities.secondary[0];
        assert_eq!(index.required_feature.as_ref().map(FeatureId::as_str), Some("accounts.userNameInitial-userName-index"));
    }
}
