//! Account DTOs mirroring the ledger's JSON schema.
//!
//! # Design
//! Fields are carried verbatim: the client computes no defaults and performs
//! no validation, the ledger owns both. Every field is serialized even when
//! empty, while decoding is lenient in the other direction: missing fields
//! take their zero value and unknown fields (`created_on`, `links`, ...) are
//! ignored. The mock-server crate keeps its own copy of the schema and the
//! integration tests catch drift between the two.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Resource type string the ledger uses for accounts.
pub const ACCOUNT_TYPE: &str = "accounts";

/// A bank account record, wrapped the way the ledger sends single resources.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    #[serde(default)]
    pub data: Data,
}

/// Identity, concurrency token and attributes of an account.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Data {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
    pub organisation_id: String,
    /// Optimistic-concurrency token; deletes must quote the current value.
    pub version: u64,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Attributes {
    pub country: String,
    pub base_currency: String,
    pub account_number: String,
    pub bank_id: String,
    pub bank_id_code: String,
    pub bic: String,
    pub iban: String,
    pub title: String,
    pub first_name: String,
    pub bank_account_name: String,
    pub alternative_bank_account_names: Vec<String>,
    pub account_classification: String,
    pub joint_account: bool,
    pub account_matching_opt_out: bool,
    pub secondary_identification: String,
}

impl From<Data> for Account {
    fn from(data: Data) -> Self {
        Self { data }
    }
}

/// Body of a list response. Each element is the bare resource object, without
/// the per-record `data` wrapper a single fetch returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountList {
    #[serde(default)]
    pub data: Vec<Data>,
}

impl AccountList {
    pub fn into_accounts(self) -> Vec<Account> {
        self.data.into_iter().map(Account::from).collect()
    }
}

/// Zero-based page selection for list requests.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub page_number: u32,
    pub page_size: u32,
}

impl Pagination {
    pub fn new(page_number: u32, page_size: u32) -> Self {
        Self {
            page_number,
            page_size,
        }
    }
}

/// Renders the query string without a leading `?`. Brackets stay literal.
impl fmt::Display for Pagination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "page[number]={}&page[size]={}",
            self.page_number, self.page_size
        )
    }
}
