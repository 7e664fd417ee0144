//! Account operations over the ledger's REST API.
//!
//! # Design
//! Each operation comes in three parts. `build_*` turns typed arguments into
//! an `HttpRequest`, `parse_*` turns an `HttpResponse` into a typed result,
//! and the executing method in between hands the request to the configured
//! `Transport`. The build/parse halves never touch the network, so they can
//! be checked against fixtures without a server.
//!
//! Every operation expects exactly one status code. Anything else becomes
//! `ApiError::UnexpectedStatus`; there are no retries.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use crate::config::{
    ClientBuilder, ClientConfig, PollPolicy, ACCESS_KEY_HEADER, HEALTH_PATH,
    SECRET_ACCESS_KEY_HEADER,
};
use crate::context::Context;
use crate::error::{ApiError, Operation};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::{Transport, UreqTransport};
use crate::types::{Account, AccountList, Pagination};

const APPLICATION_JSON: &str = "application/json";

/// Client for the accounts resource of the ledger API.
///
/// Holds immutable configuration and a transport. Safe to share between
/// threads; every call builds its own request.
#[derive(Debug, Clone)]
pub struct AccountsClient<T = UreqTransport> {
    config: ClientConfig,
    transport: T,
}

impl AccountsClient<UreqTransport> {
    /// Client for the production API with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }
}

impl Default for AccountsClient<UreqTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn build(self) -> AccountsClient<UreqTransport> {
        self.build_with_transport(UreqTransport::new())
    }

    pub fn build_with_transport<T>(self, transport: T) -> AccountsClient<T> {
        AccountsClient::with_transport(self.into_config(), transport)
    }
}

impl<T> AccountsClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn build_create_account(&self, account: &Account) -> Result<HttpRequest, ApiError> {
        let url = self.config.resolve(self.config.service_path())?;
        let body = encode(account)?;
        Ok(self.new_request(HttpMethod::Post, url, Some(body)))
    }

    pub fn build_fetch_account(&self, account_id: &str) -> Result<HttpRequest, ApiError> {
        let url = self.account_url(account_id)?;
        Ok(self.new_request(HttpMethod::Get, url, None))
    }

    pub fn build_delete_account(
        &self,
        account_id: &str,
        version: u64,
    ) -> Result<HttpRequest, ApiError> {
        let mut url = self.account_url(account_id)?;
        url.set_query(Some(&format!("version={version}")));
        Ok(self.new_request(HttpMethod::Delete, url, None))
    }

    /// List request using the client's static pagination, if configured.
    pub fn build_list_accounts(&self) -> Result<HttpRequest, ApiError> {
        let mut url = self.config.resolve(self.config.service_path())?;
        if let Some(pagination) = self.config.pagination() {
            url.set_query(Some(&pagination.to_string()));
        }
        Ok(self.new_request(HttpMethod::Get, url, None))
    }

    pub fn build_list_accounts_page(&self, pagination: Pagination) -> Result<HttpRequest, ApiError> {
        let mut url = self.config.resolve(self.config.service_path())?;
        url.set_query(Some(&pagination.to_string()));
        Ok(self.new_request(HttpMethod::Get, url, None))
    }

    pub fn build_health_check(&self) -> Result<HttpRequest, ApiError> {
        let url = self.config.resolve(HEALTH_PATH)?;
        Ok(self.new_request(HttpMethod::Get, url, None))
    }

    pub fn parse_create_account(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response, Operation::CreateAccount, 201)
    }

    pub fn parse_fetch_account(&self, response: HttpResponse) -> Result<Account, ApiError> {
        check_status(&response, Operation::FetchAccount, 200)?;
        decode(&response.body)
    }

    pub fn parse_delete_account(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response, Operation::DeleteAccount, 200)
    }

    pub fn parse_list_accounts(&self, response: HttpResponse) -> Result<Vec<Account>, ApiError> {
        check_status(&response, Operation::ListAccounts, 200)?;
        let list: AccountList = decode(&response.body)?;
        Ok(list.into_accounts())
    }

    pub fn parse_health_check(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response, Operation::HealthCheck, 200)
    }

    /// `{service_path}/{account_id}`, with the id percent-encoded as a single
    /// path segment.
    fn account_url(&self, account_id: &str) -> Result<Url, ApiError> {
        let mut url = self.config.resolve(self.config.service_path())?;
        url.path_segments_mut()
            .map_err(|()| ApiError::RequestBuild("base URL cannot take path segments".to_string()))?
            .pop_if_empty()
            .push(account_id);
        Ok(url)
    }

    fn new_request(&self, method: HttpMethod, url: Url, body: Option<String>) -> HttpRequest {
        let mut headers = Vec::with_capacity(5);
        if body.is_some() {
            headers.push(("Content-Type".to_string(), APPLICATION_JSON.to_string()));
        }
        headers.push(("Accept".to_string(), APPLICATION_JSON.to_string()));
        headers.push(("User-Agent".to_string(), self.config.user_agent().to_string()));
        if let Some(credentials) = self.config.credentials() {
            headers.push((ACCESS_KEY_HEADER.to_string(), credentials.access_key.clone()));
            headers.push((
                SECRET_ACCESS_KEY_HEADER.to_string(),
                credentials.secret_access_key.clone(),
            ));
        }
        HttpRequest {
            method,
            url: url.into(),
            headers,
            body,
        }
    }
}

impl<T: Transport> AccountsClient<T> {
    /// Registers a new account. The ledger answers 201 on success.
    pub fn create_account(&self, ctx: &Context, account: &Account) -> Result<(), ApiError> {
        let request = self.build_create_account(account)?;
        self.parse_create_account(self.send(ctx, &request)?)?;
        info!(account_id = %account.data.id, "account created");
        Ok(())
    }

    pub fn fetch_account(&self, ctx: &Context, account_id: &str) -> Result<Account, ApiError> {
        let request = self.build_fetch_account(account_id)?;
        let account = self.parse_fetch_account(self.send(ctx, &request)?)?;
        info!(account_id, "account fetched");
        Ok(account)
    }

    /// Deletes an account. `version` must match the ledger's current version
    /// of the record.
    pub fn delete_account(
        &self,
        ctx: &Context,
        account_id: &str,
        version: u64,
    ) -> Result<(), ApiError> {
        let request = self.build_delete_account(account_id, version)?;
        self.parse_delete_account(self.send(ctx, &request)?)?;
        info!(account_id, version, "account deleted");
        Ok(())
    }

    pub fn list_accounts(&self, ctx: &Context) -> Result<Vec<Account>, ApiError> {
        let request = self.build_list_accounts()?;
        let accounts = self.parse_list_accounts(self.send(ctx, &request)?)?;
        info!(count = accounts.len(), "accounts listed");
        Ok(accounts)
    }

    pub fn list_accounts_page(
        &self,
        ctx: &Context,
        pagination: Pagination,
    ) -> Result<Vec<Account>, ApiError> {
        let request = self.build_list_accounts_page(pagination)?;
        let accounts = self.parse_list_accounts(self.send(ctx, &request)?)?;
        info!(
            count = accounts.len(),
            page_number = pagination.page_number,
            page_size = pagination.page_size,
            "accounts listed"
        );
        Ok(accounts)
    }

    /// One health check; succeeds only on 200.
    pub fn check_health(&self, ctx: &Context) -> Result<(), ApiError> {
        let request = self.build_health_check()?;
        self.parse_health_check(self.send(ctx, &request)?)
    }

    /// Polls the health endpoint until it answers 200.
    ///
    /// Sleeps between attempts per `policy`, gives up with
    /// `ApiError::ServiceUnavailable` once `max_attempts` checks have failed,
    /// and stops early with `ApiError::Cancelled` when `ctx` is done.
    pub fn wait_until_available(&self, ctx: &Context, policy: &PollPolicy) -> Result<(), ApiError> {
        let request = self.build_health_check()?;
        let attempts = policy.max_attempts.max(1);
        for attempt in 0..attempts {
            let result = self
                .send(ctx, &request)
                .and_then(|response| self.parse_health_check(response));
            match result {
                Ok(()) => {
                    info!(attempts = attempt + 1, "account service available");
                    return Ok(());
                }
                Err(ApiError::Cancelled(reason)) => return Err(reason.into()),
                Err(err) => {
                    warn!(attempt = attempt + 1, error = %err, "waiting for account service to be available");
                }
            }
            if attempt + 1 < attempts {
                ctx.sleep(policy.delay_after(attempt))?;
            }
        }
        Err(ApiError::ServiceUnavailable { attempts })
    }

    fn send(&self, ctx: &Context, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        ctx.check()?;
        self.transport.execute(ctx, request)
    }
}

fn encode<B: Serialize>(body: &B) -> Result<String, ApiError> {
    serde_json::to_string(body).map_err(|e| ApiError::RequestBuild(e.to_string()))
}

/// Decodes a JSON body. An empty body decodes to the default value.
fn decode<R: DeserializeOwned + Default>(body: &str) -> Result<R, ApiError> {
    if body.trim().is_empty() {
        return Ok(R::default());
    }
    serde_json::from_str(body).map_err(|e| ApiError::Deserialization(e.to_string()))
}

fn check_status(response: &HttpResponse, operation: Operation, expected: u16) -> Result<(), ApiError> {
    if response.status == expected {
        return Ok(());
    }
    Err(ApiError::UnexpectedStatus {
        operation,
        status: response.status,
        body: response.body.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::types::{Attributes, Data};

    fn client() -> AccountsClient {
        AccountsClient::builder()
            .base_url("http://localhost:8080")
            .build()
    }

    fn account() -> Account {
        Account {
            data: Data {
                resource_type: "accounts".to_string(),
                id: "ad27e265-9605-4b4b-a0e5-3003ea9cc4dc".to_string(),
                organisation_id: "eb0bd6f5-c3f5-44b2-b677-acd23cdde73c".to_string(),
                version: 0,
                attributes: Attributes {
                    country: "GB".to_string(),
                    bank_account_name: "Samantha Holder".to_string(),
                    ..Attributes::default()
                },
            },
        }
    }

    #[test]
    fn build_create_account_produces_correct_request() {
        let req = client().build_create_account(&account()).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "http://localhost:8080/v1/organisation/accounts");
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("accept"), Some("application/json"));
        let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["data"]["id"], "ad27e265-9605-4b4b-a0e5-3003ea9cc4dc");
        assert_eq!(body["data"]["attributes"]["bank_account_name"], "Samantha Holder");
    }

    #[test]
    fn body_is_not_html_escaped() {
        let mut input = account();
        input.data.attributes.bank_account_name = "Smith & <Sons>".to_string();
        let req = client().build_create_account(&input).unwrap();
        assert!(req.body.unwrap().contains("Smith & <Sons>"));
    }

    #[test]
    fn build_fetch_account_produces_correct_request() {
        let req = client().build_fetch_account("abc").unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "http://localhost:8080/v1/organisation/accounts/abc");
        assert!(req.body.is_none());
        assert!(req.header("content-type").is_none());
    }

    #[test]
    fn account_id_is_a_single_path_segment() {
        let req = client().build_fetch_account("a/b?c").unwrap();
        assert_eq!(req.url, "http://localhost:8080/v1/organisation/accounts/a%2Fb%3Fc");
    }

    #[test]
    fn build_delete_account_carries_version() {
        let req = client().build_delete_account("abc", 7).unwrap();
        assert_eq!(req.method, HttpMethod::Delete);
        assert_eq!(req.url, "http://localhost:8080/v1/organisation/accounts/abc?version=7");
    }

    #[test]
    fn build_list_accounts_without_pagination() {
        let req = client().build_list_accounts().unwrap();
        assert_eq!(req.url, "http://localhost:8080/v1/organisation/accounts");
    }

    #[test]
    fn build_list_accounts_uses_static_pagination() {
        let client = AccountsClient::builder()
            .base_url("http://localhost:8080/")
            .service_path("/v1/organisation/accounts")
            .pagination(0, 1)
            .build();
        let req = client.build_list_accounts().unwrap();
        assert_eq!(
            req.url,
            "http://localhost:8080/v1/organisation/accounts?page[number]=0&page[size]=1"
        );
    }

    #[test]
    fn build_list_accounts_page_appends_query() {
        let req = client().build_list_accounts_page(Pagination::new(3, 25)).unwrap();
        assert_eq!(
            req.url,
            "http://localhost:8080/v1/organisation/accounts?page[number]=3&page[size]=25"
        );
    }

    #[test]
    fn service_path_override_applies_to_single_records() {
        let client = AccountsClient::builder()
            .base_url("http://localhost:8080")
            .service_path("/v2/accounts/")
            .build();
        let req = client.build_fetch_account("abc").unwrap();
        assert_eq!(req.url, "http://localhost:8080/v2/accounts/abc");
    }

    #[test]
    fn credentials_and_user_agent_are_sent() {
        let client = AccountsClient::builder()
            .base_url("http://localhost:8080")
            .credentials(Credentials::new("access", "secret"))
            .user_agent("ledger-tests/1.0")
            .build();
        let req = client.build_health_check().unwrap();
        assert_eq!(req.url, "http://localhost:8080/v1/health");
        assert_eq!(req.header("user-agent"), Some("ledger-tests/1.0"));
        assert_eq!(req.header("x-access-key"), Some("access"));
        assert_eq!(req.header("x-secret-access-key"), Some("secret"));
    }

    #[test]
    fn builder_settings_are_kept_in_config() {
        let client = AccountsClient::builder()
            .base_url("http://ledger.test/")
            .service_path("/v2/accounts")
            .pagination(1, 20)
            .credentials(Credentials::new("access", "secret"))
            .user_agent("ledger-tests/1.0")
            .build();
        let config = client.config();
        assert_eq!(config.base_url(), "http://ledger.test/");
        assert_eq!(config.service_path(), "/v2/accounts");
        assert_eq!(config.pagination(), Some(Pagination::new(1, 20)));
        assert_eq!(config.credentials(), Some(&Credentials::new("access", "secret")));
        assert_eq!(config.user_agent(), "ledger-tests/1.0");
    }

    #[test]
    fn no_credential_headers_by_default() {
        let req = client().build_health_check().unwrap();
        assert!(req.header("x-access-key").is_none());
        assert!(req.header("user-agent").unwrap().starts_with("f3-client/"));
    }

    #[test]
    fn bad_base_url_fails_to_build() {
        let client = AccountsClient::builder().base_url("::nonsense").build();
        let err = client.build_fetch_account("abc").unwrap_err();
        assert!(matches!(err, ApiError::RequestBuild(_)));
    }

    #[test]
    fn parse_create_account_requires_201() {
        assert!(client().parse_create_account(HttpResponse::new(201, "")).is_ok());
        let err = client().parse_create_account(HttpResponse::new(200, "")).unwrap_err();
        assert!(matches!(
            err,
            ApiError::UnexpectedStatus {
                operation: Operation::CreateAccount,
                status: 200,
                ..
            }
        ));
    }

    #[test]
    fn parse_fetch_account_success() {
        let body = serde_json::to_string(&account()).unwrap();
        let fetched = client().parse_fetch_account(HttpResponse::new(200, body)).unwrap();
        assert_eq!(fetched, account());
    }

    #[test]
    fn parse_fetch_account_empty_body_is_default() {
        let fetched = client().parse_fetch_account(HttpResponse::new(200, "")).unwrap();
        assert_eq!(fetched, Account::default());
    }

    #[test]
    fn parse_fetch_account_not_found() {
        let response = HttpResponse::new(404, r#"{"error_message":"record abc does not exist"}"#);
        let err = client().parse_fetch_account(response).unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn parse_fetch_account_bad_json() {
        let err = client().parse_fetch_account(HttpResponse::new(200, "not json")).unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
    }

    #[test]
    fn parse_delete_account_requires_200() {
        assert!(client().parse_delete_account(HttpResponse::new(200, "")).is_ok());
        let err = client().parse_delete_account(HttpResponse::new(204, "")).unwrap_err();
        assert_eq!(err.status(), Some(204));
        let err = client().parse_delete_account(HttpResponse::new(409, "")).unwrap_err();
        assert_eq!(err.to_string(), "DeleteAccount :: unexpected status code: 409");
    }

    #[test]
    fn parse_list_accounts_returns_inner_records() {
        let response = HttpResponse::new(200, r#"{"data":[{"id":"a","version":1},{"id":"b"}]}"#);
        let accounts = client().parse_list_accounts(response).unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].data.id, "a");
        assert_eq!(accounts[0].data.version, 1);
    }

    #[test]
    fn parse_health_check_requires_200() {
        assert!(client().parse_health_check(HttpResponse::new(200, "")).is_ok());
        let err = client().parse_health_check(HttpResponse::new(503, "")).unwrap_err();
        assert_eq!(err.status(), Some(503));
    }
}
