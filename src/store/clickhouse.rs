//! ClickHouse connector using the HTTP interface.
//!
//! Statements are POSTed as the request body. Bound parameters travel as
//! `param_<name>` query parameters and are referenced in SQL as
//! `{name:Type}`, so values are never spliced into statement text.
//! Reads are requested in `JSONEachRow` format, one JSON object per line.

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use super::{Connection, Connector, Statement, StoreError, StoreResult};
use crate::config::StoreConfig;

const USER_HEADER: &str = "X-ClickHouse-User";
const KEY_HEADER: &str = "X-ClickHouse-Key";
const EXCEPTION_HEADER: &str = "X-ClickHouse-Exception-Code";

/// Creates HTTP connections to a ClickHouse server.
#[derive(Debug, Clone)]
pub struct ClickHouseConnector {
    endpoint: Url,
    user: Option<String>,
    password: Option<String>,
    settings: BTreeMap<String, String>,
    connect_timeout: Duration,
    query_timeout: Duration,
}

impl ClickHouseConnector {
    /// Build a connector from the store configuration.
    ///
    /// User-info in the connection string is moved into auth headers so it
    /// never shows up in logged URLs.
    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        let mut endpoint = Url::parse(&config.connection_string).map_err(|e| {
            StoreError::Connection(format!("invalid connection string: {e}"))
        })?;

        let user = Some(endpoint.username())
            .filter(|u| !u.is_empty())
            .map(decode);
        let password = endpoint.password().map(decode);
        // Only fails for cannot-be-a-base URLs, which http(s) URLs never are.
        let _ = endpoint.set_username("");
        let _ = endpoint.set_password(None);

        Ok(Self {
            endpoint,
            user,
            password,
            settings: config.settings.clone(),
            connect_timeout: config.connect_timeout(),
            query_timeout: config.query_timeout(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The endpoint with any `password` query parameter masked, for logging.
    pub fn redacted_endpoint(&self) -> Url {
        let mut url = self.endpoint.clone();
        if url.query_pairs().any(|(name, _)| name == "password") {
            let pairs: Vec<(String, String)> = url
                .query_pairs()
                .map(|(name, value)| {
                    let value = if name == "password" {
                        "***".to_string()
                    } else {
                        value.into_owned()
                    };
                    (name.into_owned(), value)
                })
                .collect();
            url.query_pairs_mut().clear().extend_pairs(pairs);
        }
        url
    }
}

fn decode(raw: &str) -> String {
    url::form_urlencoded::parse(format!("v={raw}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| raw.to_string())
}

#[async_trait]
impl Connector for ClickHouseConnector {
    async fn connect(&self) -> StoreResult<Box<dyn Connection>> {
        let client = Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.query_timeout)
            .build()
            .map_err(|e| StoreError::Connection(format!("failed to create HTTP client: {e}")))?;

        tracing::debug!(endpoint = %self.redacted_endpoint(), "Connecting to ClickHouse");

        Ok(Box::new(ClickHouseConnection {
            client: Some(client),
            connector: self.clone(),
        }))
    }
}

/// One HTTP session with ClickHouse.
pub struct ClickHouseConnection {
    client: Option<Client>,
    connector: ClickHouseConnector,
}

impl ClickHouseConnection {
    fn request(
        &self,
        sql: String,
        statement: Option<&Statement>,
    ) -> Result<reqwest::RequestBuilder, String> {
        let client = self.client.as_ref().ok_or("connection is closed")?;

        let mut url = self.connector.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.connector.settings {
                pairs.append_pair(name, value);
            }
            if let Some(statement) = statement {
                for (name, value) in statement.params() {
                    pairs.append_pair(&format!("param_{name}"), &value.to_string());
                }
            }
        }

        let mut request = client.post(url).body(sql);
        if let Some(user) = &self.connector.user {
            request = request.header(USER_HEADER, user);
        }
        if let Some(password) = &self.connector.password {
            request = request.header(KEY_HEADER, password);
        }
        Ok(request)
    }

    /// Send a statement and return the response body, or the server's error text.
    async fn send(&self, sql: String, statement: Option<&Statement>) -> Result<String, String> {
        let response = self
            .request(sql, statement)?
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        let exception_code = response
            .headers()
            .get(EXCEPTION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(|e| e.to_string())?;

        if !status.is_success() {
            return Err(format!("HTTP {}: {}", status.as_u16(), body.trim()));
        }
        if let Some(code) = exception_code {
            return Err(format!("exception code {code}: {}", body.trim()));
        }
        Ok(body)
    }
}

#[async_trait]
impl Connection for ClickHouseConnection {
    async fn ping(&self) -> StoreResult<()> {
        let body = self
            .send("SELECT 1".to_string(), None)
            .await
            .map_err(|e| StoreError::Connection(format!("liveness probe failed: {e}")))?;

        if body.trim() != "1" {
            return Err(StoreError::Connection(format!(
                "unexpected liveness probe response: {}",
                body.trim()
            )));
        }
        Ok(())
    }

    async fn query(&self, statement: &Statement) -> StoreResult<Vec<serde_json::Value>> {
        let query_error = |message: String| StoreError::Query {
            table: statement.table().to_string(),
            message,
        };

        let sql = format!("{} FORMAT JSONEachRow", statement.sql());
        let body = self.send(sql, Some(statement)).await.map_err(query_error)?;

        body.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|e| query_error(format!("malformed result row: {e}")))
            })
            .collect()
    }

    async fn execute(&self, statement: &Statement) -> StoreResult<()> {
        self.send(statement.sql().to_string(), Some(statement))
            .await
            .map_err(|message| StoreError::Mutation {
                table: statement.table().to_string(),
                message,
            })?;
        Ok(())
    }

    fn close(&mut self) {
        self.client = None;
    }
}
