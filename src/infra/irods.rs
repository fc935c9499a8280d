//! iRODS HTTP API session backing the metadata index.
//!
//! The session is acquired once by [`IrodsSession::connect`] (basic-auth
//! exchange for a bearer token) and released once by
//! [`IrodsSession::release`]. Searches after release fail with
//! [`IndexError::SessionClosed`] rather than reconnecting.

use std::{mem, sync::RwLock};

use async_trait::async_trait;
use reqwest::{Client, header::AUTHORIZATION};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::application::dispatcher::BasicCredentials;
use crate::application::resolver::{IndexError, MetadataEntry, MetadataIndex};

#[derive(Debug, Deserialize)]
struct IrodsStatus {
    status_code: i64,
    #[serde(default)]
    status_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    irods_response: IrodsStatus,
    #[serde(default)]
    rows: Vec<Vec<String>>,
}

pub struct IrodsSession {
    client: Client,
    api_url: Url,
    credentials: BasicCredentials,
    token: RwLock<Option<String>>,
}

impl IrodsSession {
    pub async fn connect(
        client: Client,
        api_url: &str,
        credentials: BasicCredentials,
    ) -> Result<Self, IndexError> {
        let api_url = Url::parse(api_url)
            .map_err(|err| IndexError::Endpoint(format!("`{api_url}`: {err}")))?;
        if api_url.cannot_be_a_base() {
            return Err(IndexError::Endpoint(format!(
                "`{api_url}` cannot carry endpoint paths"
            )));
        }

        let session = Self {
            client,
            api_url,
            credentials,
            token: RwLock::new(None),
        };

        let token = session.authenticate().await?;
        session.swap_token("connect", Some(token));

        info!(
            api_url = %session.api_url,
            username = %session.credentials.username,
            "Connected to iRODS"
        );
        Ok(session)
    }

    pub fn is_open(&self) -> bool {
        self.current_token("is_open").is_some()
    }

    /// Drop the bearer token. Returns `false` if the session was already released.
    pub fn release(&self) -> bool {
        let released = self.swap_token("release", None).is_some();
        if released {
            info!(api_url = %self.api_url, "Released iRODS session");
        }
        released
    }

    /// Bearer token, or `None` once released. A poisoned lock still holds a
    /// whole `Option`, so its value is used as-is.
    fn current_token(&self, op: &'static str) -> Option<String> {
        match self.token.read() {
            Ok(token) => token.clone(),
            Err(poisoned) => {
                warn!(op, api_url = %self.api_url, "Recovered poisoned iRODS token lock");
                poisoned.into_inner().clone()
            }
        }
    }

    fn swap_token(&self, op: &'static str, token: Option<String>) -> Option<String> {
        let mut slot = match self.token.write() {
            Ok(slot) => slot,
            Err(poisoned) => {
                warn!(op, api_url = %self.api_url, "Recovered poisoned iRODS token lock");
                poisoned.into_inner()
            }
        };
        mem::replace(&mut *slot, token)
    }

    async fn authenticate(&self) -> Result<String, IndexError> {
        let url = self.endpoint("authenticate")?;
        let response = self
            .client
            .post(url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .await?
            .error_for_status()?;

        let token = response.text().await?.trim().to_string();
        if token.is_empty() {
            return Err(IndexError::Backend {
                code: -1,
                message: "authentication returned an empty token".to_string(),
            });
        }
        Ok(token)
    }

    fn endpoint(&self, name: &str) -> Result<Url, IndexError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| IndexError::Endpoint(self.api_url.to_string()))?
            .pop_if_empty()
            .push(name);
        Ok(url)
    }

    async fn genquery(&self, query: &str) -> Result<Vec<Vec<String>>, IndexError> {
        let token = self
            .current_token("genquery")
            .ok_or(IndexError::SessionClosed)?;

        let mut url = self.endpoint("query")?;
        url.query_pairs_mut()
            .append_pair("op", "execute_genquery")
            .append_pair("query", query);

        debug!(query, "Running GenQuery");

        let response: QueryResponse = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.irods_response.status_code != 0 {
            return Err(IndexError::Backend {
                code: response.irods_response.status_code,
                message: response
                    .irods_response
                    .status_message
                    .unwrap_or_default(),
            });
        }
        Ok(response.rows)
    }
}

#[async_trait]
impl MetadataIndex for IrodsSession {
    async fn search_by_attribute(
        &self,
        attribute: &str,
        value: &str,
    ) -> Result<Vec<MetadataEntry>, IndexError> {
        // GenQuery string literals have no escape syntax.
        for literal in [attribute, value] {
            if literal.contains('\'') {
                return Err(IndexError::UnsupportedValue(literal.to_string()));
            }
        }

        let mut entries = Vec::new();

        for row in self.genquery(&data_object_query(attribute, value)).await? {
            match row.as_slice() {
                [collection, name, ..] => entries.push(MetadataEntry {
                    path: join_path(collection, name),
                }),
                _ => return Err(malformed_row(&row)),
            }
        }

        for row in self.genquery(&collection_query(attribute, value)).await? {
            match row.first() {
                Some(collection) => entries.push(MetadataEntry {
                    path: collection.clone(),
                }),
                None => return Err(malformed_row(&row)),
            }
        }

        Ok(entries)
    }
}

fn data_object_query(attribute: &str, value: &str) -> String {
    format!(
        "SELECT COLL_NAME, DATA_NAME WHERE META_DATA_ATTR_NAME = '{attribute}' AND META_DATA_ATTR_VALUE = '{value}'"
    )
}

fn collection_query(attribute: &str, value: &str) -> String {
    format!(
        "SELECT COLL_NAME WHERE META_COLL_ATTR_NAME = '{attribute}' AND META_COLL_ATTR_VALUE = '{value}'"
    )
}

fn join_path(collection: &str, name: &str) -> String {
    format!("{}/{name}", collection.trim_end_matches('/'))
}

fn malformed_row(row: &[String]) -> IndexError {
    IndexError::Backend {
        code: -1,
        message: format!("unexpected GenQuery row shape: {row:?}"),
    }
}

#[cfg(test)]
mod tests {
    use httpmock::MockServer;

    use super::*;

    const TOKEN: &str = "token-1";

    async fn mock_auth(server: &MockServer) -> httpmock::Mock<'_> {
        server
            .mock_async(|when, then| {
                when.method("POST")
                    .path("/api/authenticate")
                    .header("authorization", "Basic cm9kczpzZWNyZXQ=");
                then.status(200).body(TOKEN);
            })
            .await
    }

    async fn mock_query<'a>(server: &'a MockServer, query: &str, body: &str) -> httpmock::Mock<'a> {
        let query = query.to_string();
        let body = body.to_string();
        server
            .mock_async(move |when, then| {
                when.method("GET")
                    .path("/api/query")
                    .query_param("op", "execute_genquery")
                    .query_param("query", query.as_str())
                    .header("authorization", "Bearer token-1");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(body.as_str());
            })
            .await
    }

    async fn open_session(server: &MockServer) -> IrodsSession {
        IrodsSession::connect(
            Client::new(),
            &server.url("/api/"),
            BasicCredentials::new("rods", "secret"),
        )
        .await
        .expect("session connects")
    }

    #[tokio::test]
    async fn connect_exchanges_credentials_for_token() {
        let server = MockServer::start_async().await;
        let auth = mock_auth(&server).await;

        let session = open_session(&server).await;

        auth.assert_async().await;
        assert!(session.is_open());
    }

    #[tokio::test]
    async fn search_collects_data_objects_and_collections() {
        let server = MockServer::start_async().await;
        mock_auth(&server).await;
        let data = mock_query(
            &server,
            &data_object_query("ipc_UUID", "u1"),
            r#"{"irods_response":{"status_code":0},"rows":[["/zone/home/alice","a.txt"]]}"#,
        )
        .await;
        let colls = mock_query(
            &server,
            &collection_query("ipc_UUID", "u1"),
            r#"{"irods_response":{"status_code":0},"rows":[["/zone/home/alice/dir"]]}"#,
        )
        .await;

        let session = open_session(&server).await;
        let entries = session
            .search_by_attribute("ipc_UUID", "u1")
            .await
            .expect("search succeeds");

        data.assert_async().await;
        colls.assert_async().await;
        assert_eq!(
            entries,
            vec![
                MetadataEntry {
                    path: "/zone/home/alice/a.txt".to_string()
                },
                MetadataEntry {
                    path: "/zone/home/alice/dir".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn backend_status_is_reported_as_error() {
        let server = MockServer::start_async().await;
        mock_auth(&server).await;
        mock_query(
            &server,
            &data_object_query("ipc_UUID", "u1"),
            r#"{"irods_response":{"status_code":-818000,"status_message":"CAT_NO_ACCESS_PERMISSION"}}"#,
        )
        .await;

        let session = open_session(&server).await;
        let err = session
            .search_by_attribute("ipc_UUID", "u1")
            .await
            .expect_err("backend error");

        assert!(matches!(err, IndexError::Backend { code: -818000, .. }));
    }

    #[tokio::test]
    async fn quoted_values_are_rejected_before_querying() {
        let server = MockServer::start_async().await;
        mock_auth(&server).await;

        let session = open_session(&server).await;
        let err = session
            .search_by_attribute("ipc_UUID", "u1' OR '1'='1")
            .await
            .expect_err("unsupported value");

        assert!(matches!(err, IndexError::UnsupportedValue(_)));
    }

    #[tokio::test]
    async fn released_session_refuses_queries() {
        let server = MockServer::start_async().await;
        mock_auth(&server).await;

        let session = open_session(&server).await;
        assert!(session.release());
        assert!(!session.release());
        assert!(!session.is_open());

        let err = session
            .search_by_attribute("ipc_UUID", "u1")
            .await
            .expect_err("closed session");
        assert!(matches!(err, IndexError::SessionClosed));
    }

    #[tokio::test]
    async fn poisoned_token_lock_keeps_session_usable() {
        let server = MockServer::start_async().await;
        mock_auth(&server).await;

        let session = open_session(&server).await;
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _slot = session.token.write().expect("token lock");
            panic!("poison token lock");
        }));
        assert!(session.token.is_poisoned());

        assert!(session.is_open());
        assert!(session.release());
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn rejected_credentials_fail_connect() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("POST").path("/api/authenticate");
                then.status(401);
            })
            .await;

        let result = IrodsSession::connect(
            Client::new(),
            &server.url("/api"),
            BasicCredentials::new("rods", "wrong"),
        )
        .await;

        assert!(matches!(result, Err(IndexError::Http(_))));
    }

    #[test]
    fn root_collection_is_not_doubled() {
        assert_eq!(join_path("/", "a.txt"), "/a.txt");
        assert_eq!(join_path("/zone/home", "a.txt"), "/zone/home/a.txt");
    }
}
