//! Client for a PostgREST-style hosted table API.
//!
//! Rows go in and out as JSON arrays; filters ride in the query string as
//! `column=op.value` pairs. Writes ask for `return=minimal` since callers
//! only care whether the write was accepted.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use time::PrimitiveDateTime;

use crate::domain::ts_format;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {status}: {message}")]
    Api { status: u16, message: String },
}

/// Handle onto one hosted table API. Construct it once from configuration
/// and pass it to whatever needs store access; there is no ambient global.
#[derive(Debug, Clone)]
pub struct RestTableClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl RestTableClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, RestError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(RestError::Build)?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    /// Insert `rows` into `table` as a single write.
    pub async fn insert_rows<T: Serialize>(&self, table: &str, rows: &[T]) -> Result<(), RestError> {
        let response = self
            .http
            .post(self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;
        Self::check(response).await
    }

    /// Delete every row whose `ts_column` is strictly before `cutoff`.
    pub async fn delete_rows_before(
        &self,
        table: &str,
        ts_column: &str,
        cutoff: PrimitiveDateTime,
    ) -> Result<(), RestError> {
        let response = self
            .http
            .delete(self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=minimal")
            .query(&[(ts_column, format!("lt.{}", ts_format::format(cutoff)))])
            .send()
            .await?;
        Self::check(response).await
    }

    /// Fetch every row whose `ts_column` is strictly before `cutoff`,
    /// ordered ascending by that column.
    pub async fn fetch_rows_before<T: DeserializeOwned>(
        &self,
        table: &str,
        ts_column: &str,
        cutoff: PrimitiveDateTime,
    ) -> Result<Vec<T>, RestError> {
        let response = self
            .http
            .get(self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .query(&[
                ("select", "*".to_string()),
                (ts_column, format!("lt.{}", ts_format::format(cutoff))),
                ("order", format!("{ts_column}.asc")),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn check(response: reqwest::Response) -> Result<(), RestError> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn api_error(response: reqwest::Response) -> RestError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        RestError::Api { status, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PhaseRow, TOTAL_PHASE};
    use mockito::Matcher;
    use time::macros::datetime;

    fn row(device: i32) -> PhaseRow {
        PhaseRow {
            current: Some(10.2),
            voltage: None,
            active_power: Some(2300.0),
            power_factor: None,
            frequency: None,
            total_active_energy: Some(512.5),
            total_active_returned_energy: None,
            apparent_power: Some(2400.0),
            device,
            phase_type: TOTAL_PHASE,
            ts: datetime!(2024-01-01 00:00:00),
            price_realtime: Some(0.15),
        }
    }

    #[tokio::test]
    async fn insert_posts_json_array_with_auth_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/phase")
            .match_header("apikey", "test-key")
            .match_header("authorization", "Bearer test-key")
            .match_header("prefer", "return=minimal")
            .match_body(Matcher::PartialJson(serde_json::json!([
                {"device": 1, "phase_type": 4, "ts": "2024-01-01 00:00:00"},
                {"device": 2, "phase_type": 4, "ts": "2024-01-01 00:00:00"},
            ])))
            .with_status(201)
            .create_async()
            .await;

        let client = RestTableClient::new(server.url(), "test-key").unwrap();
        client.insert_rows("phase", &[row(1), row(2)]).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn insert_surfaces_api_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/phase")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = RestTableClient::new(server.url(), "test-key").unwrap();
        let err = client.insert_rows("phase", &[row(1)]).await.unwrap_err();
        match err {
            RestError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn delete_sends_lt_filter_on_ts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/phase")
            .match_query(Matcher::UrlEncoded(
                "ts".into(),
                "lt.2024-03-26 00:00:00".into(),
            ))
            .with_status(204)
            .create_async()
            .await;

        let client = RestTableClient::new(server.url(), "test-key").unwrap();
        client
            .delete_rows_before("phase", "ts", datetime!(2024-03-26 00:00:00))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_parses_rows_and_orders_by_ts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/phase")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("select".into(), "*".into()),
                Matcher::UrlEncoded("ts".into(), "lt.2024-03-26 00:00:00".into()),
                Matcher::UrlEncoded("order".into(), "ts.asc".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(serde_json::to_string(&[row(1), row(2)]).unwrap())
            .create_async()
            .await;

        let client = RestTableClient::new(server.url(), "test-key").unwrap();
        let rows: Vec<PhaseRow> = client
            .fetch_rows_before("phase", "ts", datetime!(2024-03-26 00:00:00))
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].device, 1);
        assert_eq!(rows[1].device, 2);
        mock.assert_async().await;
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        let client = RestTableClient::new("http://localhost/rest/v1/", "k").unwrap();
        assert_eq!(client.table_url("phase"), "http://localhost/rest/v1/phase");
    }
}
