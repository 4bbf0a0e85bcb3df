use phase_client::{domain::PhaseRow, rest::RestTableClient};

use super::upload::{BatchUploadSink, InsertBackend};

/// Upload sink backed by the hosted REST table API.
pub type RestUploadSink = BatchUploadSink<RestTableClient>;

#[async_trait::async_trait]
impl InsertBackend for RestTableClient {
    async fn insert(&self, table: &str, rows: &[PhaseRow]) -> anyhow::Result<()> {
        self.insert_rows(table, rows).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pipeline::{Envelope, PipelineError, Sink},
        retry::RetryPolicy,
    };
    use std::time::{Duration, SystemTime};
    use time::macros::datetime;

    fn row(n: i32) -> Envelope<PhaseRow> {
        Envelope {
            payload: PhaseRow {
                current: Some(1.0),
                voltage: None,
                active_power: None,
                power_factor: None,
                frequency: None,
                total_active_energy: None,
                total_active_returned_energy: None,
                apparent_power: None,
                device: n,
                phase_type: 1,
                ts: datetime!(2024-01-01 00:00:00),
                price_realtime: None,
            },
            received_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn posts_one_request_per_batch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/phase")
            .match_header("apikey", "key")
            .with_status(201)
            .expect(3)
            .create_async()
            .await;

        let client = RestTableClient::new(server.url(), "key").unwrap();
        let sink = RestUploadSink::new(
            client,
            "phase",
            2,
            2,
            RetryPolicy::fixed(1, Duration::ZERO),
        );

        let items: Vec<Result<Envelope<PhaseRow>, PipelineError>> =
            (0..5).map(|n| Ok(row(n))).collect();
        sink.run(futures::stream::iter(items)).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_become_upload_failures() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/phase")
            .with_status(503)
            .with_body("service unavailable")
            .expect(2)
            .create_async()
            .await;

        let client = RestTableClient::new(server.url(), "key").unwrap();
        let sink = RestUploadSink::new(
            client,
            "phase",
            10,
            1,
            RetryPolicy::fixed(2, Duration::from_millis(1)),
        );

        let items: Vec<Result<Envelope<PhaseRow>, PipelineError>> =
            (0..3).map(|n| Ok(row(n))).collect();
        let err = sink.run(futures::stream::iter(items)).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Upload { attempts: 2, .. }
        ));
        mock.assert_async().await;
    }
}
