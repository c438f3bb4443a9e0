//! Query entry points used by the HTTP layer.

use std::sync::Arc;
use std::time::Instant;

use gremlin_gateway_telemetry::{log_healthcheck, log_query_completed, log_query_failed};

use crate::batch::BatchQueryExecutor;
use crate::config::{GatewayConfig, HEALTHCHECK_QUERY};
use crate::connection::{execute_with_deadline, Connector, Credentials, WsConnector};
use crate::error::GatewayError;
use crate::protocol::{GsonResponse, Request, RequestOptions};

/// Outcome of an engine health check.
#[derive(Debug)]
pub enum Health {
    /// The probe query returned rows.
    Healthy,
    /// The probe succeeded but the graph returned nothing.
    Empty,
    /// The engine could not be queried.
    Unhealthy(GatewayError),
}

impl Health {
    /// Value reported in `GremlinHealthy`.
    pub fn as_status_str(&self) -> &'static str {
        match self {
            Health::Healthy => "OK",
            Health::Empty => "Empty",
            Health::Unhealthy(_) => "Error",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Health::Healthy)
    }

    /// `(healthy, error)`.
    pub fn into_pair(self) -> (bool, Option<GatewayError>) {
        match self {
            Health::Healthy => (true, None),
            Health::Empty => (false, None),
            Health::Unhealthy(e) => (false, Some(e)),
        }
    }
}

/// Single entry point for everything the gateway asks of the engine.
#[derive(Clone)]
pub struct QueryGateway {
    config: Arc<GatewayConfig>,
    connector: Arc<dyn Connector>,
    options: Arc<RequestOptions>,
    batches: BatchQueryExecutor,
}

impl QueryGateway {
    /// Gateway talking WebSocket to the configured endpoint.
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        let connector = WsConnector::new(
            config.engine.url.clone(),
            config.engine.skip_cert_verify,
        );
        Self::with_connector(config, Arc::new(connector))
    }

    pub fn with_connector(config: Arc<GatewayConfig>, connector: Arc<dyn Connector>) -> Self {
        let options = Arc::new(config.engine.request_options());
        let batches = BatchQueryExecutor::new(
            Arc::clone(&connector),
            Arc::clone(&options),
            config.prefetch.batch_size,
            config.prefetch.batch_count,
        )
        .with_deadline(config.engine.request_timeout);

        Self {
            config,
            connector,
            options,
            batches,
        }
    }

    /// Engine endpoint, for display.
    pub fn endpoint(&self) -> &str {
        self.connector.endpoint()
    }

    /// Run one query and merge its result frames.
    pub async fn submit(
        &self,
        credentials: Option<&Credentials>,
        query: &str,
    ) -> Result<GsonResponse, GatewayError> {
        let request = Request::eval(query, &self.options);
        let started = Instant::now();

        let result = async {
            let responses = execute_with_deadline(
                self.connector.as_ref(),
                credentials,
                &request,
                self.config.engine.request_timeout,
            )
            .await?;
            GsonResponse::from_responses(&responses)
        }
        .await;

        match &result {
            Ok(merged) => log_query_completed!(
                request_id = %request.id,
                results = merged.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "query completed"
            ),
            Err(e) => log_query_failed!(
                request_id = %request.id,
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "query failed"
            ),
        }
        result
    }

    /// Probe the engine with a small read.
    pub async fn healthcheck(&self, credentials: Option<&Credentials>) -> Health {
        let health = match self.submit(credentials, HEALTHCHECK_QUERY).await {
            Ok(result) if result.is_empty() => Health::Empty,
            Ok(_) => Health::Healthy,
            Err(e) => Health::Unhealthy(e),
        };
        log_healthcheck!(
            endpoint = %self.endpoint(),
            status = health.as_status_str(),
            "gremlin healthcheck"
        );
        health
    }

    /// Check a login against the engine itself.
    pub async fn auth_check(&self, username: &str, password: &str) -> Result<(), GatewayError> {
        let credentials = Credentials::new(username, password);
        let result = self.submit(Some(&credentials), "1").await?;
        if result.len() != 1 {
            return Err(GatewayError::Authentication(format!(
                "probe query returned {} results",
                result.len()
            )));
        }
        Ok(())
    }

    /// Validate a property lookup without running it.
    pub fn validate_lookup(&self, element_type: &str, ids: &[String]) -> Result<(), GatewayError> {
        self.batches.validate(element_type, ids).map(|_| ())
    }

    /// Fetch element properties in batches.
    pub async fn fetch_elements(
        &self,
        credentials: Option<Credentials>,
        element_type: &str,
        ids: &[String],
    ) -> Result<GsonResponse, GatewayError> {
        self.batches
            .fetch_elements(credentials, element_type, ids)
            .await
    }
}
