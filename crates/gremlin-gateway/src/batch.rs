//! Batched property lookups.
//!
//! A large id list is cut into fixed-size batches. Each batch runs as its own
//! task over its own connection, and the results are stitched back together
//! in input order.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gremlin_gateway_telemetry::{log_query_completed, log_query_failed};
use tokio::task::JoinSet;

use crate::connection::{execute_with_deadline, Connector, Credentials};
use crate::error::GatewayError;
use crate::protocol::{GsonResponse, Request, RequestOptions};

/// Graph element kind addressed by a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Vertex,
    Edge,
}

impl ElementType {
    /// Parse the wire spelling, `V` or `E`.
    pub fn parse(s: &str) -> Result<Self, GatewayError> {
        match s {
            "V" => Ok(Self::Vertex),
            "E" => Ok(Self::Edge),
            other => Err(GatewayError::InvalidElementType(other.to_string())),
        }
    }

    fn step(self) -> &'static str {
        match self {
            Self::Vertex => "V",
            Self::Edge => "E",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.step())
    }
}

/// Contiguous batches over an id list. The last batch may be shorter.
#[derive(Debug, Clone, Copy)]
pub struct BatchPlan<'a> {
    ids: &'a [String],
    batch_size: usize,
}

impl<'a> BatchPlan<'a> {
    pub fn new(ids: &'a [String], batch_size: usize) -> Self {
        Self {
            ids,
            batch_size: batch_size.max(1),
        }
    }

    /// Number of batches.
    pub fn len(&self) -> usize {
        self.ids.len().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn batches(&self) -> impl Iterator<Item = &'a [String]> {
        self.ids.chunks(self.batch_size)
    }
}

/// `g.V('a','b').elementMap()` for one batch of ids.
pub fn element_query(element_type: ElementType, ids: &[String]) -> String {
    let literals = ids
        .iter()
        .map(|id| quote_literal(id))
        .collect::<Vec<_>>()
        .join(",");
    format!("g.{}({}).elementMap()", element_type.step(), literals)
}

/// Single-quoted Groovy string literal.
fn quote_literal(raw: &str) -> String {
    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('\'');
    for c in raw.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            other => quoted.push(other),
        }
    }
    quoted.push('\'');
    quoted
}

/// Runs property lookups as concurrent batches.
#[derive(Clone)]
pub struct BatchQueryExecutor {
    connector: Arc<dyn Connector>,
    options: Arc<RequestOptions>,
    batch_size: usize,
    max_ids: usize,
    deadline: Option<Duration>,
}

impl BatchQueryExecutor {
    pub fn new(
        connector: Arc<dyn Connector>,
        options: Arc<RequestOptions>,
        batch_size: usize,
        batch_count: usize,
    ) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            connector,
            options,
            batch_size,
            max_ids: batch_size.saturating_mul(batch_count),
            deadline: None,
        }
    }

    /// Bound every batch by `deadline`.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Check a lookup without touching the network.
    pub fn validate(&self, element_type: &str, ids: &[String]) -> Result<ElementType, GatewayError> {
        let element_type = ElementType::parse(element_type)?;
        if ids.is_empty() {
            return Err(GatewayError::MissingIds);
        }
        if ids.len() > self.max_ids {
            return Err(GatewayError::TooManyIds {
                requested: ids.len(),
                max: self.max_ids,
            });
        }
        Ok(element_type)
    }

    /// Fetch the properties of every element in `ids`.
    ///
    /// Validation happens before any connection is opened. The first failing
    /// batch aborts the rest.
    pub async fn fetch_elements(
        &self,
        credentials: Option<Credentials>,
        element_type: &str,
        ids: &[String],
    ) -> Result<GsonResponse, GatewayError> {
        let element_type = self.validate(element_type, ids)?;

        let plan = BatchPlan::new(ids, self.batch_size);
        let credentials = credentials.map(Arc::new);
        let started = Instant::now();

        let mut tasks = JoinSet::new();
        for (index, batch) in plan.batches().enumerate() {
            let request = Request::eval(&element_query(element_type, batch), &self.options);
            let connector = Arc::clone(&self.connector);
            let credentials = credentials.clone();
            let deadline = self.deadline;

            tasks.spawn(async move {
                let result = async {
                    let responses = execute_with_deadline(
                        connector.as_ref(),
                        credentials.as_deref(),
                        &request,
                        deadline,
                    )
                    .await?;
                    GsonResponse::from_responses(&responses)
                }
                .await;
                (index, result)
            });
        }

        let mut slots: Vec<Option<GsonResponse>> = (0..plan.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tasks.abort_all();
                    return Err(GatewayError::Transport(format!("batch task failed: {}", e)));
                }
            };
            match result {
                Ok(part) => slots[index] = Some(part),
                Err(source) => {
                    tasks.abort_all();
                    log_query_failed!(
                        element_type = %element_type,
                        batch = index,
                        batches = plan.len(),
                        error = %source,
                        "batch lookup failed"
                    );
                    return Err(GatewayError::PartialBatchFailure {
                        index,
                        source: Box::new(source),
                    });
                }
            }
        }

        let parts = slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| GatewayError::Transport("batch finished without a result".into()))?;
        let merged = merge(parts);

        log_query_completed!(
            element_type = %element_type,
            ids = ids.len(),
            batches = plan.len(),
            results = merged.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch lookup completed"
        );
        Ok(merged)
    }
}

/// Concatenate batch results in index order. The type comes from the first
/// batch that returned anything, so it does not depend on completion order.
fn merge(parts: Vec<GsonResponse>) -> GsonResponse {
    let r#type = parts
        .iter()
        .find(|p| !p.is_empty())
        .or_else(|| parts.iter().find(|p| !p.r#type.is_empty()))
        .map(|p| p.r#type.clone())
        .unwrap_or_default();
    let value = parts.into_iter().flat_map(|p| p.value).collect();
    GsonResponse { r#type, value }
}
