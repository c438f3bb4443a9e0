//! Credential-scoped connections to the graph engine.
//!
//! Every logical operation opens its own connection with the caller's
//! credentials, uses it for one request and closes it. Nothing is pooled, so
//! one caller's authenticated state never reaches another caller's request.

mod tls;
mod ws;

pub use self::tls::install_crypto_provider;
pub use self::ws::WsConnector;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::protocol::{Request, Response};

/// Username and plaintext password for the engine.
///
/// Lives only for the span of one caller request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Opens connections to the engine.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection authenticated as `credentials`, or anonymously.
    async fn open(
        &self,
        credentials: Option<&Credentials>,
    ) -> Result<Box<dyn Connection>, GatewayError>;

    /// Endpoint this connector talks to, for display.
    fn endpoint(&self) -> &str;
}

/// An open connection.
#[async_trait]
pub trait Connection: Send {
    /// Send one request and collect every response frame up to and including
    /// the terminal one.
    async fn submit(&mut self, request: &Request) -> Result<Vec<Response>, GatewayError>;

    /// Close the connection. Consumes it, so a connection is closed at most once.
    async fn close(self: Box<Self>) -> Result<(), GatewayError>;
}

/// Open a connection, submit `request`, and close the connection again.
///
/// The connection is closed whether or not the submission succeeded. If the
/// returned future is dropped (deadline, sibling failure, panic), the
/// connection is dropped with it and the socket goes away.
pub async fn execute(
    connector: &dyn Connector,
    credentials: Option<&Credentials>,
    request: &Request,
) -> Result<Vec<Response>, GatewayError> {
    let mut connection = connector.open(credentials).await?;
    let result = connection.submit(request).await;
    if let Err(e) = connection.close().await {
        tracing::debug!(error = %e, "error while closing gremlin connection");
    }
    result
}

/// [`execute`] bounded by an optional deadline.
pub async fn execute_with_deadline(
    connector: &dyn Connector,
    credentials: Option<&Credentials>,
    request: &Request,
    deadline: Option<Duration>,
) -> Result<Vec<Response>, GatewayError> {
    match deadline {
        Some(limit) => tokio::time::timeout(limit, execute(connector, credentials, request))
            .await
            .map_err(|_| GatewayError::Timeout(limit))?,
        None => execute(connector, credentials, request).await,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-process connector that records every call.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use serde_json::value::RawValue;
    use serde_json::Value;

    use super::*;
    use crate::protocol::{ResponseResult, ResponseStatus};

    type Handler = dyn Fn(&Request) -> Result<Vec<Response>, GatewayError> + Send + Sync;

    /// Connector whose connections answer through a closure.
    #[derive(Clone)]
    pub struct MockConnector {
        handler: Arc<Handler>,
        pub opened: Arc<AtomicUsize>,
        pub closed: Arc<AtomicUsize>,
        pub requests: Arc<Mutex<Vec<Request>>>,
        pub credentials: Arc<Mutex<Vec<Option<Credentials>>>>,
        open_error: Option<String>,
        delay: Option<Arc<dyn Fn(&Request) -> Duration + Send + Sync>>,
    }

    impl MockConnector {
        pub fn new(
            handler: impl Fn(&Request) -> Result<Vec<Response>, GatewayError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                handler: Arc::new(handler),
                opened: Arc::default(),
                closed: Arc::default(),
                requests: Arc::default(),
                credentials: Arc::default(),
                open_error: None,
                delay: None,
            }
        }

        /// Every query answers with one frame holding `values`.
        pub fn answering(values: Vec<Value>) -> Self {
            Self::new(move |req| Ok(vec![data_frame(req, "g:List", &values)]))
        }

        /// Every open fails with a connection error.
        pub fn refusing(message: &str) -> Self {
            let mut connector = Self::new(|_| Ok(vec![]));
            connector.open_error = Some(message.to_string());
            connector
        }

        pub fn with_delay(
            mut self,
            delay: impl Fn(&Request) -> Duration + Send + Sync + 'static,
        ) -> Self {
            self.delay = Some(Arc::new(delay));
            self
        }

        pub fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }

        pub fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }

        pub fn queries(&self) -> Vec<String> {
            self.requests
                .lock()
                .iter()
                .filter_map(|r| r.gremlin().map(str::to_string))
                .collect()
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn open(
            &self,
            credentials: Option<&Credentials>,
        ) -> Result<Box<dyn Connection>, GatewayError> {
            if let Some(message) = &self.open_error {
                return Err(GatewayError::Connection(message.clone()));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            self.credentials.lock().push(credentials.cloned());
            Ok(Box::new(MockConnection {
                connector: self.clone(),
            }))
        }

        fn endpoint(&self) -> &str {
            "ws://mock/gremlin"
        }
    }

    struct MockConnection {
        connector: MockConnector,
    }

    #[async_trait]
    impl Connection for MockConnection {
        async fn submit(&mut self, request: &Request) -> Result<Vec<Response>, GatewayError> {
            self.connector.requests.lock().push(request.clone());
            if let Some(delay) = &self.connector.delay {
                tokio::time::sleep(delay(request)).await;
            }
            (self.connector.handler)(request)
        }

        async fn close(self: Box<Self>) -> Result<(), GatewayError> {
            self.connector.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// A terminal frame carrying a typed collection.
    pub fn data_frame(request: &Request, r#type: &str, values: &[Value]) -> Response {
        let data = serde_json::json!({"@type": r#type, "@value": values});
        Response {
            request_id: request.id,
            status: ResponseStatus {
                code: 200,
                ..Default::default()
            },
            result: ResponseResult {
                meta: Default::default(),
                data: Some(RawValue::from_string(data.to_string()).expect("valid json")),
            },
        }
    }

    /// A terminal frame without data.
    pub fn no_content(request: &Request) -> Response {
        Response {
            request_id: request.id,
            status: ResponseStatus {
                code: 204,
                ..Default::default()
            },
            result: ResponseResult::default(),
        }
    }
}
