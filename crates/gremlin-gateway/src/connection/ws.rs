//! WebSocket transport to a Gremlin server.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};

use super::{tls, Connection, Connector, Credentials};
use crate::error::GatewayError;
use crate::protocol::{classify, Codec, Request, Response, StatusClass};

/// Opens one WebSocket per call to a Gremlin server endpoint.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    skip_cert_verify: bool,
    codec: Codec,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, skip_cert_verify: bool) -> Self {
        tls::install_crypto_provider();
        Self {
            url: url.into(),
            skip_cert_verify,
            codec: Codec::default(),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(
        &self,
        credentials: Option<&Credentials>,
    ) -> Result<Box<dyn Connection>, GatewayError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| GatewayError::Connection(e.to_string()))?;

        if let Some(credentials) = credentials {
            let basic = STANDARD.encode(format!(
                "{}:{}",
                credentials.username, credentials.password
            ));
            let value = HeaderValue::from_str(&format!("Basic {}", basic))
                .map_err(|e| GatewayError::Connection(e.to_string()))?;
            request.headers_mut().insert(header::AUTHORIZATION, value);
        }

        let connector = tls::connector(self.skip_cert_verify)?;
        let (stream, _response) = connect_async_tls_with_config(request, None, false, connector)
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))?;

        tracing::debug!(url = %self.url, "opened gremlin connection");

        Ok(Box::new(WsConnection {
            stream,
            codec: self.codec.clone(),
            credentials: credentials.cloned(),
        }))
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    codec: Codec,
    credentials: Option<Credentials>,
}

impl WsConnection {
    async fn send(&mut self, request: &Request) -> Result<(), GatewayError> {
        let frame = self.codec.encode_request(request)?;
        self.stream
            .send(Message::binary(frame))
            .await
            .map_err(|e| GatewayError::Transport(format!("failed to send request: {}", e)))
    }

    /// Next response frame, skipping control frames.
    async fn receive(&mut self) -> Result<Response, GatewayError> {
        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    return Err(GatewayError::Transport(format!(
                        "error in read loop: {}",
                        e
                    )))
                }
                None => {
                    return Err(GatewayError::Transport(
                        "connection closed before the response completed".into(),
                    ))
                }
            };

            match message {
                Message::Binary(bytes) => return self.codec.decode_response(&bytes),
                Message::Text(text) => return self.codec.decode_response(text.as_str().as_bytes()),
                Message::Close(frame) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "no reason given".into());
                    return Err(GatewayError::Transport(format!(
                        "connection closed by gremlin server: {}",
                        reason
                    )));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn submit(&mut self, request: &Request) -> Result<Vec<Response>, GatewayError> {
        self.send(request).await?;

        let mut frames = Vec::new();
        let mut challenged = false;

        loop {
            let response = self.receive().await?;
            if response.request_id != request.id {
                tracing::debug!(
                    expected = %request.id,
                    received = %response.request_id,
                    "ignoring response for another request"
                );
                continue;
            }

            match classify(response.status.code) {
                StatusClass::PartialContent => frames.push(response),
                StatusClass::Success | StatusClass::NoContent => {
                    frames.push(response);
                    return Ok(frames);
                }
                StatusClass::Authenticate => {
                    if challenged {
                        return Err(GatewayError::Authentication(
                            "gremlin server repeated the authentication challenge".into(),
                        ));
                    }
                    challenged = true;
                    let answer = match &self.credentials {
                        Some(credentials) => Request::authentication(request.id, credentials),
                        None => {
                            return Err(GatewayError::Authentication(
                                "gremlin server requires credentials".into(),
                            ))
                        }
                    };
                    tracing::debug!(request_id = %request.id, "answering SASL challenge");
                    self.send(&answer).await?;
                }
                StatusClass::ClientError | StatusClass::ServerError | StatusClass::Unknown => {
                    return Err(GatewayError::EngineQuery {
                        status: response.status,
                    });
                }
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<(), GatewayError> {
        let mut this = self;
        match this.stream.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(GatewayError::Transport(e.to_string())),
        }
    }
}
