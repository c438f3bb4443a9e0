//! Framing of Gremlin driver messages.
//!
//! A request on the wire is a one-byte MIME length, the MIME identifier,
//! then the JSON-encoded request body:
//!
//! ```text
//! +-----+----------------------------------+-------------------------------+
//! | len | application/vnd.gremlin-v3.0+json | {"requestId":...,"op":...}    |
//! +-----+----------------------------------+-------------------------------+
//! ```
//!
//! Responses come back as a bare JSON body, one complete message per
//! WebSocket frame.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;
use uuid::Uuid;

use crate::connection::Credentials;
use crate::error::GatewayError;

/// GraphSON 3.0 MIME identifier.
pub const GRAPHSON_MIME_TYPE: &str = "application/vnd.gremlin-v3.0+json";

/// Query language sent with `eval` requests.
const GREMLIN_LANGUAGE: &str = "gremlin-groovy";

/// A request message sent to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "requestId")]
    pub id: Uuid,
    pub op: String,
    pub processor: String,
    pub args: BTreeMap<String, Value>,
}

/// Options forwarded with every evaluated script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Logical traversal source name to physical graph name.
    pub aliases: BTreeMap<String, String>,
    /// Server-side evaluation timeout in milliseconds.
    pub evaluation_timeout_ms: Option<u64>,
}

impl Request {
    /// Build a script evaluation request.
    pub fn eval(query: &str, options: &RequestOptions) -> Self {
        let aliases: serde_json::Map<String, Value> = if options.aliases.is_empty() {
            [("g".to_string(), Value::from("g"))].into_iter().collect()
        } else {
            options
                .aliases
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                .collect()
        };

        let mut args = BTreeMap::new();
        args.insert("gremlin".to_string(), Value::from(query));
        args.insert("language".to_string(), Value::from(GREMLIN_LANGUAGE));
        args.insert("aliases".to_string(), Value::Object(aliases));
        if let Some(timeout) = options.evaluation_timeout_ms {
            args.insert("evaluationTimeout".to_string(), Value::from(timeout));
        }

        Self {
            id: Uuid::new_v4(),
            op: "eval".to_string(),
            processor: String::new(),
            args,
        }
    }

    /// Build the SASL PLAIN answer to a 407 challenge for `request_id`.
    pub fn authentication(request_id: Uuid, credentials: &Credentials) -> Self {
        let mut sasl = Vec::with_capacity(credentials.username.len() + credentials.password.len() + 2);
        sasl.push(0);
        sasl.extend_from_slice(credentials.username.as_bytes());
        sasl.push(0);
        sasl.extend_from_slice(credentials.password.as_bytes());

        let mut args = BTreeMap::new();
        args.insert("sasl".to_string(), Value::from(STANDARD.encode(sasl)));
        args.insert("saslMechanism".to_string(), Value::from("PLAIN"));

        Self {
            id: request_id,
            op: "authentication".to_string(),
            processor: String::new(),
            args,
        }
    }

    /// Script carried by an `eval` request.
    pub fn gremlin(&self) -> Option<&str> {
        self.args.get("gremlin").and_then(Value::as_str)
    }
}

/// Response status block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseStatus {
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

/// Response result block. `data` is kept as raw JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseResult {
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
}

/// A response message received from the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "requestId")]
    pub request_id: Uuid,
    pub status: ResponseStatus,
    #[serde(default)]
    pub result: ResponseResult,
}

/// Wire framing for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage<'a> {
    pub mime_type: &'a [u8],
    pub payload: &'a [u8],
}

impl<'a> WireMessage<'a> {
    /// Split a framed buffer, rejecting a length byte that overruns it.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, GatewayError> {
        let (&len, rest) = bytes
            .split_first()
            .ok_or_else(|| GatewayError::MalformedResponse("empty frame".into()))?;
        let len = len as usize;
        if rest.len() < len {
            return Err(GatewayError::MalformedResponse(format!(
                "mime length {} exceeds frame of {} bytes",
                len,
                rest.len()
            )));
        }
        let (mime_type, payload) = rest.split_at(len);
        Ok(Self { mime_type, payload })
    }
}

/// Encoder/decoder for a given MIME identifier.
#[derive(Debug, Clone)]
pub struct Codec {
    mime_type: String,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            mime_type: GRAPHSON_MIME_TYPE.to_string(),
        }
    }
}

impl Codec {
    /// Codec for a custom MIME identifier.
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
        }
    }

    /// Frame a request.
    pub fn encode_request(&self, request: &Request) -> Result<Vec<u8>, GatewayError> {
        let mime = self.mime_type.as_bytes();
        let mime_len = u8::try_from(mime.len()).map_err(|_| {
            GatewayError::Serialization(format!(
                "mime type is {} bytes, at most 255 fit the length prefix",
                mime.len()
            ))
        })?;

        let body = serde_json::to_vec(request)?;
        let mut frame = Vec::with_capacity(1 + mime.len() + body.len());
        frame.push(mime_len);
        frame.extend_from_slice(mime);
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Decode a response body.
    pub fn decode_response(&self, bytes: &[u8]) -> Result<Response, GatewayError> {
        serde_json::from_slice(bytes).map_err(|e| GatewayError::MalformedResponse(e.to_string()))
    }

    /// Decode a framed request. The MIME identifier must match this codec.
    pub fn decode_request(&self, bytes: &[u8]) -> Result<Request, GatewayError> {
        let message = WireMessage::parse(bytes)?;
        if message.mime_type != self.mime_type.as_bytes() {
            return Err(GatewayError::MalformedResponse(format!(
                "unexpected mime type {:?}",
                String::from_utf8_lossy(message.mime_type)
            )));
        }
        serde_json::from_slice(message.payload)
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))
    }

    /// Encode a response body.
    pub fn encode_response(&self, response: &Response) -> Result<Vec<u8>, GatewayError> {
        Ok(serde_json::to_vec(response)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> Option<Box<RawValue>> {
        Some(RawValue::from_string(value.to_string()).unwrap())
    }

    #[test]
    fn test_encode_request_prefix() {
        let codec = Codec::default();
        let request = Request::eval("g.V().count()", &RequestOptions::default());
        let frame = codec.encode_request(&request).unwrap();

        assert_eq!(frame[0] as usize, GRAPHSON_MIME_TYPE.len());
        assert_eq!(&frame[1..=GRAPHSON_MIME_TYPE.len()], GRAPHSON_MIME_TYPE.as_bytes());

        let body: Value = serde_json::from_slice(&frame[1 + GRAPHSON_MIME_TYPE.len()..]).unwrap();
        assert_eq!(body["requestId"], request.id.to_string());
        assert_eq!(body["op"], "eval");
        assert_eq!(body["processor"], "");
        assert_eq!(body["args"]["gremlin"], "g.V().count()");
        assert_eq!(body["args"]["language"], "gremlin-groovy");
        assert_eq!(body["args"]["aliases"], json!({"g": "g"}));
    }

    #[test]
    fn test_mime_length_tracks_configured_identifier() {
        for mime in ["", "a", "application/json", "application/vnd.gremlin-v1.0+json;types=false"] {
            let codec = Codec::new(mime);
            let frame = codec
                .encode_request(&Request::eval("1", &RequestOptions::default()))
                .unwrap();
            assert_eq!(frame[0] as usize, mime.len());
            assert_eq!(&frame[1..=mime.len()], mime.as_bytes());
        }
    }

    #[test]
    fn test_oversized_mime_rejected() {
        let codec = Codec::new("x".repeat(256));
        let err = codec
            .encode_request(&Request::eval("1", &RequestOptions::default()))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Serialization(_)));
    }

    #[test]
    fn test_empty_args_serialize_as_object() {
        let request = Request {
            id: Uuid::new_v4(),
            op: "close".into(),
            processor: "session".into(),
            args: BTreeMap::new(),
        };
        let frame = Codec::default().encode_request(&request).unwrap();
        let body: Value = serde_json::from_slice(&frame[1 + GRAPHSON_MIME_TYPE.len()..]).unwrap();
        assert_eq!(body["args"], json!({}));
    }

    #[test]
    fn test_eval_forwards_aliases_and_timeout() {
        let options = RequestOptions {
            aliases: [("g".to_string(), "modern".to_string())].into_iter().collect(),
            evaluation_timeout_ms: Some(30_000),
        };
        let request = Request::eval("g.V()", &options);
        assert_eq!(request.args["aliases"], json!({"g": "modern"}));
        assert_eq!(request.args["evaluationTimeout"], json!(30_000));
        assert_eq!(request.gremlin(), Some("g.V()"));
    }

    #[test]
    fn test_authentication_request_is_sasl_plain() {
        let id = Uuid::new_v4();
        let credentials = Credentials::new("alice", "s3cret");
        let request = Request::authentication(id, &credentials);

        assert_eq!(request.id, id);
        assert_eq!(request.op, "authentication");
        assert_eq!(request.args["saslMechanism"], "PLAIN");
        let sasl = STANDARD
            .decode(request.args["sasl"].as_str().unwrap())
            .unwrap();
        assert_eq!(sasl, b"\0alice\0s3cret");
    }

    #[test]
    fn test_request_frame_roundtrip() {
        let codec = Codec::default();
        let request = Request::eval("g.E().limit(1)", &RequestOptions::default());
        let decoded = codec.decode_request(&codec.encode_request(&request).unwrap()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_decode_request_rejects_length_overrun() {
        let mut frame = vec![200u8];
        frame.extend_from_slice(b"short");
        let err = Codec::default().decode_request(&frame).unwrap_err();
        assert!(matches!(err, GatewayError::MalformedResponse(_)));

        let err = Codec::default().decode_request(&[]).unwrap_err();
        assert!(matches!(err, GatewayError::MalformedResponse(_)));
    }

    #[test]
    fn test_decode_request_rejects_mismatched_length() {
        // Length byte one short: the identifier no longer matches.
        let codec = Codec::default();
        let mut frame = codec
            .encode_request(&Request::eval("1", &RequestOptions::default()))
            .unwrap();
        frame[0] -= 1;
        assert!(codec.decode_request(&frame).is_err());
    }

    #[test]
    fn test_response_roundtrip() {
        let codec = Codec::default();
        let data = json!({"@type": "g:List", "@value": [{"@type": "g:Int64", "@value": 6}]});
        let response = Response {
            request_id: Uuid::new_v4(),
            status: ResponseStatus {
                code: 206,
                message: String::new(),
                attributes: BTreeMap::new(),
            },
            result: ResponseResult {
                meta: BTreeMap::new(),
                data: raw(data.clone()),
            },
        };

        let decoded = codec
            .decode_response(&codec.encode_response(&response).unwrap())
            .unwrap();
        assert_eq!(decoded.request_id, response.request_id);
        assert_eq!(decoded.status.code, 206);
        let decoded_data: Value = serde_json::from_str(decoded.result.data.unwrap().get()).unwrap();
        assert_eq!(decoded_data, data);
    }

    #[test]
    fn test_decode_response_requires_uuid() {
        let body = br#"{"requestId":"not-a-uuid","status":{"code":200},"result":{"data":null}}"#;
        let err = Codec::default().decode_response(body).unwrap_err();
        assert!(matches!(err, GatewayError::MalformedResponse(_)));
    }

    #[test]
    fn test_decode_response_tolerates_missing_optional_blocks() {
        let id = Uuid::new_v4();
        let body = format!(r#"{{"requestId":"{id}","status":{{"code":204}}}}"#);
        let response = Codec::default().decode_response(body.as_bytes()).unwrap();
        assert_eq!(response.request_id, id);
        assert_eq!(response.status.code, 204);
        assert!(response.status.message.is_empty());
        assert!(response.result.data.is_none());
    }

    #[test]
    fn test_decode_response_null_data() {
        let id = Uuid::new_v4();
        let body = format!(
            r#"{{"requestId":"{id}","status":{{"code":597,"message":"boom","attributes":{{"exceptions":["x"]}}}},"result":{{"data":null,"meta":{{}}}}}}"#
        );
        let response = Codec::default().decode_response(body.as_bytes()).unwrap();
        assert_eq!(response.status.message, "boom");
        assert_eq!(response.status.attributes["exceptions"], json!(["x"]));
        assert!(response.result.data.is_none());
    }
}
