//! Gremlin query gateway library.
//!
//! Authenticated HTTP front end for a Gremlin server: per-request engine
//! connections, the driver wire protocol, batched property lookups and error
//! translation. The main entry point is the `gremlin-gateway` binary.

pub mod batch;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod http;
pub mod protocol;
pub mod server;
pub mod translate;

pub use batch::{BatchPlan, BatchQueryExecutor, ElementType};
pub use config::{GatewayArgs, GatewayConfig};
pub use connection::{Connection, Connector, Credentials, WsConnector};
pub use error::GatewayError;
pub use gateway::{Health, QueryGateway};
pub use protocol::GsonResponse;
pub use translate::{translate, TranslatedError};
