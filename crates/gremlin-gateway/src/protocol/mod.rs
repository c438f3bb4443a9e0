//! Gremlin server wire protocol: message framing, status codes and GraphSON
//! result aggregation.

mod codec;
mod gson;
pub mod status;

pub use codec::{
    Codec, Request, RequestOptions, Response, ResponseResult, ResponseStatus, WireMessage,
    GRAPHSON_MIME_TYPE,
};
pub use gson::GsonResponse;
pub use status::{classify, StatusClass};
