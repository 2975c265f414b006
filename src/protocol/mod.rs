//! Request/response protocol.
//!
//! Defines the inbound request, the response envelope with its
//! stop-and-render signal, input filtering and socket framing.
//!
//! ## Wire Format
//!
//! Messages are length-prefixed JSON:
//! ```text
//! [4 bytes: length (big-endian u32)][JSON payload]
//! ```

mod filter;
mod request;
mod response;
mod wire;

pub use filter::{FilterKind, InputFilter};
pub use request::{InboundRequest, TOKEN_FIELD};
pub use response::{
    is_valid_jsonp_callback, status_for_code, Envelope, Flow, Halt, Responder, Response,
    ResponseType, ResultOptions, CODE_ERROR, CODE_SUCCESS,
};
pub use wire::{
    decode_json, read_frame, read_frame_with_timeout, write_frame, write_json_with_timeout,
    DEFAULT_MAX_FRAME_SIZE,
};
