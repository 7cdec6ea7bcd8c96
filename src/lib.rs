//! A RESP2 (REdis Serialization Protocol) codec: a buffered, synchronous
//! reader and writer over arbitrary byte sources and sinks.
//!
//! This crate has no notion of a server, a command table, or key-value
//! storage — it only parses and serializes the wire protocol. [`Reader`]
//! turns a byte stream into command [`Frame`]s (borrowed from a shared
//! [`FramePool`]) or generic [`Value`]s; [`Writer`] turns typed calls into
//! RESP2 bytes.

mod error;
mod frame;
mod parse;
mod reader;
mod value;
mod writer;

pub use error::{ProtocolError, RadishError};
pub use frame::{Frame, PooledFrame};
pub use reader::Reader;
pub use value::{DataType, Value};
pub use writer::Writer;
