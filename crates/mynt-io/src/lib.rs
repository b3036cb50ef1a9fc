//! Sequential I/O coordinators over a fixed scratch buffer.
//!
//! This is the core value-add layer of mynt. Each direction of a connection
//! owns one fixed-capacity scratch buffer and a coordinator that turns typed
//! requests into as few transport operations as possible:
//! - skip N bytes
//! - fill a byte slice or the spare capacity of a `BytesMut`
//! - decode or encode a 1/2/4/8-byte big-endian number
//!
//! Requests already covered by buffered bytes complete without touching the
//! transport. At most one request is in flight per direction.

pub mod buffer;
pub mod error;
mod inflight;
pub mod number;
pub mod reader;
pub mod writer;

pub use buffer::{BufferPool, ScratchBuffer, DEFAULT_BUFFER_SIZE, MIN_BUFFER_SIZE};
pub use error::{IoError, Result};
pub use number::Number;
pub use reader::{ReadCoordinator, Reader};
pub use writer::{WeakWriter, WriteCoordinator, Writer};
