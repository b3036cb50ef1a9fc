/// Errors that can occur while serving read or write requests.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// A read was issued while another read is still in flight.
    #[error("read already pending on this connection")]
    ReadPending,

    /// A write was issued while another write is still in flight.
    #[error("write already pending on this connection")]
    WritePending,

    /// The transport reached end of stream while bytes were still required.
    #[error("stream closed with {required} bytes still required")]
    ClosedStream { required: usize },

    /// Any other transport failure, passed through verbatim.
    #[error("transport I/O error: {0}")]
    Transport(#[from] std::io::Error),

    /// The connection was closed, or an in-flight request was abandoned.
    #[error("connection closed")]
    Closed,

    /// The requested range does not fit the caller's slice.
    #[error("range {offset}+{amount} out of bounds for slice of length {len}")]
    OutOfBounds {
        offset: usize,
        amount: usize,
        len: usize,
    },

    /// The scratch buffer cannot hold the widest number.
    #[error("buffer capacity {capacity} below minimum {min}")]
    CapacityTooSmall { capacity: usize, min: usize },
}

impl IoError {
    /// True for the at-most-one-in-flight violations.
    pub fn is_pending(&self) -> bool {
        matches!(self, IoError::ReadPending | IoError::WritePending)
    }

    /// True when the stream or connection is gone for good.
    pub fn is_closed(&self) -> bool {
        matches!(self, IoError::ClosedStream { .. } | IoError::Closed)
    }
}

pub type Result<T> = std::result::Result<T, IoError>;
