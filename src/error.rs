#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Not enough bytes")]
    NotEnoughData {
        /// Number of bytes we got
        actual: usize,
        /// Minimum number of expected bytes
        minimum: usize,
    },

    /// Bit range does not fit within its container.
    #[error("invalid bit range {start}..={stop} for a {width} bit container")]
    InvalidBitRange { start: u16, stop: u16, width: u16 },

    /// A conversion could not be applied to a raw value.
    #[error("conversion {name} failed: {reason}")]
    ConversionFailed { name: String, reason: String },

    #[error("timecode {0:#x} is out of range")]
    InvalidTimecode(u64),

    /// Both frame slots of the swap fixer are in use; this is a logic error, not bad input.
    #[error("no free frame buffers")]
    NoFreeFrameBuffers,

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
