#![doc = include_str!("../README.md")]

mod error;

pub mod codec;
pub mod decode;
pub mod dictionary;
pub mod framing;
pub mod spacepacket;
pub mod timecode;

pub use error::{Error, Result};

pub(crate) mod prelude {
    pub use crate::error::{Error, Result};
}
