//! Protocol-level types shared by the codec and the connection driver.

mod error;
mod limits;

pub use error::{HttpError, ParseError, SendError};
pub use limits::Limits;
