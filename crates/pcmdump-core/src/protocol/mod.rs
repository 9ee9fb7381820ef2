//! Protocol module - the GM VPW diagnostic dialect.

pub mod constants;
pub mod factory;
pub mod message;
pub mod parser;
pub mod response;

pub use message::Message;
pub use parser::{HighSpeedPermission, ProtocolError};
pub use response::{Response, ResponseStatus};
