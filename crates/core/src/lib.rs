pub mod aggregate;
pub mod citation;
pub mod config;
pub mod decode;
pub mod error;
pub mod session;
pub mod transcript;

pub use aggregate::{apply, apply_all};
pub use config::Config;
pub use decode::{decode, DecodedEvent};
pub use error::DecodeError;
pub use session::SessionId;
pub use transcript::{Author, Transcript, Turn};
