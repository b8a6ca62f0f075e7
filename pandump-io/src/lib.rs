pub mod capture;
pub mod clock;
pub mod dbc;
pub mod ids;
pub mod link;
pub mod transport;

#[cfg(test)]
mod mock;

use thiserror::Error;

/// Provider of the CAN ids to subscribe to
pub trait IdSource {
    fn name(&self) -> String;
    fn ids(&self) -> Vec<u32>;
}

#[derive(Debug, Error)]
pub enum IdSourceError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot parse DBC {path}: {reason}")]
    Dbc { path: String, reason: String },

    #[error(
        "invalid id '{0}' (expected decimal or 0x-prefixed hex, \
         or a range a-b)"
    )]
    InvalidId(String),

    #[error("empty id range {0}")]
    EmptyRange(String),

    #[error("id range {0} reaches past 0x7ff")]
    RangeOutOfBounds(String),
}
