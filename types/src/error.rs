use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("BABE pre-digest is malformed: {source}")]
    MalformedPreDigest { source: parity_scale_codec::Error },
}
