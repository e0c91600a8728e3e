use crate::descriptor::DescriptorParseError;
use thiserror::Error;

/// Errors that can arise purely from this crate's own data, independent of
/// any component crate's I/O — currently just a malformed descriptor. Each
/// component crate still defines its own richer error enum at its own
/// seam (`IndexError`, `StoreError`, ...); this one exists for code that
/// only depends on `facesrec-types` and needs to report a parse failure
/// without pulling in a downstream crate's error type.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid descriptor: {0}")]
    Descriptor(#[from] DescriptorParseError),
}
