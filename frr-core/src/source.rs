//! Race source trait definition

use crate::error::SourceError;
use crate::model::RaceKey;
use futures::future::BoxFuture;

/// Progress callback handed to sources: receives a 0-100 percentage.
/// Sources must only ever report increasing values.
pub type ProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// Trait for providers of race payloads
///
/// Each source is responsible for:
/// - Resolving a `RaceKey` to its own storage location
/// - Transferring the raw JSON text, reporting progress as it goes
///
/// Decoding is left to the caller so every source shares the same
/// sanitize-and-retry policy.
pub trait RaceSource: Send + Sync {
    /// Name used in logs (e.g., "object-storage", "local-api")
    fn name(&self) -> &str;

    /// Fetch the raw payload for `key`
    ///
    /// Returns:
    /// - `Ok(text)` with the complete payload
    /// - `Err(SourceError::NotFound)` when the source has no such race
    /// - `Err(_)` for transport or I/O failures
    fn fetch<'a>(
        &'a self,
        key: RaceKey,
        progress: ProgressFn<'a>,
    ) -> BoxFuture<'a, Result<String, SourceError>>;
}
