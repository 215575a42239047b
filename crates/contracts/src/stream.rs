//! StreamBackend / StreamConnection - stream decoding collaborator
//!
//! The capture actors never decode anything themselves; they drive a
//! connection through these two traits. Real decoders, the synthetic
//! test-pattern source and the scripted mock all plug in here.

use crate::{ContractError, ImageData};

/// Opens connections to stream addresses.
///
/// One backend is shared by all actors; every call to `open` must return an
/// independent connection.
///
/// # Example
///
/// ```ignore
/// let backend: Arc<dyn StreamBackend> = Arc::new(SyntheticBackend::new());
/// let mut conn = backend.open("synthetic://front?fps=25")?;
/// if conn.advance() {
///     let image = conn.materialize();
/// }
/// conn.close();
/// ```
pub trait StreamBackend: Send + Sync {
    /// Backend name (used for logging)
    fn name(&self) -> &str;

    /// Open a connection to `address`.
    ///
    /// # Errors
    /// Returns an error when the stream cannot be opened. Callers treat this
    /// as a retryable condition.
    fn open(&self, address: &str) -> Result<Box<dyn StreamConnection>, ContractError>;
}

/// One open stream, exclusively owned by a single actor.
pub trait StreamConnection: Send {
    /// Pull the next unit into the decoder's buffer without a full decode.
    ///
    /// Returns `false` on failure. Must not block for longer than roughly one
    /// source frame interval.
    fn advance(&mut self) -> bool;

    /// Decode the buffered unit into an image.
    fn materialize(&mut self) -> Option<ImageData>;

    /// Release the underlying resources. Idempotent.
    fn close(&mut self);
}
