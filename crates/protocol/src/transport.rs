//! The remote procedure call used to exchange envelopes.

/// Invokes one remote `process` call.
///
/// Implementations own timeouts, retries and connection handling. Dropping the
/// returned future must abandon the call.
#[allow(async_fn_in_trait)]
pub trait Transport: Send + Sync {
    /// Error reported when the call cannot be completed.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends `envelope` (serialized JSON) signed by `signature` (base64) under
    /// `command`, returning the raw response text.
    async fn invoke(
        &self,
        command: &str,
        envelope: &str,
        signature: &str,
    ) -> Result<String, Self::Error>;
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    type Error = T::Error;

    async fn invoke(
        &self,
        command: &str,
        envelope: &str,
        signature: &str,
    ) -> Result<String, Self::Error> {
        (**self).invoke(command, envelope, signature).await
    }
}
