/// Errors that can occur in the presence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or refused the command.
    #[error("presence store unavailable: {0}")]
    Unavailable(String),
}
