/// Convenience result type used across the crate.
pub type ComposeResult<T> = Result<T, ComposeError>;

/// Top-level error taxonomy used by engine APIs.
#[derive(thiserror::Error, Debug)]
pub enum ComposeError {
    /// Rejected caller input: absent or already-present stages, wrong child kind,
    /// out-of-range indices, unknown ids.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Programming-contract violation, such as attaching a second floating selection.
    #[error("contract violation: {0}")]
    Contract(String),

    /// Structural impossibility in the node graph (dead node, wrong port, double parent).
    ///
    /// These are integration bugs and are always propagated.
    #[error("graph error: {0}")]
    Graph(String),

    /// Errors when serializing or deserializing configuration.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ComposeError {
    /// Build a [`ComposeError::InvalidArgument`] value.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Build a [`ComposeError::Contract`] value.
    pub fn contract(msg: impl Into<String>) -> Self {
        Self::Contract(msg.into())
    }

    /// Build a [`ComposeError::Graph`] value.
    pub fn graph(msg: impl Into<String>) -> Self {
        Self::Graph(msg.into())
    }

    /// Build a [`ComposeError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
