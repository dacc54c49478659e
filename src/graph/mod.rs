pub(crate) mod node;
pub(crate) mod snapshot;
