pub(crate) mod container;
pub(crate) mod stage;
