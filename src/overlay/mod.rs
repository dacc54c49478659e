pub(crate) mod applicator;
pub(crate) mod floating;
