pub(crate) mod root;
