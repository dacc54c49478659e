pub(crate) mod param_cache;
