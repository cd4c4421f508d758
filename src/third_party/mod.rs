pub(crate) mod media_fetch;
