pub(crate) mod common;
mod index_tests;
