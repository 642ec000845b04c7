mod test_metrics;
mod test_obsgen;
mod test_preprocessor;
mod test_utils;

pub(crate) mod common;
