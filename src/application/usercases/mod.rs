pub mod datasets;
pub mod status;
