pub mod mongodb_connection;
pub mod repositories;
