pub mod db;
pub mod models;
pub mod session;
pub mod sheets;
pub mod store;
