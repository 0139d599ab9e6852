pub mod connection;
pub mod timeline;
