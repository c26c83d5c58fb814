pub mod chat_service;
pub mod connection;
pub mod session;
