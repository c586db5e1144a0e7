pub mod admin;
pub mod error;
pub mod notify;
pub mod pagination;
pub mod repos;
pub mod settings;
