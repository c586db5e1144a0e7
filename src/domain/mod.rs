pub mod entities;
pub mod error;
pub mod settings;
pub mod types;
