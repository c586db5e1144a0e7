//! Plain-text views for the command line front end.

pub mod settings;
pub mod users;
