pub mod users;
pub mod users_list;
