pub mod prelude;

pub mod roles;
pub mod statuses;
pub mod users;
