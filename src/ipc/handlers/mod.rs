pub mod auth;
pub mod core;
pub mod import;
pub mod lookup;
pub mod students;
pub mod visibility;
