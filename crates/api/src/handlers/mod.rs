pub mod admin;
pub mod extensions;
pub mod sessions;
pub mod tasks;
pub mod workers;
