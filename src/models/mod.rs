pub mod ban;
pub mod presence;
pub mod relation;
pub mod user;
