pub mod crash;
pub mod lines;
pub mod profile;
