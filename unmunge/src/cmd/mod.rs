pub mod dump;
pub mod extract;
