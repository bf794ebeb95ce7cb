pub mod analyze;
pub mod extract;
pub mod library;
pub mod status;
