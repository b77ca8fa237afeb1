pub mod registration;
pub mod releases;
pub mod services;
