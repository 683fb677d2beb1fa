pub mod email_port;
pub mod object_store_port;
pub mod user_repository;
