pub mod mail;
pub mod passwords;
pub mod tokens;
