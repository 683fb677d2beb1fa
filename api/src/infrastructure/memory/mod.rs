//! In-process adapters. The mailer backs development setups without an email
//! provider; the repository and object store back the HTTP tests.

mod mailer;
mod objects;
mod users;

pub use mailer::OutboxMailer;
pub use objects::MemoryObjectStore;
pub use users::MemoryUserRepository;
