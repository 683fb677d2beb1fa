pub mod resend;

pub use resend::ResendEmailPort;
