pub mod login_with_code;
pub mod login_with_creds;
