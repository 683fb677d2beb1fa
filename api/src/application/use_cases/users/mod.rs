pub mod delete_account;
pub mod invite_user;
pub mod list_users;
pub mod seed_superadmin;
pub mod update_password;
pub mod update_picture;
