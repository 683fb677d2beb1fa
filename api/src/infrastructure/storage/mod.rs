mod core;
mod s3_port_impl;
pub use core::*;
pub mod s3 {
    pub use super::s3_port_impl::*;
}
