//! Password authentication helpers

mod md5;

pub use self::md5::md5_password;
