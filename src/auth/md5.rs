//! MD5 password challenge response

use std::fmt::Write;

/// Response to an `AuthenticationMD5Password` challenge
///
/// `"md5" + hex(md5(hex(md5(password + user)) + salt))`
pub fn md5_password(user: &str, password: &str, salt: &[u8; 4]) -> String {
    let inner = md5::compute(format!("{}{}", password, user).as_bytes());

    let mut outer_input = format!("{:x}", inner).into_bytes();
    outer_input.extend_from_slice(salt);
    let outer = md5::compute(&outer_input);

    let mut result = String::with_capacity(35);
    result.push_str("md5");
    // Writing into a String cannot fail
    let _ = write!(&mut result, "{:x}", outer);
    result
}
