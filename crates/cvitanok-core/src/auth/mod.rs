pub mod jwt;
pub mod password;

pub use jwt::{Claims, create_access_token, validate_access_token};
pub use password::{check_password_policy, hash_password, verify_password};
