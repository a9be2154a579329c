use sha2::{Digest, Sha256};

use super::model::User;

/// Digest hexadecimal que se guarda en `users.password_hash`
pub fn password_digest(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

pub fn password_matches(user: &User, password: &str) -> bool {
    user.password_hash == password_digest(password)
}
