use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::select;
use lazy_static::lazy_static;
use regex::Regex;

use crate::db::schema::users;
use crate::types::{ApiError, ValidationError};

lazy_static! {
    static ref EMAIL_RE: Regex = {
        let pattern = r"\A[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\z";
        Regex::new(pattern).unwrap()
    };
}

const MIN_USERNAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 8;

pub fn validate_email_re(email: &str) -> Result<(), ValidationError> {
    if !EMAIL_RE.is_match(email) {
        Err(ValidationError::from(
            "email",
            format!("invalid email: {}", email),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_username_re(username: &str) -> Result<(), ValidationError> {
    if username.trim().len() < MIN_USERNAME_LEN {
        Err(ValidationError::from(
            "username",
            format!("username too short: {}", username),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.len() < MIN_PASSWORD_LEN {
        Err(ValidationError::from("password", "password too short"))
    } else {
        Ok(())
    }
}

pub fn validate_email(
    email_to_validate: &str,
    connection: &mut PgConnection,
) -> Result<(), ApiError> {
    let mut errors = ValidationError::default();
    if let Err(e) = validate_email_re(email_to_validate) {
        errors.merge(e);
    }

    let email_exists = select(exists(
        users::table.filter(users::email.eq(email_to_validate)),
    ))
    .get_result::<bool>(connection)?;
    if email_exists {
        errors.add_error("email", "email already exists");
    }
    errors.into_result().map_err(|e| e.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(validate_email_re("alice@example.com").is_ok());
        assert!(validate_email_re("a.b+tag@sub.example.io").is_ok());
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(validate_email_re("not-an-email").is_err());
        assert!(validate_email_re("@example.com").is_err());
        assert!(validate_email_re("alice@").is_err());
    }

    #[test]
    fn username_needs_three_characters() {
        assert!(validate_username_re("al").is_err());
        assert!(validate_username_re("  a  ").is_err());
        assert!(validate_username_re("ali").is_ok());
    }

    #[test]
    fn password_needs_eight_characters() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("longenough").is_ok());
    }
}
