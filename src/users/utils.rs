use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::select;
use diesel::PgConnection;
use regex::Regex;

use crate::types::{ApiError, ValidationError};

lazy_static! {
    static ref EMAIL_RE: Regex = {
        let pattern = r"\A[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\z";
        Regex::new(pattern).unwrap()
    };
}

pub fn validate_email_re(email: &str) -> Result<(), ValidationError> {
    if !EMAIL_RE.is_match(email) {
        Err(ValidationError::from(
            "email",
            format!("Invalid email: {}", email),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_username_re(username: &str) -> Result<(), ValidationError> {
    if username.len() < 3 {
        Err(ValidationError::from(
            "username",
            format!("username too short: {}", username),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_email(email_to_validate: &str, connection: &PgConnection) -> Result<(), ApiError> {
    use crate::db::schema::users::dsl::*;
    let mut errors = ValidationError::default();
    if !EMAIL_RE.is_match(email_to_validate) {
        errors.add_error("email", format!("Invalid email: {}", email_to_validate));
    }

    let email_exists =
        select(exists(users.filter(email.eq(email_to_validate)))).get_result::<bool>(connection)?;
    if email_exists {
        errors.add_error("email", "Email already exists");
    }
    if errors.len() > 0 {
        Err(errors.into())
    } else {
        Ok(())
    }
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.len() < 5 {
        let e = ValidationError::from("password", "Password too short");
        Err(e)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(validate_email_re("bob@example.com").is_ok());
        assert!(validate_email_re("a.b-c@mail.co").is_ok());
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(validate_email_re("not-an-email").is_err());
        assert!(validate_email_re("@example.com").is_err());
        assert!(validate_email_re("bob@").is_err());
    }

    #[test]
    fn password_and_username_length_floors() {
        assert!(validate_password("1234").is_err());
        assert!(validate_password("12345").is_ok());
        assert!(validate_username_re("al").is_err());
        assert!(validate_username_re("alice").is_ok());
    }
}
