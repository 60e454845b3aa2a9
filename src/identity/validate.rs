//! Local input validation
//!
//! Fail fast: malformed input never costs a network round trip.

use super::session::Registration;
use crate::error::ValidationError;

pub(crate) const MIN_PASSWORD_LEN: usize = 8;
const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 24;
const AGE_MIN: u8 = 13;
const AGE_MAX: u8 = 120;

pub(crate) fn login_input(email: &str, password: &str) -> Result<(), ValidationError> {
    if email.trim().is_empty() {
        return Err(ValidationError::EmptyEmail);
    }
    if password.is_empty() {
        return Err(ValidationError::EmptyPassword);
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

pub(crate) fn registration_input(profile: &Registration) -> Result<(), ValidationError> {
    login_input(&profile.email, &profile.password)?;

    let username_len = profile.username.trim().chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&username_len) {
        return Err(ValidationError::UsernameLength {
            min: USERNAME_MIN,
            max: USERNAME_MAX,
        });
    }
    if !(AGE_MIN..=AGE_MAX).contains(&profile.age) {
        return Err(ValidationError::AgeOutOfRange {
            min: AGE_MIN,
            max: AGE_MAX,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration() -> Registration {
        Registration {
            email: "allrounder@example.com".into(),
            password: "secret-12".into(),
            username: "allrounder".into(),
            age: 27,
        }
    }

    #[test]
    fn test_login_input() {
        assert!(login_input("a@b.com", "secret-12").is_ok());
        assert_eq!(login_input("", "secret-12"), Err(ValidationError::EmptyEmail));
        assert_eq!(login_input("a@b.com", ""), Err(ValidationError::EmptyPassword));
        assert_eq!(
            login_input("a@b.com", "short"),
            Err(ValidationError::PasswordTooShort { min: 8 })
        );
    }

    #[test]
    fn test_registration_input() {
        assert!(registration_input(&registration()).is_ok());

        let mut short_name = registration();
        short_name.username = "ab".into();
        assert_eq!(
            registration_input(&short_name),
            Err(ValidationError::UsernameLength { min: 3, max: 24 })
        );

        let mut too_young = registration();
        too_young.age = 12;
        assert_eq!(
            registration_input(&too_young),
            Err(ValidationError::AgeOutOfRange { min: 13, max: 120 })
        );
    }
}
