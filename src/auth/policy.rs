use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::auth::error::{AccountError, AccountResult};

pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 100;
pub const EMAIL_MAX_LEN: usize = 254;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@([A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?\.)+[A-Za-z]{2,}$"
    )
    .unwrap();
    static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_.]{3,}$").unwrap();
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= EMAIL_MAX_LEN && EMAIL_RE.is_match(email)
}

pub fn is_valid_username(username: &str) -> bool {
    USERNAME_RE.is_match(username)
}

/// Name of the first password rule `candidate` breaks, if any.
fn password_violation(candidate: &str) -> Option<&'static str> {
    let len = candidate.chars().count();
    if len < PASSWORD_MIN_LEN {
        return Some("too short");
    }
    if len > PASSWORD_MAX_LEN {
        return Some("too long");
    }
    if !candidate.chars().any(|c| c.is_ascii_uppercase()) {
        return Some("missing uppercase letter");
    }
    if !candidate.chars().any(|c| c.is_ascii_lowercase()) {
        return Some("missing lowercase letter");
    }
    if !candidate.chars().any(|c| c.is_ascii_digit()) {
        return Some("missing digit");
    }
    if candidate.chars().any(char::is_whitespace) {
        return Some("contains whitespace");
    }
    None
}

fn is_valid_password(candidate: &str) -> bool {
    password_violation(candidate).is_none()
}

// The rule that failed only goes to the debug log; callers get a generic error.

pub fn validate_password(candidate: &str) -> AccountResult<()> {
    match password_violation(candidate) {
        None => Ok(()),
        Some(rule) => {
            debug!(rule, "password rejected by policy");
            Err(AccountError::Validation)
        }
    }
}

pub fn validate_username(username: &str) -> AccountResult<()> {
    if is_valid_username(username) {
        Ok(())
    } else {
        debug!("username rejected by pattern");
        Err(AccountError::Validation)
    }
}

pub fn validate_email(email: &str) -> AccountResult<()> {
    if is_valid_email(email) {
        Ok(())
    } else {
        debug!("email rejected by pattern");
        Err(AccountError::Validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_password_meeting_every_rule() {
        assert!(is_valid_password("Passw0rd!"));
        assert!(is_valid_password("abcDEF12"));
    }

    #[test]
    fn rejects_each_broken_rule() {
        let long = format!("Aa1{}", "x".repeat(98));
        let cases = [
            "Pa55w0r",         // 7 chars
            long.as_str(),     // 101 chars
            "passw0rd!",       // no uppercase
            "PASSW0RD!",       // no lowercase
            "Password!",       // no digit
            "Passw0rd with",   // whitespace
            "Passw0rd\t",      // tab
        ];
        for case in cases {
            assert!(!is_valid_password(case), "{case:?} should be rejected");
            assert!(matches!(
                validate_password(case),
                Err(AccountError::Validation)
            ));
        }
    }

    #[test]
    fn length_bounds_are_inclusive() {
        assert!(is_valid_password("Abcdef12"));
        let hundred = format!("Aa1{}", "x".repeat(97));
        assert_eq!(hundred.chars().count(), 100);
        assert!(is_valid_password(&hundred));
    }

    #[test]
    fn username_pattern() {
        assert!(is_valid_username("alice_01"));
        assert!(is_valid_username("a.b"));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username("alice-01"));
        assert!(!is_valid_username("alice 01"));
        assert!(!is_valid_username(""));
    }

    #[test]
    fn email_pattern() {
        assert!(is_valid_email("alice@example.com"));
        assert!(!is_valid_email("alice@example"));
        assert!(!is_valid_email("alice.example.com"));
        assert!(!is_valid_email("al ice@example.com"));
    }

    #[test]
    fn email_domain_must_be_well_formed() {
        assert!(is_valid_email("first.last+tag@mail.example.co.uk"));
        assert!(is_valid_email("bob@my-host.io"));
        assert!(!is_valid_email("a@b.c"));
        assert!(!is_valid_email("<x>@y.zz"));
        assert!(!is_valid_email("a@b..cc"));
        assert!(!is_valid_email("a@-b.cc"));
        assert!(!is_valid_email("a@b.c0m"));
    }

    #[test]
    fn email_length_is_capped() {
        let at_limit = format!("{}@example.com", "a".repeat(EMAIL_MAX_LEN - 12));
        assert_eq!(at_limit.len(), EMAIL_MAX_LEN);
        assert!(is_valid_email(&at_limit));
        let over = format!("a{at_limit}");
        assert!(!is_valid_email(&over));
        assert!(matches!(validate_email(&over), Err(AccountError::Validation)));
    }
}
