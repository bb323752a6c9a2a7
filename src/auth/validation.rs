use super::{AuthError, AuthResult};

const MIN_PASSWORD_LEN: usize = 6;
const MIN_DISPLAY_NAME_LEN: usize = 2;

fn invalid(field: &'static str, message: &str) -> AuthError {
    AuthError::InvalidInput {
        field,
        message: message.to_string(),
    }
}

pub fn validate_email(email: &str) -> AuthResult<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(invalid("email", "Email is required"));
    }
    if !looks_like_email(email) {
        return Err(invalid("email", "Invalid email format"));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> AuthResult<()> {
    if password.trim().is_empty() {
        return Err(invalid("password", "Password is required"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(invalid(
            "password",
            "Password must be at least 6 characters",
        ));
    }
    Ok(())
}

pub fn validate_display_name(name: &str) -> AuthResult<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid("name", "Name is required"));
    }
    if name.chars().count() < MIN_DISPLAY_NAME_LEN {
        return Err(invalid("name", "Name must be at least 2 characters"));
    }
    Ok(())
}

pub fn validate_confirmation(password: &str, confirmation: &str) -> AuthResult<()> {
    if confirmation.trim().is_empty() {
        return Err(invalid("confirmPassword", "Please confirm your password"));
    }
    if password != confirmation {
        return Err(invalid("confirmPassword", "Passwords do not match"));
    }
    Ok(())
}

fn looks_like_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|label| !label.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(result: AuthResult<()>) -> String {
        result.unwrap_err().to_string()
    }

    #[test]
    fn email_rules() {
        assert!(validate_email("runner@example.com").is_ok());
        assert_eq!(message(validate_email("  ")), "Email is required");
        for bad in ["runner", "runner@", "@example.com", "a@b", "a@@b.com", "a b@c.com", "a@b..com"] {
            assert_eq!(message(validate_email(bad)), "Invalid email format", "{bad}");
        }
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("secret").is_ok());
        assert_eq!(message(validate_password("")), "Password is required");
        assert_eq!(
            message(validate_password("12345")),
            "Password must be at least 6 characters"
        );
    }

    #[test]
    fn display_name_rules() {
        assert!(validate_display_name("Jo").is_ok());
        assert_eq!(message(validate_display_name(" ")), "Name is required");
        assert_eq!(
            message(validate_display_name("J")),
            "Name must be at least 2 characters"
        );
    }

    #[test]
    fn confirmation_rules() {
        assert!(validate_confirmation("secret", "secret").is_ok());
        assert_eq!(
            message(validate_confirmation("secret", "")),
            "Please confirm your password"
        );
        assert_eq!(
            message(validate_confirmation("secret", "secreT")),
            "Passwords do not match"
        );
    }
}
