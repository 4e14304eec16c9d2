//! Input rules for registration and profile updates.

use kinship_types::api::RegisterRequest;

use crate::error::ApiError;

const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=32;
const PASSWORD_LEN: std::ops::RangeInclusive<usize> = 8..=128;
const NICKNAME_LEN: std::ops::RangeInclusive<usize> = 2..=32;
pub const MAX_REQUEST_MESSAGE_LEN: usize = 200;

fn invalid(msg: &str) -> ApiError {
    ApiError::Validation(msg.to_string())
}

pub fn username(username: &str) -> Result<(), ApiError> {
    if !USERNAME_LEN.contains(&username.len()) {
        return Err(invalid("username must be 3 to 32 characters"));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("username may only contain letters, digits and '_'"));
    }
    Ok(())
}

pub fn password(password: &str) -> Result<(), ApiError> {
    if !PASSWORD_LEN.contains(&password.chars().count()) {
        return Err(invalid("password must be 8 to 128 characters"));
    }
    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_letter && has_digit) {
        return Err(invalid("password must contain a letter and a digit"));
    }
    Ok(())
}

pub fn nickname(nickname: &str) -> Result<(), ApiError> {
    if nickname.trim().is_empty() || !NICKNAME_LEN.contains(&nickname.chars().count()) {
        return Err(invalid("nickname must be 2 to 32 characters"));
    }
    Ok(())
}

pub fn email(email: &str) -> Result<(), ApiError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|part| !part.is_empty())
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(invalid("email address is not valid"));
    }
    Ok(())
}

pub fn registration(req: &RegisterRequest) -> Result<(), ApiError> {
    username(&req.username)?;
    password(&req.password)?;
    if req.password != req.check_password {
        return Err(invalid("passwords do not match"));
    }
    nickname(&req.nickname)?;
    email(&req.email)?;
    Ok(())
}

pub fn request_message(message: Option<&str>) -> Result<(), ApiError> {
    match message {
        Some(m) if m.chars().count() > MAX_REQUEST_MESSAGE_LEN => {
            Err(invalid("friend request message is too long"))
        }
        _ => Ok(()),
    }
}
