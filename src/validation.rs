use crate::error::{Error, Result};
use crate::model::{Film, User};
use chrono::NaiveDate;

pub const MAX_DESCRIPTION_LENGTH: usize = 200;

pub fn min_release_date() -> NaiveDate {
    // First public film screening.
    NaiveDate::from_ymd_opt(1895, 12, 28).unwrap_or(NaiveDate::MIN)
}

fn reject<T>(message: impl Into<String>) -> Result<T> {
    Err(Error::Validation(message.into()))
}

pub fn validate_film(film: &Film) -> Result<()> {
    if film.name.trim().is_empty() {
        return reject("name: must not be blank");
    }
    if film.description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return reject(format!(
            "description: must be at most {} characters",
            MAX_DESCRIPTION_LENGTH
        ));
    }
    if film.release_date < min_release_date() {
        return reject(format!(
            "releaseDate: must not be earlier than {}",
            min_release_date()
        ));
    }
    if film.duration == 0 {
        return reject("duration: must be positive");
    }
    Ok(())
}

pub fn validate_user(user: &User, today: NaiveDate) -> Result<()> {
    if user.email.trim().is_empty() {
        return reject("email: must not be blank");
    }
    if !user.email.contains('@') {
        return reject("email: must contain '@'");
    }
    if user.login.is_empty() {
        return reject("login: must not be blank");
    }
    if user.login.chars().any(char::is_whitespace) {
        return reject("login: must not contain whitespace");
    }
    if user.birthday > today {
        return reject("birthday: must not be in the future");
    }
    Ok(())
}
