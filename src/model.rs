use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    #[serde(default)]
    pub id: u64,
    pub email: String,
    pub login: String,
    #[serde(default)]
    pub name: String,
    pub birthday: NaiveDate,
}

/// The part of a user that is persisted in the `users` tree.
#[derive(Serialize, Deserialize, Debug)]
pub struct UserRecord {
    pub email: String,
    pub login: String,
    pub name: String,
    pub birthday: NaiveDate,
}

impl UserRecord {
    pub fn into_user(self, id: u64) -> User {
        User {
            id,
            email: self.email,
            login: self.login,
            name: self.name,
            birthday: self.birthday,
        }
    }
}

impl From<&User> for UserRecord {
    fn from(user: &User) -> Self {
        UserRecord {
            email: user.email.clone(),
            login: user.login.clone(),
            name: user.name.clone(),
            birthday: user.birthday,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Film {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub release_date: NaiveDate,
    pub duration: u32,
    #[serde(default)]
    pub mpa: Option<Mpa>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub likes: BTreeSet<u64>,
}

/// A film as persisted in the `films` tree. Genre ids and likers are part of
/// the record, so a single read always yields a whole film.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FilmRecord {
    pub name: String,
    pub description: String,
    pub release_date: NaiveDate,
    pub duration: u32,
    pub mpa_id: Option<u32>,
    pub genre_ids: BTreeSet<u32>,
    pub likes: BTreeSet<u64>,
}

impl From<&Film> for FilmRecord {
    fn from(film: &Film) -> Self {
        FilmRecord {
            name: film.name.clone(),
            description: film.description.clone(),
            release_date: film.release_date,
            duration: film.duration,
            mpa_id: film.mpa.as_ref().map(|mpa| mpa.id),
            genre_ids: film.genres.iter().map(|genre| genre.id).collect(),
            likes: film.likes.clone(),
        }
    }
}

/// Clients may send `{"id": 2}` only; the name is filled in from the catalog.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Genre {
    pub id: u32,
    #[serde(default)]
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Mpa {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FriendshipStatus {
    Pending,
    Confirmed,
}
