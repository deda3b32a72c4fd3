use crate::database::{
    film_record, pair_key, put_film_record, require_user, FilmDb, Store, EMPTY,
};
use crate::error::{abort, Error, Result};
use crate::model::Film;
use log::debug;
use sled::transaction::ConflictableTransactionResult;
use sled::Transactional;
use std::collections::BTreeSet;

pub const DEFAULT_POPULAR_COUNT: usize = 10;

/// Orders films by descending like count, ties by ascending id, and keeps the
/// first `count`. A non-positive `count` means [`DEFAULT_POPULAR_COUNT`].
pub fn rank(mut films: Vec<Film>, count: i64) -> Vec<Film> {
    let count = if count <= 0 {
        DEFAULT_POPULAR_COUNT
    } else {
        usize::try_from(count).unwrap_or(usize::MAX)
    };
    films.sort_by(|a, b| {
        b.likes
            .len()
            .cmp(&a.likes.len())
            .then_with(|| a.id.cmp(&b.id))
    });
    films.truncate(count);
    films
}

pub trait LikeDb {
    fn add_like(&self, film_id: u64, user_id: u64) -> Result<()>;
    fn remove_like(&self, film_id: u64, user_id: u64) -> Result<()>;
    fn likes_of(&self, film_id: u64) -> Result<BTreeSet<u64>>;
    fn popular(&self, count: i64) -> Result<Vec<Film>>;
}

/// A like lives in the film's own like set and in `likes_by_user`, both
/// written by the same transaction.
impl LikeDb for Store {
    fn add_like(&self, film_id: u64, user_id: u64) -> Result<()> {
        let trees = (&self.films, &self.users, &self.likes_by_user);
        let added = trees.transaction(
            |(films, users, likes_by_user)| -> ConflictableTransactionResult<bool, Error> {
                let mut record = film_record(films, film_id)?;
                require_user(users, user_id)?;
                if !record.likes.insert(user_id) {
                    return Ok(false);
                }
                put_film_record(films, film_id, &record)?;
                likes_by_user.insert(&pair_key(user_id, film_id)[..], EMPTY)?;
                Ok(true)
            },
        )?;
        if added {
            debug!("User {} liked film {}", user_id, film_id);
        }
        Ok(())
    }

    fn remove_like(&self, film_id: u64, user_id: u64) -> Result<()> {
        let trees = (&self.films, &self.users, &self.likes_by_user);
        trees.transaction(|(films, users, likes_by_user)| {
            let mut record = film_record(films, film_id)?;
            require_user(users, user_id)?;
            if !record.likes.remove(&user_id) {
                return abort(Error::NotFound(format!(
                    "User {} has not liked film {}",
                    user_id, film_id
                )));
            }
            put_film_record(films, film_id, &record)?;
            likes_by_user.remove(&pair_key(user_id, film_id)[..])?;
            Ok(())
        })?;
        debug!("User {} no longer likes film {}", user_id, film_id);
        Ok(())
    }

    fn likes_of(&self, film_id: u64) -> Result<BTreeSet<u64>> {
        Ok(self.get_film(film_id)?.likes)
    }

    fn popular(&self, count: i64) -> Result<Vec<Film>> {
        Ok(rank(self.list_films()?, count))
    }
}
