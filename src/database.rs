use crate::catalog::Catalog;
use crate::config::Config;
use crate::enrich::enrich_film;
use crate::error::{abort, decode, encode, Error, Result};
use crate::model::*;
use crate::validation::{validate_film, validate_user};
use log::{debug, info};
use sled::transaction::{ConflictableTransactionResult, TransactionalTree};
use sled::Transactional;
use std::convert::TryInto;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

// Big-endian so that tree order is id order.
pub(crate) fn serialize_id(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

pub(crate) fn deserialize_id<V: AsRef<[u8]>>(id: V) -> Result<u64> {
    let bytes: [u8; 8] = id
        .as_ref()
        .try_into()
        .map_err(|_| corrupt("id key must be 8 bytes"))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Key of a directed edge: `from ‖ to`. A prefix scan over `from` yields its edges.
pub(crate) fn pair_key(from: u64, to: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&serialize_id(from));
    key[8..].copy_from_slice(&serialize_id(to));
    key
}

pub(crate) fn split_pair_key<V: AsRef<[u8]>>(key: V) -> Result<(u64, u64)> {
    let key = key.as_ref();
    if key.len() != 16 {
        return Err(corrupt("edge key must be 16 bytes"));
    }
    Ok((deserialize_id(&key[..8])?, deserialize_id(&key[8..])?))
}

fn corrupt(message: &str) -> Error {
    Error::Storage(sled::Error::Unsupported(message.to_owned()))
}

pub(crate) const EMPTY: &[u8] = &[];

const USERS: &[u8] = b"users";
const FILMS: &[u8] = b"films";
const LIKES_BY_USER: &[u8] = b"likes_by_user";
const FRIENDSHIPS: &[u8] = b"friendships";
const FRIENDSHIPS_INCOMING: &[u8] = b"friendships_incoming";
const ID_COUNTERS: &[u8] = b"id_counters";

/// All trees of the application plus the catalog they reference.
#[derive(Clone)]
pub struct Store {
    pub(crate) catalog: Catalog,
    pub(crate) users: sled::Tree,
    pub(crate) films: sled::Tree,
    /// Reverse index of the like sets in `films`: `user ‖ film`.
    pub(crate) likes_by_user: sled::Tree,
    pub(crate) friendships: sled::Tree,
    /// Reverse index of `friendships`: `to ‖ from` with the status of `from → to`.
    pub(crate) friendships_incoming: sled::Tree,
    counters: sled::Tree,
    edges: Arc<RwLock<()>>,
}

pub trait StoreExt {
    fn open_store(&self, catalog: Catalog) -> sled::Result<Store>;
}

impl StoreExt for sled::Db {
    fn open_store(&self, catalog: Catalog) -> sled::Result<Store> {
        Ok(Store {
            catalog,
            users: self.open_tree(USERS)?,
            films: self.open_tree(FILMS)?,
            likes_by_user: self.open_tree(LIKES_BY_USER)?,
            friendships: self.open_tree(FRIENDSHIPS)?,
            friendships_incoming: self.open_tree(FRIENDSHIPS_INCOMING)?,
            counters: self.open_tree(ID_COUNTERS)?,
            edges: Arc::new(RwLock::new(())),
        })
    }
}

/// Opens the database at `db_path`, or a temporary one if no path is configured.
pub fn open_db(config: &Config) -> sled::Result<sled::Db> {
    let sled_config = sled::Config::new().flush_every_ms(config.flush_every_ms);
    match &config.db_path {
        Some(path) => {
            info!("Opening database at {}", path.display());
            sled_config.path(path).open()
        }
        None => {
            info!("No database path configured, using a temporary database");
            sled_config.temporary(true).open()
        }
    }
}

impl Store {
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Each entity kind counts from 1. Ids are never handed out twice by the
    /// same database, even after deletes.
    fn next_id(&self, counter: &[u8]) -> Result<u64> {
        let next = self.counters.update_and_fetch(counter, |old| {
            let last = old
                .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
                .map(u64::from_be_bytes)
                .unwrap_or(0);
            Some(serialize_id(last + 1).to_vec())
        })?;
        deserialize_id(next.ok_or_else(|| corrupt("id counter vanished"))?)
    }

    /// Looks up users by id, skipping ids whose user has been deleted.
    pub(crate) fn users_by_ids<I: IntoIterator<Item = u64>>(&self, ids: I) -> Result<Vec<User>> {
        let mut users = Vec::new();
        for id in ids {
            if let Some(data) = self.users.get(serialize_id(id))? {
                let record: UserRecord = bincode::deserialize(&data)?;
                users.push(record.into_user(id));
            }
        }
        Ok(users)
    }

    /// Shared access to the friendship graph. Every edge writer holds
    /// [`Store::write_edges`], so scans made under one guard see one state.
    pub(crate) fn read_edges(&self) -> RwLockReadGuard<'_, ()> {
        // The lock guards no data, a poisoned one is still usable.
        self.edges.read().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn write_edges(&self) -> RwLockWriteGuard<'_, ()> {
        self.edges.write().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn load_film(&self, id: u64, record: FilmRecord) -> Result<Film> {
        let mpa = record
            .mpa_id
            .map(|mpa_id| self.catalog.mpa(mpa_id).map(Mpa::clone))
            .transpose()?;
        let genres = record
            .genre_ids
            .iter()
            .map(|&genre_id| self.catalog.genre(genre_id).map(Genre::clone))
            .collect::<Result<Vec<_>>>()?;
        Ok(Film {
            id,
            name: record.name,
            description: record.description,
            release_date: record.release_date,
            duration: record.duration,
            mpa,
            genres,
            likes: record.likes,
        })
    }

    /// Removes every friendship edge and like that mentions `user_id`.
    fn sweep_user_edges(&self, user_id: u64) -> Result<()> {
        let _edges = self.write_edges();
        let prefix = serialize_id(user_id);
        let outgoing = self
            .friendships
            .scan_prefix(prefix)
            .keys()
            .map(|key| split_pair_key(key?))
            .collect::<Result<Vec<_>>>()?;
        let incoming = self
            .friendships_incoming
            .scan_prefix(prefix)
            .keys()
            .map(|key| split_pair_key(key?))
            .collect::<Result<Vec<_>>>()?;
        let liked = self
            .likes_by_user
            .scan_prefix(prefix)
            .keys()
            .map(|key| split_pair_key(key?))
            .collect::<Result<Vec<_>>>()?;
        let trees = (
            &self.films,
            &self.likes_by_user,
            &self.friendships,
            &self.friendships_incoming,
        );
        trees.transaction(
            |(films, likes_by_user, friendships, incoming_tree)| -> ConflictableTransactionResult<(), Error> {
                for &(from, to) in outgoing.iter().chain(incoming.iter()) {
                    friendships.remove(&pair_key(from, to)[..])?;
                    friendships.remove(&pair_key(to, from)[..])?;
                    incoming_tree.remove(&pair_key(from, to)[..])?;
                    incoming_tree.remove(&pair_key(to, from)[..])?;
                }
                for &(_, film_id) in liked.iter() {
                    likes_by_user.remove(&pair_key(user_id, film_id)[..])?;
                    if let Some(data) = films.get(serialize_id(film_id))? {
                        let mut record: FilmRecord = decode(&data)?;
                        record.likes.remove(&user_id);
                        put_film_record(films, film_id, &record)?;
                    }
                }
                Ok(())
            },
        )?;
        debug!(
            "Removed {} friendship edges and {} likes of deleted user {}",
            outgoing.len() + incoming.len(),
            liked.len(),
            user_id
        );
        Ok(())
    }
}

pub(crate) fn require_user(
    users: &TransactionalTree,
    id: u64,
) -> ConflictableTransactionResult<(), Error> {
    if users.get(serialize_id(id))?.is_none() {
        return abort(Error::user_not_found(id));
    }
    Ok(())
}

pub(crate) fn film_record(
    films: &TransactionalTree,
    id: u64,
) -> ConflictableTransactionResult<FilmRecord, Error> {
    match films.get(serialize_id(id))? {
        Some(data) => decode(&data),
        None => abort(Error::film_not_found(id)),
    }
}

pub(crate) fn put_film_record(
    films: &TransactionalTree,
    id: u64,
    record: &FilmRecord,
) -> ConflictableTransactionResult<(), Error> {
    films.insert(&serialize_id(id)[..], encode(record)?)?;
    Ok(())
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

/// A blank display name falls back to the login.
fn normalize_name(user: &mut User) {
    if user.name.trim().is_empty() {
        debug!("Using login {} as name", user.login);
        user.name = user.login.clone();
    }
}

pub trait UserDb {
    fn add_user(&self, user: User) -> Result<User>;
    fn update_user(&self, user: User) -> Result<User>;
    fn get_user(&self, id: u64) -> Result<User>;
    fn list_users(&self) -> Result<Vec<User>>;
    fn delete_user(&self, id: u64) -> Result<()>;
}

impl UserDb for Store {
    fn add_user(&self, mut user: User) -> Result<User> {
        validate_user(&user, today())?;
        normalize_name(&mut user);
        user.id = self.next_id(USERS)?;
        self.users.insert(
            serialize_id(user.id),
            bincode::serialize(&UserRecord::from(&user))?,
        )?;
        info!("Added user {} ({})", user.id, user.login);
        Ok(user)
    }

    fn update_user(&self, mut user: User) -> Result<User> {
        validate_user(&user, today())?;
        normalize_name(&mut user);
        let key = serialize_id(user.id);
        let data = bincode::serialize(&UserRecord::from(&user))?;
        self.users.transaction(|users| {
            require_user(users, user.id)?;
            users.insert(&key[..], data.as_slice())?;
            Ok(())
        })?;
        info!("Updated user {}", user.id);
        Ok(user)
    }

    fn get_user(&self, id: u64) -> Result<User> {
        let data = self
            .users
            .get(serialize_id(id))?
            .ok_or_else(|| Error::user_not_found(id))?;
        let record: UserRecord = bincode::deserialize(&data)?;
        Ok(record.into_user(id))
    }

    fn list_users(&self) -> Result<Vec<User>> {
        self.users
            .iter()
            .map(|entry| -> Result<User> {
                let (key, data) = entry?;
                let record: UserRecord = bincode::deserialize(&data)?;
                Ok(record.into_user(deserialize_id(key)?))
            })
            .collect()
    }

    fn delete_user(&self, id: u64) -> Result<()> {
        // Once the record is gone no new edge can reference the user, so the
        // sweep afterwards sees every remaining edge.
        self.users
            .remove(serialize_id(id))?
            .ok_or_else(|| Error::user_not_found(id))?;
        self.sweep_user_edges(id)?;
        info!("Deleted user {}", id);
        Ok(())
    }
}

pub trait FilmDb {
    fn add_film(&self, film: Film) -> Result<Film>;
    fn update_film(&self, film: Film) -> Result<Film>;
    fn get_film(&self, id: u64) -> Result<Film>;
    fn list_films(&self) -> Result<Vec<Film>>;
    fn delete_film(&self, id: u64) -> Result<()>;
    fn add_genre_to_film(&self, film_id: u64, genre_id: u32) -> Result<Film>;
    fn remove_genre_from_film(&self, film_id: u64, genre_id: u32) -> Result<Film>;
}

impl FilmDb for Store {
    fn add_film(&self, film: Film) -> Result<Film> {
        validate_film(&film)?;
        let mut film = enrich_film(&self.catalog, film)?;
        film.id = self.next_id(FILMS)?;
        film.likes.clear();
        self.films.insert(
            serialize_id(film.id),
            bincode::serialize(&FilmRecord::from(&film))?,
        )?;
        info!("Added film {} ({})", film.id, film.name);
        Ok(film)
    }

    fn update_film(&self, film: Film) -> Result<Film> {
        validate_film(&film)?;
        let film = enrich_film(&self.catalog, film)?;
        let update = FilmRecord::from(&film);
        let record = self.films.transaction(
            |films| -> ConflictableTransactionResult<FilmRecord, Error> {
                let mut record = update.clone();
                record.likes = film_record(films, film.id)?.likes;
                put_film_record(films, film.id, &record)?;
                Ok(record)
            },
        )?;
        info!("Updated film {}", film.id);
        self.load_film(film.id, record)
    }

    fn get_film(&self, id: u64) -> Result<Film> {
        let data = self
            .films
            .get(serialize_id(id))?
            .ok_or_else(|| Error::film_not_found(id))?;
        self.load_film(id, bincode::deserialize(&data)?)
    }

    fn list_films(&self) -> Result<Vec<Film>> {
        self.films
            .iter()
            .map(|entry| -> Result<Film> {
                let (key, data) = entry?;
                self.load_film(deserialize_id(key)?, bincode::deserialize(&data)?)
            })
            .collect()
    }

    fn delete_film(&self, id: u64) -> Result<()> {
        let trees = (&self.films, &self.likes_by_user);
        let likes = trees.transaction(
            |(films, likes_by_user)| -> ConflictableTransactionResult<usize, Error> {
                let record = film_record(films, id)?;
                films.remove(&serialize_id(id)[..])?;
                for &user_id in record.likes.iter() {
                    likes_by_user.remove(&pair_key(user_id, id)[..])?;
                }
                Ok(record.likes.len())
            },
        )?;
        info!("Deleted film {} with {} likes", id, likes);
        Ok(())
    }

    fn add_genre_to_film(&self, film_id: u64, genre_id: u32) -> Result<Film> {
        self.catalog.genre(genre_id)?;
        let record = self.films.transaction(
            |films| -> ConflictableTransactionResult<FilmRecord, Error> {
                let mut record = film_record(films, film_id)?;
                if record.genre_ids.insert(genre_id) {
                    put_film_record(films, film_id, &record)?;
                }
                Ok(record)
            },
        )?;
        debug!("Added genre {} to film {}", genre_id, film_id);
        self.load_film(film_id, record)
    }

    fn remove_genre_from_film(&self, film_id: u64, genre_id: u32) -> Result<Film> {
        let record = self.films.transaction(|films| {
            let mut record = film_record(films, film_id)?;
            if !record.genre_ids.remove(&genre_id) {
                return abort(Error::NotFound(format!(
                    "Film {} has no genre with id {}",
                    film_id, genre_id
                )));
            }
            put_film_record(films, film_id, &record)?;
            Ok(record)
        })?;
        debug!("Removed genre {} from film {}", genre_id, film_id);
        self.load_film(film_id, record)
    }
}
