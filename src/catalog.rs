//! Fixed genre and MPA rating reference data.

use crate::error::{Error, Result};
use crate::model::{Genre, Mpa};

const GENRES: &[(u32, &str)] = &[
    (1, "Comedy"),
    (2, "Drama"),
    (3, "Cartoon"),
    (4, "Thriller"),
    (5, "Documentary"),
    (6, "Action"),
];

const MPA_RATINGS: &[(u32, &str, &str)] = &[
    (1, "G", "No age restrictions"),
    (2, "PG", "Children are advised to watch with parents"),
    (3, "PG-13", "Not recommended for children under 13"),
    (4, "R", "Under 17 only with an accompanying adult"),
    (5, "NC-17", "No one 17 and under admitted"),
];

/// Read-only lookup over the catalog. Both lists are kept in ascending id order.
#[derive(Debug, Clone)]
pub struct Catalog {
    genres: Vec<Genre>,
    mpa: Vec<Mpa>,
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog {
            genres: GENRES
                .iter()
                .map(|&(id, name)| Genre {
                    id,
                    name: name.to_owned(),
                })
                .collect(),
            mpa: MPA_RATINGS
                .iter()
                .map(|&(id, name, description)| Mpa {
                    id,
                    name: name.to_owned(),
                    description: description.to_owned(),
                })
                .collect(),
        }
    }
}

impl Catalog {
    pub fn genres(&self) -> &[Genre] {
        &self.genres
    }

    pub fn genre(&self, id: u32) -> Result<&Genre> {
        self.genres
            .iter()
            .find(|genre| genre.id == id)
            .ok_or_else(|| Error::NotFound(format!("Genre with id {} not found", id)))
    }

    pub fn mpa_ratings(&self) -> &[Mpa] {
        &self.mpa
    }

    pub fn mpa(&self, id: u32) -> Result<&Mpa> {
        self.mpa
            .iter()
            .find(|mpa| mpa.id == id)
            .ok_or_else(|| Error::NotFound(format!("MPA rating with id {} not found", id)))
    }
}
