//! Resolves the partial genre and MPA references of a film against the catalog.

use crate::catalog::Catalog;
use crate::error::Result;
use crate::model::{Film, Genre};

/// Replaces `mpa` and `genres` with full catalog records. The genres come back
/// deduplicated and in ascending id order. Unknown ids are `NotFound`.
pub fn enrich_film(catalog: &Catalog, mut film: Film) -> Result<Film> {
    if let Some(mpa) = &film.mpa {
        film.mpa = Some(catalog.mpa(mpa.id)?.clone());
    }
    let mut genres = film
        .genres
        .iter()
        .map(|genre| catalog.genre(genre.id).map(Genre::clone))
        .collect::<Result<Vec<_>>>()?;
    genres.sort_by_key(|genre| genre.id);
    genres.dedup_by_key(|genre| genre.id);
    film.genres = genres;
    Ok(film)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::Mpa;
    use crate::validation::tests::film;

    fn partial_genre(id: u32) -> Genre {
        Genre {
            id,
            name: String::new(),
        }
    }

    #[test]
    fn fills_and_sorts() {
        let catalog = Catalog::default();
        let mut f = film("Heat");
        f.mpa = Some(Mpa {
            id: 4,
            name: String::new(),
            description: String::new(),
        });
        f.genres = vec![partial_genre(6), partial_genre(2), partial_genre(6)];
        let f = enrich_film(&catalog, f).unwrap();
        assert_eq!(f.mpa.unwrap().name, "R");
        assert_eq!(
            f.genres,
            vec![catalog.genre(2).unwrap().clone(), catalog.genre(6).unwrap().clone()]
        );
    }

    #[test]
    fn unknown_ids() {
        let catalog = Catalog::default();
        let mut f = film("Heat");
        f.genres = vec![partial_genre(1), partial_genre(7)];
        assert!(matches!(enrich_film(&catalog, f), Err(Error::NotFound(_))));

        let mut f = film("Heat");
        f.mpa = Some(Mpa {
            id: 6,
            name: String::new(),
            description: String::new(),
        });
        assert!(matches!(enrich_film(&catalog, f), Err(Error::NotFound(_))));
    }

    #[test]
    fn no_references() {
        let f = enrich_film(&Catalog::default(), film("Heat")).unwrap();
        assert_eq!(f.mpa, None);
        assert!(f.genres.is_empty());
    }
}
