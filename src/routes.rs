use crate::database::{FilmDb, Store, UserDb};
use crate::error::Error;
use crate::friendship::FriendshipDb;
use crate::model::{Film, User};
use crate::popularity::LikeDb;
use actix_web::error::InternalError;
use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use log::error;
use serde::{Deserialize, Serialize};

type Db = web::Data<Store>;
type Response = Result<HttpResponse, Error>;

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidState(_) => StatusCode::CONFLICT,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Storage(_) | Error::Encoding(_) | Error::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("{:?}", self);
            "Internal server error".to_owned()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(ErrorResponse { error: message })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        let body = ErrorResponse {
            error: err.to_string(),
        };
        InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
    }))
    .service(
        web::scope("/films")
            .route("", web::get().to(list_films))
            .route("", web::post().to(create_film))
            .route("", web::put().to(update_film))
            .route("/popular", web::get().to(popular))
            .route("/{id}", web::get().to(get_film))
            .route("/{id}", web::delete().to(delete_film))
            .route("/{id}/like/{user_id}", web::put().to(add_like))
            .route("/{id}/like/{user_id}", web::delete().to(remove_like))
            .route("/{id}/genres/{genre_id}", web::put().to(add_genre))
            .route("/{id}/genres/{genre_id}", web::delete().to(remove_genre)),
    )
    .service(
        web::scope("/users")
            .route("", web::get().to(list_users))
            .route("", web::post().to(create_user))
            .route("", web::put().to(update_user))
            .route("/{id}", web::get().to(get_user))
            .route("/{id}", web::delete().to(delete_user))
            .route("/{id}/friends", web::get().to(friends))
            .route("/{id}/friends/requests", web::get().to(friend_requests))
            .route("/{id}/friends/common/{other_id}", web::get().to(common_friends))
            .route("/{id}/friends/{friend_id}", web::put().to(request_friend))
            .route("/{id}/friends/{friend_id}", web::delete().to(remove_friend))
            .route("/{id}/friends/{friend_id}/confirm", web::put().to(confirm_friend)),
    )
    .route("/genres", web::get().to(list_genres))
    .route("/genres/{id}", web::get().to(get_genre))
    .route("/mpa", web::get().to(list_mpa))
    .route("/mpa/{id}", web::get().to(get_mpa));
}

async fn list_films(db: Db) -> Response {
    Ok(HttpResponse::Ok().json(db.list_films()?))
}

async fn create_film(db: Db, film: web::Json<Film>) -> Response {
    Ok(HttpResponse::Ok().json(db.add_film(film.into_inner())?))
}

async fn update_film(db: Db, film: web::Json<Film>) -> Response {
    Ok(HttpResponse::Ok().json(db.update_film(film.into_inner())?))
}

async fn get_film(db: Db, id: web::Path<u64>) -> Response {
    Ok(HttpResponse::Ok().json(db.get_film(id.into_inner())?))
}

async fn delete_film(db: Db, id: web::Path<u64>) -> Response {
    db.delete_film(id.into_inner())?;
    Ok(HttpResponse::Ok().finish())
}

#[derive(Deserialize)]
struct PopularParams {
    count: Option<i64>,
}

async fn popular(db: Db, params: web::Query<PopularParams>) -> Response {
    // Zero falls back to the default count.
    Ok(HttpResponse::Ok().json(db.popular(params.count.unwrap_or(0))?))
}

async fn add_like(db: Db, path: web::Path<(u64, u64)>) -> Response {
    let (film_id, user_id) = path.into_inner();
    db.add_like(film_id, user_id)?;
    Ok(HttpResponse::Ok().finish())
}

async fn remove_like(db: Db, path: web::Path<(u64, u64)>) -> Response {
    let (film_id, user_id) = path.into_inner();
    db.remove_like(film_id, user_id)?;
    Ok(HttpResponse::Ok().finish())
}

async fn add_genre(db: Db, path: web::Path<(u64, u32)>) -> Response {
    let (film_id, genre_id) = path.into_inner();
    Ok(HttpResponse::Ok().json(db.add_genre_to_film(film_id, genre_id)?))
}

async fn remove_genre(db: Db, path: web::Path<(u64, u32)>) -> Response {
    let (film_id, genre_id) = path.into_inner();
    Ok(HttpResponse::Ok().json(db.remove_genre_from_film(film_id, genre_id)?))
}

async fn list_users(db: Db) -> Response {
    Ok(HttpResponse::Ok().json(db.list_users()?))
}

async fn create_user(db: Db, user: web::Json<User>) -> Response {
    Ok(HttpResponse::Ok().json(db.add_user(user.into_inner())?))
}

async fn update_user(db: Db, user: web::Json<User>) -> Response {
    Ok(HttpResponse::Ok().json(db.update_user(user.into_inner())?))
}

async fn get_user(db: Db, id: web::Path<u64>) -> Response {
    Ok(HttpResponse::Ok().json(db.get_user(id.into_inner())?))
}

async fn delete_user(db: Db, id: web::Path<u64>) -> Response {
    db.delete_user(id.into_inner())?;
    Ok(HttpResponse::Ok().finish())
}

async fn friends(db: Db, id: web::Path<u64>) -> Response {
    Ok(HttpResponse::Ok().json(db.friends_of(id.into_inner())?))
}

async fn friend_requests(db: Db, id: web::Path<u64>) -> Response {
    Ok(HttpResponse::Ok().json(db.pending_requests_for(id.into_inner())?))
}

async fn common_friends(db: Db, path: web::Path<(u64, u64)>) -> Response {
    let (id, other_id) = path.into_inner();
    Ok(HttpResponse::Ok().json(db.common_friends(id, other_id)?))
}

async fn request_friend(db: Db, path: web::Path<(u64, u64)>) -> Response {
    let (id, friend_id) = path.into_inner();
    db.request_friend(id, friend_id)?;
    Ok(HttpResponse::Ok().finish())
}

async fn confirm_friend(db: Db, path: web::Path<(u64, u64)>) -> Response {
    let (id, friend_id) = path.into_inner();
    db.confirm_friend(id, friend_id)?;
    Ok(HttpResponse::Ok().finish())
}

async fn remove_friend(db: Db, path: web::Path<(u64, u64)>) -> Response {
    let (id, friend_id) = path.into_inner();
    db.remove_friend(id, friend_id)?;
    Ok(HttpResponse::Ok().finish())
}

async fn list_genres(db: Db) -> Response {
    Ok(HttpResponse::Ok().json(db.catalog().genres()))
}

async fn get_genre(db: Db, id: web::Path<u32>) -> Response {
    Ok(HttpResponse::Ok().json(db.catalog().genre(id.into_inner())?))
}

async fn list_mpa(db: Db) -> Response {
    Ok(HttpResponse::Ok().json(db.catalog().mpa_ratings()))
}

async fn get_mpa(db: Db, id: web::Path<u32>) -> Response {
    Ok(HttpResponse::Ok().json(db.catalog().mpa(id.into_inner())?))
}
