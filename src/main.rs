mod catalog;
mod config;
mod database;
mod enrich;
mod error;
mod friendship;
mod model;
mod popularity;
mod routes;
mod validation;

use actix_web::{middleware::Logger, web, App, HttpServer};
use catalog::Catalog;
use config::Config;
use database::StoreExt;
use log::info;
use std::io;

fn io_error<E: std::error::Error + Send + Sync + 'static>(err: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

#[actix_rt::main]
async fn main() -> io::Result<()> {
    let config = Config::load().map_err(io_error)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_filter.as_str()),
    )
    .init();
    info!("Starting filmorate v{}", env!("CARGO_PKG_VERSION"));

    let db = database::open_db(&config).map_err(io_error)?;
    let store = web::Data::new(db.open_store(Catalog::default()).map_err(io_error)?);

    info!("Listening on {}", config.bind);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(store.clone())
            .configure(routes::configure)
    })
    .bind(config.bind.as_str())?
    .run()
    .await
}
