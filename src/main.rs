use actix_cors::Cors;
use actix_web::{App, HttpServer};
use std::io;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod database;
mod error;
mod lifecycle;
mod models;
mod routes;

#[actix_web::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let db_uri: String =
        std::env::var("MONGODB_URI").unwrap_or_else(|_| String::from("mongodb://localhost:27017"));

    models::profile::load_keys();
    database::connect(db_uri).await;

    info!("listening on 127.0.0.1:8000");

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(models::profile::ProfileAuthenticationMiddlewareFactory)
            .service(routes::profile::create_profile)
            .service(routes::profile::login)
            .service(routes::profile::get_profiles)
            .service(routes::profile::get_profile)
            .service(routes::report::create_report)
            .service(routes::report::get_reports)
            .service(routes::report::get_report)
            .service(routes::assignment::create_assignment)
            .service(routes::assignment::complete_assignment)
            .service(routes::assignment::review_assignment)
            .service(routes::assignment::resubmit_assignment)
            .service(routes::assignment::get_assignments)
            .service(routes::assignment::get_assignment)
            .service(routes::get_file)
            .service(routes::upload_file)
    })
    .bind(("127.0.0.1", 8000))?
    .run()
    .await
}
