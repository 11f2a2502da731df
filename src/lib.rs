#[macro_use]
extern crate rocket;

pub mod article;
pub mod auth;
pub mod comment;
pub mod db;
pub mod favorites;
pub mod feed;
pub mod profile;
pub mod slugs;
pub mod social;
pub mod tags;
pub mod types;
pub mod users;
pub mod utils;

use rocket::serde::json::Json;
use rocket::{Build, Request, Rocket};
use serde_json::{json, Value};

#[catch(404)]
fn not_found(_req: &Request) -> Json<Value> {
    Json(json!({
        "errors": { "resource": ["not found"] }
    }))
}

#[catch(422)]
fn unprocessable(_req: &Request) -> Json<Value> {
    Json(json!({
        "errors": { "body": ["unprocessable request"] }
    }))
}

#[catch(500)]
fn internal_error(_req: &Request) -> Json<Value> {
    Json(json!({
        "errors": { "status": ["500 Internal Server Error"] }
    }))
}

pub fn rocket(pool: db::Pool) -> Rocket<Build> {
    rocket::build()
        .manage(pool)
        .mount("/api/users", routes![users::register, users::login])
        .mount("/api", routes![users::current, users::update])
        .mount(
            "/api",
            routes![profile::profile, profile::follow, profile::unfollow],
        )
        .mount("/api/tags", routes![tags::list])
        .mount(
            "/api/articles",
            routes![
                article::list,
                article::feed,
                article::get,
                article::create,
                article::update,
                article::delete,
                article::favorite,
                article::unfavorite,
                comment::add,
                comment::list,
                comment::delete,
            ],
        )
        .register("/", catchers![not_found, unprocessable, internal_error])
}
