#![feature(proc_macro_hygiene, decl_macro)]

#[macro_use]
extern crate rocket;

#[macro_use]
extern crate diesel;

#[macro_use]
extern crate error_chain;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate serde_json;

mod article;
mod comment;
mod db;
mod feed;
mod friends;
mod profile;
mod types;
mod users;
mod utils;

use rocket::response::content;
use rocket::Request;

#[catch(422)]
fn handle_422(_req: &Request) -> content::Json<String> {
    let json = json!({
        "errors": [
            "unprocessable entity"
        ]
    });
    content::Json(json.to_string())
}

#[catch(404)]
fn not_found(_req: &Request) -> content::Json<String> {
    let json = json!({
        "errors": [
            "entity not found"
        ]
    });
    content::Json(json.to_string())
}

fn main() {
    let pool = db::init_pool().expect("Failed to create database pool");
    rocket::ignite()
        .manage(pool)
        .mount("/api/users", routes![users::register, users::login])
        .mount("/api", routes![users::current, users::update])
        .mount(
            "/api",
            routes![
                profile::profile,
                profile::send_friend_request,
                profile::friend_request,
                profile::accept_friend_request,
                profile::unfriend,
            ],
        )
        .mount(
            "/api/articles",
            routes![
                feed::find_all,
                feed::find_feed,
                article::get,
                article::create,
                article::update,
                article::delete,
                article::favorite,
                article::unfavorite,
                comment::add,
                comment::get,
                comment::delete,
            ],
        )
        .register(catchers![not_found, handle_422])
        .launch();
}
