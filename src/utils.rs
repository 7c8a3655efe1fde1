use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::content::Json;
use rocket::response::{Responder, Response};
use serde::Serializer;
use serde_json::{self, Value};

pub fn try_respond(
    req: &Request,
    json: &Value,
    status: Status,
) -> Result<Response<'static>, Status> {
    let as_json = serde_json::to_string(&json);
    match as_json {
        Ok(json) => Json(json)
            .respond_to(req)
            .and_then(|resp| Response::build_from(resp).status(status).ok()),

        Err(_) => Err(Status::InternalServerError),
    }
}

pub fn format_date(date: &NaiveDateTime) -> String {
    DateTime::<Utc>::from_utc(*date, Utc).to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn serialize_date<S>(date: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_date(date))
}
