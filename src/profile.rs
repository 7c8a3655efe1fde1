use rocket_contrib::json::Json;
use std::borrow::Cow;

use crate::db::{self, DbConnection};
use crate::friends;
use crate::types::ApiResult;
use crate::users::models::User;
use crate::users::CurrentUser;

#[derive(Debug, Serialize)]
pub struct ProfileResponse<'a> {
    profile: Profile<'a>,
}

#[derive(Debug, Serialize)]
pub struct Profile<'a> {
    pub username: Cow<'a, str>,
    pub bio: Option<Cow<'a, str>>,
    pub image: Option<Cow<'a, str>>,
    pub following: bool,
}

#[get("/profiles/<name>", format = "application/json")]
pub fn profile(
    connection: DbConnection,
    current_user: Option<User>,
    name: String,
) -> ApiResult<ProfileResponse<'static>> {
    let user = User::load_by_name(&name, &connection)?;
    let following = match current_user {
        Some(current) => friends::is_following(current.id, user.id, &connection)?,
        None => false,
    };

    Ok(Json(ProfileResponse {
        profile: user.into_profile(following),
    }))
}

#[post("/profiles/<name>/send-friend-request", format = "application/json")]
pub fn send_friend_request(
    connection: DbConnection,
    current_user: CurrentUser,
    name: String,
) -> ApiResult<ProfileResponse<'static>> {
    let current = current_user?;
    let target = User::load_by_name(&name, &connection)?;
    db::with_retry(&connection, |conn| {
        friends::send_request(current.id, target.id, conn)
    })?;

    Ok(Json(ProfileResponse {
        profile: target.into_profile(false),
    }))
}

#[get("/profiles/<name>/friend-request", format = "application/json")]
pub fn friend_request(
    connection: DbConnection,
    current_user: CurrentUser,
    name: String,
) -> ApiResult<ProfileResponse<'static>> {
    let current = current_user?;
    let target = User::load_by_name(&name, &connection)?;
    friends::pending_request(current.id, target.id, &connection)?;

    Ok(Json(ProfileResponse {
        profile: target.into_profile(false),
    }))
}

#[post("/profiles/<name>/accept-friend-request", format = "application/json")]
pub fn accept_friend_request(
    connection: DbConnection,
    current_user: CurrentUser,
    name: String,
) -> ApiResult<ProfileResponse<'static>> {
    let current = current_user?;
    let target = User::load_by_name(&name, &connection)?;
    db::with_retry(&connection, |conn| {
        friends::accept(current.id, target.id, conn)
    })?;

    Ok(Json(ProfileResponse {
        profile: target.into_profile(true),
    }))
}

#[delete("/profiles/<name>/unfriend", format = "application/json")]
pub fn unfriend(
    connection: DbConnection,
    current_user: CurrentUser,
    name: String,
) -> ApiResult<ProfileResponse<'static>> {
    let current = current_user?;
    let target = User::load_by_name(&name, &connection)?;
    db::with_retry(&connection, |conn| {
        friends::unfriend(current.id, target.id, conn)
    })?;

    Ok(Json(ProfileResponse {
        profile: target.into_profile(false),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_wire_shape() {
        let profile = Profile {
            username: Cow::Borrowed("alice"),
            bio: Some(Cow::Borrowed("writes about dragons")),
            image: None,
            following: true,
        };
        let json = serde_json::to_value(&ProfileResponse { profile }).unwrap();
        assert_eq!(
            json,
            json!({
                "profile": {
                    "username": "alice",
                    "bio": "writes about dragons",
                    "image": null,
                    "following": true,
                }
            })
        );
    }
}
