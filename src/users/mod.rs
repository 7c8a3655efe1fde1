use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::{insert_into, select, update as diesel_update};
use rocket::http::Status;
use rocket::request::{self, FromRequest};
use rocket::{Outcome, Request};
use rocket_contrib::json::Json;
use serde_json::Value;

pub mod models;
mod utils;

use self::utils::*;
use crate::db::DbConnection;
use crate::types::{ApiError, ApiResult, Validate, ValidationError};

/// Required-auth request guard. Handlers that allow anonymous callers take
/// `Option<models::User>` instead.
pub type CurrentUser = Result<models::User, ApiError>;

#[derive(Debug, Serialize)]
struct UserView {
    username: String,
    email: String,
    bio: Option<String>,
    image: Option<String>,
    token: String,
}

impl UserView {
    fn from_user(user: models::User) -> Result<UserView, ApiError> {
        let token = user.token()?;
        Ok(UserView {
            username: user.username,
            email: user.email,
            bio: user.bio,
            image: user.image,
            token,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RegistrationDetails {
    username: String,
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct Registration {
    user: RegistrationDetails,
}

impl Validate for Registration {
    type Error = ApiError;
    fn validate(self, connection: &PgConnection) -> Result<Self, Self::Error> {
        use crate::db::schema::users::dsl::*;
        let mut errors = ValidationError::default();

        match validate_email(&self.user.email, connection) {
            Ok(_) => {}
            Err(ApiError::Validation(e)) => errors.merge(e),
            Err(other) => return Err(other),
        }

        if let Err(e) = validate_username_re(&self.user.username) {
            errors.merge(e);
        }

        if let Err(e) = validate_password(&self.user.password) {
            errors.merge(e);
        }

        let username_exists = select(exists(users.filter(username.eq(&self.user.username))))
            .get_result::<bool>(connection)?;

        if username_exists {
            errors.add_error("username", "username already exists");
        }

        if errors.len() > 0 {
            Err(errors.into())
        } else {
            Ok(self)
        }
    }
}

#[post("/", format = "application/json", data = "<registration>")]
pub fn register(connection: DbConnection, registration: Json<Registration>) -> ApiResult<Value> {
    use crate::db::schema::users::dsl::*;

    let registration = registration.validate(&connection)?;
    let new_user = models::NewUser {
        username: registration.user.username.clone(),
        email: registration.user.email.clone(),
        password: models::User::make_password(&registration.user.password)?,
    };

    let user = insert_into(users)
        .values(&new_user)
        .get_result::<models::User>(&*connection)?;
    let view = UserView::from_user(user)?;
    Ok(Json(json!({ "user": view })))
}

#[derive(Debug, Deserialize)]
struct LoginDetails {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct Login {
    user: LoginDetails,
}

impl<'a, 'r> FromRequest<'a, 'r> for models::User {
    type Error = ApiError;
    fn from_request(request: &'a Request<'r>) -> request::Outcome<Self, Self::Error> {
        let headers = request.headers();
        let token_header = headers.get_one("Authorization");
        if let Some(token_header) = token_header {
            let token = str::replace(token_header, "Token ", "");
            let connection = DbConnection::from_request(request);
            match connection {
                Outcome::Success(connection) => {
                    let user = models::User::load_from_token(&token, &connection);
                    match user {
                        Ok(user) => Outcome::Success(user),
                        Err(e) => match e {
                            // bad token and token-for-nobody both read as
                            // "no valid caller identity"
                            ApiError::Validation(_) | ApiError::NotFound => {
                                Outcome::Failure((Status::Unauthorized, ApiError::Unauthorized))
                            }
                            _ => Outcome::Failure((Status::ServiceUnavailable, ApiError::Internal)),
                        },
                    }
                }
                _ => Outcome::Failure((Status::ServiceUnavailable, ApiError::Internal)),
            }
        } else {
            Outcome::Failure((Status::Unauthorized, ApiError::Unauthorized))
        }
    }
}

#[post("/login", format = "application/json", data = "<login>")]
pub fn login(connection: DbConnection, login: Json<Login>) -> ApiResult<Value> {
    use crate::db::schema::users::dsl::*;
    let user = users
        .filter(email.eq(&login.user.email))
        .first::<models::User>(&*connection)?;
    let password_is_valid = user.verify_password(&login.user.password)?;
    if password_is_valid {
        let view = UserView::from_user(user)?;
        Ok(Json(json!({ "user": view })))
    } else {
        let mut error = ValidationError::default();
        error.add_error("password", "Invalid password");
        Err(error.into())
    }
}

#[get("/user", format = "application/json")]
pub fn current(user: CurrentUser) -> ApiResult<Value> {
    let view = UserView::from_user(user?)?;
    Ok(Json(json!({ "user": view })))
}

// Username is immutable after registration, so it is not a patch field here.
#[derive(Debug, Deserialize)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub password: Option<String>,
    pub image: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub user: UpdateUser,
}

#[put("/user", format = "application/json", data = "<update>")]
pub fn update(
    current_user: CurrentUser,
    connection: DbConnection,
    update: Json<Update>,
) -> ApiResult<Value> {
    use crate::db::schema::users::dsl::*;

    let mut user = current_user?;
    let mut error = ValidationError::default();
    let update = update.into_inner();

    if let Some(new_bio) = update.user.bio {
        user.bio = Some(new_bio);
    }

    if let Some(new_image) = update.user.image {
        user.image = Some(new_image);
    }

    if let Some(new_email) = update.user.email {
        match validate_email_re(&new_email) {
            Err(e) => {
                error.merge(e);
            }
            Ok(_) => {
                user.email = new_email;
            }
        }

        let expr = users.filter(email.eq(&user.email)).filter(id.ne(&user.id));
        let email_exists = select(exists(expr)).get_result::<bool>(&*connection)?;
        if email_exists {
            error.add_error("email", format!("Email already chosen: {}", &user.email));
        }
    }

    if let Some(new_password) = update.user.password {
        match validate_password(&new_password) {
            Err(e) => {
                error.merge(e);
            }
            _ => {
                user.new_password(&new_password)?;
            }
        }
    }

    if !error.empty() {
        Err(error.into())
    } else {
        diesel_update(&user).set(&user).execute(&*connection)?;
        let view = UserView::from_user(user)?;
        Ok(Json(json!({ "user": view })))
    }
}
