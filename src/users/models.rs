use crypto::pbkdf2::*;
use crypto::sha2::Sha256;
use diesel::prelude::*;
use jwt::{Header, Registered, Token};
use std::borrow::Cow;
use std::env;
use std::io::Result as IoResult;

use crate::db::schema::users;
use crate::profile::Profile;
use crate::types::{ApiError, ValidationError};

#[derive(Debug, Queryable, Identifiable, AsChangeset)]
#[table_name = "users"]
pub struct User {
    pub id: i32,
    pub username: String,
    pub password: String,
    pub email: String,
    pub bio: Option<String>,
    pub image: Option<String>,
}

fn jwt_secret() -> Result<String, ApiError> {
    env::var("JWT_SECRET").map_err(|_| ApiError::Internal)
}

impl User {
    pub fn make_password(password: &str) -> IoResult<String> {
        pbkdf2_simple(password, 1000)
    }

    pub fn new_password(&mut self, password: &str) -> IoResult<()> {
        self.password = pbkdf2_simple(password, 1000)?;
        Ok(())
    }

    pub fn verify_password(&self, password_to_verify: &str) -> Result<bool, ApiError> {
        let check = pbkdf2_check(password_to_verify, &self.password);
        check.map_err(|_| ApiError::Internal)
    }

    pub fn token(&self) -> Result<String, ApiError> {
        let header = Header::default();
        let claims = Registered {
            iss: Some(self.email.clone()),
            sub: Some(self.id.to_string()),
            ..Default::default()
        };
        let token = Token::new(header, claims);
        token
            .signed(jwt_secret()?.as_bytes(), Sha256::new())
            .map_err(|_| ApiError::Internal)
    }

    pub fn load_from_token(jwt_token: &str, connection: &PgConnection) -> Result<User, ApiError> {
        use crate::db::schema::users::dsl::*;
        let jwt_token = Token::<Header, Registered>::parse(jwt_token)
            .map_err(|_| ValidationError::from("token", "Invalid jwt token"))?;

        if !jwt_token.verify(jwt_secret()?.as_bytes(), Sha256::new()) {
            return Err(ValidationError::from("token", "Invalid jwt token").into());
        }

        let claims = &jwt_token.claims;
        match (&claims.sub, &claims.iss) {
            (&Some(ref user_id), &Some(ref user_email)) => {
                let user_id = user_id.parse::<i32>().map_err(|_| {
                    ApiError::Validation(ValidationError::from("token", "Invalid jwt token"))
                })?;

                let user = users
                    .filter(id.eq(user_id))
                    .filter(email.eq(user_email))
                    .get_result::<User>(connection)?;
                Ok(user)
            }
            _ => Err(ValidationError::from("token", "Invalid jwt token").into()),
        }
    }

    pub fn load_by_name(name: &str, connection: &PgConnection) -> Result<User, ApiError> {
        use crate::db::schema::users::dsl::*;
        users
            .filter(username.eq(&name))
            .get_result::<User>(connection)
            .map_err(|e| e.into())
    }

    pub fn into_profile(self, following: bool) -> Profile<'static> {
        Profile {
            username: Cow::Owned(self.username),
            bio: self.bio.map(Cow::Owned),
            image: self.image.map(Cow::Owned),
            following,
        }
    }
}

#[derive(Insertable)]
#[table_name = "users"]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub email: String,
}
