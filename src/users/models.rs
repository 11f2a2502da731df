use chrono::{Duration, Utc};
use diesel::prelude::*;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::env;

use crate::db::schema::users;
use crate::profile::Profile;
use crate::types::ApiError;

lazy_static! {
    static ref SECRET: String =
        env::var("SECRET_KEY").unwrap_or_else(|_| "conduit-dev-secret".to_string());
}

const TOKEN_LIFETIME_DAYS: i64 = 60;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i32,
    exp: i64,
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub bio: Option<String>,
    pub image: Option<String>,
}

/// The `user` payload shape: the profile fields plus a fresh token. The
/// password hash never leaves the model.
#[derive(Debug, Serialize)]
pub struct UserView {
    pub email: String,
    pub username: String,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub token: String,
}

impl User {
    pub fn make_password(password: &str) -> Result<String, ApiError> {
        bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|_| ApiError::Internal)
    }

    pub fn verify_password(&self, password_to_verify: &str) -> Result<bool, ApiError> {
        bcrypt::verify(password_to_verify, &self.password_hash).map_err(|_| ApiError::Internal)
    }

    pub fn token(&self) -> Result<String, ApiError> {
        let claims = Claims {
            sub: self.id,
            exp: (Utc::now() + Duration::days(TOKEN_LIFETIME_DAYS)).timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .map_err(|_| ApiError::Internal)
    }

    pub fn load_from_token(
        jwt_token: &str,
        connection: &mut PgConnection,
    ) -> Result<User, ApiError> {
        let data = decode::<Claims>(
            jwt_token,
            &DecodingKey::from_secret(SECRET.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| ApiError::Unauthenticated)?;
        users::table
            .find(data.claims.sub)
            .first::<User>(connection)
            .map_err(|_| ApiError::Unauthenticated)
    }

    pub fn load_by_name(name: &str, connection: &mut PgConnection) -> Result<User, ApiError> {
        users::table
            .filter(users::username.eq(name))
            .first::<User>(connection)
            .map_err(|e| e.into())
    }

    pub fn load_by_id(user_id: i32, connection: &mut PgConnection) -> Result<User, ApiError> {
        users::table
            .find(user_id)
            .first::<User>(connection)
            .map_err(|e| e.into())
    }

    pub fn profile(&self, following: bool) -> Profile<'static> {
        Profile {
            username: Cow::Owned(self.username.clone()),
            bio: self.bio.clone().map(Cow::Owned),
            image: self.image.clone().map(Cow::Owned),
            following,
        }
    }

    pub fn view(&self) -> Result<UserView, ApiError> {
        Ok(UserView {
            email: self.email.clone(),
            username: self.username.clone(),
            bio: self.bio.clone(),
            image: self.image.clone(),
            token: self.token()?,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: String,
}
