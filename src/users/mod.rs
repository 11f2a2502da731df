use diesel::dsl::exists;
use diesel::insert_into;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::{select, update as diesel_update};
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};
use rocket::serde::json::Json;
use serde::Deserialize;

pub mod models;
mod utils;

use self::utils::*;
use crate::db::schema::users;
use crate::db::DbConnection;
use crate::types::{ApiError, ApiResult, Validate, ValidationError};
use models::{NewUser, User, UserView};

pub type CurrentUser = Result<User, ApiError>;

#[derive(Debug, serde::Serialize)]
pub struct UserResponse {
    user: UserView,
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
    fn validate(self, connection: &mut PgConnection) -> Result<Self, Self::Error> {
        let mut errors = ValidationError::default();

        match validate_email(&self.user.email, connection) {
            Ok(()) => {}
            Err(ApiError::Validation(e)) => errors.merge(e),
            Err(other) => return Err(other),
        }

        if let Err(e) = validate_username_re(&self.user.username) {
            errors.merge(e);
        }

        if let Err(e) = validate_password(&self.user.password) {
            errors.merge(e);
        }

        let username_exists = select(exists(
            users::table.filter(users::username.eq(&self.user.username)),
        ))
        .get_result::<bool>(connection)?;
        if username_exists {
            errors.add_error("username", "username already exists");
        }

        errors.into_result()?;
        Ok(self)
    }
}

/// Inserts a new account row. A registration race on username or email
/// surfaces as `Conflict` via the unique constraints.
pub fn create_user(
    connection: &mut PgConnection,
    username: &str,
    email: &str,
    password: &str,
) -> Result<User, ApiError> {
    let new_user = NewUser {
        username,
        email,
        password_hash: User::make_password(password)?,
    };
    insert_into(users::table)
        .values(&new_user)
        .get_result::<User>(connection)
        .map_err(|e| match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => ApiError::Conflict,
            other => other.into(),
        })
}

#[post("/", format = "json", data = "<registration>")]
pub fn register(
    mut connection: DbConnection,
    registration: Json<Registration>,
) -> ApiResult<UserResponse> {
    let registration = registration.validate(&mut connection)?.into_inner();
    let user = create_user(
        &mut connection,
        &registration.user.username,
        &registration.user.email,
        &registration.user.password,
    )?;
    Ok(Json(UserResponse { user: user.view()? }))
}

#[derive(Debug, Deserialize)]
struct LoginDetails {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct Login {
    user: LoginDetails,
}

fn invalid_credentials() -> ApiError {
    ValidationError::from("email or password", "is invalid").into()
}

#[post("/login", format = "json", data = "<login>")]
pub fn login(mut connection: DbConnection, login: Json<Login>) -> ApiResult<UserResponse> {
    let user = users::table
        .filter(users::email.eq(&login.user.email))
        .first::<User>(&mut *connection)
        .optional()?
        .ok_or_else(invalid_credentials)?;
    if !user.verify_password(&login.user.password)? {
        return Err(invalid_credentials());
    }
    Ok(Json(UserResponse { user: user.view()? }))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = ApiError;

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let token_header = match request.headers().get_one("Authorization") {
            Some(header) => header,
            None => return Outcome::Error((Status::Unauthorized, ApiError::Unauthenticated)),
        };
        let token = token_header
            .trim_start_matches("Token ")
            .trim_start_matches("Bearer ");

        let mut connection = match request.guard::<DbConnection>().await {
            Outcome::Success(connection) => connection,
            _ => return Outcome::Error((Status::ServiceUnavailable, ApiError::Unavailable)),
        };
        match User::load_from_token(token, &mut connection) {
            Ok(user) => Outcome::Success(user),
            Err(ApiError::Unauthenticated) => {
                Outcome::Error((Status::Unauthorized, ApiError::Unauthenticated))
            }
            Err(e) => Outcome::Error((Status::ServiceUnavailable, e)),
        }
    }
}

#[get("/user", format = "json")]
pub fn current(user: CurrentUser) -> ApiResult<UserResponse> {
    let user = user?;
    Ok(Json(UserResponse { user: user.view()? }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateDetails {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
    bio: Option<String>,
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    user: UpdateDetails,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = users)]
struct UserChanges {
    username: Option<String>,
    email: Option<String>,
    password_hash: Option<String>,
    bio: Option<String>,
    image: Option<String>,
}

impl UserChanges {
    fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
            && self.bio.is_none()
            && self.image.is_none()
    }
}

#[put("/user", format = "json", data = "<update>")]
pub fn update(
    current_user: CurrentUser,
    mut connection: DbConnection,
    update: Json<Update>,
) -> ApiResult<UserResponse> {
    let user = current_user?;
    let update = update.into_inner().user;
    let mut errors = ValidationError::default();
    let mut changes = UserChanges {
        bio: update.bio,
        image: update.image,
        ..UserChanges::default()
    };

    if let Some(new_email) = update.email {
        if let Err(e) = validate_email_re(&new_email) {
            errors.merge(e);
        }
        let expr = users::table
            .filter(users::email.eq(&new_email))
            .filter(users::id.ne(user.id));
        if select(exists(expr)).get_result::<bool>(&mut *connection)? {
            errors.add_error("email", format!("email already chosen: {}", new_email));
        }
        changes.email = Some(new_email);
    }

    if let Some(new_username) = update.username {
        if let Err(e) = validate_username_re(&new_username) {
            errors.merge(e);
        }
        let expr = users::table
            .filter(users::username.eq(&new_username))
            .filter(users::id.ne(user.id));
        if select(exists(expr)).get_result::<bool>(&mut *connection)? {
            errors.add_error(
                "username",
                format!("username already chosen: {}", new_username),
            );
        }
        changes.username = Some(new_username);
    }

    if let Some(new_password) = update.password {
        if let Err(e) = validate_password(&new_password) {
            errors.merge(e);
        }
        changes.password_hash = Some(User::make_password(&new_password)?);
    }

    errors.into_result()?;
    let user = if changes.is_empty() {
        user
    } else {
        diesel_update(users::table.find(user.id))
            .set(&changes)
            .get_result::<User>(&mut *connection)?
    };
    Ok(Json(UserResponse { user: user.view()? }))
}
