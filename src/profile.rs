use rocket::serde::json::Json;
use serde::Serialize;
use std::borrow::Cow;

use crate::db::DbConnection;
use crate::social;
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

#[get("/profiles/<name>", format = "json")]
pub fn profile(
    mut connection: DbConnection,
    current_user: Option<User>,
    name: &str,
) -> ApiResult<ProfileResponse<'static>> {
    let user = User::load_by_name(name, &mut connection)?;
    let following = match current_user {
        Some(current) => social::is_following(&mut connection, current.id, user.id)?,
        None => false,
    };
    Ok(Json(ProfileResponse {
        profile: user.profile(following),
    }))
}

#[post("/profiles/<name>/follow", format = "json")]
pub fn follow(
    mut connection: DbConnection,
    current_user: CurrentUser,
    name: &str,
) -> ApiResult<ProfileResponse<'static>> {
    let current = current_user?;
    // Resolve the target first so a dangling name is a NotFound, not a
    // dangling relation row.
    let target = User::load_by_name(name, &mut connection)?;
    social::follow(&mut connection, current.id, target.id)?;
    Ok(Json(ProfileResponse {
        profile: target.profile(true),
    }))
}

#[delete("/profiles/<name>/follow", format = "json")]
pub fn unfollow(
    mut connection: DbConnection,
    current_user: CurrentUser,
    name: &str,
) -> ApiResult<ProfileResponse<'static>> {
    let current = current_user?;
    let target = User::load_by_name(name, &mut connection)?;
    social::unfollow(&mut connection, current.id, target.id)?;
    Ok(Json(ProfileResponse {
        profile: target.profile(false),
    }))
}
