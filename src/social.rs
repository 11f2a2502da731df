use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::{insert_into, select};
use std::collections::HashSet;

use crate::db::schema::follows;
use crate::types::{ApiError, ValidationError};

#[derive(Insertable)]
#[diesel(table_name = follows)]
struct NewFollow {
    follower_id: i32,
    followed_id: i32,
}

/// Records that `actor` follows `target`. Idempotent: re-following resolves
/// to a no-op through the relation's primary key. Self-follows are rejected;
/// callers are expected to have resolved `target` from storage already, so a
/// dangling id cannot reach this point.
pub fn follow(connection: &mut PgConnection, actor: i32, target: i32) -> Result<(), ApiError> {
    if actor == target {
        return Err(ValidationError::from("profile", "cannot follow yourself").into());
    }
    insert_into(follows::table)
        .values(&NewFollow {
            follower_id: actor,
            followed_id: target,
        })
        .on_conflict((follows::follower_id, follows::followed_id))
        .do_nothing()
        .execute(connection)?;
    Ok(())
}

/// Idempotent: unfollowing a user who was never followed is a no-op.
pub fn unfollow(connection: &mut PgConnection, actor: i32, target: i32) -> Result<(), ApiError> {
    diesel::delete(
        follows::table
            .filter(follows::follower_id.eq(actor))
            .filter(follows::followed_id.eq(target)),
    )
    .execute(connection)?;
    Ok(())
}

pub fn is_following(
    connection: &mut PgConnection,
    actor: i32,
    target: i32,
) -> Result<bool, ApiError> {
    select(exists(
        follows::table
            .filter(follows::follower_id.eq(actor))
            .filter(follows::followed_id.eq(target)),
    ))
    .get_result::<bool>(connection)
    .map_err(|e| e.into())
}

/// Outgoing edges of `actor`: the author set that scopes their feed.
pub fn followed_ids(connection: &mut PgConnection, actor: i32) -> Result<Vec<i32>, ApiError> {
    follows::table
        .filter(follows::follower_id.eq(actor))
        .select(follows::followed_id)
        .load::<i32>(connection)
        .map_err(|e| e.into())
}

/// Which of `candidates` does `actor` follow. One query per page of
/// articles or comments instead of one per author.
pub fn followed_among(
    connection: &mut PgConnection,
    actor: i32,
    candidates: &[i32],
) -> Result<HashSet<i32>, ApiError> {
    if candidates.is_empty() {
        return Ok(HashSet::new());
    }
    let rows = follows::table
        .filter(follows::follower_id.eq(actor))
        .filter(follows::followed_id.eq_any(candidates))
        .select(follows::followed_id)
        .load::<i32>(connection)?;
    Ok(rows.into_iter().collect())
}
