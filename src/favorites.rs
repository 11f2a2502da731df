use diesel::dsl::{count_star, exists};
use diesel::prelude::*;
use diesel::{insert_into, select};
use std::collections::{HashMap, HashSet};

use crate::db::schema::favorites;
use crate::types::ApiError;

#[derive(Insertable)]
#[diesel(table_name = favorites)]
struct NewFavorite {
    user_id: i32,
    article_id: i32,
}

/// Idempotent add: favoriting twice leaves a single relation row.
pub fn favorite(connection: &mut PgConnection, user: i32, article: i32) -> Result<(), ApiError> {
    insert_into(favorites::table)
        .values(&NewFavorite {
            user_id: user,
            article_id: article,
        })
        .on_conflict((favorites::user_id, favorites::article_id))
        .do_nothing()
        .execute(connection)?;
    Ok(())
}

/// Idempotent remove.
pub fn unfavorite(connection: &mut PgConnection, user: i32, article: i32) -> Result<(), ApiError> {
    diesel::delete(
        favorites::table
            .filter(favorites::user_id.eq(user))
            .filter(favorites::article_id.eq(article)),
    )
    .execute(connection)?;
    Ok(())
}

pub fn is_favorited(
    connection: &mut PgConnection,
    user: i32,
    article: i32,
) -> Result<bool, ApiError> {
    select(exists(
        favorites::table
            .filter(favorites::user_id.eq(user))
            .filter(favorites::article_id.eq(article)),
    ))
    .get_result::<bool>(connection)
    .map_err(|e| e.into())
}

/// Live cardinality of the relation; no cached counter to drift.
pub fn count(connection: &mut PgConnection, article: i32) -> Result<i64, ApiError> {
    favorites::table
        .filter(favorites::article_id.eq(article))
        .count()
        .get_result::<i64>(connection)
        .map_err(|e| e.into())
}

/// Favorite counts for a page of articles. Articles with no favorites are
/// absent from the map.
pub fn counts_for(
    connection: &mut PgConnection,
    articles: &[i32],
) -> Result<HashMap<i32, i64>, ApiError> {
    if articles.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = favorites::table
        .filter(favorites::article_id.eq_any(articles))
        .group_by(favorites::article_id)
        .select((favorites::article_id, count_star()))
        .load::<(i32, i64)>(connection)?;
    Ok(rows.into_iter().collect())
}

/// Which of `articles` has `user` favorited.
pub fn favorited_set(
    connection: &mut PgConnection,
    user: i32,
    articles: &[i32],
) -> Result<HashSet<i32>, ApiError> {
    if articles.is_empty() {
        return Ok(HashSet::new());
    }
    let rows = favorites::table
        .filter(favorites::user_id.eq(user))
        .filter(favorites::article_id.eq_any(articles))
        .select(favorites::article_id)
        .load::<i32>(connection)?;
    Ok(rows.into_iter().collect())
}
