use diesel::insert_into;
use diesel::prelude::*;
use serde::Serialize;
use std::collections::HashMap;

use crate::db::schema::{article_tags, tags};
use crate::db::DbConnection;
use crate::types::{ApiError, ApiResult};

use rocket::serde::json::Json;

/// Canonical form of a free-text tag. Tags are a shared vocabulary, so two
/// spellings that normalize alike must resolve to the same row.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalizes a raw tag list, dropping entries that normalize to nothing and
/// deduplicating while preserving first-occurrence order.
pub fn normalize_all(raw: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        let name = normalize(tag);
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

#[derive(Insertable)]
#[diesel(table_name = tags)]
struct NewTag<'a> {
    name: &'a str,
}

/// Creates any missing tag rows and returns the ids for `names`, in input
/// order. Idempotent: a concurrent duplicate insert resolves to a no-op via
/// the unique constraint, never an error. Tags are never deleted.
pub fn ensure_exist(connection: &mut PgConnection, names: &[String]) -> Result<Vec<i32>, ApiError> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    let rows: Vec<NewTag> = names.iter().map(|name| NewTag { name }).collect();
    insert_into(tags::table)
        .values(&rows)
        .on_conflict(tags::name)
        .do_nothing()
        .execute(connection)?;

    let ids: HashMap<String, i32> = tags::table
        .filter(tags::name.eq_any(names))
        .select((tags::name, tags::id))
        .load::<(String, i32)>(connection)?
        .into_iter()
        .collect();
    Ok(names.iter().filter_map(|name| ids.get(name).copied()).collect())
}

#[derive(Insertable)]
#[diesel(table_name = article_tags)]
struct NewArticleTag {
    article_id: i32,
    tag_id: i32,
}

/// Rewrites the article's tag set wholesale inside one transaction: either
/// all old associations are gone and all new ones present, or the original
/// set is intact. Returns the normalized tag list that was stored.
pub fn replace_associations(
    connection: &mut PgConnection,
    article: i32,
    raw: &[String],
) -> Result<Vec<String>, ApiError> {
    let names = normalize_all(raw);
    connection.transaction::<_, ApiError, _>(|connection| {
        let ids = ensure_exist(connection, &names)?;
        diesel::delete(article_tags::table.filter(article_tags::article_id.eq(article)))
            .execute(connection)?;
        let rows: Vec<NewArticleTag> = ids
            .into_iter()
            .map(|tag_id| NewArticleTag {
                article_id: article,
                tag_id,
            })
            .collect();
        insert_into(article_tags::table)
            .values(&rows)
            .execute(connection)?;
        Ok(names)
    })
}

/// Tag names per article for a page of articles, name-ascending.
pub fn for_articles(
    connection: &mut PgConnection,
    articles: &[i32],
) -> Result<HashMap<i32, Vec<String>>, ApiError> {
    if articles.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = article_tags::table
        .inner_join(tags::table)
        .filter(article_tags::article_id.eq_any(articles))
        .order(tags::name.asc())
        .select((article_tags::article_id, tags::name))
        .load::<(i32, String)>(connection)?;
    let mut map: HashMap<i32, Vec<String>> = HashMap::new();
    for (article, name) in rows {
        map.entry(article).or_default().push(name);
    }
    Ok(map)
}

pub fn find_id(connection: &mut PgConnection, name: &str) -> Result<Option<i32>, ApiError> {
    tags::table
        .filter(tags::name.eq(name))
        .select(tags::id)
        .first::<i32>(connection)
        .optional()
        .map_err(|e| e.into())
}

#[derive(Debug, Serialize)]
pub struct TagsResponse {
    tags: Vec<String>,
}

#[get("/", format = "json")]
pub fn list(mut connection: DbConnection) -> ApiResult<TagsResponse> {
    let tags = tags::table
        .order(tags::name.asc())
        .select(tags::name)
        .load::<String>(&mut *connection)?;
    Ok(Json(TagsResponse { tags }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize(" GO "), "go");
        assert_eq!(normalize("Rust"), "rust");
    }

    #[test]
    fn equivalent_spellings_collapse_to_one_entry() {
        let raw = vec!["Go".to_string(), "go".to_string(), " GO ".to_string()];
        assert_eq!(normalize_all(&raw), vec!["go"]);
    }

    #[test]
    fn first_occurrence_order_is_preserved() {
        let raw = vec![
            "Webdev".to_string(),
            "Rust".to_string(),
            "webdev".to_string(),
        ];
        assert_eq!(normalize_all(&raw), vec!["webdev", "rust"]);
    }

    #[test]
    fn blank_tags_are_dropped() {
        let raw = vec!["  ".to_string(), "".to_string(), "ok".to_string()];
        assert_eq!(normalize_all(&raw), vec!["ok"]);
    }
}
