use chrono::{DateTime, Utc};
use diesel::insert_into;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::{delete as diesel_delete, update as diesel_update};
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::auth::{self, Authored};
use crate::db::schema::{article_tags, articles, comments, favorites};
use crate::db::DbConnection;
use crate::favorites as favorite_index;
use crate::feed::{Filters, Page};
use crate::profile::Profile;
use crate::slugs;
use crate::social;
use crate::tags;
use crate::types::{ApiError, ApiResult, ValidationError};
use crate::users::models::User;
use crate::users::CurrentUser;
use crate::utils::serialize_date;

#[derive(Debug, PartialEq, Queryable, Identifiable)]
#[diesel(table_name = articles)]
pub struct Article {
    pub id: i32,
    pub author_id: i32,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Authored for Article {
    fn author_id(&self) -> i32 {
        self.author_id
    }
}

impl Article {
    pub fn load_by_slug(slug: &str, connection: &mut PgConnection) -> Result<Article, ApiError> {
        articles::table
            .filter(articles::slug.eq(slug))
            .first::<Article>(connection)
            .map_err(|e| e.into())
    }
}

#[derive(Insertable)]
#[diesel(table_name = articles)]
struct NewArticle<'a> {
    author_id: i32,
    slug: &'a str,
    title: &'a str,
    description: &'a str,
    body: &'a str,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleView {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub tag_list: Vec<String>,
    #[serde(serialize_with = "serialize_date")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_date")]
    pub updated_at: DateTime<Utc>,
    pub favorited: bool,
    pub favorites_count: i64,
    pub author: Profile<'static>,
}

#[derive(Debug, Serialize)]
pub struct ArticleResponse {
    article: ArticleView,
}

#[derive(Debug, Serialize)]
pub struct ArticlesResponse {
    articles: Vec<ArticleView>,
    #[serde(rename = "articlesCount")]
    articles_count: i64,
}

/// Assembles the page views with one batch query per concern instead of one
/// query per article.
pub(crate) fn to_views(
    connection: &mut PgConnection,
    rows: Vec<(Article, User)>,
    viewer: Option<&User>,
) -> Result<Vec<ArticleView>, ApiError> {
    let article_ids: Vec<i32> = rows.iter().map(|(article, _)| article.id).collect();
    let author_ids: Vec<i32> = rows.iter().map(|(_, author)| author.id).collect();

    let mut tag_map = tags::for_articles(connection, &article_ids)?;
    let counts = favorite_index::counts_for(connection, &article_ids)?;
    let favorited: HashSet<i32> = match viewer {
        Some(viewer) => favorite_index::favorited_set(connection, viewer.id, &article_ids)?,
        None => HashSet::new(),
    };
    let followed: HashSet<i32> = match viewer {
        Some(viewer) => social::followed_among(connection, viewer.id, &author_ids)?,
        None => HashSet::new(),
    };

    Ok(rows
        .into_iter()
        .map(|(article, author)| ArticleView {
            tag_list: tag_map.remove(&article.id).unwrap_or_default(),
            favorited: favorited.contains(&article.id),
            favorites_count: counts.get(&article.id).copied().unwrap_or(0),
            author: author.profile(followed.contains(&author.id)),
            slug: article.slug,
            title: article.title,
            description: article.description,
            body: article.body,
            created_at: article.created_at,
            updated_at: article.updated_at,
        })
        .collect())
}

pub(crate) fn view_one(
    connection: &mut PgConnection,
    article: Article,
    viewer: Option<&User>,
) -> Result<ArticleView, ApiError> {
    let author = User::load_by_id(article.author_id, connection)?;
    let mut views = to_views(connection, vec![(article, author)], viewer)?;
    views.pop().ok_or(ApiError::NotFound)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleParams {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub body: String,
    #[serde(default)]
    pub tag_list: Vec<String>,
}

impl ArticleParams {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::default();
        if self.title.trim().is_empty() {
            errors.add_error("title", "empty title");
        }
        if self.body.trim().is_empty() {
            errors.add_error("body", "empty body");
        }
        errors.into_result()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
    pub tag_list: Option<Vec<String>>,
}

impl ArticleChanges {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.body.is_none()
            && self.tag_list.is_none()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::default();
        if matches!(&self.title, Some(title) if title.trim().is_empty()) {
            errors.add_error("title", "empty title");
        }
        if matches!(&self.body, Some(body) if body.trim().is_empty()) {
            errors.add_error("body", "empty body");
        }
        errors.into_result()
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = articles)]
struct ArticleFieldChanges<'a> {
    title: Option<&'a str>,
    description: Option<&'a str>,
    body: Option<&'a str>,
    updated_at: DateTime<Utc>,
}

/// Creates the article, its slug reservation and its tag associations in one
/// transaction. Losing a slug race to a concurrent create retries with a
/// fresh slug a bounded number of times, then fails with `Conflict`.
pub fn create_article(
    connection: &mut PgConnection,
    author: &User,
    params: &ArticleParams,
) -> Result<ArticleView, ApiError> {
    params.validate()?;
    for attempt in 1..=slugs::MAX_INSERT_ATTEMPTS {
        let slug = slugs::assign(connection, &params.title)?;
        let now = Utc::now();
        let result = connection.transaction::<Article, ApiError, _>(|connection| {
            let article = insert_into(articles::table)
                .values(&NewArticle {
                    author_id: author.id,
                    slug: &slug,
                    title: &params.title,
                    description: &params.description,
                    body: &params.body,
                    created_at: now,
                    updated_at: now,
                })
                .get_result::<Article>(connection)?;
            tags::replace_associations(connection, article.id, &params.tag_list)?;
            Ok(article)
        });
        match result {
            Ok(article) => return view_one(connection, article, Some(author)),
            Err(ApiError::Storage(DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            ))) if attempt < slugs::MAX_INSERT_ATTEMPTS => continue,
            Err(ApiError::Storage(DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            ))) => return Err(ApiError::Conflict),
            Err(e) => return Err(e),
        }
    }
    Err(ApiError::Conflict)
}

/// Applies the provided fields and rewrites the tag set when one was given.
/// The slug never changes after creation, whatever happens to the title, and
/// an update that provides nothing leaves the row (and `updated_at`) alone.
pub fn update_article(
    connection: &mut PgConnection,
    actor: &User,
    slug: &str,
    changes: &ArticleChanges,
) -> Result<ArticleView, ApiError> {
    changes.validate()?;
    let article = Article::load_by_slug(slug, connection)?;
    auth::ensure_can_mutate(actor, &article)?;
    if changes.is_empty() {
        return view_one(connection, article, Some(actor));
    }
    let article = connection.transaction::<Article, ApiError, _>(|connection| {
        let article = diesel_update(articles::table.find(article.id))
            .set(&ArticleFieldChanges {
                title: changes.title.as_deref(),
                description: changes.description.as_deref(),
                body: changes.body.as_deref(),
                updated_at: Utc::now(),
            })
            .get_result::<Article>(connection)?;
        if let Some(tag_list) = &changes.tag_list {
            tags::replace_associations(connection, article.id, tag_list)?;
        }
        Ok(article)
    })?;
    view_one(connection, article, Some(actor))
}

/// Removes the article together with its comments and its rows in the
/// favorite and tag-association relations, all in one transaction.
pub fn delete_article(
    connection: &mut PgConnection,
    actor: &User,
    slug: &str,
) -> Result<(), ApiError> {
    let article = Article::load_by_slug(slug, connection)?;
    auth::ensure_can_mutate(actor, &article)?;
    connection.transaction::<_, ApiError, _>(|connection| {
        diesel_delete(comments::table.filter(comments::article_id.eq(article.id)))
            .execute(connection)?;
        diesel_delete(favorites::table.filter(favorites::article_id.eq(article.id)))
            .execute(connection)?;
        diesel_delete(article_tags::table.filter(article_tags::article_id.eq(article.id)))
            .execute(connection)?;
        diesel_delete(articles::table.find(article.id)).execute(connection)?;
        Ok(())
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateArticle {
    article: ArticleParams,
}

#[derive(Debug, Deserialize)]
pub struct UpdateArticle {
    article: ArticleChanges,
}

#[get("/?<tag>&<author>&<favorited>&<limit>&<offset>", format = "json")]
pub fn list(
    mut connection: DbConnection,
    current_user: Option<User>,
    tag: Option<String>,
    author: Option<String>,
    favorited: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
) -> ApiResult<ArticlesResponse> {
    let filters = Filters {
        tag,
        author,
        favorited,
        authors: None,
    };
    let page = crate::feed::compose(
        &mut connection,
        &filters,
        Page::clamped(offset, limit),
        current_user.as_ref(),
    )?;
    Ok(Json(ArticlesResponse {
        articles: page.articles,
        articles_count: page.articles_count,
    }))
}

#[get("/feed?<limit>&<offset>", format = "json")]
pub fn feed(
    mut connection: DbConnection,
    current_user: CurrentUser,
    limit: Option<i64>,
    offset: Option<i64>,
) -> ApiResult<ArticlesResponse> {
    let current_user = current_user?;
    let authors = social::followed_ids(&mut connection, current_user.id)?;
    let page = crate::feed::compose(
        &mut connection,
        &Filters::for_authors(authors),
        Page::clamped(offset, limit),
        Some(&current_user),
    )?;
    Ok(Json(ArticlesResponse {
        articles: page.articles,
        articles_count: page.articles_count,
    }))
}

#[get("/<slug>", format = "json")]
pub fn get(
    mut connection: DbConnection,
    current_user: Option<User>,
    slug: &str,
) -> ApiResult<ArticleResponse> {
    let article = Article::load_by_slug(slug, &mut connection)?;
    let view = view_one(&mut connection, article, current_user.as_ref())?;
    Ok(Json(ArticleResponse { article: view }))
}

#[post("/", format = "json", data = "<create>")]
pub fn create(
    mut connection: DbConnection,
    current_user: CurrentUser,
    create: Json<CreateArticle>,
) -> ApiResult<ArticleResponse> {
    let current_user = current_user?;
    let view = create_article(&mut connection, &current_user, &create.into_inner().article)?;
    Ok(Json(ArticleResponse { article: view }))
}

#[put("/<slug>", format = "json", data = "<update>")]
pub fn update(
    mut connection: DbConnection,
    current_user: CurrentUser,
    slug: &str,
    update: Json<UpdateArticle>,
) -> ApiResult<ArticleResponse> {
    let current_user = current_user?;
    let view = update_article(
        &mut connection,
        &current_user,
        slug,
        &update.into_inner().article,
    )?;
    Ok(Json(ArticleResponse { article: view }))
}

#[delete("/<slug>", format = "json")]
pub fn delete(
    mut connection: DbConnection,
    current_user: CurrentUser,
    slug: &str,
) -> ApiResult<()> {
    let current_user = current_user?;
    delete_article(&mut connection, &current_user, slug)?;
    Ok(Json(()))
}

#[post("/<slug>/favorite", format = "json")]
pub fn favorite(
    mut connection: DbConnection,
    current_user: CurrentUser,
    slug: &str,
) -> ApiResult<ArticleResponse> {
    let current_user = current_user?;
    let article = Article::load_by_slug(slug, &mut connection)?;
    favorite_index::favorite(&mut connection, current_user.id, article.id)?;
    let view = view_one(&mut connection, article, Some(&current_user))?;
    Ok(Json(ArticleResponse { article: view }))
}

#[delete("/<slug>/favorite", format = "json")]
pub fn unfavorite(
    mut connection: DbConnection,
    current_user: CurrentUser,
    slug: &str,
) -> ApiResult<ArticleResponse> {
    let current_user = current_user?;
    let article = Article::load_by_slug(slug, &mut connection)?;
    favorite_index::unfavorite(&mut connection, current_user.id, article.id)?;
    let view = view_one(&mut connection, article, Some(&current_user))?;
    Ok(Json(ArticleResponse { article: view }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_params_require_title_and_body() {
        let params = ArticleParams {
            title: "  ".to_string(),
            description: String::new(),
            body: String::new(),
            tag_list: vec![],
        };
        let errors = params.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn description_may_be_blank() {
        let params = ArticleParams {
            title: "Hello World".to_string(),
            description: String::new(),
            body: "content".to_string(),
            tag_list: vec![],
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn absent_change_fields_are_not_validation_errors() {
        let changes = ArticleChanges {
            title: None,
            description: None,
            body: None,
            tag_list: None,
        };
        assert!(changes.validate().is_ok());
    }

    #[test]
    fn changes_are_empty_only_when_no_field_is_provided() {
        let changes = ArticleChanges {
            title: None,
            description: None,
            body: None,
            tag_list: None,
        };
        assert!(changes.is_empty());
        let changes = ArticleChanges {
            tag_list: Some(vec![]),
            ..changes
        };
        assert!(!changes.is_empty());
    }

    #[test]
    fn provided_change_fields_must_be_non_empty() {
        let changes = ArticleChanges {
            title: Some(" ".to_string()),
            description: None,
            body: Some("".to_string()),
            tag_list: None,
        };
        let errors = changes.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
