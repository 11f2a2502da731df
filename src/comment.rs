use chrono::{DateTime, Utc};
use diesel::delete as diesel_delete;
use diesel::insert_into;
use diesel::prelude::*;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};

use crate::article::Article;
use crate::auth::{self, Authored};
use crate::db::schema::{comments, users};
use crate::db::DbConnection;
use crate::profile::Profile;
use crate::social;
use crate::types::{ApiError, ApiResult, ValidationError};
use crate::users::models::User;
use crate::users::CurrentUser;
use crate::utils::serialize_date;

#[derive(Debug, PartialEq, Queryable, Identifiable)]
#[diesel(table_name = comments)]
pub struct Comment {
    pub id: i32,
    pub article_id: i32,
    pub user_id: i32,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Authored for Comment {
    fn author_id(&self) -> i32 {
        self.user_id
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: i32,
    #[serde(serialize_with = "serialize_date")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_date")]
    pub updated_at: DateTime<Utc>,
    pub body: String,
    pub author: Profile<'static>,
}

impl CommentView {
    fn from(comment: Comment, author: Profile<'static>) -> Self {
        CommentView {
            id: comment.id,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
            body: comment.body,
            author,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = comments)]
struct NewComment<'a> {
    article_id: i32,
    user_id: i32,
    body: &'a str,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    body: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CommentContainer<T> {
    comment: T,
}

#[derive(Debug, Serialize)]
pub struct CommentsContainer<T> {
    comments: T,
}

pub fn add_comment(
    connection: &mut PgConnection,
    author: &User,
    slug: &str,
    body: &str,
) -> Result<CommentView, ApiError> {
    if body.trim().is_empty() {
        return Err(ValidationError::from("body", "empty body").into());
    }
    let article = Article::load_by_slug(slug, connection)?;
    let now = Utc::now();
    let comment = insert_into(comments::table)
        .values(&NewComment {
            article_id: article.id,
            user_id: author.id,
            body,
            created_at: now,
            updated_at: now,
        })
        .get_result::<Comment>(connection)?;
    Ok(CommentView::from(comment, author.profile(false)))
}

pub fn list_comments(
    connection: &mut PgConnection,
    slug: &str,
    viewer: Option<&User>,
) -> Result<Vec<CommentView>, ApiError> {
    let article = Article::load_by_slug(slug, connection)?;
    let rows = comments::table
        .inner_join(users::table)
        .filter(comments::article_id.eq(article.id))
        .order(comments::created_at.desc())
        .load::<(Comment, User)>(connection)?;

    let followed = match viewer {
        Some(viewer) => {
            let authors: Vec<i32> = rows.iter().map(|(_, author)| author.id).collect();
            social::followed_among(connection, viewer.id, &authors)?
        }
        None => Default::default(),
    };
    Ok(rows
        .into_iter()
        .map(|(comment, author)| {
            let profile = author.profile(followed.contains(&author.id));
            CommentView::from(comment, profile)
        })
        .collect())
}

/// Comments are create/delete only; a comment of another author is
/// `Forbidden`, a comment id that does not belong to the slugged article is
/// `NotFound`.
pub fn delete_comment(
    connection: &mut PgConnection,
    actor: &User,
    slug: &str,
    comment_id: i32,
) -> Result<(), ApiError> {
    let article = Article::load_by_slug(slug, connection)?;
    let comment = comments::table
        .find(comment_id)
        .first::<Comment>(connection)?;
    if comment.article_id != article.id {
        return Err(ApiError::NotFound);
    }
    auth::ensure_can_mutate(actor, &comment)?;
    diesel_delete(comments::table.find(comment.id)).execute(connection)?;
    Ok(())
}

#[post("/<slug>/comments", format = "json", data = "<details>")]
pub fn add(
    mut connection: DbConnection,
    current_user: CurrentUser,
    slug: &str,
    details: Json<CommentContainer<CommentBody>>,
) -> ApiResult<CommentContainer<CommentView>> {
    let current_user = current_user?;
    let details = details.into_inner();
    let comment = add_comment(
        &mut connection,
        &current_user,
        slug,
        &details.comment.body,
    )?;
    Ok(Json(CommentContainer { comment }))
}

#[get("/<slug>/comments", format = "json")]
pub fn list(
    mut connection: DbConnection,
    current_user: Option<User>,
    slug: &str,
) -> ApiResult<CommentsContainer<Vec<CommentView>>> {
    let comments = list_comments(&mut connection, slug, current_user.as_ref())?;
    Ok(Json(CommentsContainer { comments }))
}

#[delete("/<slug>/comments/<id>", format = "json")]
pub fn delete(
    mut connection: DbConnection,
    current_user: CurrentUser,
    slug: &str,
    id: i32,
) -> ApiResult<()> {
    let current_user = current_user?;
    delete_comment(&mut connection, &current_user, slug, id)?;
    Ok(Json(()))
}
