use diesel::pg::Pg;
use diesel::prelude::*;

use crate::article::{self, Article, ArticleView};
use crate::db::schema::{article_tags, articles, favorites, users};
use crate::tags;
use crate::types::ApiError;
use crate::users::models::User;

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

/// Offset/limit paging contract: offsets never go negative and limits are
/// capped at `MAX_LIMIT`.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Page {
    pub fn clamped(offset: Option<i64>, limit: Option<i64>) -> Page {
        Page {
            offset: offset.unwrap_or(0).max(0),
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(0, MAX_LIMIT),
        }
    }
}

/// Conjunctive filters for the article list. `authors`, when present, scopes
/// the page to exactly that author set; the personal feed passes the actor's
/// followed ids there (an empty set yields an empty page, not an error).
#[derive(Debug, Default)]
pub struct Filters {
    pub tag: Option<String>,
    pub author: Option<String>,
    pub favorited: Option<String>,
    pub authors: Option<Vec<i32>>,
}

impl Filters {
    pub fn for_authors(authors: Vec<i32>) -> Filters {
        Filters {
            authors: Some(authors),
            ..Filters::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct ArticlePage {
    pub articles: Vec<ArticleView>,
    pub articles_count: i64,
}

/// Name filters resolved to ids up front. `None` for a requested name that
/// does not exist, which makes the page provably empty.
struct Resolved {
    tag_id: Option<i32>,
    author_id: Option<i32>,
    favoriter_id: Option<i32>,
    authors: Option<Vec<i32>>,
}

fn user_id_by_name(
    connection: &mut PgConnection,
    name: &str,
) -> Result<Option<i32>, ApiError> {
    users::table
        .filter(users::username.eq(name))
        .select(users::id)
        .first::<i32>(connection)
        .optional()
        .map_err(|e| e.into())
}

fn resolve(
    connection: &mut PgConnection,
    filters: &Filters,
) -> Result<Option<Resolved>, ApiError> {
    let tag_id = match &filters.tag {
        Some(tag) => match tags::find_id(connection, &tags::normalize(tag))? {
            Some(id) => Some(id),
            None => return Ok(None),
        },
        None => None,
    };
    let author_id = match &filters.author {
        Some(name) => match user_id_by_name(connection, name)? {
            Some(id) => Some(id),
            None => return Ok(None),
        },
        None => None,
    };
    let favoriter_id = match &filters.favorited {
        Some(name) => match user_id_by_name(connection, name)? {
            Some(id) => Some(id),
            None => return Ok(None),
        },
        None => None,
    };
    Ok(Some(Resolved {
        tag_id,
        author_id,
        favoriter_id,
        authors: filters.authors.clone(),
    }))
}

type BoxedArticleQuery<'a> = diesel::helper_types::IntoBoxed<
    'a,
    diesel::helper_types::InnerJoin<articles::table, users::table>,
    Pg,
>;

fn scoped(resolved: &Resolved) -> BoxedArticleQuery<'static> {
    let mut query = articles::table.inner_join(users::table).into_boxed();
    if let Some(tag_id) = resolved.tag_id {
        query = query.filter(
            articles::id.eq_any(
                article_tags::table
                    .filter(article_tags::tag_id.eq(tag_id))
                    .select(article_tags::article_id),
            ),
        );
    }
    if let Some(author_id) = resolved.author_id {
        query = query.filter(articles::author_id.eq(author_id));
    }
    if let Some(favoriter_id) = resolved.favoriter_id {
        query = query.filter(
            articles::id.eq_any(
                favorites::table
                    .filter(favorites::user_id.eq(favoriter_id))
                    .select(favorites::article_id),
            ),
        );
    }
    if let Some(authors) = &resolved.authors {
        query = query.filter(articles::author_id.eq_any(authors.clone()));
    }
    query
}

/// Composes one reverse-chronological page plus the total count for the
/// filter set. Ties on the creation timestamp break on the row id so
/// pagination stays deterministic.
pub fn compose(
    connection: &mut PgConnection,
    filters: &Filters,
    page: Page,
    viewer: Option<&User>,
) -> Result<ArticlePage, ApiError> {
    let resolved = match resolve(connection, filters)? {
        Some(resolved) => resolved,
        None => return Ok(ArticlePage::default()),
    };

    let articles_count = scoped(&resolved).count().get_result::<i64>(connection)?;
    let rows = scoped(&resolved)
        .order((articles::created_at.desc(), articles::id.desc()))
        .offset(page.offset)
        .limit(page.limit)
        .load::<(Article, User)>(connection)?;
    let articles = article::to_views(connection, rows, viewer)?;
    Ok(ArticlePage {
        articles,
        articles_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_defaults_to_first_twenty() {
        let page = Page::clamped(None, None);
        assert_eq!(page.offset, 0);
        assert_eq!(page.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn negative_offsets_clamp_to_zero() {
        assert_eq!(Page::clamped(Some(-5), Some(10)).offset, 0);
    }

    #[test]
    fn limits_are_capped() {
        assert_eq!(Page::clamped(None, Some(10_000)).limit, MAX_LIMIT);
        assert_eq!(Page::clamped(None, Some(-1)).limit, 0);
    }

    #[test]
    fn for_authors_sets_only_the_author_scope() {
        let filters = Filters::for_authors(vec![1, 2]);
        assert_eq!(filters.authors, Some(vec![1, 2]));
        assert!(filters.tag.is_none() && filters.author.is_none() && filters.favorited.is_none());
    }
}
