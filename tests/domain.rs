//! Service-level tests against a real Postgres. Each test runs inside
//! `test_transaction`, so nothing is left behind. Run them with a migrated
//! database:
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/conduit_test cargo test -- --ignored
//! ```

use diesel::prelude::*;

use conduit::article::{
    create_article, delete_article, update_article, Article, ArticleChanges, ArticleParams,
};
use conduit::comment::{add_comment, delete_comment, list_comments};
use conduit::db::schema::{article_tags, favorites as favorites_table, tags as tags_table};
use conduit::favorites;
use conduit::feed::{compose, Filters, Page};
use conduit::social;
use conduit::types::ApiError;
use conduit::users::create_user;
use conduit::users::models::User;

fn connection() -> PgConnection {
    dotenv::dotenv().ok();
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for db tests");
    PgConnection::establish(&url).expect("failed to connect to postgres")
}

fn make_user(connection: &mut PgConnection, name: &str) -> User {
    create_user(
        connection,
        name,
        &format!("{}@example.com", name),
        "password123",
    )
    .expect("user creation failed")
}

fn params(title: &str, tag_list: &[&str]) -> ArticleParams {
    ArticleParams {
        title: title.to_string(),
        description: "a description".to_string(),
        body: "a body".to_string(),
        tag_list: tag_list.iter().map(|t| t.to_string()).collect(),
    }
}

fn no_changes() -> ArticleChanges {
    ArticleChanges {
        title: None,
        description: None,
        body: None,
        tag_list: None,
    }
}

#[test]
#[ignore = "requires postgres via DATABASE_URL"]
fn duplicate_titles_get_distinct_increasing_slugs() {
    connection().test_transaction::<_, ApiError, _>(|connection| {
        let alice = make_user(connection, "alice");
        let mut slugs = Vec::new();
        for _ in 0..3 {
            let view = create_article(connection, &alice, &params("Hello World", &[]))?;
            slugs.push(view.slug);
        }
        assert_eq!(slugs, vec!["hello-world", "hello-world-1", "hello-world-2"]);
        Ok(())
    });
}

#[test]
#[ignore = "requires postgres via DATABASE_URL"]
fn favorite_and_unfavorite_are_idempotent() {
    connection().test_transaction::<_, ApiError, _>(|connection| {
        let alice = make_user(connection, "alice");
        let bob = make_user(connection, "bob");
        let view = create_article(connection, &alice, &params("Favorites", &[]))?;
        let article = Article::load_by_slug(&view.slug, connection)?;

        favorites::favorite(connection, bob.id, article.id)?;
        favorites::favorite(connection, bob.id, article.id)?;
        assert_eq!(favorites::count(connection, article.id)?, 1);
        assert!(favorites::is_favorited(connection, bob.id, article.id)?);

        favorites::unfavorite(connection, bob.id, article.id)?;
        favorites::unfavorite(connection, bob.id, article.id)?;
        assert_eq!(favorites::count(connection, article.id)?, 0);
        assert!(!favorites::is_favorited(connection, bob.id, article.id)?);
        Ok(())
    });
}

#[test]
#[ignore = "requires postgres via DATABASE_URL"]
fn feed_contains_exactly_the_followed_authors_articles() {
    connection().test_transaction::<_, ApiError, _>(|connection| {
        let alice = make_user(connection, "alice");
        let bob = make_user(connection, "bob");
        let carol = make_user(connection, "carol");
        create_article(connection, &bob, &params("Bob One", &[]))?;
        create_article(connection, &bob, &params("Bob Two", &[]))?;
        create_article(connection, &carol, &params("Carol One", &[]))?;

        social::follow(connection, alice.id, bob.id)?;
        let followed = social::followed_ids(connection, alice.id)?;
        let page = compose(
            connection,
            &Filters::for_authors(followed),
            Page::clamped(None, None),
            Some(&alice),
        )?;

        assert_eq!(page.articles_count, 2);
        let slugs: Vec<&str> = page.articles.iter().map(|a| a.slug.as_str()).collect();
        // Reverse chronological: the later article first.
        assert_eq!(slugs, vec!["bob-two", "bob-one"]);
        assert!(page.articles.iter().all(|a| a.author.username == "bob"));
        assert!(page.articles.iter().all(|a| a.author.following));
        Ok(())
    });
}

#[test]
#[ignore = "requires postgres via DATABASE_URL"]
fn an_empty_followed_set_yields_an_empty_feed() {
    connection().test_transaction::<_, ApiError, _>(|connection| {
        let alice = make_user(connection, "alice");
        let bob = make_user(connection, "bob");
        create_article(connection, &bob, &params("Unseen", &[]))?;

        let followed = social::followed_ids(connection, alice.id)?;
        assert!(followed.is_empty());
        let page = compose(
            connection,
            &Filters::for_authors(followed),
            Page::clamped(None, None),
            Some(&alice),
        )?;
        assert_eq!(page.articles_count, 0);
        assert!(page.articles.is_empty());
        Ok(())
    });
}

#[test]
#[ignore = "requires postgres via DATABASE_URL"]
fn equivalent_tag_spellings_resolve_to_one_stored_tag() {
    connection().test_transaction::<_, ApiError, _>(|connection| {
        let alice = make_user(connection, "alice");
        let view = create_article(connection, &alice, &params("Tagged", &["Go", "go", " GO "]))?;
        assert_eq!(view.tag_list, vec!["go"]);

        let stored: i64 = tags_table::table
            .filter(tags_table::name.eq("go"))
            .count()
            .get_result(connection)?;
        assert_eq!(stored, 1);
        Ok(())
    });
}

#[test]
#[ignore = "requires postgres via DATABASE_URL"]
fn tag_rewrite_replaces_the_whole_set() {
    connection().test_transaction::<_, ApiError, _>(|connection| {
        let alice = make_user(connection, "alice");
        let view = create_article(connection, &alice, &params("Rewrites", &["rust", "web"]))?;
        assert_eq!(view.tag_list, vec!["rust", "web"]);

        let changes = ArticleChanges {
            tag_list: Some(vec!["go".to_string()]),
            ..no_changes()
        };
        let view = update_article(connection, &alice, &view.slug, &changes)?;
        assert_eq!(view.tag_list, vec!["go"]);

        let article = Article::load_by_slug(&view.slug, connection)?;
        let associations: i64 = article_tags::table
            .filter(article_tags::article_id.eq(article.id))
            .count()
            .get_result(connection)?;
        assert_eq!(associations, 1);
        // The vocabulary is append-only: the old tags survive unreferenced.
        let old: i64 = tags_table::table
            .filter(tags_table::name.eq_any(vec!["rust", "web"]))
            .count()
            .get_result(connection)?;
        assert_eq!(old, 2);
        Ok(())
    });
}

#[test]
#[ignore = "requires postgres via DATABASE_URL"]
fn only_the_author_may_mutate_but_anyone_may_read() {
    connection().test_transaction::<_, ApiError, _>(|connection| {
        let alice = make_user(connection, "alice");
        let bob = make_user(connection, "bob");
        let view = create_article(connection, &alice, &params("Mine", &[]))?;

        let changes = ArticleChanges {
            body: Some("hijacked".to_string()),
            ..no_changes()
        };
        assert!(matches!(
            update_article(connection, &bob, &view.slug, &changes),
            Err(ApiError::Forbidden)
        ));
        assert!(matches!(
            delete_article(connection, &bob, &view.slug),
            Err(ApiError::Forbidden)
        ));

        // Reads stay public for the same actor.
        let article = Article::load_by_slug(&view.slug, connection)?;
        assert_eq!(article.title, "Mine");
        Ok(())
    });
}

#[test]
#[ignore = "requires postgres via DATABASE_URL"]
fn deleting_an_article_cascades_to_comments_and_relations() {
    connection().test_transaction::<_, ApiError, _>(|connection| {
        let alice = make_user(connection, "alice");
        let bob = make_user(connection, "bob");
        let view = create_article(connection, &alice, &params("Doomed", &["ephemeral"]))?;
        let article = Article::load_by_slug(&view.slug, connection)?;
        let comment = add_comment(connection, &bob, &view.slug, "nice one")?;
        favorites::favorite(connection, bob.id, article.id)?;

        delete_article(connection, &alice, &view.slug)?;

        assert!(matches!(
            Article::load_by_slug(&view.slug, connection),
            Err(ApiError::NotFound)
        ));
        assert!(matches!(
            list_comments(connection, &view.slug, None),
            Err(ApiError::NotFound)
        ));
        assert!(matches!(
            delete_comment(connection, &bob, &view.slug, comment.id),
            Err(ApiError::NotFound)
        ));
        let favorite_rows: i64 = favorites_table::table
            .filter(favorites_table::article_id.eq(article.id))
            .count()
            .get_result(connection)?;
        assert_eq!(favorite_rows, 0);
        let association_rows: i64 = article_tags::table
            .filter(article_tags::article_id.eq(article.id))
            .count()
            .get_result(connection)?;
        assert_eq!(association_rows, 0);
        Ok(())
    });
}

#[test]
#[ignore = "requires postgres via DATABASE_URL"]
fn follow_is_idempotent_and_self_follow_is_rejected() {
    connection().test_transaction::<_, ApiError, _>(|connection| {
        let alice = make_user(connection, "alice");
        let bob = make_user(connection, "bob");

        assert!(matches!(
            social::follow(connection, alice.id, alice.id),
            Err(ApiError::Validation(_))
        ));

        social::follow(connection, alice.id, bob.id)?;
        social::follow(connection, alice.id, bob.id)?;
        assert!(social::is_following(connection, alice.id, bob.id)?);
        assert_eq!(social::followed_ids(connection, alice.id)?, vec![bob.id]);

        // The relation is directed.
        assert!(!social::is_following(connection, bob.id, alice.id)?);

        social::unfollow(connection, alice.id, bob.id)?;
        social::unfollow(connection, alice.id, bob.id)?;
        assert!(!social::is_following(connection, alice.id, bob.id)?);
        Ok(())
    });
}

#[test]
#[ignore = "requires postgres via DATABASE_URL"]
fn title_updates_never_change_the_slug() {
    connection().test_transaction::<_, ApiError, _>(|connection| {
        let alice = make_user(connection, "alice");
        let view = create_article(connection, &alice, &params("Hello World", &[]))?;
        assert_eq!(view.slug, "hello-world");

        let changes = ArticleChanges {
            title: Some("Goodbye World".to_string()),
            ..no_changes()
        };
        let updated = update_article(connection, &alice, &view.slug, &changes)?;
        assert_eq!(updated.slug, "hello-world");
        assert_eq!(updated.title, "Goodbye World");
        assert!(updated.updated_at > updated.created_at);
        Ok(())
    });
}

#[test]
#[ignore = "requires postgres via DATABASE_URL"]
fn an_update_providing_no_fields_changes_nothing() {
    connection().test_transaction::<_, ApiError, _>(|connection| {
        let alice = make_user(connection, "alice");
        let view = create_article(connection, &alice, &params("Untouched", &["rust"]))?;

        let updated = update_article(connection, &alice, &view.slug, &no_changes())?;
        assert_eq!(updated.updated_at, view.updated_at);
        assert_eq!(updated.title, view.title);
        assert_eq!(updated.tag_list, view.tag_list);
        Ok(())
    });
}

#[test]
#[ignore = "requires postgres via DATABASE_URL"]
fn list_filters_are_conjunctive() {
    connection().test_transaction::<_, ApiError, _>(|connection| {
        let alice = make_user(connection, "alice");
        let bob = make_user(connection, "bob");
        let by_alice = create_article(connection, &alice, &params("Alice on Rust", &["rust"]))?;
        create_article(connection, &alice, &params("Alice on Go", &["go"]))?;
        create_article(connection, &bob, &params("Bob on Rust", &["rust"]))?;
        let article = Article::load_by_slug(&by_alice.slug, connection)?;
        favorites::favorite(connection, bob.id, article.id)?;

        let filters = Filters {
            tag: Some("rust".to_string()),
            author: Some("alice".to_string()),
            favorited: Some("bob".to_string()),
            authors: None,
        };
        let page = compose(connection, &filters, Page::clamped(None, None), None)?;
        assert_eq!(page.articles_count, 1);
        assert_eq!(page.articles[0].slug, by_alice.slug);
        assert_eq!(page.articles[0].favorites_count, 1);

        // A filter naming an unknown tag matches nothing.
        let filters = Filters {
            tag: Some("haskell".to_string()),
            ..Filters::default()
        };
        let page = compose(connection, &filters, Page::clamped(None, None), None)?;
        assert_eq!(page.articles_count, 0);
        Ok(())
    });
}

#[test]
#[ignore = "requires postgres via DATABASE_URL"]
fn hello_world_scenario() {
    connection().test_transaction::<_, ApiError, _>(|connection| {
        let alice = make_user(connection, "alice");
        let bob = make_user(connection, "bob");

        let first = create_article(connection, &alice, &params("Hello World", &[]))?;
        assert_eq!(first.slug, "hello-world");
        let second = create_article(connection, &alice, &params("Hello World", &[]))?;
        assert_eq!(second.slug, "hello-world-1");

        let article = Article::load_by_slug("hello-world", connection)?;
        favorites::favorite(connection, bob.id, article.id)?;
        assert_eq!(favorites::count(connection, article.id)?, 1);

        let followed = social::followed_ids(connection, alice.id)?;
        let page = compose(
            connection,
            &Filters::for_authors(followed),
            Page::clamped(None, None),
            Some(&alice),
        )?;
        assert_eq!(page.articles_count, 0);
        assert!(page.articles.is_empty());
        Ok(())
    });
}

#[test]
#[ignore = "requires postgres via DATABASE_URL"]
fn empty_comment_bodies_are_rejected() {
    connection().test_transaction::<_, ApiError, _>(|connection| {
        let alice = make_user(connection, "alice");
        let view = create_article(connection, &alice, &params("Quiet", &[]))?;
        assert!(matches!(
            add_comment(connection, &alice, &view.slug, "   "),
            Err(ApiError::Validation(_))
        ));
        assert!(list_comments(connection, &view.slug, None)?.is_empty());
        Ok(())
    });
}
