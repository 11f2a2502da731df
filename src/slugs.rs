use diesel::prelude::*;
use slug::slugify;
use std::collections::HashSet;

use crate::db::schema::articles;
use crate::types::ApiError;

/// How many times article creation retries a fresh slug after losing an
/// insert race before giving up with `Conflict`.
pub const MAX_INSERT_ATTEMPTS: usize = 5;

/// URL-safe base form of a title: lowercase, non-alphanumeric runs collapsed
/// to a single hyphen, leading/trailing hyphens trimmed.
pub fn base_slug(title: &str) -> String {
    let base = slugify(title);
    if base.is_empty() {
        // Titles made entirely of punctuation still need a usable slug.
        "untitled".to_string()
    } else {
        base
    }
}

/// Picks `base`, then `base-1`, `base-2`, … until a candidate is not in
/// `taken`. Counting starts at 1 so the first duplicate gets `-1`.
pub fn pick_unique(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    let mut counter = 1u64;
    loop {
        let candidate = format!("{}-{}", base, counter);
        if !taken.contains(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Derives an unused slug for `title` from the slugs currently reserved.
/// The returned value is only reserved once the article row is inserted;
/// callers must treat a unique violation on insert as a lost race and ask
/// again.
pub fn assign(connection: &mut PgConnection, title: &str) -> Result<String, ApiError> {
    let base = base_slug(title);
    let taken = articles::table
        .filter(
            articles::slug
                .eq(&base)
                .or(articles::slug.like(format!("{}-%", base))),
        )
        .select(articles::slug)
        .load::<String>(connection)?
        .into_iter()
        .collect::<HashSet<_>>();
    Ok(pick_unique(&base, &taken))
}
