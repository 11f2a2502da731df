use crate::types::ApiError;
use crate::users::models::User;

/// A resource owned by the user who created it. Reads are public; only the
/// author may mutate.
pub trait Authored {
    fn author_id(&self) -> i32;
}

pub fn can_mutate<R: Authored>(actor: &User, resource: &R) -> bool {
    actor.id == resource.author_id()
}

/// The single gate every mutating service call consults before touching an
/// article or comment.
pub fn ensure_can_mutate<R: Authored>(actor: &User, resource: &R) -> Result<(), ApiError> {
    if can_mutate(actor, resource) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}
