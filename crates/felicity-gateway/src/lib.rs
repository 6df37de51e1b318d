pub mod connection;
pub mod dispatcher;

use futures_util::future::BoxFuture;
use uuid::Uuid;

use felicity_types::api::Claims;

/// Decides whether an identified connection may join an event room.
/// Implemented by the API layer, which owns the access directory.
pub trait RoomAuthorizer: Send + Sync + 'static {
    fn can_join<'a>(&'a self, claims: &'a Claims, token: &'a str, event_id: Uuid) -> BoxFuture<'a, bool>;
}
