//! Service layer
//!
//! Operations exposed to a web front end. Services validate input,
//! read from the database and hand sync work to the worker queue.

mod posts;

pub use posts::{DEFAULT_TOP_POSTS, MAX_TOP_POSTS, PostsService, SyncRequestOutcome};
