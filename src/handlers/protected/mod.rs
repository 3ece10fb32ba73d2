// Protected handlers: every route here carries a bearer credential that the
// mediator verifies once the request itself is known to be well formed.

pub mod auth;
pub mod data;
pub mod find;
