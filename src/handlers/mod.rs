// handlers/mod.rs - two tiers
//
// Public (no credential) and protected (bearer credential checked by the
// mediator after the request has been validated).
pub mod protected;
pub mod public;
