#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/trivial_hit.rs"]
mod trivial_hit;

#[path = "specs/admin.rs"]
mod admin;
