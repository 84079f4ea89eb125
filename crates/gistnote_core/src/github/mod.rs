//! GitHub gist item source.
//!
//! Lists the authenticated user's gists over GraphQL and fetches raw gist
//! content for change detection.

mod client;

pub use client::{GistClient, GistClientOptions};
