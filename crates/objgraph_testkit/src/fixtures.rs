//! Shared schema fixtures and context helpers.
//!
//! The gallery schema covers every delete rule and both relationship
//! directions, so most scenarios need nothing else.

use crate::channel::RecordingChannel;
use objgraph_core::{ContextConfig, GraphContext};
use objgraph_model::{DeleteRule, Schema};
use std::sync::Arc;

/// Builds the gallery schema used across the test suites.
///
/// - `Artist --paintings--> Painting`, cascade on artist delete
/// - `Painting --artist--> Artist`, nullify on painting delete
/// - `Painting --gallery--> Gallery`, no action on painting delete
/// - `Gallery --paintings--> Painting`, deny on gallery delete
#[must_use]
pub fn gallery_schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder()
            .entity("Artist", |e| {
                e.scalar("name").to_many(
                    "paintings",
                    "Painting",
                    Some("artist"),
                    DeleteRule::Cascade,
                )
            })
            .entity("Painting", |e| {
                e.scalar("title")
                    .to_one("artist", "Artist", Some("paintings"), DeleteRule::Nullify)
                    .to_one("gallery", "Gallery", Some("paintings"), DeleteRule::NoAction)
            })
            .entity("Gallery", |e| {
                e.scalar("name")
                    .to_many("paintings", "Painting", Some("gallery"), DeleteRule::Deny)
            })
            .build(),
    )
}

/// Creates a detached gallery context with all events enabled.
#[must_use]
pub fn gallery_context() -> GraphContext {
    GraphContext::new(
        gallery_schema(),
        ContextConfig {
            change_events_enabled: true,
            lifecycle_events_enabled: true,
        },
    )
}

/// Creates a gallery context attached to a fresh recording store channel.
#[must_use]
pub fn store_backed_context() -> (Arc<GraphContext>, Arc<RecordingChannel>) {
    let ctx = Arc::new(gallery_context());
    let store = Arc::new(RecordingChannel::new());
    ctx.set_channel(store.clone());
    (ctx, store)
}
