//! Query variants dispatched to a media endpoint.

use serde::{Deserialize, Serialize};

use crate::types::{MediaDatum, Tag};

/// A browse-family request against one remote session.
///
/// The five operations share a single result shape (a snapshot descriptor),
/// so they travel as one tagged variant and are dispatched to the client
/// exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Query {
    /// Open a container (`None` opens the catalog root).
    Browse { container: Option<MediaDatum> },
    /// Enumerate the distinct values of `tag` across the catalog.
    List { tag: Tag },
    /// Items reachable from the `tag`/`value` pair (the albums linked to an
    /// artist value, for example).
    Link { tag: Tag, value: String },
    /// Items whose `tag` equals `value` exactly.
    Match { tag: Tag, value: String },
    /// Free-text search across the catalog.
    Search { value: String },
}

impl Query {
    /// Operation name, used for dispatch logging.
    pub fn name(&self) -> &'static str {
        match self {
            Query::Browse { .. } => "browse",
            Query::List { .. } => "list",
            Query::Link { .. } => "link",
            Query::Match { .. } => "match",
            Query::Search { .. } => "search",
        }
    }
}
