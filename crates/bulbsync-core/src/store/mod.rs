// ── In-memory stores ──

pub mod relations;

pub use relations::{Relation, RelationStore};
