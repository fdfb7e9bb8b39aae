//! # Security Graph Model
//!
//! Plain data types shared by every layer: identifiers, attribute values,
//! edge-kind bitmasks, objects and paths.
//!
//! Design rule: no container state and no I/O here. Objects are created and
//! mutated only through [`Objects`](crate::Objects).

pub mod sid;
pub mod value;
pub mod bitmap;
pub mod object;
pub mod path;

pub use sid::{Sid, well_known};
pub use value::{AttributeValue, AttributeValues};
pub use bitmap::{EdgeBitmap, MAX_EDGE_KINDS};
pub use object::{Adjacency, Direction, Edges, MergeNote, Object, ObjectId};
pub use path::{AttackPath, PathHop};
