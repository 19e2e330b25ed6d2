//! # blitz-codec
//!
//! Object graph serialization used to hydrate worker processes and to ship
//! call arguments across the process boundary.
//!
//! ## Design Principles
//!
//! - Graphs may be cyclic; encoding never recurses forever
//! - Function values travel as their source text, never as executable code
//! - No key is ever dropped; the only unrepresentable value is a non-finite float
//! - Decoding restores shape (including cycles), not reference identity
//!
//! ## Wire Format
//!
//! The text is a single JSON document. Scalars are plain JSON. Containers
//! and functions are wrapped so they can never be confused with user data:
//!
//! ```text
//! {"$id": 0, "$obj": {"name": "core", "self": {"$ref": 0}}}
//! {"$id": 1, "$arr": [1, 2.5, "x"]}
//! {"$fn": "fn verify_user_indices()"}
//! ```
//!
//! A container receives an `$id` on the first visit; every later visit of
//! the same container emits `{"$ref": id}`.

mod decode;
mod encode;
mod error;
mod shape;
mod value;

pub use decode::{deserialize, MAX_DEPTH};
pub use encode::serialize;
pub use error::CodecError;
pub use shape::shape_eq;
pub use value::{Array, Callback, CodeBlob, Object, Value};
