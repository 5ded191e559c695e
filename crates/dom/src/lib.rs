//! LDraw Document Object Model
//!
//! An editable object graph for LDraw part and model files.
//!
//! ## Philosophy
//!
//! - **Data structures first**: one arena, one node struct, links are ids
//! - **One mutation path**: every edit goes through the same checks, the
//!   same undo recording and the same event queue
//! - **No hidden state**: locks and freezes are stored locally and inherited
//!   by walking up the tree
//!
//! ## Core Design
//!
//! ```text
//! LDraw text → Parser → Document (DomArena of Nodes) → CodeSerializer → LDraw text
//!                           ↓            ↓
//!                      UndoStack    EventDispatcher
//! ```

pub mod analytics;
pub mod arena;
pub mod colour;
mod collection;
pub mod document;
mod elements_view;
pub mod error;
pub mod events;
pub mod geom;
mod group;
mod lifecycle;
pub mod material;
pub mod node;
pub mod parser;
mod properties;
pub mod serializer;
pub mod snapshot;
pub mod types;
mod undo;
pub mod utils;

pub use analytics::{Problem, ProblemCode, Severity};
pub use arena::DomArena;
pub use colour::{Palette, Rgba};
pub use document::{Document, DocumentConfig};
pub use error::{DomError, Result};
pub use events::{CollectionChange, CollectionView, DomEvent, EventFilter};
pub use geom::{BoundingBox, Matrix4d, Vector3d};
pub use material::Material;
pub use parser::{ParseOutcome, Parser, ParserConfig};
pub use serializer::{CodeSerializer, SerializerConfig};
pub use snapshot::NodeSnapshot;
pub use types::*;
