//! Source combination.
//!
//! Merges several named source fragments into one compile unit:
//!
//! ```text
//! fragments ──scan──▶ items per fragment
//!                         │
//!                         ├── imports       → global group, ordinary group
//!                         ├── declarations  → deduplicated by text, Params first
//!                         └── statements    → entry fragment only
//!                         │
//!                         ▼
//!                   CombinedUnit (groups joined by blank lines)
//! ```
//!
//! # Module Structure
//!
//! - `scanner` - Lexical scanner splitting one fragment into top-level items
//! - `combiner` - Entry detection, deduplication and rendering
//! - `types` - Fragment, unit and option types

mod combiner;
pub(crate) mod scanner;
mod types;

pub use combiner::{combine, identify_entry_fragment};
pub use types::{CombineOptions, CombinedUnit, SourceFragment, TypeDeclaration};
