//! The multi-version store: version chains, paged trees and tables.

mod page;
mod table;
mod tree;
mod version;
mod visibility;

pub use page::{Page, PageDelete};
pub use table::{IndexDef, Table};
pub use tree::{Entry, RangeReservation, Tree};
pub use version::{Payload, UpdateMeta, UpdateState, Version, VersionChain};
pub use visibility::{globally_visible, ReadView, Resolved, Visibility};

pub(crate) use table::WriteOp;
