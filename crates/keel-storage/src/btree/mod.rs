//! Disk-resident B+ tree secondary index.
//!
//! One index file per indexed attribute, named `"{relation}.{attr_offset}"`:
//! a meta page (identity fields + root pointer) followed by node pages in
//! allocation order. Leaves hold `(key, rid)` entries and a right-sibling
//! pointer; inner nodes hold separator keys, child pointers, and a level tag
//! telling whether their children are leaves. A node page carries no type
//! tag of its own — leaf versus inner is always known from the parent.
//!
//! Inserts descend recursively and split bottom-up: a full leaf copies its
//! separator up, a full inner node pushes its separator up, and a pending
//! split that survives to the top grows a new root — the only event that
//! rewrites the meta page. Scans descend once to position, then follow the
//! leaf sibling chain forward, holding at most one leaf pinned at a time.

pub mod constants;
pub mod index;
pub mod meta;
pub mod node;

pub use constants::{INNER_CAPACITY, LEAF_CAPACITY};
pub use index::{BTreeIndex, RangeOp};
pub use meta::{IndexMeta, RELATION_NAME_LEN};
pub use node::{InnerNode, LeafNode};
