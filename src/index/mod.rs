pub mod btree;
pub mod header_page;
pub mod iterator;
pub mod key;
pub mod node;

pub use btree::BPlusTree;
pub use header_page::{HeaderPageMut, HeaderPageRef};
pub use iterator::TreeIterator;
pub use key::IndexKey;
pub use node::{
    InternalNodeMut, InternalNodeRef, LeafNodeMut, LeafNodeRef, NodeMut, NodeRef, PageType,
};
