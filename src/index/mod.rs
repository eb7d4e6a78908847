pub mod btree;
pub mod btree_iterator;
pub mod btree_page;
mod context;
pub mod key_comparator;

pub use btree::BPlusTree;
pub use btree_iterator::BPlusTreeIterator;
pub use btree_page::{
    internal_capacity, leaf_capacity, BTreePageRef, BTreePageType, InternalPage, InternalPageRef,
    LeafPage, LeafPageRef,
};
pub use key_comparator::{BytewiseComparator, GenericKey, Int64Comparator, KeyComparator};
