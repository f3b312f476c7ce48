pub mod btree_delete;
pub mod btree_index;
pub mod btree_insert;
pub mod btree_iterator;
pub mod key_comparator;

pub use btree_index::{BTreeIndex, TreeStats};
pub use btree_iterator::BTreeIterator;
pub use key_comparator::{encode_integer_key, BytewiseComparator, IntegerComparator, KeyComparator};
