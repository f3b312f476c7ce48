mod btree_internal_page;
mod btree_leaf_page;
mod btree_page;
mod header_page;

pub use btree_internal_page::*;
pub use btree_leaf_page::*;
pub use btree_page::*;
pub use header_page::*;
