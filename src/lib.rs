//! taskorder - Task Ordering Library
//!
//! Maintains a total order over tasks within a hierarchical scope so that
//! drag-and-drop reordering stays predictable as lists grow.
//!
//! # Core Concepts
//!
//! - **Scope**: a `(list, parent)` pair; siblings in one scope share an order
//! - **Positions**: sparse integers chosen with random spread, so concurrent
//!   inserts at the same point rarely collide
//! - **Rebalancing**: crowded or overgrown sibling sets are respaced in one
//!   atomic batch, off the write path
//! - **Hierarchy guard**: parent changes that would form a cycle are refused
//!
//! # Module Organization
//!
//! - `space`: the numeric position domain and its constants
//! - `item`: ordered items, scopes and placement intentions
//! - `allocator`: position assignment for top / after / end placement
//! - `hierarchy`: iterative cycle detection for parent changes
//! - `trigger`: post-write gap heuristic and the reentrancy token
//! - `rebalance`: the rebalance worker and coalescing queue
//! - `rebalancer`: background tokio task driving the worker with retries
//! - `store`: the persistence trait plus memory and file implementations
//! - `orderer`: the write path tying the pieces together
//! - `storage`: on-disk layout and atomic writes
//! - `lock`: file locking for concurrent processes
//! - `config`: configuration loading from `.taskorder.toml`
//! - `error`: error types and result aliases
//! - `cli`: command-line interface using clap

pub mod allocator;
pub mod cli;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod item;
pub mod lock;
pub mod orderer;
pub mod output;
pub mod rebalance;
pub mod rebalancer;
pub mod space;
pub mod storage;
pub mod store;
pub mod trigger;

pub use error::{Error, Result};
pub use item::{OrderedItem, PlacementIntention, Scope};
pub use orderer::{NewItem, Orderer};
pub use store::{FileStore, MemoryStore, OrderedListStore};
