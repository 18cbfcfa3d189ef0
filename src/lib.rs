//! Embedded key/value and document store built around a fixed-fanout,
//! five-level hashed tree index over an append-only value log.
//!
//! An [Engine] owns a set of [Database]s, each a set of [Form]s; a Form
//! dispatches `put`/`get`/`insert`/`select` against one or more [Index]
//! trees kept in memory and backed by fixed-width 46-byte index records on
//! disk, recovered on startup by chunk-wise parallel replay.

#[macro_use]
pub mod error;

pub mod config;
pub mod engine;
pub mod form;
pub mod hash;
pub mod index;
pub mod link;
pub mod node;
pub mod pool;
pub mod selector;
pub mod storage;
pub mod util;
pub mod value;

pub use config::Config;
pub use engine::{Database, Engine};
pub use error::{Error, Result};
pub use form::{Form, FormType};
pub use index::Index;
pub use pool::{Intent, IntentResult, Options as PoolOptions, Pool};
pub use selector::{Condition, Op, Selector, SortSpec};
pub use value::Value;
