#![forbid(unsafe_code)]
//! Deterministic tree state machine for a replicated, hierarchical key-value
//! store. The replication engine (Raft or similar) feeds `apply` an ordered
//! command stream; replaying the same stream from the same snapshot yields a
//! byte-identical state on every replica, including version counters,
//! cascade ordering, and pattern-match result maps.

pub mod commands;
pub mod error;
pub mod ids;
pub mod keep_while;
pub mod machine;
pub mod matcher;
pub mod path;
pub mod pattern;
pub mod snapshot;
pub mod tree;

pub use commands::{Command, ErrorReply, KeepWhileClauses, Reply, TxnStep};
pub use error::{Error, ErrorKind, Result};
pub use ids::NodeId;
pub use keep_while::KeepWhileTable;
pub use machine::{MachineConfig, TreeKv};
pub use matcher::{find_matching, MatchOptions, ResultMap};
pub use path::{Path, PathComponent};
pub use pattern::{
    CmpOp, Condition, NameMatch, Pattern, PatternComponent, PayloadMatch, VersionCmp,
};
pub use tree::{Node, NodeProps};
