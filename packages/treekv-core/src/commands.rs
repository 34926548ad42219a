use crate::error::{Error, ErrorKind};
use crate::matcher::{MatchOptions, ResultMap};
use crate::path::PathComponent;
use crate::pattern::{Condition, Pattern};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Keep-while clause attached to a put: watched paths (anchors starting with
/// `This`/`Parent` resolve relative to the put target, everything else
/// against the root) and the predicate each must keep satisfying.
pub type KeepWhileClauses = Vec<(Vec<PathComponent>, Condition)>;

/// The command envelope delivered by the replication engine. The state
/// machine applies these serially; the host owns their log encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Command {
    Put {
        pattern: Pattern,
        payload: Option<Vec<u8>>,
        keep_while: Option<KeepWhileClauses>,
    },
    Delete {
        pattern: Pattern,
    },
    Get {
        pattern: Pattern,
        options: MatchOptions,
    },
    /// Serializable command DSL executed atomically inside one apply.
    Transaction {
        steps: Vec<TxnStep>,
    },
}

/// One step of a transaction. `AssertMatch` aborts the transaction when the
/// pattern errors or matches nothing, rolling back every earlier step.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TxnStep {
    Put {
        pattern: Pattern,
        payload: Option<Vec<u8>>,
        keep_while: Option<KeepWhileClauses>,
    },
    Delete {
        pattern: Pattern,
    },
    Get {
        pattern: Pattern,
        options: MatchOptions,
    },
    AssertMatch {
        pattern: Pattern,
        options: MatchOptions,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ErrorReply {
    pub kind: ErrorKind,
    pub detail: String,
}

impl From<&Error> for ErrorReply {
    fn from(err: &Error) -> Self {
        ErrorReply {
            kind: err.kind(),
            detail: err.to_string(),
        }
    }
}

/// Reply returned synchronously from `apply`. Errors are values here; the
/// state machine itself never raises out of band.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Reply {
    Ok(ResultMap),
    /// Per-step result maps of a committed transaction, in step order.
    Steps(Vec<ResultMap>),
    Error(ErrorReply),
}

impl Reply {
    pub fn is_ok(&self) -> bool {
        !matches!(self, Reply::Error(_))
    }

    /// The result map of a plain `Ok` reply.
    pub fn result(&self) -> Option<&ResultMap> {
        match self {
            Reply::Ok(map) => Some(map),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorReply> {
        match self {
            Reply::Error(err) => Some(err),
            _ => None,
        }
    }
}
