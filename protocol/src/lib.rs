use std::fmt;

use serde::{Deserialize, Serialize};

pub mod conn;
pub mod error;
pub mod handshake;
pub mod master_msg;
pub mod payload;
pub mod worker_msg;

pub use conn::{Connection, MasterConnection, WorkerConnection};
pub use error::SessionError;
pub use handshake::Manifest;
pub use master_msg::MasterMsg;
pub use worker_msg::WorkerMsg;

/// Unique within one dispatch cycle.
pub type ItemId = u64;

/// Opaque argument or result blob.
pub type Payload = Vec<u8>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: ItemId,
    pub arg: Payload,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ItemResult {
    pub id: ItemId,
    pub result: Payload,
}

/// Names a function registered on the worker side.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionRef {
    pub module: String,
    pub function: String,
}

impl FunctionRef {
    pub fn new(module: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
        }
    }
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.function)
    }
}
