use derive_more::IsVariant;
use serde::{Deserialize, Serialize};

use crate::{FunctionRef, Manifest, WorkItem};

/// Frames sent from master to worker.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, IsVariant)]
pub enum MasterMsg {
    Manifest(Manifest),
    /// Number of directory names or files that follow during a download.
    Count(u64),
    DirName(String),
    FileName(String),
    FileContent(Vec<u8>),
    /// Instruction: a batch and a function reference follow.
    Compute,
    Batch(Vec<WorkItem>),
    Function(FunctionRef),
    /// Instruction: close the session.
    End,
    Unexpected(String),
}

impl MasterMsg {
    pub fn kind(&self) -> &'static str {
        match self {
            MasterMsg::Manifest(_) => "manifest",
            MasterMsg::Count(_) => "count",
            MasterMsg::DirName(_) => "dir_name",
            MasterMsg::FileName(_) => "file_name",
            MasterMsg::FileContent(_) => "file_content",
            MasterMsg::Compute => "compute",
            MasterMsg::Batch(_) => "batch",
            MasterMsg::Function(_) => "function",
            MasterMsg::End => "end",
            MasterMsg::Unexpected(_) => "unexpected",
        }
    }
}
