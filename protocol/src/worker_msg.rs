use derive_more::IsVariant;
use serde::{Deserialize, Serialize};

use crate::ItemResult;

/// Frames sent from worker to master.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, IsVariant)]
pub enum WorkerMsg {
    Download,
    GetWork { capacity: u32 },
    Results(Vec<ItemResult>),
}

impl WorkerMsg {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerMsg::Download => "download",
            WorkerMsg::GetWork { .. } => "get_work",
            WorkerMsg::Results(_) => "results",
        }
    }
}
