use serde::{Deserialize, Serialize};

/// What a worker must hold locally before it may request work.
///
/// Names are relative to the worker's staging directory. Files are checked by
/// existence and exact byte size only.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub dirs: Vec<String>,
    pub files: Vec<(String, u64)>,
}

impl Manifest {
    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty() && self.files.is_empty()
    }
}
