use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{EngineId, JobId};
use crate::model::{Engine, Job};

/// The serialized image of the full jobs+engines state, atomically written
/// to a file. `BTreeMap` keeps the on-disk JSON output stable across saves
/// with the same content, which makes the persistence round-trip test
/// (§8 scenario 6) a straightforward equality check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub jobs: BTreeMap<JobId, Job>,
    pub engines: BTreeMap<EngineId, Engine>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }
}
