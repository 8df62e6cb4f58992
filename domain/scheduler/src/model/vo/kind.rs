use std::fmt;

use serde::{Deserialize, Serialize};

/// The two record kinds tracked by the scheduler tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Job,
    Host,
}

impl EntityKind {
    /// Name of the field holding the primary key.
    pub const fn key_field(self) -> &'static str {
        match self {
            EntityKind::Job => "jobid",
            EntityKind::Host => "host_name",
        }
    }

    /// Name of the field holding the status tag.
    pub const fn status_field(self) -> &'static str {
        match self {
            EntityKind::Job => "stat",
            EntityKind::Host => "status",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Job => f.write_str("Job"),
            EntityKind::Host => f.write_str("Host"),
        }
    }
}
