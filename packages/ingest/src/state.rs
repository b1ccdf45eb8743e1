//! The state machine of one ingestion run.
//!
//! `Fetching` and `Extracting` are idempotent (existence/size checks
//! make re-entry safe); `Loading` is not, though in practice a re-run
//! is harmless because the backend document id is deterministic.

use addresskit_models::Region;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestState {
    Idle,
    Manifest,
    Fetching,
    Extracting,
    Loading { region: Region, table: &'static str },
    Complete,
    Failed,
}

impl std::fmt::Display for IngestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Manifest => write!(f, "resolving manifest"),
            Self::Fetching => write!(f, "fetching archive"),
            Self::Extracting => write!(f, "extracting archive"),
            Self::Loading { region, table } => write!(f, "loading {region}/{table}"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
