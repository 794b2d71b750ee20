//! Consumer-facing summaries built from pipeline outcomes.

mod evidence;
mod score;

pub use evidence::{build_evidence_pack, EvidencePack};
pub use score::{displayed_score, ScoreVariant};
