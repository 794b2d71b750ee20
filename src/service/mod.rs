//! Collaborating services: standards verification and text recognition.
//!
//! Only the traits and response handling live here. Transports are supplied
//! by the caller (the CLI uses HTTP).

mod breaker;
mod clock;
mod guard;
mod recognition;
mod verification;

pub use breaker::{CircuitBreaker, DEFAULT_COOLDOWN};
pub use clock::{Clock, ManualClock, SystemClock};
pub use guard::{GuardedService, ServicePolicy};
pub use recognition::{accept_response, recognition_language, Recognizer};
pub use verification::{
    normalize_json, normalize_report, normalize_xml, Verdict, VerificationResult,
    VerificationSummary, Verifier,
};
