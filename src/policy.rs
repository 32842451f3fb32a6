//! Admission policy
//!
//! Stateless capacity rule shared by both checkpoints.

/// Outcome of an admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Admit,
    Deny,
}

impl Verdict {
    pub fn is_admit(self) -> bool {
        self == Verdict::Admit
    }
}

/// Deny when `occupancy` has reached `capacity` and the session cannot
/// bypass the limit; admit otherwise.
///
/// `capacity` is validated positive at config load. Before
/// authentication `bypass` is unknown and must be passed as `false`.
pub fn decide(occupancy: usize, capacity: u32, bypass: bool) -> Verdict {
    if occupancy >= capacity as usize && !bypass {
        Verdict::Deny
    } else {
        Verdict::Admit
    }
}
