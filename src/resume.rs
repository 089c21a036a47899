// RESUME MANAGER
//
// RUNS EVERY LOOP ITERATION ONCE `auto_resume` IS ENABLED AND
// `free_gb >= resume_threshold`. FOR EACH PausedRecord: DROP IF THE PID IS
// GONE OR COMM NO LONGER MATCHES; DROP IF THE PROCESS IS NOT IN STATE `T`
// (ALREADY RESUMED EXTERNALLY); KEEP IF STRIKES >= MAX OR STILL IN
// COOLDOWN; OTHERWISE RESUME.
//
// DECISION LOGIC IS A PURE FUNCTION OVER CALLER-SUPPLIED PROCESS-TABLE
// FACTS, KEEPING "WHAT TO DO" SEPARATE FROM "HOW TO FIND OUT" SO IT CAN
// BE EXERCISED WITHOUT A REAL PROCESS TABLE.

use crate::action::PausedRecord;

/// Stale-entry cleanup threshold: records older than this are dropped
/// unconditionally, even if the PID still exists.
pub const STALE_RECORD_SECS: u64 = 2 * 3600;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumeDecision {
    /// Send CONT and remove the record.
    Resume,
    /// Leave the record in place; do nothing this iteration.
    Keep,
    /// Remove the record without sending any signal.
    Drop,
}

/// Facts about a paused PID's current process-table state, gathered by
/// the caller immediately before deciding.
#[derive(Clone, Copy, Debug)]
pub struct ProcessFacts {
    pub exists: bool,
    pub comm_matches: bool,
    pub is_stopped: bool,
}

pub fn decide(
    record: &PausedRecord,
    now: u64,
    cooldown_secs: u64,
    max_strikes: u32,
    facts: ProcessFacts,
) -> ResumeDecision {
    if now.saturating_sub(record.paused_at) > STALE_RECORD_SECS {
        return ResumeDecision::Drop;
    }
    if !facts.exists || !facts.comm_matches {
        return ResumeDecision::Drop;
    }
    if !facts.is_stopped {
        return ResumeDecision::Drop;
    }
    if record.strikes >= max_strikes {
        return ResumeDecision::Keep;
    }
    if now.saturating_sub(record.paused_at) < cooldown_secs {
        return ResumeDecision::Keep;
    }
    ResumeDecision::Resume
}

/// Whether the resume manager should attempt resumption at all this
/// iteration.
pub fn should_attempt(auto_resume: bool, free_gb: u64, resume_threshold_gb: u64) -> bool {
    auto_resume && free_gb >= resume_threshold_gb
}
