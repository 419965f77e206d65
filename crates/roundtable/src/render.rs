//! Plain-text rendering of the debate transcript.

use coordination::{
    AgentRole, DebateStatus, InterruptReason, RetryEvent, RunOutcome, Turn, WorkflowError,
    WorkflowEvent,
};

pub fn persona(role: AgentRole) -> &'static str {
    match role {
        AgentRole::ContextGatherer => "Chief of Staff",
        AgentRole::Proposer => "Aria (Visionary)",
        AgentRole::Critic => "Marcus (Skeptic)",
        AgentRole::Moderator => "The Chair",
    }
}

pub fn turn(turn: &Turn) -> String {
    match turn.author {
        Some(role) => format!("[{}]\n{}\n", persona(role), turn.content.trim_end()),
        None => format!("[You] {}\n", turn.content.trim_end()),
    }
}

/// Everything a node produced, followed by the chair's ruling when there is one.
pub fn event(event: &WorkflowEvent) -> String {
    let mut out: String = event.new_turns.iter().map(turn).collect();
    if let Some(verdict) = event.verdict {
        out.push_str(&format!("-- verdict: {verdict} --\n"));
    } else if event.status == DebateStatus::NeedsRevision {
        out.push_str(&format!(
            "-- round {} closed, back to the Visionary --\n",
            event.round_count
        ));
    }
    out
}

pub fn cooldown(event: &RetryEvent) -> String {
    format!(
        "cooling down {:.1}s… (attempt {} failed)",
        event.wait_seconds, event.attempt
    )
}

pub fn outcome(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed { status, rounds } => {
            let noun = if *rounds == 1 { "round" } else { "rounds" };
            match status {
                DebateStatus::Approved => format!("The board has reached a decision after {rounds} {noun}."),
                DebateStatus::MaxRoundsReached => format!(
                    "No consensus after {rounds} {noun}; the chair's final summary stands."
                ),
                other => format!("Debate ended ({other}) after {rounds} {noun}."),
            }
        }
        RunOutcome::Interrupted { reason, .. } => match reason {
            InterruptReason::Cancelled => {
                "Interrupted. Progress is saved; type /resume to continue.".to_string()
            }
            InterruptReason::TimedOut => {
                "Timed out. Progress is saved; type /resume to continue.".to_string()
            }
        },
    }
}

pub fn failure(error: &WorkflowError) -> String {
    if error.is_internal() {
        format!("Internal error: {error}. The session was left as it was; ask again to start over.")
    } else {
        format!("The board could not finish: {error}. Ask again when ready.")
    }
}
