//! Default instructions and message assembly for the debate agents.

use crate::debate::{AgentRole, Turn};
use crate::provider::ChatMessage;

/// Minimum trimmed length (in chars) of an acceptable proposal.
pub const MIN_PROPOSAL_CHARS: usize = 50;

pub const LOOKUP_CLASSIFIER: &str = "You decide whether a question needs current, external \
information (prices, releases, market data, news) to be answered well. \
Respond with ONLY one word: YES or NO.";

pub const WEB_RESEARCHER: &str = "You are a research assistant. Provide current, factual \
information relevant to the user's question: pricing and costs for purchases, latest releases \
and reviews for products, market data for investments. Cite specific numbers, dates, and sources.";

pub const PROPOSER: &str = "You are the Visionary member of the roundtable. You are optimistic, \
bold, and future-focused. Review the user's question and the gathered context, then propose the \
boldest, most ambitious solution with maximum upside. Give specific recommendations, timelines, \
and action steps in at least three paragraphs. Do not just agree or stay vague.";

pub const PROPOSER_SIMPLIFIED: &str =
    "You are an optimistic visionary. Provide a bold, detailed proposal for the user's question.";

pub const CRITIC: &str = "You are the Skeptic member of the roundtable. You are analytical, \
risk-averse, and detail-oriented. Check the latest proposal against the actual data provided: \
time conflicts with calendar events, budget constraints, existing commitments and deadlines. \
If the data conflicts with the plan, reject it and propose a conservative alternative.";

pub const MODERATOR: &str = "You are the Chair, the moderator of the roundtable. You are \
balanced, decisive, and pragmatic, and you protect the user from reckless decisions. Weigh the \
proposal against the critique and the user's data. When you reach a decision, line 1 of your \
response MUST be either 'DECISION: SUPPORT' or 'DECISION: OPPOSE', followed by the primary \
reason, the key risks, and your recommendation.";

/// Labelled proposal used when the model keeps returning nothing useful.
pub const FALLBACK_PROPOSAL: &str = "[fallback proposal] I believe we should pursue this \
opportunity with ambition and confidence. The potential benefits outweigh the risks, and with \
proper planning this can be a transformative decision.";

pub fn speaker_label(role: AgentRole) -> &'static str {
    match role {
        AgentRole::ContextGatherer => "Chief of Staff",
        AgentRole::Proposer => "Visionary",
        AgentRole::Critic => "Skeptic",
        AgentRole::Moderator => "Chair",
    }
}

/// Map the turn log onto chat messages. Agent turns are prefixed with the
/// speaker so every agent can tell who said what.
pub fn history_messages(turns: &[Turn]) -> Vec<ChatMessage> {
    turns
        .iter()
        .map(|turn| match turn.author {
            None => ChatMessage::user(turn.content.clone()),
            Some(role) => {
                ChatMessage::assistant(format!("[{}] {}", speaker_label(role), turn.content))
            }
        })
        .collect()
}

pub fn lookup_question(question: &str) -> String {
    format!("Question: \"{question}\"\n\nDoes answering this need current external information?")
}

pub fn web_findings_request(question: &str) -> String {
    format!(
        "The user asked: \"{question}\"\n\nSummarize the relevant current findings with their sources."
    )
}

pub fn proposal_directive(question: &str) -> String {
    format!(
        "Visionary, based on the context above about '{question}', provide your bold, visionary proposal. Be specific and detailed."
    )
}

pub fn simplified_proposal(question: &str) -> String {
    format!("Question: {question}\n\nProvide your ambitious, detailed proposal (minimum 200 words):")
}

/// Round directive for the moderator. The final round forbids deferring.
pub fn moderator_directive(round: u32, max_rounds: u32) -> String {
    if round >= max_rounds {
        format!(
            "DEBATE STATUS: round {round} of {max_rounds}. FINAL ROUND: you MUST produce a final \
decision now. Start with 'DECISION: SUPPORT' or 'DECISION: OPPOSE'."
        )
    } else {
        format!(
            "DEBATE STATUS: round {round} of {max_rounds}. Review the debate and choose one:\n\
- OPPOSE if the idea is reckless, risky, or unfeasible ('DECISION: OPPOSE')\n\
- SUPPORT if the idea is viable, with conditions ('DECISION: SUPPORT')\n\
- NEEDS_REVISION if the panel should debate another round"
        )
    }
}
