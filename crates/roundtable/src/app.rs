//! Interactive session: dispatches REPL commands and streams the debate.
//!
//! Workflow and retry events are drained on the same task that drives the
//! run, so the transcript prints in node order and cooldown notices appear
//! between the turns they delay.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use coordination::{
    CalendarProvider, DebateService, RetryEvent, RunOutcome, SessionError, WorkflowError,
    WorkflowEvent,
};

use crate::cli::{Command, HELP};
use crate::render;

/// Turns replayed when joining an existing session.
pub const GREETING_TURNS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct App<W> {
    service: DebateService,
    calendar: Arc<dyn CalendarProvider>,
    session: String,
    events: UnboundedReceiver<WorkflowEvent>,
    retries: UnboundedReceiver<RetryEvent>,
    out: W,
}

impl<W: Write> App<W> {
    pub fn new(
        service: DebateService,
        calendar: Arc<dyn CalendarProvider>,
        session: impl Into<String>,
        events: UnboundedReceiver<WorkflowEvent>,
        retries: UnboundedReceiver<RetryEvent>,
        out: W,
    ) -> Self {
        Self {
            service,
            calendar,
            session: session.into(),
            events,
            retries,
            out,
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Banner plus the tail of an existing session.
    pub async fn greet(&mut self) -> Result<()> {
        writeln!(self.out, "THE ROUNDTABLE - session {}", self.session)?;
        let state = match self.service.state(&self.session).await {
            Ok(state) => state,
            Err(e) => {
                writeln!(self.out, "Could not read session history: {e}")?;
                return Ok(());
            }
        };
        let Some(state) = state.filter(|s| !s.turns.is_empty()) else {
            writeln!(self.out, "New session. Type /help for commands.")?;
            return Ok(());
        };

        writeln!(
            self.out,
            "Resuming session with {} turns. Last messages:",
            state.turns.len()
        )?;
        let skip = state.turns.len().saturating_sub(GREETING_TURNS);
        for turn in &state.turns[skip..] {
            write!(self.out, "{}", render::turn(turn))?;
        }
        if !state.is_complete() {
            writeln!(self.out, "The last debate was interrupted; type /resume to continue.")?;
        }
        Ok(())
    }

    /// Run one command. `cancel` interrupts a debate in progress.
    pub async fn handle(&mut self, command: Command, cancel: CancellationToken) -> Result<Flow> {
        match command {
            Command::Exit => return Ok(Flow::Exit),
            Command::Help => writeln!(self.out, "{HELP}")?,
            Command::Ask(question) => {
                let result = self.drive_ask(&question, cancel).await;
                self.report(result)?;
            }
            Command::Resume => {
                let result = self.drive_resume(cancel).await;
                self.report(result)?;
            }
            Command::History(limit) => match self.service.history(&self.session, limit).await {
                Ok(turns) if turns.is_empty() => writeln!(self.out, "No history yet.")?,
                Ok(turns) => {
                    for turn in &turns {
                        write!(self.out, "{}", render::turn(turn))?;
                    }
                }
                Err(e) => writeln!(self.out, "Could not read history: {e}")?,
            },
            Command::Schedule {
                start,
                end,
                summary,
            } => match self.calendar.create_event(&summary, start, end).await {
                Ok(ack) => writeln!(self.out, "Scheduled {:?} ({})", ack.summary, ack.id)?,
                Err(e) => writeln!(self.out, "Could not schedule: {e}")?,
            },
        }
        Ok(Flow::Continue)
    }

    async fn drive_ask(
        &mut self,
        question: &str,
        cancel: CancellationToken,
    ) -> Result<Result<RunOutcome, WorkflowError>> {
        let run = self.service.ask(&self.session, question, cancel);
        stream(run, &mut self.events, &mut self.retries, &mut self.out).await
    }

    async fn drive_resume(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<Result<RunOutcome, WorkflowError>> {
        let run = self.service.resume(&self.session, cancel);
        stream(run, &mut self.events, &mut self.retries, &mut self.out).await
    }

    fn report(&mut self, result: Result<Result<RunOutcome, WorkflowError>>) -> Result<()> {
        match result? {
            Ok(outcome) => writeln!(self.out, "{}", render::outcome(&outcome))?,
            Err(WorkflowError::Session(SessionError::Busy { session_id })) => writeln!(
                self.out,
                "Session {session_id} is in use by another run. Use --break-lock if that run crashed."
            )?,
            Err(WorkflowError::NothingToResume(_)) => {
                writeln!(self.out, "Nothing to resume; ask a new question.")?
            }
            Err(WorkflowError::EmptyQuestion) => writeln!(self.out, "Ask a question first.")?,
            Err(e) => {
                warn!(error = %e, "debate failed");
                writeln!(self.out, "{}", render::failure(&e))?
            }
        }
        Ok(())
    }
}

/// Drive `run` to completion while printing events as they arrive.
async fn stream<F, W>(
    run: F,
    events: &mut UnboundedReceiver<WorkflowEvent>,
    retries: &mut UnboundedReceiver<RetryEvent>,
    out: &mut W,
) -> Result<Result<RunOutcome, WorkflowError>>
where
    F: std::future::Future<Output = Result<RunOutcome, WorkflowError>>,
    W: Write,
{
    tokio::pin!(run);
    let result = loop {
        tokio::select! {
            biased;
            Some(event) = events.recv() => {
                write!(out, "{}", render::event(&event))?;
                out.flush()?;
            }
            Some(retry) = retries.recv() => {
                writeln!(out, "{}", render::cooldown(&retry))?;
                out.flush()?;
            }
            result = &mut run => break result,
        }
    };
    // anything emitted right before the run returned
    while let Ok(event) = events.try_recv() {
        write!(out, "{}", render::event(&event))?;
    }
    while let Ok(retry) = retries.try_recv() {
        writeln!(out, "{}", render::cooldown(&retry))?;
    }
    Ok(result)
}
