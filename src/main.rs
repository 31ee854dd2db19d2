mod backends;
mod catalog;
mod config;
mod dispatch;
mod harness;
mod languages;
mod orchestrator;
mod proctor;
mod session;
mod store;
mod verifier;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, sleep_until, Duration, Instant};
use tracing::{error, info, warn};

use crate::dispatch::Dispatcher;
use crate::orchestrator::RunMode;
use crate::proctor::Transition;
use crate::session::{Session, SessionCommand, SessionError, SessionStatus};
use crate::store::{SessionEvent, StoreClient};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("codex_exam=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    config::init_config_from_env()?;
    languages::init_languages()?;
    info!(
        "Loaded language registry: {:?}",
        languages::get_supported_languages()
    );

    // Catalog load failure is the one fatal session-start error. No automatic
    // retry: the error tells the operator to fix the catalog and restart.
    let catalog_path =
        std::env::var("QUESTIONS_PATH").unwrap_or_else(|_| "./files/questions.json".into());
    let questions = catalog::load_catalog(&catalog_path)
        .context("Failed to load the question catalog at session start")?;

    let session_id = std::env::var("EXAM_SESSION_ID").unwrap_or_else(|_| "local".into());

    info!("Starting exam session worker for session {}", session_id);

    let mut store = StoreClient::from_env().await?;
    wait_for_approval(&mut store, &session_id).await?;

    let dispatcher = Dispatcher::from_config();
    let mut session = Session::new(session_id.clone(), questions, dispatcher);

    // Command intake on its own connection, so BLPOP never blocks writes.
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<SessionCommand>(64);
    let mut intake_store = store.split().await?;
    let intake_session_id = session_id.clone();
    let intake = tokio::spawn(async move {
        loop {
            match intake_store.pop_command(&intake_session_id).await {
                Ok(command) => {
                    if cmd_tx.send(command).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Command intake failed: {:#}. Retrying in 3 seconds...", e);
                    sleep(Duration::from_secs(3)).await;
                }
            }
        }
    });

    let cfg = config::get_config();
    let session_deadline = Instant::now() + Duration::from_secs(cfg.session_duration_secs);
    let deadline_sleep = sleep_until(session_deadline);
    tokio::pin!(deadline_sleep);
    let mut fullscreen_poll = interval(Duration::from_millis(cfg.fullscreen_poll_ms));
    let mut run_seq: u64 = 0;

    info!("Session {} active. Waiting for commands...", session_id);

    loop {
        tokio::select! {
            _ = &mut deadline_sleep => {
                info!(
                    "Session duration elapsed with {} violations; auto-submitting",
                    session.violations()
                );
                finalize(&mut store, &session, SessionStatus::AutoSubmitted).await;
                break;
            }
            _ = fullscreen_poll.tick() => {
                if let Some(required) = session.poll_fullscreen() {
                    warn!("Fullscreen blocker changed: required={}", required);
                    let event = SessionEvent::FullscreenRequired { required };
                    if let Err(e) = store.publish_event(&session_id, &event).await {
                        warn!("Failed to publish fullscreen event: {:#}", e);
                    }
                }
            }
            maybe_command = cmd_rx.recv() => {
                let Some(command) = maybe_command else {
                    warn!(
                        "Command intake closed (terminated={}); ending session loop",
                        session.is_terminated()
                    );
                    break;
                };

                if handle_command(&mut store, &mut session, command, &mut run_seq).await {
                    break;
                }
            }
        }
    }

    intake.abort();
    info!("Session {} worker stopped", session_id);
    Ok(())
}

/// Process one session command. Returns true when the session loop must end.
async fn handle_command(
    store: &mut StoreClient,
    session: &mut Session,
    command: SessionCommand,
    run_seq: &mut u64,
) -> bool {
    let session_id = session.session_id().to_string();

    match command {
        SessionCommand::Run {
            question_id,
            language,
            source,
        } => {
            run_and_report(store, session, question_id, &language, &source, RunMode::Sample, run_seq)
                .await;
            false
        }
        SessionCommand::Submit {
            question_id,
            language,
            source,
        } => {
            run_and_report(store, session, question_id, &language, &source, RunMode::Full, run_seq)
                .await;
            false
        }
        SessionCommand::Select { question_id } => {
            if session.select_question(question_id) {
                if let Some(question) = session.current_question() {
                    let event = SessionEvent::QuestionSelected {
                        question_id: question.id,
                        title: question.title.clone(),
                        description: question.description.clone(),
                    };
                    if let Err(e) = store.publish_event(&session_id, &event).await {
                        warn!("Failed to publish question selection: {:#}", e);
                    }
                }
            } else {
                warn!("Ignoring selection of unknown question {}", question_id);
            }
            false
        }
        SessionCommand::Signal { signal } => {
            let response = session.handle_signal(&signal);

            if response.suppress_default {
                info!("Suppressed default behavior for signal {:?}", signal);
            }

            match response.transition {
                Transition::Ignored => false,
                Transition::Recorded(count) => {
                    // Fire-and-forget: the count is synced on every increment
                    // and a failed write never blocks the state transition.
                    let mut sync_store = store.clone();
                    let sync_session_id = session_id.clone();
                    tokio::spawn(async move {
                        if let Err(e) = sync_store
                            .sync_violation_count(&sync_session_id, count)
                            .await
                        {
                            warn!("Failed to sync violation count: {:#}", e);
                        }
                    });

                    if let Some(kind) = response.violation {
                        let event = SessionEvent::ViolationRecorded {
                            label: kind.label().to_string(),
                            count,
                        };
                        if let Err(e) = store.publish_event(&session_id, &event).await {
                            warn!("Failed to publish violation event: {:#}", e);
                        }
                    }
                    false
                }
                Transition::Terminated(count) => {
                    error!(
                        "Session {} terminated after {} violations",
                        session_id, count
                    );

                    let mut sync_store = store.clone();
                    let sync_session_id = session_id.clone();
                    tokio::spawn(async move {
                        if let Err(e) = sync_store
                            .sync_violation_count(&sync_session_id, count)
                            .await
                        {
                            warn!("Failed to sync final violation count: {:#}", e);
                        }
                    });

                    finalize(store, session, SessionStatus::Disqualified).await;
                    true
                }
            }
        }
        SessionCommand::Finish => {
            info!("Finish requested for session {}", session_id);
            finalize(store, session, SessionStatus::Completed).await;
            true
        }
    }
}

async fn run_and_report(
    store: &mut StoreClient,
    session: &mut Session,
    question_id: u32,
    language: &str,
    source: &str,
    mode: RunMode,
    run_seq: &mut u64,
) {
    let session_id = session.session_id().to_string();

    match session.run(question_id, language, source, mode).await {
        Ok(report) => {
            info!(
                "{}/{} cases passed for question {} (mode {:?})",
                report.passed_count, report.total_count, question_id, mode
            );
            if report.solved {
                info!(
                    "Question {} solved ({} total); session score {}",
                    question_id,
                    session.solved_count(),
                    session.score()
                );
            }

            *run_seq += 1;
            if let Err(e) = store.store_run_report(&session_id, *run_seq, &report).await {
                warn!("Failed to store run report: {:#}", e);
            }
        }
        Err(SessionError::Terminated) => {
            warn!("Rejected submission for terminated session {}", session_id);
        }
        Err(e) => {
            warn!("Rejected submission: {}", e);
        }
    }
}

/// Push the final aggregate state, then request navigation to the results
/// view. A failed store write is logged; the locally computed result stands.
async fn finalize(store: &mut StoreClient, session: &Session, status: SessionStatus) {
    let report = session.final_report(status);
    let session_id = session.session_id();

    info!(
        "Final report for session {}: score={}/{}, violations={}, status={}",
        session_id, report.score, report.max_score, report.total_violations, report.status
    );

    if let Err(e) = store.sync_final(&report).await {
        warn!("Failed to sync final report: {:#}", e);
    }

    let event = SessionEvent::Navigate {
        view: "result".into(),
        report,
    };
    if let Err(e) = store.publish_event(session_id, &event).await {
        warn!("Failed to publish navigation event: {:#}", e);
    }
}

/// Wait until the session has been approved in the store. A session with no
/// status recorded at all proceeds immediately (standalone runs).
async fn wait_for_approval(store: &mut StoreClient, session_id: &str) -> Result<()> {
    loop {
        match store.read_session_status(session_id).await {
            Ok(None) => {
                warn!(
                    "No status recorded for session {}; proceeding without approval gate",
                    session_id
                );
                return Ok(());
            }
            Ok(Some(status)) if status == "approved" => {
                info!("Session {} approved", session_id);
                return Ok(());
            }
            Ok(Some(status)) => {
                info!(
                    "Session {} not approved yet (status={}). Retrying in 2 seconds...",
                    session_id, status
                );
            }
            Err(e) => {
                warn!("Failed to read session status: {:#}. Retrying in 2 seconds...", e);
            }
        }
        sleep(Duration::from_secs(2)).await;
    }
}
