//! Sequential command pipeline
//!
//! Commands run strictly left to right. A failure aborts the remaining
//! commands; mutations already applied to other datasets stay in place.

use crate::observability::{log_event_with_fields, Event, ObservationScope};
use crate::progress::{notify, ProgressCallback};

use super::command::Command;
use super::errors::{ExecutionErrorCode, ExecutionResult};
use super::rows::CommandOutput;
use super::session::Session;

/// Run `commands` against `session`, returning one output per command run
///
/// Stops early, without error, once no groups are left.
pub async fn run_commands(
    session: &mut Session,
    commands: &[Command],
    progress: &dyn ProgressCallback,
) -> ExecutionResult<Vec<CommandOutput>> {
    let mut outputs = Vec::with_capacity(commands.len());
    for (index, command) in commands.iter().enumerate() {
        if session.num_groups() == 0 {
            let skipped = (commands.len() - index).to_string();
            log_event_with_fields(
                Event::CommandComplete,
                &[("reason", "no groups left"), ("skipped", skipped.as_str())],
            );
            break;
        }

        notify("start_command", progress.start_command(command, command.is_streaming()));
        let position = index.to_string();
        let scope = ObservationScope::with_fields(
            "COMMAND",
            &[("command", command.name()), ("index", position.as_str())],
        );
        session.timer_mut().push(command.name());
        let result = command.execute(session).await;
        session.timer_mut().pop();
        notify("end_command", progress.end_command(command));

        match result {
            Ok(output) => {
                let groups = session.num_groups().to_string();
                let rows = output.num_rows().to_string();
                scope.complete_with_fields(&[
                    ("num_groups", groups.as_str()),
                    ("rows", rows.as_str()),
                ]);
                session.metrics().increment_commands_executed();
                outputs.push(output);
            }
            Err(e) => {
                let e = e.with_command(command.name());
                if e.code() == ExecutionErrorCode::ResourceExhausted {
                    log_event_with_fields(
                        Event::ResourceExhausted,
                        &[("command", command.name()), ("reason", e.message())],
                    );
                }
                if e.is_fatal() {
                    scope.fail_fatal(&e.to_string());
                } else {
                    scope.fail(&e.to_string());
                }
                return Err(e);
            }
        }
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use crate::execution::session::SessionOptions;
    use crate::execution::Metric;
    use crate::groupkeys::offset_from_minutes;
    use crate::observability::MetricsRegistry;
    use crate::progress::{ProgressError, ProgressResult};
    use crate::session::{DocStat, Document, ImhotepSession, InMemoryIndex, InMemorySession, SessionInfo};

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<String>>,
    }

    impl ProgressCallback for Recording {
        fn start_session(&self, _: Option<usize>) -> ProgressResult<()> {
            Ok(())
        }

        fn sessions_opened(&self, _: &BTreeMap<String, SessionInfo>) -> ProgressResult<()> {
            Ok(())
        }

        fn start_command(&self, command: &Command, _: bool) -> ProgressResult<()> {
            self.events.lock().unwrap().push(format!("start {}", command.name()));
            Err(ProgressError::Stream("hook down".into()))
        }

        fn end_command(&self, command: &Command) -> ProgressResult<()> {
            self.events.lock().unwrap().push(format!("end {}", command.name()));
            Ok(())
        }
    }

    fn session(capacity: Option<u32>) -> Session {
        let index = InMemoryIndex::new()
            .with_doc(Document::new().int("tier", 1))
            .with_doc(Document::new().int("tier", 2))
            .with_doc(Document::new().int("tier", 2));
        let mut remote = InMemorySession::open("jobs", &index, 0, 1);
        if let Some(capacity) = capacity {
            remote = remote.with_group_capacity(capacity);
        }
        let sessions: Vec<(String, Box<dyn ImhotepSession>)> =
            vec![("jobs".to_string(), Box::new(remote))];
        Session::new(
            sessions,
            SessionOptions {
                group_limit: None,
                max_parallelism: 2,
                timezone: offset_from_minutes(0),
            },
            Arc::new(MetricsRegistry::new()),
        )
    }

    fn counts() -> Command {
        Command::GetGroupStats {
            metrics: vec![Metric::All(DocStat::Count)],
        }
    }

    #[tokio::test]
    async fn test_hooks_wrap_every_command_and_failures_are_ignored() {
        let mut s = session(None);
        let progress = Recording::default();
        let commands = vec![
            Command::IntRegroupFieldIn {
                field: "tier".into(),
                terms: vec![1, 2],
                with_default: false,
            },
            counts(),
        ];
        let outputs = run_commands(&mut s, &commands, &progress).await.unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(
            *progress.events.lock().unwrap(),
            vec![
                "start IntRegroupFieldIn",
                "end IntRegroupFieldIn",
                "start GetGroupStats",
                "end GetGroupStats"
            ]
        );
        match &outputs[1] {
            CommandOutput::GroupStats(rows) => {
                let stats: Vec<i64> = rows.iter().map(|r| r.stats[0]).collect();
                assert_eq!(stats, vec![1, 2]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(s.timer().summary().contains("GetGroupStats"));
    }

    #[tokio::test]
    async fn test_stops_when_no_groups_remain() {
        let mut s = session(None);
        let commands = vec![
            Command::StringRegroupFieldIn {
                field: "tier".into(),
                terms: vec![],
                with_default: false,
            },
            counts(),
        ];
        let progress = Recording::default();
        // the string terms are checked against an int field
        let err = run_commands(&mut s, &commands, &progress).await.unwrap_err();
        assert_eq!(err.code(), ExecutionErrorCode::InvalidCommand);

        let mut s = session(None);
        let commands = vec![
            Command::IntRegroupFieldIn {
                field: "tier".into(),
                terms: vec![],
                with_default: false,
            },
            counts(),
        ];
        let outputs = run_commands(&mut s, &commands, &progress).await.unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(s.num_groups(), 0);
    }

    #[tokio::test]
    async fn test_failure_carries_command_and_ends_hook() {
        let mut s = session(Some(1));
        let progress = Recording::default();
        let commands = vec![Command::IntRegroupFieldIn {
            field: "tier".into(),
            terms: vec![1, 2],
            with_default: true,
        }];
        let err = run_commands(&mut s, &commands, &progress).await.unwrap_err();
        assert_eq!(err.code(), ExecutionErrorCode::ResourceExhausted);
        assert_eq!(err.command(), Some("IntRegroupFieldIn"));
        assert_eq!(err.dataset(), Some("jobs"));
        assert_eq!(progress.events.lock().unwrap().len(), 2);
    }
}
