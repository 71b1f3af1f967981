//! Offline replay of probe event scripts.
//!
//! The live agent feeds the engine from probes attached inside the traced
//! process. For development and validation the same event stream can be
//! captured to a JSON-lines script and replayed here: one JSON object per
//! line, tagged by `event`.
//!
//! ```text
//! {"event":"transition","task":1,"prev":1,"new":2,"token":0,"thread":100}
//! {"event":"begin","key":5,"thread":100,"fields":{"http.method":"GET"}}
//! {"event":"end","key":5}
//! ```

use crate::context::{CreationToken, TaskId, ThreadId};
use crate::emitter::WireRecord;
use crate::engine::CorrelationEngine;
use crate::extract::{Field, FieldSet};
use crate::propagation::SpanRecord;
use crate::scheduler::TransitionEvent;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::BufRead;
use thiserror::Error;
use tracing::debug;

/// One line of a replay script.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ScriptEvent {
    Transition {
        task: u64,
        #[serde(default, alias = "prev")]
        prev_status: u32,
        #[serde(alias = "new")]
        new_status: u32,
        #[serde(default, alias = "token")]
        creation_token: u64,
        thread: u64,
    },
    Begin {
        key: u64,
        thread: u64,
        #[serde(default)]
        fields: BTreeMap<String, String>,
    },
    End {
        key: u64,
    },
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read script: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad script event on line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },
}

/// Everything a replay produced.
#[derive(Debug, Default)]
pub struct ReplayOutcome {
    /// Script events applied.
    pub events: usize,
    /// Spans completed by `end` events, in completion order.
    pub spans: Vec<SpanRecord>,
    /// Records the collector would have received, in drain order.
    pub records: Vec<WireRecord>,
}

/// Replay a script through `engine`, draining the record channel as it goes
/// so the bounded channel never forces drops the live path would not have.
pub fn replay<R: BufRead>(
    engine: &CorrelationEngine,
    reader: R,
) -> Result<ReplayOutcome, ReplayError> {
    let mut outcome = ReplayOutcome::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event: ScriptEvent = serde_json::from_str(trimmed).map_err(|source| {
            ReplayError::Parse {
                line: idx + 1,
                source,
            }
        })?;
        apply(engine, event, &mut outcome);
        outcome.events += 1;
        engine.drain_records(usize::MAX, &mut outcome.records);
    }

    debug!(
        events = outcome.events,
        spans = outcome.spans.len(),
        records = outcome.records.len(),
        "replay complete"
    );
    Ok(outcome)
}

fn apply(engine: &CorrelationEngine, event: ScriptEvent, outcome: &mut ReplayOutcome) {
    match event {
        ScriptEvent::Transition {
            task,
            prev_status,
            new_status,
            creation_token,
            thread,
        } => {
            engine.observe_transition(&TransitionEvent {
                task: TaskId(task),
                previous_status: prev_status,
                new_status,
                creation_token: CreationToken(creation_token),
                os_thread: ThreadId(thread),
            });
        }
        ScriptEvent::Begin {
            key,
            thread,
            fields,
        } => {
            let mut set = FieldSet::empty();
            for (name, value) in &fields {
                // Past the fixed field budget the rest is dropped, same as
                // a live adapter would.
                set.push(Field::new(name, value.as_bytes()));
            }
            engine.begin_span_on(ThreadId(thread), key, set);
        }
        ScriptEvent::End { key } => {
            if let Some(record) = engine.end_span(key) {
                outcome.spans.push(record);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::io::Cursor;

    fn engine() -> CorrelationEngine {
        CorrelationEngine::new(EngineConfig::with_capacity(64)).unwrap()
    }

    #[test]
    fn test_replay_end_to_end_script() {
        let script = r#"
# parent starts running, creates a child, both produce spans
{"event":"transition","task":1,"prev":1,"new":2,"token":0,"thread":100}
{"event":"transition","task":2,"prev":0,"new":1,"token":51966,"thread":100}
{"event":"transition","task":2,"prev":1,"new":2,"token":51966,"thread":101}
{"event":"begin","key":10,"thread":100,"fields":{"http.method":"GET"}}
{"event":"begin","key":20,"thread":101}
{"event":"end","key":20}
{"event":"end","key":10}
"#;
        let e = engine();
        let outcome = replay(&e, Cursor::new(script)).unwrap();

        assert_eq!(outcome.events, 7);
        assert_eq!(outcome.spans.len(), 2);

        let child = &outcome.spans[0];
        let parent = &outcome.spans[1];
        assert_eq!(child.instance_key, 20);
        assert_eq!(parent.instance_key, 10);
        // Child inherited the parent's trace through the lineage walk.
        assert_eq!(child.context.trace_id, parent.context.trace_id);
        assert_eq!(child.parent_context, Some(parent.context));
        assert!(parent.is_root);
        assert_eq!(
            parent.fields.get("http.method").unwrap().as_bytes(),
            b"GET"
        );
    }

    #[test]
    fn test_replay_rejects_malformed_line() {
        let e = engine();
        let err = replay(&e, Cursor::new("{\"event\":\"nope\"}\n")).unwrap_err();
        assert!(matches!(err, ReplayError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_replay_skips_blank_and_comment_lines() {
        let e = engine();
        let outcome = replay(&e, Cursor::new("\n# nothing\n\n")).unwrap();
        assert_eq!(outcome.events, 0);
    }

    #[test]
    fn test_replay_end_without_begin_is_quiet() {
        let e = engine();
        let outcome = replay(&e, Cursor::new("{\"event\":\"end\",\"key\":9}\n")).unwrap();
        assert_eq!(outcome.events, 1);
        assert!(outcome.spans.is_empty());
    }
}
