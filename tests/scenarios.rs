//! End-to-end execution scenarios driving the full reactor surface: event
//! ordering, parallelism, dynamic task insertion, failure policy, and
//! listener error forwarding.

use std::sync::{Arc, Condvar, Mutex};

use anyhow::anyhow;
use cairn::{
    Aggregator, FixedTasks, Listener, Milestone, Reactor, ReactorError, SpawnPool, Task,
    TaskGraphBuilder,
};
use thiserror::Error;

/// Listener appending one line per event to a shared, synchronized log.
#[derive(Clone, Default)]
struct EventLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    fn new() -> Self {
        Self::default()
    }

    fn push(&self, line: String) {
        self.lines.lock().unwrap().push(line);
    }

    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl Listener for EventLog {
    fn on_task_started(&self, task: &dyn Task) -> anyhow::Result<()> {
        self.push(format!("Started {}", task.display_name()));
        Ok(())
    }

    fn on_task_completed(&self, task: &dyn Task) -> anyhow::Result<()> {
        self.push(format!("Ended {}", task.display_name()));
        Ok(())
    }

    fn on_task_failed(
        &self,
        task: &dyn Task,
        error: &anyhow::Error,
        _fatal: bool,
    ) -> anyhow::Result<()> {
        self.push(format!("Failed {} with {}", task.display_name(), error));
        Ok(())
    }

    fn on_attained(&self, milestone: &Milestone) -> anyhow::Result<()> {
        self.push(format!("Attained {milestone}"));
        Ok(())
    }
}

type WorkFn = Arc<dyn Fn(&Reactor, &str) -> anyhow::Result<()> + Send + Sync>;

fn noop_work() -> WorkFn {
    Arc::new(|_, _| Ok(()))
}

/// Task declared in arrow notation: `"m1,m2->id->m3"` requires `m1` and
/// `m2`, is named `id`, and attains `m3`.
struct SpecTask {
    id: String,
    requires: Vec<Milestone>,
    attains: Vec<Milestone>,
    work: WorkFn,
}

impl SpecTask {
    fn parse(spec: &str, work: WorkFn) -> Arc<dyn Task> {
        let tokens: Vec<&str> = spec.split("->").collect();
        Arc::new(Self {
            id: tokens[1].to_string(),
            requires: milestones(tokens[0]),
            attains: tokens.get(2).copied().map(milestones).unwrap_or_default(),
            work,
        })
    }
}

fn milestones(csv: &str) -> Vec<Milestone> {
    csv.split(',')
        .filter(|name| !name.is_empty())
        .map(Milestone::named)
        .collect()
}

impl Task for SpecTask {
    fn requires(&self) -> Vec<Milestone> {
        self.requires.clone()
    }

    fn attains(&self) -> Vec<Milestone> {
        self.attains.clone()
    }

    fn display_name(&self) -> String {
        self.id.clone()
    }

    fn run(&self, reactor: &Reactor) -> anyhow::Result<()> {
        (self.work)(reactor, &self.id)
    }
}

/// Builds a reactor from whitespace-separated arrow notation, all tasks
/// sharing one work function.
fn build_reactor(spec: &str, work: WorkFn) -> Reactor {
    let tasks = spec
        .split_whitespace()
        .map(|node| SpecTask::parse(node, work.clone()))
        .collect();
    let builder = FixedTasks::new(tasks);
    Reactor::new(&[&builder]).unwrap()
}

fn execute(reactor: &Reactor, log: &EventLog) -> Result<(), ReactorError> {
    reactor.execute(Arc::new(SpawnPool), Arc::new(log.clone()))
}

/// Runs with the log listener first and the given listeners behind it,
/// combined through an aggregator.
fn execute_with_extras(
    reactor: &Reactor,
    log: &EventLog,
    extras: Vec<Arc<dyn Listener>>,
) -> Result<(), ReactorError> {
    let mut listeners: Vec<Arc<dyn Listener>> = vec![Arc::new(log.clone())];
    listeners.extend(extras);
    reactor.execute(Arc::new(SpawnPool), Arc::new(Aggregator::new(listeners)))
}

fn index_of(lines: &[String], needle: &str) -> usize {
    lines
        .iter()
        .position(|line| line == needle)
        .unwrap_or_else(|| panic!("event {needle:?} missing from {lines:?}"))
}

fn assert_before(lines: &[String], earlier: &str, later: &str) {
    assert!(
        index_of(lines, earlier) < index_of(lines, later),
        "expected {earlier:?} before {later:?} in {lines:?}"
    );
}

fn sorted(mut lines: Vec<String>) -> Vec<String> {
    lines.sort();
    lines
}

/// Marker error with a payload, so tests can recover the original failure
/// from the reactor error by downcasting.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("boom {0}")]
struct Boom(u32);

/// Listener failing with `Boom(marker)` in exactly one callback.
#[derive(Clone, Copy, PartialEq)]
enum HookPoint {
    Started,
    Completed,
    Failed,
    Attained,
}

struct FailAt {
    hook: HookPoint,
    marker: u32,
}

impl FailAt {
    fn new(hook: HookPoint, marker: u32) -> Arc<dyn Listener> {
        Arc::new(Self { hook, marker })
    }

    fn maybe(&self, hook: HookPoint) -> anyhow::Result<()> {
        if self.hook == hook {
            Err(anyhow::Error::new(Boom(self.marker)))
        } else {
            Ok(())
        }
    }
}

impl Listener for FailAt {
    fn on_task_started(&self, _task: &dyn Task) -> anyhow::Result<()> {
        self.maybe(HookPoint::Started)
    }

    fn on_task_completed(&self, _task: &dyn Task) -> anyhow::Result<()> {
        self.maybe(HookPoint::Completed)
    }

    fn on_task_failed(
        &self,
        _task: &dyn Task,
        _error: &anyhow::Error,
        _fatal: bool,
    ) -> anyhow::Result<()> {
        self.maybe(HookPoint::Failed)
    }

    fn on_attained(&self, _milestone: &Milestone) -> anyhow::Result<()> {
        self.maybe(HookPoint::Attained)
    }
}

/// Blocks every arriving thread until `threshold` of them are inside; the
/// run only finishes if the tasks truly overlap.
struct Latch {
    state: Mutex<(usize, bool)>,
    all_in: Condvar,
    threshold: usize,
}

impl Latch {
    fn new(threshold: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new((0, false)),
            all_in: Condvar::new(),
            threshold,
        })
    }

    fn arrive(&self) {
        let mut state = self.state.lock().unwrap();
        state.0 += 1;
        if state.0 == self.threshold {
            state.1 = true;
            self.all_in.notify_all();
        }
        while !state.1 {
            state = self.all_in.wait(state).unwrap();
        }
    }
}

#[test]
fn sequential_ordering() {
    let reactor = build_reactor("->t1->m1 m1->t2->m2 m2->t3->", noop_work());
    assert_eq!(reactor.len(), 3);

    let log = EventLog::new();
    execute(&reactor, &log).unwrap();

    assert_eq!(
        log.lines(),
        vec![
            "Started t1",
            "Ended t1",
            "Attained m1",
            "Started t2",
            "Ended t2",
            "Attained m2",
            "Started t3",
            "Ended t3",
        ]
    );
}

#[test]
fn dangling_milestone_attains_by_default() {
    let reactor = build_reactor("m1->t1->m2", noop_work());

    let log = EventLog::new();
    execute(&reactor, &log).unwrap();

    assert_eq!(
        log.lines(),
        vec!["Attained m1", "Started t1", "Ended t1", "Attained m2"]
    );
}

#[test]
fn independent_tasks_run_concurrently() {
    let latch = Latch::new(2);
    let work: WorkFn = {
        let latch = latch.clone();
        Arc::new(move |_, _| {
            latch.arrive();
            Ok(())
        })
    };
    let reactor = build_reactor("->t1-> ->t2->", work);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(2)
        .build()
        .unwrap();
    reactor
        .execute(Arc::new(pool), Arc::new(EventLog::new()))
        .unwrap();
}

#[test]
fn downstream_tasks_run_concurrently() {
    // Downstream scheduling goes through a slightly different path than the
    // initial seeding, so exercise the latch behind a shared milestone too.
    let latch = Latch::new(2);
    let work: WorkFn = {
        let latch = latch.clone();
        Arc::new(move |_, id| {
            if id != "t1" {
                latch.arrive();
            }
            Ok(())
        })
    };
    let reactor = build_reactor("->t1->m m->t2-> m->t3->", work);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(2)
        .build()
        .unwrap();
    reactor
        .execute(Arc::new(pool), Arc::new(EventLog::new()))
        .unwrap();
}

#[test]
fn fatal_failure_carries_the_original_error() {
    let work: WorkFn = Arc::new(|_, _| Err(anyhow::Error::new(Boom(42))));
    let reactor = build_reactor("->t1->", work);

    let error = execute(&reactor, &EventLog::new()).unwrap_err();
    let cause = error.cause().expect("aborted run exposes a cause");
    assert_eq!(cause.downcast_ref::<Boom>(), Some(&Boom(42)));
    assert!(error.suppressed().is_empty());
}

#[test]
fn listener_failure_in_on_task_started_is_forwarded() {
    let reactor = build_reactor("->t1->m", noop_work());
    let log = EventLog::new();

    let error = execute_with_extras(
        &reactor,
        &log,
        vec![
            FailAt::new(HookPoint::Started, 1),
            FailAt::new(HookPoint::Started, 2),
        ],
    )
    .unwrap_err();

    assert_eq!(error.cause().unwrap().downcast_ref::<Boom>(), Some(&Boom(1)));
    assert_eq!(error.suppressed().len(), 1);
    assert_eq!(error.suppressed()[0].downcast_ref::<Boom>(), Some(&Boom(2)));
    // The failing start is a reactor failure, not a task failure: the task
    // never ran and nothing downstream was attained.
    assert_eq!(log.lines(), vec!["Started t1"]);
}

#[test]
fn listener_failure_in_on_task_completed_is_forwarded() {
    let reactor = build_reactor("->t1->m", noop_work());

    let error = execute_with_extras(
        &reactor,
        &EventLog::new(),
        vec![
            FailAt::new(HookPoint::Completed, 1),
            FailAt::new(HookPoint::Completed, 2),
        ],
    )
    .unwrap_err();

    assert_eq!(error.cause().unwrap().downcast_ref::<Boom>(), Some(&Boom(1)));
    assert_eq!(error.suppressed().len(), 1);
    assert_eq!(error.suppressed()[0].downcast_ref::<Boom>(), Some(&Boom(2)));
}

#[test]
fn listener_failure_in_on_task_failed_keeps_the_task_error_suppressed() {
    let work: WorkFn = Arc::new(|_, _| Err(anyhow::Error::new(Boom(0))));
    let reactor = build_reactor("->t1->m", work);

    let error = execute_with_extras(
        &reactor,
        &EventLog::new(),
        vec![
            FailAt::new(HookPoint::Failed, 1),
            FailAt::new(HookPoint::Failed, 2),
        ],
    )
    .unwrap_err();

    // The listener failure is primary; the second listener's failure and
    // then the original task error follow as suppressed.
    assert_eq!(error.cause().unwrap().downcast_ref::<Boom>(), Some(&Boom(1)));
    assert_eq!(error.suppressed().len(), 2);
    assert_eq!(error.suppressed()[0].downcast_ref::<Boom>(), Some(&Boom(2)));
    assert_eq!(error.suppressed()[1].downcast_ref::<Boom>(), Some(&Boom(0)));
}

#[test]
fn listener_failure_in_on_attained_is_forwarded() {
    let reactor = build_reactor("->t1->m", noop_work());

    let error = execute_with_extras(
        &reactor,
        &EventLog::new(),
        vec![
            FailAt::new(HookPoint::Attained, 1),
            FailAt::new(HookPoint::Attained, 2),
        ],
    )
    .unwrap_err();

    assert_eq!(error.cause().unwrap().downcast_ref::<Boom>(), Some(&Boom(1)));
    assert_eq!(error.suppressed().len(), 1);
    assert_eq!(error.suppressed()[0].downcast_ref::<Boom>(), Some(&Boom(2)));
}

#[test]
fn dynamic_task_runs_immediately_when_runnable() {
    let noop = noop_work();
    let work: WorkFn = Arc::new(move |reactor, id| {
        if id == "t2" {
            // Its prerequisite is already attained, so it can start at once.
            reactor.add(SpecTask::parse("m1->t3->", noop.clone()));
        }
        Ok(())
    });
    let reactor = build_reactor("->t1->m1 m1->t2->", work);
    assert_eq!(reactor.len(), 2);

    let log = EventLog::new();
    execute(&reactor, &log).unwrap();
    assert_eq!(reactor.len(), 3);

    let lines = log.lines();
    assert_eq!(
        sorted(lines.clone()),
        sorted(
            ["Started t1", "Ended t1", "Attained m1", "Started t2", "Ended t2", "Started t3", "Ended t3"]
                .map(String::from)
                .to_vec()
        )
    );
    assert_before(&lines, "Attained m1", "Started t2");
    assert_before(&lines, "Attained m1", "Started t3");
    assert_before(&lines, "Started t2", "Started t3");
    assert_before(&lines, "Started t3", "Ended t3");
}

#[test]
fn dynamic_task_waits_for_a_later_milestone() {
    let noop = noop_work();
    let work: WorkFn = Arc::new(move |reactor, id| {
        if id == "t2" {
            // Blocks until m3, attained two tasks later.
            reactor.add(SpecTask::parse("m3->t4->", noop.clone()));
        }
        Ok(())
    });
    let reactor = build_reactor("->t1->m1 m1->t2->m2 m2->t3->m3", work);
    assert_eq!(reactor.len(), 3);

    let log = EventLog::new();
    execute(&reactor, &log).unwrap();
    assert_eq!(reactor.len(), 4);

    assert_eq!(
        log.lines(),
        vec![
            "Started t1",
            "Ended t1",
            "Attained m1",
            "Started t2",
            "Ended t2",
            "Attained m2",
            "Started t3",
            "Ended t3",
            "Attained m3",
            "Started t4",
            "Ended t4",
        ]
    );
}

#[test]
fn dynamic_task_with_previously_unknown_milestone() {
    let noop = noop_work();
    let work: WorkFn = Arc::new(move |reactor, id| {
        if id == "t1" {
            // "mx" first appears here, mid-execution; with no contributing
            // task it must attain immediately and release t2.
            reactor.add(SpecTask::parse("mx->t2->", noop.clone()));
        }
        Ok(())
    });
    let reactor = build_reactor("->t1->", work);
    assert_eq!(reactor.len(), 1);

    let log = EventLog::new();
    execute(&reactor, &log).unwrap();
    assert_eq!(reactor.len(), 2);

    let lines = log.lines();
    assert_before(&lines, "Attained mx", "Started t2");
    assert_before(&lines, "Started t2", "Ended t2");
}

#[test]
fn non_fatal_failure_keeps_the_graph_going() {
    let mut graph = TaskGraphBuilder::new();
    let first = graph
        .not_fatal()
        .add("1st", |_| Err(anyhow!("simulated failure")));
    graph.requires(&first).add("2nd", |_| Ok(()));

    let reactor = Reactor::new(&[&graph]).unwrap();
    let log = EventLog::new();
    execute(&reactor, &log).unwrap();

    assert_eq!(
        log.lines(),
        vec![
            "Started 1st",
            "Failed 1st with simulated failure",
            "Attained 1st",
            "Started 2nd",
            "Ended 2nd",
            "Attained 2nd",
        ]
    );
}

#[test]
fn non_fatal_listener_failure_is_swallowed() {
    let mut graph = TaskGraphBuilder::new();
    let first = graph.not_fatal().add("1st", |_| Err(anyhow!("oops")));
    graph.requires(&first).add("2nd", |_| Ok(()));
    let reactor = Reactor::new(&[&graph]).unwrap();

    let log = EventLog::new();
    execute_with_extras(&reactor, &log, vec![FailAt::new(HookPoint::Failed, 9)]).unwrap();

    // The failed report and its listener error vanish together; downstream
    // work still happened.
    assert_before(&log.lines(), "Attained 1st", "Started 2nd");
    assert!(log.lines().contains(&"Ended 2nd".to_string()));
}

#[test]
fn batch_and_piecewise_adds_are_equivalent_before_execution() {
    let spec = "->t1->m1 m1->t2->m2 m2->t3->";

    let batched = build_reactor(spec, noop_work());
    let piecewise = Reactor::new(&[]).unwrap();
    for node in spec.split_whitespace() {
        piecewise.add(SpecTask::parse(node, noop_work()));
    }
    assert_eq!(batched.len(), piecewise.len());

    let batched_log = EventLog::new();
    execute(&batched, &batched_log).unwrap();
    let piecewise_log = EventLog::new();
    execute(&piecewise, &piecewise_log).unwrap();

    assert_eq!(batched_log.lines(), piecewise_log.lines());
}

#[test]
fn second_execution_fails() {
    let reactor = build_reactor("->t1->", noop_work());
    execute(&reactor, &EventLog::new()).unwrap();

    let error = execute(&reactor, &EventLog::new()).unwrap_err();
    assert!(matches!(error, ReactorError::AlreadyExecuted));
}

#[test]
fn empty_reactor_completes() {
    let reactor = Reactor::new(&[]).unwrap();
    assert!(reactor.is_empty());
    execute(&reactor, &EventLog::new()).unwrap();
}

#[test]
fn tasks_added_during_execution_appear_in_the_snapshot() {
    let noop = noop_work();
    let work: WorkFn = Arc::new(move |reactor, id| {
        if id == "t1" {
            reactor.add(SpecTask::parse("->late->", noop.clone()));
        }
        Ok(())
    });
    let reactor = build_reactor("->t1->", work);
    execute(&reactor, &EventLog::new()).unwrap();

    let names: Vec<String> = reactor
        .tasks()
        .iter()
        .map(|task| task.display_name())
        .collect();
    assert_eq!(names, vec!["t1", "late"]);
}
