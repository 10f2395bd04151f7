//! Registration, release, and shutdown behaviour.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;
use troupe::{Actor, ActorSystem, Context, Envelope, RegisterError, SendError};

type System = ActorSystem<String, String, String>;
type Ctx<'a> = Context<'a, String, String, String>;
type Env = Envelope<String, String, String>;

#[derive(Default)]
struct ProbeHandles {
    started: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
    seen: Arc<AtomicUsize>,
}

struct Probe {
    started: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
    seen: Arc<AtomicUsize>,
}

impl ProbeHandles {
    fn actor(&self) -> Probe {
        Probe {
            started: Arc::clone(&self.started),
            stopped: Arc::clone(&self.stopped),
            seen: Arc::clone(&self.seen),
        }
    }
}

impl Actor for Probe {
    fn on_start(&mut self) -> Result<(), troupe::BoxError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_message(&mut self, _envelope: Env, _ctx: &Ctx<'_>) {
        self.seen.fetch_add(1, Ordering::SeqCst);
    }

    fn on_stop(&mut self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

struct FailingStart {
    stopped: Arc<AtomicUsize>,
}

impl Actor for FailingStart {
    fn on_start(&mut self) -> Result<(), troupe::BoxError> {
        Err("refused to start".into())
    }

    fn on_message(&mut self, _envelope: Env, _ctx: &Ctx<'_>) {}

    fn on_stop(&mut self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

struct PanickyStart;

impl Actor for PanickyStart {
    fn on_start(&mut self) -> Result<(), troupe::BoxError> {
        panic!("start exploded");
    }

    fn on_message(&mut self, _envelope: Env, _ctx: &Ctx<'_>) {}
}

fn register_release_roundtrip(system: &System) {
    let handles = ProbeHandles::default();
    system.register("a".to_string(), handles.actor()).unwrap();
    assert!(system.contains(&"a".to_string()));
    assert_eq!(handles.started.load(Ordering::SeqCst), 1);

    system.release(&"a".to_string());
    assert!(!system.contains(&"a".to_string()));
    assert_eq!(handles.stopped.load(Ordering::SeqCst), 1);

    let err = system
        .send(
            "ext".to_string(),
            &"a".to_string(),
            "k".to_string(),
            "p".to_string(),
        )
        .unwrap_err();
    assert!(matches!(err, SendError::NotFound(_)));

    // The name is free again.
    let second = ProbeHandles::default();
    system.register("a".to_string(), second.actor()).unwrap();
    assert!(system.contains(&"a".to_string()));
    system.shutdown();
    assert_eq!(second.stopped.load(Ordering::SeqCst), 1);
}

#[test]
fn register_release_roundtrip_dedicated() {
    register_release_roundtrip(&System::dedicated());
}

#[test]
fn register_release_roundtrip_pooled() {
    register_release_roundtrip(&System::pool(2).unwrap());
}

fn duplicate_name_rejected(system: &System) {
    let first = ProbeHandles::default();
    let second = ProbeHandles::default();
    system.register("dup".to_string(), first.actor()).unwrap();
    let err = system
        .register("dup".to_string(), second.actor())
        .unwrap_err();
    assert!(matches!(err, RegisterError::AlreadyRegistered));
    // The loser's hooks never ran.
    assert_eq!(second.started.load(Ordering::SeqCst), 0);
    assert_eq!(second.stopped.load(Ordering::SeqCst), 0);

    system
        .send(
            "ext".to_string(),
            &"dup".to_string(),
            "k".to_string(),
            "p".to_string(),
        )
        .unwrap();
    system.shutdown();
    assert_eq!(first.seen.load(Ordering::SeqCst), 1);
    assert_eq!(first.stopped.load(Ordering::SeqCst), 1);
}

#[test]
fn duplicate_name_rejected_dedicated() {
    duplicate_name_rejected(&System::dedicated());
}

#[test]
fn duplicate_name_rejected_pooled() {
    duplicate_name_rejected(&System::pool(2).unwrap());
}

fn failed_enter_skips_exit_hook(system: &System) {
    let stopped = Arc::new(AtomicUsize::new(0));
    let err = system
        .register(
            "broken".to_string(),
            FailingStart {
                stopped: Arc::clone(&stopped),
            },
        )
        .unwrap_err();
    assert!(matches!(err, RegisterError::InitFailed(_)));
    assert!(!system.contains(&"broken".to_string()));

    let err = system
        .send(
            "ext".to_string(),
            &"broken".to_string(),
            "k".to_string(),
            "p".to_string(),
        )
        .unwrap_err();
    assert!(matches!(err, SendError::NotFound(_)));

    system.shutdown();
    assert_eq!(stopped.load(Ordering::SeqCst), 0);
}

#[test]
fn failed_enter_skips_exit_hook_dedicated() {
    failed_enter_skips_exit_hook(&System::dedicated());
}

#[test]
fn failed_enter_skips_exit_hook_pooled() {
    failed_enter_skips_exit_hook(&System::pool(2).unwrap());
}

#[test]
fn panicked_enter_is_an_init_failure() {
    let system = System::pool(2).unwrap();
    let err = system
        .register("explosive".to_string(), PanickyStart)
        .unwrap_err();
    assert!(matches!(err, RegisterError::InitFailed(_)));
    assert!(!system.contains(&"explosive".to_string()));
    system.shutdown();
}

#[test]
fn release_is_idempotent() {
    let system = System::dedicated();
    let handles = ProbeHandles::default();
    system.register("a".to_string(), handles.actor()).unwrap();
    system.release(&"a".to_string());
    system.release(&"a".to_string());
    assert_eq!(handles.stopped.load(Ordering::SeqCst), 1);
    // Releasing a name that never existed is a no-op too.
    system.release(&"ghost".to_string());
    system.shutdown();
    assert_eq!(handles.stopped.load(Ordering::SeqCst), 1);
}

#[test]
fn register_after_shutdown_is_rejected() {
    let system = System::pool(2).unwrap();
    system.shutdown();
    let handles = ProbeHandles::default();
    let err = system
        .register("late".to_string(), handles.actor())
        .unwrap_err();
    assert!(matches!(err, RegisterError::ShuttingDown));
    assert_eq!(handles.started.load(Ordering::SeqCst), 0);

    let err = system
        .send(
            "ext".to_string(),
            &"late".to_string(),
            "k".to_string(),
            "p".to_string(),
        )
        .unwrap_err();
    assert!(matches!(err, SendError::NotFound(_)));
}

#[test]
fn shutdown_is_idempotent() {
    let system = System::pool(2).unwrap();
    let handles = ProbeHandles::default();
    system.register("a".to_string(), handles.actor()).unwrap();
    system.shutdown();
    system.shutdown();
    assert_eq!(handles.stopped.load(Ordering::SeqCst), 1);
}

#[test]
fn drop_runs_shutdown() {
    let handles = ProbeHandles::default();
    {
        let system = System::dedicated();
        system.register("a".to_string(), handles.actor()).unwrap();
    }
    assert_eq!(handles.stopped.load(Ordering::SeqCst), 1);
}

/// A shared registration leaves the caller's handle alive after release.
struct Tally {
    seen: usize,
    stopped: bool,
}

impl Actor for Tally {
    fn on_message(&mut self, _envelope: Env, _ctx: &Ctx<'_>) {
        self.seen += 1;
    }

    fn on_stop(&mut self) {
        self.stopped = true;
    }
}

fn shared_actor_outlives_release(system: &System) {
    let tally = Arc::new(Mutex::new(Tally {
        seen: 0,
        stopped: false,
    }));
    system
        .register_shared("tally".to_string(), Arc::clone(&tally))
        .unwrap();
    for _ in 0..3 {
        system
            .send(
                "ext".to_string(),
                &"tally".to_string(),
                "k".to_string(),
                "p".to_string(),
            )
            .unwrap();
    }
    system.release(&"tally".to_string());

    let state = tally.lock();
    assert_eq!(state.seen, 3);
    assert!(state.stopped);
    drop(state);
    system.shutdown();
}

#[test]
fn shared_actor_outlives_release_dedicated() {
    shared_actor_outlives_release(&System::dedicated());
}

#[test]
fn shared_actor_outlives_release_pooled() {
    shared_actor_outlives_release(&System::pool(2).unwrap());
}
