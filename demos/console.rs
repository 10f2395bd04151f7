//! Interactive console for poking a running actor system.
//!
//! Commands, whitespace-tokenised, one per line:
//!
//! - `test <src> <dst>`: send an empty message to `<src>`; the `Hello`
//!   actors re-dispatch it to the actor named by the message kind, so
//!   `test Hello1 World1` starts a ping-pong between the two.
//! - `perf`: probe every `Hello` actor for its throughput.
//! - `del <name>`: release an actor.
//! - `exit`: clean shutdown.
//!
//! Run with `RUST_LOG=troupe=debug` to watch the runtime's lifecycle logs.

use std::{
    io::{self, BufRead},
    time::Instant,
};

use tracing_subscriber::EnvFilter;
use troupe::{Actor, ActorSystem, Context, Delivery, Envelope, SendError, DEFAULT_WORKERS};

type Ctx<'a> = Context<'a, String, String, ()>;
type Env = Envelope<String, String, ()>;

/// Forwards every message to the actor named by its kind and tracks
/// throughput; a `perf` probe prints it.
#[derive(Default)]
struct Hello {
    count: u64,
    watch: Option<Instant>,
}

impl Actor<String, String, ()> for Hello {
    fn on_message(&mut self, envelope: Env, ctx: &Ctx<'_>) {
        let Envelope { kind, .. } = envelope;
        if kind == "perf" {
            match self.watch {
                Some(watch) if watch.elapsed().as_millis() > 0 => {
                    let qps = self.count as f64 * 1000.0 / watch.elapsed().as_millis() as f64;
                    println!("{}: qps {:.2}", ctx.id(), qps);
                }
                _ => println!("{}: message count {}", ctx.id(), self.count),
            }
            return;
        }
        if self.watch.is_none() {
            self.watch = Some(Instant::now());
        }
        self.count += 1;
        let target = kind.clone();
        report(ctx.id(), ctx.send(&target, kind, ()));
    }
}

/// Echoes every message straight back to its sender.
struct World;

impl Actor<String, String, ()> for World {
    fn on_message(&mut self, envelope: Env, ctx: &Ctx<'_>) {
        let Envelope { source, kind, .. } = envelope;
        report(ctx.id(), ctx.send(&source, kind, ()));
    }
}

fn report(who: &str, result: Result<Delivery, SendError<()>>) {
    match result {
        Ok(Delivery::Queued) => {}
        Ok(Delivery::Overhead) => eprintln!("{who}: target mailbox is backlogged"),
        Err(err) => eprintln!("{who}: send failed: {err}"),
    }
}

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let system: ActorSystem<String, String, ()> = ActorSystem::pool(DEFAULT_WORKERS)?;
    for i in 1..=4 {
        system
            .register(format!("Hello{i}"), Hello::default())
            .expect("register Hello actor");
        system
            .register(format!("World{i}"), World)
            .expect("register World actor");
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        match parts.next() {
            None => {}
            Some("exit") => break,
            Some("test") => match (parts.next(), parts.next()) {
                (Some(src), Some(dst)) => report(
                    "console",
                    system.send("console".to_string(), &src.to_string(), dst.to_string(), ()),
                ),
                _ => eprintln!("usage: test <src> <dst>"),
            },
            Some("perf") => {
                for i in 1..=4 {
                    report(
                        "console",
                        system.send(
                            "console".to_string(),
                            &format!("Hello{i}"),
                            "perf".to_string(),
                            (),
                        ),
                    );
                }
            }
            Some("del") => match parts.next() {
                Some(name) => system.release(&name.to_string()),
                None => eprintln!("usage: del <name>"),
            },
            Some(other) => eprintln!("unknown command: {other}"),
        }
    }

    system.shutdown();
    Ok(())
}
