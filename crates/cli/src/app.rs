use std::{fmt::Write as _, sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    signal,
    sync::mpsc,
    time::{self, Interval, MissedTickBehavior},
};
use tracing::{error, info, warn};
use tycoon_core::{
    engine::{Engine, HireOutcome},
    metrics::{format_amount, format_seconds, MetricsSnapshot},
    models::UnitPhase,
};

use crate::commands::{self, Command, HELP};

enum AppEvent {
    Line(String),
    Closed,
}

/// Headless front-end: reads commands from stdin and prints results.
pub struct TycoonApp {
    engine: Arc<Engine>,
    status_interval: Option<Duration>,
}

impl TycoonApp {
    pub fn new(engine: Arc<Engine>, status_interval: Option<Duration>) -> Self {
        Self {
            engine,
            status_interval,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        println!("{}", render_status(&self.engine.metrics()));
        println!("Type 'help' for commands.");

        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(32);
        spawn_input_task(event_tx);

        let mut status = self.status_interval.map(|period| {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });
        let ctrl_c = signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                maybe_event = event_rx.recv() => {
                    match maybe_event {
                        Some(AppEvent::Line(line)) => {
                            if !self.handle_line(&line) {
                                break;
                            }
                        }
                        Some(AppEvent::Closed) | None => {
                            info!("input closed");
                            break;
                        }
                    }
                }
                _ = next_status(&mut status) => {
                    println!("{}", render_status(&self.engine.metrics()));
                }
                result = &mut ctrl_c => {
                    if let Err(err) = result {
                        error!(?err, "failed to listen for ctrl-c");
                    }
                    info!("interrupted");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Returns `false` when the user asked to quit.
    fn handle_line(&mut self, line: &str) -> bool {
        let command = match commands::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return true,
            Err(err) => {
                println!("{err}");
                return true;
            }
        };

        match command {
            Command::Buy { unit, count } => match self.engine.purchase_levels(&unit, count) {
                Ok(purchase) => println!(
                    "Bought {} level(s) of {} for {} (now level {}).",
                    purchase.levels,
                    purchase.unit_id,
                    format_amount(purchase.cost),
                    purchase.new_level
                ),
                Err(err) => println!("Cannot buy {unit}: {err}"),
            },
            Command::Start(unit) => match self.engine.start_manual(&unit) {
                Ok(true) => println!("{unit} started."),
                Ok(false) => println!("{unit} is not ready to start."),
                Err(err) => println!("Cannot start {unit}: {err}"),
            },
            Command::Hire(overseer) => match self.engine.hire(&overseer) {
                Ok(HireOutcome::Hired) => println!("Hired {overseer}."),
                Ok(HireOutcome::AlreadyOwned) => println!("{overseer} already works for you."),
                Err(err) => println!("Cannot hire {overseer}: {err}"),
            },
            Command::Status => println!("{}", render_status(&self.engine.metrics())),
            Command::Help => println!("{HELP}"),
            Command::Quit => return false,
        }
        true
    }
}

fn spawn_input_task(event_tx: mpsc::Sender<AppEvent>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(io::stdin()).lines();
        loop {
            let event = match lines.next_line().await {
                Ok(Some(line)) => AppEvent::Line(line),
                Ok(None) => AppEvent::Closed,
                Err(err) => {
                    warn!(?err, "failed to read stdin");
                    AppEvent::Closed
                }
            };
            let closed = matches!(event, AppEvent::Closed);
            if event_tx.send(event).await.is_err() || closed {
                break;
            }
        }
    });
}

async fn next_status(status: &mut Option<Interval>) {
    match status {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn render_status(snapshot: &MetricsSnapshot) -> String {
    let mut out = format!(
        "Balance {}  |  {}/s",
        format_amount(snapshot.balance),
        format_amount(snapshot.total_income_per_second)
    );
    for unit in &snapshot.units {
        let state = if !unit.unlocked {
            "locked".to_string()
        } else {
            match unit.phase {
                UnitPhase::Idle => "not owned".to_string(),
                UnitPhase::Armed => "ready".to_string(),
                UnitPhase::Counting => format!("{} left", format_seconds(unit.time_remaining)),
            }
        };
        let _ = write!(
            out,
            "\n  {:<10} {:<22} lvl {:>4}  next {:>8}  cycle {:>6}  {}{}",
            unit.unit_id,
            unit.name,
            unit.level,
            format_amount(unit.next_level_cost),
            format_seconds(unit.cycle_seconds),
            state,
            if unit.automated { "  [auto]" } else { "" }
        );
    }
    if let Some(unlock) = &snapshot.next_unlock {
        let _ = write!(
            out,
            "\n  Next unlock: {} needs {} at level {} ({} more levels, ~{})",
            unlock.unit_id,
            unlock.requires,
            unlock.required_level,
            unlock.missing_levels,
            format_amount(unlock.estimated_cost)
        );
    }
    out
}
