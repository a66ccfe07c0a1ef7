//! A high/low dice table driven through a croupier connector.
//!
//! Runs offline against canned replies by default. Set `CROUPIER_LAUNCH`
//! to the platform's launch query to play against a real server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use croupier::prelude::*;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const START_REPLY: &str = r#"{"credits":100,"code":"OK","config":{"bet":{"type":"step","min":1,"max":10,"step":1,"default":2}}}"#;
const BET_REPLY: &str = r#"{"credits":102,"code":"OK","win":4,"gameData":{"dice":[5,6]}}"#;

// ---------------------------------------------------------------------------
// Table state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Table {
    credits: f64,
    stake: f64,
    amounts: Vec<f64>,
    rounds: u32,
}

type Shared = Arc<Mutex<Table>>;

/// What the game loop waits on after each request.
#[derive(Debug)]
enum Outcome {
    Done(Operation),
    Abandoned(Operation, ErrorReply),
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

struct StartHandlers {
    table: Shared,
    outcomes: mpsc::UnboundedSender<Outcome>,
}

impl RequestHandlers for StartHandlers {
    fn on_recv_success(&mut self, op: Operation, reply: &Value) {
        // Standalone sessions without a canned reply answer with `{}`.
        if let Ok(start) = serde_json::from_value::<StartGameReply>(reply.clone()) {
            let mut table = lock(&self.table);
            table.credits = start.credits;
            table.amounts = start.config.bet.amounts();
            table.stake = start
                .config
                .bet
                .default_bet()
                .or_else(|| table.amounts.first().copied())
                .unwrap_or(1.0);
            tracing::info!(credits = table.credits, stake = table.stake, "table open");
        }
        let _ = self.outcomes.send(Outcome::Done(op));
    }

    fn on_abandoned(&mut self, op: Operation, error: &ErrorReply) {
        let _ = self.outcomes.send(Outcome::Abandoned(op, error.clone()));
    }
}

struct BetHandlers {
    table: Shared,
    outcomes: mpsc::UnboundedSender<Outcome>,
    /// Credits before the stake was taken, for rollback.
    held: Option<f64>,
}

impl RequestHandlers for BetHandlers {
    fn build_payload(&mut self, _op: Operation) -> Map<String, Value> {
        let mut table = lock(&self.table);
        let pick = if table.rounds % 2 == 0 { "high" } else { "low" };
        self.held = Some(table.credits);
        table.credits -= table.stake;
        match json!({ "bet": table.stake, "gameData": { "pick": pick } }) {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn on_send(&mut self, _op: Operation, attempt: u32) {
        tracing::debug!(attempt, "bet sent");
    }

    fn on_recv_success(&mut self, op: Operation, reply: &Value) {
        if let Ok(bet) = serde_json::from_value::<BetReply>(reply.clone()) {
            let mut table = lock(&self.table);
            table.credits = bet.credits;
            table.rounds += 1;
            tracing::info!(
                dice = %bet.game_data["dice"],
                win = bet.win,
                credits = bet.credits,
                "round settled"
            );
        }
        self.held = None;
        let _ = self.outcomes.send(Outcome::Done(op));
    }

    fn on_recv_error(&mut self, _op: Operation, error: &ErrorReply) {
        tracing::warn!(%error, "bet rejected");
    }

    fn roll_back(&mut self, _op: Operation) {
        if let Some(credits) = self.held.take() {
            lock(&self.table).credits = credits;
            tracing::info!(credits, "stake returned");
        }
    }

    fn on_abandoned(&mut self, op: Operation, error: &ErrorReply) {
        let _ = self.outcomes.send(Outcome::Abandoned(op, error.clone()));
    }
}

fn lock(table: &Shared) -> std::sync::MutexGuard<'_, Table> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn dice_schemas() -> GameDataSchemas {
    GameDataSchemas {
        bet_send: json!({
            "type": "object",
            "properties": { "pick": { "enum": ["high", "low"] } },
            "required": ["pick"]
        }),
        bet_reply: json!({
            "type": "object",
            "properties": {
                "dice": { "type": "array", "items": { "type": "integer" } }
            },
            "required": ["dice"]
        }),
        ..GameDataSchemas::default()
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("dice_client=info".parse()?))
        .init();

    let config = match std::env::var("CROUPIER_LAUNCH") {
        Ok(query) => ConnectorConfig::from_launch_params(&query)?,
        Err(_) => ConnectorConfig {
            standalone: true,
            ..ConnectorConfig::default()
        },
    };
    let standalone = config.standalone;

    let table = Shared::default();
    let (outcome_tx, mut outcomes) = mpsc::unbounded_channel();
    let (event_tx, mut events) = mpsc::unbounded_channel::<ConnectorEvent>();

    let mut builder = Connector::builder()
        .config(config)
        .game_data(dice_schemas())
        .notifier(event_tx)
        .handlers(
            Operation::StartGame,
            StartHandlers {
                table: table.clone(),
                outcomes: outcome_tx.clone(),
            },
        )
        .handlers(
            Operation::Bet,
            BetHandlers {
                table: table.clone(),
                outcomes: outcome_tx,
                held: None,
            },
        );
    if standalone {
        builder = builder
            .test_mode(Operation::StartGame, TestMode::canned(START_REPLY))
            .test_mode(
                Operation::Bet,
                TestMode::canned(BET_REPLY).with_latency(Duration::from_millis(300)),
            );
    }
    let connector = builder.spawn(WebSocketDialer)?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ConnectorEvent::Notice(notice) if notice.is_fatal() => {
                    tracing::error!(%notice, "session lost")
                }
                ConnectorEvent::Notice(notice) => tracing::info!(%notice),
                other => tracing::debug!(event = ?other, "connector event"),
            }
        }
    });

    let state = connector.connect(Duration::from_secs(5), 3).await?;
    if state != ConnectionState::Normal {
        return Err(format!("could not reach the table ({state})").into());
    }

    connector.request(Operation::StartGame).await?;
    for round in 0..3 {
        match outcomes.recv().await {
            Some(Outcome::Done(op)) => tracing::debug!(%op, "done"),
            Some(Outcome::Abandoned(op, error)) => {
                tracing::warn!(%op, %error, "request abandoned");
            }
            None => break,
        }
        tracing::info!(round, "placing bet");
        connector.request(Operation::Bet).await?;
    }
    let _ = outcomes.recv().await;

    let table = lock(&table);
    println!(
        "{} rounds played, {} credits left",
        table.rounds, table.credits
    );
    drop(table);

    connector.shutdown().await?;
    connector.closed().await;
    Ok(())
}
