use crate::{AppCommand, AppError, AppResult};

use std::{panic::Location, time::Duration};

use error_location::ErrorLocation;
use tokio::sync::mpsc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Length of one countdown step.
pub(crate) const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Count `seconds` down in `tick` steps, then report the countdown finished.
///
/// Every step is tagged with `session_id` so the app can drop ticks from a
/// session that was stopped or cancelled while the countdown ran.
#[instrument(skip(command_tx))]
pub(crate) async fn run_countdown(
    session_id: Uuid,
    seconds: u32,
    tick: Duration,
    command_tx: mpsc::Sender<AppCommand>,
) -> AppResult<()> {
    for remaining in (1..=seconds).rev() {
        send(
            &command_tx,
            AppCommand::CountdownTick {
                session_id,
                remaining,
            },
        )
        .await?;
        tokio::time::sleep(tick).await;
    }

    debug!("Countdown finished");
    send(&command_tx, AppCommand::CountdownFinished { session_id }).await
}

async fn send(command_tx: &mpsc::Sender<AppCommand>, command: AppCommand) -> AppResult<()> {
    command_tx
        .send(command)
        .await
        .map_err(|e| AppError::ChannelSendFailed {
            message: format!("Failed to send countdown command: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })
}
