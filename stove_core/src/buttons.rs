//! Button events → user commands.

use crossbeam_channel as xch;
use std::time::Duration;
use stove_traits::{Button, ButtonEvent};

use crate::error::Result;
use crate::hw_error::map_hw_error;
use crate::tasks::{Shutdown, TaskGroup};

/// How long a listener blocks in `wait_event` before re-checking shutdown.
const EVENT_POLL: Duration = Duration::from_millis(200);
/// Back-off after a failing button read.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    Open,
    Close,
    OpenMore,
    CloseMore,
    ToggleAuto,
    /// Fresh wood was added.
    Recharge,
}

/// What a physical button is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonRole {
    Open,
    Close,
    Auto,
    Recharge,
}

impl ButtonRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ButtonRole::Open => "open",
            ButtonRole::Close => "close",
            ButtonRole::Auto => "auto",
            ButtonRole::Recharge => "recharge",
        }
    }

    /// The command an event on this button stands for.
    pub fn command_for(self, event: ButtonEvent) -> Option<UserCommand> {
        use UserCommand as C;
        match (self, event) {
            (_, ButtonEvent::Tick(n)) if n > 0 => Some(C::OpenMore),
            (_, ButtonEvent::Tick(n)) if n < 0 => Some(C::CloseMore),
            (_, ButtonEvent::Tick(_)) => None,
            (ButtonRole::Open, ButtonEvent::Click) => Some(C::Open),
            (ButtonRole::Open, ButtonEvent::LongClick) => Some(C::OpenMore),
            (ButtonRole::Close, ButtonEvent::Click) => Some(C::Close),
            (ButtonRole::Close, ButtonEvent::LongClick) => Some(C::CloseMore),
            (ButtonRole::Auto, ButtonEvent::Click) => Some(C::ToggleAuto),
            (ButtonRole::Auto, ButtonEvent::LongClick) => Some(C::Recharge),
            (ButtonRole::Recharge, _) => Some(C::Recharge),
        }
    }
}

/// Forward commands from one button until shutdown or until nobody listens.
pub fn listen<B: Button>(
    mut button: B,
    role: ButtonRole,
    commands: xch::Sender<UserCommand>,
    shutdown: Shutdown,
) {
    while !shutdown.is_requested() {
        match button.wait_event(EVENT_POLL) {
            Ok(Some(event)) => {
                let Some(command) = role.command_for(event) else {
                    continue;
                };
                tracing::debug!(button = role.as_str(), ?event, ?command, "button pressed");
                if commands.send(command).is_err() {
                    tracing::debug!("command receiver gone, button listener exiting");
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(button = role.as_str(), error = %map_hw_error(&*e), "button read failed");
                if !shutdown.sleep(ERROR_BACKOFF) {
                    break;
                }
            }
        }
    }
}

pub fn spawn_listener<B: Button + Send + 'static>(
    group: &mut TaskGroup,
    button: B,
    role: ButtonRole,
    commands: xch::Sender<UserCommand>,
) -> Result<()> {
    group.spawn(format!("button-{}", role.as_str()), move |shutdown| {
        listen(button, role, commands, shutdown);
    })
}
