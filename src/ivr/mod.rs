//! IVR call flow
//!
//! Each inbound call runs in its own task through four phases: answer, greet,
//! menu, dispatch. Every remote operation on a call is awaited before the next
//! one is issued. Failures are logged and end the flow for that call; the
//! caller never hears an error message.

pub mod config;
pub mod menu;
pub mod registry;

pub use config::IvrConfig;
pub use menu::MenuSelection;
pub use registry::{CallRecord, CallRegistry, CallSummary, IvrState};

use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::mail::{build_voicemail_notification, MailSender, NotificationSettings};
use crate::voice::{self, Call, CallCondition, IncomingCalls, PromptOptions, RecordOptions, Recording};

/// Result of dispatching one menu selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuOutcome {
    /// Present the menu again
    Repeat,
    /// The menu is done; the call is left in this state
    Done(IvrState),
}

/// Drives calls through the IVR
pub struct IvrHandler {
    config: IvrConfig,
    notification: NotificationSettings,
    mailer: Arc<dyn MailSender>,
    registry: Arc<CallRegistry>,
}

impl std::fmt::Debug for IvrHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IvrHandler")
            .field("config", &self.config)
            .field("notification", &self.notification)
            .finish()
    }
}

impl IvrHandler {
    pub fn new(
        config: IvrConfig,
        notification: NotificationSettings,
        mailer: Arc<dyn MailSender>,
        registry: Arc<CallRegistry>,
    ) -> Self {
        Self {
            config,
            notification,
            mailer,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<CallRegistry> {
        &self.registry
    }

    /// Run one call through the IVR. Never fails; errors are logged.
    pub async fn handle_call(&self, call: &dyn Call) {
        let span = info_span!("call", call_id = %call.id(), from = %call.from());
        async {
            self.registry.register(call.id(), call.from(), call.to()).await;

            let state = self.run(call).await;
            if state == IvrState::PlayingHours {
                // nothing more to do; keep the call tracked until the caller hangs up
                if let Err(e) = call.wait_for(CallCondition::Ended).await {
                    debug!(error = %e, "Stopped waiting for hangup");
                }
            }

            self.registry.finish(call.id()).await;
            info!(?state, "Call flow finished");
        }
        .instrument(span)
        .await
    }

    async fn run(&self, call: &dyn Call) -> IvrState {
        if let Err(e) = call.answer().await {
            error!(error = %e, "Error answering inbound call");
            return self.fail(call).await;
        }

        self.enter(call, IvrState::Greeting).await;
        if let Err(e) = self.play_greeting(call).await {
            error!(error = %e, "Error playing greeting");
            return self.fail(call).await;
        }

        loop {
            self.enter(call, IvrState::Menu).await;
            let digits = match self.play_prompt_list(call).await {
                Ok(digits) => digits,
                Err(e) => {
                    error!(error = %e, "Error presenting menu");
                    return self.fail(call).await;
                }
            };

            let selection = MenuSelection::from_digits(digits.as_deref());
            info!(digits = ?digits, ?selection, "Caller made a selection");
            self.registry
                .record_selection(call.id(), digits.unwrap_or_default())
                .await;

            match self.handle_user_input(call, selection).await {
                Ok(MenuOutcome::Repeat) => continue,
                Ok(MenuOutcome::Done(state)) => return state,
                Err(e) => {
                    error!(error = %e, ?selection, "Error handling caller input");
                    return self.fail(call).await;
                }
            }
        }
    }

    async fn play_greeting(&self, call: &dyn Call) -> voice::Result<()> {
        let playback = call.play_tts(&self.config.greeting).await?;
        call.wait_for_playback(&playback).await
    }

    /// Read the menu and collect one digit; `None` when nothing usable was pressed
    pub async fn play_prompt_list(&self, call: &dyn Call) -> voice::Result<Option<String>> {
        let options = PromptOptions {
            digit_count: 1,
            per_digit_timeout: self.config.digit_timeout(),
            terminators: None,
        };
        let result = call.prompt_tts(&self.config.menu, &options).await?;
        Ok(result.digits)
    }

    /// Act on a menu selection
    pub async fn handle_user_input(
        &self,
        call: &dyn Call,
        selection: MenuSelection,
    ) -> voice::Result<MenuOutcome> {
        match selection {
            MenuSelection::Hours => {
                self.enter(call, IvrState::PlayingHours).await;
                call.play_tts(&self.config.hours).await?;
                Ok(MenuOutcome::Done(IvrState::PlayingHours))
            }
            MenuSelection::Voicemail => {
                self.enter(call, IvrState::Recording).await;
                self.record_voicemail(call).await?;
                Ok(MenuOutcome::Done(IvrState::Recording))
            }
            MenuSelection::Hangup => {
                call.hangup().await?;
                self.enter(call, IvrState::Terminated).await;
                Ok(MenuOutcome::Done(IvrState::Terminated))
            }
            MenuSelection::Repeat | MenuSelection::Invalid => Ok(MenuOutcome::Repeat),
        }
    }

    async fn record_voicemail(&self, call: &dyn Call) -> voice::Result<()> {
        call.play_tts(&self.config.record_prompt).await?;

        // fixed delay, not tied to the prompt finishing
        tokio::time::sleep(self.config.record_delay()).await;

        let options = RecordOptions {
            beep: true,
            terminators: self.config.record_terminators.clone(),
        };
        let recording = call.record_audio(&options).await?;
        info!(recording_url = %recording.url, duration = ?recording.duration, "Voicemail recorded");
        self.registry
            .set_recording(call.id(), recording.url.clone())
            .await;

        call.wait_for(CallCondition::Ended).await?;
        self.notify_owner(call, &recording).await;
        Ok(())
    }

    /// Send the voicemail email. Failures are logged and never retried.
    async fn notify_owner(&self, call: &dyn Call, recording: &Recording) {
        let email = build_voicemail_notification(&self.notification, call.from(), &recording.url);
        match self.mailer.send(&email).await {
            Ok(receipt) => {
                info!(message_id = %receipt.message_id, "Voicemail notification sent");
                self.registry
                    .set_notification(call.id(), receipt.message_id)
                    .await;
            }
            Err(e) => error!(error = %e, "Failed to send voicemail notification"),
        }
    }

    async fn enter(&self, call: &dyn Call, state: IvrState) {
        debug!(?state, "IVR state change");
        self.registry.transition(call.id(), state).await;
    }

    async fn fail(&self, call: &dyn Call) -> IvrState {
        self.enter(call, IvrState::Failed).await;
        IvrState::Failed
    }
}

/// Handle every call from `incoming` on its own task until the stream closes.
pub async fn serve_calls(mut incoming: IncomingCalls, handler: Arc<IvrHandler>) {
    while let Some(call) = incoming.recv().await {
        let handler = handler.clone();
        tokio::spawn(async move {
            handler.handle_call(call.as_ref()).await;
        });
    }
    warn!("Incoming call stream closed");
}
