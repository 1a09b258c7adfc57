//! End-to-end IVR flow against scripted calls

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use attendant::ivr::{self, CallRegistry, IvrConfig, IvrHandler, IvrState};
use attendant::mail::{
    EmailRequest, MailError, MailSender, NotificationSettings, SendReceipt,
};
use attendant::voice::{
    Call, CallCondition, Playback, PromptOptions, PromptResult, RecordOptions, Recording,
    Result as VoiceResult, VoiceError,
};

const CALLER: &str = "+15551234567";
const RECORDING_URL: &str = "https://cdn.example/rec123.wav";

#[derive(Debug, Clone, PartialEq)]
enum Op {
    Answer,
    Play(String),
    WaitPlayback,
    Prompt(String),
    Record(RecordOptions),
    Hangup,
    WaitFor(CallCondition),
}

/// Call that answers prompts from a script and records what the IVR asked for
struct ScriptedCall {
    id: String,
    digits: Mutex<VecDeque<Option<&'static str>>>,
    fail_answer: bool,
    fail_record: bool,
    ops: Mutex<Vec<(Instant, Op)>>,
}

impl ScriptedCall {
    fn new(id: &str, digits: &[Option<&'static str>]) -> Self {
        Self {
            id: id.to_string(),
            digits: Mutex::new(digits.iter().copied().collect()),
            fail_answer: false,
            fail_record: false,
            ops: Mutex::new(Vec::new()),
        }
    }

    fn log(&self, op: Op) {
        self.ops.lock().push((Instant::now(), op));
    }

    fn ops(&self) -> Vec<Op> {
        self.ops.lock().iter().map(|(_, op)| op.clone()).collect()
    }

    fn timed_ops(&self) -> Vec<(Instant, Op)> {
        self.ops.lock().clone()
    }

    fn prompt_count(&self) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, Op::Prompt(_)))
            .count()
    }
}

#[async_trait]
impl Call for ScriptedCall {
    fn id(&self) -> &str {
        &self.id
    }

    fn from(&self) -> &str {
        CALLER
    }

    fn to(&self) -> &str {
        "+15550000000"
    }

    async fn answer(&self) -> VoiceResult<()> {
        self.log(Op::Answer);
        if self.fail_answer {
            return Err(VoiceError::Rejected {
                method: "calling.answer".to_string(),
                code: "404".to_string(),
                message: "call gone".to_string(),
            });
        }
        Ok(())
    }

    async fn play_tts(&self, text: &str) -> VoiceResult<Playback> {
        self.log(Op::Play(text.to_string()));
        Ok(Playback {
            control_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    async fn wait_for_playback(&self, _playback: &Playback) -> VoiceResult<()> {
        self.log(Op::WaitPlayback);
        Ok(())
    }

    async fn prompt_tts(&self, text: &str, _options: &PromptOptions) -> VoiceResult<PromptResult> {
        self.log(Op::Prompt(text.to_string()));
        match self.digits.lock().pop_front() {
            Some(Some(digits)) => Ok(PromptResult::digits(digits)),
            Some(None) => Ok(PromptResult::no_input()),
            None => Err(VoiceError::CallEnded("prompt".to_string())),
        }
    }

    async fn record_audio(&self, options: &RecordOptions) -> VoiceResult<Recording> {
        self.log(Op::Record(options.clone()));
        if self.fail_record {
            return Err(VoiceError::CallEnded("record".to_string()));
        }
        Ok(Recording {
            id: "rec-control".to_string(),
            url: RECORDING_URL.to_string(),
            duration: Some(12.5),
            size: Some(4096),
        })
    }

    async fn hangup(&self) -> VoiceResult<()> {
        self.log(Op::Hangup);
        Ok(())
    }

    async fn wait_for(&self, condition: CallCondition) -> VoiceResult<()> {
        self.log(Op::WaitFor(condition));
        Ok(())
    }
}

/// Mail sender that keeps every request; the first `failures` sends fail
#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<EmailRequest>>,
    attempts: AtomicUsize,
    failures: usize,
}

#[async_trait]
impl MailSender for RecordingMailer {
    async fn send(&self, request: &EmailRequest) -> Result<SendReceipt, MailError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(MailError::Rejected {
                status: 400,
                body: "MessageRejected".to_string(),
            });
        }
        self.sent.lock().push(request.clone());
        Ok(SendReceipt {
            message_id: format!("msg-{attempt}"),
        })
    }
}

fn settings() -> NotificationSettings {
    NotificationSettings {
        to_addresses: vec!["owner@example.com".to_string()],
        source: "ivr@example.com".to_string(),
        source_arn: Some("arn:aws:ses:us-east-1:123:identity/example.com".to_string()),
        recipient_name: "Sam".to_string(),
    }
}

fn handler(mailer: Arc<RecordingMailer>) -> IvrHandler {
    IvrHandler::new(
        IvrConfig::default(),
        settings(),
        mailer,
        Arc::new(CallRegistry::default()),
    )
}

#[tokio::test]
async fn test_hours_plays_message_and_stops() {
    let config = IvrConfig::default();
    let mailer = Arc::new(RecordingMailer::default());
    let handler = handler(mailer.clone());
    let call = ScriptedCall::new("call-1", &[Some("1")]);

    handler.handle_call(&call).await;

    assert_eq!(
        call.ops(),
        vec![
            Op::Answer,
            Op::Play(config.greeting.clone()),
            Op::WaitPlayback,
            Op::Prompt(config.menu.clone()),
            Op::Play(config.hours.clone()),
            Op::WaitFor(CallCondition::Ended),
        ]
    );
    assert!(mailer.sent.lock().is_empty());

    let record = handler.registry().get("call-1").await.unwrap();
    assert_eq!(record.state, IvrState::PlayingHours);
    assert_eq!(record.selections, vec!["1".to_string()]);
    assert!(!record.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_voicemail_records_after_delay_and_sends_one_mail() {
    let config = IvrConfig::default();
    let mailer = Arc::new(RecordingMailer::default());
    let handler = handler(mailer.clone());
    let call = ScriptedCall::new("call-2", &[Some("2")]);

    handler.handle_call(&call).await;

    let ops = call.timed_ops();
    let prompt_at = ops
        .iter()
        .find(|(_, op)| *op == Op::Play(config.record_prompt.clone()))
        .map(|(at, _)| *at)
        .expect("record prompt played");
    let (record_at, record_options) = ops
        .iter()
        .find_map(|(at, op)| match op {
            Op::Record(options) => Some((*at, options.clone())),
            _ => None,
        })
        .expect("recording started");

    assert!(record_at.duration_since(prompt_at) >= Duration::from_secs(7));
    assert!(record_options.beep);
    assert_eq!(record_options.terminators, "0");

    // mail only goes out once the call is over
    let plain: Vec<Op> = ops.into_iter().map(|(_, op)| op).collect();
    assert_eq!(plain.last(), Some(&Op::WaitFor(CallCondition::Ended)));

    let sent = mailer.sent.lock().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Voicemail Notification");
    assert_eq!(sent[0].to_addresses, vec!["owner@example.com".to_string()]);
    assert!(sent[0].html_body.contains(CALLER));
    assert!(sent[0].html_body.contains(RECORDING_URL));

    let record = handler.registry().get("call-2").await.unwrap();
    assert_eq!(record.state, IvrState::Recording);
    assert_eq!(record.recording_url.as_deref(), Some(RECORDING_URL));
    assert_eq!(record.notification_id.as_deref(), Some("msg-0"));
}

#[tokio::test]
async fn test_repeat_and_invalid_input_present_menu_again() {
    let mailer = Arc::new(RecordingMailer::default());
    let handler = handler(mailer.clone());
    let call = ScriptedCall::new("call-3", &[Some("9"), Some("7"), None, Some("0")]);

    handler.handle_call(&call).await;

    assert_eq!(call.prompt_count(), 4);
    assert_eq!(call.ops().last(), Some(&Op::Hangup));

    let record = handler.registry().get("call-3").await.unwrap();
    assert_eq!(record.state, IvrState::Terminated);
    assert_eq!(record.selections, vec!["9", "7", "", "0"]);
}

#[tokio::test]
async fn test_zero_hangs_up_without_further_prompts() {
    let mailer = Arc::new(RecordingMailer::default());
    let handler = handler(mailer.clone());
    let call = ScriptedCall::new("call-4", &[Some("0")]);

    handler.handle_call(&call).await;

    let ops = call.ops();
    let hangup = ops.iter().position(|op| *op == Op::Hangup).unwrap();
    assert_eq!(hangup, ops.len() - 1);
    assert_eq!(call.prompt_count(), 1);
    assert!(mailer.sent.lock().is_empty());
}

#[tokio::test]
async fn test_answer_failure_abandons_call() {
    let mailer = Arc::new(RecordingMailer::default());
    let handler = handler(mailer.clone());
    let call = ScriptedCall {
        fail_answer: true,
        ..ScriptedCall::new("call-5", &[Some("1")])
    };

    handler.handle_call(&call).await;

    assert_eq!(call.ops(), vec![Op::Answer]);
    let record = handler.registry().get("call-5").await.unwrap();
    assert_eq!(record.state, IvrState::Failed);
    assert!(!record.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_hangup_during_record_delay_sends_no_mail() {
    let mailer = Arc::new(RecordingMailer::default());
    let handler = handler(mailer.clone());
    let call = ScriptedCall {
        fail_record: true,
        ..ScriptedCall::new("call-6", &[Some("2")])
    };

    handler.handle_call(&call).await;

    let ops = call.ops();
    assert!(matches!(ops.last(), Some(Op::Record(_))));
    assert!(!ops.contains(&Op::WaitFor(CallCondition::Ended)));
    assert_eq!(mailer.attempts.load(Ordering::SeqCst), 0);

    let record = handler.registry().get("call-6").await.unwrap();
    assert_eq!(record.state, IvrState::Failed);
    assert!(record.recording_url.is_none());
    assert!(!record.is_active());
}

#[tokio::test]
async fn test_menu_failure_is_not_retried() {
    let mailer = Arc::new(RecordingMailer::default());
    let handler = handler(mailer.clone());
    let call = ScriptedCall::new("call-7", &[]);

    handler.handle_call(&call).await;

    assert_eq!(call.prompt_count(), 1);
    assert!(matches!(call.ops().last(), Some(Op::Prompt(_))));
    assert_eq!(mailer.attempts.load(Ordering::SeqCst), 0);

    let record = handler.registry().get("call-7").await.unwrap();
    assert_eq!(record.state, IvrState::Failed);
    assert!(record.selections.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_mail_failure_does_not_stop_next_call() {
    let mailer = Arc::new(RecordingMailer {
        failures: 1,
        ..RecordingMailer::default()
    });
    let handler = Arc::new(handler(mailer.clone()));
    let (tx, rx) = tokio::sync::mpsc::channel::<Arc<dyn Call>>(4);

    let server = tokio::spawn(ivr::serve_calls(rx, handler.clone()));

    tx.send(Arc::new(ScriptedCall::new("first", &[Some("2")])))
        .await
        .unwrap();
    tx.send(Arc::new(ScriptedCall::new("second", &[Some("2")])))
        .await
        .unwrap();
    drop(tx);
    server.await.unwrap();

    for _ in 0..100 {
        let summary = handler.registry().summary().await;
        if summary.total == 2 && summary.active == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    assert_eq!(mailer.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(mailer.sent.lock().len(), 1);

    let first = handler.registry().get("first").await.unwrap();
    let second = handler.registry().get("second").await.unwrap();
    assert!(!first.is_active());
    assert!(!second.is_active());
    assert_eq!(
        [first.notification_id.is_some(), second.notification_id.is_some()]
            .iter()
            .filter(|sent| **sent)
            .count(),
        1
    );
}
