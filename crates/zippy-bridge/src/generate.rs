//! Prompt submission against Ollama's `/api/generate` endpoint.
//!
//! A [`PromptJob`] is built on the submitting thread and executed on the
//! request worker.  It posts a non-streaming generate request, feeds the
//! transport outcome to the [`LivenessProbe`] (shared-transport completions
//! keep the connectivity state current), and publishes the result:
//!
//! * success – `response_received(text)`, then `response_finished`, then
//!   [`GenerateStatus::Finished`];
//! * failure – `request_error(message)`, then [`GenerateStatus::Error`].
//!
//! Unlike the ping, a prompt reply with a non-2xx status is a failure.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{info, info_span, warn};
use zippy_types::{GenerateStatus, PromptRequest, ServerEndpoint, ZippyError};

use crate::events::EventHub;
use crate::probe::LivenessProbe;
use crate::transport::{Transport, TransportReply};

/// Default system prompt for the College of Business kiosk assistant.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Zippy, a helpful AI assistant for the University of Akron College of Business. \
Help users as much as you can with the information you know about the College. \
If you are not sure about something, say you don't know and suggest they contact the College directly.";

// ─────────────────────────────────────────────────────────────────────────────
// Wire shapes
// ─────────────────────────────────────────────────────────────────────────────

/// Sampling options forwarded in the `options` object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub num_predict: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.25,
            num_predict: 200,
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

/// A generate reply, or one line of a newline-delimited stream from a
/// server that ignores `"stream": false`.
#[derive(Deserialize)]
struct GenerateChunk {
    response: Option<String>,
    error: Option<String>,
    #[serde(default)]
    done: bool,
}

impl GenerateChunk {
    fn into_text(self) -> Result<Option<String>, ZippyError> {
        match self.error {
            Some(error) => Err(ZippyError::BadResponse(format!("Ollama reported an error: {error}"))),
            None => Ok(self.response),
        }
    }
}

/// Build the JSON body for a generate request.
pub fn request_body(
    model: &str,
    request: &PromptRequest,
    options: GenerateOptions,
) -> Result<serde_json::Value, ZippyError> {
    serde_json::to_value(GenerateRequest {
        model,
        system: &request.system,
        prompt: &request.prompt,
        stream: false,
        options,
    })
    .map_err(|e| ZippyError::BadResponse(format!("Failed to encode generate request: {e}")))
}

/// Extract the generated text from a generate reply.
///
/// # Errors
///
/// [`ZippyError::BadResponse`] for non-2xx statuses, bodies carrying an
/// `error` field and bodies that carry no `response` text.
pub fn parse_reply(reply: &TransportReply) -> Result<String, ZippyError> {
    if !reply.is_success() {
        return Err(ZippyError::BadResponse(format!(
            "Ollama returned HTTP {}: {}",
            reply.status,
            reply.body.trim()
        )));
    }

    if let Ok(parsed) = serde_json::from_str::<GenerateChunk>(&reply.body)
        && let Some(text) = parsed.into_text()?
    {
        return Ok(text);
    }

    let mut text = String::new();
    let mut chunks = 0usize;
    for line in reply.body.lines().filter(|l| !l.trim().is_empty()) {
        let Ok(chunk) = serde_json::from_str::<GenerateChunk>(line) else {
            continue;
        };
        let done = chunk.done;
        if let Some(piece) = chunk.into_text()? {
            chunks += 1;
            text.push_str(&piece);
        }
        if done {
            break;
        }
    }

    if chunks == 0 {
        return Err(ZippyError::BadResponse(
            "reply carries no `response` field".into(),
        ));
    }
    Ok(text.trim().to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────────────────────────

/// Current [`GenerateStatus`] plus the number of prompts still queued or in
/// flight.
///
/// [`begin`][Self::begin] moves to [`GenerateStatus::Generating`].
/// [`complete`][Self::complete] only settles on `Finished` or `Error` once
/// the last pending prompt is done; the status then reflects that last
/// prompt.  A change notification is published only when the value changes.
#[derive(Default)]
pub struct StatusTracker {
    progress: Mutex<Progress>,
}

#[derive(Default)]
struct Progress {
    current: GenerateStatus,
    pending: usize,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> GenerateStatus {
        self.lock().current
    }

    /// Prompts submitted but not yet completed.
    pub fn pending(&self) -> usize {
        self.lock().pending
    }

    /// Count a newly submitted prompt.  Returns `true` if the status changed.
    pub fn begin(&self, events: &EventHub) -> bool {
        self.update(events, |progress| {
            progress.pending += 1;
            Some(GenerateStatus::Generating)
        })
    }

    /// Count a prompt as done with `outcome` (`Finished` or `Error`).
    /// Returns `true` if the status changed.
    pub fn complete(&self, outcome: GenerateStatus, events: &EventHub) -> bool {
        self.update(events, |progress| {
            progress.pending = progress.pending.saturating_sub(1);
            (progress.pending == 0).then_some(outcome)
        })
    }

    fn update(
        &self,
        events: &EventHub,
        step: impl FnOnce(&mut Progress) -> Option<GenerateStatus>,
    ) -> bool {
        let changed = {
            let mut progress = self.lock();
            match step(&mut progress) {
                Some(next) if next != progress.current => {
                    progress.current = next;
                    Some(next)
                }
                _ => None,
            }
        };
        // Listeners run without the lock so they may read the status.
        match changed {
            Some(status) => {
                events.emit_generate_status_changed(status);
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Job
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a prompt needs once it leaves the submitting thread.
///
/// The endpoint is captured at submission time; reconfiguring the bridge
/// afterwards does not redirect a queued prompt.
pub struct PromptJob {
    pub request: PromptRequest,
    pub endpoint: ServerEndpoint,
    pub options: GenerateOptions,
    pub transport: Arc<dyn Transport>,
    pub runtime: Handle,
    pub probe: Arc<LivenessProbe>,
    pub events: Arc<EventHub>,
    pub status: Arc<StatusTracker>,
}

impl PromptJob {
    /// Execute the request on the current (non-async) thread and publish
    /// the outcome.
    pub fn run(self) {
        let span = info_span!("prompt", id = %self.request.id, model = %self.endpoint.model);
        let _enter = span.enter();

        match self.exchange() {
            Ok(text) => {
                info!(chars = text.len(), "response received");
                self.events.emit_response_received(&text);
                self.events.emit_response_finished();
                self.status.complete(GenerateStatus::Finished, &self.events);
            }
            Err(e) => {
                warn!(error = %e, "prompt failed");
                self.events.emit_request_error(&e.to_string());
                self.status.complete(GenerateStatus::Error, &self.events);
            }
        }
    }

    fn exchange(&self) -> Result<String, ZippyError> {
        let body = request_body(&self.endpoint.model, &self.request, self.options)?;
        let url = self.endpoint.generate_url();
        let outcome = self
            .runtime
            .block_on(self.transport.post_json(&url, &body));
        self.probe.record_reply(&outcome);
        parse_reply(&outcome?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::probe::ReplyOutcome;
    use crate::transport::TransportFailure;

    struct CannedTransport {
        outcome: ReplyOutcome,
        bodies: Mutex<Vec<(String, serde_json::Value)>>,
    }

    impl CannedTransport {
        fn new(outcome: ReplyOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                bodies: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn get(&self, _url: &str) -> ReplyOutcome {
            self.outcome.clone()
        }

        async fn post_json(&self, url: &str, body: &serde_json::Value) -> ReplyOutcome {
            self.bodies
                .lock()
                .unwrap()
                .push((url.to_string(), body.clone()));
            self.outcome.clone()
        }
    }

    struct Recorded {
        log: Arc<Mutex<Vec<String>>>,
    }

    fn record_events(events: &EventHub) -> Recorded {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = log.clone();
        events.on_response_received(move |t| l.lock().unwrap().push(format!("response:{t}")));
        let l = log.clone();
        events.on_response_finished(move || l.lock().unwrap().push("finished".into()));
        let l = log.clone();
        events.on_request_error(move |e| l.lock().unwrap().push(format!("error:{e}")));
        let l = log.clone();
        events.on_generate_status_changed(move |s| l.lock().unwrap().push(format!("status:{s}")));
        Recorded { log }
    }

    fn job_for(
        rt: &tokio::runtime::Runtime,
        transport: Arc<CannedTransport>,
        events: Arc<EventHub>,
    ) -> (PromptJob, Arc<LivenessProbe>) {
        let endpoint = ServerEndpoint::new("http://localhost:11434", "gemma3:4b");
        let probe = Arc::new(LivenessProbe::new(
            endpoint.clone(),
            transport.clone(),
            rt.handle().clone(),
            events.clone(),
            Duration::from_secs(1),
        ));
        let job = PromptJob {
            request: PromptRequest::new("be brief", "When is the dean's office open?"),
            endpoint,
            options: GenerateOptions::default(),
            transport,
            runtime: rt.handle().clone(),
            probe: probe.clone(),
            events,
            status: Arc::new(StatusTracker::new()),
        };
        (job, probe)
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("runtime")
    }

    #[test]
    fn request_body_matches_ollama_shape() {
        let request = PromptRequest::new("sys", "hi");
        let body = request_body("gemma3:4b", &request, GenerateOptions::default()).unwrap();
        assert_eq!(body["model"], "gemma3:4b");
        assert_eq!(body["system"], "sys");
        assert_eq!(body["prompt"], "hi");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 200);
        assert!((body["options"]["temperature"].as_f64().unwrap() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn parse_reply_reads_single_object() {
        let reply = TransportReply::new(200, r#"{"model":"m","response":"Open 8-5.","done":true}"#);
        assert_eq!(parse_reply(&reply).unwrap(), "Open 8-5.");
    }

    #[test]
    fn parse_reply_concatenates_ndjson_until_done() {
        let body = concat!(
            r#"{"response":"Open ","done":false}"#,
            "\n",
            r#"{"response":"8-5.","done":true}"#,
            "\n",
            r#"{"response":" ignored","done":false}"#,
        );
        let reply = TransportReply::new(200, body);
        assert_eq!(parse_reply(&reply).unwrap(), "Open 8-5.");
    }

    #[test]
    fn parse_reply_rejects_error_status() {
        let reply = TransportReply::new(404, r#"{"error":"model 'x' not found"}"#);
        let err = parse_reply(&reply).unwrap_err();
        assert!(matches!(err, ZippyError::BadResponse(ref m) if m.contains("404")));
    }

    #[test]
    fn parse_reply_rejects_body_without_response() {
        let reply = TransportReply::new(200, "<html>proxy page</html>");
        assert!(matches!(parse_reply(&reply), Err(ZippyError::BadResponse(_))));
    }

    #[test]
    fn parse_reply_surfaces_error_field() {
        let reply = TransportReply::new(200, r#"{"error":"model runner has unexpectedly stopped"}"#);
        let err = parse_reply(&reply).unwrap_err();
        assert!(matches!(err, ZippyError::BadResponse(ref m) if m.contains("unexpectedly stopped")));

        let body = concat!(
            r#"{"response":"Open ","done":false}"#,
            "\n",
            r#"{"error":"context length exceeded"}"#,
        );
        let err = parse_reply(&TransportReply::new(200, body)).unwrap_err();
        assert!(matches!(err, ZippyError::BadResponse(ref m) if m.contains("context length")));
    }

    #[test]
    fn parse_reply_rejects_json_without_response() {
        assert!(matches!(
            parse_reply(&TransportReply::new(200, "{}")),
            Err(ZippyError::BadResponse(_))
        ));
        assert!(matches!(
            parse_reply(&TransportReply::new(200, "{\"done\":true}\n{\"done\":true}")),
            Err(ZippyError::BadResponse(_))
        ));
    }

    #[test]
    fn status_tracker_notifies_only_on_change() {
        let events = EventHub::new();
        let changes = Arc::new(AtomicUsize::new(0));
        let c = changes.clone();
        events.on_generate_status_changed(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let tracker = StatusTracker::new();
        assert_eq!(tracker.get(), GenerateStatus::Idle);
        assert!(tracker.begin(&events));
        assert!(!tracker.begin(&events));
        assert!(!tracker.complete(GenerateStatus::Finished, &events));
        assert!(tracker.complete(GenerateStatus::Finished, &events));
        assert!(tracker.begin(&events));
        assert!(tracker.complete(GenerateStatus::Finished, &events));
        assert_eq!(changes.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn status_tracker_waits_for_the_last_pending_prompt() {
        let events = EventHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        events.on_generate_status_changed(move |st| s.lock().unwrap().push(st));

        let tracker = StatusTracker::new();
        tracker.begin(&events);
        tracker.begin(&events);
        assert_eq!(tracker.pending(), 2);

        assert!(!tracker.complete(GenerateStatus::Finished, &events));
        assert_eq!(tracker.get(), GenerateStatus::Generating);
        assert_eq!(tracker.pending(), 1);

        assert!(tracker.complete(GenerateStatus::Error, &events));
        assert_eq!(tracker.get(), GenerateStatus::Error);
        assert_eq!(tracker.pending(), 0);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![GenerateStatus::Generating, GenerateStatus::Error]
        );
    }

    #[test]
    fn successful_job_publishes_response_then_finished() {
        let rt = runtime();
        let events = Arc::new(EventHub::new());
        let recorded = record_events(&events);
        let transport = CannedTransport::new(Ok(TransportReply::new(
            200,
            r#"{"response":"8am to 5pm","done":true}"#,
        )));
        let (job, probe) = job_for(&rt, transport.clone(), events);

        job.run();

        assert_eq!(
            *recorded.log.lock().unwrap(),
            vec![
                "response:8am to 5pm".to_string(),
                "finished".to_string(),
                "status:finished".to_string(),
            ]
        );
        assert!(probe.is_connected());

        let bodies = transport.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0].0, "http://localhost:11434/api/generate");
        assert_eq!(bodies[0].1["prompt"], "When is the dean's office open?");
    }

    #[test]
    fn transport_failure_publishes_request_error_and_disconnects() {
        let rt = runtime();
        let events = Arc::new(EventHub::new());
        let recorded = record_events(&events);
        let transport = CannedTransport::new(Err(TransportFailure::new("connection refused")));
        let (job, probe) = job_for(&rt, transport, events);
        probe.record_reply(&Ok(TransportReply::new(200, "")));

        job.run();

        let log = recorded.log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert!(log[0].starts_with("error:") && log[0].contains("connection refused"));
        assert_eq!(log[1], "status:error");
        assert!(!probe.is_connected());
    }

    #[test]
    fn error_status_fails_the_prompt_but_keeps_connectivity() {
        let rt = runtime();
        let events = Arc::new(EventHub::new());
        let recorded = record_events(&events);
        let transport = CannedTransport::new(Ok(TransportReply::new(500, "internal error")));
        let (job, probe) = job_for(&rt, transport, events);

        job.run();

        let log = recorded.log.lock().unwrap();
        assert!(log[0].contains("HTTP 500"));
        assert!(probe.is_connected());
    }
}
