//! Minimal TwiML document builder.
//!
//! Handlers may return a [`VoiceResponse`] or [`MessagingResponse`] instead of
//! hand-written XML; anything implementing [`Markup`] is serialized by the
//! gateway. Only the verbs the gateway and its canned views need are covered.

use std::fmt::Write as _;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Something that renders itself as a TwiML document.
pub trait Markup: Send + Sync {
    fn to_xml(&self) -> String;
}

/// A single XML element with optional text or children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: &'static str,
    attributes: Vec<(&'static str, String)>,
    text: Option<String>,
    children: Vec<Element>,
}

impl Element {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    /// Set an attribute; `None` values are omitted.
    pub fn attr<V: ToString>(mut self, name: &'static str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.attributes.push((name, value.to_string()));
        }
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(self.name);
        for (name, value) in &self.attributes {
            let _ = write!(out, r#" {}="{}""#, name, escape(value));
        }

        if self.text.is_none() && self.children.is_empty() {
            out.push_str(" />");
            return;
        }

        out.push('>');
        if let Some(text) = &self.text {
            out.push_str(&escape(text));
        }
        for child in &self.children {
            child.write_to(out);
        }
        let _ = write!(out, "</{}>", self.name);
    }
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn render(verbs: &[Element]) -> String {
    let root = verbs
        .iter()
        .cloned()
        .fold(Element::new("Response"), Element::child);

    let mut out = String::from(XML_DECLARATION);
    root.write_to(&mut out);
    out
}

// =============================================================================
// Voice
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct SayOptions {
    pub voice: Option<String>,
    pub language: Option<String>,
    pub loop_count: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct GatherOptions {
    pub action: Option<String>,
    pub method: Option<String>,
    pub num_digits: Option<u32>,
    pub timeout: Option<u32>,
    pub finish_on_key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordOptions {
    pub action: Option<String>,
    pub method: Option<String>,
    pub timeout: Option<u32>,
    pub finish_on_key: Option<String>,
    pub max_length: Option<u32>,
    pub transcribe: Option<bool>,
    pub transcribe_callback: Option<String>,
    pub play_beep: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct DialOptions {
    pub action: Option<String>,
    pub method: Option<String>,
    pub timeout: Option<u32>,
    pub hangup_on_star: Option<bool>,
    pub time_limit: Option<u32>,
    pub caller_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ConferenceOptions {
    pub muted: Option<bool>,
    pub beep: Option<bool>,
    pub start_conference_on_enter: Option<bool>,
    pub end_conference_on_exit: Option<bool>,
    pub wait_url: Option<String>,
    pub wait_method: Option<String>,
    pub max_participants: Option<u32>,
}

/// What a `<Dial>` connects to.
#[derive(Debug, Clone)]
pub enum DialTarget {
    Number(String),
    Conference(String, ConferenceOptions),
}

/// A `<Response>` document for voice webhooks.
#[derive(Debug, Clone, Default)]
pub struct VoiceResponse {
    verbs: Vec<Element>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(&mut self, text: impl Into<String>, options: SayOptions) -> &mut Self {
        self.verbs.push(
            Element::new("Say")
                .attr("voice", options.voice)
                .attr("language", options.language)
                .attr("loop", options.loop_count)
                .text(text),
        );
        self
    }

    pub fn play(&mut self, url: impl Into<String>, loop_count: Option<u32>) -> &mut Self {
        self.verbs
            .push(Element::new("Play").attr("loop", loop_count).text(url));
        self
    }

    pub fn gather(&mut self, options: GatherOptions) -> &mut Self {
        self.verbs.push(
            Element::new("Gather")
                .attr("action", options.action)
                .attr("method", options.method)
                .attr("numDigits", options.num_digits)
                .attr("timeout", options.timeout)
                .attr("finishOnKey", options.finish_on_key),
        );
        self
    }

    pub fn record(&mut self, options: RecordOptions) -> &mut Self {
        self.verbs.push(
            Element::new("Record")
                .attr("action", options.action)
                .attr("method", options.method)
                .attr("timeout", options.timeout)
                .attr("finishOnKey", options.finish_on_key)
                .attr("maxLength", options.max_length)
                .attr("transcribe", options.transcribe)
                .attr("transcribeCallback", options.transcribe_callback)
                .attr("playBeep", options.play_beep),
        );
        self
    }

    pub fn dial(&mut self, target: DialTarget, options: DialOptions) -> &mut Self {
        let target = match target {
            DialTarget::Number(number) => Element::new("Number").text(number),
            DialTarget::Conference(name, conference) => Element::new("Conference")
                .attr("muted", conference.muted)
                .attr("beep", conference.beep)
                .attr("startConferenceOnEnter", conference.start_conference_on_enter)
                .attr("endConferenceOnExit", conference.end_conference_on_exit)
                .attr("waitUrl", conference.wait_url)
                .attr("waitMethod", conference.wait_method)
                .attr("maxParticipants", conference.max_participants)
                .text(name),
        };

        self.verbs.push(
            Element::new("Dial")
                .attr("action", options.action)
                .attr("method", options.method)
                .attr("timeout", options.timeout)
                .attr("hangupOnStar", options.hangup_on_star)
                .attr("timeLimit", options.time_limit)
                .attr("callerId", options.caller_id)
                .child(target),
        );
        self
    }

    /// Reject the incoming call without answering it.
    pub fn reject(&mut self, reason: Option<&str>) -> &mut Self {
        self.verbs.push(Element::new("Reject").attr("reason", reason));
        self
    }
}

impl Markup for VoiceResponse {
    fn to_xml(&self) -> String {
        render(&self.verbs)
    }
}

// =============================================================================
// Messaging
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct MessageOptions {
    pub to: Option<String>,
    pub from: Option<String>,
    pub action: Option<String>,
    pub method: Option<String>,
    pub status_callback: Option<String>,
    pub media: Option<String>,
}

/// A `<Response>` document for messaging webhooks.
#[derive(Debug, Clone, Default)]
pub struct MessagingResponse {
    verbs: Vec<Element>,
}

impl MessagingResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(&mut self, body: impl Into<String>, options: MessageOptions) -> &mut Self {
        let mut message = Element::new("Message")
            .attr("to", options.to)
            .attr("from", options.from)
            .attr("action", options.action)
            .attr("method", options.method)
            .attr("statusCallback", options.status_callback);

        message = match options.media {
            Some(media) => message
                .child(Element::new("Body").text(body))
                .child(Element::new("Media").text(media)),
            None => message.text(body),
        };

        self.verbs.push(message);
        self
    }
}

impl Markup for MessagingResponse {
    fn to_xml(&self) -> String {
        render(&self.verbs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_messaging_response() {
        assert_eq!(
            MessagingResponse::new().to_xml(),
            r#"<?xml version="1.0" encoding="UTF-8"?><Response />"#
        );
    }

    #[test]
    fn test_reject() {
        let mut r = VoiceResponse::new();
        r.reject(None);
        assert_eq!(
            r.to_xml(),
            r#"<?xml version="1.0" encoding="UTF-8"?><Response><Reject /></Response>"#
        );
    }

    #[test]
    fn test_say_attributes_and_escaping() {
        let mut r = VoiceResponse::new();
        r.say(
            "Tom & \"Jerry\" <3",
            SayOptions {
                voice: Some("alice".to_string()),
                loop_count: Some(2),
                ..SayOptions::default()
            },
        );
        assert_eq!(
            r.to_xml(),
            r#"<?xml version="1.0" encoding="UTF-8"?><Response><Say voice="alice" loop="2">Tom &amp; &quot;Jerry&quot; &lt;3</Say></Response>"#
        );
    }

    #[test]
    fn test_verbs_keep_order() {
        let mut r = VoiceResponse::new();
        r.say("Hello", SayOptions::default())
            .play("http://b.com/b.wav", None)
            .gather(GatherOptions {
                num_digits: Some(4),
                finish_on_key: Some("#".to_string()),
                ..GatherOptions::default()
            });

        assert_eq!(
            r.to_xml(),
            r##"<?xml version="1.0" encoding="UTF-8"?><Response><Say>Hello</Say><Play>http://b.com/b.wav</Play><Gather numDigits="4" finishOnKey="#" /></Response>"##
        );
    }

    #[test]
    fn test_dial_conference() {
        let mut r = VoiceResponse::new();
        r.dial(
            DialTarget::Conference(
                "standup".to_string(),
                ConferenceOptions {
                    muted: Some(false),
                    max_participants: Some(10),
                    ..ConferenceOptions::default()
                },
            ),
            DialOptions::default(),
        );

        assert_eq!(
            r.to_xml(),
            r#"<?xml version="1.0" encoding="UTF-8"?><Response><Dial><Conference muted="false" maxParticipants="10">standup</Conference></Dial></Response>"#
        );
    }

    #[test]
    fn test_message_with_media() {
        let mut r = MessagingResponse::new();
        r.message(
            "Hello, world!",
            MessageOptions {
                media: Some("http://fullpath.com/my_image.png".to_string()),
                ..MessageOptions::default()
            },
        );

        assert_eq!(
            r.to_xml(),
            r#"<?xml version="1.0" encoding="UTF-8"?><Response><Message><Body>Hello, world!</Body><Media>http://fullpath.com/my_image.png</Media></Message></Response>"#
        );
    }
}
