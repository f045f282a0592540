//! Ready-made webhook responses for common TwiML verbs.
//!
//! Each view builds one document; mount them behind the gateway so they get
//! signature checks and blacklisting like any other handler.

use crate::twiml::{
    ConferenceOptions, DialOptions, DialTarget, GatherOptions, MessageOptions, MessagingResponse,
    RecordOptions, SayOptions, VoiceResponse,
};

/// Speak `text` to the caller.
pub fn say(text: &str, options: SayOptions) -> VoiceResponse {
    let mut r = VoiceResponse::new();
    r.say(text, options);
    r
}

/// Play an audio file.
pub fn play(url: &str, loop_count: Option<u32>) -> VoiceResponse {
    let mut r = VoiceResponse::new();
    r.play(url, loop_count);
    r
}

/// Collect keypad digits. The method defaults to POST.
pub fn gather(mut options: GatherOptions) -> VoiceResponse {
    options.method.get_or_insert_with(|| "POST".to_string());

    let mut r = VoiceResponse::new();
    r.gather(options);
    r
}

/// Record the caller. The method defaults to POST.
pub fn record(mut options: RecordOptions) -> VoiceResponse {
    options.method.get_or_insert_with(|| "POST".to_string());

    let mut r = VoiceResponse::new();
    r.record(options);
    r
}

/// Reply with a message, optionally with media attached.
pub fn message(body: &str, mut options: MessageOptions) -> MessagingResponse {
    options.method.get_or_insert_with(|| "POST".to_string());

    let mut r = MessagingResponse::new();
    r.message(body, options);
    r
}

/// Connect the call to another number.
pub fn dial(number: &str, mut options: DialOptions) -> VoiceResponse {
    options.method.get_or_insert_with(|| "POST".to_string());

    let mut r = VoiceResponse::new();
    r.dial(DialTarget::Number(number.to_string()), options);
    r
}

/// Put the caller into a named conference room.
pub fn conference(name: &str, mut options: ConferenceOptions) -> VoiceResponse {
    options.wait_method.get_or_insert_with(|| "POST".to_string());

    let mut r = VoiceResponse::new();
    r.dial(
        DialTarget::Conference(name.to_string(), options),
        DialOptions::default(),
    );
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::twiml::Markup;

    #[test]
    fn test_say() {
        let xml = say("hi", SayOptions::default()).to_xml();
        assert!(xml.ends_with("<Response><Say>hi</Say></Response>"));
    }

    #[test]
    fn test_play() {
        let xml = play("http://b.com/b.wav", Some(3)).to_xml();
        assert!(xml.contains(r#"<Play loop="3">http://b.com/b.wav</Play>"#));
    }

    #[test]
    fn test_gather_defaults_to_post() {
        let xml = gather(GatherOptions::default()).to_xml();
        assert!(xml.contains(r#"<Gather method="POST" />"#));
    }

    #[test]
    fn test_record_keeps_explicit_method() {
        let xml = record(RecordOptions {
            method: Some("GET".to_string()),
            max_length: Some(30),
            ..RecordOptions::default()
        })
        .to_xml();
        assert!(xml.contains(r#"<Record method="GET" maxLength="30" />"#));
    }

    #[test]
    fn test_message() {
        let xml = message("Hello, world!", MessageOptions::default()).to_xml();
        assert!(xml.contains(r#"<Message method="POST">Hello, world!</Message>"#));
    }

    #[test]
    fn test_dial() {
        let xml = dial("+15005550006", DialOptions::default()).to_xml();
        assert!(xml.contains(r#"<Dial method="POST"><Number>+15005550006</Number></Dial>"#));
    }

    #[test]
    fn test_conference() {
        let xml = conference(
            "standup",
            ConferenceOptions {
                max_participants: Some(10),
                ..ConferenceOptions::default()
            },
        )
        .to_xml();
        assert!(xml.contains(
            r#"<Dial><Conference waitMethod="POST" maxParticipants="10">standup</Conference></Dial>"#
        ));
    }
}
