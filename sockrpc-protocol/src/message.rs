//! Call and reply types layered on frames.

use crate::args::parse_args;
use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::tag::{parse_reply_name, split_call_name};
use bytes::Bytes;

/// A call decoded from a frame, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Method name (tag removed). Empty for plain messages.
    pub name: String,
    /// Parsed arguments.
    pub args: Vec<String>,
    /// Request id when the caller tagged the call.
    pub tag: Option<u64>,
}

impl Call {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
            tag: None,
        }
    }

    /// Decodes the method name, tag and arguments of a frame.
    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        let (tag, name) = split_call_name(&frame.name);
        let args = parse_args(&frame.body)?;
        Ok(Self {
            name: name.to_string(),
            args,
            tag,
        })
    }

    /// Returns whether the frame this came from was a plain message.
    pub fn is_message(&self) -> bool {
        self.name.is_empty() && self.tag.is_none()
    }

    /// Returns the argument at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

/// Classification of a frame received by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Plain message (untagged reply or server push).
    Message(Bytes),
    /// Reply to a tagged call.
    Reply { id: u64, body: Bytes },
    /// A call initiated by the peer.
    Call(Frame),
}

impl Inbound {
    pub fn classify(frame: Frame) -> Self {
        if frame.is_message() {
            return Inbound::Message(frame.body);
        }
        match parse_reply_name(&frame.name) {
            Some(id) => Inbound::Reply {
                id,
                body: frame.body,
            },
            None => Inbound::Call(frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{reply_name, tagged_call_name};

    #[test]
    fn test_call_from_frame() {
        let frame = Frame::call("add", Bytes::from_static(b"1,2"));
        let call = Call::from_frame(&frame).unwrap();

        assert_eq!(call.name, "add");
        assert_eq!(call.args, vec!["1", "2"]);
        assert_eq!(call.tag, None);
        assert_eq!(call.arg(1), Some("2"));
        assert_eq!(call.arg(2), None);
    }

    #[test]
    fn test_tagged_call_from_frame() {
        let frame = Frame::call(tagged_call_name(5, "echo"), Bytes::from_static(b"hi"));
        let call = Call::from_frame(&frame).unwrap();

        assert_eq!(call.name, "echo");
        assert_eq!(call.tag, Some(5));
        assert!(!call.is_message());
    }

    #[test]
    fn test_plain_message_as_call() {
        let frame = Frame::message(Bytes::from_static(b"note"));
        let call = Call::from_frame(&frame).unwrap();
        assert!(call.is_message());
        assert_eq!(call.args, vec!["note"]);
    }

    #[test]
    fn test_malformed_args() {
        let frame = Frame::call("f", Bytes::from_static(b"\"open"));
        assert!(matches!(
            Call::from_frame(&frame),
            Err(ProtocolError::UnterminatedQuote(0))
        ));
    }

    #[test]
    fn test_classify() {
        let msg = Inbound::classify(Frame::message(Bytes::from_static(b"pong")));
        assert_eq!(msg, Inbound::Message(Bytes::from_static(b"pong")));

        let reply = Inbound::classify(Frame::call(reply_name(3), Bytes::from_static(b"ok")));
        assert_eq!(
            reply,
            Inbound::Reply {
                id: 3,
                body: Bytes::from_static(b"ok")
            }
        );

        let call = Inbound::classify(Frame::call("notify", Bytes::new()));
        assert!(matches!(call, Inbound::Call(_)));
    }
}
