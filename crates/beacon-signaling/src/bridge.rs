//! Payload validation and targeted/roomed forwarding for the four signal
//! channels (spec.md §4.7).

use std::{collections::HashMap, sync::Arc};

use beacon_core::{
    kernel::{HandlerError, Kernel, ReplyOverrides, RoomBroadcastOptions, Toolkit},
    message::Message,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::SignalError;

/// Reason codes reported to the originator of an invalid or unroutable
/// signal (spec.md §4.7 step 2, §4.8, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalReason {
    /// `<ns>:offer` was missing `description`.
    InvalidOffer,
    /// `<ns>:answer` was missing `description`.
    InvalidAnswer,
    /// `<ns>:candidate` was missing `candidate`.
    InvalidCandidate,
    /// Neither `target` nor `room` could be resolved.
    TargetOrRoomRequired,
}

impl SignalReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::InvalidOffer => "INVALID_OFFER",
            Self::InvalidAnswer => "INVALID_ANSWER",
            Self::InvalidCandidate => "INVALID_CANDIDATE",
            Self::TargetOrRoomRequired => "TARGET_OR_ROOM_REQUIRED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Offer,
    Answer,
    Candidate,
    Bye,
}

impl Channel {
    const ALL: [Channel; 4] = [Self::Offer, Self::Answer, Self::Candidate, Self::Bye];

    fn suffix(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Candidate => "candidate",
            Self::Bye => "bye",
        }
    }

    fn type_name(self, namespace: &str) -> String {
        format!("{namespace}:{}", self.suffix())
    }

    /// Required-field validation (spec.md §4.7 step 2).
    fn validate(self, payload: &SignalPayload) -> Result<(), SignalReason> {
        match self {
            Self::Offer if payload.description.is_none() => Err(SignalReason::InvalidOffer),
            Self::Answer if payload.description.is_none() => Err(SignalReason::InvalidAnswer),
            Self::Candidate if payload.candidate.is_none() => Err(SignalReason::InvalidCandidate),
            _ => Ok(()),
        }
    }
}

/// Normalized shape of `message.payload` for every signal channel
/// (spec.md §4.7 step 1). `description` also accepts the wire alias
/// `offer`.
#[derive(Debug, Clone, Default, Deserialize)]
struct SignalPayload {
    target: Option<String>,
    room: Option<String>,
    #[serde(alias = "offer")]
    description: Option<Value>,
    candidate: Option<Value>,
    metadata: Option<HashMap<String, Value>>,
}

/// Routes offer/answer/candidate/bye payloads between participants.
/// Attaches four handlers to a [`Kernel`]; owns no transport or connection
/// state of its own.
#[derive(Debug, Clone)]
pub struct SignalingBridge {
    namespace: Arc<str>,
    auto_join_rooms: bool,
}

impl SignalingBridge {
    /// Build a bridge from [`crate::config::SignalingConfig`].
    pub fn new(config: crate::config::SignalingConfig) -> Self {
        Self { namespace: Arc::from(config.namespace.as_str()), auto_join_rooms: config.auto_join_rooms }
    }

    /// Register the four channel handlers on `kernel` (spec.md §4.7
    /// "On `attach(kernel)` ...").
    pub fn attach(&self, kernel: &Kernel) {
        for channel in Channel::ALL {
            let namespace = Arc::clone(&self.namespace);
            let auto_join_rooms = self.auto_join_rooms;
            let event_type = channel.type_name(&namespace);
            kernel.on(event_type.as_str(), move |toolkit, message| {
                let namespace = Arc::clone(&namespace);
                async move { handle_signal(toolkit, message, namespace, channel, auto_join_rooms).await }
            });
        }
    }
}

async fn handle_signal(
    toolkit: Toolkit,
    message: Message,
    namespace: Arc<str>,
    channel: Channel,
    auto_join_rooms: bool,
) -> Result<(), HandlerError> {
    let payload: SignalPayload = match serde_json::from_value(message.payload.clone()) {
        Ok(payload) => payload,
        Err(err) => {
            toolkit.log(SignalError::from(err));
            SignalPayload::default()
        },
    };

    if let Err(reason) = channel.validate(&payload) {
        toolkit.reply(
            Message::new(format!("{namespace}:error"), json!({ "reason": reason.as_str() })),
            ReplyOverrides::default(),
        );
        return Ok(());
    }

    if auto_join_rooms && channel == Channel::Offer {
        if let Some(room) = &payload.room {
            toolkit.rooms().join(room);
        }
    }

    let envelope = Message::new(
        channel.type_name(&namespace),
        json!({
            "from": toolkit.client_id(),
            "room": payload.room,
            "target": payload.target,
            "description": payload.description,
            "candidate": payload.candidate,
            "metadata": payload.metadata,
        }),
    );

    match (&payload.target, &payload.room) {
        (Some(target), _) => {
            toolkit.send(target.as_str(), envelope);
        },
        (None, Some(room)) => {
            let mut options = RoomBroadcastOptions::default();
            options.except_self = true;
            toolkit.rooms().broadcast(envelope, Some(room.as_str()), options);
        },
        (None, None) => {
            toolkit.reply(
                Message::new(
                    format!("{namespace}:error"),
                    json!({ "reason": SignalReason::TargetOrRoomRequired.as_str() }),
                ),
                ReplyOverrides::default(),
            );
        },
    }

    Ok(())
}
