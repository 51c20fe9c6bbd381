use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Closed set of message kinds exchanged between host and chat surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Ask,
    Answer,
    Notice,
    Focus,
    Scroll,
    Close,
}

/// Direction of travel of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    SurfaceToHost,
    HostToSurface,
}

impl MessageKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ask => "ask",
            Self::Answer => "answer",
            Self::Notice => "notice",
            Self::Focus => "focus",
            Self::Scroll => "scroll",
            Self::Close => "close",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ask" => Some(Self::Ask),
            "answer" => Some(Self::Answer),
            "notice" => Some(Self::Notice),
            "focus" => Some(Self::Focus),
            "scroll" => Some(Self::Scroll),
            "close" => Some(Self::Close),
            _ => None,
        }
    }

    /// Each kind has one authoritative direction, except `scroll`.
    pub const fn travels(self, route: Route) -> bool {
        match self {
            Self::Ask | Self::Close => matches!(route, Route::SurfaceToHost),
            Self::Answer | Self::Notice | Self::Focus => matches!(route, Route::HostToSurface),
            Self::Scroll => true,
        }
    }
}

/// One validated protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Ask { text: String },
    Answer { text: String },
    /// Assistant line that ends no `ask`: greeting or reindex report.
    Notice { text: String },
    Focus,
    Scroll,
    Close,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope {
    kind: String,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TextPayload {
    text: String,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Ask { .. } => MessageKind::Ask,
            Self::Answer { .. } => MessageKind::Answer,
            Self::Notice { .. } => MessageKind::Notice,
            Self::Focus => MessageKind::Focus,
            Self::Scroll => MessageKind::Scroll,
            Self::Close => MessageKind::Close,
        }
    }

    /// Wire form: `{"kind": "...", "payload": {...}}`, payload omitted when empty.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Ask { text } | Self::Answer { text } | Self::Notice { text } => json!({
                "kind": self.kind().as_str(),
                "payload": { "text": text },
            }),
            Self::Focus | Self::Scroll | Self::Close => json!({ "kind": self.kind().as_str() }),
        }
    }

    /// Validates raw data against the kind/payload schema. Never fails loudly.
    pub fn decode(data: &Value) -> Option<Self> {
        let envelope = Envelope::deserialize(data).ok()?;
        let kind = MessageKind::parse(&envelope.kind)?;

        match kind {
            MessageKind::Ask | MessageKind::Answer | MessageKind::Notice => {
                let payload = TextPayload::deserialize(envelope.payload?).ok()?;
                let text = payload.text;
                Some(match kind {
                    MessageKind::Ask => Self::Ask { text },
                    MessageKind::Answer => Self::Answer { text },
                    _ => Self::Notice { text },
                })
            }
            MessageKind::Focus | MessageKind::Scroll | MessageKind::Close => {
                // Payload-free kinds tolerate an explicit null but nothing else.
                if !matches!(envelope.payload, None | Some(Value::Null)) {
                    return None;
                }
                Some(match kind {
                    MessageKind::Focus => Self::Focus,
                    MessageKind::Scroll => Self::Scroll,
                    _ => Self::Close,
                })
            }
        }
    }
}

/// Normalized `scheme://host[:port]` origin. The wildcard origin is not representable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin(String);

impl Origin {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim().trim_end_matches('/');
        let (scheme, authority) = trimmed.split_once("://")?;
        if scheme.is_empty()
            || authority.is_empty()
            || authority.contains(['/', '?', '#', '*', ' '])
        {
            return None;
        }

        Some(Self(format!(
            "{}://{}",
            scheme.to_ascii_lowercase(),
            authority.to_ascii_lowercase()
        )))
    }

    /// Derives the origin of an absolute URL.
    pub fn from_url(url: &str) -> Option<Self> {
        let trimmed = url.trim();
        let (scheme, rest) = trimmed.split_once("://")?;
        let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        Self::parse(&format!("{scheme}://{}", &rest[..authority_end]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, raw: &str) -> bool {
        Self::parse(raw).is_some_and(|other| other == *self)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Which end of the protocol a bridge instance sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeSide {
    Host,
    Surface,
}

impl BridgeSide {
    pub const fn inbound(self) -> Route {
        match self {
            Self::Host => Route::SurfaceToHost,
            Self::Surface => Route::HostToSurface,
        }
    }

    pub const fn outbound(self) -> Route {
        match self {
            Self::Host => Route::HostToSurface,
            Self::Surface => Route::SurfaceToHost,
        }
    }
}

/// Transport delivering serialized messages to the peer context.
pub trait MessagePort {
    fn post(&self, data: Value, target_origin: &Origin);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

type Subscriber = Rc<dyn Fn(&Message)>;

/// Typed, validated message channel between host page and chat surface.
pub struct MessageBridge {
    side: BridgeSide,
    peer_origin: Origin,
    port: RefCell<Option<Rc<dyn MessagePort>>>,
    subscribers: RefCell<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription_id: Cell<u64>,
}

impl MessageBridge {
    pub fn new(side: BridgeSide, peer_origin: Origin) -> Self {
        Self {
            side,
            peer_origin,
            port: RefCell::new(None),
            subscribers: RefCell::new(Vec::new()),
            next_subscription_id: Cell::new(1),
        }
    }

    /// Two bridges wired back to back, for surfaces living in the same context.
    pub fn loopback_pair(origin: Origin) -> (Rc<Self>, Rc<Self>) {
        let host = Rc::new(Self::new(BridgeSide::Host, origin.clone()));
        let surface = Rc::new(Self::new(BridgeSide::Surface, origin.clone()));
        host.connect(Rc::new(LoopbackPort::new(&surface, origin.clone())));
        surface.connect(Rc::new(LoopbackPort::new(&host, origin)));
        (host, surface)
    }

    pub fn side(&self) -> BridgeSide {
        self.side
    }

    pub fn peer_origin(&self) -> &Origin {
        &self.peer_origin
    }

    pub fn connect(&self, port: Rc<dyn MessagePort>) {
        *self.port.borrow_mut() = Some(port);
    }

    pub fn subscribe(&self, handler: impl Fn(&Message) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription_id.get());
        self.next_subscription_id.set(id.0.saturating_add(1));
        self.subscribers.borrow_mut().push((id, Rc::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(subscription_id, _)| *subscription_id != id);
        subscribers.len() != before
    }

    /// Validates one inbound message and fans it out to subscribers.
    ///
    /// Returns the accepted message; anything from an unexpected origin, with an unknown
    /// kind, a malformed payload or travelling the wrong way is dropped.
    pub fn receive(&self, origin: &str, data: &Value) -> Option<Message> {
        if !self.peer_origin.matches(origin) {
            tracing::debug!(
                origin = %origin,
                expected = %self.peer_origin,
                "discarding message from unexpected origin"
            );
            return None;
        }

        let Some(message) = Message::decode(data) else {
            tracing::debug!(origin = %origin, "discarding message that does not match the protocol");
            return None;
        };

        if !message.kind().travels(self.side.inbound()) {
            tracing::debug!(
                kind = message.kind().as_str(),
                side = ?self.side,
                "discarding message travelling against its direction"
            );
            return None;
        }

        let subscribers = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, subscriber)| subscriber.clone())
            .collect::<Vec<_>>();
        for subscriber in subscribers {
            subscriber(&message);
        }

        Some(message)
    }

    /// Sends one message to the peer. Returns false when it cannot travel from this side
    /// or no port is connected yet.
    pub fn post(&self, message: Message) -> bool {
        if !message.kind().travels(self.side.outbound()) {
            tracing::warn!(
                kind = message.kind().as_str(),
                side = ?self.side,
                "refusing to post message against its direction"
            );
            return false;
        }

        let Some(port) = self.port.borrow().clone() else {
            tracing::debug!(kind = message.kind().as_str(), "no port connected; message dropped");
            return false;
        };

        port.post(message.to_value(), &self.peer_origin);
        true
    }
}

/// In-process port delivering straight into the peer bridge.
pub struct LoopbackPort {
    peer: Weak<MessageBridge>,
    sender_origin: Origin,
}

impl LoopbackPort {
    pub fn new(peer: &Rc<MessageBridge>, sender_origin: Origin) -> Self {
        Self {
            peer: Rc::downgrade(peer),
            sender_origin,
        }
    }
}

impl MessagePort for LoopbackPort {
    fn post(&self, data: Value, target_origin: &Origin) {
        let Some(peer) = self.peer.upgrade() else {
            return;
        };

        if peer.peer_origin() != &self.sender_origin || target_origin != &self.sender_origin {
            tracing::debug!(target_origin = %target_origin, "loopback origin mismatch; dropped");
            return;
        }

        peer.receive(self.sender_origin.as_str(), &data);
    }
}
