/// Declarative macro generating `EventType`, `SessionEventPayload`,
/// `ALL_EVENT_TYPES`, wire-format helpers, domain groups, and typed
/// payload conversion from a single source of truth.
///
/// # Sections
///
/// - **`events`**: one row per event type: variant, wire string, payload struct.
/// - **`domain_groups`**: named boolean methods grouping variants.
macro_rules! define_events {
    (
        events {
            $(
                $(#[doc = $doc:literal])*
                $variant:ident => $wire:literal => $payload_ty:ty
            ),* $(,)?
        }
        domain_groups {
            $(
                $(#[doc = $gdoc:literal])*
                $method:ident => [$($gv:ident),* $(,)?]
            ),* $(,)?
        }
    ) => {
        // ── EventType enum ──────────────────────────────────────────

        /// Discriminator for every persisted session event type.
        ///
        /// Each variant serializes to its dotted wire string
        /// (e.g. `"session.start"`).
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum EventType {
            $(
                $(#[doc = $doc])*
                #[serde(rename = $wire)]
                $variant,
            )*
        }

        /// All event type variants in definition order.
        pub const ALL_EVENT_TYPES: [EventType; { [$($wire,)*].len() }] = [
            $(EventType::$variant,)*
        ];

        impl EventType {
            /// Canonical wire string (e.g. `"session.start"`).
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)*
                }
            }

            /// Domain prefix (e.g. `"session"`, `"message"`).
            #[must_use]
            pub fn domain(self) -> &'static str {
                let s = self.as_str();
                match s.find('.') {
                    Some(i) => &s[..i],
                    None => s,
                }
            }

            $(
                $(#[doc = $gdoc])*
                #[must_use]
                pub fn $method(self) -> bool {
                    matches!(self, $(Self::$gv)|*)
                }
            )*
        }

        impl std::fmt::Display for EventType {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for EventType {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($wire => Ok(Self::$variant),)*
                    _ => Err(format!("unknown event type: {s}")),
                }
            }
        }

        // ── SessionEventPayload enum ────────────────────────────────

        /// Typed payload, one variant per [`EventType`].
        ///
        /// Appends take this enum, so a stored event's type tag always
        /// matches its payload schema.
        #[derive(Clone, Debug, PartialEq)]
        pub enum SessionEventPayload {
            $(
                $(#[doc = $doc])*
                $variant($payload_ty),
            )*
        }

        impl SessionEventPayload {
            /// Event type this payload is stored under.
            #[must_use]
            pub fn event_type(&self) -> EventType {
                match self {
                    $(Self::$variant(_) => EventType::$variant,)*
                }
            }

            /// Serialize the inner payload struct to its canonical JSON.
            pub fn to_value(&self) -> std::result::Result<serde_json::Value, serde_json::Error> {
                match self {
                    $(Self::$variant(p) => serde_json::to_value(p),)*
                }
            }
        }

        // ── SessionEvent::typed_payload ─────────────────────────────

        impl SessionEvent {
            /// Deserialize the payload into its typed variant.
            pub fn typed_payload(&self) -> std::result::Result<SessionEventPayload, serde_json::Error> {
                match self.event_type {
                    $(
                        EventType::$variant => Ok(SessionEventPayload::$variant(
                            serde_json::from_value(self.payload.clone())?,
                        )),
                    )*
                }
            }
        }
    };
}
