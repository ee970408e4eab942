/// Events emitted by the registry during operations.
///
/// These events are passed to the tracing callback set via `set_trace_callback`.
/// The `Clone` derive allows callbacks to store or forward events if needed.
///
/// # Examples
///
/// ```rust
/// use singleton_lock_registry::RegistryEvent;
///
/// let event = RegistryEvent::Create { type_name: "app::Config", lock_type: "standard" };
/// assert_eq!(event.to_string(), "create { type_name: app::Config, lock_type: standard }");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// An instance was constructed and published.
    Create {
        type_name: &'static str,
        /// Name of the lock type guarding the instance.
        lock_type: &'static str,
    },

    /// An instance was requested.
    Get {
        type_name: &'static str,
        /// Whether an already constructed instance was returned.
        found: bool,
    },

    /// A construction attempt failed and the type was rolled back.
    Fail { type_name: &'static str },

    /// The lock type for future entries was changed.
    LockType {
        from: &'static str,
        to: &'static str,
    },

    /// The registry was reset.
    Reset {},
}

impl std::fmt::Display for RegistryEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryEvent::Create {
                type_name,
                lock_type,
            } => {
                write!(
                    f,
                    "create {{ type_name: {}, lock_type: {} }}",
                    type_name, lock_type
                )
            }
            RegistryEvent::Get { type_name, found } => {
                write!(f, "get {{ type_name: {}, found: {} }}", type_name, found)
            }
            RegistryEvent::Fail { type_name } => {
                write!(f, "fail {{ type_name: {} }}", type_name)
            }
            RegistryEvent::LockType { from, to } => {
                write!(f, "lock_type {{ from: {}, to: {} }}", from, to)
            }
            RegistryEvent::Reset {} => write!(f, "Resetting the Registry"),
        }
    }
}
