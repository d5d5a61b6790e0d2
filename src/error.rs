use thiserror::Error;

/// Covers the fatal-on-startup, fatal-at-runtime, and recoverable error
/// kinds enumerated in the error handling design. "Logged and ignored"
/// cases (unknown keysym, modifier underflow, uinput write failure) never
/// reach this type — they are handled inline where they occur.
#[derive(Error, Debug)]
pub enum WvncError {
    #[error("failed to connect to the Wayland display")]
    WaylandConnect,

    #[error("compositor does not implement required protocol: {0}")]
    MissingProtocol(&'static str),

    #[error("output {0:?} not found among discovered outputs")]
    OutputNotFound(Option<String>),

    #[error("multiple outputs discovered but none selected with --output")]
    OutputAmbiguous,

    #[error("exhausted shared-memory candidate names")]
    ShmCreate,

    #[error("shared-memory operation failed: {0}")]
    Shm(#[source] nix::Error),

    #[error("failed to compile or adopt an XKB keymap")]
    XkbKeymap,

    #[error("screen capture failed")]
    CaptureFailed,

    #[error("captured frame has an unexpected pixel format: {0:?}")]
    UnexpectedPixelFormat(wayland_client::protocol::wl_shm::Format),

    #[error("output reported an unsupported (flipped) transform: {0:?}")]
    UnknownOrientation(wayland_client::protocol::wl_output::Transform),

    #[error("failed to initialize the RFB server")]
    RfbInit,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WvncError>;

impl From<nix::Error> for WvncError {
    fn from(e: nix::Error) -> Self {
        WvncError::Shm(e)
    }
}
