//! Connection management: configuration, transport, proxy tunnelling and
//! the session state machine.

mod config;
pub mod proxy;
mod session;
mod stream;

pub use config::{DEFAULT_LOCAL_NAME, Security, SessionConfig, SessionConfigBuilder, Timeouts};
pub use proxy::{ProxyConfig, ProxyKind};
pub use session::{Session, SessionPhase, WIRE_TARGET};
pub use stream::SmtpStream;
