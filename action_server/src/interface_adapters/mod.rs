// Interface adapters: wire protocol, connection handles and network handling.

pub mod actions;
pub mod http;
pub mod net;
pub mod protocol;
pub mod session;
pub mod state;
pub mod utils;
