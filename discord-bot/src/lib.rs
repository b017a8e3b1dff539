pub mod bot;
pub mod commands;
pub mod embed;
pub mod gateway;
pub mod http;

pub use bot::{run, MemeBot, RECONNECT_DELAY};
pub use commands::Command;
pub use gateway::{Gateway, GatewayEvent, InboundMessage};
pub use http::{DiscordHttpClient, ReplySink};
